//! Splitting of oversized replies into transport-sized pieces.

/// Split `text` into pieces of at most `limit` characters.
///
/// Each cut happens at the last whitespace inside the first `limit`
/// characters and that whitespace character is dropped. A prefix without
/// whitespace is hard-cut at `limit`. Lengths are counted in `char`s.
#[must_use]
pub fn split(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        let prefix_end = rest
            .char_indices()
            .nth(limit)
            .map_or(rest.len(), |(idx, _)| idx);
        let prefix = &rest[..prefix_end];

        match prefix.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
            Some((0, ws)) => {
                // Only leading whitespace: drop it and retry on the remainder.
                rest = &rest[ws.len_utf8()..];
            }
            Some((cut, ws)) => {
                chunks.push(prefix[..cut].to_string());
                rest = &rest[cut + ws.len_utf8()..];
            }
            None => {
                chunks.push(prefix.to_string());
                rest = &rest[prefix_end..];
            }
        }
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}
