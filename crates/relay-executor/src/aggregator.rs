//! Debounced snapshots of a streamed run for live-editing a chat message.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use relay_core::{
    chunker,
    stream::{RunStream, StreamEvent},
    traits::TransportError,
};
use tokio::time::Instant;

use crate::DialogError;

/// Output produced while aggregating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotEvent {
    /// Current text of the open output unit.
    Snapshot(String),
    /// Final text of a full output unit; later snapshots belong to a new unit.
    Sealed(String),
}

/// Receiver of aggregated snapshots.
#[async_trait]
pub trait SnapshotSink: Send {
    /// Show `text` as the content of the open unit.
    async fn snapshot(&mut self, text: &str) -> Result<(), TransportError>;

    /// Finalize the open unit with `text` and start a new one.
    async fn seal(&mut self, text: &str) -> Result<(), TransportError>;
}

/// Accumulates deltas and decides when a snapshot is worth sending.
#[derive(Debug)]
pub struct StreamAggregator {
    interval: Duration,
    chunk_limit: usize,
    unit: String,
    full: String,
    last_emit: Instant,
    last_sent: Option<String>,
}

impl StreamAggregator {
    /// Create an aggregator whose rate-limit window starts at `now`.
    #[must_use]
    pub fn new(interval: Duration, chunk_limit: usize, now: Instant) -> Self {
        Self {
            interval,
            chunk_limit,
            unit: String::new(),
            full: String::new(),
            last_emit: now,
            last_sent: None,
        }
    }

    /// Append a delta received at `now`.
    pub fn push(&mut self, text: &str, now: Instant) -> Vec<SnapshotEvent> {
        self.unit.push_str(text);
        self.full.push_str(text);

        let mut events = self.paginate();
        if now.saturating_duration_since(self.last_emit) > self.interval {
            self.last_emit = now;
            events.extend(self.snapshot());
        }
        events
    }

    /// Flush the open unit at end of stream, ignoring the rate limit.
    pub fn finish(&mut self) -> Option<SnapshotEvent> {
        self.snapshot()
    }

    /// Everything received so far, unsplit.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.full
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.full
    }

    fn paginate(&mut self) -> Vec<SnapshotEvent> {
        if self.unit.chars().count() <= self.chunk_limit {
            return Vec::new();
        }
        let mut pieces = chunker::split(&self.unit, self.chunk_limit);
        self.unit = pieces.pop().unwrap_or_default();
        self.last_sent = None;
        pieces.into_iter().map(SnapshotEvent::Sealed).collect()
    }

    fn snapshot(&mut self) -> Option<SnapshotEvent> {
        if self.unit.trim().is_empty() || self.last_sent.as_deref() == Some(self.unit.as_str()) {
            return None;
        }
        self.last_sent = Some(self.unit.clone());
        Some(SnapshotEvent::Snapshot(self.unit.clone()))
    }

    /// Consume `stream` into `sink` and return the full text.
    ///
    /// A stream error discards everything buffered so far.
    ///
    /// # Errors
    /// Returns error if the stream yields one.
    pub async fn drive<S>(mut self, mut stream: RunStream, sink: &mut S) -> Result<String, DialogError>
    where
        S: SnapshotSink + ?Sized,
    {
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Delta(delta) => {
                    let events = self.push(&delta.text, Instant::now());
                    deliver(sink, events).await;
                }
                StreamEvent::Done => break,
            }
        }
        deliver(sink, self.finish()).await;
        Ok(self.into_text())
    }
}

async fn deliver<S, I>(sink: &mut S, events: I)
where
    S: SnapshotSink + ?Sized,
    I: IntoIterator<Item = SnapshotEvent>,
{
    for event in events {
        let result = match &event {
            SnapshotEvent::Snapshot(text) => sink.snapshot(text).await,
            SnapshotEvent::Sealed(text) => sink.seal(text).await,
        };
        if let Err(e) = result {
            tracing::warn!("Failed to deliver snapshot: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use relay_core::traits::BackendError;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        events: Vec<(SnapshotEvent, Instant)>,
    }

    impl RecordingSink {
        fn snapshots(&self) -> Vec<&str> {
            self.events
                .iter()
                .filter_map(|(e, _)| match e {
                    SnapshotEvent::Snapshot(t) => Some(t.as_str()),
                    SnapshotEvent::Sealed(_) => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl SnapshotSink for RecordingSink {
        async fn snapshot(&mut self, text: &str) -> Result<(), TransportError> {
            self.events
                .push((SnapshotEvent::Snapshot(text.to_string()), Instant::now()));
            Ok(())
        }

        async fn seal(&mut self, text: &str) -> Result<(), TransportError> {
            self.events
                .push((SnapshotEvent::Sealed(text.to_string()), Instant::now()));
            Ok(())
        }
    }

    type Script = Vec<(u64, Result<StreamEvent, BackendError>)>;

    /// Feed `(delay_ms, event)` pairs through a channel-backed stream.
    fn scripted(script: Script) -> RunStream {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for (delay, event) in script {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        ReceiverStream::new(rx).boxed()
    }

    fn aggregator() -> StreamAggregator {
        StreamAggregator::new(Duration::from_millis(1000), 4096, Instant::now())
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_stream_emits_single_snapshot_at_end() {
        let start = Instant::now();
        let stream = scripted(vec![
            (0, Ok(StreamEvent::delta("A"))),
            (100, Ok(StreamEvent::delta("B"))),
            (100, Ok(StreamEvent::delta("C"))),
            (50, Ok(StreamEvent::Done)),
        ]);
        let mut sink = RecordingSink::default();

        let text = aggregator().drive(stream, &mut sink).await.unwrap();

        assert_eq!(text, "ABC");
        assert_eq!(sink.events.len(), 1);
        assert_eq!(sink.snapshots(), vec!["ABC"]);
        assert_eq!(sink.events[0].1 - start, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stream_is_rate_limited() {
        let mut script: Script = (0..10)
            .map(|i| (300, Ok(StreamEvent::delta(format!("{i} ")))))
            .collect();
        script.push((10, Ok(StreamEvent::Done)));
        let mut sink = RecordingSink::default();

        aggregator().drive(scripted(script), &mut sink).await.unwrap();

        // Deltas land every 300ms; a snapshot fires once more than 1s has elapsed.
        let times: Vec<Duration> = sink
            .events
            .windows(2)
            .map(|w| w[1].1 - w[0].1)
            .collect();
        assert!(times[..times.len() - 1]
            .iter()
            .all(|gap| *gap > Duration::from_millis(1000)));
        assert_eq!(sink.snapshots().last(), Some(&"0 1 2 3 4 5 6 7 8 9 "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_text_is_not_resent() {
        let stream = scripted(vec![
            (1100, Ok(StreamEvent::delta("hello"))),
            (1100, Ok(StreamEvent::delta(""))),
            (1100, Ok(StreamEvent::delta(""))),
            (0, Ok(StreamEvent::Done)),
        ]);
        let mut sink = RecordingSink::default();

        aggregator().drive(stream, &mut sink).await.unwrap();

        assert_eq!(sink.snapshots(), vec!["hello"]);
        let snapshots = sink.snapshots();
        assert!(snapshots.windows(2).all(|w| w[0] != w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_close_without_done_flushes() {
        let stream = scripted(vec![(10, Ok(StreamEvent::delta("partial answer")))]);
        let mut sink = RecordingSink::default();

        let text = aggregator().drive(stream, &mut sink).await.unwrap();

        assert_eq!(text, "partial answer");
        assert_eq!(sink.snapshots(), vec!["partial answer"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_is_propagated() {
        let stream = scripted(vec![
            (10, Ok(StreamEvent::delta("half"))),
            (10, Err(BackendError::Stream("connection reset".into()))),
        ]);
        let mut sink = RecordingSink::default();

        let err = aggregator().drive(stream, &mut sink).await.unwrap_err();

        assert!(matches!(err, DialogError::Backend(BackendError::Stream(_))));
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_oversized_unit_is_sealed_mid_stream() {
        let start = Instant::now();
        let mut agg = StreamAggregator::new(Duration::from_millis(1000), 20, start);

        let events = agg.push("alpha beta gamma delta epsilon", start);
        assert_eq!(events, vec![SnapshotEvent::Sealed("alpha beta gamma".into())]);

        let events = agg.push(" zeta", start + Duration::from_secs(2));
        assert_eq!(events, vec![SnapshotEvent::Snapshot("delta epsilon zeta".into())]);

        assert_eq!(agg.finish(), None);
        assert_eq!(agg.text(), "alpha beta gamma delta epsilon zeta");
    }

    #[test]
    fn test_whitespace_only_buffer_is_not_emitted() {
        let start = Instant::now();
        let mut agg = StreamAggregator::new(Duration::from_millis(1000), 4096, start);
        assert!(agg.push("  \n", start + Duration::from_secs(5)).is_empty());
        assert_eq!(agg.finish(), None);
    }
}
