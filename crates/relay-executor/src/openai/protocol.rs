//! Server-Sent Events decoding for streamed runs.

use std::{collections::VecDeque, fmt::Display, pin::Pin};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use relay_core::{
    stream::{Delta, RunStream, StreamEvent},
    thread::RunId,
    traits::BackendError,
};

use super::types::{MessageDeltaEvent, RunObject};

/// One decoded SSE block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE framer.
///
/// Bytes are buffered until a blank line closes a block, so multi-byte
/// characters split across network chunks survive intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every block it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().filter(|b| **b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            events.extend(parse_block(&block[..pos]));
        }
        events
    }

    /// Decode whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let block = std::mem::take(&mut self.buffer);
        parse_block(&block)
    }
}

fn parse_block(block: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(block);
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}

const CUT_SHORT: &str = "stream ended before the run completed";

/// Maps Assistants stream events to run stream items.
///
/// Only `thread.run.completed` yields `Done`; every other way for a stream to
/// end is an error.
#[derive(Debug, Default)]
pub struct EventMapper {
    run_id: Option<RunId>,
    completed: bool,
}

impl EventMapper {
    /// `None` for events that carry nothing for the caller.
    pub fn map(&mut self, event: &SseEvent) -> Option<Result<StreamEvent, BackendError>> {
        let name = event.event.as_deref()?;
        match name {
            "thread.run.created" => {
                if let Ok(run) = serde_json::from_str::<RunObject>(&event.data) {
                    tracing::debug!(run_id = %run.id, "stream run created");
                    self.run_id = Some(run.id);
                }
                None
            }
            "thread.message.delta" => {
                match serde_json::from_str::<MessageDeltaEvent>(&event.data) {
                    Ok(delta) => {
                        let text = delta.text();
                        (!text.is_empty()).then(|| {
                            Ok(StreamEvent::Delta(Delta {
                                run_id: self.run_id.clone(),
                                text,
                            }))
                        })
                    }
                    Err(e) => Some(Err(BackendError::Decode(e.to_string()))),
                }
            }
            "thread.run.completed" => {
                self.completed = true;
                Some(Ok(StreamEvent::Done))
            }
            "done" if self.completed => Some(Ok(StreamEvent::Done)),
            "done" => Some(Err(BackendError::Stream(CUT_SHORT.to_string()))),
            "thread.run.requires_action" => {
                let run_id = serde_json::from_str::<RunObject>(&event.data)
                    .map(|run| run.id)
                    .ok()
                    .or_else(|| self.run_id.clone())
                    .unwrap_or_default();
                Some(Err(BackendError::RequiresAction { run_id }))
            }
            "thread.run.failed"
            | "thread.run.cancelled"
            | "thread.run.expired"
            | "thread.run.incomplete" => {
                let message = match serde_json::from_str::<RunObject>(&event.data) {
                    Ok(run) => {
                        let reason = run
                            .last_error
                            .map_or_else(|| run.status.to_string(), |e| e.message);
                        format!("run {} ended as {}: {reason}", run.id, run.status)
                    }
                    Err(_) => name.to_string(),
                };
                Some(Err(BackendError::Stream(message)))
            }
            "error" => {
                let message = serde_json::from_str::<serde_json::Value>(&event.data)
                    .ok()
                    .and_then(|v| {
                        v.get("message")
                            .or_else(|| v.pointer("/error/message"))
                            .and_then(|m| m.as_str())
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| event.data.clone());
                Some(Err(BackendError::Stream(message)))
            }
            _ => None,
        }
    }
}

struct State<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    mapper: EventMapper,
    pending: VecDeque<Result<StreamEvent, BackendError>>,
    exhausted: bool,
    finished: bool,
}

impl<S> State<S> {
    fn queue(&mut self, events: impl IntoIterator<Item = SseEvent>) {
        for event in events {
            if let Some(item) = self.mapper.map(&event) {
                self.pending.push_back(item);
            }
        }
    }
}

/// Turn an SSE byte stream into a run stream.
///
/// The run stream ends after `Done` or the first error. A byte stream that
/// closes before the run completed ends with an error.
pub fn event_stream<S, E>(bytes: S) -> RunStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = State {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        mapper: EventMapper::default(),
        pending: VecDeque::new(),
        exhausted: false,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if let Some(item) = state.pending.pop_front() {
                if matches!(item, Ok(StreamEvent::Done) | Err(_)) {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.exhausted {
                state.finished = true;
                return Some((Err(BackendError::Stream(CUT_SHORT.to_string())), state));
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.queue(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(BackendError::Stream(e.to_string())), state));
                }
                None => {
                    state.exhausted = true;
                    let rest = state.decoder.finish();
                    state.queue(rest);
                }
            }
        }
    })
    .boxed()
}
