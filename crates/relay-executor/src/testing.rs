//! Scripted in-process backend for tests.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use futures::StreamExt;
use relay_core::{
    Persona, PersonaParams, Role, Run, RunStatus, StoredFile, StreamEvent, Thread, ThreadMessage,
    persona::ToolResources,
    stream::RunStream,
    thread::RunFailure,
    traits::{BackendError, CompletionBackend},
};

#[derive(Default)]
struct State {
    calls: Vec<String>,
    statuses: VecDeque<RunStatus>,
    last_status: Option<RunStatus>,
    runs: u32,
    threads: u32,
    assistants: u32,
    created: Vec<Persona>,
    polls: u32,
}

/// Backend whose answers are fixed up front.
///
/// Runs are numbered `run_1`, `run_2`, ...; successive `retrieve_run` calls
/// walk through the scripted statuses and then repeat the last one.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<State>,
    initial: Option<RunStatus>,
    reply: Option<String>,
    messages: Option<Vec<ThreadMessage>>,
    failure: Option<RunFailure>,
    stream: Mutex<Option<Vec<Result<StreamEvent, BackendError>>>>,
    failing: Vec<&'static str>,
    account: Vec<Persona>,
    files: Vec<StoredFile>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses returned by successive `retrieve_run` calls.
    #[must_use]
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        self.lock().statuses = statuses.into_iter().collect();
        self
    }

    /// Status of a freshly created run (default `queued`).
    #[must_use]
    pub const fn with_initial_status(mut self, status: RunStatus) -> Self {
        self.initial = Some(status);
        self
    }

    /// Assistant text attached to the latest run in `list_messages`.
    #[must_use]
    pub fn with_reply(mut self, text: impl Into<String>) -> Self {
        self.reply = Some(text.into());
        self
    }

    /// Fixed `list_messages` result, returned whatever run is asked for.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<ThreadMessage>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Failure details reported with failed runs.
    #[must_use]
    pub fn with_failure(mut self, failure: RunFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Events yielded by the next `stream_run`.
    #[must_use]
    pub fn with_stream(self, events: Vec<Result<StreamEvent, BackendError>>) -> Self {
        *self.stream.lock().unwrap_or_else(PoisonError::into_inner) = Some(events);
        self
    }

    /// Personas already on the account; `list_assistants` returns them
    /// followed by every persona created through this backend.
    #[must_use]
    pub fn with_assistants(mut self, personas: Vec<Persona>) -> Self {
        self.account = personas;
        self
    }

    /// Fixed `list_files` result.
    #[must_use]
    pub fn with_files(mut self, files: Vec<StoredFile>) -> Self {
        self.files = files;
        self
    }

    /// Make the named operation fail with a transport error.
    #[must_use]
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.push(operation);
        self
    }

    /// Calls received so far, formatted as `"<operation> <args...>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of `retrieve_run` calls.
    #[must_use]
    pub fn polls(&self) -> u32 {
        self.lock().polls
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, operation: &'static str, call: String) -> Result<(), BackendError> {
        self.lock().calls.push(call);
        if self.failing.contains(&operation) {
            return Err(BackendError::Transport(format!("{operation} unavailable")));
        }
        Ok(())
    }

    fn run(&self, id: u32, thread_id: &str, persona_id: &str, status: RunStatus) -> Run {
        Run {
            id: format!("run_{id}"),
            thread_id: thread_id.to_string(),
            assistant_id: persona_id.to_string(),
            status,
            last_error: status.is_failure().then(|| self.failure.clone()).flatten(),
        }
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn create_thread(&self) -> Result<Thread, BackendError> {
        self.record("create_thread", "create_thread".to_string())?;
        let mut state = self.lock();
        state.threads += 1;
        Ok(Thread {
            id: format!("thread_{}", state.threads),
            created_at: i64::from(state.threads),
            vector_store_ids: Vec::new(),
        })
    }

    async fn create_assistant(&self, params: &PersonaParams) -> Result<Persona, BackendError> {
        self.record("create_assistant", format!("create_assistant {}", params.name))?;
        let mut state = self.lock();
        state.assistants += 1;
        let persona = Persona {
            id: format!("asst_{}", state.assistants),
            name: params.name.clone(),
            description: None,
            instructions: params.instructions.clone(),
            model: params.model.clone(),
            tools: params.tools.clone(),
            tool_resources: ToolResources::default(),
            temperature: None,
            top_p: None,
            created_at: i64::from(state.assistants),
            activated: false,
        };
        state.created.push(persona.clone());
        Ok(persona)
    }

    async fn create_message(&self, thread_id: &str, text: &str) -> Result<(), BackendError> {
        self.record("create_message", format!("create_message {thread_id} {text}"))
    }

    async fn create_run(&self, thread_id: &str, persona_id: &str) -> Result<Run, BackendError> {
        self.record("create_run", format!("create_run {thread_id} {persona_id}"))?;
        let id = {
            let mut state = self.lock();
            state.runs += 1;
            state.runs
        };
        let status = self.initial.unwrap_or(RunStatus::Queued);
        Ok(self.run(id, thread_id, persona_id, status))
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, BackendError> {
        self.record("retrieve_run", format!("retrieve_run {run_id}"))?;
        let (id, status) = {
            let mut state = self.lock();
            state.polls += 1;
            let status = match state.statuses.pop_front() {
                Some(status) => {
                    state.last_status = Some(status);
                    status
                }
                None => state.last_status.unwrap_or(RunStatus::Completed),
            };
            (state.runs, status)
        };
        Ok(self.run(id, thread_id, "asst", status))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), BackendError> {
        self.record("cancel_run", format!("cancel_run {thread_id} {run_id}"))
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Vec<ThreadMessage>, BackendError> {
        self.record("list_messages", format!("list_messages {thread_id} {run_id}"))?;
        if let Some(messages) = &self.messages {
            return Ok(messages.clone());
        }
        let run = self.lock().runs;
        Ok(self
            .reply
            .iter()
            .map(|text| ThreadMessage {
                id: format!("msg_{run}"),
                role: Role::Assistant,
                run_id: Some(format!("run_{run}")),
                created_at: i64::from(run),
                text: vec![text.clone()],
            })
            .collect())
    }

    async fn stream_run(&self, thread_id: &str, persona_id: &str) -> Result<RunStream, BackendError> {
        self.record("stream_run", format!("stream_run {thread_id} {persona_id}"))?;
        self.lock().runs += 1;
        let events = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| {
                let reply = self.reply.clone().unwrap_or_default();
                vec![Ok(StreamEvent::delta(reply)), Ok(StreamEvent::Done)]
            });
        Ok(futures::stream::iter(events).boxed())
    }

    async fn list_assistants(&self) -> Result<Vec<Persona>, BackendError> {
        self.record("list_assistants", "list_assistants".to_string())?;
        let created = self.lock().created.clone();
        Ok(self.account.iter().cloned().chain(created).collect())
    }

    async fn list_files(&self) -> Result<Vec<StoredFile>, BackendError> {
        self.record("list_files", "list_files".to_string())?;
        Ok(self.files.clone())
    }
}
