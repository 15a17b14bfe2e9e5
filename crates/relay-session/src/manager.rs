//! Conversation manager tying stores, locks and the run coordinator together.

use std::{future::Future, sync::Arc, time::Duration};

use relay_core::{
    DialogContext, Message, Persona, PersonaParams, RelayConfig, StoredFile, Thread, persona,
    traits::{
        BackendError, CompletionBackend, DocumentStore, StorageError, TaskListProvider,
        TaskProviderError, UserId,
    },
};
use relay_executor::{
    DialogError, PollPolicy, RunCoordinator, SnapshotSink, StreamPolicy, schedule,
};

use crate::{
    UserLocks,
    session::SessionStore,
    settings::{SettingsError, SettingsStore},
    threads::ThreadIndex,
};

/// Conversation manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Dialog(#[from] DialogError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("No persona selected")]
    NoPersona,
    #[error("Exchange timed out after {0:?}")]
    Timeout(Duration),
    #[error("No task provider configured")]
    NoTaskProvider,
    #[error("Task provider error: {0}")]
    Tasks(#[from] TaskProviderError),
}

impl ManagerError {
    /// Short text suitable for showing to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Dialog(e) => e.user_message(),
            Self::NoPersona => {
                "⚠️ No assistant selected. Use /personas to pick one.".to_string()
            }
            Self::Timeout(_) => {
                "⚠️ The assistant is taking too long. Please try again.".to_string()
            }
            Self::NoTaskProvider => "⚠️ Task lists are not connected.".to_string(),
            Self::Tasks(TaskProviderError::Unauthorized(_)) => {
                "⚠️ Authorization with the task service is required.".to_string()
            }
            _ => "⚠️ An error occurred. Please try again.".to_string(),
        }
    }
}

/// Serializes each user's exchanges and keeps their documents consistent.
///
/// Every public operation takes the user's lock first. Only exchanges that
/// finish successfully are written to the session log.
pub struct ConversationManager<D: ?Sized, B: ?Sized> {
    sessions: SessionStore<D>,
    settings: SettingsStore<D>,
    threads: ThreadIndex<D>,
    locks: UserLocks,
    coordinator: RunCoordinator<B>,
    persona: PersonaParams,
    timeout: Option<Duration>,
    tasks: Option<Arc<dyn TaskListProvider>>,
    schedule_preamble: String,
}

impl<D, B> ConversationManager<D, B>
where
    D: DocumentStore + ?Sized,
    B: CompletionBackend + ?Sized,
{
    /// Create a manager with default persona parameters and no timeout.
    #[must_use]
    pub fn new(store: Arc<D>, coordinator: RunCoordinator<B>) -> Self {
        Self {
            sessions: SessionStore::new(Arc::clone(&store)),
            settings: SettingsStore::new(Arc::clone(&store)),
            threads: ThreadIndex::new(store),
            locks: UserLocks::new(),
            coordinator,
            persona: PersonaParams::default(),
            timeout: None,
            tasks: None,
            schedule_preamble: schedule::DEFAULT_PREAMBLE.to_string(),
        }
    }

    /// Create a manager from the relay configuration.
    #[must_use]
    pub fn from_config(store: Arc<D>, backend: Arc<B>, config: &RelayConfig) -> Self {
        let coordinator = RunCoordinator::new(backend)
            .with_poll_policy(PollPolicy {
                interval: config.dialog.poll_interval(),
                max_polls: config.dialog.max_polls,
            })
            .with_stream_policy(StreamPolicy {
                snapshot_interval: config.stream.snapshot_interval(),
                chunk_limit: config.stream.chunk_limit,
            });
        let mut manager = Self::new(store, coordinator)
            .with_persona_params(config.persona.clone())
            .with_timeout(config.dialog.timeout());
        if let Some(preamble) = &config.schedule.preamble {
            manager.schedule_preamble.clone_from(preamble);
        }
        manager
    }

    /// Parameters of the persona created on first contact.
    #[must_use]
    pub fn with_persona_params(mut self, params: PersonaParams) -> Self {
        self.persona = params;
        self
    }

    /// Bound every exchange by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Source of tasks for the daily schedule.
    #[must_use]
    pub fn with_task_provider(mut self, tasks: Arc<dyn TaskListProvider>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Resolve the user's context, creating a default persona and thread on
    /// first contact.
    ///
    /// # Errors
    /// Returns error if storage or the backend fails, or no persona is active.
    pub async fn ensure_persona(&self, user_id: UserId) -> Result<DialogContext, ManagerError> {
        let _guard = self.locks.lock(user_id).await;
        self.context_locked(user_id).await
    }

    /// Run one exchange through the poll path.
    ///
    /// Returns `None` when the run completed without a reply.
    ///
    /// # Errors
    /// Returns error if the exchange fails; the session is left untouched.
    pub async fn dialog(&self, user_id: UserId, text: &str) -> Result<Option<String>, ManagerError> {
        let _guard = self.locks.lock(user_id).await;
        let ctx = self.context_locked(user_id).await?;

        let reply = self
            .bounded(
                self.coordinator
                    .start_dialog(text, &ctx.persona_id, &ctx.thread_id),
            )
            .await?;

        self.record(user_id, text, reply.text.as_deref()).await?;
        Ok(reply.text)
    }

    /// Run one exchange through the streaming path, feeding `sink`.
    ///
    /// # Errors
    /// Returns error if the exchange fails; the session is left untouched.
    pub async fn dialog_streaming<S>(
        &self,
        user_id: UserId,
        text: &str,
        sink: &mut S,
    ) -> Result<String, ManagerError>
    where
        S: SnapshotSink + ?Sized,
    {
        let _guard = self.locks.lock(user_id).await;
        let ctx = self.context_locked(user_id).await?;

        let reply = self
            .bounded(
                self.coordinator
                    .stream_dialog(text, &ctx.persona_id, &ctx.thread_id, sink),
            )
            .await?;

        let stored = (!reply.trim().is_empty()).then_some(reply.as_str());
        self.record(user_id, text, stored).await?;
        Ok(reply)
    }

    /// Clear the session and start a fresh thread.
    ///
    /// # Errors
    /// Returns error if storage or the backend fails.
    pub async fn reset(&self, user_id: UserId) -> Result<(), ManagerError> {
        let _guard = self.locks.lock(user_id).await;
        self.sessions.reset(user_id).await?;
        self.open_thread(user_id).await?;
        tracing::info!(user_id, "conversation reset");
        Ok(())
    }

    /// The user's personas, bootstrapping on first contact.
    ///
    /// # Errors
    /// Returns error if storage or the backend fails.
    pub async fn personas(&self, user_id: UserId) -> Result<Vec<Persona>, ManagerError> {
        let _guard = self.locks.lock(user_id).await;
        match self.settings.get_settings(user_id).await? {
            Some(list) if !list.is_empty() => Ok(list),
            _ => self.bootstrap(user_id).await,
        }
    }

    /// Refresh the user's personas from the backend account.
    ///
    /// Personas created elsewhere show up inactive, deleted ones disappear and
    /// the active choice survives when its persona still exists.
    ///
    /// # Errors
    /// Returns error if storage or the backend fails.
    pub async fn sync_personas(&self, user_id: UserId) -> Result<Vec<Persona>, ManagerError> {
        let _guard = self.locks.lock(user_id).await;
        let saved = match self.settings.get_settings(user_id).await? {
            Some(list) if !list.is_empty() => list,
            _ => self.bootstrap(user_id).await?,
        };
        let account = self.coordinator.backend().list_assistants().await?;
        let personas = persona::merge(&saved, account);
        self.settings.save_settings(user_id, &personas).await?;
        tracing::debug!(user_id, count = personas.len(), "synced personas");
        Ok(personas)
    }

    /// Create a persona named `name` from the configured parameters.
    ///
    /// The new persona joins the user's list inactive.
    ///
    /// # Errors
    /// Returns error if storage or the backend fails.
    pub async fn create_persona(
        &self,
        user_id: UserId,
        name: &str,
    ) -> Result<Persona, ManagerError> {
        let _guard = self.locks.lock(user_id).await;
        let mut personas = match self.settings.get_settings(user_id).await? {
            Some(list) if !list.is_empty() => list,
            _ => self.bootstrap(user_id).await?,
        };
        let params = PersonaParams {
            name: name.to_string(),
            ..self.persona.clone()
        };
        let created = Persona {
            activated: false,
            ..self.coordinator.backend().create_assistant(&params).await?
        };
        tracing::info!(user_id, persona_id = %created.id, "created persona");

        personas.push(created.clone());
        self.settings.save_settings(user_id, &personas).await?;
        Ok(created)
    }

    /// Files uploaded to the backend account.
    ///
    /// # Errors
    /// Returns error if the backend fails.
    pub async fn files(&self) -> Result<Vec<StoredFile>, ManagerError> {
        Ok(self.coordinator.backend().list_files().await?)
    }

    /// Activate the persona at zero-based `index`.
    ///
    /// Returns the now active persona, `None` if `index` was out of range and
    /// every persona got deactivated.
    ///
    /// # Errors
    /// Returns error if the user has no settings or storage fails.
    pub async fn select_persona(
        &self,
        user_id: UserId,
        index: usize,
    ) -> Result<Option<Persona>, ManagerError> {
        let _guard = self.locks.lock(user_id).await;
        let personas = self.settings.activate(user_id, index).await?;
        Ok(persona::active(&personas).cloned())
    }

    /// Open a new thread that becomes the user's current one.
    ///
    /// # Errors
    /// Returns error if storage or the backend fails.
    pub async fn new_thread(&self, user_id: UserId) -> Result<Thread, ManagerError> {
        let _guard = self.locks.lock(user_id).await;
        self.open_thread(user_id).await
    }

    /// Ask the active persona for a schedule built from the user's tasks.
    ///
    /// The session is replaced by the schedule exchange.
    ///
    /// # Errors
    /// Returns error if no task provider is configured, the provider fails or
    /// the exchange fails.
    pub async fn daily_schedule(&self, user_id: UserId) -> Result<Option<String>, ManagerError> {
        let tasks = self.tasks.as_ref().ok_or(ManagerError::NoTaskProvider)?;
        let prompt = schedule::build_prompt(&**tasks, &self.schedule_preamble).await?;

        let _guard = self.locks.lock(user_id).await;
        let ctx = self.context_locked(user_id).await?;
        let reply = self
            .bounded(
                self.coordinator
                    .start_dialog(&prompt, &ctx.persona_id, &ctx.thread_id),
            )
            .await?;

        let mut session = vec![Message::user(prompt)];
        session.extend(reply.text.as_deref().map(Message::assistant));
        self.sessions.save_session(user_id, &session).await?;
        Ok(reply.text)
    }

    async fn context_locked(&self, user_id: UserId) -> Result<DialogContext, ManagerError> {
        let personas = match self.settings.get_settings(user_id).await? {
            Some(list) if !list.is_empty() => list,
            _ => self.bootstrap(user_id).await?,
        };
        let active = persona::active(&personas).ok_or(ManagerError::NoPersona)?;

        let thread = match self.threads.current(user_id).await? {
            Some(thread) => thread,
            None => self.open_thread(user_id).await?,
        };
        Ok(DialogContext::new(user_id, active.id.clone(), thread.id))
    }

    async fn bootstrap(&self, user_id: UserId) -> Result<Vec<Persona>, ManagerError> {
        let created = self
            .coordinator
            .backend()
            .create_assistant(&self.persona)
            .await?;
        tracing::info!(user_id, persona_id = %created.id, "bootstrapped default persona");

        let personas = persona::activate(std::slice::from_ref(&created), 0);
        self.settings.save_settings(user_id, &personas).await?;
        if self.threads.current(user_id).await?.is_none() {
            self.open_thread(user_id).await?;
        }
        Ok(personas)
    }

    async fn open_thread(&self, user_id: UserId) -> Result<Thread, ManagerError> {
        let thread = self.coordinator.backend().create_thread().await?;
        self.threads.push(user_id, thread.clone()).await?;
        tracing::debug!(user_id, thread_id = %thread.id, "opened thread");
        Ok(thread)
    }

    async fn record(&self, user_id: UserId, text: &str, reply: Option<&str>) -> Result<(), ManagerError> {
        let mut messages = vec![Message::user(text)];
        messages.extend(reply.map(Message::assistant));
        self.sessions.append(user_id, messages).await?;
        Ok(())
    }

    async fn bounded<F, T>(&self, exchange: F) -> Result<T, ManagerError>
    where
        F: Future<Output = Result<T, DialogError>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| ManagerError::Timeout(limit))?
                .map_err(ManagerError::from),
            None => Ok(exchange.await?),
        }
    }
}
