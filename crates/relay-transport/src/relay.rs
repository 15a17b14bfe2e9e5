//! Maps channel events to conversation operations and replies.

use std::{collections::HashSet, sync::Arc};

use relay_core::{
    Persona, RelayConfig, chunker,
    traits::{ChatTransport, CompletionBackend, DocumentStore, TransportError, UserId},
};
use relay_session::{ConversationManager, ManagerError};

use crate::sink::MessageSink;

const PLACEHOLDER: &str = "🔄 Please wait, processing your request...";
const NO_REPLY: &str = "🤷 The assistant did not reply.";
const ACCESS_DENIED: &str = "⛔ Access denied.";
const GREETING: &str = "🤖 Hi! I'm here to help. Ask me anything and I'll do my best to answer.";
const RESET_DONE: &str = "⤵️ Context reset, the dialog starts over.";
const HELP: &str =
    "Commands: /start, /reset, /personas, /select <n>, /create <name>, /files, /schedule";
const NO_FILES: &str = "📂 No files available";

/// A command typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Reset,
    Personas,
    /// Raw argument of `/select`; validated when handled.
    Select(String),
    /// Name of the persona to create.
    Create(String),
    Files,
    Schedule,
    Unknown(String),
}

/// Inbound event of the chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Command { user_id: UserId, command: Command },
    Text { user_id: UserId, text: String },
}

impl ChannelEvent {
    /// Classify raw user input.
    ///
    /// Input starting with `/` is a command; a `@bot` suffix on the command
    /// name is ignored.
    #[must_use]
    pub fn parse(user_id: UserId, input: &str) -> Self {
        let Some(rest) = input.trim().strip_prefix('/') else {
            return Self::Text {
                user_id,
                text: input.to_string(),
            };
        };
        let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let name = name.split('@').next().unwrap_or(name);
        let command = match name {
            "start" => Command::Start,
            "reset" => Command::Reset,
            "personas" => Command::Personas,
            "select" => Command::Select(args.trim().to_string()),
            "create" => Command::Create(args.trim().to_string()),
            "files" => Command::Files,
            "schedule" => Command::Schedule,
            other => Command::Unknown(other.to_string()),
        };
        Self::Command { user_id, command }
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::Command { user_id, .. } | Self::Text { user_id, .. } => *user_id,
        }
    }
}

/// Entry point of a chat binding.
pub struct Relay<D: ?Sized, B: ?Sized> {
    manager: Arc<ConversationManager<D, B>>,
    allowed: HashSet<UserId>,
    streaming: bool,
    chunk_limit: usize,
}

impl<D, B> Relay<D, B>
where
    D: DocumentStore + ?Sized,
    B: CompletionBackend + ?Sized,
{
    /// Create a relay that streams replies and admits every user.
    #[must_use]
    pub fn new(manager: Arc<ConversationManager<D, B>>) -> Self {
        Self {
            manager,
            allowed: HashSet::new(),
            streaming: true,
            chunk_limit: 4096,
        }
    }

    /// Create a relay from the relay configuration.
    #[must_use]
    pub fn from_config(manager: Arc<ConversationManager<D, B>>, config: &RelayConfig) -> Self {
        Self::new(manager)
            .with_allowed_users(config.server.allowed_users.iter().copied())
            .with_streaming(config.dialog.streaming)
            .with_chunk_limit(config.stream.chunk_limit)
    }

    /// Only admit these users; an empty set admits everyone.
    #[must_use]
    pub fn with_allowed_users(mut self, users: impl IntoIterator<Item = UserId>) -> Self {
        self.allowed = users.into_iter().collect();
        self
    }

    #[must_use]
    pub const fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    #[must_use]
    pub const fn with_chunk_limit(mut self, chunk_limit: usize) -> Self {
        self.chunk_limit = chunk_limit;
        self
    }

    #[must_use]
    pub fn is_allowed(&self, user_id: UserId) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&user_id)
    }

    /// Handle one event, answering through `transport`.
    ///
    /// Conversation failures are answered with a short message; only
    /// transport failures are returned.
    ///
    /// # Errors
    /// Returns error if the transport fails.
    pub async fn handle<T>(&self, event: ChannelEvent, transport: &T) -> Result<(), TransportError>
    where
        T: ChatTransport + ?Sized,
    {
        let user_id = event.user_id();
        if !self.is_allowed(user_id) {
            tracing::warn!(user_id, "rejected user outside the allow-list");
            transport.reply(user_id, ACCESS_DENIED).await?;
            return Ok(());
        }

        match event {
            ChannelEvent::Text { text, .. } if self.streaming => {
                self.stream_text(user_id, &text, transport).await
            }
            ChannelEvent::Text { text, .. } => self.poll_text(user_id, &text, transport).await,
            ChannelEvent::Command { command, .. } => self.command(user_id, command, transport).await,
        }
    }

    async fn stream_text<T>(&self, user_id: UserId, text: &str, transport: &T) -> Result<(), TransportError>
    where
        T: ChatTransport + ?Sized,
    {
        let mut sink = MessageSink::open(transport, user_id, PLACEHOLDER).await?;
        match self.manager.dialog_streaming(user_id, text, &mut sink).await {
            Ok(_) if !sink.has_output() => sink.show(NO_REPLY).await,
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(user_id, "exchange failed: {e}");
                sink.show(&e.user_message()).await
            }
        }
    }

    async fn poll_text<T>(&self, user_id: UserId, text: &str, transport: &T) -> Result<(), TransportError>
    where
        T: ChatTransport + ?Sized,
    {
        let placeholder = transport.reply(user_id, PLACEHOLDER).await?;
        match self.manager.dialog(user_id, text).await {
            Ok(Some(reply)) => {
                let mut chunks = chunker::split(&reply, self.chunk_limit).into_iter();
                let first = chunks.next().unwrap_or_default();
                transport.edit_reply(&placeholder, &first).await?;
                for chunk in chunks {
                    transport.reply(user_id, &chunk).await?;
                }
                Ok(())
            }
            Ok(None) => transport.edit_reply(&placeholder, NO_REPLY).await,
            Err(e) => {
                tracing::error!(user_id, "exchange failed: {e}");
                transport.edit_reply(&placeholder, &e.user_message()).await
            }
        }
    }

    async fn command<T>(&self, user_id: UserId, command: Command, transport: &T) -> Result<(), TransportError>
    where
        T: ChatTransport + ?Sized,
    {
        let text = match command {
            Command::Start => match self.manager.personas(user_id).await {
                Ok(personas) => format!("{GREETING}\n\n{}", persona_menu(&personas)),
                Err(e) => failure(user_id, &e),
            },
            Command::Reset => match self.manager.reset(user_id).await {
                Ok(()) => RESET_DONE.to_string(),
                Err(e) => failure(user_id, &e),
            },
            Command::Personas => match self.manager.sync_personas(user_id).await {
                Ok(personas) => persona_menu(&personas),
                Err(e) => failure(user_id, &e),
            },
            Command::Select(arg) => match arg.parse::<usize>() {
                Ok(number) if number >= 1 => {
                    match self.manager.select_persona(user_id, number - 1).await {
                        Ok(Some(persona)) => format!("✅ Active assistant: {}", persona.name),
                        Ok(None) => format!(
                            "⚠️ There is no assistant number {number}. No assistant is active now."
                        ),
                        Err(e) => failure(user_id, &e),
                    }
                }
                _ => "Usage: /select <n>, where n is a number from /personas".to_string(),
            },
            Command::Create(name) if name.is_empty() => "Usage: /create <name>".to_string(),
            Command::Create(name) => match self.manager.create_persona(user_id, &name).await {
                Ok(persona) => format!("🆕 Created assistant {}. Use /personas to pick it.", persona.name),
                Err(e) => failure(user_id, &e),
            },
            Command::Files => match self.manager.files().await {
                Ok(files) if files.is_empty() => NO_FILES.to_string(),
                Ok(files) => files
                    .iter()
                    .map(|f| format!("📂 {}: id: {}", f.filename, f.id))
                    .collect::<Vec<_>>()
                    .join("\n"),
                Err(e) => failure(user_id, &e),
            },
            Command::Schedule => match self.manager.daily_schedule(user_id).await {
                Ok(Some(schedule)) => schedule,
                Ok(None) => NO_REPLY.to_string(),
                Err(e) => failure(user_id, &e),
            },
            Command::Unknown(name) => format!("Unknown command /{name}. {HELP}"),
        };

        for chunk in chunker::split(&text, self.chunk_limit) {
            transport.reply(user_id, &chunk).await?;
        }
        Ok(())
    }
}

fn failure(user_id: UserId, error: &ManagerError) -> String {
    tracing::error!(user_id, "command failed: {error}");
    error.user_message()
}

/// Numbered persona list, 1-based, marking the active one.
fn persona_menu(personas: &[Persona]) -> String {
    let mut menu = String::from("Assistants:");
    for (i, persona) in personas.iter().enumerate() {
        let mark = if persona.activated { "✅" } else { "▫️" };
        let name = if persona.name.is_empty() { &persona.id } else { &persona.name };
        menu.push_str(&format!("\n{mark} {}. {name}", i + 1));
    }
    menu.push_str("\n\nUse /select <n> to switch.");
    menu
}

#[cfg(test)]
mod tests {
    use relay_core::{RunStatus, StoredFile, StreamEvent};
    use relay_executor::{RunCoordinator, testing::MockBackend};
    use relay_session::storage::MemoryStorage;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::{channel::ChannelTransport, protocol::ServerMessage};

    type TestRelay = Relay<MemoryStorage, MockBackend>;

    fn relay(backend: MockBackend) -> TestRelay {
        let manager = ConversationManager::new(
            Arc::new(MemoryStorage::new()),
            RunCoordinator::new(Arc::new(backend)),
        );
        Relay::new(Arc::new(manager))
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut sent = Vec::new();
        while let Ok(message) = rx.try_recv() {
            sent.push(message);
        }
        sent
    }

    fn texts(sent: &[ServerMessage]) -> Vec<&str> {
        sent.iter()
            .filter_map(|m| match m {
                ServerMessage::Reply { text, .. } | ServerMessage::Edit { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_commands_and_text() {
        assert_eq!(
            ChannelEvent::parse(1, "/select 2"),
            ChannelEvent::Command {
                user_id: 1,
                command: Command::Select("2".into())
            }
        );
        assert_eq!(
            ChannelEvent::parse(1, "/start@relay_bot"),
            ChannelEvent::Command {
                user_id: 1,
                command: Command::Start
            }
        );
        assert_eq!(
            ChannelEvent::parse(1, "/dance"),
            ChannelEvent::Command {
                user_id: 1,
                command: Command::Unknown("dance".into())
            }
        );
        assert_eq!(
            ChannelEvent::parse(1, "hello /start"),
            ChannelEvent::Text {
                user_id: 1,
                text: "hello /start".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_streamed_reply_edits_placeholder() {
        let relay = relay(MockBackend::new().with_stream(vec![
            Ok(StreamEvent::delta("Hi ")),
            Ok(StreamEvent::delta("there")),
            Ok(StreamEvent::Done),
        ]));
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay
            .handle(ChannelEvent::parse(1, "hello"), &transport)
            .await
            .unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                ServerMessage::Reply { message_id: 1, text: PLACEHOLDER.into() },
                ServerMessage::Edit { message_id: 1, text: "Hi there".into() },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_stream_reports_no_reply() {
        let relay = relay(MockBackend::new().with_stream(vec![Ok(StreamEvent::Done)]));
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay.handle(ChannelEvent::parse(1, "hello"), &transport).await.unwrap();

        assert_eq!(texts(&drain(&mut rx)), vec![PLACEHOLDER, NO_REPLY]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_path_chunks_long_reply() {
        let long = "word ".repeat(30);
        let relay = relay(
            MockBackend::new()
                .with_statuses([RunStatus::Completed])
                .with_reply(long.trim()),
        )
        .with_streaming(false)
        .with_chunk_limit(50);
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay.handle(ChannelEvent::parse(1, "talk"), &transport).await.unwrap();

        let sent = drain(&mut rx);
        assert!(matches!(sent[1], ServerMessage::Edit { message_id: 1, .. }));
        let parts = texts(&sent);
        assert!(parts[1..].iter().all(|p| p.chars().count() <= 50));
        assert_eq!(parts[1..].join(" "), long.trim());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_is_answered_not_returned() {
        let relay = relay(MockBackend::new().with_statuses([RunStatus::Failed]))
            .with_streaming(false);
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay.handle(ChannelEvent::parse(1, "hello"), &transport).await.unwrap();

        let sent = drain(&mut rx);
        assert!(matches!(&sent[1], ServerMessage::Edit { text, .. } if text.starts_with("⚠️")));
    }

    #[tokio::test]
    async fn test_allow_list_rejects_strangers() {
        let backend = MockBackend::new();
        let relay = relay(backend).with_allowed_users([10]);
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay.handle(ChannelEvent::parse(11, "/start"), &transport).await.unwrap();

        assert_eq!(texts(&drain(&mut rx)), vec![ACCESS_DENIED]);
        assert!(relay.is_allowed(10));
    }

    #[tokio::test]
    async fn test_start_lists_bootstrapped_persona() {
        let relay = relay(MockBackend::new());
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay.handle(ChannelEvent::parse(1, "/start"), &transport).await.unwrap();

        let sent = drain(&mut rx);
        let text = texts(&sent)[0];
        assert!(text.starts_with(GREETING));
        assert!(text.contains("✅ 1. Assistant"));
    }

    #[tokio::test]
    async fn test_select_is_one_based_and_validated() {
        let relay = relay(MockBackend::new());
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay.handle(ChannelEvent::parse(1, "/personas"), &transport).await.unwrap();
        relay.handle(ChannelEvent::parse(1, "/select 1"), &transport).await.unwrap();
        relay.handle(ChannelEvent::parse(1, "/select 0"), &transport).await.unwrap();
        relay.handle(ChannelEvent::parse(1, "/select 4"), &transport).await.unwrap();

        let sent = drain(&mut rx);
        let replies = texts(&sent);
        assert_eq!(replies[1], "✅ Active assistant: Assistant");
        assert!(replies[2].starts_with("Usage:"));
        assert!(replies[3].contains("no assistant number 4"));
    }

    #[tokio::test]
    async fn test_reset_and_unknown_command() {
        let relay = relay(MockBackend::new());
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay.handle(ChannelEvent::parse(1, "/reset"), &transport).await.unwrap();
        relay.handle(ChannelEvent::parse(1, "/dance"), &transport).await.unwrap();

        let sent = drain(&mut rx);
        let replies = texts(&sent);
        assert_eq!(replies[0], RESET_DONE);
        assert!(replies[1].starts_with("Unknown command /dance."));
    }

    #[tokio::test]
    async fn test_schedule_without_provider_is_explained() {
        let relay = relay(MockBackend::new());
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay.handle(ChannelEvent::parse(1, "/schedule"), &transport).await.unwrap();

        assert_eq!(texts(&drain(&mut rx)), vec!["⚠️ Task lists are not connected."]);
    }

    #[tokio::test]
    async fn test_create_then_personas_shows_new_entry() {
        let relay = relay(MockBackend::new());
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay.handle(ChannelEvent::parse(1, "/create"), &transport).await.unwrap();
        relay.handle(ChannelEvent::parse(1, "/create Tutor"), &transport).await.unwrap();
        relay.handle(ChannelEvent::parse(1, "/personas"), &transport).await.unwrap();

        let sent = drain(&mut rx);
        let replies = texts(&sent);
        assert_eq!(replies[0], "Usage: /create <name>");
        assert!(replies[1].contains("Created assistant Tutor"));
        assert!(replies[2].contains("✅ 1. Assistant"));
        assert!(replies[2].contains("▫️ 2. Tutor"));
    }

    #[tokio::test]
    async fn test_files_are_listed() {
        let file = StoredFile {
            id: "file_9".into(),
            filename: "menu.csv".into(),
            bytes: 64,
            created_at: 0,
            purpose: "assistants".into(),
        };
        let relay = relay(MockBackend::new().with_files(vec![file]));
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay.handle(ChannelEvent::parse(1, "/files"), &transport).await.unwrap();

        assert_eq!(texts(&drain(&mut rx)), vec!["📂 menu.csv: id: file_9"]);
    }

    #[tokio::test]
    async fn test_no_files_is_explained() {
        let relay = relay(MockBackend::new());
        let (transport, mut rx) = ChannelTransport::unbounded();

        relay.handle(ChannelEvent::parse(1, "/files"), &transport).await.unwrap();

        assert_eq!(texts(&drain(&mut rx)), vec![NO_FILES]);
    }
}
