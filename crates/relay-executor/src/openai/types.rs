//! Assistants API wire types.

use relay_core::{
    Persona, PersonaParams, Role, Run, RunStatus, StoredFile, Thread, ThreadMessage,
    persona::{ToolConfig, ToolResources},
    thread::RunFailure,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool entry as the API spells it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireTool {
    CodeInterpreter,
    FileSearch,
    Function { function: FunctionSpec },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

impl From<&ToolConfig> for WireTool {
    fn from(tool: &ToolConfig) -> Self {
        match tool {
            ToolConfig::CodeInterpreter => Self::CodeInterpreter,
            ToolConfig::FileSearch => Self::FileSearch,
            ToolConfig::Function {
                name,
                description,
                parameters,
            } => Self::Function {
                function: FunctionSpec {
                    name: name.clone(),
                    description: description.clone(),
                    parameters: parameters.clone(),
                },
            },
        }
    }
}

impl From<WireTool> for ToolConfig {
    fn from(tool: WireTool) -> Self {
        match tool {
            WireTool::CodeInterpreter => Self::CodeInterpreter,
            WireTool::FileSearch => Self::FileSearch,
            WireTool::Function { function } => Self::Function {
                name: function.name,
                description: function.description,
                parameters: function.parameters,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WireToolResources {
    #[serde(default)]
    pub code_interpreter: Option<FileIds>,
    #[serde(default)]
    pub file_search: Option<VectorStoreIds>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileIds {
    #[serde(default)]
    pub file_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VectorStoreIds {
    #[serde(default)]
    pub vector_store_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ThreadObject {
    pub id: String,
    pub created_at: i64,
    #[serde(default)]
    pub tool_resources: Option<WireToolResources>,
}

impl From<ThreadObject> for Thread {
    fn from(thread: ThreadObject) -> Self {
        Self {
            id: thread.id,
            created_at: thread.created_at,
            vector_store_ids: thread
                .tool_resources
                .and_then(|r| r.file_search)
                .map(|f| f.vector_store_ids)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateAssistant<'a> {
    pub name: &'a str,
    pub instructions: &'a str,
    pub model: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
}

impl<'a> From<&'a PersonaParams> for CreateAssistant<'a> {
    fn from(params: &'a PersonaParams) -> Self {
        Self {
            name: &params.name,
            instructions: &params.instructions,
            model: &params.model,
            tools: params.tools.iter().map(WireTool::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssistantObject {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    pub model: String,
    #[serde(default)]
    pub tools: Vec<WireTool>,
    #[serde(default)]
    pub tool_resources: Option<WireToolResources>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    pub created_at: i64,
}

impl From<AssistantObject> for Persona {
    fn from(assistant: AssistantObject) -> Self {
        let resources = assistant.tool_resources.unwrap_or_default();
        Self {
            id: assistant.id,
            name: assistant.name.unwrap_or_default(),
            description: assistant.description,
            instructions: assistant.instructions.unwrap_or_default(),
            model: assistant.model,
            tools: assistant.tools.into_iter().map(ToolConfig::from).collect(),
            tool_resources: ToolResources {
                code_interpreter_file_ids: resources
                    .code_interpreter
                    .map(|c| c.file_ids)
                    .unwrap_or_default(),
                file_search_vector_store_ids: resources
                    .file_search
                    .map(|f| f.vector_store_ids)
                    .unwrap_or_default(),
            },
            temperature: assistant.temperature,
            top_p: assistant.top_p,
            created_at: assistant.created_at,
            activated: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreateRun<'a> {
    pub assistant_id: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct RunObject {
    pub id: String,
    pub thread_id: String,
    pub assistant_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunFailure>,
}

impl From<RunObject> for Run {
    fn from(run: RunObject) -> Self {
        Self {
            id: run.id,
            thread_id: run.thread_id,
            assistant_id: run.assistant_id,
            status: run.status,
            last_error: run.last_error,
        }
    }
}

/// One content part of a message; only text parts carry anything we keep.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct TextValue {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageObject {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub run_id: Option<String>,
    pub created_at: i64,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

impl From<MessageObject> for ThreadMessage {
    fn from(message: MessageObject) -> Self {
        Self {
            id: message.id,
            role: message.role,
            run_id: message.run_id,
            created_at: message.created_at,
            text: message
                .content
                .into_iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.value),
                    ContentPart::Other => None,
                })
                .collect(),
        }
    }
}

/// A page of a list endpoint.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct FileObject {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub bytes: u64,
    pub created_at: i64,
    #[serde(default)]
    pub purpose: String,
}

impl From<FileObject> for StoredFile {
    fn from(file: FileObject) -> Self {
        Self {
            id: file.id,
            filename: file.filename,
            bytes: file.bytes,
            created_at: file.created_at,
            purpose: file.purpose,
        }
    }
}

/// Payload of a `thread.message.delta` event.
#[derive(Debug, Deserialize)]
pub struct MessageDeltaEvent {
    pub delta: MessageDelta,
}

#[derive(Debug, Deserialize)]
pub struct MessageDelta {
    #[serde(default)]
    pub content: Vec<DeltaPart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeltaPart {
    Text {
        #[serde(default)]
        text: Option<TextValue>,
    },
    #[serde(other)]
    Other,
}

impl MessageDeltaEvent {
    /// Concatenated text of all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.delta
            .content
            .iter()
            .filter_map(|part| match part {
                DeltaPart::Text { text } => text.as_ref().map(|t| t.value.as_str()),
                DeltaPart::Other => None,
            })
            .collect()
    }
}

/// Error envelope of non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
