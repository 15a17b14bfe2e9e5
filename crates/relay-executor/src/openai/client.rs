//! HTTP client for the Assistants API.

use async_trait::async_trait;
use relay_core::{
    Persona, PersonaParams, Run, StoredFile, Thread, ThreadMessage,
    stream::RunStream,
    traits::{BackendError, CompletionBackend},
};
use reqwest::{
    RequestBuilder, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;

use super::{
    protocol::event_stream,
    types::{
        AssistantObject, CreateAssistant, CreateMessage, CreateRun, ErrorEnvelope, FileObject,
        MessageObject, Page, RunObject, ThreadObject,
    },
};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Messages fetched per reply lookup; a run rarely writes more than one.
const RUN_MESSAGE_PAGE: &str = "20";

/// Page size of the assistants listing, the API maximum.
const ASSISTANT_PAGE: &str = "100";

/// Completion backend speaking the OpenAI Assistants v2 API.
#[derive(Debug, Clone)]
pub struct OpenAiAssistants {
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiAssistants {
    /// Create a client for `base_url` authenticated with `api_key`.
    ///
    /// # Errors
    /// Returns error if the key is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: &str) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| BackendError::Transport(format!("invalid API key: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("assistants=v2"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(%status, "assistants API error response");
        Err(api_error(status, &body))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let bytes = self
            .send(request)
            .await?
            .bytes()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

/// Map a non-2xx response to a backend error, preferring the API's own message.
fn api_error(status: StatusCode, body: &str) -> BackendError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.trim().to_string()
            }
        });
    BackendError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl CompletionBackend for OpenAiAssistants {
    async fn create_thread(&self) -> Result<Thread, BackendError> {
        let thread: ThreadObject = self
            .json(self.http.post(self.url("threads")).json(&serde_json::json!({})))
            .await?;
        tracing::info!(thread_id = %thread.id, "created thread");
        Ok(thread.into())
    }

    async fn create_assistant(&self, params: &PersonaParams) -> Result<Persona, BackendError> {
        let assistant: AssistantObject = self
            .json(
                self.http
                    .post(self.url("assistants"))
                    .json(&CreateAssistant::from(params)),
            )
            .await?;
        tracing::info!(assistant_id = %assistant.id, "created assistant");
        Ok(assistant.into())
    }

    async fn create_message(&self, thread_id: &str, text: &str) -> Result<(), BackendError> {
        self.send(
            self.http
                .post(self.url(&format!("threads/{thread_id}/messages")))
                .json(&CreateMessage {
                    role: "user",
                    content: text,
                }),
        )
        .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, persona_id: &str) -> Result<Run, BackendError> {
        let run: RunObject = self
            .json(
                self.http
                    .post(self.url(&format!("threads/{thread_id}/runs")))
                    .json(&CreateRun {
                        assistant_id: persona_id,
                        stream: false,
                    }),
            )
            .await?;
        Ok(run.into())
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, BackendError> {
        let run: RunObject = self
            .json(
                self.http
                    .get(self.url(&format!("threads/{thread_id}/runs/{run_id}"))),
            )
            .await?;
        Ok(run.into())
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), BackendError> {
        self.send(
            self.http
                .post(self.url(&format!("threads/{thread_id}/runs/{run_id}/cancel"))),
        )
        .await?;
        Ok(())
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Vec<ThreadMessage>, BackendError> {
        // Newest first so long threads cannot push the reply off the page.
        let page: Page<MessageObject> = self
            .json(
                self.http
                    .get(self.url(&format!("threads/{thread_id}/messages")))
                    .query(&[
                        ("order", "desc"),
                        ("limit", RUN_MESSAGE_PAGE),
                        ("run_id", run_id),
                    ]),
            )
            .await?;
        Ok(page.data.into_iter().rev().map(ThreadMessage::from).collect())
    }

    async fn stream_run(&self, thread_id: &str, persona_id: &str) -> Result<RunStream, BackendError> {
        let response = self
            .send(
                self.http
                    .post(self.url(&format!("threads/{thread_id}/runs")))
                    .header(ACCEPT, "text/event-stream")
                    .json(&CreateRun {
                        assistant_id: persona_id,
                        stream: true,
                    }),
            )
            .await?;
        Ok(event_stream(response.bytes_stream()))
    }

    async fn list_assistants(&self) -> Result<Vec<Persona>, BackendError> {
        let mut personas = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(self.url("assistants"))
                .query(&[("order", "asc"), ("limit", ASSISTANT_PAGE)]);
            if let Some(cursor) = &after {
                request = request.query(&[("after", cursor.as_str())]);
            }
            let page: Page<AssistantObject> = self.json(request).await?;
            let has_more = page.has_more;
            after = page.data.last().map(|a| a.id.clone());
            personas.extend(page.data.into_iter().map(Persona::from));
            if !has_more || after.is_none() {
                break;
            }
        }
        tracing::debug!(count = personas.len(), "listed assistants");
        Ok(personas)
    }

    async fn list_files(&self) -> Result<Vec<StoredFile>, BackendError> {
        let page: Page<FileObject> = self.json(self.http.get(self.url("files"))).await?;
        Ok(page.data.into_iter().map(StoredFile::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    use super::*;

    /// Answer one request per body with a canned JSON response, in order.
    ///
    /// Resolves to the request lines received.
    async fn serve(bodies: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for body in bodies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut head = Vec::new();
                let mut buf = [0_u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                let line = String::from_utf8_lossy(&head).lines().next().unwrap_or_default().to_string();
                requests.push(line);

                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            requests
        });
        (format!("http://{addr}/v1"), handle)
    }

    fn message(id: &str, created_at: i64, text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "object": "thread.message",
            "created_at": created_at,
            "role": "assistant",
            "run_id": "run_7",
            "content": [{ "type": "text", "text": { "value": text, "annotations": [] } }]
        })
    }

    #[tokio::test]
    async fn test_list_messages_asks_for_newest_of_run() {
        let body = serde_json::json!({
            "object": "list",
            "data": [message("msg_102", 102, "second"), message("msg_101", 101, "first")],
            "has_more": true
        });
        let (base_url, server) = serve(vec![body.to_string()]).await;
        let client = OpenAiAssistants::new(base_url, "sk-test").unwrap();

        let messages = client.list_messages("thread_1", "run_7").await.unwrap();

        let requests = server.await.unwrap();
        assert_eq!(
            requests,
            vec!["GET /v1/threads/thread_1/messages?order=desc&limit=20&run_id=run_7 HTTP/1.1"]
        );
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["msg_101", "msg_102"]);
    }

    #[tokio::test]
    async fn test_list_assistants_follows_cursor() {
        let assistant = |id: &str| {
            serde_json::json!({ "id": id, "object": "assistant", "name": id, "model": "gpt-4o", "created_at": 1 })
        };
        let first = serde_json::json!({ "data": [assistant("asst_a"), assistant("asst_b")], "has_more": true });
        let second = serde_json::json!({ "data": [assistant("asst_c")], "has_more": false });
        let (base_url, server) = serve(vec![first.to_string(), second.to_string()]).await;
        let client = OpenAiAssistants::new(base_url, "sk-test").unwrap();

        let personas = client.list_assistants().await.unwrap();

        let requests = server.await.unwrap();
        assert_eq!(requests[1], "GET /v1/assistants?order=asc&limit=100&after=asst_b HTTP/1.1");
        let ids: Vec<&str> = personas.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["asst_a", "asst_b", "asst_c"]);
        assert!(personas.iter().all(|p| !p.activated));
    }

    #[tokio::test]
    async fn test_list_files() {
        let body = r#"{"object":"list","data":[{"id":"file-1","object":"file","bytes":42,"created_at":5,"filename":"notes.txt","purpose":"assistants"}]}"#;
        let (base_url, server) = serve(vec![body.to_string()]).await;
        let client = OpenAiAssistants::new(base_url, "sk-test").unwrap();

        let files = client.list_files().await.unwrap();

        assert_eq!(server.await.unwrap(), vec!["GET /v1/files HTTP/1.1"]);
        assert_eq!(files[0].filename, "notes.txt");
    }

    #[test]
    fn test_api_error_prefers_envelope_message() {
        let err = api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#,
        );
        assert!(matches!(
            err,
            BackendError::Api { status: 401, ref message } if message == "Incorrect API key provided"
        ));
    }

    #[test]
    fn test_api_error_falls_back_to_body_or_reason() {
        let err = api_error(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert!(matches!(err, BackendError::Api { status: 502, ref message } if message == "upstream down"));

        let err = api_error(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, BackendError::Api { status: 429, ref message } if message == "Too Many Requests"));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = OpenAiAssistants::new("http://localhost:8080/v1/", "sk-test").unwrap();
        assert_eq!(client.url("threads/t1/runs"), "http://localhost:8080/v1/threads/t1/runs");
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let err = OpenAiAssistants::new(DEFAULT_BASE_URL, "bad\nkey").unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }
}
