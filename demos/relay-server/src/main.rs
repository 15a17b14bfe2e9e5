//! WebSocket relay server in front of an OpenAI Assistants backend.
//!
//! Run with: OPENAI_API_KEY=... cargo run -p relay-server
//!
//! Configuration is read from the TOML file named by `RELAY_CONFIG`, or
//! defaults when unset. Clients connect to `ws://<bind>/ws?token=<token>`
//! with a token listed under `[server.tokens]`; open the page as
//! `http://<bind>/?token=<token>`.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::{Router, response::Html, routing::get};
use relay_core::RelayConfig;
use relay_executor::OpenAiAssistants;
use relay_session::{ConversationManager, storage::JsonFileStorage};
use relay_transport::{Relay, websocket::create_ws_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match std::env::var_os("RELAY_CONFIG") {
        Some(path) => RelayConfig::load(&PathBuf::from(path))?,
        None => RelayConfig::default(),
    };

    let api_key = std::env::var(&config.backend.api_key_env)
        .with_context(|| format!("{} is not set", config.backend.api_key_env))?;
    let backend = Arc::new(OpenAiAssistants::new(&config.backend.base_url, &api_key)?);
    let storage = Arc::new(JsonFileStorage::new(&config.storage.dir));
    tracing::info!(dir = %config.storage.dir.display(), "storing sessions");

    let manager = Arc::new(ConversationManager::from_config(storage, backend, &config));
    let relay = Arc::new(Relay::from_config(manager, &config));

    if config.server.tokens.is_empty() {
        tracing::warn!("no [server.tokens] configured, every WebSocket client will be refused");
    }

    let app = Router::new()
        .route("/", get(index_handler))
        .merge(create_ws_router(relay, config.server.tokens.clone()));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!("Server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Assistant Relay</title>
    <style>
        body { margin: 0; padding: 20px; background: #1e1e1e; color: #d4d4d4; font-family: system-ui, sans-serif; }
        #log { white-space: pre-wrap; height: calc(100vh - 140px); overflow-y: auto; }
        .msg { border-bottom: 1px solid #333; padding: 6px 0; }
        .me { color: #8ab4f8; }
        .status { color: #888; font-size: 14px; margin-bottom: 10px; }
        input { width: 80%; padding: 6px; }
    </style>
</head>
<body>
    <div class="status" id="status">Connecting...</div>
    <div id="log"></div>
    <input id="text" placeholder="Message or /start, /reset, /personas, /select n, /schedule" />
    <script>
        const token = new URLSearchParams(window.location.search).get('token') || '';
        const log = document.getElementById('log');
        const status = document.getElementById('status');
        const nodes = new Map();
        let ws;

        function add(text, cls) {
            const div = document.createElement('div');
            div.className = 'msg ' + (cls || '');
            div.textContent = text;
            log.appendChild(div);
            log.scrollTop = log.scrollHeight;
            return div;
        }

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws?token=${encodeURIComponent(token)}`);
            ws.onopen = () => { status.textContent = 'Connected'; };
            ws.onclose = () => { status.textContent = 'Disconnected - reconnecting...'; setTimeout(connect, 2000); };
            ws.onmessage = (event) => {
                const msg = JSON.parse(event.data);
                if (msg.type === 'reply') {
                    nodes.set(msg.message_id, add(msg.text));
                } else if (msg.type === 'edit' && nodes.has(msg.message_id)) {
                    nodes.get(msg.message_id).textContent = msg.text;
                } else if (msg.type === 'delete' && nodes.has(msg.message_id)) {
                    nodes.get(msg.message_id).remove();
                    nodes.delete(msg.message_id);
                } else if (msg.type === 'error') {
                    add(`[Error: ${msg.message}]`);
                }
            };
        }

        document.getElementById('text').addEventListener('keydown', (e) => {
            if (e.key !== 'Enter' || !e.target.value.trim()) return;
            ws.send(JSON.stringify({ type: 'text', text: e.target.value }));
            add(e.target.value, 'me');
            e.target.value = '';
        });

        connect();
    </script>
</body>
</html>
"#;
