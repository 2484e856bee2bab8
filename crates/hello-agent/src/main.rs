//! Reference device client for the agent service.
//!
//! Opens a session with the agent named in the config file, acknowledges
//! the conversation handshake, logs every message it receives and answers
//! `tool_call` requests from its local tool registry:
//!
//! - `device.ping`: reply with a pong and the client's uptime
//! - `device.echo`: echo the arguments back
//!
//! Disconnects are followed by a paced reconnect until Ctrl-C.
//!
//! Usage:
//!   al-hello-agent --config agent.toml
//!
//! Env vars:
//!   AL_CONFIG        : config file path (default: "agent.toml")
//!   AL_AGENT_ID      : overrides `agent_id` from the config file
//!   AL_REFRESH_TOKEN : overrides `refresh_token` from the config file

use std::sync::Arc;
use std::time::{Duration, Instant};

use al_agent_sdk::{
    as_handshake_ack, AgentConfig, AgentEvent, AgentSessionBuilder, LocalTool, MessageConsumer,
    ReconnectBackoff, SessionHandle, ToolContext, ToolError, ToolResult,
};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// How long a tool reply may wait for room in the outbound queue.
const REPLY_WAIT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "al-hello-agent", version, about)]
struct Cli {
    /// Path to the agent config file.
    #[arg(long, env = "AL_CONFIG", default_value = "agent.toml")]
    config: String,

    /// Resume an existing conversation on the first connect.
    #[arg(long)]
    resume: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = AgentConfig::load(&cli.config)?;
    if let Ok(agent_id) = std::env::var("AL_AGENT_ID") {
        config.agent_id = Some(agent_id);
    }
    if let Ok(refresh_token) = std::env::var("AL_REFRESH_TOKEN") {
        config.refresh_token = Some(refresh_token);
    }
    tracing::info!(config = ?config, "loaded agent config");

    let (link_tx, mut link_rx) = mpsc::unbounded_channel();
    let session = AgentSessionBuilder::new(config)
        .consumer(Arc::new(HelloConsumer { link: link_tx }))
        .build()?;
    let handle = session.handle();
    handle.register_tool("device.ping", Ping { started: Instant::now() })?;
    handle.register_tool("device.echo", Echo)?;
    tracing::info!(tools = ?handle.tool_names(), "local tools registered");

    let mut schedule = ReconnectBackoff::default().schedule();
    let mut resume = cli.resume;

    'outer: loop {
        match session.start(resume.take().as_deref()).await {
            Ok(()) => {
                // Wait for the connection to come up and, later, go down.
                loop {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => break 'outer,
                        link = link_rx.recv() => match link {
                            Some(Link::Up) => schedule.reset(),
                            Some(Link::Down) => break,
                            None => break 'outer,
                        },
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "start failed"),
        }

        let Some(delay) = schedule.next_delay() else {
            tracing::error!(attempts = schedule.attempts(), "giving up on reconnect");
            break;
        };
        tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::info!("shutting down");
    session.deinitialize().await;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,al_agent_sdk=debug"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

// ── Consumer ─────────────────────────────────────────────────────────

enum Link {
    Up,
    Down,
}

struct HelloConsumer {
    link: mpsc::UnboundedSender<Link>,
}

#[async_trait::async_trait]
impl MessageConsumer for HelloConsumer {
    async fn on_message(&self, session: &SessionHandle, message: String) {
        if let Some(ack) = as_handshake_ack(&message) {
            let acked = match ack.conversation_id.as_deref() {
                Some(id) => session.acknowledge_handshake_with(id),
                None => session.acknowledge_handshake(),
            };
            match acked {
                Ok(()) => {
                    tracing::info!(conversation_id = ?ack.conversation_id, "conversation ready");
                    let _ = self.link.send(Link::Up);
                }
                Err(e) => tracing::warn!(error = %e, "unexpected handshake acknowledgement"),
            }
            return;
        }

        let parsed: serde_json::Value = match serde_json::from_str(&message) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed message");
                return;
            }
        };
        match parsed.get("type").and_then(|t| t.as_str()) {
            Some("tool_call") => handle_tool_call(session, &parsed).await,
            Some(kind) => tracing::info!(kind, message = %message, "agent message"),
            None => tracing::debug!(message = %message, "untyped message"),
        }
    }

    fn on_event(&self, _session: &SessionHandle, event: AgentEvent) {
        match event {
            AgentEvent::Connected => tracing::info!("connected"),
            AgentEvent::Disconnected => {
                tracing::info!("disconnected");
                let _ = self.link.send(Link::Down);
            }
            AgentEvent::Audio(frame) => tracing::debug!(bytes = frame.len(), "audio frame"),
        }
    }
}

async fn handle_tool_call(session: &SessionHandle, call: &serde_json::Value) {
    let call_id = call.get("call_id").and_then(|v| v.as_str()).unwrap_or_default();
    let name = call.get("name").and_then(|v| v.as_str()).unwrap_or_default();
    let args = call.get("arguments").cloned().unwrap_or(serde_json::Value::Null);
    tracing::info!(call_id, tool = name, "tool_call");

    let outcome = match session.lookup_tool(name) {
        Some(tool) => tool.call(ToolContext::new(call_id, name), args).await,
        None => Err(ToolError::Failed(format!("unknown tool {name:?}"))),
    };
    let reply = match outcome {
        Ok(result) => serde_json::json!({
            "type": "tool_result",
            "call_id": call_id,
            "success": true,
            "result": result,
        }),
        Err(e) => serde_json::json!({
            "type": "tool_result",
            "call_id": call_id,
            "success": false,
            "error": e.to_string(),
        }),
    };
    if let Err(e) = session.send_text(&reply.to_string(), Some(REPLY_WAIT)).await {
        tracing::warn!(call_id, error = %e, "failed to queue tool_result");
    }
}

// ── Tools ────────────────────────────────────────────────────────────

struct Ping {
    started: Instant,
}

#[async_trait::async_trait]
impl LocalTool for Ping {
    async fn call(&self, _ctx: ToolContext, _args: serde_json::Value) -> ToolResult {
        Ok(serde_json::json!({
            "pong": true,
            "uptime_ms": self.started.elapsed().as_millis() as u64,
        }))
    }
}

struct Echo;

#[async_trait::async_trait]
impl LocalTool for Echo {
    async fn call(&self, _ctx: ToolContext, args: serde_json::Value) -> ToolResult {
        if args.is_null() {
            return Err(ToolError::InvalidArgs("nothing to echo".into()));
        }
        Ok(serde_json::json!({ "echo": args }))
    }
}
