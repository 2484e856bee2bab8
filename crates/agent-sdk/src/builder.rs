//! Builder pattern for constructing an [`AgentSession`].

use std::sync::Arc;

use al_domain::config::AgentConfig;
use al_domain::error::{Error, Result};
use al_protocol::ApiEndpoint;

use crate::consumer::MessageConsumer;
use crate::session::AgentSession;
use crate::token::{CredentialService, HttpCredentialService};
use crate::transport::Transport;
use crate::ws::WsTransport;

/// Fluent builder for [`AgentSession`].
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use al_agent_sdk::{AgentSessionBuilder, MessageConsumer, SessionHandle};
/// # use al_domain::config::AgentConfig;
/// struct Printer;
///
/// #[async_trait::async_trait]
/// impl MessageConsumer for Printer {
///     async fn on_message(&self, _session: &SessionHandle, message: String) {
///         println!("{message}");
///     }
/// }
///
/// # async fn run() -> al_domain::error::Result<()> {
/// let config = AgentConfig::load("agent.toml")?;
/// let session = AgentSessionBuilder::new(config)
///     .consumer(Arc::new(Printer))
///     .build()?;
/// session.start(None).await?;
/// # Ok(())
/// # }
/// ```
pub struct AgentSessionBuilder {
    config: AgentConfig,
    transport: Option<Arc<dyn Transport>>,
    credentials: Option<Arc<dyn CredentialService>>,
    consumer: Option<Arc<dyn MessageConsumer>>,
}

impl AgentSessionBuilder {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            transport: None,
            credentials: None,
            consumer: None,
        }
    }

    // ── Required ─────────────────────────────────────────────────────

    /// Set the consumer that receives inbound messages and events.
    pub fn consumer(mut self, consumer: Arc<dyn MessageConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    // ── Collaborators ────────────────────────────────────────────────

    /// Override the transport (default: [`WsTransport`]).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the token exchange (default: [`HttpCredentialService`]).
    pub fn credential_service(mut self, service: Arc<dyn CredentialService>) -> Self {
        self.credentials = Some(service);
        self
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.config.agent_id = Some(agent_id.into());
        self
    }

    pub fn refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.config.refresh_token = Some(refresh_token.into());
        self
    }

    /// Validate the configuration and spawn the session's tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<AgentSession> {
        let consumer = self
            .consumer
            .ok_or_else(|| Error::InvalidArgument("a message consumer is required".into()))?;
        let config = self.config.validated()?;
        let endpoint = ApiEndpoint::parse(&config.connection.api_endpoint)?;

        let transport = match self.transport {
            Some(t) => t,
            None => Arc::new(WsTransport::new(config.connection.network_timeout())),
        };
        let credentials = match self.credentials {
            Some(c) => c,
            None => Arc::new(HttpCredentialService::new(
                &endpoint,
                config.connection.http_timeout(),
            )?),
        };

        AgentSession::assemble(config, endpoint, transport, credentials, consumer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingConsumer;

    #[test]
    fn consumer_is_required() {
        let err = AgentSessionBuilder::new(AgentConfig::default())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn build_outside_runtime_is_invalid_state() {
        let (consumer, _m, _e) = RecordingConsumer::new();
        let err = AgentSessionBuilder::new(AgentConfig::default())
            .consumer(consumer)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn bad_endpoint_is_rejected() {
        let mut config = AgentConfig::default();
        config.connection.api_endpoint = "ftp://nowhere".into();
        let (consumer, _m, _e) = RecordingConsumer::new();
        let err = AgentSessionBuilder::new(config)
            .consumer(consumer)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn identity_setters_feed_the_session() {
        let (consumer, _m, _e) = RecordingConsumer::new();
        let session = AgentSessionBuilder::new(AgentConfig::default())
            .agent_id("agent-7")
            .refresh_token("r")
            .consumer(consumer)
            .build()
            .unwrap();
        assert_eq!(session.handle().agent_id().as_deref(), Some("agent-7"));
        session.deinitialize().await;
    }
}
