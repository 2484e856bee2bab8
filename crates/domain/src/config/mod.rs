mod connection;
mod conversation;

pub use connection::*;
pub use conversation::*;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a session needs at initialization.
///
/// `agent_id` and `refresh_token` may be left unset here and supplied
/// later through the session's `set_identity` / `set_credential`; both
/// must be present before the session is started.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub token: TokenConfig,
}

impl AgentConfig {
    /// Parse a TOML document.  Missing sections fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("parsing agent config: {e}")))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Validate the whole configuration, normalizing the conversation block
    /// so that audio parameters exist if and only if the mode is speech.
    pub fn validated(mut self) -> Result<Self> {
        self.conversation = self.conversation.validated()?;
        self.connection.validate()?;
        self.token.validate()?;
        if matches!(self.agent_id.as_deref(), Some("")) {
            return Err(Error::InvalidArgument("agent_id must not be empty".into()));
        }
        if matches!(self.refresh_token.as_deref(), Some("")) {
            return Err(Error::InvalidArgument("refresh_token must not be empty".into()));
        }
        Ok(self)
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("agent_id", &self.agent_id)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("conversation", &self.conversation)
            .field("connection", &self.connection)
            .field("token", &self.token)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
