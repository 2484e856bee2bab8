//! Agent protocol: the control messages the connection core itself produces
//! or recognises, plus endpoint construction.
//!
//! Everything else that travels over the socket (agent replies, tool calls,
//! tool results) is opaque to the core and belongs to the message consumer.

mod endpoint;

pub use endpoint::ApiEndpoint;

use al_domain::config::{AudioConfig, AudioFormat, ConversationConfig, ConversationMode};
use al_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Control message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Client → Agent: first message after the transport connects.
    #[serde(rename = "conversation_init")]
    ConversationInit {
        conversation_type: ConversationMode,
        /// Present only when resuming an earlier conversation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        /// Present only in speech mode.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<AudioNegotiation>,
    },

    /// Agent → Client: handshake accepted.
    #[serde(rename = "conversation_init_ack")]
    ConversationInitAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
}

/// Audio parameters for both directions of a speech conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioNegotiation {
    pub upload: AudioParams,
    pub download: AudioParams,
}

/// Wire form of [`AudioConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioParams {
    pub format: AudioFormat,
    pub sample_rate: u16,
    pub frame_duration: u8,
}

impl From<&AudioConfig> for AudioParams {
    fn from(cfg: &AudioConfig) -> Self {
        Self {
            format: cfg.format,
            sample_rate: cfg.sample_rate,
            frame_duration: cfg.frame_duration_ms,
        }
    }
}

impl ControlMessage {
    /// Build the handshake for a conversation, optionally resuming `conversation_id`.
    pub fn handshake(conversation: &ConversationConfig, conversation_id: Option<&str>) -> Self {
        let audio = match (
            conversation.mode,
            &conversation.upload_audio,
            &conversation.download_audio,
        ) {
            (ConversationMode::Speech, Some(up), Some(down)) => Some(AudioNegotiation {
                upload: up.into(),
                download: down.into(),
            }),
            _ => None,
        };
        ControlMessage::ConversationInit {
            conversation_type: conversation.mode,
            conversation_id: conversation_id.map(str::to_owned),
            audio,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Protocol(format!("serializing control message: {e}")))
    }
}

/// Handshake acknowledgement as seen by a message consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeAck {
    pub conversation_id: Option<String>,
}

/// Recognise a handshake acknowledgement in a complete inbound message.
///
/// Returns `None` for every other message, including malformed ones.
pub fn as_handshake_ack(text: &str) -> Option<HandshakeAck> {
    match serde_json::from_str::<ControlMessage>(text) {
        Ok(ControlMessage::ConversationInitAck { conversation_id }) => {
            Some(HandshakeAck { conversation_id })
        }
        _ => None,
    }
}
