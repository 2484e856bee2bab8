use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    #[default]
    Text,
    Speech,
}

impl ConversationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationMode::Text => "text",
            ConversationMode::Speech => "speech",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Pcm,
    Opus,
}

/// Audio parameters for one direction of a speech conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub format: AudioFormat,
    /// Sample rate in Hz (e.g. 8000, 16000).
    pub sample_rate: u16,
    /// Frame duration in ms (e.g. 20, 40, 60).
    pub frame_duration_ms: u8,
}

impl AudioConfig {
    fn validate(&self, direction: &str) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidArgument(format!(
                "{direction} audio sample_rate must be positive"
            )));
        }
        if self.frame_duration_ms == 0 {
            return Err(Error::InvalidArgument(format!(
                "{direction} audio frame_duration_ms must be positive"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConversationConfig {
    #[serde(default)]
    pub mode: ConversationMode,
    #[serde(default)]
    pub upload_audio: Option<AudioConfig>,
    #[serde(default)]
    pub download_audio: Option<AudioConfig>,
}

impl ConversationConfig {
    pub fn text() -> Self {
        Self::default()
    }

    pub fn speech(upload: AudioConfig, download: AudioConfig) -> Self {
        Self {
            mode: ConversationMode::Speech,
            upload_audio: Some(upload),
            download_audio: Some(download),
        }
    }

    /// Check that speech mode carries both audio parameter sets.
    pub fn validate(&self) -> Result<()> {
        if self.mode != ConversationMode::Speech {
            return Ok(());
        }
        match (&self.upload_audio, &self.download_audio) {
            (Some(up), Some(down)) => {
                up.validate("upload")?;
                down.validate("download")
            }
            _ => Err(Error::InvalidArgument(
                "audio configuration is required for speech conversation".into(),
            )),
        }
    }

    /// Validate, then drop audio parameters a text conversation never uses.
    pub fn validated(mut self) -> Result<Self> {
        self.validate()?;
        if self.mode == ConversationMode::Text {
            self.upload_audio = None;
            self.download_audio = None;
        }
        Ok(self)
    }
}
