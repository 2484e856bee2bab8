//! `al-domain`: error taxonomy and configuration shared by every AgentLink crate.

pub mod config;
pub mod error;
