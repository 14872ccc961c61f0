//! Mailpilot — unattended email auto-reply agent.

pub mod agent;
pub mod config;
pub mod error;
pub mod generator;
pub mod logbook;
pub mod mailbox;
pub mod pipeline;
