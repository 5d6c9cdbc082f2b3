// Public API for integration tests and potential library usage

pub mod broadcast;
pub mod config;
pub mod history;
pub mod llm;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod state;
pub mod ws;
