pub mod align;
pub mod cli;
pub mod commands;
pub mod config;
pub mod errors;
pub mod run_artifacts;
pub mod run_context;
pub mod session;
pub mod spikes;
pub mod video;
