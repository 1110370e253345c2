pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod engine;
pub mod filter;
pub mod fs_error;
pub mod handlers;
pub mod humanize;
pub mod naming;
pub mod observability;
pub mod queue;
pub mod scavenger;
pub mod status;
