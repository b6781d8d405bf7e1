pub mod adapters;
pub mod assembler;
pub mod config;
pub mod orchestrator;
pub mod prediction;
pub mod server;
