mod client;
mod registrar;

pub use client::{ChatClient, LoggingClient};
pub use registrar::{CommandRegistrar, LoggingRegistrar};
