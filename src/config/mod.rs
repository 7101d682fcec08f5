// Configuration management module
// TOML settings shared by the ingest, serve and chat commands

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ClientConfig, Config, ConfigError, OllamaConfig, RetrievalConfig, ServiceConfig,
    StorageConfig,
};
