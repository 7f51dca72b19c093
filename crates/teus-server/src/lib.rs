pub mod accounts;
pub mod bootstrap;
pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;

pub use accounts::{UserAccounts, UserView};
pub use config::{AdminUserConfig, AppConfig, BootstrapConfig, LoggingConfig, ServerConfig};
pub use observability::{apply_logging_level, init_tracing};
pub use server::{AppState, ServerBuilder, TeusServer, build_app, build_state};
