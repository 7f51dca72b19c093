use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use teus_auth::config::AuthConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Token signing, lifetimes and revocation sweep
    #[serde(default)]
    pub auth: AuthConfig,
    /// Bootstrap configuration (initial admin user)
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Accepted values of `logging.level`.
pub const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {LOG_LEVELS:?}"));
        }
        // Auth validation
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        // Bootstrap validation
        if let Some(admin) = &self.bootstrap.admin_user {
            if admin.email.trim().is_empty() {
                return Err("bootstrap.admin_user.email must not be empty".into());
            }
            if admin.password.is_empty() {
                return Err("bootstrap.admin_user.password must not be empty".into());
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Bootstrap configuration for initial server setup
///
/// Admin credentials can also be set via environment variables:
/// - TEUS__BOOTSTRAP__ADMIN_USER__EMAIL
/// - TEUS__BOOTSTRAP__ADMIN_USER__PASSWORD
/// - TEUS__BOOTSTRAP__ADMIN_USER__FULL_NAME
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BootstrapConfig {
    /// If set, creates an admin user on startup (if not already present)
    #[serde(default)]
    pub admin_user: Option<AdminUserConfig>,
}

/// Configuration for bootstrapping an admin user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUserConfig {
    /// Admin email, used as the login subject
    pub email: String,
    /// Admin password in plain text (will be hashed)
    /// For security, prefer using TEUS__BOOTSTRAP__ADMIN_USER__PASSWORD env var
    pub password: String,
    #[serde(default = "default_admin_full_name")]
    pub full_name: String,
}

fn default_admin_full_name() -> String {
    "Super Admin".into()
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file, relative to the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "teus.toml";

    #[derive(Debug, thiserror::Error)]
    pub enum LoadError {
        #[error("config build error: {0}")]
        Build(#[source] config::ConfigError),
        #[error("config deserialize error: {0}")]
        Deserialize(#[source] config::ConfigError),
        #[error("invalid configuration: {0}")]
        Invalid(String),
    }

    /// Loads configuration from an optional TOML file plus `TEUS__*`
    /// environment overrides, then validates it.
    ///
    /// A missing file is not an error; defaults and the environment apply.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, LoadError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., TEUS__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("TEUS")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder.build().map_err(LoadError::Build)?;
        let merged: AppConfig = cfg.try_deserialize().map_err(LoadError::Deserialize)?;
        merged.validate().map_err(LoadError::Invalid)?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, LoadError> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.addr().port(), 8080);
        assert!(cfg.bootstrap.admin_user.is_none());
    }

    #[test]
    fn test_port_zero_rejected() {
        let mut cfg = AppConfig::default();
        cfg.server.port = 0;
        assert!(cfg.validate().unwrap_err().contains("server.port"));
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().unwrap_err().contains("logging.level"));

        cfg.logging.level = "DEBUG".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_auth_errors_are_prefixed() {
        let mut cfg = AppConfig::default();
        cfg.auth.issuer = String::new();
        assert!(cfg.validate().unwrap_err().starts_with("auth config error"));
    }

    #[test]
    fn test_admin_user_requires_password() {
        let mut cfg = AppConfig::default();
        cfg.bootstrap.admin_user = Some(AdminUserConfig {
            email: "super@teus.pt".into(),
            password: String::new(),
            full_name: "Super Admin".into(),
        });
        assert!(cfg.validate().unwrap_err().contains("password"));
    }

    #[test]
    fn test_invalid_host_falls_back_to_unspecified() {
        let mut cfg = AppConfig::default();
        cfg.server.host = "not-an-ip".into();
        assert!(cfg.addr().ip().is_unspecified());
    }
}
