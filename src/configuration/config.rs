use super::types::*;
use crate::error_handling::types::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Application configuration structure that defines all runtime parameters.
///
/// Loaded from a TOML file with [`Config::from_file`]. Every field has a default, so an empty
/// file (or no file at all, see [`Config::default`]) yields a working honeypot with FTP on 21,
/// SSH on 20022 and HTTP on 8080.
///
/// # Examples
///
/// ```
/// use leurre::configuration::config::Config;
///
/// let config = Config::from_toml_str("[ftp]\nport = 2121\n").unwrap();
/// assert_eq!(config.ftp.port, 2121);
/// assert_eq!(config.http.port, 8080);
/// ```
///
/// # Fields Overview
///
/// - `bind_address`: IP address every listener binds to
/// - `session_timeout_secs`: idle time after which a session is closed, `0` disables it
/// - `shutdown_grace_secs`: time in-flight sessions get to finish once shutdown starts
/// - `max_sessions`: concurrent sessions accepted per listener
/// - `history_limit`: commands kept per session, oldest evicted first
/// - `ftp`, `ssh`, `http`: per-protocol listener settings
/// - `rate_limit`: token bucket shared by the HTTP routes
/// - `audit`: where audit events go
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub session_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub max_sessions: usize,
    pub history_limit: usize,
    pub ftp: FtpConfig,
    pub ssh: SshConfig,
    pub http: HttpConfig,
    pub rate_limit: RateLimitConfig,
    pub audit: AuditConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0"),
            session_timeout_secs: 300,
            shutdown_grace_secs: 10,
            max_sessions: 1024,
            history_limit: 256,
            ftp: FtpConfig::default(),
            ssh: SshConfig::default(),
            http: HttpConfig::default(),
            rate_limit: RateLimitConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::IoError`] if the file cannot be read
    /// - [`ConfigError::TomlError`] if it is not valid TOML for this structure
    /// - any validation error from [`Config::validate`]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_ip()?;

        let services = self.enabled_services();
        if services.is_empty() {
            return Err(ConfigError::ServicesEmpty(
                "at least one of ftp, ssh or http must be enabled".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (protocol, port) in &services {
            if *port == 0 {
                return Err(ConfigError::BadPortsRange(format!(
                    "{} port must be between 1 and 65535",
                    protocol
                )));
            }
            if !seen.insert(*port) {
                return Err(ConfigError::BadPortsRange(format!(
                    "port {} is used by more than one service",
                    port
                )));
            }
        }

        if self.rate_limit.burst_capacity == 0 {
            return Err(ConfigError::NotInRange(
                "rate_limit.burst_capacity must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.refill_interval_ms == 0 {
            return Err(ConfigError::NotInRange(
                "rate_limit.refill_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.audit.emit_timeout_ms == 0 {
            return Err(ConfigError::NotInRange(
                "audit.emit_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.audit.queue_capacity == 0 || self.max_sessions == 0 || self.history_limit == 0 {
            return Err(ConfigError::NotInRange(
                "audit.queue_capacity, max_sessions and history_limit must be at least 1"
                    .to_string(),
            ));
        }
        if self.ssh.max_auth_attempts == Some(0) {
            return Err(ConfigError::NotInRange(
                "ssh.max_auth_attempts must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::BadIPFormatting(self.bind_address.clone()))
    }

    /// Enabled services with their ports, in start-up order.
    pub fn enabled_services(&self) -> Vec<(Protocol, u16)> {
        let mut services = Vec::new();
        if self.ftp.enabled {
            services.push((Protocol::Ftp, self.ftp.port));
        }
        if self.ssh.enabled {
            services.push((Protocol::Ssh, self.ssh.port));
        }
        if self.http.enabled {
            services.push((Protocol::Http, self.http.port));
        }
        services
    }

    pub fn listen_addr(&self, protocol: Protocol) -> Result<SocketAddr, ConfigError> {
        let port = match protocol {
            Protocol::Ftp => self.ftp.port,
            Protocol::Ssh => self.ssh.port,
            Protocol::Http => self.http.port,
        };
        Ok(SocketAddr::new(self.bind_ip()?, port))
    }

    /// Idle timeout applied to each session read, `None` when disabled.
    pub fn session_timeout(&self) -> Option<Duration> {
        match self.session_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn emit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit.emit_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::Ipv4Addr;
    use std::path::PathBuf;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();

        assert_eq!(
            config.enabled_services(),
            vec![
                (Protocol::Ftp, 21),
                (Protocol::Ssh, 20022),
                (Protocol::Http, 8080)
            ]
        );
        assert_eq!(config.rate_limit.burst_capacity, 10);
        assert_eq!(config.rate_limit.refill_interval_ms, 1000);
        assert_eq!(config.session_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
bind_address = "127.0.0.1"
session_timeout_secs = 0

[ftp]
port = 2121
banner = "220 ProFTPD Server ready."

[ssh]
host_key_path = "/etc/leurre/host_key"
max_auth_attempts = 3

[ssh.commands]
"uname -r" = "5.15.0-91-generic\n"

[http]
enabled = false

[audit]
backend = "database"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap_or_else(|e| panic!("{}", e));

        assert_eq!(
            config.listen_addr(Protocol::Ftp).unwrap(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 2121)
        );
        assert_eq!(config.ftp.banner, "220 ProFTPD Server ready.");
        assert_eq!(config.ssh.host_key_path, PathBuf::from("/etc/leurre/host_key"));
        assert_eq!(config.ssh.max_auth_attempts, Some(3));
        assert_eq!(
            config.ssh.commands.get("uname -r").map(String::as_str),
            Some("5.15.0-91-generic\n")
        );
        assert!(!config.http.enabled);
        assert_eq!(config.session_timeout(), None);
        assert_eq!(config.audit.backend, AuditBackend::Database);
        assert_eq!(config.audit.resolved_path(), PathBuf::from("leurre.sqlite3"));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/leurre.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_rejects_bad_bind_address() {
        let result = Config::from_toml_str("bind_address = \"not-an-ip\"");
        assert!(matches!(result, Err(ConfigError::BadIPFormatting(_))));
    }

    #[test]
    fn test_rejects_duplicate_ports() {
        let result = Config::from_toml_str("[ftp]\nport = 8080\n");
        assert!(matches!(result, Err(ConfigError::BadPortsRange(_))));
    }

    #[test]
    fn test_rejects_all_services_disabled() {
        let result = Config::from_toml_str(
            "[ftp]\nenabled = false\n[ssh]\nenabled = false\n[http]\nenabled = false\n",
        );
        assert!(matches!(result, Err(ConfigError::ServicesEmpty(_))));
    }

    #[test]
    fn test_rejects_empty_bucket() {
        let result = Config::from_toml_str("[rate_limit]\nburst_capacity = 0\n");
        assert!(matches!(result, Err(ConfigError::NotInRange(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let result = Config::from_toml_str("[ftp\nport = 21");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }
}
