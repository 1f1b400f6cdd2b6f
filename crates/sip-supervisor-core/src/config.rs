//! Environment-driven supervisor configuration.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
    time::Duration,
};

use thiserror::Error;

/// Agent binary used when `PJSUA_BIN` is unset.
pub const DEFAULT_AGENT_BIN: &str = "pjsua";
/// HTTP port used when `LISTEN_PORT` is unset.
pub const DEFAULT_LISTEN_PORT: u16 = 5050;
/// How long the HTTP surface outlives an agent that exited on its own.
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(60);
/// Upper bound on a single stdin command write.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing SIP configuration: set {}", .0.join(","))]
    MissingFields(Vec<&'static str>),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Agent launch settings as read from the environment.
///
/// Credentials stay optional here; [`AgentSettings::credentials`] is the
/// point where their absence becomes an error.
#[derive(Clone, Default)]
pub struct AgentSettings {
    /// Agent command line (program plus optional leading arguments).
    pub binary: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    /// Registrar / proxy host.
    pub server: Option<String>,
}

impl fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSettings")
            .field("binary", &self.binary)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("domain", &self.domain)
            .field("server", &self.server)
            .finish()
    }
}

impl AgentSettings {
    /// Validate that every required credential is present.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingFields`] naming every absent variable.
    pub fn credentials(&self) -> Result<SipCredentials, ConfigError> {
        let fields = [
            ("SIP_USER", &self.user),
            ("SIP_PASS", &self.password),
            ("SIP_DOMAIN", &self.domain),
            ("SIP_SERVER", &self.server),
        ];
        let missing: Vec<&'static str> = fields
            .iter()
            .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing));
        }

        let take = |value: &Option<String>| value.clone().unwrap_or_default();
        Ok(SipCredentials {
            user: take(&self.user),
            password: take(&self.password),
            domain: take(&self.domain),
            server: take(&self.server),
        })
    }
}

/// Validated SIP account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct SipCredentials {
    pub user: String,
    pub password: String,
    pub domain: String,
    pub server: String,
}

impl SipCredentials {
    /// Account identity, `sip:<user>@<domain>`.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("sip:{}@{}", self.user, self.domain)
    }

    /// Registrar URI, `sip:<server>`.
    #[must_use]
    pub fn registrar(&self) -> String {
        format!("sip:{}", self.server)
    }
}

impl fmt::Debug for SipCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .field("server", &self.server)
            .finish()
    }
}

/// Full supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub agent: AgentSettings,
    /// Address the HTTP server binds to.
    pub listen_addr: IpAddr,
    pub listen_port: u16,
    /// HTTP lifetime after the agent exits on its own.
    pub exit_grace: Duration,
    /// Bound on a single command write to the agent.
    pub command_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            agent: AgentSettings {
                binary: DEFAULT_AGENT_BIN.to_string(),
                ..AgentSettings::default()
            },
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: DEFAULT_LISTEN_PORT,
            exit_grace: DEFAULT_EXIT_GRACE,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl SupervisorConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns error if an optional value cannot be parsed. Missing
    /// credentials are reported by [`Self::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    /// Returns error if an optional value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let agent = AgentSettings {
            binary: get("PJSUA_BIN").unwrap_or(defaults.agent.binary),
            user: get("SIP_USER"),
            password: get("SIP_PASS"),
            domain: get("SIP_DOMAIN"),
            server: get("SIP_SERVER"),
        };

        Ok(Self {
            agent,
            listen_addr: parse_or("LISTEN_ADDR", get("LISTEN_ADDR"), defaults.listen_addr)?,
            listen_port: parse_or("LISTEN_PORT", get("LISTEN_PORT"), defaults.listen_port)?,
            exit_grace: parse_or("EXIT_GRACE_SECS", get("EXIT_GRACE_SECS"), defaults.exit_grace.as_secs())
                .map(Duration::from_secs)?,
            command_timeout: parse_or(
                "COMMAND_TIMEOUT_MS",
                get("COMMAND_TIMEOUT_MS"),
                u64::try_from(defaults.command_timeout.as_millis()).unwrap_or(u64::MAX),
            )
            .map(Duration::from_millis)?,
        })
    }

    /// Check that the agent can be launched with this configuration.
    ///
    /// # Errors
    /// Returns error if any SIP credential is missing.
    pub fn validate(&self) -> Result<SipCredentials, ConfigError> {
        self.agent.credentials()
    }

    /// Socket address for the HTTP server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.listen_port)
    }
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}
