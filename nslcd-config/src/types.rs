//! Small enums for directives that take one of a fixed set of words,
//! grounded on the option handlers in the original project's `nslcd/cfg.c`
//! (`handle_scope`, `handle_deref`, `handle_tls_reqcert`, ...).

use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Base,
    OneLevel,
    Subtree,
    Children,
}

impl Scope {
    pub(crate) fn parse(token: &str) -> Result<Self, ConfigError> {
        match token.to_ascii_lowercase().as_str() {
            "sub" | "subtree" => Ok(Scope::Subtree),
            "one" | "onelevel" => Ok(Scope::OneLevel),
            "base" => Ok(Scope::Base),
            "children" => Ok(Scope::Children),
            other => Err(ConfigError::InvalidValue {
                directive: "scope",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deref {
    Never,
    Searching,
    Finding,
    Always,
}

impl Deref {
    pub(crate) fn parse(token: &str) -> Result<Self, ConfigError> {
        match token.to_ascii_lowercase().as_str() {
            "never" => Ok(Deref::Never),
            "searching" => Ok(Deref::Searching),
            "finding" => Ok(Deref::Finding),
            "always" => Ok(Deref::Always),
            other => Err(ConfigError::InvalidValue {
                directive: "deref",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ssl {
    Off,
    StartTls,
    On,
}

impl Ssl {
    pub(crate) fn parse(token: &str) -> Result<Self, ConfigError> {
        match token.to_ascii_lowercase().as_str() {
            "off" | "no" => Ok(Ssl::Off),
            "start_tls" => Ok(Ssl::StartTls),
            "on" | "yes" => Ok(Ssl::On),
            other => Err(ConfigError::InvalidValue {
                directive: "ssl",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsReqCert {
    Never,
    Allow,
    Try,
    Demand,
    Hard,
}

impl TlsReqCert {
    pub(crate) fn parse(token: &str) -> Result<Self, ConfigError> {
        match token.to_ascii_lowercase().as_str() {
            "never" | "no" => Ok(TlsReqCert::Never),
            "allow" => Ok(TlsReqCert::Allow),
            "try" => Ok(TlsReqCert::Try),
            "demand" | "yes" => Ok(TlsReqCert::Demand),
            "hard" => Ok(TlsReqCert::Hard),
            other => Err(ConfigError::InvalidValue {
                directive: "tls_reqcert",
                value: other.to_string(),
            }),
        }
    }
}

/// Either side of `uid`/`gid`: the original accepts a numeric id or a name
/// to be resolved (against the system, not the directory) at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSpec {
    Id(u32),
    Name(String),
}

impl UserSpec {
    pub(crate) fn parse(token: &str) -> Self {
        match token.parse::<u32>() {
            Ok(id) => UserSpec::Id(id),
            Err(_) => UserSpec::Name(token.to_string()),
        }
    }
}

/// Where diagnostic output goes, set by the `log` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    None,
    Syslog,
    File(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Crit,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    pub(crate) fn parse(token: &str) -> Result<Self, ConfigError> {
        match token.to_ascii_lowercase().as_str() {
            "crit" => Ok(LogLevel::Crit),
            "error" => Ok(LogLevel::Error),
            "warning" => Ok(LogLevel::Warning),
            "notice" => Ok(LogLevel::Notice),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(ConfigError::InvalidValue {
                directive: "log",
                value: other.to_string(),
            }),
        }
    }
}

pub(crate) fn parse_duration_secs(token: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = token.parse().map_err(|_| ConfigError::InvalidValue {
        directive: "<time>",
        value: token.to_string(),
    })?;
    Ok(Duration::from_secs(secs))
}
