//! Parses `nslcd.conf` into a [`Config`]: process identity, directory
//! connection parameters shared by every session, and the per-database
//! search settings and attribute maps used by the request handlers.

mod config;
mod database;
mod error;
mod failover;
mod lexer;
mod types;

pub use config::Config;
pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use failover::{UriState, UriTable};
pub use types::{Deref, LogLevel, LogTarget, Scope, Ssl, TlsReqCert, UserSpec};
