//! `nslcd`: a local name-service and authentication daemon that proxies
//! NSS/PAM lookups to a directory server over a Unix-domain socket.
//!
//! The binary entry points (`src/bin/nslcd.rs`, `src/bin/nslcd_ctl.rs`)
//! are thin; almost everything lives here so it can be exercised by the
//! crate's own test suite without going through a real process.

pub mod control;
pub mod handlers;
pub mod logging;
pub mod paths;
pub mod pidfile;
pub mod privdrop;
pub mod signals;
pub mod worker;
