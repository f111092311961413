//! Well-known filesystem locations, grounded on the original project's
//! compiled-in `NSLCD_SOCKET_NAME`/`NSLCD_PIDFILE` in `nslcd.h`. Unlike the
//! directory connection parameters these are not settable from `nslcd.conf`
//! upstream either; `nslcd`'s CLI flags are the only override.

/// Client-facing request socket, world-writable per §6 so any local process
/// can ask a lookup question.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/nslcd/socket";

/// Root/daemon-group-only control channel (component N).
pub const DEFAULT_ADMIN_SOCKET_PATH: &str = "/var/run/nslcd/ctl";

pub const DEFAULT_PIDFILE_PATH: &str = "/var/run/nslcd.pid";

pub const DEFAULT_CONFIG_PATH: &str = "/etc/nslcd.conf";
