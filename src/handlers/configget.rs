//! `config-get`, grounded on `nslcd/cfg.c`'s `cfg_getconfig`. Returns a
//! single runtime-queryable setting: the ignore-list an NSS `initgroups`
//! caller needs to decide whether to skip the directory lookup entirely,
//! the only configuration value the original exposes through this opcode.

use tokio::io::{AsyncRead, AsyncWrite};

use nslcd_config::Config;
use nslcd_proto::ResultCode;

use crate::handlers::common::{DaemonStream, HandlerError};

pub async fn handle<S>(io: &mut DaemonStream<S>, config: &Config) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    nslcd_proto::write_begin(io).await?;
    let mut users: Vec<String> = config.nss_initgroups_ignoreusers.iter().cloned().collect();
    users.sort();
    nslcd_proto::write_string_list(io, &users).await?;
    nslcd_proto::write_result_code(io, ResultCode::Success).await?;
    Ok(())
}
