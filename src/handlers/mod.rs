//! Request dispatch (component H/K): one [`dispatch`] entry point covering
//! every opcode, backed by the generic [`common::run_search_handler`] table
//! for the eleven database lookups plus a handful of handlers too
//! differently-shaped to fit that table.

pub mod common;

mod aliases;
mod configget;
mod ethers;
mod group;
mod hosts;
mod initgroups;
mod netgroup;
mod networks;
mod pam;
mod passwd;
mod protocols;
mod rpc;
mod services;
mod shadow;

use tokio::io::{AsyncRead, AsyncWrite};

use nslcd_config::Config;
use nslcd_directory::DirectorySession;
use nslcd_proto::Opcode;

use common::{run_search_handler, DaemonStream, HandlerError, HandlerSpec};

/// Every [`HandlerSpec`] for the eleven `by-name`/`by-number`/`by-addr`/`all`
/// database lookups, built once per dispatch call. Cheap: each `specs()`
/// just allocates a handful of plain-data structs.
fn search_specs() -> Vec<HandlerSpec> {
    let mut all = Vec::new();
    all.extend(passwd::specs());
    all.extend(shadow::specs());
    all.extend(group::specs());
    all.extend(hosts::specs());
    all.extend(networks::specs());
    all.extend(protocols::specs());
    all.extend(rpc::specs());
    all.extend(services::specs());
    all.extend(aliases::specs());
    all.extend(ethers::specs());
    all
}

/// Serve exactly one request: `opcode` has already been read off the wire
/// by [`nslcd_proto::read_request_header`]. Writes the response header
/// (the opcode echoed back) before handing off to whichever handler
/// answers it.
pub async fn dispatch<S>(
    io: &mut DaemonStream<S>,
    opcode: Opcode,
    config: &Config,
    session: &mut DirectorySession,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    nslcd_proto::write_response_header(io, opcode).await?;
    match opcode {
        Opcode::ConfigGet => configget::handle(io, config).await,
        Opcode::NetgroupByName => netgroup::handle(io, config, session).await,
        Opcode::InitGroups => initgroups::handle(io, config, session).await,
        Opcode::Authenticate => pam::authenticate(io, config, session).await,
        Opcode::Authorize => pam::authorize(io, config, session).await,
        Opcode::SessionOpen => pam::session_open(io, config, session).await,
        Opcode::SessionClose => pam::session_close(io, config, session).await,
        Opcode::PasswordChange => pam::password_change(io, config, session).await,
        Opcode::UserModify => pam::user_modify(io, config, session).await,
        _ => {
            let specs = search_specs();
            let spec = specs
                .iter()
                .find(|s| s.opcode == opcode)
                .unwrap_or_else(|| panic!("every Opcode variant has a HandlerSpec or an explicit dispatch arm: {opcode:?}"));
            run_search_handler(io, spec, config, session).await
        }
    }
}
