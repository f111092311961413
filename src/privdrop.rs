//! Privilege drop, grounded on the `uid`/`gid` handling around
//! `setgroups`/`setgid`/`setuid` in the original project's `nslcd/nslcd.c`.
//! Must run after every privileged setup step (binding the sockets,
//! locking the pidfile) and before the worker pool starts accepting
//! untrusted input.

use anyhow::{Context, Result};
use nix::unistd::{self, Gid, Group, Uid, User};

use nslcd_config::UserSpec;

fn resolve_uid(spec: &UserSpec) -> Result<Uid> {
    match spec {
        UserSpec::Id(id) => Ok(Uid::from_raw(*id)),
        UserSpec::Name(name) => {
            let user = User::from_name(name)
                .with_context(|| format!("looking up user {name:?}"))?
                .with_context(|| format!("no such user {name:?}"))?;
            Ok(user.uid)
        }
    }
}

fn resolve_gid(spec: &UserSpec) -> Result<Gid> {
    match spec {
        UserSpec::Id(id) => Ok(Gid::from_raw(*id)),
        UserSpec::Name(name) => {
            let group = Group::from_name(name)
                .with_context(|| format!("looking up group {name:?}"))?
                .with_context(|| format!("no such group {name:?}"))?;
            Ok(group.gid)
        }
    }
}

/// Drop to `run_as`/`run_as_group` if configured. Order matters: group
/// first, since a non-root process can no longer change its group once
/// `setuid` has dropped the privilege to do so.
pub fn drop_privileges(run_as: Option<&UserSpec>, run_as_group: Option<&UserSpec>) -> Result<()> {
    if let Some(group) = run_as_group {
        let gid = resolve_gid(group)?;
        unistd::setgid(gid).with_context(|| format!("setgid({gid})"))?;
    }
    if let Some(user) = run_as {
        let uid = resolve_uid(user)?;
        unistd::setuid(uid).with_context(|| format!("setuid({uid})"))?;
    }
    Ok(())
}
