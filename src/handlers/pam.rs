//! PAM-facing operations (authenticate, authorize, session open/close,
//! password change, user modify), grounded on `nslcd/pam.c`. Unlike the
//! database lookup handlers these don't enumerate directory entries; they
//! drive a bind or a modify against one resolved DN and report one of the
//! [`PamStatus`] outcomes.

use std::collections::HashMap;

use ldap3::Mod;
use log::{info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use nslcd_attrs::expand;
use nslcd_config::{Config, Scope};
use nslcd_directory::{search_all, DirectoryError, DirectorySession, Entry, PasswordPolicyError, PasswordPolicyResponse, SearchRequest};
use nslcd_proto::PamStatus;

use crate::handlers::common::{DaemonStream, HandlerError};

/// Request fields common to every PAM opcode: who's authenticating, and on
/// whose behalf (the `service`/`ruser`/`rhost`/`tty` PAM item values),
/// matching the variable set `pam_authc_search`/`pam_authz_search` may
/// reference.
struct PamContext {
    username: String,
    service: String,
    ruser: String,
    rhost: String,
    tty: String,
}

impl PamContext {
    async fn read<S>(io: &mut DaemonStream<S>) -> Result<Self, HandlerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        Ok(PamContext {
            username: nslcd_proto::read_string(io).await?,
            service: nslcd_proto::read_string(io).await?,
            ruser: nslcd_proto::read_string(io).await?,
            rhost: nslcd_proto::read_string(io).await?,
            tty: nslcd_proto::read_string(io).await?,
        })
    }

    /// Build the variable lookup `pam_authc_search`/`pam_authz_search`
    /// expand against; an unresolved `dn`/`uid` or any variable this
    /// rendition has no source for (`hostname`, `fqdn`, `domain`) expands
    /// to the empty string, matching the original's documented-but-unset
    /// behavior.
    fn variables<'a>(&'a self, dn: Option<&'a str>, uid: Option<&'a str>) -> HashMap<&'static str, &'a str> {
        let mut vars = HashMap::new();
        vars.insert("username", self.username.as_str());
        vars.insert("service", self.service.as_str());
        vars.insert("ruser", self.ruser.as_str());
        vars.insert("rhost", self.rhost.as_str());
        vars.insert("tty", self.tty.as_str());
        vars.insert("dn", dn.unwrap_or(""));
        vars.insert("uid", uid.unwrap_or(""));
        vars
    }
}

fn expand_with(expr: &str, vars: &HashMap<&'static str, &str>) -> String {
    expand(expr, |name| vars.get(name).copied().unwrap_or("").to_string()).unwrap_or_default()
}

/// Resolve `username` to a DN using `pam_authc_search` as an LDAP filter,
/// searching every configured `passwd` base. Grounded on
/// `lookup_dn2uid`/`dn2uid`'s counterpart in the original, `uid2dn`.
async fn resolve_dn(
    config: &Config,
    session: &mut DirectorySession,
    ctx: &PamContext,
) -> Result<Option<(String, String)>, DirectoryError> {
    let db_config = config.database(nslcd_attrs::Database::Passwd);
    let bases = if db_config.bases.is_empty() { config.bases.clone() } else { db_config.bases.clone() };
    let uid_attr = db_config.attribute_map.attribute_name("uid").unwrap_or("uid");
    let uid_number_attr = db_config.attribute_map.attribute_name("uidNumber").unwrap_or("uidNumber");
    let vars = ctx.variables(None, None);
    let filter = expand_with(&format!("(&({uid_attr}=${{username}})({}))", config.pam_authc_search), &vars);
    for base in &bases {
        let request = SearchRequest {
            base: base.clone(),
            scope: config.scope,
            filter: filter.clone(),
            attributes: vec![uid_number_attr.to_string()],
            dereference_member: None,
        };
        let mut entries = search_all(session, request, config.pagesize).await?;
        if let Some(raw) = entries.pop() {
            let entry = Entry::from(raw);
            let uid = nslcd_attrs::AttributeSource::first_value(&entry, uid_number_attr).unwrap_or("").to_string();
            return Ok(Some((entry.0.dn.clone(), uid)));
        }
    }
    Ok(None)
}

pub async fn authenticate<S>(
    io: &mut DaemonStream<S>,
    config: &Config,
    session: &mut DirectorySession,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ctx = PamContext::read(io).await?;
    let password = nslcd_proto::read_string(io).await?;

    let Some((dn, uid)) = resolve_dn(config, session, &ctx).await? else {
        nslcd_proto::write_pam_result(io, PamStatus::UserUnknown, None).await?;
        return Ok(());
    };

    let (bind_result, ppolicy) = session.bind_as_with_ppolicy(&dn, &password, config.pam_authc_ppolicy).await;
    match bind_result {
        Ok(()) => {
            info!("authenticated {} as {dn}", ctx.username);
            nslcd_proto::write_string(io, &dn).await?;
            nslcd_proto::write_string(io, &uid).await?;
            nslcd_proto::write_pam_result(io, ppolicy_status_on_success(ppolicy.as_ref()), None).await?;
        }
        Err(DirectoryError::InvalidCredentials) => {
            nslcd_proto::write_string(io, &dn).await?;
            nslcd_proto::write_string(io, &uid).await?;
            nslcd_proto::write_pam_result(io, ppolicy_status_on_failure(ppolicy.as_ref()), None).await?;
        }
        Err(e) => {
            warn!("authentication bind for {} failed: {e}", ctx.username);
            nslcd_proto::write_string(io, "").await?;
            nslcd_proto::write_string(io, "").await?;
            nslcd_proto::write_pam_result(io, PamStatus::AuthInfoUnavail, None).await?;
        }
    }
    Ok(())
}

/// Map a password policy response control onto a [`PamStatus`] for a bind
/// that otherwise succeeded: the server let the bind through but still
/// wants the client to rotate its password.
fn ppolicy_status_on_success(ppolicy: Option<&PasswordPolicyResponse>) -> PamStatus {
    match ppolicy.and_then(|p| p.error) {
        Some(PasswordPolicyError::ChangeAfterReset) | Some(PasswordPolicyError::PasswordExpired) => PamStatus::NewAuthTokRequired,
        _ => PamStatus::Success,
    }
}

/// Map a password policy response control onto a [`PamStatus`] for a bind
/// that failed with `LDAP_INVALID_CREDENTIALS` -- the control explains
/// *why* the directory rejected it when it's more specific than a plain
/// bad password.
fn ppolicy_status_on_failure(ppolicy: Option<&PasswordPolicyResponse>) -> PamStatus {
    match ppolicy.and_then(|p| p.error) {
        Some(PasswordPolicyError::AccountLocked) => PamStatus::PermissionDenied,
        Some(PasswordPolicyError::PasswordExpired) => PamStatus::AccountExpired,
        Some(PasswordPolicyError::ChangeAfterReset) => PamStatus::NewAuthTokRequired,
        _ => PamStatus::AuthError,
    }
}

pub async fn authorize<S>(
    io: &mut DaemonStream<S>,
    config: &Config,
    session: &mut DirectorySession,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ctx = PamContext::read(io).await?;
    let dn = nslcd_proto::read_string(io).await?;

    if config.pam_authz_search.is_empty() {
        nslcd_proto::write_pam_result(io, PamStatus::Success, None).await?;
        return Ok(());
    }

    let vars = ctx.variables(Some(&dn), None);
    for expr in &config.pam_authz_search {
        let filter = expand_with(expr, &vars);
        let request = SearchRequest {
            base: dn.clone(),
            scope: Scope::Base,
            filter,
            attributes: vec!["dn".to_string()],
            dereference_member: None,
        };
        let entries = search_all(session, request, 0).await?;
        if entries.is_empty() {
            nslcd_proto::write_pam_result(io, PamStatus::PermissionDenied, None).await?;
            return Ok(());
        }
    }
    nslcd_proto::write_pam_result(io, PamStatus::Success, None).await?;
    Ok(())
}

pub async fn session_open<S>(io: &mut DaemonStream<S>, _config: &Config, _session: &mut DirectorySession) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ctx = PamContext::read(io).await?;
    info!("session opened for {} on {}", ctx.username, ctx.tty);
    nslcd_proto::write_pam_result(io, PamStatus::Success, None).await?;
    Ok(())
}

pub async fn session_close<S>(io: &mut DaemonStream<S>, _config: &Config, _session: &mut DirectorySession) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ctx = PamContext::read(io).await?;
    info!("session closed for {} on {}", ctx.username, ctx.tty);
    nslcd_proto::write_pam_result(io, PamStatus::Success, None).await?;
    Ok(())
}

pub async fn password_change<S>(
    io: &mut DaemonStream<S>,
    config: &Config,
    session: &mut DirectorySession,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ctx = PamContext::read(io).await?;
    let old_password = nslcd_proto::read_string(io).await?;
    let new_password = nslcd_proto::read_string(io).await?;

    if let Some(message) = &config.pam_password_prohibit_message {
        nslcd_proto::write_pam_result(io, PamStatus::PermissionDenied, Some(message)).await?;
        return Ok(());
    }

    let Some((dn, _uid)) = resolve_dn(config, session, &ctx).await? else {
        nslcd_proto::write_pam_result(io, PamStatus::UserUnknown, None).await?;
        return Ok(());
    };

    let bind_result = match (&config.rootpwmoddn, &config.rootpwmodpw) {
        (Some(root_dn), Some(root_pw)) => session.bind_as(root_dn, root_pw).await,
        _ => session.bind_as(&dn, &old_password).await,
    };
    if let Err(e) = bind_result {
        warn!("password change bind for {} failed: {e}", ctx.username);
        nslcd_proto::write_pam_result(io, PamStatus::AuthError, None).await?;
        return Ok(());
    }

    let mods = vec![Mod::Replace("userPassword".to_string(), std::collections::HashSet::from([new_password.clone()]))];
    match session.modify(&dn, mods).await {
        Ok(()) => {
            info!("changed password for {}", ctx.username);
            nslcd_proto::write_pam_result(io, PamStatus::Success, None).await?;
        }
        Err(e) => {
            warn!("password change modify for {} failed: {e}", ctx.username);
            nslcd_proto::write_pam_result(io, PamStatus::AuthTokError, None).await?;
        }
    }
    Ok(())
}

pub async fn user_modify<S>(
    io: &mut DaemonStream<S>,
    config: &Config,
    session: &mut DirectorySession,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ctx = PamContext::read(io).await?;
    let attribute = nslcd_proto::read_string(io).await?;
    let value = nslcd_proto::read_string(io).await?;

    let Some((dn, _uid)) = resolve_dn(config, session, &ctx).await? else {
        nslcd_proto::write_pam_result(io, PamStatus::UserUnknown, None).await?;
        return Ok(());
    };

    if let (Some(root_dn), Some(root_pw)) = (&config.rootpwmoddn, &config.rootpwmodpw) {
        if let Err(e) = session.bind_as(root_dn, root_pw).await {
            warn!("user modify bind failed: {e}");
            nslcd_proto::write_pam_result(io, PamStatus::AuthError, None).await?;
            return Ok(());
        }
    }

    let mods = vec![Mod::Replace(attribute.clone(), std::collections::HashSet::from([value.clone()]))];
    match session.modify(&dn, mods).await {
        Ok(()) => nslcd_proto::write_pam_result(io, PamStatus::Success, None).await?,
        Err(e) => {
            warn!("user modify for {} failed: {e}", ctx.username);
            nslcd_proto::write_pam_result(io, PamStatus::PermissionDenied, None).await?;
        }
    }
    Ok(())
}
