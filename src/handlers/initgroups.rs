//! `initgroups` (group-by-member, GID-only fan-out), grounded on
//! `nslcd/initgroups.c`. Unlike `group-by-member` this returns bare GIDs,
//! not full group records, and additionally honors
//! `nss_initgroups_ignoreusers` and (when enabled) `nss_nested_groups`
//! group-of-groups expansion.

use std::collections::HashSet;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use nslcd_attrs::{AttributeSource, Database};
use nslcd_config::Config;
use nslcd_directory::{search_all, DirectorySession, Entry, SearchRequest};
use nslcd_proto::ResultCode;

use crate::handlers::common::{and_filter, field_i32, key_clause, DaemonStream, HandlerError};

/// A hard ceiling on the number of groups a nested-groups expansion will
/// chase, guarding against a cyclical or pathologically deep directory.
const MAX_NESTED_GROUPS: usize = 1000;

pub async fn handle<S>(
    io: &mut DaemonStream<S>,
    config: &Config,
    session: &mut DirectorySession,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let username = nslcd_proto::read_string(io).await?;
    if !config.validnames.is_match(&username) {
        debug!("rejecting initgroups name {username:?}: does not match validnames");
        nslcd_proto::write_result_code(io, ResultCode::NotFound).await?;
        return Ok(());
    }
    if should_ignore(config, &username) {
        debug!("initgroups({username}) skipped: user is in nss_initgroups_ignoreusers");
        nslcd_proto::write_result_code(io, ResultCode::NotFound).await?;
        return Ok(());
    }

    let db_config = config.database(Database::Group);
    let bases = if db_config.bases.is_empty() { config.bases.clone() } else { db_config.bases.clone() };
    let scope = db_config.scope.unwrap_or(config.scope);
    let base_filter = db_config.filter.as_deref().unwrap_or("(objectClass=posixGroup)");
    let member_attr = db_config.attribute_map.attribute_name("memberUid").unwrap_or("memberUid");
    let dn_attr = db_config.attribute_map.attribute_name("member").unwrap_or("member");
    let gid_attr = db_config.attribute_map.attribute_name("gidNumber").unwrap_or("gidNumber");

    let mut seen_gids = HashSet::new();
    let mut seen_dns = HashSet::new();
    let mut pending_dns: Vec<String> = Vec::new();

    let member_filter = and_filter(base_filter, Some(key_clause(member_attr, &username)));
    for base in &bases {
        let request = SearchRequest {
            base: base.clone(),
            scope,
            filter: member_filter.clone(),
            attributes: vec![gid_attr.to_string()],
            dereference_member: None,
        };
        for raw in search_all(session, request, config.pagesize).await? {
            let entry = Entry::from(raw);
            if seen_dns.insert(entry.dn().to_string()) {
                if let Some(gid) = entry.first_value(gid_attr) {
                    let gid = field_i32(gid) as i64 + config.nss_gid_offset;
                    if seen_gids.insert(gid as i32) {
                        nslcd_proto::write_begin(io).await?;
                        nslcd_proto::write_i32(io, gid as i32).await?;
                    }
                }
                pending_dns.push(entry.dn().to_string());
            }
        }
    }

    if config.nss_nested_groups {
        while let Some(dn) = pending_dns.pop() {
            if seen_dns.len() > MAX_NESTED_GROUPS {
                debug!("initgroups({username}) stopped nested-group expansion at {MAX_NESTED_GROUPS} groups");
                break;
            }
            let nested_filter = and_filter(
                base_filter,
                Some(key_clause(dn_attr, &dn)),
            );
            for base in &bases {
                let request = SearchRequest {
                    base: base.clone(),
                    scope,
                    filter: nested_filter.clone(),
                    attributes: vec![gid_attr.to_string()],
                    dereference_member: None,
                };
                for raw in search_all(session, request, config.pagesize).await? {
                    let entry = Entry::from(raw);
                    if seen_dns.insert(entry.dn().to_string()) {
                        if let Some(gid) = entry.first_value(gid_attr) {
                            let gid = field_i32(gid) as i64 + config.nss_gid_offset;
                            if seen_gids.insert(gid as i32) {
                                nslcd_proto::write_begin(io).await?;
                                nslcd_proto::write_i32(io, gid as i32).await?;
                            }
                        }
                        pending_dns.push(entry.dn().to_string());
                    }
                }
            }
        }
    }

    let result = if seen_gids.is_empty() { ResultCode::NotFound } else { ResultCode::Success };
    nslcd_proto::write_result_code(io, result).await?;
    Ok(())
}

/// `alllocal` is the original's sentinel for "every user already known to
/// the local `passwd` database"; without a local-database hook in this
/// rendition it is treated as matching no one (directory lookups always
/// proceed), which is the safe direction to simplify in -- see `DESIGN.md`.
fn should_ignore(config: &Config, username: &str) -> bool {
    config
        .nss_initgroups_ignoreusers
        .iter()
        .any(|u| u != "alllocal" && u == username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nslcd_config::Config;

    #[test]
    fn ignoreusers_matches_literal_names_but_not_the_alllocal_sentinel() {
        let mut config = Config::defaults();
        config.nss_initgroups_ignoreusers.insert("root".to_string());
        config.nss_initgroups_ignoreusers.insert("alllocal".to_string());
        assert!(should_ignore(&config, "root"));
        assert!(!should_ignore(&config, "alllocal"));
        assert!(!should_ignore(&config, "jdoe"));
    }
}
