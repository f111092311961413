//! `netgroup` lookup, grounded on `nslcd/netgroup.c`. Handled outside the
//! generic [`super::common::run_search_handler`] table because one entry
//! fans out into two wire record *kinds* -- triples and nested netgroup
//! names -- rather than one fixed field list, so it doesn't fit the
//! `{build_filter, format_entry}` shape the rest of the databases share.

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use nslcd_attrs::Database;
use nslcd_config::Config;
use nslcd_directory::{search_all, DirectorySession, Entry, SearchRequest};
use nslcd_proto::{Opcode, ResultCode};

use crate::handlers::common::{and_filter, key_clause, DaemonStream, HandlerError};

const DEFAULT_FILTER: &str = "(objectClass=nisNetgroup)";

/// Record kind tags streamed ahead of each entry's payload, grounded on the
/// original's `NSLCD_NETGROUP_TYPE_{NETGROUP,TRIPLE}` distinction.
const TYPE_NETGROUP: i32 = 1;
const TYPE_TRIPLE: i32 = 2;

pub async fn handle<S>(
    io: &mut DaemonStream<S>,
    config: &Config,
    session: &mut DirectorySession,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let name = nslcd_proto::read_string(io).await?;
    if !config.validnames.is_match(&name) {
        debug!("rejecting netgroup name {name:?}: does not match validnames");
        nslcd_proto::write_result_code(io, ResultCode::NotFound).await?;
        return Ok(());
    }

    let db_config = config.database(Database::Netgroup);
    let base_filter = db_config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let cn_attr = db_config.attribute_map.attribute_name("cn").unwrap_or("cn");
    let filter = and_filter(base_filter, Some(key_clause(cn_attr, &name)));
    let bases = if db_config.bases.is_empty() { config.bases.clone() } else { db_config.bases.clone() };
    let scope = db_config.scope.unwrap_or(config.scope);

    let mut attrs = std::collections::HashSet::new();
    for slot in Database::Netgroup.attribute_slots() {
        db_config.attribute_map.add_referenced(&mut attrs, slot);
    }
    let attributes: Vec<String> = attrs.into_iter().collect();

    let mut found_any = false;
    for base in &bases {
        let request = SearchRequest {
            base: base.clone(),
            scope,
            filter: filter.clone(),
            attributes: attributes.clone(),
            dereference_member: None,
        };
        let entries = search_all(session, request, config.pagesize).await?;
        for raw in entries {
            let entry = Entry::from(raw);
            found_any = true;
            for triple in db_config.attribute_map.get_values(&entry, "nisNetgroupTriple") {
                if let Some((host, user, domain)) = parse_triple(&triple) {
                    nslcd_proto::write_begin(io).await?;
                    nslcd_proto::write_i32(io, TYPE_TRIPLE).await?;
                    nslcd_proto::write_string(io, host).await?;
                    nslcd_proto::write_string(io, user).await?;
                    nslcd_proto::write_string(io, domain).await?;
                }
            }
            for member in db_config.attribute_map.get_values(&entry, "memberNisNetgroup") {
                nslcd_proto::write_begin(io).await?;
                nslcd_proto::write_i32(io, TYPE_NETGROUP).await?;
                nslcd_proto::write_string(io, &member).await?;
            }
        }
    }
    let result = if found_any { ResultCode::Success } else { ResultCode::NotFound };
    nslcd_proto::write_result_code(io, result).await?;
    Ok(())
}

/// `nisNetgroupTriple` values look like `(host,user,domain)` with any
/// member left empty for "any". Returns `None` (skipping the triple) on a
/// malformed value rather than failing the whole entry.
fn parse_triple(value: &str) -> Option<(&str, &str, &str)> {
    let inner = value.strip_prefix('(')?.strip_suffix(')')?;
    let mut parts = inner.splitn(3, ',');
    Some((parts.next()?, parts.next()?, parts.next()?))
}

pub const OPCODE: Opcode = Opcode::NetgroupByName;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_triple() {
        assert_eq!(parse_triple("(host1,user1,domain1)"), Some(("host1", "user1", "domain1")));
        assert_eq!(parse_triple("(,user1,)"), Some(("", "user1", "")));
        assert_eq!(parse_triple("not-a-triple"), None);
    }
}
