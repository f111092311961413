//! `group` lookups, grounded on `nslcd/group.c`. Member resolution reads
//! `memberUid` directly where a directory populates it; when a group
//! entry is groupOfNames-only (`memberUid` comes back empty but `member`
//! doesn't), `run_search_handler` asks the search layer to dereference
//! each `member` DN back to a `passwd` `uid` -- see
//! `nslcd_directory::DereferenceMember`.

use nslcd_attrs::{AttributeMap, Database};
use nslcd_config::{Config, DatabaseConfig};
use nslcd_directory::Entry;
use nslcd_proto::Opcode;

use crate::handlers::common::{and_filter, field_i32, key_clause, never_skip, Field, HandlerSpec, KeyKind, LookupKey};

const DEFAULT_FILTER: &str = "(objectClass=posixGroup)";

fn filter(db: &DatabaseConfig, key: &LookupKey) -> String {
    let base = db.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let clause = match key {
        LookupKey::Name(name) => {
            let attr = db.attribute_map.attribute_name("cn").unwrap_or("cn");
            Some(key_clause(attr, name))
        }
        LookupKey::Number(gid) => {
            let attr = db.attribute_map.attribute_name("gidNumber").unwrap_or("gidNumber");
            Some(key_clause(attr, &gid.to_string()))
        }
        _ => None,
    };
    and_filter(base, clause)
}

/// `group-by-member` has no `memberUid` key slot of its own; the configured
/// `memberUid` attribute name is reused as the search attribute.
fn filter_by_member(db: &DatabaseConfig, key: &LookupKey) -> String {
    let base = db.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let clause = match key {
        LookupKey::Name(name) => {
            let attr = db.attribute_map.attribute_name("memberUid").unwrap_or("memberUid");
            Some(key_clause(attr, name))
        }
        _ => None,
    };
    and_filter(base, clause)
}

fn format(entry: &Entry, map: &AttributeMap, config: &Config) -> Vec<Field> {
    let gid = field_i32(&map.get_value(entry, "gidNumber")) as i64 + config.nss_gid_offset;
    vec![
        Field::Str(map.get_value(entry, "cn")),
        Field::Str("*".to_string()),
        Field::Int32(gid as i32),
        Field::StrList(map.get_values(entry, "memberUid")),
    ]
}

pub fn specs() -> Vec<HandlerSpec> {
    vec![
        HandlerSpec {
            opcode: Opcode::GroupByName,
            database: Database::Group,
            key_kind: KeyKind::Name,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::GroupByGid,
            database: Database::Group,
            key_kind: KeyKind::Number,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::GroupByMember,
            database: Database::Group,
            key_kind: KeyKind::Name,
            build_filter: filter_by_member,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::GroupAll,
            database: Database::Group,
            key_kind: KeyKind::None,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: true,
        },
    ]
}
