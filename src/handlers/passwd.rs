//! `passwd` lookups, grounded on `nslcd/passwd.c`.

use nslcd_attrs::{AttributeMap, Database};
use nslcd_config::{Config, DatabaseConfig};
use nslcd_directory::Entry;
use nslcd_proto::Opcode;

use crate::handlers::common::{and_filter, field_i32, key_clause, Field, HandlerSpec, KeyKind, LookupKey};

const DEFAULT_FILTER: &str = "(objectClass=posixAccount)";

fn filter(db: &DatabaseConfig, key: &LookupKey) -> String {
    let base = db.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let clause = match key {
        LookupKey::Name(name) => {
            let attr = db.attribute_map.attribute_name("uid").unwrap_or("uid");
            Some(key_clause(attr, name))
        }
        LookupKey::Number(uid) => {
            let attr = db.attribute_map.attribute_name("uidNumber").unwrap_or("uidNumber");
            Some(key_clause(attr, &uid.to_string()))
        }
        _ => None,
    };
    and_filter(base, clause)
}

/// Apply the configured UID/GID offsets to the raw directory values,
/// matching `nss_uid_offset`/`nss_gid_offset` in the original's handling.
fn format(entry: &Entry, map: &AttributeMap, config: &Config) -> Vec<Field> {
    let uid = field_i32(&map.get_value(entry, "uidNumber")) as i64 + config.nss_uid_offset;
    let gid = field_i32(&map.get_value(entry, "gidNumber")) as i64 + config.nss_gid_offset;
    vec![
        Field::Str(map.get_value(entry, "uid")),
        Field::Str("*".to_string()), // the on-wire passwd field never carries the real hash
        Field::Int32(uid as i32),
        Field::Int32(gid as i32),
        Field::Str(map.get_value(entry, "gecos")),
        Field::Str(map.get_value(entry, "homeDirectory")),
        Field::Str(map.get_value(entry, "loginShell")),
    ]
}

fn below_min_uid(entry: &Entry, map: &AttributeMap, config: &Config) -> bool {
    (field_i32(&map.get_value(entry, "uidNumber")) as i64 + config.nss_uid_offset) < config.nss_min_uid as i64
}

pub fn specs() -> Vec<HandlerSpec> {
    vec![
        HandlerSpec {
            opcode: Opcode::PasswdByName,
            database: Database::Passwd,
            key_kind: KeyKind::Name,
            build_filter: filter,
            format_entry: format,
            skip_entry: below_min_uid,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::PasswdByUid,
            database: Database::Passwd,
            key_kind: KeyKind::Number,
            build_filter: filter,
            format_entry: format,
            skip_entry: below_min_uid,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::PasswdAll,
            database: Database::Passwd,
            key_kind: KeyKind::None,
            build_filter: filter,
            format_entry: format,
            skip_entry: below_min_uid,
            empty_is_success: true,
        },
    ]
}
