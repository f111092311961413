//! `shadow` lookups, grounded on `nslcd/shadow.c`.

use nslcd_attrs::{AttributeMap, Database};
use nslcd_config::{Config, DatabaseConfig};
use nslcd_directory::Entry;
use nslcd_proto::Opcode;

use crate::handlers::common::{and_filter, field_i32, key_clause, never_skip, Field, HandlerSpec, KeyKind, LookupKey};

const DEFAULT_FILTER: &str = "(objectClass=shadowAccount)";

fn filter(db: &DatabaseConfig, key: &LookupKey) -> String {
    let base = db.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let clause = match key {
        LookupKey::Name(name) => {
            let attr = db.attribute_map.attribute_name("uid").unwrap_or("uid");
            Some(key_clause(attr, name))
        }
        _ => None,
    };
    and_filter(base, clause)
}

/// A blank shadow field on the wire means "not set" for every numeric slot
/// here, so unlike `passwd` an unparsable/absent value becomes `-1`, not
/// `0`, matching `/etc/shadow`'s own "empty means unset" convention.
fn field_i32_or_unset(value: &str) -> i32 {
    if value.is_empty() {
        -1
    } else {
        field_i32(value)
    }
}

fn format(entry: &Entry, map: &AttributeMap, _config: &Config) -> Vec<Field> {
    vec![
        Field::Str(map.get_value(entry, "uid")),
        Field::Str("*".to_string()),
        Field::Int32(field_i32_or_unset(&map.get_value(entry, "shadowLastChange"))),
        Field::Int32(field_i32_or_unset(&map.get_value(entry, "shadowMin"))),
        Field::Int32(field_i32_or_unset(&map.get_value(entry, "shadowMax"))),
        Field::Int32(field_i32_or_unset(&map.get_value(entry, "shadowWarning"))),
        Field::Int32(field_i32_or_unset(&map.get_value(entry, "shadowInactive"))),
        Field::Int32(field_i32_or_unset(&map.get_value(entry, "shadowExpire"))),
        Field::Int32(field_i32_or_unset(&map.get_value(entry, "shadowFlag"))),
    ]
}

pub fn specs() -> Vec<HandlerSpec> {
    vec![
        HandlerSpec {
            opcode: Opcode::ShadowByName,
            database: Database::Shadow,
            key_kind: KeyKind::Name,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::ShadowAll,
            database: Database::Shadow,
            key_kind: KeyKind::None,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: true,
        },
    ]
}
