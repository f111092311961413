//! `protocols` lookups, grounded on `nslcd/protocol.c`.

use nslcd_attrs::{AttributeMap, Database};
use nslcd_config::{Config, DatabaseConfig};
use nslcd_directory::Entry;
use nslcd_proto::Opcode;

use crate::handlers::common::{and_filter, field_i32, key_clause, never_skip, Field, HandlerSpec, KeyKind, LookupKey};

const DEFAULT_FILTER: &str = "(objectClass=ipProtocol)";

fn filter(db: &DatabaseConfig, key: &LookupKey) -> String {
    let base = db.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let clause = match key {
        LookupKey::Name(name) => {
            let attr = db.attribute_map.attribute_name("cn").unwrap_or("cn");
            Some(key_clause(attr, name))
        }
        LookupKey::Number(n) => {
            let attr = db.attribute_map.attribute_name("ipProtocolNumber").unwrap_or("ipProtocolNumber");
            Some(key_clause(attr, &n.to_string()))
        }
        _ => None,
    };
    and_filter(base, clause)
}

fn format(entry: &Entry, map: &AttributeMap, _config: &Config) -> Vec<Field> {
    let mut names = map.get_values(entry, "cn");
    let primary = if names.is_empty() { String::new() } else { names.remove(0) };
    vec![
        Field::Str(primary),
        Field::StrList(names),
        Field::Int32(field_i32(&map.get_value(entry, "ipProtocolNumber"))),
    ]
}

pub fn specs() -> Vec<HandlerSpec> {
    vec![
        HandlerSpec {
            opcode: Opcode::ProtocolByName,
            database: Database::Protocols,
            key_kind: KeyKind::Name,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::ProtocolByNumber,
            database: Database::Protocols,
            key_kind: KeyKind::Number,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::ProtocolAll,
            database: Database::Protocols,
            key_kind: KeyKind::None,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: true,
        },
    ]
}
