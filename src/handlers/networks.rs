//! `networks` lookups, grounded on `nslcd/network.c`.

use nslcd_attrs::{AttributeMap, Database};
use nslcd_config::{Config, DatabaseConfig};
use nslcd_directory::Entry;
use nslcd_proto::Opcode;

use crate::handlers::common::{and_filter, key_clause, never_skip, parse_address_value, Field, HandlerSpec, KeyKind, LookupKey};
use crate::handlers::hosts::address_text;

const DEFAULT_FILTER: &str = "(objectClass=ipNetwork)";

fn filter(db: &DatabaseConfig, key: &LookupKey) -> String {
    let base = db.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let clause = match key {
        LookupKey::Name(name) => {
            let attr = db.attribute_map.attribute_name("cn").unwrap_or("cn");
            Some(key_clause(attr, name))
        }
        LookupKey::Addr(addr) => {
            let attr = db.attribute_map.attribute_name("ipNetworkNumber").unwrap_or("ipNetworkNumber");
            Some(key_clause(attr, &address_text(addr)))
        }
        _ => None,
    };
    and_filter(base, clause)
}

fn format(entry: &Entry, map: &AttributeMap, _config: &Config) -> Vec<Field> {
    let mut names = map.get_values(entry, "cn");
    let primary = if names.is_empty() { String::new() } else { names.remove(0) };
    let addresses = map
        .get_values(entry, "ipNetworkNumber")
        .iter()
        .filter_map(|v| parse_address_value(v))
        .collect::<Vec<_>>();
    let mut fields = vec![Field::Str(primary), Field::StrList(names), Field::Int32(addresses.len() as i32)];
    for addr in addresses {
        fields.push(Field::Addr(addr));
    }
    fields
}

pub fn specs() -> Vec<HandlerSpec> {
    vec![
        HandlerSpec {
            opcode: Opcode::NetworkByName,
            database: Database::Networks,
            key_kind: KeyKind::Name,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::NetworkByAddr,
            database: Database::Networks,
            key_kind: KeyKind::Addr,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::NetworkAll,
            database: Database::Networks,
            key_kind: KeyKind::None,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: true,
        },
    ]
}
