//! `ethers` lookups, grounded on `nslcd/ether.c`.

use nslcd_attrs::{AttributeMap, Database};
use nslcd_config::{Config, DatabaseConfig};
use nslcd_directory::Entry;
use nslcd_proto::Opcode;

use crate::handlers::common::{and_filter, key_clause, never_skip, Field, HandlerSpec, KeyKind, LookupKey};

const DEFAULT_FILTER: &str = "(objectClass=ieee802Device)";

fn filter(db: &DatabaseConfig, key: &LookupKey) -> String {
    let base = db.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let clause = match key {
        LookupKey::Name(name) => {
            let attr = db.attribute_map.attribute_name("cn").unwrap_or("cn");
            Some(key_clause(attr, name))
        }
        _ => None,
    };
    and_filter(base, clause)
}

/// `ether-by-ether` keys on the MAC address text itself rather than a
/// decoded [`nslcd_proto::Address`] (ethernet addresses have no
/// [`nslcd_proto::AddressFamily`] of their own), so it reuses `Name`.
fn filter_by_ether(db: &DatabaseConfig, key: &LookupKey) -> String {
    let base = db.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let clause = match key {
        LookupKey::Name(mac) => {
            let attr = db.attribute_map.attribute_name("macAddress").unwrap_or("macAddress");
            Some(key_clause(attr, mac))
        }
        _ => None,
    };
    and_filter(base, clause)
}

fn format(entry: &Entry, map: &AttributeMap, _config: &Config) -> Vec<Field> {
    vec![
        Field::Str(map.get_value(entry, "cn")),
        Field::Str(map.get_value(entry, "macAddress")),
    ]
}

pub fn specs() -> Vec<HandlerSpec> {
    vec![
        HandlerSpec {
            opcode: Opcode::EtherByName,
            database: Database::Ethers,
            key_kind: KeyKind::Name,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::EtherByEther,
            database: Database::Ethers,
            key_kind: KeyKind::Name,
            build_filter: filter_by_ether,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::EtherAll,
            database: Database::Ethers,
            key_kind: KeyKind::None,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: true,
        },
    ]
}
