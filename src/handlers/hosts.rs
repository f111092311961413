//! `hosts` lookups, grounded on `nslcd/host.c`.

use nslcd_attrs::{AttributeMap, Database};
use nslcd_config::{Config, DatabaseConfig};
use nslcd_directory::Entry;
use nslcd_proto::{AddressFamily, Opcode};

use crate::handlers::common::{and_filter, key_clause, never_skip, parse_address_value, Field, HandlerSpec, KeyKind, LookupKey};

const DEFAULT_FILTER: &str = "(objectClass=ipHost)";

fn filter(db: &DatabaseConfig, key: &LookupKey) -> String {
    let base = db.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let clause = match key {
        LookupKey::Name(name) => {
            let attr = db.attribute_map.attribute_name("cn").unwrap_or("cn");
            Some(key_clause(attr, name))
        }
        LookupKey::Addr(addr) => {
            let attr = db.attribute_map.attribute_name("ipHostNumber").unwrap_or("ipHostNumber");
            Some(key_clause(attr, &address_text(addr)))
        }
        _ => None,
    };
    and_filter(base, clause)
}

pub(crate) fn address_text(addr: &nslcd_proto::Address) -> String {
    match addr.family {
        AddressFamily::Ipv4 => {
            let o = &addr.bytes;
            format!("{}.{}.{}.{}", o[0], o[1], o[2], o[3])
        }
        AddressFamily::Ipv6 => std::net::Ipv6Addr::from(<[u8; 16]>::try_from(addr.bytes.as_slice()).unwrap_or([0; 16])).to_string(),
    }
}

fn format(entry: &Entry, map: &AttributeMap, _config: &Config) -> Vec<Field> {
    let mut names = map.get_values(entry, "cn");
    let primary = if names.is_empty() { String::new() } else { names.remove(0) };
    let addresses = map
        .get_values(entry, "ipHostNumber")
        .iter()
        .filter_map(|v| parse_address_value(v))
        .collect::<Vec<_>>();
    let mut fields = vec![Field::Str(primary), Field::StrList(names)];
    fields.push(Field::Int32(addresses.len() as i32));
    for addr in addresses {
        fields.push(Field::Addr(addr));
    }
    fields
}

pub fn specs() -> Vec<HandlerSpec> {
    vec![
        HandlerSpec {
            opcode: Opcode::HostByName,
            database: Database::Hosts,
            key_kind: KeyKind::Name,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::HostByAddr,
            database: Database::Hosts,
            key_kind: KeyKind::Addr,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: false,
        },
        HandlerSpec {
            opcode: Opcode::HostAll,
            database: Database::Hosts,
            key_kind: KeyKind::None,
            build_filter: filter,
            format_entry: format,
            skip_entry: never_skip,
            empty_is_success: true,
        },
    ]
}
