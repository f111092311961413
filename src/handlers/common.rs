//! Shared machinery behind the request-handler dispatch table (component
//! H/K): the request-key union every `parse_request` step produces, the
//! wire-field union every `format_entry` step produces, and the generic
//! driver that ties a [`HandlerSpec`] together with a directory session to
//! actually serve one request.
//!
//! Grounded on the per-opcode `nslcd_*_read`/`nslcd_*_write` pairs of the
//! original's `nslcd/*.c` files, unified here into data instead of one
//! hand-written function per opcode, per the "function-pointer-based
//! polymorphism" design note.

use std::net::IpAddr;

use log::debug;

use nslcd_attrs::{AttributeMap, Database};
use nslcd_config::{Config, DatabaseConfig};
use nslcd_directory::{search_each, DereferenceMember, DirectoryError, DirectorySession, Entry, SearchRequest};
use nslcd_proto::{Address, AddressFamily, Opcode, ProtoError, ResultCode, Stream};
use tokio::io::{AsyncRead, AsyncWrite};

pub type DaemonStream<S> = Stream<S>;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// The lookup key every by-* opcode parses off the wire before a search can
/// be issued; `All` opcodes carry no key.
#[derive(Debug, Clone)]
pub enum LookupKey {
    None,
    Name(String),
    Number(i32),
    Addr(Address),
}

/// Which wire reader `parse_request` needs; kept separate from `LookupKey`
/// so the dispatch table can describe "what to read" as plain data instead
/// of a function pointer with a different signature per opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    None,
    Name,
    Number,
    Addr,
}

pub async fn parse_key<S>(io: &mut DaemonStream<S>, kind: KeyKind) -> Result<LookupKey, ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    Ok(match kind {
        KeyKind::None => LookupKey::None,
        KeyKind::Name => LookupKey::Name(nslcd_proto::read_string(io).await?),
        KeyKind::Number => LookupKey::Number(nslcd_proto::read_i32(io).await?),
        KeyKind::Addr => LookupKey::Addr(nslcd_proto::read_address(io).await?),
    })
}

/// One wire field of a streamed entry; every per-database `format_entry`
/// function returns these in wire order instead of writing to the stream
/// itself, so formatting stays synchronous, pure data and is trivially
/// unit-testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Str(String),
    Int32(i32),
    StrList(Vec<String>),
    Addr(Address),
}

pub async fn write_field<S>(io: &mut DaemonStream<S>, field: &Field) -> Result<(), ProtoError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match field {
        Field::Str(s) => nslcd_proto::write_string(io, s).await,
        Field::Int32(v) => nslcd_proto::write_i32(io, *v).await,
        Field::StrList(list) => nslcd_proto::write_string_list(io, list).await,
        Field::Addr(addr) => nslcd_proto::write_address(io, addr).await,
    }
}

/// Parse a string field as an `i32`, defaulting to 0 on a malformed or
/// absent directory value rather than failing the whole entry -- matching
/// the original's tolerant `atol`-based field decoding.
pub fn field_i32(value: &str) -> i32 {
    value.parse().unwrap_or(0)
}

/// Render an address string (`ipHostNumber`/`ipNetworkNumber` hold plain
/// dotted-decimal or IPv6 text in the directory) as a wire [`Address`];
/// unparsable values are skipped by the caller rather than erroring the
/// whole entry.
pub fn parse_address_value(value: &str) -> Option<Address> {
    match value.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => Address::new(AddressFamily::Ipv4, v4.octets().to_vec()).ok(),
        IpAddr::V6(v6) => Address::new(AddressFamily::Ipv6, v6.octets().to_vec()).ok(),
    }
}

/// Escape a value for inclusion in an LDAP search filter per RFC 4515:
/// `*`, `(`, `)`, `\` and NUL each become a `\XX` hex pair. Every handler
/// that folds a client-supplied key into a filter string must run it
/// through this first.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'*' | b'(' | b')' | b'\\' | 0 => out.push_str(&format!("\\{byte:02x}")),
            _ => out.push(byte as char),
        }
    }
    out
}

/// One opcode's slice of the dispatch table: plain data plus two `fn`
/// pointers (no closures, no async) for the parts that differ per
/// database. The actual I/O -- reading the key, searching, streaming
/// results -- is the same generic loop in [`run_search_handler`] for every
/// variant.
pub struct HandlerSpec {
    pub opcode: Opcode,
    pub database: Database,
    pub key_kind: KeyKind,
    pub build_filter: fn(&DatabaseConfig, &LookupKey) -> String,
    pub format_entry: fn(&Entry, &AttributeMap, &Config) -> Vec<Field>,
    /// True to drop an otherwise-matching entry before it's serialized,
    /// e.g. `passwd`'s `nss_min_uid` floor. Most databases have nothing to
    /// check here and pass [`never_skip`].
    pub skip_entry: fn(&Entry, &AttributeMap, &Config) -> bool,
    /// `All` enumerations report success on zero matches; by-key lookups
    /// report not-found.
    pub empty_is_success: bool,
}

pub fn never_skip(_entry: &Entry, _map: &AttributeMap, _config: &Config) -> bool {
    false
}

/// Fold a database's configured filter override (or its compiled-in
/// default) with a key clause into one filter string.
pub fn and_filter(default_or_configured: &str, key_clause: Option<String>) -> String {
    match key_clause {
        Some(clause) => format!("(&{default_or_configured}{clause})"),
        None => default_or_configured.to_string(),
    }
}

pub fn key_clause(attr: &str, value: &str) -> String {
    format!("({attr}={})", escape_filter_value(value))
}

/// `group` is the one database whose `memberUid` slot can come back empty
/// on a directory that only populates `member` (groupOfNames); in that
/// case request the `member` slot's attribute alongside the configured
/// attributes and let [`search_each`] dereference each DN back to a
/// `passwd` `uid` value. An admin who mapped `member` to the empty-string
/// "don't fetch" sentinel (`map group member ""`) has opted out of this
/// round trip, matching the cost/behavior tradeoff that mapping exists for.
fn dereference_member_for(spec: &HandlerSpec, config: &Config, db_config: &DatabaseConfig, attributes: &mut Vec<String>) -> Option<DereferenceMember> {
    if spec.database != Database::Group || db_config.attribute_map.is_disabled("member") {
        return None;
    }
    let dn_attribute = db_config.attribute_map.attribute_name("member")?.to_string();
    let target_key = db_config.attribute_map.attribute_name("memberUid").unwrap_or("memberUid").to_string();
    if !attributes.iter().any(|a| *a == dn_attribute) {
        attributes.push(dn_attribute.clone());
    }
    let name_attribute = config
        .database(Database::Passwd)
        .attribute_map
        .attribute_name("uid")
        .unwrap_or("uid")
        .to_string();
    Some(DereferenceMember { dn_attribute, target_key, name_attribute })
}

/// Run one lookup end to end: read the key, build the filter, search every
/// configured base, stream `BEGIN`-prefixed entries as they arrive, and
/// terminate with the matching [`ResultCode`]. This is the "request
/// dispatcher" of §4.H; every by-name/by-number/by-addr/all opcode goes
/// through it.
pub async fn run_search_handler<S>(
    io: &mut DaemonStream<S>,
    spec: &HandlerSpec,
    config: &Config,
    session: &mut DirectorySession,
) -> Result<(), HandlerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let key = parse_key(io, spec.key_kind).await?;
    if spec.key_kind == KeyKind::None && config.nss_disable_enumeration {
        debug!("enumeration disabled for {:?}, refusing without querying the directory", spec.opcode);
        nslcd_proto::write_result_code(io, ResultCode::Unavail).await?;
        return Ok(());
    }
    if let LookupKey::Name(name) = &key {
        if !config.validnames.is_match(name) {
            debug!("rejecting name {name:?}: does not match validnames");
            nslcd_proto::write_result_code(io, ResultCode::NotFound).await?;
            return Ok(());
        }
    }
    let db_config = config.database(spec.database);
    let filter = (spec.build_filter)(db_config, &key);
    let bases = if db_config.bases.is_empty() {
        config.bases.clone()
    } else {
        db_config.bases.clone()
    };
    let scope = db_config.scope.unwrap_or(config.scope);
    let mut attrs = std::collections::HashSet::new();
    for slot in spec.database.attribute_slots() {
        db_config.attribute_map.add_referenced(&mut attrs, slot);
    }
    let mut attributes: Vec<String> = attrs.into_iter().collect();
    let dereference_member = dereference_member_for(spec, config, db_config, &mut attributes);

    let mut found_any = false;
    for base in &bases {
        let request = SearchRequest {
            base: base.clone(),
            scope,
            filter: filter.clone(),
            attributes: attributes.clone(),
            dereference_member: dereference_member.clone(),
        };
        let mut write_err: Option<ProtoError> = None;
        {
            let io = &mut *io;
            let found_any = &mut found_any;
            let write_err = &mut write_err;
            search_each(session, request, config.pagesize, move |raw| {
                let io = &mut *io;
                let found_any = &mut *found_any;
                let write_err = &mut *write_err;
                Box::pin(async move {
                    let entry = Entry::from(raw);
                    if (spec.skip_entry)(&entry, &db_config.attribute_map, config) {
                        return true;
                    }
                    *found_any = true;
                    if let Err(e) = nslcd_proto::write_begin(io).await {
                        *write_err = Some(e);
                        return false;
                    }
                    for field in (spec.format_entry)(&entry, &db_config.attribute_map, config) {
                        if let Err(e) = write_field(io, &field).await {
                            *write_err = Some(e);
                            return false;
                        }
                    }
                    true
                })
            })
            .await?;
        }
        if let Some(e) = write_err {
            return Err(HandlerError::from(e));
        }
    }
    debug!("opcode {:?} found_any={found_any}", spec.opcode);
    let result = if found_any || spec.empty_is_success {
        ResultCode::Success
    } else {
        ResultCode::NotFound
    };
    nslcd_proto::write_result_code(io, result).await?;
    Ok(())
}
