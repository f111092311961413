use std::collections::HashSet;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use url::Url;

use nslcd_attrs::Database;

use crate::database::DatabaseConfig;
use crate::error::ConfigError;
use crate::failover::UriTable;
use crate::lexer::Lexer;
use crate::types::{parse_duration_secs, Deref, LogLevel, LogTarget, Scope, Ssl, TlsReqCert, UserSpec};

/// The default pattern for `validnames`: an anchored, case-insensitive
/// shell-account-name pattern, lifted verbatim from the original's
/// built-in default (`handle_validnames` called with a literal at
/// startup before the config file is read).
const DEFAULT_VALIDNAMES: &str = r"(?i)^[a-z0-9._@$()]([a-z0-9._@$() ~-]*[a-z0-9._@$()~-])?$";

/// Everything parsed from `nslcd.conf`: process identity, directory
/// connection parameters, and the eleven per-database search settings.
/// Grounded on `struct ldap_config` in the original's `nslcd/cfg.h`.
pub struct Config {
    pub run_as: Option<UserSpec>,
    pub run_as_group: Option<UserSpec>,
    pub threads: usize,
    pub log_target: LogTarget,
    pub log_level: LogLevel,

    pub uris: Arc<UriTable>,
    pub ldap_version: i32,
    pub binddn: Option<String>,
    pub bindpw: Option<String>,
    pub rootpwmoddn: Option<String>,
    pub rootpwmodpw: Option<String>,

    pub sasl_mech: Option<String>,
    pub sasl_realm: Option<String>,
    pub sasl_authcid: Option<String>,
    pub sasl_authzid: Option<String>,
    pub sasl_secprops: Option<String>,
    pub sasl_canonicalize: Option<bool>,
    pub krb5_ccname: Option<String>,

    pub bases: Vec<String>,
    pub scope: Scope,
    pub deref: Deref,
    pub referrals: bool,
    pub pam_authc_ppolicy: bool,

    pub bind_timelimit: Duration,
    pub timelimit: Option<Duration>,
    pub idle_timelimit: Option<Duration>,
    pub reconnect_sleeptime: Duration,
    pub reconnect_retrytime: Duration,

    pub ssl: Ssl,
    pub tls_reqcert: Option<TlsReqCert>,
    pub tls_cacertdir: Option<String>,
    pub tls_cacertfile: Option<String>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub tls_ciphers: Option<String>,

    pub pagesize: u32,
    pub nss_initgroups_ignoreusers: HashSet<String>,
    pub nss_min_uid: u32,
    pub nss_uid_offset: i64,
    pub nss_gid_offset: i64,
    pub nss_nested_groups: bool,
    pub nss_getgrent_skipmembers: bool,
    pub nss_disable_enumeration: bool,

    pub validnames: Regex,
    pub ignorecase: bool,
    pub pam_authc_search: String,
    pub pam_authz_search: Vec<String>,
    pub pam_password_prohibit_message: Option<String>,
    pub reconnect_invalidate: HashSet<Database>,
    pub cache_dn2uid_positive: Duration,
    pub cache_dn2uid_negative: Duration,

    pub databases: Vec<DatabaseConfig>,
}

impl Config {
    pub fn defaults() -> Self {
        Config {
            run_as: None,
            run_as_group: None,
            threads: 5,
            log_target: LogTarget::None,
            log_level: LogLevel::Info,

            uris: Arc::new(UriTable::new(Vec::new())),
            ldap_version: 3,
            binddn: None,
            bindpw: None,
            rootpwmoddn: None,
            rootpwmodpw: None,

            sasl_mech: None,
            sasl_realm: None,
            sasl_authcid: None,
            sasl_authzid: None,
            sasl_secprops: None,
            sasl_canonicalize: None,
            krb5_ccname: None,

            bases: Vec::new(),
            scope: Scope::Subtree,
            deref: Deref::Never,
            referrals: true,
            pam_authc_ppolicy: true,

            bind_timelimit: Duration::from_secs(10),
            timelimit: None,
            idle_timelimit: None,
            reconnect_sleeptime: Duration::from_secs(1),
            reconnect_retrytime: Duration::from_secs(10),

            ssl: Ssl::Off,
            tls_reqcert: None,
            tls_cacertdir: None,
            tls_cacertfile: None,
            tls_cert: None,
            tls_key: None,
            tls_ciphers: None,

            pagesize: 0,
            nss_initgroups_ignoreusers: HashSet::new(),
            nss_min_uid: 0,
            nss_uid_offset: 0,
            nss_gid_offset: 0,
            nss_nested_groups: false,
            nss_getgrent_skipmembers: false,
            nss_disable_enumeration: false,

            validnames: Regex::new(DEFAULT_VALIDNAMES).expect("built-in validnames pattern is valid"),
            ignorecase: false,
            pam_authc_search: "BASE".to_string(),
            pam_authz_search: Vec::new(),
            pam_password_prohibit_message: None,
            reconnect_invalidate: HashSet::new(),
            cache_dn2uid_positive: Duration::from_secs(15 * 60),
            cache_dn2uid_negative: Duration::from_secs(15 * 60),

            databases: Database::ALL.iter().map(|d| DatabaseConfig::defaults(*d)).collect(),
        }
    }

    pub fn database(&self, database: Database) -> &DatabaseConfig {
        self.databases
            .iter()
            .find(|d| d.database() == database)
            .expect("every Database variant has a DatabaseConfig entry")
    }

    fn database_mut(&mut self, database: Database) -> &mut DatabaseConfig {
        self.databases
            .iter_mut()
            .find(|d| d.database() == database)
            .expect("every Database variant has a DatabaseConfig entry")
    }

    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display_path = path.display().to_string();
        let file = std::fs::File::open(path)?;
        let mut cfg = Config::defaults();
        let mut uris = Vec::new();

        for directive in Lexer::new(BufReader::new(file)) {
            let directive = directive?;
            let line = directive.line;
            let keyword = directive.keyword.to_ascii_lowercase();
            let rest = directive.rest.as_str();
            let require_arg = |rest: &str| -> Result<&str, ConfigError> {
                if rest.is_empty() {
                    Err(ConfigError::MissingArgument {
                        path: display_path.clone(),
                        line,
                        keyword: keyword.clone(),
                    })
                } else {
                    Ok(rest)
                }
            };
            let first_token = |rest: &str| rest.split_whitespace().next().unwrap_or("");

            match keyword.as_str() {
                "uid" => cfg.run_as = Some(UserSpec::parse(require_arg(rest)?)),
                "gid" => cfg.run_as_group = Some(UserSpec::parse(require_arg(rest)?)),
                "threads" => {
                    cfg.threads = require_arg(rest)?.parse().map_err(|_| ConfigError::InvalidValue {
                        directive: "threads",
                        value: rest.to_string(),
                    })?
                }
                "log" => {
                    let mut parts = rest.split_whitespace();
                    let target = parts.next().unwrap_or("");
                    cfg.log_target = match target {
                        "none" => LogTarget::None,
                        "syslog" => LogTarget::Syslog,
                        "" => {
                            return Err(ConfigError::MissingArgument {
                                path: display_path.clone(),
                                line,
                                keyword: keyword.clone(),
                            })
                        }
                        path => LogTarget::File(path.to_string()),
                    };
                    if let Some(level) = parts.next() {
                        cfg.log_level = LogLevel::parse(level)?;
                    }
                }
                "uri" => {
                    for token in rest.split_whitespace() {
                        uris.extend(expand_uri_token(token)?);
                    }
                }
                "ldap_version" => {
                    cfg.ldap_version = require_arg(rest)?.parse().map_err(|_| ConfigError::InvalidValue {
                        directive: "ldap_version",
                        value: rest.to_string(),
                    })?
                }
                "binddn" => cfg.binddn = Some(require_arg(rest)?.to_string()),
                "bindpw" => cfg.bindpw = Some(require_arg(rest)?.to_string()),
                "rootpwmoddn" => cfg.rootpwmoddn = Some(require_arg(rest)?.to_string()),
                "rootpwmodpw" => cfg.rootpwmodpw = Some(require_arg(rest)?.to_string()),
                "sasl_mech" => cfg.sasl_mech = Some(require_arg(rest)?.to_string()),
                "sasl_realm" => cfg.sasl_realm = Some(require_arg(rest)?.to_string()),
                "sasl_authcid" => cfg.sasl_authcid = Some(require_arg(rest)?.to_string()),
                "sasl_authzid" => cfg.sasl_authzid = Some(require_arg(rest)?.to_string()),
                "sasl_secprops" => cfg.sasl_secprops = Some(require_arg(rest)?.to_string()),
                "sasl_nocanon" => cfg.sasl_canonicalize = Some(!parse_bool(require_arg(rest)?)?),
                "krb5_ccname" => cfg.krb5_ccname = Some(require_arg(rest)?.to_string()),
                "base" => {
                    let map = first_token(rest);
                    match Database::from_name(map) {
                        Some(db) => {
                            let value = rest[map.len()..].trim();
                            cfg.database_mut(db).bases.push(resolve_base(value));
                        }
                        None => cfg.bases.push(resolve_base(require_arg(rest)?)),
                    }
                }
                "scope" => {
                    let map = first_token(rest);
                    match Database::from_name(map) {
                        Some(db) => {
                            let value = first_token(rest[map.len()..].trim());
                            cfg.database_mut(db).scope = Some(Scope::parse(value)?);
                        }
                        None => cfg.scope = Scope::parse(require_arg(rest)?)?,
                    }
                }
                "deref" => cfg.deref = Deref::parse(require_arg(rest)?)?,
                "referrals" => cfg.referrals = parse_bool(require_arg(rest)?)?,
                "filter" => {
                    let map = first_token(rest);
                    let db = Database::from_name(map).ok_or_else(|| ConfigError::UnknownDatabase {
                        path: display_path.clone(),
                        line,
                        name: map.to_string(),
                    })?;
                    let value = rest[map.len()..].trim();
                    cfg.database_mut(db).filter = Some(require_arg(value)?.to_string());
                }
                "map" => {
                    let map = first_token(rest);
                    let db = Database::from_name(map).ok_or_else(|| ConfigError::UnknownDatabase {
                        path: display_path.clone(),
                        line,
                        name: map.to_string(),
                    })?;
                    let after_map = rest[map.len()..].trim_start();
                    let slot = first_token(after_map);
                    let value = after_map[slot.len()..].trim();
                    cfg.database_mut(db)
                        .set_mapping(slot, require_arg(value)?)
                        .map_err(|source| ConfigError::Attribute {
                            path: display_path.clone(),
                            line,
                            source,
                        })?;
                }
                "pam_authc_ppolicy" => cfg.pam_authc_ppolicy = parse_bool(require_arg(rest)?)?,
                "bind_timelimit" => cfg.bind_timelimit = parse_duration_secs(require_arg(rest)?)?,
                "timelimit" => {
                    let v: i64 = require_arg(rest)?.parse().map_err(|_| ConfigError::InvalidValue {
                        directive: "timelimit",
                        value: rest.to_string(),
                    })?;
                    cfg.timelimit = if v <= 0 { None } else { Some(Duration::from_secs(v as u64)) };
                }
                "idle_timelimit" => {
                    let v: u64 = require_arg(rest)?.parse().map_err(|_| ConfigError::InvalidValue {
                        directive: "idle_timelimit",
                        value: rest.to_string(),
                    })?;
                    cfg.idle_timelimit = if v == 0 { None } else { Some(Duration::from_secs(v)) };
                }
                "reconnect_sleeptime" => cfg.reconnect_sleeptime = parse_duration_secs(require_arg(rest)?)?,
                "reconnect_retrytime" => cfg.reconnect_retrytime = parse_duration_secs(require_arg(rest)?)?,
                "ssl" => cfg.ssl = Ssl::parse(require_arg(rest)?)?,
                "tls_reqcert" => cfg.tls_reqcert = Some(TlsReqCert::parse(require_arg(rest)?)?),
                "tls_cacertdir" => cfg.tls_cacertdir = Some(require_arg(rest)?.to_string()),
                "tls_cacertfile" | "tls_randfile" => cfg.tls_cacertfile = Some(require_arg(rest)?.to_string()),
                "tls_cert" => cfg.tls_cert = Some(require_arg(rest)?.to_string()),
                "tls_key" => cfg.tls_key = Some(require_arg(rest)?.to_string()),
                "tls_ciphers" => cfg.tls_ciphers = Some(require_arg(rest)?.to_string()),
                "pagesize" => {
                    cfg.pagesize = require_arg(rest)?.parse().map_err(|_| ConfigError::InvalidValue {
                        directive: "pagesize",
                        value: rest.to_string(),
                    })?
                }
                "nss_initgroups_ignoreusers" => {
                    cfg.nss_initgroups_ignoreusers = require_arg(rest)?.split(',').map(|s| s.trim().to_string()).collect()
                }
                "nss_min_uid" => {
                    cfg.nss_min_uid = require_arg(rest)?.parse().map_err(|_| ConfigError::InvalidValue {
                        directive: "nss_min_uid",
                        value: rest.to_string(),
                    })?
                }
                "nss_uid_offset" => {
                    cfg.nss_uid_offset = require_arg(rest)?.parse().map_err(|_| ConfigError::InvalidValue {
                        directive: "nss_uid_offset",
                        value: rest.to_string(),
                    })?
                }
                "nss_gid_offset" => {
                    cfg.nss_gid_offset = require_arg(rest)?.parse().map_err(|_| ConfigError::InvalidValue {
                        directive: "nss_gid_offset",
                        value: rest.to_string(),
                    })?
                }
                "nss_nested_groups" => cfg.nss_nested_groups = parse_bool(require_arg(rest)?)?,
                "nss_getgrent_skipmembers" => cfg.nss_getgrent_skipmembers = parse_bool(require_arg(rest)?)?,
                "nss_disable_enumeration" => cfg.nss_disable_enumeration = parse_bool(require_arg(rest)?)?,
                "validnames" => {
                    cfg.validnames = parse_validnames(require_arg(rest)?).map_err(|source| ConfigError::Regex {
                        path: display_path.clone(),
                        line,
                        source,
                    })?
                }
                "ignorecase" => cfg.ignorecase = parse_bool(require_arg(rest)?)?,
                "pam_authc_search" => cfg.pam_authc_search = require_arg(rest)?.to_string(),
                "pam_authz_search" => cfg.pam_authz_search.push(rest.to_string()),
                "pam_password_prohibit_message" => cfg.pam_password_prohibit_message = Some(require_arg(rest)?.to_string()),
                "reconnect_invalidate" => {
                    for name in require_arg(rest)?.split_whitespace().flat_map(|t| t.split(',')) {
                        let db = Database::from_name(name).ok_or_else(|| ConfigError::UnknownDatabase {
                            path: display_path.clone(),
                            line,
                            name: name.to_string(),
                        })?;
                        cfg.reconnect_invalidate.insert(db);
                    }
                }
                "cache" => {
                    let mut parts = rest.split_whitespace();
                    let name = parts.next().ok_or_else(|| ConfigError::MissingArgument {
                        path: display_path.clone(),
                        line,
                        keyword: keyword.clone(),
                    })?;
                    let first = parts
                        .next()
                        .ok_or_else(|| ConfigError::MissingArgument {
                            path: display_path.clone(),
                            line,
                            keyword: keyword.clone(),
                        })
                        .and_then(|t| parse_duration_secs(t))?;
                    let second = match parts.next() {
                        Some(t) => parse_duration_secs(t)?,
                        None => first,
                    };
                    if name.eq_ignore_ascii_case("dn2uid") {
                        cfg.cache_dn2uid_positive = first;
                        cfg.cache_dn2uid_negative = second;
                    } else {
                        return Err(ConfigError::InvalidValue {
                            directive: "cache",
                            value: name.to_string(),
                        });
                    }
                }
                other => {
                    return Err(ConfigError::UnknownDirective {
                        path: display_path.clone(),
                        line,
                        keyword: other.to_string(),
                    })
                }
            }
        }

        if uris.is_empty() {
            return Err(ConfigError::NoUris);
        }
        cfg.uris = Arc::new(UriTable::new(uris));
        Ok(cfg)
    }
}

fn parse_bool(token: &str) -> Result<bool, ConfigError> {
    match token.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            directive: "<boolean>",
            value: other.to_string(),
        }),
    }
}

/// `base domain` resolves to the DNS-domain-derived DN in the original
/// (via `ldap_domain2dn`); without that platform hook every other value
/// is used as a literal DN.
fn resolve_base(value: &str) -> String {
    value.to_string()
}

/// Expand one `uri` directive token: a literal URI passes through
/// unchanged, `dns:domain` expands to every `_ldap._tcp.<domain>` SRV
/// target in priority/weight order. A bare `dns` (expand against the
/// resolver's own search domain, per the original's `ldap_domain2hostlist`)
/// isn't supported in this rendition -- there's no portable way to read the
/// system search domain through `trust-dns-resolver`'s public API, so an
/// explicit domain is required here.
fn expand_uri_token(token: &str) -> Result<Vec<String>, ConfigError> {
    if token == "dns" {
        return Err(ConfigError::InvalidValue {
            directive: "uri",
            value: "bare `dns` is not supported in this rendition; use dns:<domain>".to_string(),
        });
    }
    match token.strip_prefix("dns:") {
        Some(domain) => resolve_dns_uris(domain),
        None => Ok(vec![token.to_string()]),
    }
}

fn resolve_dns_uris(domain: &str) -> Result<Vec<String>, ConfigError> {
    let resolver = trust_dns_resolver::Resolver::from_system_conf().map_err(|e| ConfigError::InvalidValue {
        directive: "uri",
        value: format!("could not read system resolver configuration: {e}"),
    })?;
    let query = format!("_ldap._tcp.{domain}");
    let response = resolver.srv_lookup(&query).map_err(|e| ConfigError::InvalidValue {
        directive: "uri",
        value: format!("SRV lookup for {query} failed: {e}"),
    })?;
    let mut records: Vec<_> = response.iter().collect();
    records.sort_by_key(|r| (r.priority(), std::cmp::Reverse(r.weight())));
    let uris: Result<Vec<String>, ConfigError> = records
        .into_iter()
        .map(|record| {
            let host = record.target().to_utf8();
            let host = host.trim_end_matches('.');
            Url::parse(&format!("ldap://{host}:{}/", record.port()))
                .map(|url| url.to_string())
                .map_err(|e| ConfigError::InvalidValue {
                    directive: "uri",
                    value: format!("building a URI for SRV target {host}: {e}"),
                })
        })
        .collect();
    let uris = uris?;
    if uris.is_empty() {
        return Err(ConfigError::InvalidValue {
            directive: "uri",
            value: format!("no SRV records found for {query}"),
        });
    }
    Ok(uris)
}

/// Parses the `/pattern/flags` syntax `validnames` shares with the
/// original (a leading `/`, the pattern, a closing `/`, then flag
/// characters — only `i` for case-insensitive is recognized).
fn parse_validnames(value: &str) -> Result<Regex, regex::Error> {
    if let Some(rest) = value.strip_prefix('/') {
        if let Some(end) = rest.rfind('/') {
            let pattern = &rest[..end];
            let flags = &rest[end + 1..];
            let prefix = if flags.contains('i') { "(?i)" } else { "" };
            return Regex::new(&format!("{prefix}{pattern}"));
        }
    }
    Regex::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_a_representative_config_file() {
        let file = write_config(
            "uid nslcd\n\
             gid nslcd\n\
             uri ldap://localhost:389/ ldap://backup:389/\n\
             base dc=example,dc=com\n\
             base passwd ou=people,dc=example,dc=com\n\
             scope passwd one\n\
             filter group (&(objectClass=posixGroup)(!(nsAccountLock=true)))\n\
             map passwd uid accountName\n\
             timelimit 30\n\
             reconnect_sleeptime 2\n\
             reconnect_retrytime 20\n\
             cache dn2uid 600 60\n\
             pam_authz_search (&(objectClass=posixAccount)(uid=$username))\n",
        );
        let cfg = Config::parse(file.path()).unwrap();
        assert_eq!(cfg.run_as, Some(UserSpec::Name("nslcd".to_string())));
        assert_eq!(cfg.uris.len(), 2);
        assert_eq!(cfg.uris.uri_at(0), "ldap://localhost:389/");
        assert_eq!(cfg.bases, vec!["dc=example,dc=com".to_string()]);
        assert_eq!(
            cfg.database(Database::Passwd).bases,
            vec!["ou=people,dc=example,dc=com".to_string()]
        );
        assert_eq!(cfg.database(Database::Passwd).scope, Some(Scope::OneLevel));
        assert!(cfg.database(Database::Group).filter.as_deref().unwrap().contains("posixGroup"));
        assert_eq!(cfg.timelimit, Some(Duration::from_secs(30)));
        assert_eq!(cfg.reconnect_sleeptime, Duration::from_secs(2));
        assert_eq!(cfg.cache_dn2uid_positive, Duration::from_secs(600));
        assert_eq!(cfg.cache_dn2uid_negative, Duration::from_secs(60));
        assert_eq!(cfg.pam_authz_search.len(), 1);
    }

    #[test]
    fn missing_uri_is_an_error() {
        let file = write_config("base dc=example,dc=com\n");
        assert!(matches!(Config::parse(file.path()), Err(ConfigError::NoUris)));
    }

    #[test]
    fn unknown_directive_is_rejected() {
        let file = write_config("uri ldap://localhost\nbogus value\n");
        assert!(matches!(
            Config::parse(file.path()),
            Err(ConfigError::UnknownDirective { line: 2, .. })
        ));
    }

    #[test]
    fn map_on_an_unmappable_slot_is_rejected() {
        let file = write_config("uri ldap://localhost\nmap passwd uid \"${uid}\"\n");
        assert!(matches!(Config::parse(file.path()), Err(ConfigError::Attribute { .. })));
    }

    #[test]
    fn default_validnames_accepts_typical_account_names() {
        let cfg = Config::defaults();
        assert!(cfg.validnames.is_match("jdoe"));
        assert!(cfg.validnames.is_match("svc-backup$"));
        assert!(!cfg.validnames.is_match("has a/slash"));
    }
}
