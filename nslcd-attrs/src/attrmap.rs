//! Per-database attribute-name table, grounded on the original project's
//! `nslcd/attmap.c`. Each named slot is bound either to a literal directory
//! attribute name or to an expression (§ [`crate::expr`]) evaluated against
//! the entry. Only a fixed allow-list of slots may hold an expression; the
//! rest are key-lookup attributes the directory must return literally.

use std::collections::HashSet;
use std::fmt;

use crate::dict::Dictionary;
use crate::expr::{self, ExprError};

/// The lookup spaces this daemon serves, matching the glossary's
/// "database" term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Database {
    Aliases,
    Ethers,
    Group,
    Hosts,
    Netgroup,
    Networks,
    Passwd,
    Protocols,
    Rpc,
    Services,
    Shadow,
}

impl Database {
    pub const ALL: [Database; 11] = [
        Database::Aliases,
        Database::Ethers,
        Database::Group,
        Database::Hosts,
        Database::Netgroup,
        Database::Networks,
        Database::Passwd,
        Database::Protocols,
        Database::Rpc,
        Database::Services,
        Database::Shadow,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Database::Aliases => "aliases",
            Database::Ethers => "ethers",
            Database::Group => "group",
            Database::Hosts => "hosts",
            Database::Netgroup => "netgroup",
            Database::Networks => "networks",
            Database::Passwd => "passwd",
            Database::Protocols => "protocols",
            Database::Rpc => "rpc",
            Database::Services => "services",
            Database::Shadow => "shadow",
        }
    }

    pub fn from_name(name: &str) -> Option<Database> {
        Database::ALL.into_iter().find(|d| d.name() == name)
    }

    /// Every slot name this database's attribute map knows about, in the
    /// order declared in [`Database::defaults`].
    pub fn attribute_slots(self) -> Vec<&'static str> {
        self.defaults().iter().map(|(slot, _)| *slot).collect()
    }

    /// Default slot -> attribute-name bindings, as shipped upstream.
    fn defaults(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Database::Aliases => &[("cn", "cn"), ("rfc822MailMember", "rfc822MailMember")],
            Database::Ethers => &[("cn", "cn"), ("macAddress", "macAddress")],
            Database::Group => &[
                ("cn", "cn"),
                ("userPassword", "userPassword"),
                ("gidNumber", "gidNumber"),
                ("memberUid", "memberUid"),
                ("member", "member"),
            ],
            Database::Hosts => &[("cn", "cn"), ("ipHostNumber", "ipHostNumber")],
            Database::Netgroup => &[
                ("cn", "cn"),
                ("nisNetgroupTriple", "nisNetgroupTriple"),
                ("memberNisNetgroup", "memberNisNetgroup"),
            ],
            Database::Networks => &[("cn", "cn"), ("ipNetworkNumber", "ipNetworkNumber")],
            Database::Passwd => &[
                ("uid", "uid"),
                ("userPassword", "userPassword"),
                ("uidNumber", "uidNumber"),
                ("gidNumber", "gidNumber"),
                ("gecos", "gecos"),
                ("homeDirectory", "homeDirectory"),
                ("loginShell", "loginShell"),
                ("class", "class"),
            ],
            Database::Protocols => &[("cn", "cn"), ("ipProtocolNumber", "ipProtocolNumber")],
            Database::Rpc => &[("cn", "cn"), ("oncRpcNumber", "oncRpcNumber")],
            Database::Services => &[
                ("cn", "cn"),
                ("ipServicePort", "ipServicePort"),
                ("ipServiceProtocol", "ipServiceProtocol"),
            ],
            Database::Shadow => &[
                ("uid", "uid"),
                ("userPassword", "userPassword"),
                ("shadowLastChange", "shadowLastChange"),
                ("shadowMin", "shadowMin"),
                ("shadowMax", "shadowMax"),
                ("shadowWarning", "shadowWarning"),
                ("shadowInactive", "shadowInactive"),
                ("shadowExpire", "shadowExpire"),
                ("shadowFlag", "shadowFlag"),
            ],
        }
    }

    /// Slots that may be bound to an expression instead of a literal
    /// attribute name. Everything else -- notably every key-lookup
    /// attribute such as `uid`, `uidNumber`, `gidNumber` of `group`, and
    /// every `cn` -- must stay a literal attribute name.
    fn expressionable_slots(self) -> &'static [&'static str] {
        match self {
            Database::Group => &["userPassword", "member"],
            Database::Passwd => &[
                "userPassword",
                "gidNumber",
                "gecos",
                "homeDirectory",
                "loginShell",
                "class",
            ],
            Database::Shadow => &[
                "userPassword",
                "shadowLastChange",
                "shadowMin",
                "shadowMax",
                "shadowWarning",
                "shadowInactive",
                "shadowExpire",
                "shadowFlag",
            ],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotValue {
    Literal(String),
    Expression(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AttrMapError {
    #[error("unknown database '{0}'")]
    UnknownDatabase(String),
    #[error("unknown slot '{0}' for database '{1}'")]
    UnknownSlot(String, &'static str),
    #[error("slot '{0}' of database '{1}' may not be bound to an expression")]
    ExpressionNotAllowed(String, &'static str),
    #[error("the group 'member' slot may only be set to the empty string \"\"")]
    MemberMustBeEmpty,
    #[error("invalid expression for slot '{0}': {1}")]
    InvalidExpression(String, ExprError),
}

/// Per-database attribute-name table.
#[derive(Debug, Clone)]
pub struct AttributeMap {
    slots: Dictionary<SlotValue>,
    database: Database,
}

impl AttributeMap {
    /// Build a map pre-populated with upstream's default literal bindings.
    pub fn defaults(database: Database) -> Self {
        let mut slots = Dictionary::new();
        for &(slot, attr) in database.defaults() {
            slots.put(slot, SlotValue::Literal(attr.to_string()));
        }
        AttributeMap { slots, database }
    }

    pub fn database(&self) -> Database {
        self.database
    }

    /// Bind `slot` to either a bare attribute name or a `"`-quoted
    /// expression, applying the allow-list and the group/member sentinel.
    pub fn set(&mut self, slot: &str, value: &str) -> Result<(), AttrMapError> {
        if !self.slots.contains(slot) {
            return Err(AttrMapError::UnknownSlot(
                slot.to_string(),
                self.database.name(),
            ));
        }
        if let Some(expr_text) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            if !self.database.expressionable_slots().contains(&slot) {
                return Err(AttrMapError::ExpressionNotAllowed(
                    slot.to_string(),
                    self.database.name(),
                ));
            }
            if self.database == Database::Group && slot == "member" && !expr_text.is_empty() {
                return Err(AttrMapError::MemberMustBeEmpty);
            }
            expr::variables_of(expr_text)
                .map_err(|e| AttrMapError::InvalidExpression(slot.to_string(), e))?;
            self.slots
                .put(slot.to_string(), SlotValue::Expression(expr_text.to_string()));
        } else {
            self.slots
                .put(slot.to_string(), SlotValue::Literal(value.to_string()));
        }
        Ok(())
    }

    /// The literal attribute name or expression text bound to `slot`.
    fn value_of(&self, slot: &str) -> Option<&SlotValue> {
        self.slots.get(slot)
    }

    /// True if `slot` is bound to the group `member` "don't fetch" sentinel.
    pub fn is_disabled(&self, slot: &str) -> bool {
        matches!(self.value_of(slot), Some(SlotValue::Expression(e)) if e.is_empty())
    }

    /// Evaluate `slot` against `entry`: the first raw value of the literal
    /// attribute name, or the result of evaluating the stored expression
    /// with `entry` as the variable source (`dn` resolves specially).
    pub fn get_value<S: AttributeSource>(&self, entry: &S, slot: &str) -> String {
        match self.value_of(slot) {
            None => String::new(),
            Some(SlotValue::Literal(attr)) => entry.first_value(attr).unwrap_or("").to_string(),
            Some(SlotValue::Expression(expr_text)) => {
                expr::expand(expr_text, |name| entry_expand(entry, name)).unwrap_or_default()
            }
        }
    }

    /// Every raw value of `slot`: all values of the literal attribute, or a
    /// single evaluated value for an expression (expressions are scalar).
    /// Used by multi-valued wire fields such as `group`'s `memberUid`.
    pub fn get_values<S: AttributeSource>(&self, entry: &S, slot: &str) -> Vec<String> {
        match self.value_of(slot) {
            None => Vec::new(),
            Some(SlotValue::Literal(attr)) => entry.all_values(attr),
            Some(SlotValue::Expression(_)) => {
                let value = self.get_value(entry, slot);
                if value.is_empty() {
                    Vec::new()
                } else {
                    vec![value]
                }
            }
        }
    }

    /// The literal directory attribute name bound to `slot`, if any. Key
    /// lookup slots (`uid`, `uidNumber`, `cn`, ...) are always literal since
    /// the allow-list in [`Database::expressionable_slots`] excludes them.
    pub fn attribute_name(&self, slot: &str) -> Option<&str> {
        match self.value_of(slot) {
            Some(SlotValue::Literal(attr)) => Some(attr.as_str()),
            _ => None,
        }
    }

    /// Add every directory attribute name `slot` needs to `set`: the raw
    /// name for a literal slot, or every variable referenced by its
    /// expression.
    pub fn add_referenced(&self, set: &mut HashSet<String>, slot: &str) {
        match self.value_of(slot) {
            None => {}
            Some(SlotValue::Literal(attr)) => {
                set.insert(attr.clone());
            }
            Some(SlotValue::Expression(expr_text)) => {
                if let Ok(vars) = expr::variables_of(expr_text) {
                    for var in vars {
                        if var != "dn" {
                            set.insert(var);
                        }
                    }
                }
            }
        }
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anything an expression can be evaluated against: an entry's DN and its
/// per-attribute first values.
pub trait AttributeSource {
    fn dn(&self) -> &str;
    fn first_value(&self, attr: &str) -> Option<&str>;

    /// Every raw value of `attr`. The default wraps [`first_value`], which
    /// is enough for scalar fixtures; a real directory entry overrides this
    /// to expose every value of a multi-valued attribute.
    fn all_values(&self, attr: &str) -> Vec<String> {
        self.first_value(attr).map(|v| vec![v.to_string()]).unwrap_or_default()
    }
}

fn entry_expand<S: AttributeSource>(entry: &S, name: &str) -> String {
    if name.eq_ignore_ascii_case("dn") {
        entry.dn().to_string()
    } else {
        entry.first_value(name).unwrap_or("").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEntry {
        dn: String,
        attrs: Vec<(&'static str, &'static str)>,
    }

    impl AttributeSource for FakeEntry {
        fn dn(&self) -> &str {
            &self.dn
        }
        fn first_value(&self, attr: &str) -> Option<&str> {
            self.attrs
                .iter()
                .find(|(k, _)| *k == attr)
                .map(|(_, v)| *v)
        }
    }

    #[test]
    fn literal_slot_returns_first_raw_value() {
        let map = AttributeMap::defaults(Database::Passwd);
        let entry = FakeEntry {
            dn: "uid=jdoe,ou=People,dc=test".into(),
            attrs: vec![("uid", "jdoe")],
        };
        assert_eq!(map.get_value(&entry, "uid"), "jdoe");
    }

    #[test]
    fn expression_slot_evaluates_against_entry() {
        let mut map = AttributeMap::defaults(Database::Passwd);
        map.set("homeDirectory", "\"/home/$uid\"").unwrap();
        let entry = FakeEntry {
            dn: "uid=jdoe,ou=People,dc=test".into(),
            attrs: vec![("uid", "jdoe")],
        };
        assert_eq!(map.get_value(&entry, "homeDirectory"), "/home/jdoe");
    }

    #[test]
    fn expression_can_reference_dn() {
        let mut map = AttributeMap::defaults(Database::Passwd);
        map.set("gecos", "\"${dn}\"").unwrap();
        let entry = FakeEntry {
            dn: "uid=jdoe,ou=People,dc=test".into(),
            attrs: vec![],
        };
        assert_eq!(map.get_value(&entry, "gecos"), "uid=jdoe,ou=People,dc=test");
    }

    #[test]
    fn key_lookup_attribute_rejects_expression() {
        let mut map = AttributeMap::defaults(Database::Group);
        let err = map.set("gidNumber", "\"$x\"").unwrap_err();
        assert_eq!(
            err,
            AttrMapError::ExpressionNotAllowed("gidNumber".into(), "group")
        );
    }

    #[test]
    fn group_member_rejects_nonempty_expression() {
        let mut map = AttributeMap::defaults(Database::Group);
        let err = map.set("member", "\"uniqueMember\"").unwrap_err();
        assert_eq!(err, AttrMapError::MemberMustBeEmpty);
    }

    #[test]
    fn group_member_accepts_empty_sentinel_and_disables_fetch() {
        let mut map = AttributeMap::defaults(Database::Group);
        map.set("member", "\"\"").unwrap();
        assert!(map.is_disabled("member"));
    }

    #[test]
    fn add_referenced_collects_literal_attribute_name() {
        let map = AttributeMap::defaults(Database::Passwd);
        let mut set = HashSet::new();
        map.add_referenced(&mut set, "uid");
        assert!(set.contains("uid"));
    }

    #[test]
    fn add_referenced_collects_expression_variables_excluding_dn() {
        let mut map = AttributeMap::defaults(Database::Passwd);
        map.set("homeDirectory", "\"/home/${uid}/${dn}\"").unwrap();
        let mut set = HashSet::new();
        map.add_referenced(&mut set, "homeDirectory");
        assert!(set.contains("uid"));
        assert!(!set.contains("dn"));
    }

    #[test]
    fn unknown_slot_is_rejected() {
        let mut map = AttributeMap::defaults(Database::Passwd);
        assert_eq!(
            map.set("notASlot", "foo").unwrap_err(),
            AttrMapError::UnknownSlot("notASlot".into(), "passwd")
        );
    }
}
