//! Per-database search settings: search bases, scope override, a default
//! filter override, and the attribute map. Grounded on `base_get_var`,
//! `scope_get_var` and `filter_get_var` in the original's `nslcd/cfg.c`,
//! which resolve a `(map, keyword)` pair to the field being updated.

use nslcd_attrs::{AttrMapError, AttributeMap, Database};

use crate::types::Scope;

/// Search settings specific to one of the eleven databases, layered over
/// the global defaults in [`crate::Config`].
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    database: Database,
    /// Search bases to use instead of the global `base` directive(s); the
    /// original caps this list at `NSS_LDAP_CONFIG_MAX_BASES` (currently
    /// 10). Empty means "use the global bases".
    pub bases: Vec<String>,
    pub scope: Option<Scope>,
    pub filter: Option<String>,
    pub attribute_map: AttributeMap,
}

impl DatabaseConfig {
    pub(crate) fn defaults(database: Database) -> Self {
        DatabaseConfig {
            database,
            bases: Vec::new(),
            scope: None,
            filter: None,
            attribute_map: AttributeMap::defaults(database),
        }
    }

    pub fn database(&self) -> Database {
        self.database
    }

    pub(crate) fn set_mapping(&mut self, slot: &str, value: &str) -> Result<(), AttrMapError> {
        self.attribute_map.set(slot, value)
    }
}
