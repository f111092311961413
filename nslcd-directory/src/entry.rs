//! A thin wrapper around [`ldap3::SearchEntry`] so it can implement
//! [`nslcd_attrs::AttributeSource`] (the orphan rule forbids implementing
//! a foreign trait directly on a foreign type).

use std::ops::Deref;

use ldap3::SearchEntry;
use nslcd_attrs::AttributeSource;

#[derive(Debug, Clone)]
pub struct Entry(pub SearchEntry);

impl From<SearchEntry> for Entry {
    fn from(entry: SearchEntry) -> Self {
        Entry(entry)
    }
}

impl Deref for Entry {
    type Target = SearchEntry;

    fn deref(&self) -> &SearchEntry {
        &self.0
    }
}

impl AttributeSource for Entry {
    fn dn(&self) -> &str {
        &self.0.dn
    }

    fn first_value(&self, attr: &str) -> Option<&str> {
        self.0.attrs.get(attr).and_then(|values| values.first()).map(String::as_str)
    }

    fn all_values(&self, attr: &str) -> Vec<String> {
        self.0.attrs.get(attr).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn first_value_returns_the_first_of_possibly_several() {
        let mut attrs = HashMap::new();
        attrs.insert("mail".to_string(), vec!["a@example.com".to_string(), "b@example.com".to_string()]);
        let entry = Entry(SearchEntry {
            dn: "uid=jdoe,dc=example,dc=com".to_string(),
            attrs,
            bin_attrs: HashMap::new(),
        });
        assert_eq!(entry.first_value("mail"), Some("a@example.com"));
        assert_eq!(entry.dn(), "uid=jdoe,dc=example,dc=com");
        assert_eq!(
            entry.all_values("mail"),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert!(entry.all_values("missing").is_empty());
    }
}
