//! Directory session lifecycle, paged search, and cache-invalidation
//! signalling: the pieces of the daemon that actually talk to the remote
//! directory server, as opposed to the wire protocol or configuration
//! that sit on either side of them.

mod entry;
mod error;
mod invalidator;
mod ppolicy;
mod search;
mod session;

pub use entry::Entry;
pub use error::DirectoryError;
pub use invalidator::{Invalidation, Invalidator};
pub use ppolicy::{PasswordPolicyError, PasswordPolicyResponse};
pub use search::{fetch_ranged_attribute, search_all, search_each, DereferenceMember, SearchRequest};
pub use session::DirectorySession;

pub use ldap3::SearchEntry;
