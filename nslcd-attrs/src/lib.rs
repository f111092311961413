//! Dictionary/set, expression engine and attribute map: the three small,
//! pure-data components (B, C, D) shared by the configuration loader and
//! the request handlers.

pub mod attrmap;
pub mod dict;
pub mod expr;

pub use attrmap::{AttrMapError, AttributeMap, AttributeSource, Database};
pub use dict::{Dictionary, Set};
pub use expr::{expand, variables_of, ExprError};
