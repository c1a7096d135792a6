//! Dispatch Message Filters.
//!
//! Predicates that decide which endpoint an envelope is routed to, and the
//! priority-ordered [`FilterTable`] that indexes them.
//!
//! ## Filter kinds
//!
//! | Kind | Matches when | Index |
//! |---|---|---|
//! | match-all / match-none | always / never | constant |
//! | action | the envelope action is in the filter's set | hash on action |
//! | AND | both operands match (second skipped if the first fails) | linear, reports address match |
//! | prefix | the destination starts with the endpoint address and reference headers are present | segment trie per host mode |
//! | query | a compiled structural expression is truthy | shared-document query engine |
//! | custom | an application predicate returns true | linear |

pub mod action;
pub mod and;
pub mod custom;
pub mod error;
pub mod filter;
pub mod index;
pub mod prefix;
pub mod query;
pub mod table;

pub use action::ActionFilter;
pub use and::{AndFilter, AndMatch};
pub use custom::{CustomFilter, EnvelopePredicate};
pub use error::{FilterError, Result};
pub use filter::{FilterKind, IndexKind, MessageFilter};
pub use index::{FilterIndex, MatchSink};
pub use prefix::{AddressKey, PrefixAddressFilter};
pub use query::QueryFilter;
pub use table::{FilterTable, TableMatch};
