//! Collaborators of the endpoint table.

use maple_dispatch_filter::MessageFilter;
use maple_dispatch_types::FilterId;

/// A routable entry. The table reads its filter and priority and never
/// interprets anything else about it.
pub trait RoutingTarget: Send + Sync {
    fn filter(&self) -> &MessageFilter;

    fn priority(&self) -> i32;

    /// Service entries can only be added while the owner is open.
    fn is_service(&self) -> bool {
        true
    }
}

/// The dispatcher that owns a table.
///
/// Notifications are delivered after the table lock has been released.
pub trait DispatchOwner: Send + Sync {
    fn is_closed(&self) -> bool;

    fn entry_added(&self, _filter: FilterId) {}

    fn entry_removed(&self, _filter: FilterId) {}
}
