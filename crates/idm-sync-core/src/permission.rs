//! Application-specific permission orders.

use std::fmt;
use std::hash::Hash;

/// A totally ordered set of access levels inside an organization unit.
///
/// `Ord` must follow the application's notion of "more access", so that the
/// maximum of two claims is the one that wins.
pub trait PermissionOrder:
    Copy + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Application id used in error messages.
    const APPLICATION: &'static str;

    /// Parse a permission from its name as it appears in a group name.
    fn from_name(name: &str) -> Option<Self>;

    /// The lowest permission a plain member receives.
    fn base() -> Self;
}

/// Resolve two claims for the same member: the higher permission wins.
#[must_use]
pub fn resolve<P: PermissionOrder>(current: P, claimed: P) -> P {
    current.max(claimed)
}
