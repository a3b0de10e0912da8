//! Decides whether a post or reply may be shown to a viewer.
//!
//! The rules are pure: they read the trust graph, a [`ContentSource`] and one
//! clock reading and never fail. Listings obtain a [`ViewerScope`] from
//! [`VisibilityFilter::scope`] and run every check of that listing through
//! it, so the whole listing sees one viewer and one instant.

mod clock;
mod filter;

pub use clock::{Clock, FixedClock, SystemClock};
pub use filter::{ContentItem, ContentSource, ViewerScope, VisibilityFilter, VisibilityPolicy};
