//! Trust relationships between identities.
//!
//! A [`Trust`] value has three independent optional components. Absence of
//! a component means "no information", which is never the same as a value
//! of zero. The [`TrustGraph`] stores one `Trust` per `(truster, trustee)`
//! edge and never fails: an unknown edge reads back as [`Trust::NONE`].

mod graph;
mod trust;

pub use graph::TrustGraph;
pub use trust::{Trust, TrustValues};
