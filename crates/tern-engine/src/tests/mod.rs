//! Tests for the tern-engine crate.

mod helpers;
