//! End-to-end isolation scenarios.
//!
//! Every test that touches resources checks both directions: the acting tenant
//! sees its own rows, and never another tenant's.

pub mod enforcement;
pub mod namespacing;
pub mod registry;
pub mod resolution;
