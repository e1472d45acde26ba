//! Small shared utilities.

pub mod ttl;

pub use ttl::TtlMap;
