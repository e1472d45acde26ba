//! Built-in signal collectors.
//!
//! External domains (calendar, coursework, email) plug in through the
//! `SignalCollector` trait from their own adapter crates; only the
//! internal, engine-derived collector lives here.

pub mod internal;

pub use internal::InternalCollector;
