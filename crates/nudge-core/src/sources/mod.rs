//! Candidate source implementations.

pub mod http;

pub use http::{HttpCandidateSource, HttpCandidateSourceConfig};
