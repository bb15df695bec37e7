//! HTTP middleware and request-scoped extractors.

pub mod tenant;
pub mod trace;
