//! Connection controller tests.
//!
//! Test organization:
//! - lifecycle.rs: lazy construction, single-flight, halting
//! - failures.rs: construction, send, proxy and teardown failures, backoff
//! - events.rs: data forwarding, both proxy event styles, ready signalling

mod failures;
