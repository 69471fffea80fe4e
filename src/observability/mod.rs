//! Observability module providing structured logging.
//!
//! Logs are written to stdout in pretty, compact, or JSON form, so the
//! hosting platform's log collector can pick them up without extra plumbing.

mod tracing_init;

pub use tracing_init::*;
