//! Consolidated test modules.
//!
//! End-to-end retention scenarios that exercise jobs, configuration, and
//! backends together.

mod database_retention;
