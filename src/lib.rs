//! diagcheck: a golden-file conformance harness for compiler diagnostics.
//!
//! Fixtures are source files whose expected diagnostics are written inline as
//! markers (`<!UNRESOLVED_REFERENCE!>foo<!>`). The harness strips the markers,
//! hands the clean source to the front end under test, and compares the reported
//! diagnostics with the expectations. A registry of every fixture is kept next to
//! the corpus and checked for drift on each run.

pub use crate::errors::{HarnessError, Result};

pub mod analysis;
pub mod annotation;
pub mod cli;
pub mod compare;
pub mod completeness;
pub mod config;
pub mod diagnostic;
pub mod errors;
pub mod fixture;
pub mod harness;
pub mod registry;
pub mod scanner;
pub mod span;
