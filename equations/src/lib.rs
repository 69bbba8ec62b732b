//! A compiler for dependent pattern-matching definitions.
//!
//! Definitions written as lists of clauses, possibly refined with `with` and
//! extended with `where` auxiliaries, are compiled into case trees of a small
//! dependently typed core language. Alongside the compiled term, each
//! definition gets one equation per clause and an elimination principle that
//! follows its case structure.

// Supporting modules
pub mod source;
pub mod symbol;

// Intermediate languages
pub mod core;
pub mod surface;

// Compilation and proof support
pub mod compile;
pub mod rewrite;
pub mod tactic;

// Top level API
mod driver;

pub use crate::driver::{Driver, Status};

/// A note asking for a bug report, pointing at the package's issue tracker
/// when the package has a repository.
pub fn bug_report_note() -> String {
    match env!("CARGO_PKG_REPOSITORY") {
        "" => "please file a bug report".to_owned(),
        repository => format!("please file a bug report at: {repository}/issues/new"),
    }
}
