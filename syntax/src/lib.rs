//! Parsers for the INI-style settings file:
//!
//! ```ini
//! # comment
//! [SINKING]
//! sink_dir = derivatives
//! qc_dir = qc
//! ```
#[macro_use]
mod macros;
mod parse;
pub use parse::{parse, Error};
pub mod ast;
