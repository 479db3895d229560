//! Output formatters for detection reports.
//!
//! - [`TextOutput`] for terminals
//! - [`JsonOutput`] for automation and scripting

pub mod json;
pub mod text;

pub use json::{JsonOutput, JsonOutputError};
pub use text::TextOutput;
