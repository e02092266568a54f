//! # Hawser Platform
//!
//! Shared foundation types for the Hawser SSH client.
//!
//! This crate provides the unified error taxonomy (`HawserError`,
//! `HawserResult`) used by every other crate in the workspace.
//!
//! # Examples
//!
//! ```
//! use hawser_platform::{HawserError, HawserResult};
//!
//! fn example_function() -> HawserResult<String> {
//!     Ok("Hello, Hawser!".to_string())
//! }
//!
//! # fn main() -> HawserResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, Hawser!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{disconnect_reason, HawserError, HawserResult};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
