//! Core data types for dependencies and scan results.
//!
//! - [`Dependency`] - A dependency declared in some manifest
//! - [`DependencyKey`] - The `(name, version, ecosystem)` identity used for dedup
//! - [`Ecosystem`] - The package-management universe it belongs to
//! - [`ScanResult`] - Complete scan results
//!
//! # Example
//!
//! ```
//! use sbomscan::{Dependency, Ecosystem, ScanResult};
//!
//! let dep = Dependency::new("lodash", "^4.17.21", Ecosystem::Npm);
//! assert_eq!(dep.version(), "4.17.21");
//! assert_eq!(dep.purl(), "pkg:npm/lodash@4.17.21");
//!
//! let mut result = ScanResult::new("demo", None, ".");
//! result.add_dependency(dep);
//! assert_eq!(result.len(), 1);
//! ```

mod dependency;
pub mod purl;
mod scan_result;

pub use dependency::*;
pub use scan_result::*;
