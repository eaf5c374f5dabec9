pub mod config;
pub mod detector;
pub mod error;
pub mod locator;
pub mod model;
pub mod output;
pub mod scanner;

pub use config::Config;
pub use detector::Detector;
pub use error::ScanError;
pub use model::{Dependency, DependencyType, Ecosystem, ScanResult};
pub use output::BomFormat;
pub use scanner::Scanner;
