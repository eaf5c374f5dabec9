//! BOM serialization.
//!
//! Turns a finished [`ScanResult`] into a CycloneDX 1.5 document.

mod cyclonedx;

use crate::model::ScanResult;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Encoding of the generated BOM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BomFormat {
    #[default]
    Json,
    Xml,
}

impl BomFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            BomFormat::Json => "json",
            BomFormat::Xml => "xml",
        }
    }
}

impl std::str::FromStr for BomFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(BomFormat::Json),
            "xml" => Ok(BomFormat::Xml),
            _ => Err(format!("Unknown format: {}. Use 'json' or 'xml'", s)),
        }
    }
}

impl std::fmt::Display for BomFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Render the BOM for `result` as a string.
///
/// # Example
///
/// ```
/// use sbomscan::{output, BomFormat, Dependency, Ecosystem, ScanResult};
///
/// let mut result = ScanResult::new("demo", None, ".");
/// result.add_dependency(Dependency::new("serde", "1.0.200", Ecosystem::Cargo));
///
/// let json = output::generate(&result, BomFormat::Json)?;
/// assert!(json.contains("pkg:cargo/serde@1.0.200"));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn generate(result: &ScanResult, format: BomFormat) -> Result<String> {
    match format {
        BomFormat::Json => cyclonedx::generate_json(result),
        BomFormat::Xml => cyclonedx::generate_xml(result),
    }
}

/// Write the BOM for `result` to `path`, creating parent directories.
pub fn save(result: &ScanResult, path: impl AsRef<Path>, format: BomFormat) -> Result<()> {
    let path = path.as_ref();
    let document = generate(result, format)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    fs::write(path, document).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), format = %format, components = result.len(), "Wrote SBOM");
    Ok(())
}
