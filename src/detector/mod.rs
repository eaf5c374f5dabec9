//! Manifest detectors.
//!
//! This module provides the [`Detector`] trait and one implementation per
//! supported ecosystem. Each detector finds its manifests through the
//! [`locator`](crate::locator) and turns them into [`Dependency`] records.
//!
//! # Available Detectors
//!
//! | Detector | Manifests | Grammar |
//! |----------|-----------|---------|
//! | [`NpmDetector`] | `package.json` | JSON |
//! | [`PythonDetector`] | `requirements*.txt`, `setup.py`, `Pipfile`, `pyproject.toml` | line / regex / TOML |
//! | [`MavenDetector`] | `pom.xml` | XML |
//! | [`GradleDetector`] | `build.gradle`, `build.gradle.kts` | regex |
//! | [`ComposerDetector`] | `composer.json` | JSON |
//! | [`NugetDetector`] | `packages.config`, `*.csproj`, `*.fsproj`, `*.vbproj` | XML |
//! | [`RubyDetector`] | `Gemfile`, `*.gemspec` | regex |
//! | [`CargoDetector`] | `Cargo.toml` | TOML |
//! | [`GoDetector`] | `go.mod` | line |
//! | [`ConanDetector`] | `conanfile.txt`, `conanfile.py`, `conan.lock` | INI / regex / JSON |
//! | [`VcpkgDetector`] | `vcpkg.json` | JSON |
//! | [`CmakeDetector`] | `CMakeLists.txt` | regex |
//! | [`PlatformioDetector`] | `platformio.ini`, `library.json` | INI / JSON |
//! | [`ArduinoDetector`] | `library.properties` | line |
//! | [`MbedDetector`] | `mbed_lib.json`, `mbed_app.json`, `*.lib` | JSON / line |
//!
//! # Example
//!
//! ```no_run
//! use sbomscan::detector::{all_detectors, Detector};
//! use std::path::Path;
//!
//! let root = Path::new(".");
//! for detector in all_detectors() {
//!     if detector.detect(root) {
//!         let detection = detector.parse(root).unwrap();
//!         println!("{}: {} dependencies", detector.name(), detection.dependencies.len());
//!     }
//! }
//! ```

mod arduino;
mod cargo;
mod cmake;
mod composer;
mod conan;
mod go;
mod gradle;
mod maven;
mod mbed;
mod npm;
mod nuget;
mod platformio;
mod python;
mod ruby;
mod vcpkg;

pub use arduino::ArduinoDetector;
pub use cargo::CargoDetector;
pub use cmake::CmakeDetector;
pub use composer::ComposerDetector;
pub use conan::ConanDetector;
pub use go::GoDetector;
pub use gradle::GradleDetector;
pub use maven::MavenDetector;
pub use mbed::MbedDetector;
pub use npm::NpmDetector;
pub use nuget::NugetDetector;
pub use platformio::PlatformioDetector;
pub use python::PythonDetector;
pub use ruby::RubyDetector;
pub use vcpkg::VcpkgDetector;

use crate::locator;
use crate::model::{Dependency, Ecosystem};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// What one detector produced: dependencies plus warnings for manifests it
/// could not parse.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub dependencies: Vec<Dependency>,
    pub warnings: Vec<String>,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.warnings.is_empty()
    }
}

/// Trait for extracting declared dependencies for one ecosystem.
///
/// Implementations are stateless. [`parse`](Self::parse) only reads from disk,
/// so calling it twice on an unmodified tree gives the same records.
pub trait Detector: Send + Sync {
    /// Returns the human-readable name of this detector.
    fn name(&self) -> &'static str;

    /// Returns the ecosystem this detector reports.
    fn ecosystem(&self) -> Ecosystem;

    /// File names or `*` globs of the manifests this detector reads.
    fn manifest_files(&self) -> &[&'static str];

    /// Locates this detector's manifests below `root`.
    fn find_manifests(&self, root: &Path) -> Vec<PathBuf> {
        locator::find_manifests(root, self.manifest_files())
    }

    /// Returns true if at least one relevant manifest exists below `root`.
    fn detect(&self, root: &Path) -> bool {
        !self.find_manifests(root).is_empty()
    }

    /// Parses every manifest below `root`.
    ///
    /// A manifest that fails to parse becomes a warning in the returned
    /// [`Detection`]; the others are still parsed.
    ///
    /// # Errors
    ///
    /// Only failures that affect the whole detector are returned as errors.
    fn parse(&self, root: &Path) -> Result<Detection>;
}

/// Returns every detector in registration order.
///
/// The order is fixed: reconciliation breaks confidence ties in favour of the
/// detector registered first.
///
/// # Example
///
/// ```
/// use sbomscan::detector::all_detectors;
///
/// let detectors = all_detectors();
/// assert_eq!(detectors.len(), 15);
/// assert_eq!(detectors[0].name(), "NPM");
/// ```
pub fn all_detectors() -> Vec<Box<dyn Detector>> {
    Ecosystem::DETECTED
        .iter()
        .filter_map(|ecosystem| get_detector(*ecosystem))
        .collect()
}

/// Returns the detector for a specific ecosystem.
///
/// CocoaPods, Swift and `Unknown` have no detector.
///
/// # Example
///
/// ```
/// use sbomscan::{Ecosystem, detector::get_detector};
///
/// let detector = get_detector(Ecosystem::Go).unwrap();
/// assert_eq!(detector.manifest_files(), &["go.mod"]);
/// ```
pub fn get_detector(ecosystem: Ecosystem) -> Option<Box<dyn Detector>> {
    let detector: Box<dyn Detector> = match ecosystem {
        Ecosystem::Npm => Box::new(NpmDetector),
        Ecosystem::Pypi => Box::new(PythonDetector),
        Ecosystem::Maven => Box::new(MavenDetector),
        Ecosystem::Gradle => Box::new(GradleDetector),
        Ecosystem::Composer => Box::new(ComposerDetector),
        Ecosystem::Nuget => Box::new(NugetDetector),
        Ecosystem::Gem => Box::new(RubyDetector),
        Ecosystem::Cargo => Box::new(CargoDetector),
        Ecosystem::Go => Box::new(GoDetector),
        Ecosystem::Conan => Box::new(ConanDetector),
        Ecosystem::Vcpkg => Box::new(VcpkgDetector),
        Ecosystem::Cmake => Box::new(CmakeDetector),
        Ecosystem::Platformio => Box::new(PlatformioDetector),
        Ecosystem::Arduino => Box::new(ArduinoDetector),
        Ecosystem::Mbed => Box::new(MbedDetector),
        Ecosystem::Cocoapods | Ecosystem::Swift | Ecosystem::Unknown => return None,
    };
    Some(detector)
}

/// Runs `parse_file` on each manifest, turning per-file failures into warnings.
///
/// `parse_file` receives the absolute path and the path relative to `root`.
/// Records with a blank name are dropped with a warning.
pub(crate) fn parse_each<F>(root: &Path, manifests: &[PathBuf], mut parse_file: F) -> Detection
where
    F: FnMut(&Path, &Path) -> Result<Vec<Dependency>>,
{
    let mut detection = Detection::default();

    for manifest in manifests {
        let source = locator::relative_to(root, manifest);
        match parse_file(manifest, &source) {
            Ok(deps) => {
                let (named, unnamed): (Vec<_>, Vec<_>) =
                    deps.into_iter().partition(|dep| !dep.name().trim().is_empty());
                if !unnamed.is_empty() {
                    let message = format!(
                        "Skipped {} dependencies with an empty name in {}",
                        unnamed.len(),
                        source.display()
                    );
                    warn!("{}", message);
                    detection.warnings.push(message);
                }
                detection.dependencies.extend(named);
            }
            Err(err) => {
                let message = format!("Could not parse {}: {:#}", source.display(), err);
                warn!("{}", message);
                detection.warnings.push(message);
            }
        }
    }

    detection
}

/// The right-hand side of a Python assignment: a bracketed tuple or list,
/// or the rest of the line.
pub(crate) fn attribute_value(text: &str) -> &str {
    let Some(open) = text.chars().next().filter(|c| matches!(c, '(' | '[')) else {
        return text.lines().next().unwrap_or_default();
    };
    let close = if open == '(' { ')' } else { ']' };

    let mut depth = 0;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == open => depth += 1,
            None if c == close => {
                depth -= 1;
                if depth == 0 {
                    return &text[..=i];
                }
            }
            None => {}
        }
    }

    text
}

pub(crate) fn read_manifest(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::Path;

    pub fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}
