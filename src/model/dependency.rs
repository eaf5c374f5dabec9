use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::purl;

/// Version sentinel for "unspecified / unconstrained".
pub const ANY_VERSION: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Pypi,
    Maven,
    Gradle,
    Composer,
    Nuget,
    Gem,
    Cargo,
    #[serde(rename = "golang", alias = "go")]
    Go,
    Cocoapods,
    Swift,
    Conan,
    Vcpkg,
    Platformio,
    Arduino,
    Mbed,
    Cmake,
    Unknown,
}

impl Ecosystem {
    /// Every ecosystem that has a registered detector, in registration order.
    pub const DETECTED: [Ecosystem; 15] = [
        Ecosystem::Npm,
        Ecosystem::Pypi,
        Ecosystem::Maven,
        Ecosystem::Gradle,
        Ecosystem::Composer,
        Ecosystem::Nuget,
        Ecosystem::Gem,
        Ecosystem::Cargo,
        Ecosystem::Go,
        Ecosystem::Conan,
        Ecosystem::Vcpkg,
        Ecosystem::Cmake,
        Ecosystem::Platformio,
        Ecosystem::Arduino,
        Ecosystem::Mbed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "pypi",
            Ecosystem::Maven => "maven",
            Ecosystem::Gradle => "gradle",
            Ecosystem::Composer => "composer",
            Ecosystem::Nuget => "nuget",
            Ecosystem::Gem => "gem",
            Ecosystem::Cargo => "cargo",
            Ecosystem::Go => "golang",
            Ecosystem::Cocoapods => "cocoapods",
            Ecosystem::Swift => "swift",
            Ecosystem::Conan => "conan",
            Ecosystem::Vcpkg => "vcpkg",
            Ecosystem::Platformio => "platformio",
            Ecosystem::Arduino => "arduino",
            Ecosystem::Mbed => "mbed",
            Ecosystem::Cmake => "cmake",
            Ecosystem::Unknown => "unknown",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "NPM",
            Ecosystem::Pypi => "PyPI",
            Ecosystem::Maven => "Maven",
            Ecosystem::Gradle => "Gradle",
            Ecosystem::Composer => "Composer",
            Ecosystem::Nuget => "NuGet",
            Ecosystem::Gem => "RubyGems",
            Ecosystem::Cargo => "Cargo",
            Ecosystem::Go => "Go",
            Ecosystem::Cocoapods => "CocoaPods",
            Ecosystem::Swift => "Swift",
            Ecosystem::Conan => "Conan",
            Ecosystem::Vcpkg => "vcpkg",
            Ecosystem::Platformio => "PlatformIO",
            Ecosystem::Arduino => "Arduino",
            Ecosystem::Mbed => "Mbed",
            Ecosystem::Cmake => "CMake",
            Ecosystem::Unknown => "Unknown",
        }
    }

    /// Package-URL type used when a canonical identifier has to be synthesized.
    ///
    /// Gradle resolves from Maven repositories, so both share `maven`. CMake and
    /// Mbed have no registry of their own and fall back to `generic`.
    pub fn purl_type(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "pypi",
            Ecosystem::Maven | Ecosystem::Gradle => "maven",
            Ecosystem::Composer => "composer",
            Ecosystem::Nuget => "nuget",
            Ecosystem::Gem => "gem",
            Ecosystem::Cargo => "cargo",
            Ecosystem::Go => "golang",
            Ecosystem::Cocoapods => "cocoapods",
            Ecosystem::Swift => "swift",
            Ecosystem::Conan => "conan",
            Ecosystem::Vcpkg => "vcpkg",
            Ecosystem::Platformio => "platformio",
            Ecosystem::Arduino => "arduino",
            Ecosystem::Cmake | Ecosystem::Mbed | Ecosystem::Unknown => "generic",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Why a dependency is declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    #[default]
    Direct,
    Transitive,
    Development,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::Direct => "direct",
            DependencyType::Transitive => "transitive",
            DependencyType::Development => "development",
        }
    }
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
}

/// Identity of a dependency for deduplication: `(name, version, ecosystem)`.
///
/// Ordered by ecosystem first so that a [`ScanResult`](super::ScanResult)
/// iterates grouped by ecosystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyKey {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version: String,
}

/// A single declared dependency observed in a manifest.
///
/// Built by detectors through the `with_*` methods and read-only afterwards.
/// There is no `PartialEq`: two records are the same logical
/// dependency when their [`key`](Self::key)s match, regardless of source file
/// or confidence.
#[derive(Debug, Clone, Serialize)]
pub struct Dependency {
    name: String,
    version: String,
    ecosystem: Ecosystem,
    #[serde(skip_serializing_if = "Option::is_none")]
    purl: Option<String>,
    #[serde(rename = "type")]
    dependency_type: DependencyType,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_file: Option<PathBuf>,
    #[serde(flatten)]
    metadata: DependencyMetadata,
    confidence: f64,
}

impl Dependency {
    /// Creates a direct dependency with full confidence.
    ///
    /// The version goes through [`normalize_version`], so range operators are
    /// stripped and an empty version becomes [`ANY_VERSION`].
    pub fn new(name: impl Into<String>, version: impl AsRef<str>, ecosystem: Ecosystem) -> Self {
        Self {
            name: name.into().trim().to_string(),
            version: normalize_version(version.as_ref()),
            ecosystem,
            purl: None,
            dependency_type: DependencyType::Direct,
            source_file: None,
            metadata: DependencyMetadata::default(),
            confidence: 1.0,
        }
    }

    pub fn with_type(mut self, dependency_type: DependencyType) -> Self {
        self.dependency_type = dependency_type;
        self
    }

    /// Confidence is clamped into `[0, 1]`.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    pub fn with_source(mut self, source_file: impl Into<PathBuf>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    pub fn with_purl(mut self, purl: impl Into<String>) -> Self {
        self.purl = Some(purl.into());
        self
    }

    pub fn with_metadata(mut self, metadata: DependencyMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    pub fn dependency_type(&self) -> DependencyType {
        self.dependency_type
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    pub fn metadata(&self) -> &DependencyMetadata {
        &self.metadata
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn is_unversioned(&self) -> bool {
        self.version == ANY_VERSION
    }

    /// The canonical package URL: the one a detector built from native
    /// coordinates, or one synthesized from `(ecosystem, name, version)`.
    pub fn purl(&self) -> String {
        match &self.purl {
            Some(purl) => purl.clone(),
            None => purl::synthesize(self.ecosystem, &self.name, &self.version),
        }
    }

    pub fn key(&self) -> DependencyKey {
        DependencyKey {
            ecosystem: self.ecosystem,
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// Strips quotes and leading comparator operators from a version spec.
///
/// `"^4.17.21"` becomes `4.17.21`, `"==2.31.0"` becomes `2.31.0` and
/// `"~> 7.0"` becomes `7.0`. Anything that is empty afterwards turns into
/// [`ANY_VERSION`].
pub fn normalize_version(raw: &str) -> String {
    const OPERATORS: [&str; 10] = ["~>", ">=", "<=", "==", "!=", "^", "~", ">", "<", "="];

    let mut version = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();

    'strip: loop {
        for op in OPERATORS {
            if let Some(rest) = version.strip_prefix(op) {
                version = rest.trim_start();
                continue 'strip;
            }
        }
        break;
    }

    if version.is_empty() {
        ANY_VERSION.to_string()
    } else {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_version_operators() {
        assert_eq!(normalize_version("^4.17.21"), "4.17.21");
        assert_eq!(normalize_version("~1.2"), "1.2");
        assert_eq!(normalize_version(">=2.0"), "2.0");
        assert_eq!(normalize_version("==2.31.0"), "2.31.0");
        assert_eq!(normalize_version("~> 7.0"), "7.0");
        assert_eq!(normalize_version("= 1.0.0"), "1.0.0");
        assert_eq!(normalize_version("\"1.5\""), "1.5");
    }

    #[test]
    fn test_normalize_version_sentinel() {
        assert_eq!(normalize_version(""), "*");
        assert_eq!(normalize_version("   "), "*");
        assert_eq!(normalize_version(">="), "*");
        assert_eq!(normalize_version("*"), "*");
    }

    #[test]
    fn test_normalize_version_keeps_inner_operators() {
        assert_eq!(normalize_version("^8.0|^9.0"), "8.0|^9.0");
        assert_eq!(normalize_version("1.0.0-beta.1"), "1.0.0-beta.1");
    }

    #[test]
    fn test_confidence_is_clamped() {
        let dep = Dependency::new("a", "1", Ecosystem::Npm).with_confidence(1.7);
        assert_eq!(dep.confidence(), 1.0);

        let dep = Dependency::new("a", "1", Ecosystem::Npm).with_confidence(-0.3);
        assert_eq!(dep.confidence(), 0.0);
    }

    #[test]
    fn test_key_ignores_source_and_confidence() {
        let a = Dependency::new("lodash", "^4.17.21", Ecosystem::Npm)
            .with_source("package.json")
            .with_confidence(1.0);
        let b = Dependency::new("lodash", "4.17.21", Ecosystem::Npm)
            .with_source("web/package.json")
            .with_confidence(0.9);

        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_key_distinguishes_ecosystem() {
        let maven = Dependency::new("junit:junit", "4.13.2", Ecosystem::Maven);
        let gradle = Dependency::new("junit:junit", "4.13.2", Ecosystem::Gradle);
        assert_ne!(maven.key(), gradle.key());
    }

    #[test]
    fn test_explicit_purl_wins() {
        let dep = Dependency::new("org.slf4j:slf4j-api", "2.0.9", Ecosystem::Maven)
            .with_purl("pkg:maven/org.slf4j/slf4j-api@2.0.9");
        assert_eq!(dep.purl(), "pkg:maven/org.slf4j/slf4j-api@2.0.9");
    }

    #[test]
    fn test_ecosystem_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Ecosystem::Go).unwrap(), "\"golang\"");
        assert_eq!(serde_json::to_string(&Ecosystem::Npm).unwrap(), "\"npm\"");
        let parsed: Ecosystem = serde_json::from_str("\"go\"").unwrap();
        assert_eq!(parsed, Ecosystem::Go);
    }
}
