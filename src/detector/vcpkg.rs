use super::{parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, DependencyType, Ecosystem, ANY_VERSION};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

pub struct VcpkgDetector;

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
struct VcpkgJson {
    dependencies: Vec<Value>,
    dev_dependencies: Vec<Value>,
    overrides: Vec<Override>,
}

#[derive(Deserialize)]
struct Override {
    name: String,
    version: Option<String>,
    #[serde(rename = "version-string")]
    version_string: Option<String>,
}

/// Version fields a dependency object may carry, in order of preference.
const VERSION_KEYS: [&str; 5] = ["version>=", "version", "version-semver", "version-date", "version-string"];

impl Detector for VcpkgDetector {
    fn name(&self) -> &'static str {
        "vcpkg"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Vcpkg
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["vcpkg.json"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            parse_vcpkg_json(&content, source)
        }))
    }
}

/// Parse a `vcpkg.json` manifest.
///
/// Bare string entries carry no version unless an `overrides` entry pins one.
fn parse_vcpkg_json(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let manifest: VcpkgJson = serde_json::from_str(content).context("Invalid vcpkg.json")?;

    let overrides: HashMap<&str, &str> = manifest
        .overrides
        .iter()
        .filter_map(|o| {
            let version = o.version.as_deref().or(o.version_string.as_deref())?;
            Some((o.name.as_str(), version))
        })
        .collect();

    let mut deps = Vec::new();
    for entry in &manifest.dependencies {
        deps.extend(to_dependency(entry, &overrides, false, source));
    }
    for entry in &manifest.dev_dependencies {
        deps.extend(to_dependency(entry, &overrides, true, source));
    }

    Ok(deps)
}

fn to_dependency(
    entry: &Value,
    overrides: &HashMap<&str, &str>,
    dev_section: bool,
    source: &Path,
) -> Option<Dependency> {
    let (name, declared, host) = match entry {
        Value::String(name) => (name.as_str(), None, false),
        Value::Object(object) => {
            let name = object.get("name").and_then(Value::as_str)?;
            let declared = VERSION_KEYS
                .iter()
                .find_map(|key| object.get(*key).and_then(Value::as_str));
            let host = object.get("host").and_then(Value::as_bool).unwrap_or(false);
            (name, declared, host)
        }
        _ => return None,
    };

    let (version, mut confidence) = match declared.or_else(|| overrides.get(name).copied()) {
        Some(version) => (version, 1.0),
        None => (ANY_VERSION, 0.9),
    };

    let dependency_type = if dev_section || host {
        DependencyType::Development
    } else {
        DependencyType::Direct
    };
    if dev_section {
        confidence = 0.95;
    }

    Some(
        Dependency::new(name, version, Ecosystem::Vcpkg)
            .with_type(dependency_type)
            .with_confidence(confidence)
            .with_source(source),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(deps: &'a [Dependency], name: &str) -> &'a Dependency {
        deps.iter().find(|d| d.name() == name).unwrap()
    }

    #[test]
    fn test_parse_vcpkg_json() {
        let content = r#"{
            "name": "app",
            "version": "0.1.0",
            "dependencies": [
                "fmt",
                "zlib",
                { "name": "boost-asio", "version>=": "1.83.0" },
                { "name": "vcpkg-cmake", "host": true },
                { "name": "curl", "features": ["ssl"] }
            ],
            "overrides": [
                { "name": "zlib", "version": "1.3" }
            ]
        }"#;

        let deps = parse_vcpkg_json(content, Path::new("vcpkg.json")).unwrap();
        assert_eq!(deps.len(), 5);

        let fmt = find(&deps, "fmt");
        assert_eq!(fmt.version(), "*");
        assert_eq!(fmt.confidence(), 0.9);

        let zlib = find(&deps, "zlib");
        assert_eq!(zlib.version(), "1.3");
        assert_eq!(zlib.confidence(), 1.0);

        let asio = find(&deps, "boost-asio");
        assert_eq!(asio.version(), "1.83.0");
        assert_eq!(asio.purl(), "pkg:vcpkg/boost-asio@1.83.0");

        assert_eq!(find(&deps, "vcpkg-cmake").dependency_type(), DependencyType::Development);
        assert_eq!(find(&deps, "curl").version(), "*");
    }

    #[test]
    fn test_dev_dependencies() {
        let content = r#"{ "dev-dependencies": ["gtest"] }"#;
        let deps = parse_vcpkg_json(content, Path::new("vcpkg.json")).unwrap();
        assert_eq!(deps[0].dependency_type(), DependencyType::Development);
        assert_eq!(deps[0].confidence(), 0.95);
    }

    #[test]
    fn test_wrong_shape_is_error() {
        assert!(parse_vcpkg_json(r#"{ "dependencies": "fmt" }"#, Path::new("vcpkg.json")).is_err());
    }
}
