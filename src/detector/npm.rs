use super::{parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, DependencyType, Ecosystem, ANY_VERSION};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub struct NpmDetector;

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PackageJson {
    dependencies: BTreeMap<String, Value>,
    dev_dependencies: BTreeMap<String, Value>,
    peer_dependencies: BTreeMap<String, Value>,
    optional_dependencies: BTreeMap<String, Value>,
}

/// Specs that point somewhere other than the registry and carry no version.
const PROTOCOL_PREFIXES: &[&str] = &[
    "file:",
    "link:",
    "workspace:",
    "portal:",
    "npm:",
    "git:",
    "git+",
    "github:",
    "gitlab:",
    "bitbucket:",
    "http://",
    "https://",
];

impl Detector for NpmDetector {
    fn name(&self) -> &'static str {
        "NPM"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["package.json"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            parse_package_json(&content, source)
        }))
    }
}

fn parse_package_json(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let manifest: PackageJson =
        serde_json::from_str(content).context("Invalid package.json")?;

    let sections = [
        (&manifest.dependencies, DependencyType::Direct, 1.0_f64),
        (&manifest.dev_dependencies, DependencyType::Development, 1.0),
        (&manifest.peer_dependencies, DependencyType::Direct, 0.9),
        (&manifest.optional_dependencies, DependencyType::Direct, 0.9),
    ];

    let mut deps = Vec::new();
    for (section, dependency_type, confidence) in sections {
        for (name, spec) in section {
            let spec = spec.as_str().unwrap_or_default();
            let (version, confidence) = if is_protocol_spec(spec) {
                (ANY_VERSION, confidence.min(0.9))
            } else {
                (spec, confidence)
            };

            deps.push(
                Dependency::new(name.as_str(), version, Ecosystem::Npm)
                    .with_type(dependency_type)
                    .with_confidence(confidence)
                    .with_source(source),
            );
        }
    }

    Ok(deps)
}

fn is_protocol_spec(spec: &str) -> bool {
    let spec = spec.trim();
    PROTOCOL_PREFIXES.iter().any(|prefix| spec.starts_with(prefix))
        // `user/repo` GitHub shorthand
        || (spec.contains('/') && !spec.starts_with('@'))
}
