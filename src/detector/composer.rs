use super::{parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, DependencyType, Ecosystem};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub struct ComposerDetector;

#[derive(Deserialize, Default)]
#[serde(default)]
struct ComposerJson {
    require: BTreeMap<String, Value>,
    #[serde(rename = "require-dev")]
    require_dev: BTreeMap<String, Value>,
}

impl Detector for ComposerDetector {
    fn name(&self) -> &'static str {
        "Composer"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Composer
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["composer.json"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            parse_composer_json(&content, source)
        }))
    }
}

fn parse_composer_json(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let manifest: ComposerJson =
        serde_json::from_str(content).context("Invalid composer.json")?;

    let sections = [
        (&manifest.require, DependencyType::Direct),
        (&manifest.require_dev, DependencyType::Development),
    ];

    let mut deps = Vec::new();
    for (section, dependency_type) in sections {
        for (name, constraint) in section {
            if is_platform_package(name) {
                continue;
            }
            let constraint = constraint.as_str().unwrap_or_default();
            deps.push(
                Dependency::new(name.as_str(), first_constraint(constraint), Ecosystem::Composer)
                    .with_type(dependency_type)
                    .with_source(source),
            );
        }
    }

    Ok(deps)
}

/// `php`, PHP extensions and libraries, and Composer's own APIs are not packages.
fn is_platform_package(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name == "php"
        || name == "hhvm"
        || name == "composer"
        || name.starts_with("php-")
        || name.starts_with("ext-")
        || name.starts_with("lib-")
        || name.starts_with("composer-")
}

/// Version of the first alternative of `^8.0 || ^9.0` style constraints,
/// without its operator.
fn first_constraint(constraint: &str) -> &str {
    constraint
        .split(['|', ','])
        .map(str::trim)
        .find(|part| !part.is_empty())
        .and_then(|part| {
            part.trim_start_matches(['<', '>', '=', '!', '~', '^'])
                .split_whitespace()
                .next()
        })
        .unwrap_or_default()
}
