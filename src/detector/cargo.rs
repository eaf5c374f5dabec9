use super::{parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, DependencyType, Ecosystem, ANY_VERSION};
use anyhow::{Context, Result};
use std::path::Path;
use toml::{Table, Value};

pub struct CargoDetector;

impl Detector for CargoDetector {
    fn name(&self) -> &'static str {
        "Cargo"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Cargo
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["Cargo.toml"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            parse_cargo_toml(&content, source)
        }))
    }
}

const SECTIONS: [(&str, DependencyType); 3] = [
    ("dependencies", DependencyType::Direct),
    ("build-dependencies", DependencyType::Direct),
    ("dev-dependencies", DependencyType::Development),
];

fn parse_cargo_toml(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let manifest: Table = toml::from_str(content).context("Invalid Cargo.toml")?;
    let mut deps = Vec::new();

    collect_sections(&manifest, source, &mut deps);

    // [target.'cfg(...)'.dependencies]
    if let Some(targets) = manifest.get("target").and_then(Value::as_table) {
        for target in targets.values().filter_map(Value::as_table) {
            collect_sections(target, source, &mut deps);
        }
    }

    let workspace_deps = manifest
        .get("workspace")
        .and_then(|ws| ws.get("dependencies"))
        .and_then(Value::as_table);
    if let Some(table) = workspace_deps {
        collect_table(table, DependencyType::Direct, source, &mut deps);
    }

    Ok(deps)
}

fn collect_sections(table: &Table, source: &Path, deps: &mut Vec<Dependency>) {
    for (section, dependency_type) in SECTIONS {
        if let Some(entries) = table.get(section).and_then(Value::as_table) {
            collect_table(entries, dependency_type, source, deps);
        }
    }
}

fn collect_table(entries: &Table, dependency_type: DependencyType, source: &Path, deps: &mut Vec<Dependency>) {
    for (key, spec) in entries {
        let Some((name, version, confidence)) = read_spec(key, spec) else {
            continue;
        };
        deps.push(
            Dependency::new(name, version, Ecosystem::Cargo)
                .with_type(dependency_type)
                .with_confidence(confidence)
                .with_source(source),
        );
    }
}

/// Returns `(crate name, version, confidence)` for one dependency entry.
///
/// `workspace = true` entries are skipped; the workspace table declares them.
fn read_spec<'a>(key: &'a str, spec: &'a Value) -> Option<(&'a str, &'a str, f64)> {
    let table = match spec {
        Value::String(version) => return Some((key, version.as_str(), 1.0)),
        Value::Table(table) => table,
        _ => return None,
    };

    if table.get("workspace").and_then(Value::as_bool) == Some(true) {
        return None;
    }

    // `alias = { package = "real-name", ... }`
    let name = table.get("package").and_then(Value::as_str).unwrap_or(key);

    let found = if let Some(version) = table.get("version").and_then(Value::as_str) {
        (version, 1.0)
    } else if table.contains_key("git") {
        (ANY_VERSION, 0.9)
    } else if table.contains_key("path") {
        (ANY_VERSION, 0.85)
    } else {
        (ANY_VERSION, 0.9)
    };

    Some((name, found.0, found.1))
}
