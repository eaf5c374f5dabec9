use super::{file_name, parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, Ecosystem, ANY_VERSION};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

pub struct PlatformioDetector;

impl Detector for PlatformioDetector {
    fn name(&self) -> &'static str {
        "PlatformIO"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Platformio
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["platformio.ini", "library.json"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            if file_name(path) == "library.json" {
                parse_library_json(&content, source)
            } else {
                Ok(parse_platformio_ini(&content, source))
            }
        }))
    }
}

/// Parse every `lib_deps` option of a `platformio.ini`, in any section.
///
/// Values may continue on indented lines and may be comma-separated.
fn parse_platformio_ini(content: &str, source: &Path) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let mut in_lib_deps = false;

    for raw in content.lines() {
        let line = strip_comment(raw);
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let continuation = raw.starts_with([' ', '\t']);
        let value = if continuation && in_lib_deps {
            trimmed
        } else if trimmed.starts_with('[') {
            in_lib_deps = false;
            continue;
        } else if let Some((key, value)) = trimmed.split_once('=') {
            in_lib_deps = key.trim() == "lib_deps";
            if !in_lib_deps {
                continue;
            }
            value.trim()
        } else {
            continue;
        };

        for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            deps.extend(parse_lib_dep(entry, source));
        }
    }

    deps
}

fn strip_comment(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with(';') || trimmed.starts_with('#') {
        return "";
    }
    match line.find(" ;") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// One `lib_deps` entry: `owner/name@^1.2.3`, `name @ 1.0`, `name`, or a
/// repository URL with an optional `#tag`.
fn parse_lib_dep(entry: &str, source: &Path) -> Option<Dependency> {
    // ${env.lib_deps} style references point at other options
    if entry.contains("${") {
        return None;
    }

    if entry.contains("://") || entry.starts_with("git@") {
        let (url, fragment) = match entry.split_once('#') {
            Some((url, fragment)) => (url, fragment),
            None => (entry, ""),
        };
        let name = url
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()?
            .trim_end_matches(".git");
        if name.is_empty() {
            return None;
        }
        return Some(
            Dependency::new(name, fragment, Ecosystem::Platformio)
                .with_confidence(0.85)
                .with_source(source),
        );
    }

    let (name, version) = match entry.split_once('@') {
        Some((name, version)) => (name.trim(), version.trim()),
        None => (entry, ANY_VERSION),
    };
    if name.is_empty() {
        return None;
    }

    Some(
        Dependency::new(name, version, Ecosystem::Platformio)
            .with_confidence(0.95)
            .with_source(source),
    )
}

/// Parse the `dependencies` of a PlatformIO `library.json`, given either as
/// an array of objects or strings, or as a `name -> version` object.
fn parse_library_json(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let manifest: Value = serde_json::from_str(content).context("Invalid library.json")?;
    let make = |name: &str, version: &str| {
        Dependency::new(name, version, Ecosystem::Platformio).with_source(source)
    };

    let mut deps = Vec::new();
    match manifest.get("dependencies") {
        Some(Value::Array(entries)) => {
            for entry in entries {
                match entry {
                    Value::String(name) => deps.push(make(name, ANY_VERSION)),
                    Value::Object(object) => {
                        let Some(name) = object.get("name").and_then(Value::as_str) else {
                            continue;
                        };
                        let version = object
                            .get("version")
                            .and_then(Value::as_str)
                            .unwrap_or(ANY_VERSION);
                        let full_name = match object.get("owner").and_then(Value::as_str) {
                            Some(owner) if !owner.is_empty() => format!("{}/{}", owner, name),
                            _ => name.to_string(),
                        };
                        deps.push(make(&full_name, version));
                    }
                    _ => {}
                }
            }
        }
        Some(Value::Object(entries)) => {
            for (name, spec) in entries {
                let version = match spec {
                    Value::String(version) => version.as_str(),
                    Value::Object(object) => object
                        .get("version")
                        .and_then(Value::as_str)
                        .unwrap_or(ANY_VERSION),
                    _ => ANY_VERSION,
                };
                deps.push(make(name, version));
            }
        }
        _ => {}
    }

    Ok(deps)
}
