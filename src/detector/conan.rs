use super::{attribute_value, file_name, parse_each, read_manifest, Detection, Detector};
use crate::model::{normalize_version, Dependency, DependencyType, Ecosystem};
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use std::path::Path;

pub struct ConanDetector;

impl Detector for ConanDetector {
    fn name(&self) -> &'static str {
        "Conan"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Conan
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["conanfile.txt", "conanfile.py", "conan.lock"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            match file_name(path).as_str() {
                "conanfile.py" => parse_conanfile_py(&content, source),
                "conan.lock" => parse_conan_lock(&content, source),
                _ => Ok(parse_conanfile_txt(&content, source)),
            }
        }))
    }
}

/// Splits a reference such as `zlib/1.2.13@user/channel#rev` into name and
/// version. A `[>=1.0 <2.0]` range yields its lower bound.
fn split_reference(reference: &str) -> Option<(&str, String)> {
    let reference = reference.split(['@', '#', '%']).next()?.trim();
    let (name, version) = reference.split_once('/')?;
    if name.is_empty() {
        return None;
    }

    let version = match version.strip_prefix('[') {
        Some(range) => {
            let range = range.trim_end_matches(']');
            let lower = range
                .split([' ', ','])
                .find(|part| !part.is_empty() && !part.starts_with('<'))
                .unwrap_or_default();
            normalize_version(lower)
        }
        None => normalize_version(version),
    };

    Some((name, version))
}

fn reference_dependency(
    reference: &str,
    dependency_type: DependencyType,
    confidence: f64,
    source: &Path,
) -> Option<Dependency> {
    let (name, version) = split_reference(reference)?;
    Some(
        Dependency::new(name, version, Ecosystem::Conan)
            .with_type(dependency_type)
            .with_confidence(confidence)
            .with_source(source),
    )
}

fn section_type(section: &str) -> Option<DependencyType> {
    match section {
        "requires" => Some(DependencyType::Direct),
        "tool_requires" | "build_requires" | "test_requires" => Some(DependencyType::Development),
        _ => None,
    }
}

/// Parse the INI-style `[requires]` and `[tool_requires]` sections.
fn parse_conanfile_txt(content: &str, source: &Path) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let mut section: Option<DependencyType> = None;

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or(line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = section_type(name.trim());
            continue;
        }

        if let Some(dependency_type) = section {
            deps.extend(reference_dependency(line, dependency_type, 1.0, source));
        }
    }

    deps
}

/// Parse `requires = ...` attributes and `self.requires(...)` calls of a
/// recipe.
fn parse_conanfile_py(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let re_attr = Regex::new(r"(?m)^\s*(requires|tool_requires|build_requires|test_requires)\s*=\s*")?;
    let re_call = Regex::new(
        r#"self\.(requires|tool_requires|build_requires|test_requires)\s*\(\s*["']([^"']+)["']"#,
    )?;
    let re_quoted = Regex::new(r#"["']([^"']+)["']"#)?;

    let mut found: Vec<(usize, Dependency)> = Vec::new();

    for caps in re_attr.captures_iter(content) {
        let (Some(whole), Some(kind)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let dependency_type = section_type(kind.as_str()).unwrap_or_default();
        let value = attribute_value(&content[whole.end()..]);

        for quoted in re_quoted.captures_iter(value) {
            if let Some(dep) = reference_dependency(&quoted[1], dependency_type, 0.95, source) {
                found.push((whole.start(), dep));
            }
        }
    }

    for caps in re_call.captures_iter(content) {
        let start = caps.get(0).map_or(0, |m| m.start());
        let dependency_type = section_type(&caps[1]).unwrap_or_default();
        if let Some(dep) = reference_dependency(&caps[2], dependency_type, 0.95, source) {
            found.push((start, dep));
        }
    }

    // stable sort keeps tuple members in their written order
    found.sort_by_key(|(start, _)| *start);
    Ok(found.into_iter().map(|(_, dep)| dep).collect())
}

/// Parse a lockfile. Every locked package is a transitive dependency.
///
/// Handles both the v1 `graph_lock.nodes` layout and the v2 `requires` lists.
fn parse_conan_lock(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let lock: Value = serde_json::from_str(content).context("Invalid conan.lock")?;
    let mut deps = Vec::new();

    if let Some(nodes) = lock.pointer("/graph_lock/nodes").and_then(Value::as_object) {
        for (id, node) in nodes {
            // node 0 is the consumer itself
            if id == "0" {
                continue;
            }
            if let Some(reference) = node.get("ref").and_then(Value::as_str) {
                deps.extend(reference_dependency(reference, DependencyType::Transitive, 1.0, source));
            }
        }
    }

    for key in ["requires", "build_requires", "python_requires"] {
        let references = lock
            .get(key)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str);
        for reference in references {
            deps.extend(reference_dependency(reference, DependencyType::Transitive, 1.0, source));
        }
    }

    Ok(deps)
}
