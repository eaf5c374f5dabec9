use super::{parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, DependencyType, Ecosystem, ANY_VERSION};
use anyhow::Result;
use regex::{Captures, Regex};
use std::path::Path;

pub struct GradleDetector;

impl Detector for GradleDetector {
    fn name(&self) -> &'static str {
        "Gradle"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Gradle
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["build.gradle", "build.gradle.kts"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            parse_build_gradle(&content, source)
        }))
    }
}

/// Configuration names that declare library dependencies, with any prefix
/// (`test`, `androidTest`, `debug`, ...).
const CONFIGURATION: &str = r"(?P<config>[A-Za-z]*(?:[Ii]mplementation|[Aa]pi|[Cc]ompile|[Cc]ompileOnly|[Rr]untime|[Rr]untimeOnly|[Aa]nnotationProcessor|kapt|ksp))";

/// Parse `build.gradle` or `build.gradle.kts` with regex.
///
/// Handles string notation (`implementation 'g:a:v'`, `implementation("g:a:v")`,
/// `platform(...)` wrappers) and map notation (`group: 'g', name: 'a', version: 'v'`).
fn parse_build_gradle(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let re_string = Regex::new(&format!(
        r#"{}\s*\(?\s*(?:(?:platform|enforcedPlatform)\s*\(\s*)?["'](?P<group>[^"':\s]+):(?P<name>[^"':\s]+)(?::(?P<version>[^"':\s@]+))?[^"']*["']"#,
        CONFIGURATION
    ))?;
    let re_map = Regex::new(&format!(
        r#"{}\s*\(?\s*group\s*[:=]\s*["'](?P<group>[^"']+)["']\s*,\s*name\s*[:=]\s*["'](?P<name>[^"']+)["'](?:\s*,\s*version\s*[:=]\s*["'](?P<version>[^"']+)["'])?"#,
        CONFIGURATION
    ))?;

    let mut matches: Vec<(usize, Dependency)> = Vec::new();
    for re in [&re_string, &re_map] {
        for caps in re.captures_iter(content) {
            let start = caps.get(0).map_or(0, |m| m.start());
            matches.push((start, to_dependency(&caps, source)));
        }
    }

    // keep in-file order across both notations
    matches.sort_by_key(|(start, _)| *start);
    Ok(matches.into_iter().map(|(_, dep)| dep).collect())
}

fn to_dependency(caps: &Captures<'_>, source: &Path) -> Dependency {
    let config = caps.name("config").map_or("", |m| m.as_str());
    let name = format!("{}:{}", &caps["group"], &caps["name"]);

    let (version, confidence) = match caps.name("version").map(|m| m.as_str()) {
        Some(version) if version.contains('$') => (ANY_VERSION, 0.85),
        Some(version) => (version, 0.95),
        None => (ANY_VERSION, 0.9),
    };

    Dependency::new(name, version, Ecosystem::Gradle)
        .with_type(classify(config))
        .with_confidence(confidence)
        .with_source(source)
}

fn classify(config: &str) -> DependencyType {
    let config = config.to_ascii_lowercase();
    if config.starts_with("test") || config.starts_with("androidtest") {
        DependencyType::Development
    } else {
        DependencyType::Direct
    }
}
