use super::{parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, Ecosystem, ANY_VERSION};
use anyhow::Result;
use regex::Regex;
use std::path::Path;

pub struct CmakeDetector;

impl Detector for CmakeDetector {
    fn name(&self) -> &'static str {
        "CMake"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Cmake
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["CMakeLists.txt"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            parse_cmake_lists(&content, source)
        }))
    }
}

/// Modules shipped with CMake itself.
const BUILTIN_MODULES: [&str; 4] = ["cmake", "ctest", "cpack", "pkgconfig"];

/// Keywords of `pkg_check_modules` that are not module names.
const PKG_CONFIG_KEYWORDS: [&str; 6] = [
    "REQUIRED",
    "QUIET",
    "IMPORTED_TARGET",
    "GLOBAL",
    "NO_CMAKE_PATH",
    "NO_CMAKE_ENVIRONMENT_PATH",
];

fn parse_cmake_lists(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let re_comment = Regex::new(r"(?m)#.*$")?;
    let re_find_package =
        Regex::new(r"(?i)find_package\s*\(\s*([A-Za-z0-9_\-]+)(?:\s+([0-9][0-9.]*))?[^)]*\)")?;
    let re_fetch = Regex::new(r"(?i)FetchContent_Declare\s*\(\s*([A-Za-z0-9_\-]+)([^)]*)\)")?;
    let re_external = Regex::new(r"(?i)ExternalProject_Add\s*\(\s*([A-Za-z0-9_\-]+)([^)]*)\)")?;
    let re_pkg_config =
        Regex::new(r"(?i)pkg_(?:check_modules|search_module)\s*\(\s*[A-Za-z0-9_\-]+([^)]*)\)")?;
    let re_git_tag = Regex::new(r"(?i)GIT_TAG\s+([A-Za-z0-9._\-]+)")?;

    let content = re_comment.replace_all(content, "");
    let make = |name: &str, version: &str, confidence: f64| {
        Dependency::new(name, version, Ecosystem::Cmake)
            .with_confidence(confidence)
            .with_source(source)
    };

    let mut found: Vec<(usize, Dependency)> = Vec::new();

    for caps in re_find_package.captures_iter(&content) {
        let name = &caps[1];
        if BUILTIN_MODULES.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        // system libraries such as Threads stay in at low confidence
        let version = caps.get(2).map_or(ANY_VERSION, |m| m.as_str());
        found.push((start_of(&caps), make(name, version, 0.85)));
    }

    for caps in re_fetch.captures_iter(&content) {
        let dep = match re_git_tag.captures(&caps[2]) {
            Some(tag) => make(&caps[1], &tag[1], 0.95),
            None => make(&caps[1], ANY_VERSION, 0.9),
        };
        found.push((start_of(&caps), dep));
    }

    for caps in re_external.captures_iter(&content) {
        let version = re_git_tag
            .captures(&caps[2])
            .map_or(ANY_VERSION.to_string(), |tag| tag[1].to_string());
        found.push((start_of(&caps), make(&caps[1], version.as_str(), 0.9)));
    }

    for caps in re_pkg_config.captures_iter(&content) {
        let start = start_of(&caps);
        let modules = caps[1]
            .split_whitespace()
            .filter(|word| !PKG_CONFIG_KEYWORDS.contains(word));
        for module in modules {
            let (name, version) = match module.find(['>', '<', '=']) {
                Some(pos) => (&module[..pos], &module[pos..]),
                None => (module, ANY_VERSION),
            };
            if !name.is_empty() {
                found.push((start, make(name, version, 0.85)));
            }
        }
    }

    found.sort_by_key(|(start, _)| *start);
    Ok(found.into_iter().map(|(_, dep)| dep).collect())
}

fn start_of(caps: &regex::Captures<'_>) -> usize {
    caps.get(0).map_or(0, |m| m.start())
}
