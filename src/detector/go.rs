use super::{parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, DependencyType, Ecosystem};
use anyhow::Result;
use std::path::Path;

pub struct GoDetector;

impl Detector for GoDetector {
    fn name(&self) -> &'static str {
        "Go"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Go
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["go.mod"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            Ok(parse_go_mod(&content, source))
        }))
    }
}

/// Parse `require` directives of a `go.mod`, both single-line and
/// parenthesized blocks. `// indirect` requirements are transitive.
fn parse_go_mod(content: &str, source: &Path) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let mut in_require_block = false;

    for line in content.lines() {
        let line = line.trim();

        if in_require_block {
            if line.starts_with(')') {
                in_require_block = false;
            } else if let Some(dep) = parse_requirement(line, source) {
                deps.push(dep);
            }
            continue;
        }

        let Some(rest) = line.strip_prefix("require") else {
            continue;
        };
        let rest = rest.trim_start();
        if rest.starts_with('(') {
            in_require_block = true;
        } else if let Some(dep) = parse_requirement(rest, source) {
            deps.push(dep);
        }
    }

    deps
}

fn parse_requirement(line: &str, source: &Path) -> Option<Dependency> {
    let (spec, comment) = match line.split_once("//") {
        Some((spec, comment)) => (spec, comment),
        None => (line, ""),
    };

    let mut fields = spec.split_whitespace();
    let module = fields.next()?;
    let version = fields.next()?;
    let version = version.strip_prefix('v').unwrap_or(version);

    let dependency_type = if comment.split_whitespace().any(|word| word == "indirect") {
        DependencyType::Transitive
    } else {
        DependencyType::Direct
    };

    Some(
        Dependency::new(module, version, Ecosystem::Go)
            .with_type(dependency_type)
            .with_source(source),
    )
}
