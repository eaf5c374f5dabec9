use super::{parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, DependencyType, Ecosystem, ANY_VERSION};
use anyhow::Result;
use regex::Regex;
use std::path::Path;

pub struct RubyDetector;

impl Detector for RubyDetector {
    fn name(&self) -> &'static str {
        "RubyGems"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Gem
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["Gemfile", "*.gemspec"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            if path.extension().is_some_and(|ext| ext == "gemspec") {
                parse_gemspec(&content, source)
            } else {
                parse_gemfile(&content, source)
            }
        }))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Block {
    DevelopmentGroup,
    Other,
}

/// Parse a `Gemfile`, tracking `group ... do` blocks so that gems declared
/// under `:development` or `:test` are classified accordingly.
fn parse_gemfile(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let re_gem = Regex::new(r#"^gem\s*\(?\s*["']([^"']+)["'](.*)$"#)?;
    let re_arg = Regex::new(r#"^\s*,\s*["']([^"']+)["']"#)?;
    let re_group_option = Regex::new(r"(?:group|groups)\s*(?::|=>)\s*\[?[^\]]*:(?:development|test)\b")?;
    let re_dev_group = Regex::new(r"^group\b.*:(?:development|test)\b")?;

    let mut blocks: Vec<Block> = Vec::new();
    let mut deps = Vec::new();

    for line in content.lines() {
        let line = line.split(" #").next().unwrap_or(line).trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line == "end" {
            blocks.pop();
            continue;
        }
        if line.ends_with(" do") || line.contains(" do |") {
            let block = if re_dev_group.is_match(line) {
                Block::DevelopmentGroup
            } else {
                Block::Other
            };
            blocks.push(block);
            continue;
        }
        if ["if ", "unless ", "case "].iter().any(|kw| line.starts_with(kw)) {
            blocks.push(Block::Other);
            continue;
        }

        let Some(caps) = re_gem.captures(line) else {
            continue;
        };
        let name = &caps[1];
        let mut rest = caps.get(2).map_or("", |m| m.as_str());

        // leading positional string arguments are version constraints
        let mut version: Option<String> = None;
        while let Some(arg) = re_arg.captures(rest) {
            if version.is_none() {
                version = Some(arg[1].to_string());
            }
            rest = &rest[arg.get(0).map_or(0, |m| m.end())..];
        }

        let development = blocks.contains(&Block::DevelopmentGroup) || re_group_option.is_match(rest);
        let dependency_type = if development {
            DependencyType::Development
        } else {
            DependencyType::Direct
        };

        let (version, confidence) = match version {
            Some(version) => (version, 1.0),
            None => (ANY_VERSION.to_string(), 0.9),
        };

        deps.push(
            Dependency::new(name, version, Ecosystem::Gem)
                .with_type(dependency_type)
                .with_confidence(confidence)
                .with_source(source),
        );
    }

    Ok(deps)
}

fn parse_gemspec(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let re = Regex::new(
        r#"\.add_(runtime_|development_)?dependency\s*\(?\s*["']([^"']+)["'](?:\s*,\s*["']([^"']+)["'])?"#,
    )?;

    let deps = re
        .captures_iter(content)
        .map(|caps| {
            let dependency_type = match caps.get(1).map(|m| m.as_str()) {
                Some("development_") => DependencyType::Development,
                _ => DependencyType::Direct,
            };
            let version = caps.get(3).map_or(ANY_VERSION, |m| m.as_str());

            Dependency::new(&caps[2], version, Ecosystem::Gem)
                .with_type(dependency_type)
                .with_confidence(0.95)
                .with_source(source)
        })
        .collect();

    Ok(deps)
}
