use super::{parse_each, read_manifest, Detection, Detector};
use crate::model::{purl, Dependency, DependencyType, Ecosystem, ANY_VERSION};
use anyhow::{bail, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;

pub struct MavenDetector;

impl Detector for MavenDetector {
    fn name(&self) -> &'static str {
        "Maven"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["pom.xml"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            parse_pom_xml(&content, source)
        }))
    }
}

#[derive(Default)]
struct PomDependency {
    group_id: String,
    artifact_id: String,
    version: String,
    scope: String,
    managed: bool,
}

/// Parse `pom.xml` with the quick-xml event API.
///
/// Element names are compared by local name, so the POM namespace does not
/// matter. Dependencies of build plugins are ignored.
fn parse_pom_xml(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut properties: HashMap<String, String> = HashMap::new();
    let mut project_version = String::new();
    let mut parent_version = String::new();

    let mut found: Vec<PomDependency> = Vec::new();
    let mut current: Option<PomDependency> = None;
    let mut dependency_depth = 0;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();

                if name == "dependency"
                    && stack.last().map(String::as_str) == Some("dependencies")
                    && !stack.iter().any(|s| s == "plugin")
                {
                    current = Some(PomDependency {
                        managed: stack.iter().any(|s| s == "dependencyManagement"),
                        ..PomDependency::default()
                    });
                    dependency_depth = stack.len() + 1;
                }

                stack.push(name);
            }
            Ok(Event::End(_)) => {
                if stack.len() == dependency_depth {
                    if let Some(dep) = current.take() {
                        found.push(dep);
                    }
                    dependency_depth = 0;
                }
                stack.pop();
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape()?.trim().to_string();
                let tag = stack.last().map(String::as_str).unwrap_or_default();

                if let Some(dep) = current.as_mut().filter(|_| stack.len() == dependency_depth + 1) {
                    match tag {
                        "groupId" => dep.group_id = text,
                        "artifactId" => dep.artifact_id = text,
                        "version" => dep.version = text,
                        "scope" => dep.scope = text,
                        _ => {}
                    }
                } else if stack.len() == 3 && stack[1] == "properties" {
                    properties.insert(tag.to_string(), text);
                } else if stack.len() == 2 && tag == "version" {
                    project_version = text;
                } else if stack.len() == 3 && stack[1] == "parent" && tag == "version" {
                    parent_version = text;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!(
                "Invalid XML at position {}: {}",
                reader.buffer_position(),
                e
            ),
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        bail!("Unexpected end of document inside <{}>", stack.join("><"));
    }

    if project_version.is_empty() {
        project_version = parent_version;
    }
    if !project_version.is_empty() {
        properties.insert("project.version".to_string(), project_version.clone());
        properties.insert("pom.version".to_string(), project_version);
    }

    let deps = found
        .into_iter()
        .filter(|dep| !dep.artifact_id.is_empty())
        .map(|dep| to_dependency(dep, &properties, source))
        .collect();

    Ok(deps)
}

fn to_dependency(dep: PomDependency, properties: &HashMap<String, String>, source: &Path) -> Dependency {
    let mut confidence = if dep.managed { 0.9 } else { 1.0 };

    let version = match resolve_properties(&dep.version, properties) {
        Some(version) => version,
        None => {
            confidence = 0.9;
            ANY_VERSION.to_string()
        }
    };

    let dependency_type = if dep.scope == "test" {
        DependencyType::Development
    } else {
        DependencyType::Direct
    };

    let name = if dep.group_id.is_empty() {
        dep.artifact_id.clone()
    } else {
        format!("{}:{}", dep.group_id, dep.artifact_id)
    };

    let dependency = Dependency::new(name, version, Ecosystem::Maven);
    let purl = purl::build(
        Ecosystem::Maven.purl_type(),
        Some(dep.group_id.as_str()),
        &dep.artifact_id,
        Some(dependency.version()),
    );

    dependency
        .with_purl(purl)
        .with_type(dependency_type)
        .with_confidence(confidence)
        .with_source(source)
}

/// Substitutes `${name}` placeholders. Returns `None` if one cannot be resolved.
fn resolve_properties(value: &str, properties: &HashMap<String, String>) -> Option<String> {
    let mut resolved = value.to_string();

    // properties may refer to other properties
    for _ in 0..8 {
        let Some(start) = resolved.find("${") else {
            return Some(resolved);
        };
        let end = start + resolved[start..].find('}')?;
        let key = &resolved[start + 2..end];
        let replacement = properties.get(key)?;
        resolved.replace_range(start..=end, replacement);
    }

    None
}
