use super::{file_name, parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, DependencyType, Ecosystem, ANY_VERSION};
use anyhow::{bail, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;

pub struct NugetDetector;

impl Detector for NugetDetector {
    fn name(&self) -> &'static str {
        "NuGet"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Nuget
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["packages.config", "*.csproj", "*.fsproj", "*.vbproj"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            let element = if file_name(path) == "packages.config" {
                "package"
            } else {
                "PackageReference"
            };
            parse_package_xml(&content, element, source)
        }))
    }
}

#[derive(Default)]
struct PackageRef {
    id: String,
    version: String,
    development: bool,
}

/// Parse `<package>` entries of `packages.config` or `<PackageReference>`
/// entries of an SDK-style project file.
///
/// The version may be an attribute or a `<Version>` child element.
fn parse_package_xml(content: &str, element: &str, source: &Path) -> Result<Vec<Dependency>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut deps = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<PackageRef> = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) => {
                if local_name(e) == element {
                    let package = read_attributes(e)?;
                    deps.extend(to_dependency(package, source));
                }
            }
            Ok(Event::Start(ref e)) => {
                let name = local_name(e);
                if name == element {
                    current = Some(read_attributes(e)?);
                }
                current_tag = name;
            }
            Ok(Event::Text(ref e)) => {
                if let Some(package) = current.as_mut() {
                    if current_tag.eq_ignore_ascii_case("version") {
                        package.version = e.unescape()?.trim().to_string();
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if name == element {
                    if let Some(package) = current.take() {
                        deps.extend(to_dependency(package, source));
                    }
                }
                current_tag.clear();
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

    Ok(deps)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned()
}

fn read_attributes(e: &BytesStart<'_>) -> Result<PackageRef> {
    let mut package = PackageRef::default();

    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.trim().to_string();

        // MSBuild attribute names are case-insensitive
        match key.to_ascii_lowercase().as_str() {
            "id" | "include" => package.id = value,
            "version" => package.version = value,
            "developmentdependency" => package.development = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }

    Ok(package)
}

fn to_dependency(package: PackageRef, source: &Path) -> Option<Dependency> {
    if package.id.is_empty() {
        return None;
    }

    let dependency_type = if package.development {
        DependencyType::Development
    } else {
        DependencyType::Direct
    };

    Some(
        Dependency::new(package.id, lower_bound(&package.version), Ecosystem::Nuget)
            .with_type(dependency_type)
            .with_source(source),
    )
}

/// Lower bound of an interval version such as `[1.0,2.0)`; plain versions
/// pass through.
fn lower_bound(version: &str) -> &str {
    let version = version.trim();
    if !version.starts_with(['[', '(']) {
        return version;
    }

    let inner = version.trim_matches(|c| matches!(c, '[' | ']' | '(' | ')'));
    match inner.split(',').next().map(str::trim) {
        Some(lower) if !lower.is_empty() => lower,
        _ => ANY_VERSION,
    }
}
