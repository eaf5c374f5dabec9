use super::{file_name, parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, Ecosystem, ANY_VERSION};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

pub struct MbedDetector;

impl Detector for MbedDetector {
    fn name(&self) -> &'static str {
        "Mbed"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Mbed
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["mbed_lib.json", "mbed_app.json", "*.lib"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            match file_name(path).as_str() {
                "mbed_lib.json" => parse_mbed_json(&read_manifest(path)?, "dependencies", source),
                "mbed_app.json" => parse_mbed_json(&read_manifest(path)?, "requires", source),
                _ => {
                    let bytes = fs::read(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    Ok(parse_lib_reference(&bytes, source).into_iter().collect())
                }
            }
        }))
    }
}

/// Names listed under `key`, either as an array or as the keys of an object.
fn parse_mbed_json(content: &str, key: &str, source: &Path) -> Result<Vec<Dependency>> {
    let manifest: Value = serde_json::from_str(content)
        .with_context(|| format!("Invalid {}", source.display()))?;

    let names: Vec<&str> = match manifest.get(key) {
        Some(Value::Array(entries)) => entries.iter().filter_map(Value::as_str).collect(),
        Some(Value::Object(entries)) => entries.keys().map(String::as_str).collect(),
        _ => Vec::new(),
    };

    Ok(names
        .into_iter()
        .map(|name| {
            Dependency::new(name, ANY_VERSION, Ecosystem::Mbed)
                .with_confidence(0.95)
                .with_source(source)
        })
        .collect())
}

/// A `.lib` reference file holds one repository URL, optionally pinned with
/// `#revision`. Anything else, including binary static libraries that share
/// the extension, is not a reference and yields nothing.
fn parse_lib_reference(bytes: &[u8], source: &Path) -> Option<Dependency> {
    let text = std::str::from_utf8(bytes).ok()?;
    let url = text.lines().map(str::trim).find(|line| !line.is_empty())?;
    if !url.contains("://") {
        return None;
    }

    let name = source.file_stem()?.to_string_lossy();
    let version = match url.rsplit_once('#') {
        Some((_, revision)) => revision,
        None => ANY_VERSION,
    };

    Some(
        Dependency::new(name.into_owned(), version, Ecosystem::Mbed)
            .with_confidence(0.9)
            .with_source(source),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_support::write;
    use tempfile::tempdir;

    #[test]
    fn test_parse_mbed_lib_json() {
        let content = r#"{ "name": "sensor", "dependencies": ["mbed-os", "drivers"] }"#;
        let deps = parse_mbed_json(content, "dependencies", Path::new("mbed_lib.json")).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].version(), "*");
        assert_eq!(deps[0].confidence(), 0.95);
        assert_eq!(deps[0].purl(), "pkg:generic/mbed-os");
    }

    #[test]
    fn test_parse_mbed_app_json() {
        let content = r#"{ "requires": ["bare-metal", "events"], "target_overrides": {} }"#;
        let deps = parse_mbed_json(content, "requires", Path::new("mbed_app.json")).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[1].name(), "events");
    }

    #[test]
    fn test_parse_lib_reference() {
        let dep = parse_lib_reference(
            b"https://github.com/ARMmbed/mbed-os/#a1b2c3d4\n",
            Path::new("mbed-os.lib"),
        )
        .unwrap();
        assert_eq!(dep.name(), "mbed-os");
        assert_eq!(dep.version(), "a1b2c3d4");
        assert_eq!(dep.confidence(), 0.9);

        let unpinned = parse_lib_reference(b"https://os.mbed.com/users/acme/code/Motor/", Path::new("Motor.lib"))
            .unwrap();
        assert_eq!(unpinned.version(), "*");
    }

    #[test]
    fn test_non_reference_lib_files_are_ignored() {
        assert!(parse_lib_reference(&[0x4d, 0x5a, 0xff, 0xfe, 0x00], Path::new("crt.lib")).is_none());
        assert!(parse_lib_reference(b"!<arch>\n", Path::new("libfoo.lib")).is_none());
    }

    #[test]
    fn test_binary_lib_produces_no_warning() {
        let dir = tempdir().unwrap();
        write(dir.path(), "mbed-os.lib", "https://github.com/ARMmbed/mbed-os/#abc\n");
        std::fs::write(dir.path().join("static.lib"), [0u8, 159, 146, 150]).unwrap();

        let detection = MbedDetector.parse(dir.path()).unwrap();
        assert_eq!(detection.dependencies.len(), 1);
        assert!(detection.warnings.is_empty());
    }
}
