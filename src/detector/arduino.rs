use super::{parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, Ecosystem, ANY_VERSION};
use anyhow::Result;
use std::path::Path;

pub struct ArduinoDetector;

impl Detector for ArduinoDetector {
    fn name(&self) -> &'static str {
        "Arduino"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Arduino
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["library.properties"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            Ok(parse_library_properties(&content, source))
        }))
    }
}

/// Parse the `depends=` list of a `library.properties`, e.g.
/// `depends=Adafruit GFX Library (>=1.11.0), SPI`.
fn parse_library_properties(content: &str, source: &Path) -> Vec<Dependency> {
    let depends = content.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        (key.trim() == "depends").then_some(value)
    });

    let Some(depends) = depends else {
        return Vec::new();
    };

    depends
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (name, version) = match entry.split_once('(') {
                Some((name, constraint)) => (name.trim(), constraint.trim_end_matches(')')),
                None => (entry, ANY_VERSION),
            };
            if name.is_empty() {
                return None;
            }
            Some(
                Dependency::new(name, version, Ecosystem::Arduino)
                    .with_confidence(0.95)
                    .with_source(source),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_support::write;
    use tempfile::tempdir;

    #[test]
    fn test_parse_library_properties() {
        let content = "\
name=Display Driver
version=1.0.0
author=Acme
depends=Adafruit GFX Library (>=1.11.0), SPI, Adafruit BusIO (=1.14.1)
";
        let deps = parse_library_properties(content, Path::new("library.properties"));
        assert_eq!(deps.len(), 3);

        assert_eq!(deps[0].name(), "Adafruit GFX Library");
        assert_eq!(deps[0].version(), "1.11.0");
        assert_eq!(deps[0].confidence(), 0.95);
        assert_eq!(deps[0].purl(), "pkg:arduino/Adafruit%20GFX%20Library@1.11.0");

        assert_eq!(deps[1].name(), "SPI");
        assert_eq!(deps[1].version(), "*");

        assert_eq!(deps[2].version(), "1.14.1");
    }

    #[test]
    fn test_without_depends() {
        let deps = parse_library_properties("name=Solo\nversion=0.1.0\n", Path::new("library.properties"));
        assert!(deps.is_empty());
    }

    #[test]
    fn test_detector() {
        let dir = tempdir().unwrap();
        write(dir.path(), "libraries/Display/library.properties", "depends=Wire\n");

        let detector = ArduinoDetector;
        assert!(detector.detect(dir.path()));
        let detection = detector.parse(dir.path()).unwrap();
        assert_eq!(detection.dependencies[0].name(), "Wire");
    }
}
