//! Scan orchestration.
//!
//! The [`Scanner`] runs every registered [`Detector`] against a project root,
//! drops observations below the confidence threshold, reconciles duplicates
//! and collects the result into a [`ScanResult`].
//!
//! # Example
//!
//! ```no_run
//! use sbomscan::Scanner;
//!
//! # async fn run() -> Result<(), sbomscan::ScanError> {
//! let scanner = Scanner::new(0.8)?;
//! let result = scanner.scan("path/to/project", None, None).await?;
//!
//! for dep in result.dependencies() {
//!     println!("{} {} ({})", dep.name(), dep.version(), dep.ecosystem());
//! }
//! for warning in &result.warnings {
//!     eprintln!("warning: {}", warning);
//! }
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Result};
use futures::future::join_all;
use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::detector::{all_detectors, get_detector, Detection, Detector};
use crate::error::{validate_confidence, ScanError};
use crate::model::{Dependency, Ecosystem, ScanResult};

/// Runs detectors and reconciles what they find.
pub struct Scanner {
    detectors: Vec<Arc<dyn Detector>>,
    min_confidence: f64,
    parallel: bool,
    timeout: Option<Duration>,
    project_name: Option<String>,
    project_version: Option<String>,
}

impl Scanner {
    /// Creates a scanner with every detector registered.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidConfidence`] if `min_confidence` is outside
    /// `[0, 1]`.
    pub fn new(min_confidence: f64) -> Result<Self, ScanError> {
        Ok(Self {
            detectors: all_detectors().into_iter().map(Arc::from).collect(),
            min_confidence: validate_confidence(min_confidence)?,
            parallel: true,
            timeout: None,
            project_name: None,
            project_version: None,
        })
    }

    /// Builds a scanner from configuration.
    ///
    /// Only the configured ecosystems get a detector. Registration order is
    /// kept no matter how the ecosystems are listed. The configured project
    /// name and version apply to scans that do not pass their own.
    pub fn from_config(config: &Config) -> Result<Self, ScanError> {
        let detectors = Ecosystem::DETECTED
            .iter()
            .filter(|ecosystem| config.ecosystems.contains(ecosystem))
            .filter_map(|ecosystem| get_detector(*ecosystem))
            .map(Arc::from)
            .collect();

        Ok(Self {
            detectors,
            min_confidence: validate_confidence(config.min_confidence)?,
            parallel: config.parallel,
            timeout: config.detector_timeout_secs.map(Duration::from_secs),
            project_name: config.project_name.clone(),
            project_version: config.project_version.clone(),
        })
    }

    /// Replaces the registered detectors. They run in the order given.
    pub fn with_detectors(mut self, detectors: Vec<Box<dyn Detector>>) -> Self {
        self.detectors = detectors.into_iter().map(Arc::from).collect();
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets a per-detector time limit. A detector that exceeds it contributes
    /// nothing and leaves a warning.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    pub fn with_project_version(mut self, version: impl Into<String>) -> Self {
        self.project_version = Some(version.into());
        self
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Scans `root` and returns the reconciled dependency set.
    ///
    /// `project_name` and `project_version` fall back to the scanner's own
    /// settings, then to the directory name of the resolved root and `"1.0.0"`.
    ///
    /// # Errors
    ///
    /// Fails before any detector runs if `root` is missing or is not a
    /// directory. Failures inside a detector are never returned; they become
    /// warnings on the result.
    pub async fn scan(
        &self,
        root: impl AsRef<Path>,
        project_name: Option<&str>,
        project_version: Option<&str>,
    ) -> Result<ScanResult, ScanError> {
        let root = resolve_root(root.as_ref())?;
        let name = [project_name, self.project_name.as_deref()]
            .into_iter()
            .flatten()
            .find(|name| !name.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_project_name(&root));
        let version = project_version
            .or(self.project_version.as_deref())
            .map(str::to_string);

        let mut result = ScanResult::new(name, version, root.clone());
        info!(
            project = %result.project_name,
            root = %root.display(),
            detectors = self.detectors.len(),
            "Starting scan"
        );

        let outcomes = if self.parallel {
            self.scan_concurrent(&root).await
        } else {
            self.scan_sequential(&root).await
        };

        let mut observations = Vec::new();
        for (detector, outcome) in self.detectors.iter().zip(outcomes) {
            match outcome {
                Ok(detection) => {
                    let found = detection.dependencies.len();
                    let kept: Vec<Dependency> = detection
                        .dependencies
                        .into_iter()
                        .filter(|dep| dep.confidence() >= self.min_confidence)
                        .collect();
                    debug!(
                        detector = detector.name(),
                        found,
                        kept = kept.len(),
                        "Detector finished"
                    );
                    observations.extend(kept);
                    for warning in detection.warnings {
                        result.add_warning(warning);
                    }
                }
                Err(err) => {
                    let message = format!("Error in {}: {:#}", detector.name(), err);
                    warn!("{}", message);
                    result.add_warning(message);
                }
            }
        }

        for dep in reconcile(observations) {
            result.add_dependency(dep);
        }

        info!(
            dependencies = result.len(),
            warnings = result.warnings.len(),
            "Scan complete"
        );
        Ok(result)
    }

    async fn scan_concurrent(&self, root: &Path) -> Vec<Result<Detection>> {
        let futures = self
            .detectors
            .iter()
            .map(|detector| run_detector(Arc::clone(detector), root.to_path_buf(), self.timeout));
        join_all(futures).await
    }

    async fn scan_sequential(&self, root: &Path) -> Vec<Result<Detection>> {
        let mut outcomes = Vec::with_capacity(self.detectors.len());
        for detector in &self.detectors {
            outcomes.push(run_detector(Arc::clone(detector), root.to_path_buf(), self.timeout).await);
        }
        outcomes
    }
}

/// Collapses observations of the same dependency.
///
/// Observations are grouped by lower-cased name and ecosystem, then by
/// version. Each version in a group keeps its highest-confidence record;
/// on a tie the earliest observation wins. Output follows first-seen order.
pub fn reconcile(observations: Vec<Dependency>) -> Vec<Dependency> {
    let mut kept: Vec<Dependency> = Vec::new();
    let mut index: HashMap<(String, Ecosystem, String), usize> = HashMap::new();

    for dep in observations {
        let key = (
            dep.name().to_lowercase(),
            dep.ecosystem(),
            dep.version().to_string(),
        );
        match index.get(&key) {
            Some(&slot) => {
                if dep.confidence() > kept[slot].confidence() {
                    kept[slot] = dep;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(dep);
            }
        }
    }

    kept
}

/// Runs one detector on the blocking pool, catching errors, panics and
/// timeouts alike.
async fn run_detector(
    detector: Arc<dyn Detector>,
    root: PathBuf,
    timeout: Option<Duration>,
) -> Result<Detection> {
    let task = tokio::task::spawn_blocking(move || {
        if !detector.detect(&root) {
            debug!(detector = detector.name(), "No manifests found");
            return Ok(Detection::default());
        }
        detector.parse(&root)
    });

    // a timed-out task keeps its blocking thread until it returns
    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| anyhow!("timed out after {:?}", limit))?,
        None => task.await,
    };

    match joined {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => Err(anyhow!("panicked: {}", panic_message(err.into_panic()))),
        Err(err) => Err(anyhow!("cancelled: {}", err)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
    let metadata = fs::metadata(root).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ScanError::NotFound {
            path: root.to_path_buf(),
        },
        _ => ScanError::Io {
            path: root.to_path_buf(),
            source,
        },
    })?;

    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    root.canonicalize().map_err(|source| ScanError::Io {
        path: root.to_path_buf(),
        source,
    })
}

fn default_project_name(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_support::write;
    use crate::model::DependencyType;
    use tempfile::tempdir;

    /// Reports a fixed set of dependencies wherever it runs.
    struct FixedDetector {
        name: &'static str,
        deps: Vec<Dependency>,
    }

    impl Detector for FixedDetector {
        fn name(&self) -> &'static str {
            self.name
        }

        fn ecosystem(&self) -> Ecosystem {
            Ecosystem::Unknown
        }

        fn manifest_files(&self) -> &[&'static str] {
            &[]
        }

        fn detect(&self, _root: &Path) -> bool {
            true
        }

        fn parse(&self, _root: &Path) -> Result<Detection> {
            Ok(Detection {
                dependencies: self.deps.clone(),
                warnings: Vec::new(),
            })
        }
    }

    enum Misbehaviour {
        Fail,
        Panic,
        Stall,
    }

    struct BrokenDetector(Misbehaviour);

    impl Detector for BrokenDetector {
        fn name(&self) -> &'static str {
            "Broken"
        }

        fn ecosystem(&self) -> Ecosystem {
            Ecosystem::Unknown
        }

        fn manifest_files(&self) -> &[&'static str] {
            &[]
        }

        fn detect(&self, _root: &Path) -> bool {
            true
        }

        fn parse(&self, _root: &Path) -> Result<Detection> {
            match self.0 {
                Misbehaviour::Fail => Err(anyhow!("manifest store unavailable")),
                Misbehaviour::Panic => panic!("index out of range"),
                Misbehaviour::Stall => {
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(Detection::default())
                }
            }
        }
    }

    fn fixed(name: &'static str, deps: Vec<Dependency>) -> Box<dyn Detector> {
        Box::new(FixedDetector { name, deps })
    }

    #[test]
    fn test_reconcile_keeps_highest_confidence() {
        let deps = vec![
            Dependency::new("flask", "*", Ecosystem::Pypi).with_confidence(0.9),
            Dependency::new("flask", "*", Ecosystem::Pypi).with_confidence(1.0),
            Dependency::new("flask", "*", Ecosystem::Pypi).with_confidence(0.95),
        ];

        let kept = reconcile(deps);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence(), 1.0);
    }

    #[test]
    fn test_reconcile_keeps_distinct_versions() {
        let deps = vec![
            Dependency::new("requests", "2.31.0", Ecosystem::Pypi),
            Dependency::new("requests", "2.28.0", Ecosystem::Pypi),
            Dependency::new("requests", "2.31.0", Ecosystem::Pypi).with_confidence(0.9),
        ];

        let kept = reconcile(deps);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].version(), "2.31.0");
        assert_eq!(kept[1].version(), "2.28.0");
    }

    #[test]
    fn test_reconcile_groups_case_insensitively() {
        let deps = vec![
            Dependency::new("Flask", "2.0", Ecosystem::Pypi).with_confidence(0.9),
            Dependency::new("flask", "2.0", Ecosystem::Pypi).with_confidence(1.0),
            Dependency::new("flask", "2.0", Ecosystem::Npm),
        ];

        let kept = reconcile(deps);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].name(), "flask");
        assert_eq!(kept[0].ecosystem(), Ecosystem::Pypi);
        assert_eq!(kept[1].ecosystem(), Ecosystem::Npm);
    }

    #[test]
    fn test_reconcile_tie_goes_to_earliest() {
        let deps = vec![
            Dependency::new("zlib", "1.3", Ecosystem::Conan).with_source("conanfile.txt"),
            Dependency::new("zlib", "1.3", Ecosystem::Conan).with_source("conan.lock"),
        ];

        let kept = reconcile(deps);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source_file().unwrap().to_str(), Some("conanfile.txt"));
    }

    #[test]
    fn test_new_rejects_invalid_threshold() {
        assert!(matches!(
            Scanner::new(1.2),
            Err(ScanError::InvalidConfidence { .. })
        ));
        assert!(Scanner::new(f64::NAN).is_err());
        assert!(Scanner::new(0.0).is_ok());
    }

    #[test]
    fn test_from_config_keeps_registration_order() {
        let config = Config {
            ecosystems: vec![Ecosystem::Go, Ecosystem::Npm, Ecosystem::Cocoapods],
            ..Config::default()
        };

        let scanner = Scanner::from_config(&config).unwrap();
        assert_eq!(scanner.detector_names(), vec!["NPM", "Go"]);
    }

    #[tokio::test]
    async fn test_scan_missing_root() {
        let dir = tempdir().unwrap();
        let scanner = Scanner::new(0.8).unwrap();

        let err = scanner
            .scan(dir.path().join("missing"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_scan_file_root() {
        let dir = tempdir().unwrap();
        write(dir.path(), "go.mod", "module example.com/app\n");

        let scanner = Scanner::new(0.8).unwrap();
        let err = scanner
            .scan(dir.path().join("go.mod"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_scan_project_defaults() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("billing-service");
        fs::create_dir(&project).unwrap();

        let scanner = Scanner::new(0.8).unwrap();
        let result = scanner.scan(&project, None, None).await.unwrap();
        assert_eq!(result.project_name, "billing-service");
        assert_eq!(result.project_version, "1.0.0");
        assert!(result.is_empty());
        assert!(result.warnings.is_empty());

        let result = scanner
            .scan(&project, Some("billing"), Some("3.1.0"))
            .await
            .unwrap();
        assert_eq!(result.project_name, "billing");
        assert_eq!(result.project_version, "3.1.0");
    }

    #[tokio::test]
    async fn test_scan_uses_configured_project() {
        let dir = tempdir().unwrap();
        let config = Config {
            project_name: Some("billing".to_string()),
            project_version: Some("2.4.0".to_string()),
            ..Config::default()
        };
        let scanner = Scanner::from_config(&config).unwrap();

        let result = scanner.scan(dir.path(), None, None).await.unwrap();
        assert_eq!(result.project_name, "billing");
        assert_eq!(result.project_version, "2.4.0");

        let result = scanner
            .scan(dir.path(), Some("invoices"), Some("3.0.0"))
            .await
            .unwrap();
        assert_eq!(result.project_name, "invoices");
        assert_eq!(result.project_version, "3.0.0");

        let result = scanner.scan(dir.path(), Some(" "), None).await.unwrap();
        assert_eq!(result.project_name, "billing");
    }

    #[tokio::test]
    async fn test_scan_filters_below_threshold() {
        let dir = tempdir().unwrap();
        let scanner = Scanner::new(0.95).unwrap().with_detectors(vec![fixed(
            "Fixed",
            vec![
                Dependency::new("Threads", "*", Ecosystem::Cmake).with_confidence(0.85),
                Dependency::new("fmt", "10.1.1", Ecosystem::Conan),
            ],
        )]);

        let result = scanner.scan(dir.path(), None, None).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.dependencies().next().unwrap().name(), "fmt");
    }

    #[tokio::test]
    async fn test_scan_detector_failures_become_warnings() {
        let dir = tempdir().unwrap();
        for parallel in [true, false] {
            let scanner = Scanner::new(0.8)
                .unwrap()
                .with_parallel(parallel)
                .with_detectors(vec![
                    Box::new(BrokenDetector(Misbehaviour::Fail)),
                    fixed("Fixed", vec![Dependency::new("lodash", "4.17.21", Ecosystem::Npm)]),
                    Box::new(BrokenDetector(Misbehaviour::Panic)),
                ]);

            let result = scanner.scan(dir.path(), None, None).await.unwrap();
            assert_eq!(result.len(), 1);
            assert_eq!(result.warnings.len(), 2);
            assert_eq!(
                result.warnings[0],
                "Error in Broken: manifest store unavailable"
            );
            assert!(result.warnings[1].starts_with("Error in Broken: panicked"));
            assert!(result.warnings[1].contains("index out of range"));
        }
    }

    #[tokio::test]
    async fn test_scan_timeout_is_local() {
        let dir = tempdir().unwrap();
        let scanner = Scanner::new(0.8)
            .unwrap()
            .with_timeout(Duration::from_millis(20))
            .with_detectors(vec![
                Box::new(BrokenDetector(Misbehaviour::Stall)),
                fixed("Fixed", vec![Dependency::new("serde", "1.0", Ecosystem::Cargo)]),
            ]);

        let result = scanner.scan(dir.path(), None, None).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_scan_earlier_detector_wins_tie() {
        let dir = tempdir().unwrap();
        let scanner = Scanner::new(0.8).unwrap().with_detectors(vec![
            fixed(
                "First",
                vec![Dependency::new("guava", "32.1.2", Ecosystem::Maven).with_source("pom.xml")],
            ),
            fixed(
                "Second",
                vec![Dependency::new("guava", "32.1.2", Ecosystem::Maven)
                    .with_type(DependencyType::Development)
                    .with_source("build.gradle")],
            ),
        ]);

        let result = scanner.scan(dir.path(), None, None).await.unwrap();
        assert_eq!(result.len(), 1);
        let kept = result.dependencies().next().unwrap();
        assert_eq!(kept.source_file().unwrap().to_str(), Some("pom.xml"));
        assert_eq!(kept.dependency_type(), DependencyType::Direct);
    }

    #[tokio::test]
    async fn test_scan_real_manifests() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "web/package.json",
            r#"{ "dependencies": { "lodash": "^4.17.21" } }"#,
        );
        write(dir.path(), "api/requirements.txt", "requests==2.31.0\nflask\n");
        write(dir.path(), "web/node_modules/left-pad/package.json", r#"{ "dependencies": { "nope": "1.0.0" } }"#);
        write(dir.path(), "api/pyproject.toml", "not = [valid");

        let scanner = Scanner::new(0.8).unwrap();
        let result = scanner.scan(dir.path(), None, None).await.unwrap();

        let names: Vec<&str> = result.dependencies().map(|d| d.name()).collect();
        assert_eq!(result.len(), 3, "{:?}", names);
        assert!(!names.contains(&"nope"));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("pyproject.toml"));
    }
}
