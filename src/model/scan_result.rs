use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::dependency::{Dependency, DependencyKey, Ecosystem};

pub const DEFAULT_PROJECT_VERSION: &str = "1.0.0";

/// Everything a scan found: project metadata, the reconciled dependency set
/// and the non-fatal warnings collected along the way.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub project_name: String,
    pub project_version: String,
    #[serde(serialize_with = "serialize_dependencies")]
    dependencies: BTreeMap<DependencyKey, Dependency>,
    pub scan_path: PathBuf,
    pub warnings: Vec<String>,
}

impl ScanResult {
    pub fn new(
        project_name: impl Into<String>,
        project_version: Option<String>,
        scan_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            project_version: project_version
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROJECT_VERSION.to_string()),
            dependencies: BTreeMap::new(),
            scan_path: scan_path.into(),
            warnings: Vec::new(),
        }
    }

    /// Inserts a dependency keyed by `(name, version, ecosystem)`.
    ///
    /// On a key collision the record with the higher confidence is kept; on a
    /// tie the one already present stays. Returns `true` if `dep` was stored.
    pub fn add_dependency(&mut self, dep: Dependency) -> bool {
        let key = dep.key();
        match self.dependencies.get(&key) {
            Some(existing) if existing.confidence() >= dep.confidence() => false,
            _ => {
                self.dependencies.insert(key, dep);
                true
            }
        }
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.values()
    }

    pub fn get(&self, key: &DependencyKey) -> Option<&Dependency> {
        self.dependencies.get(key)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn count_by_ecosystem(&self) -> BTreeMap<Ecosystem, usize> {
        let mut counts = BTreeMap::new();
        for dep in self.dependencies.values() {
            *counts.entry(dep.ecosystem()).or_insert(0) += 1;
        }
        counts
    }
}

fn serialize_dependencies<S>(
    deps: &BTreeMap<DependencyKey, Dependency>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(deps.values())
}
