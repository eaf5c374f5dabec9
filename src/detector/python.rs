use super::{attribute_value, file_name, parse_each, read_manifest, Detection, Detector};
use crate::model::{Dependency, DependencyType, Ecosystem, ANY_VERSION};
use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use toml::{Table, Value};

pub struct PythonDetector;

impl Detector for PythonDetector {
    fn name(&self) -> &'static str {
        "Python"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    fn manifest_files(&self) -> &[&'static str] {
        &["requirements*.txt", "setup.py", "Pipfile", "pyproject.toml"]
    }

    fn parse(&self, root: &Path) -> Result<Detection> {
        let manifests = self.find_manifests(root);
        Ok(parse_each(root, &manifests, |path, source| {
            let content = read_manifest(path)?;
            match file_name(path).as_str() {
                "setup.py" => parse_setup_py(&content, source),
                "Pipfile" => parse_pipfile(&content, source),
                "pyproject.toml" => parse_pyproject_toml(&content, source),
                _ => parse_requirements_txt(&content, source),
            }
        }))
    }
}

/// A PEP 508 requirement reduced to its name and first version clause.
struct Requirement {
    name: String,
    version: Option<String>,
}

fn requirement_regex() -> Result<Regex> {
    Ok(Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*(.*)$")?)
}

fn parse_requirement(re: &Regex, spec: &str) -> Option<Requirement> {
    // environment markers
    let spec = spec.split(';').next().unwrap_or(spec).trim();
    let caps = re.captures(spec)?;
    let name = caps[1].to_string();
    let rest = caps.get(2).map_or("", |m| m.as_str()).trim();

    if rest.is_empty() || rest.starts_with('@') {
        return Some(Requirement { name, version: None });
    }
    if !rest.starts_with(['=', '<', '>', '!', '~']) {
        return None;
    }

    // whitespace may follow the operator; `--hash` options and `\` come after the version
    let clause = rest.split(',').next().unwrap_or(rest);
    let operator_len = clause.len() - clause.trim_start_matches(['=', '<', '>', '!', '~']).len();
    let (operator, version) = clause.split_at(operator_len);
    let version = version
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '\\')
        .next()
        .unwrap_or_default();
    Some(Requirement {
        name,
        version: (!version.is_empty()).then(|| format!("{}{}", operator, version)),
    })
}

fn requirement_dependency(req: Requirement, source: &Path) -> Dependency {
    let (version, confidence) = match req.version {
        Some(version) => (version, 1.0),
        None => (ANY_VERSION.to_string(), 0.9),
    };
    Dependency::new(req.name, version, Ecosystem::Pypi)
        .with_confidence(confidence)
        .with_source(source)
}

/// Parse `requirements*.txt`. Files with `dev` or `test` in their name hold
/// development dependencies.
fn parse_requirements_txt(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let re = requirement_regex()?;
    let file = source
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let dependency_type = if file.contains("dev") || file.contains("test") {
        DependencyType::Development
    } else {
        DependencyType::Direct
    };

    let mut deps = Vec::new();
    for line in content.lines() {
        let line = match line.find(" #") {
            Some(pos) => &line[..pos],
            None => line,
        }
        .trim()
        .trim_end_matches('\\')
        .trim_end();

        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }

        if let Some(req) = parse_requirement(&re, line) {
            deps.push(requirement_dependency(req, source).with_type(dependency_type));
        }
    }

    Ok(deps)
}

/// Parse the `install_requires` and `tests_require` lists of a `setup.py`.
fn parse_setup_py(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let re = requirement_regex()?;
    let quoted = Regex::new(r#"["']([^"']+)["']"#)?;

    let lists = [
        ("install_requires", DependencyType::Direct),
        ("tests_require", DependencyType::Development),
    ];

    let mut deps = Vec::new();
    for (keyword, dependency_type) in lists {
        let list_re = Regex::new(&format!(r"{}\s*=\s*", keyword))?;
        let Some(assignment) = list_re.find(content) else {
            continue;
        };
        let list = attribute_value(&content[assignment.end()..]);

        for item in quoted.captures_iter(list) {
            if let Some(req) = parse_requirement(&re, &item[1]) {
                let version = req.version.unwrap_or_else(|| ANY_VERSION.to_string());
                deps.push(
                    Dependency::new(req.name, version, Ecosystem::Pypi)
                        .with_type(dependency_type)
                        .with_confidence(0.95)
                        .with_source(source),
                );
            }
        }
    }

    Ok(deps)
}

/// Version of a Pipfile or Poetry entry: `"^1.2"`, `{ version = "1.2" }`, or
/// an array of constraint tables.
fn toml_version(value: &Value) -> Option<&str> {
    match value {
        Value::String(version) => Some(version.as_str()),
        Value::Table(table) => table.get("version").and_then(Value::as_str),
        Value::Array(items) => items.first().and_then(toml_version),
        _ => None,
    }
}

fn parse_pipfile(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let pipfile: Table = toml::from_str(content).context("Invalid Pipfile")?;

    let sections = [
        ("packages", DependencyType::Direct),
        ("dev-packages", DependencyType::Development),
    ];

    let mut deps = Vec::new();
    for (section, dependency_type) in sections {
        let Some(packages) = pipfile.get(section).and_then(Value::as_table) else {
            continue;
        };
        for (name, spec) in packages {
            let version = toml_version(spec).unwrap_or(ANY_VERSION);
            deps.push(
                Dependency::new(name.as_str(), version, Ecosystem::Pypi)
                    .with_type(dependency_type)
                    .with_source(source),
            );
        }
    }

    Ok(deps)
}

fn parse_pyproject_toml(content: &str, source: &Path) -> Result<Vec<Dependency>> {
    let pyproject: Table = toml::from_str(content).context("Invalid pyproject.toml")?;
    let re = requirement_regex()?;
    let mut deps = Vec::new();

    // PEP 621
    if let Some(project) = pyproject.get("project").and_then(Value::as_table) {
        let required = project
            .get("dependencies")
            .and_then(Value::as_array)
            .into_iter()
            .flatten();
        for spec in required.filter_map(Value::as_str) {
            if let Some(req) = parse_requirement(&re, spec) {
                deps.push(requirement_dependency(req, source));
            }
        }

        let optional = project
            .get("optional-dependencies")
            .and_then(Value::as_table)
            .into_iter()
            .flat_map(|extras| extras.values())
            .filter_map(Value::as_array)
            .flatten();
        for spec in optional.filter_map(Value::as_str) {
            if let Some(req) = parse_requirement(&re, spec) {
                deps.push(requirement_dependency(req, source).with_confidence(0.9));
            }
        }
    }

    // Poetry
    let poetry = pyproject
        .get("tool")
        .and_then(|tool| tool.get("poetry"))
        .and_then(Value::as_table);
    if let Some(poetry) = poetry {
        let mut tables = vec![(poetry.get("dependencies"), DependencyType::Direct)];
        tables.push((poetry.get("dev-dependencies"), DependencyType::Development));
        if let Some(groups) = poetry.get("group").and_then(Value::as_table) {
            for group in groups.values() {
                tables.push((group.get("dependencies"), DependencyType::Development));
            }
        }

        for (table, dependency_type) in tables {
            let Some(table) = table.and_then(Value::as_table) else {
                continue;
            };
            for (name, spec) in table {
                if name.eq_ignore_ascii_case("python") {
                    continue;
                }
                let version = toml_version(spec).unwrap_or(ANY_VERSION);
                deps.push(
                    Dependency::new(name.as_str(), version, Ecosystem::Pypi)
                        .with_type(dependency_type)
                        .with_source(source),
                );
            }
        }
    }

    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_support::write;
    use tempfile::tempdir;

    fn find<'a>(deps: &'a [Dependency], name: &str) -> &'a Dependency {
        deps.iter().find(|d| d.name() == name).unwrap()
    }

    #[test]
    fn test_parse_requirements_txt() {
        let content = "\
# comment
requests==2.31.0
flask
uvicorn[standard]>=0.23,<1.0  # server
numpy==1.24.0 ; python_version >= '3.8'
-r base.txt
-e .
https://example.com/pkg.tar.gz
mylib @ git+https://github.com/acme/mylib.git
";
        let deps = parse_requirements_txt(content, Path::new("requirements.txt")).unwrap();
        assert_eq!(deps.len(), 5);

        let requests = find(&deps, "requests");
        assert_eq!(requests.version(), "2.31.0");
        assert_eq!(requests.confidence(), 1.0);

        let flask = find(&deps, "flask");
        assert_eq!(flask.version(), "*");
        assert_eq!(flask.confidence(), 0.9);

        assert_eq!(find(&deps, "uvicorn").version(), "0.23");
        assert_eq!(find(&deps, "numpy").version(), "1.24.0");
        assert_eq!(find(&deps, "mylib").version(), "*");
    }

    #[test]
    fn test_dev_requirements_file() {
        let deps =
            parse_requirements_txt("pytest==7.4.0\n", Path::new("requirements-dev.txt")).unwrap();
        assert_eq!(deps[0].dependency_type(), DependencyType::Development);
    }

    #[test]
    fn test_hashed_requirements() {
        let content = "\
requests==2.31.0 \\
    --hash=sha256:58cd2187c01e70e6e26505bca751777aa9f2ee0b7f4300988b709f44e013003f
flask >= 2.0, <3
idna \\
    --hash=sha256:c05567e9c24a6b9faaa835c4821bad0590fbb9d5779e7caa6e1cc4978e7eb24f
";
        let deps = parse_requirements_txt(content, Path::new("requirements.txt")).unwrap();
        assert_eq!(deps.len(), 3);
        assert_eq!(find(&deps, "requests").version(), "2.31.0");
        assert_eq!(find(&deps, "flask").version(), "2.0");
        assert_eq!(find(&deps, "idna").version(), "*");
        assert!(deps.iter().all(|d| !d.version().contains('\\')));
    }

    #[test]
    fn test_setup_py_extras_inside_list() {
        let content = r#"
setup(
    install_requires=["uvicorn[standard]>=0.23", "click>=8.0"],
)
"#;
        let deps = parse_setup_py(content, Path::new("setup.py")).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(find(&deps, "uvicorn").version(), "0.23");
        assert_eq!(find(&deps, "click").version(), "8.0");
    }

    #[test]
    fn test_parse_setup_py() {
        let content = r#"
from setuptools import setup

setup(
    name="demo",
    install_requires=[
        "click>=8.0",
        'pyyaml',
    ],
    tests_require=["pytest"],
)
"#;
        let deps = parse_setup_py(content, Path::new("setup.py")).unwrap();
        assert_eq!(deps.len(), 3);
        assert_eq!(find(&deps, "click").version(), "8.0");
        assert_eq!(find(&deps, "click").confidence(), 0.95);
        assert_eq!(find(&deps, "pyyaml").version(), "*");
        assert_eq!(find(&deps, "pytest").dependency_type(), DependencyType::Development);
    }

    #[test]
    fn test_parse_pipfile() {
        let content = r#"
[packages]
django = "==4.2.5"
celery = { version = ">=5.3", extras = ["redis"] }
anything = "*"

[dev-packages]
black = "*"
"#;
        let deps = parse_pipfile(content, Path::new("Pipfile")).unwrap();
        assert_eq!(deps.len(), 4);
        assert_eq!(find(&deps, "django").version(), "4.2.5");
        assert_eq!(find(&deps, "celery").version(), "5.3");
        assert_eq!(find(&deps, "anything").version(), "*");
        assert_eq!(find(&deps, "black").dependency_type(), DependencyType::Development);
    }

    #[test]
    fn test_parse_pyproject_poetry() {
        let content = r#"
[tool.poetry.dependencies]
python = "^3.11"
httpx = "^0.25.0"
pydantic = { version = "2.4.2", extras = ["email"] }

[tool.poetry.group.dev.dependencies]
mypy = "1.6.0"
"#;
        let deps = parse_pyproject_toml(content, Path::new("pyproject.toml")).unwrap();
        assert_eq!(deps.len(), 3);
        assert!(deps.iter().all(|d| d.name() != "python"));
        assert_eq!(find(&deps, "httpx").version(), "0.25.0");
        assert_eq!(find(&deps, "pydantic").version(), "2.4.2");
        assert_eq!(find(&deps, "mypy").dependency_type(), DependencyType::Development);
    }

    #[test]
    fn test_parse_pyproject_pep621() {
        let content = r#"
[project]
name = "demo"
dependencies = ["rich>=13.0", "typer"]

[project.optional-dependencies]
docs = ["mkdocs==1.5.3"]
"#;
        let deps = parse_pyproject_toml(content, Path::new("pyproject.toml")).unwrap();
        assert_eq!(deps.len(), 3);
        assert_eq!(find(&deps, "rich").confidence(), 1.0);
        assert_eq!(find(&deps, "typer").confidence(), 0.9);
        assert_eq!(find(&deps, "mkdocs").confidence(), 0.9);
        assert_eq!(find(&deps, "mkdocs").version(), "1.5.3");
    }

    #[test]
    fn test_detector_walks_all_manifest_kinds() {
        let dir = tempdir().unwrap();
        write(dir.path(), "requirements.txt", "requests==2.31.0\n");
        write(dir.path(), "svc/Pipfile", "[packages]\nflask = \"*\"\n");
        write(dir.path(), "svc/pyproject.toml", "[project\nbroken");

        let detector = PythonDetector;
        assert!(detector.detect(dir.path()));

        let detection = detector.parse(dir.path()).unwrap();
        assert_eq!(detection.dependencies.len(), 2);
        assert_eq!(detection.warnings.len(), 1);
        assert!(detection.warnings[0].contains("pyproject.toml"));
    }
}
