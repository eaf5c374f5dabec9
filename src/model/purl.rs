//! Package URL construction.
//!
//! Canonical identifiers follow the `pkg:type/namespace/name@version` shape.
//! Detectors that know native coordinates call [`build`] directly; everything
//! else goes through [`synthesize`] using [`Ecosystem::purl_type`].

use super::dependency::{Ecosystem, ANY_VERSION};

/// Builds a package URL from explicit coordinates.
///
/// Namespace segments, the name and the version are percent-encoded. A `"*"`
/// or missing version is left out.
pub fn build(purl_type: &str, namespace: Option<&str>, name: &str, version: Option<&str>) -> String {
    let mut purl = format!("pkg:{}/", purl_type);

    if let Some(namespace) = namespace.filter(|ns| !ns.is_empty()) {
        let encoded: Vec<String> = namespace
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        if !encoded.is_empty() {
            purl.push_str(&encoded.join("/"));
            purl.push('/');
        }
    }

    purl.push_str(&urlencoding::encode(name));

    if let Some(version) = version.filter(|v| !v.is_empty() && *v != ANY_VERSION) {
        purl.push('@');
        purl.push_str(&urlencoding::encode(version));
    }

    purl
}

/// Derives a package URL from `(ecosystem, name, version)`.
///
/// `group:artifact` coordinates split on the colon. Slash-separated names
/// (`@scope/pkg`, `vendor/pkg`, Go module paths) keep their last segment as the
/// name and the rest as the namespace.
pub fn synthesize(ecosystem: Ecosystem, name: &str, version: &str) -> String {
    let (namespace, short_name) = split_coordinates(name);
    build(ecosystem.purl_type(), namespace, short_name, Some(version))
}

fn split_coordinates(name: &str) -> (Option<&str>, &str) {
    if let Some((namespace, rest)) = name.split_once(':') {
        // group:artifact[:classifier] keeps only the artifact as the name
        let artifact = rest.split(':').next().unwrap_or(rest);
        return (Some(namespace), artifact);
    }

    match name.rsplit_once('/') {
        Some((namespace, short)) if !short.is_empty() => (Some(namespace), short),
        _ => (None, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_plain() {
        assert_eq!(build("npm", None, "lodash", Some("4.17.21")), "pkg:npm/lodash@4.17.21");
    }

    #[test]
    fn test_build_omits_any_version() {
        assert_eq!(build("pypi", None, "flask", Some("*")), "pkg:pypi/flask");
        assert_eq!(build("pypi", None, "flask", None), "pkg:pypi/flask");
    }

    #[test]
    fn test_synthesize_maven_coordinates() {
        assert_eq!(
            synthesize(Ecosystem::Gradle, "com.google.guava:guava", "31.1-jre"),
            "pkg:maven/com.google.guava/guava@31.1-jre"
        );
    }

    #[test]
    fn test_synthesize_scoped_npm() {
        assert_eq!(
            synthesize(Ecosystem::Npm, "@types/node", "20.1.0"),
            "pkg:npm/%40types/node@20.1.0"
        );
    }

    #[test]
    fn test_synthesize_go_module_path() {
        assert_eq!(
            synthesize(Ecosystem::Go, "github.com/gin-gonic/gin", "1.9.1"),
            "pkg:golang/github.com/gin-gonic/gin@1.9.1"
        );
    }

    #[test]
    fn test_synthesize_generic_fallbacks() {
        assert_eq!(synthesize(Ecosystem::Cmake, "Boost", "1.82"), "pkg:generic/Boost@1.82");
        assert_eq!(synthesize(Ecosystem::Mbed, "mbed-os", "*"), "pkg:generic/mbed-os");
    }

    #[test]
    fn test_synthesize_encodes_spaces() {
        assert_eq!(
            synthesize(Ecosystem::Arduino, "Adafruit GFX Library", "1.11.5"),
            "pkg:arduino/Adafruit%20GFX%20Library@1.11.5"
        );
    }
}
