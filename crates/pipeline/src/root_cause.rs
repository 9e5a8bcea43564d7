use std::{fmt, sync::LazyLock};

use regex::Regex;
use tracing::warn;

/// Directory marking third-party code.
const DEPENDENCY_DIR: &str = "node_modules";

/// Flattened store layout: `node_modules/.pnpm/<name>@<version>`. Scoped names use `+`
/// instead of `/`.
static FLAT_STORE_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"node_modules/\.pnpm/(?P<name>@?[^@/]+)@(?P<version>[0-9]+(?:\.[0-9]+)*)")
        .expect("valid flat store regex")
});

/// Classic nested layout: `node_modules/<name>/` or `node_modules/@scope/<name>/`.
static NESTED_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"node_modules/(?P<name>@[^/.][^/]*/[^/]+|[^/.@][^/]*)(?:/|$)")
        .expect("valid nested package regex")
});

/// Third-party package implicated by a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Package name, including its scope
    pub name: String,
    /// Version, when the path encodes it
    pub version: Option<String>,
}

/// Probable cause of a monitoring event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootCause {
    /// The fault originates in a third-party dependency.
    Dependency {
        /// Package, if its name could be extracted
        package: Option<Package>,
    },
    /// The fault originates in first-party code.
    Code {
        /// Implicated endpoint (the event culprit)
        endpoint: String,
    },
    /// No origin file was reported.
    Unknown,
}

impl RootCause {
    /// Classify an event from its origin file and culprit. Pure apart from logging.
    pub fn analyze(origin_file: Option<&str>, culprit: &str) -> Self {
        let Some(path) = origin_file else {
            warn!(culprit, "event has no origin file, root cause unknown");
            return Self::Unknown;
        };

        if path.contains(DEPENDENCY_DIR) {
            Self::Dependency { package: extract_package(path) }
        } else {
            Self::Code { endpoint: culprit.to_owned() }
        }
    }

    /// Returns `true` if the fault lies in a third-party dependency.
    pub const fn is_dependency(&self) -> bool {
        matches!(self, Self::Dependency { .. })
    }
}

impl fmt::Display for RootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dependency { package: Some(pkg) } => write!(
                f,
                "Dependency issue with {}@{}",
                pkg.name,
                pkg.version.as_deref().unwrap_or("latest")
            ),
            Self::Dependency { package: None } => f.write_str("Unknown dependency issue"),
            Self::Code { endpoint } => write!(f, "Endpoint {endpoint}"),
            Self::Unknown => f.write_str("Unknown issue"),
        }
    }
}

/// Extract the package from a dependency path, preferring the flattened store layout.
fn extract_package(path: &str) -> Option<Package> {
    if let Some(caps) = FLAT_STORE_PACKAGE.captures(path) {
        return Some(Package {
            name: caps["name"].replace('+', "/"),
            version: Some(caps["version"].to_owned()),
        });
    }

    // The innermost package is the one that actually holds the file.
    NESTED_PACKAGE
        .captures_iter(path)
        .last()
        .map(|caps| Package { name: caps["name"].to_owned(), version: None })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(name: &str, version: Option<&str>) -> RootCause {
        RootCause::Dependency {
            package: Some(Package { name: name.to_owned(), version: version.map(str::to_owned) }),
        }
    }

    #[test]
    fn flat_store_path_yields_name_and_version() {
        let cause = RootCause::analyze(Some("node_modules/.pnpm/react@18.2.0"), "GET /");
        assert_eq!(cause, package("react", Some("18.2.0")));
        assert_eq!(cause.to_string(), "Dependency issue with react@18.2.0");
    }

    #[test]
    fn flat_store_wins_over_nested_layout() {
        let path = "/app/node_modules/.pnpm/express@4.18.2/node_modules/express/lib/router.js";
        assert_eq!(RootCause::analyze(Some(path), ""), package("express", Some("4.18.2")));
    }

    #[test]
    fn flat_store_scoped_package() {
        let path = "node_modules/.pnpm/@babel+core@7.23.0/node_modules/@babel/core/lib/index.js";
        assert_eq!(RootCause::analyze(Some(path), ""), package("@babel/core", Some("7.23.0")));
    }

    #[test]
    fn nested_path_yields_name_without_version() {
        let cause = RootCause::analyze(Some("node_modules/lodash/index.js"), "GET /");
        assert_eq!(cause, package("lodash", None));
        assert_eq!(cause.to_string(), "Dependency issue with lodash@latest");
    }

    #[test]
    fn nested_path_prefers_innermost_package() {
        let path = "/srv/node_modules/a/node_modules/@scope/b/dist/b.js";
        assert_eq!(RootCause::analyze(Some(path), ""), package("@scope/b", None));
    }

    #[test]
    fn dependency_without_package_name() {
        let cause = RootCause::analyze(Some("/srv/node_modules/.cache"), "");
        assert_eq!(cause, RootCause::Dependency { package: None });
        assert_eq!(cause.to_string(), "Unknown dependency issue");
    }

    #[test]
    fn first_party_path_is_a_code_issue() {
        let cause = RootCause::analyze(Some("src/api/handler.js"), "GET /users");
        assert_eq!(cause, RootCause::Code { endpoint: "GET /users".to_owned() });
        assert_eq!(cause.to_string(), "Endpoint GET /users");
        assert!(!cause.is_dependency());
    }

    #[test]
    fn missing_origin_is_unknown() {
        let cause = RootCause::analyze(None, "GET /users");
        assert_eq!(cause, RootCause::Unknown);
        assert_eq!(cause.to_string(), "Unknown issue");
    }
}
