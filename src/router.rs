//! Manifest routing: maps a request path onto one deployment resource.
//!
//! Matching is defined over the normalized path: percent-decoded,
//! duplicate slashes collapsed, dot segments resolved. A traversal that
//! would escape the deployment root is a client error, never a lookup.
//!
//! Precedence: a static exact match always wins; a directory path retries
//! with `index.html` appended; dynamic resources match by prefix with the
//! longest prefix winning regardless of manifest order (equal lengths
//! fall back to manifest order).

use percent_encoding::percent_decode_str;

use crate::error::GatewayError;
use crate::manifest::{DeploymentDescriptor, ManifestResource, ResourceKind};

/// Normalizes a raw request path for matching.
///
/// Rejects paths that escape the root (`/../secret`), are not valid
/// UTF-8 after percent-decoding, or do not start with `/`.
///
/// # Examples
///
/// ```rust
/// use origan_gateway::router::normalize_path;
///
/// assert_eq!(normalize_path("//a/./b").unwrap(), "/a/b");
/// assert_eq!(normalize_path("/docs/").unwrap(), "/docs/");
/// assert!(normalize_path("/../etc/passwd").is_err());
/// ```
pub fn normalize_path(raw: &str) -> Result<String, GatewayError> {
    if !raw.starts_with('/') {
        return Err(GatewayError::BadRequest(format!("invalid path {raw:?}")));
    }
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| GatewayError::BadRequest("path is not valid UTF-8".into()))?;
    if decoded.contains('\0') {
        return Err(GatewayError::BadRequest("path contains NUL".into()));
    }

    let trailing_slash = decoded.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(GatewayError::BadRequest("path escapes root".into()));
                }
            }
            other => segments.push(other),
        }
    }

    let mut normalized = String::with_capacity(decoded.len());
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() || trailing_slash {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Selects the manifest resource serving `raw_path`, or `None` when
/// nothing matches.
///
/// # Examples
///
/// ```rust,no_run
/// use origan_gateway::manifest::{DeploymentDescriptor, ResourceKind};
/// use origan_gateway::router::route;
///
/// # fn example(descriptor: &DeploymentDescriptor) {
/// match route(descriptor, "/assets/app.css") {
///     Ok(Some(resource)) if resource.kind == ResourceKind::Static => {
///         println!("static file {}", resource.resource_path);
///     }
///     Ok(Some(resource)) => println!("function {}", resource.resource_path),
///     Ok(None) => println!("no resource matched"),
///     Err(_) => println!("bad request path"),
/// }
/// # }
/// ```
pub fn route<'a>(
    descriptor: &'a DeploymentDescriptor,
    raw_path: &str,
) -> Result<Option<&'a ManifestResource>, GatewayError> {
    let path = normalize_path(raw_path)?;
    let index_path = path.ends_with('/').then(|| format!("{path}index.html"));

    let mut static_exact: Option<&ManifestResource> = None;
    let mut index_fallback: Option<&ManifestResource> = None;
    let mut best_dynamic: Option<(&ManifestResource, usize)> = None;

    for resource in &descriptor.manifest.resources {
        match resource.kind {
            ResourceKind::Static => {
                if static_exact.is_none() && resource.url_path == path {
                    static_exact = Some(resource);
                }
                if let Some(index_path) = &index_path {
                    if index_fallback.is_none() && &resource.url_path == index_path {
                        index_fallback = Some(resource);
                    }
                }
            }
            ResourceKind::Dynamic => {
                if prefix_matches(&resource.url_path, &path) {
                    let len = resource.url_path.len();
                    // Strictly longer wins; equal length keeps the
                    // earlier manifest entry.
                    if best_dynamic.is_none_or(|(_, best)| len > best) {
                        best_dynamic = Some((resource, len));
                    }
                }
            }
        }
    }

    Ok(static_exact
        .or(index_fallback)
        .or(best_dynamic.map(|(resource, _)| resource)))
}

/// Dynamic prefix semantics: the prefix matches itself and anything
/// below it across a `/` boundary. `/api` matches `/api` and `/api/x`
/// but not `/apix`; `/api/` additionally matches `/api`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if let Some(trimmed) = prefix.strip_suffix('/') {
        if !trimmed.is_empty() {
            return path == trimmed || path.starts_with(prefix);
        }
        // Root prefix matches every path.
        return true;
    }
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use std::collections::BTreeMap;

    fn resource(kind: ResourceKind, url_path: &str, resource_path: &str) -> ManifestResource {
        ManifestResource {
            kind,
            url_path: url_path.to_string(),
            resource_path: resource_path.to_string(),
            headers: BTreeMap::new(),
        }
    }

    fn deployment(resources: Vec<ManifestResource>) -> DeploymentDescriptor {
        DeploymentDescriptor {
            deployment_id: "dep".to_string(),
            project_id: "proj".to_string(),
            manifest: Manifest {
                version: 1,
                resources,
            },
            env_vars: BTreeMap::new(),
        }
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("//a//b").unwrap(), "/a/b");
        assert_eq!(normalize_path("/a/./b/").unwrap(), "/a/b/");
        assert_eq!(normalize_path("/a/b/../c").unwrap(), "/a/c");
        assert_eq!(normalize_path("/%61").unwrap(), "/a");
    }

    #[test]
    fn rejects_traversal() {
        assert!(matches!(
            normalize_path("/../etc/passwd"),
            Err(GatewayError::BadRequest(_))
        ));
        assert!(matches!(
            normalize_path("/a/../../b"),
            Err(GatewayError::BadRequest(_))
        ));
        // Encoded dots are decoded before traversal resolution.
        assert!(matches!(
            normalize_path("/%2e%2e/secret"),
            Err(GatewayError::BadRequest(_))
        ));
    }

    #[test]
    fn directory_path_retries_index_html() {
        let d = deployment(vec![resource(
            ResourceKind::Static,
            "/index.html",
            "app/index.html",
        )]);
        let matched = route(&d, "/").unwrap().unwrap();
        assert_eq!(matched.resource_path, "app/index.html");
    }

    #[test]
    fn static_exact_is_case_sensitive() {
        let d = deployment(vec![resource(ResourceKind::Static, "/Logo.png", "logo")]);
        assert!(route(&d, "/Logo.png").unwrap().is_some());
        assert!(route(&d, "/logo.png").unwrap().is_none());
    }

    #[test]
    fn static_beats_dynamic_on_same_path() {
        let d = deployment(vec![
            resource(ResourceKind::Dynamic, "/foo", "fn"),
            resource(ResourceKind::Static, "/foo", "file"),
        ]);
        assert_eq!(route(&d, "/foo").unwrap().unwrap().resource_path, "file");
        assert_eq!(route(&d, "/foo/bar").unwrap().unwrap().resource_path, "fn");
    }

    #[test]
    fn longest_dynamic_prefix_wins_regardless_of_order() {
        let d = deployment(vec![
            resource(ResourceKind::Dynamic, "/api/", "api"),
            resource(ResourceKind::Dynamic, "/api/v2/", "api-v2"),
        ]);
        assert_eq!(
            route(&d, "/api/v2/users").unwrap().unwrap().resource_path,
            "api-v2"
        );
        assert_eq!(route(&d, "/api/users").unwrap().unwrap().resource_path, "api");
    }

    #[test]
    fn equal_length_prefixes_keep_manifest_order() {
        let d = deployment(vec![
            resource(ResourceKind::Dynamic, "/api/", "first"),
            resource(ResourceKind::Dynamic, "/api/", "second"),
        ]);
        assert_eq!(route(&d, "/api/z").unwrap().unwrap().resource_path, "first");
    }

    #[test]
    fn prefix_boundary_rules() {
        assert!(prefix_matches("/api", "/api"));
        assert!(prefix_matches("/api", "/api/users"));
        assert!(!prefix_matches("/api", "/apix"));
        assert!(prefix_matches("/api/", "/api/users"));
        assert!(prefix_matches("/api/", "/api"));
        assert!(prefix_matches("/", "/anything"));
    }

    #[test]
    fn no_match_is_none() {
        let d = deployment(vec![resource(ResourceKind::Static, "/a.css", "a")]);
        assert!(route(&d, "/nope.css").unwrap().is_none());
    }
}
