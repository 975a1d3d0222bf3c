//! Static asset responses.
//!
//! Resolves a matched static resource into a full HTTP response: the body
//! comes from the artifact cache (or a blob stream when the object is too
//! large to buffer), headers carry a strong content hash etag, a
//! cache-control policy keyed off the filename, and the handler honors
//! conditional requests, single-range requests, and gzip negotiation.

use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use http::request::Parts;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::artifact_cache::{
    ArtifactCache, ArtifactKey, ArtifactLoad, ArtifactOutcome, CachedArtifact,
};
use crate::blob::{BlobError, ObjectStore, static_asset_key};
use crate::body::GatewayBody;
use crate::error::GatewayError;
use crate::manifest::{DeploymentDescriptor, ManifestResource};
use crate::types::Response;

/// Bodies below this size are not worth compressing.
const MIN_GZIP_BYTES: usize = 1024;

/// Serves manifest static resources from the object store through the
/// artifact cache.
pub struct StaticFiles {
    store: Arc<dyn ObjectStore>,
    cache: Arc<ArtifactCache>,
}

impl StaticFiles {
    pub fn new(store: Arc<dyn ObjectStore>, cache: Arc<ArtifactCache>) -> Self {
        Self { store, cache }
    }

    /// Serves a static resource with a 200 status.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use origan_gateway::manifest::{DeploymentDescriptor, ManifestResource};
    /// use origan_gateway::static_files::StaticFiles;
    ///
    /// # async fn example(
    /// #     files: &StaticFiles,
    /// #     descriptor: &DeploymentDescriptor,
    /// #     resource: &ManifestResource,
    /// #     parts: &http::request::Parts,
    /// # ) -> Result<(), Box<dyn std::error::Error>> {
    /// let response = files.serve(descriptor, resource, parts).await?;
    /// assert_eq!(response.status(), 200);
    /// assert!(response.headers().contains_key("etag"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn serve(
        &self,
        descriptor: &DeploymentDescriptor,
        resource: &ManifestResource,
        parts: &Parts,
    ) -> Result<Response, GatewayError> {
        self.serve_with_status(descriptor, resource, parts, StatusCode::OK).await
    }

    /// Serves a static resource under an explicit status, used for
    /// deployment-supplied error pages (`/404.html`).
    pub async fn serve_with_status(
        &self,
        descriptor: &DeploymentDescriptor,
        resource: &ManifestResource,
        parts: &Parts,
        status: StatusCode,
    ) -> Result<Response, GatewayError> {
        let blob_key = static_asset_key(&descriptor.deployment_id, &resource.resource_path);
        let cache_key = ArtifactKey {
            deployment_id: descriptor.deployment_id.clone(),
            resource_path: resource.resource_path.clone(),
        };
        let content_type = content_type_for(&resource.resource_path);

        let loader = {
            let store = Arc::clone(&self.store);
            let blob_key = blob_key.clone();
            let content_type = content_type.clone();
            let max_entry = self.cache.max_entry_bytes();
            move || async move {
                let object = store.get(&blob_key).await.map_err(|e| match e {
                    BlobError::NotFound => GatewayError::InternalManifestBroken(blob_key.clone()),
                    BlobError::Transient(reason) => GatewayError::Unavailable(reason),
                })?;
                match object.content_length {
                    Some(len) if len <= max_entry => {
                        let gzipped = object
                            .content_encoding
                            .as_deref()
                            .is_some_and(|enc| enc.eq_ignore_ascii_case("gzip"));
                        let last_modified = object.last_modified.unwrap_or(UNIX_EPOCH);
                        let bytes = object.collect().await.map_err(|e| match e {
                            BlobError::NotFound => {
                                GatewayError::InternalManifestBroken(blob_key.clone())
                            }
                            BlobError::Transient(reason) => GatewayError::Unavailable(reason),
                        })?;
                        Ok(ArtifactLoad::Buffer(CachedArtifact {
                            etag: strong_etag(&bytes),
                            bytes,
                            content_type,
                            last_modified,
                            gzipped,
                        }))
                    }
                    content_length => Ok(ArtifactLoad::Stream {
                        content_length,
                        last_modified: object.last_modified,
                    }),
                }
            }
        };

        match self.cache.get(cache_key, loader).await? {
            ArtifactOutcome::Cached(artifact) => {
                Ok(serve_buffered(&artifact, resource, parts, status))
            }
            ArtifactOutcome::Stream { .. } => {
                self.serve_streaming(&blob_key, &content_type, resource, parts, status).await
            }
        }
    }

    /// Streams an oversized object straight from the store. No etag (the
    /// hash would require buffering) and no range support; conditional
    /// clients fall back to `Last-Modified`.
    async fn serve_streaming(
        &self,
        blob_key: &str,
        content_type: &str,
        resource: &ManifestResource,
        parts: &Parts,
        status: StatusCode,
    ) -> Result<Response, GatewayError> {
        let object = self.store.get(blob_key).await.map_err(|e| match e {
            BlobError::NotFound => GatewayError::InternalManifestBroken(blob_key.to_string()),
            BlobError::Transient(reason) => GatewayError::Unavailable(reason),
        })?;

        let mut headers = HeaderMap::new();
        insert_str(&mut headers, header::CONTENT_TYPE, content_type);
        if let Some(last_modified) = object.last_modified {
            insert_str(
                &mut headers,
                header::LAST_MODIFIED,
                &httpdate::fmt_http_date(last_modified),
            );
        }
        insert_str(
            &mut headers,
            header::CACHE_CONTROL,
            default_cache_control(&resource.resource_path),
        );
        if let Some(len) = object.content_length {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }
        if object
            .content_encoding
            .as_deref()
            .is_some_and(|enc| enc.eq_ignore_ascii_case("gzip"))
        {
            insert_str(&mut headers, header::CONTENT_ENCODING, "gzip");
        }
        apply_overrides(&mut headers, resource);

        let body = if parts.method == Method::HEAD {
            GatewayBody::empty()
        } else {
            GatewayBody::from_stream(object.body)
        };
        Ok(response_with(status, headers, body))
    }
}

/// Builds the response for a buffered artifact.
fn serve_buffered(
    artifact: &CachedArtifact,
    resource: &ManifestResource,
    parts: &Parts,
    status: StatusCode,
) -> Response {
    let mut headers = HeaderMap::new();
    insert_str(&mut headers, header::CONTENT_TYPE, &artifact.content_type);
    insert_str(&mut headers, header::ETAG, &artifact.etag);
    insert_str(
        &mut headers,
        header::LAST_MODIFIED,
        &httpdate::fmt_http_date(artifact.last_modified),
    );
    insert_str(
        &mut headers,
        header::CACHE_CONTROL,
        default_cache_control(&resource.resource_path),
    );

    // Conditional requests only make sense on the happy path, not for a
    // reused error page.
    if status == StatusCode::OK && not_modified(parts, artifact) {
        apply_overrides(&mut headers, resource);
        return response_with(StatusCode::NOT_MODIFIED, headers, GatewayBody::empty());
    }

    let accepts_gzip = accepts_gzip(&parts.headers);
    let range = (status == StatusCode::OK && !artifact.gzipped)
        .then(|| parse_range(&parts.headers, artifact.bytes.len() as u64))
        .flatten();

    let mut body_bytes = artifact.bytes.clone();
    let mut response_status = status;

    if artifact.gzipped {
        if accepts_gzip {
            insert_str(&mut headers, header::CONTENT_ENCODING, "gzip");
            insert_str(&mut headers, header::VARY, "accept-encoding");
        } else {
            // Rare client; serve identity by inflating the stored copy.
            match gunzip(&body_bytes) {
                Ok(identity) => body_bytes = identity,
                Err(e) => {
                    warn!(error = %e, "stored artifact failed to inflate");
                    return GatewayError::Internal("bad pre-compressed artifact".into())
                        .into_response();
                }
            }
        }
    } else if let Some(range) = range {
        match range {
            RangeOutcome::Satisfiable { start, end } => {
                let total = artifact.bytes.len() as u64;
                body_bytes = body_bytes.slice(start as usize..=end as usize);
                response_status = StatusCode::PARTIAL_CONTENT;
                insert_str(
                    &mut headers,
                    header::CONTENT_RANGE,
                    &format!("bytes {start}-{end}/{total}"),
                );
            }
            RangeOutcome::Unsatisfiable => {
                let total = artifact.bytes.len();
                insert_str(&mut headers, header::CONTENT_RANGE, &format!("bytes */{total}"));
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0));
                apply_overrides(&mut headers, resource);
                return response_with(
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    headers,
                    GatewayBody::empty(),
                );
            }
        }
    } else if parts.method != Method::HEAD
        && accepts_gzip
        && compressible(&artifact.content_type)
        && body_bytes.len() >= MIN_GZIP_BYTES
    {
        match gzip(&body_bytes) {
            Ok(compressed) if compressed.len() < body_bytes.len() => {
                body_bytes = compressed;
                insert_str(&mut headers, header::CONTENT_ENCODING, "gzip");
                insert_str(&mut headers, header::VARY, "accept-encoding");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "gzip failed, serving identity"),
        }
    }

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body_bytes.len()));
    apply_overrides(&mut headers, resource);

    let body = if parts.method == Method::HEAD {
        GatewayBody::empty()
    } else {
        GatewayBody::from(body_bytes)
    };
    response_with(response_status, headers, body)
}

fn response_with(status: StatusCode, headers: HeaderMap, body: GatewayBody) -> Response {
    let mut response = hyper::Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Manifest-declared per-resource headers, applied last so they override
/// every default.
fn apply_overrides(headers: &mut HeaderMap, resource: &ManifestResource) {
    for (name, value) in &resource.headers {
        let Ok(name) = name.parse::<HeaderName>() else {
            warn!(header = %name, "skipping invalid manifest header name");
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            warn!(header = %name, "skipping invalid manifest header value");
            continue;
        };
        headers.insert(name, value);
    }
}

fn insert_str(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// Strong etag: quoted lowercase hex SHA-256 of the content.
///
/// # Examples
///
/// ```rust
/// use origan_gateway::static_files::strong_etag;
///
/// let etag = strong_etag(b"<html>hi</html>");
/// assert!(etag.starts_with('"') && etag.ends_with('"'));
/// assert_eq!(etag.len(), 66);
/// ```
pub fn strong_etag(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut etag = String::with_capacity(66);
    etag.push('"');
    for byte in digest {
        let _ = write!(etag, "{byte:02x}");
    }
    etag.push('"');
    etag
}

/// Content type from the resource path extension.
pub fn content_type_for(resource_path: &str) -> String {
    let extension = resource_path.rsplit('.').next().unwrap_or("");
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8".to_string(),
        "css" => "text/css; charset=utf-8".to_string(),
        "js" | "mjs" => "application/javascript".to_string(),
        "json" => "application/json".to_string(),
        "png" => "image/png".to_string(),
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "gif" => "image/gif".to_string(),
        "svg" => "image/svg+xml".to_string(),
        "ico" => "image/x-icon".to_string(),
        "wasm" => "application/wasm".to_string(),
        "map" => "application/json".to_string(),
        _ => mime_guess::from_path(resource_path)
            .first_or_octet_stream()
            .to_string(),
    }
}

/// Whether gzip is worth negotiating for this content type.
fn compressible(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.starts_with("application/json")
        || content_type.starts_with("application/javascript")
        || content_type.starts_with("image/svg+xml")
}

/// Default cache policy: HTML revalidates, hashed-filename assets are
/// immutable, everything else revalidates to stay safe.
fn default_cache_control(resource_path: &str) -> &'static str {
    if has_hashed_filename(resource_path) {
        "public, max-age=31536000, immutable"
    } else {
        "public, max-age=0, must-revalidate"
    }
}

/// Heuristic for build-pipeline output: the filename contains a segment
/// of 8+ alphanumeric characters including a digit before the extension
/// (`app.3f9d2c1a.js`, `chunk-5a6b7c8d9e.css`).
fn has_hashed_filename(resource_path: &str) -> bool {
    let filename = resource_path.rsplit('/').next().unwrap_or(resource_path);
    let Some((stem, _extension)) = filename.rsplit_once('.') else {
        return false;
    };
    stem.split(['.', '-', '_']).any(|segment| {
        segment.len() >= 8
            && segment.chars().all(|c| c.is_ascii_alphanumeric())
            && segment.chars().any(|c| c.is_ascii_digit())
    })
}

/// Conditional request evaluation. `If-None-Match` wins over
/// `If-Modified-Since` when both are present.
fn not_modified(parts: &Parts, artifact: &CachedArtifact) -> bool {
    if !matches!(parts.method, Method::GET | Method::HEAD) {
        return false;
    }
    if let Some(if_none_match) = parts.headers.get(header::IF_NONE_MATCH) {
        let Ok(value) = if_none_match.to_str() else {
            return false;
        };
        return value.split(',').map(str::trim).any(|candidate| {
            candidate == "*" || candidate.trim_start_matches("W/") == artifact.etag
        });
    }
    if let Some(if_modified_since) = parts.headers.get(header::IF_MODIFIED_SINCE) {
        if let Some(since) = if_modified_since
            .to_str()
            .ok()
            .and_then(|v| httpdate::parse_http_date(v).ok())
        {
            // HTTP dates have second precision; truncate before
            // comparing.
            let modified_secs = artifact
                .last_modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let since_secs = since
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            return modified_secs <= since_secs;
        }
    }
    false
}

enum RangeOutcome {
    Satisfiable { start: u64, end: u64 },
    Unsatisfiable,
}

/// Parses a single-range `Range` header against a body of `total` bytes.
///
/// Multi-range and malformed headers yield `None` (the full body is
/// served with a 200); a syntactically valid range beyond the end is
/// unsatisfiable.
fn parse_range(headers: &HeaderMap, total: u64) -> Option<RangeOutcome> {
    let value = headers.get(header::RANGE)?.to_str().ok()?;
    let spec = value.strip_prefix("bytes=")?;
    if spec.contains(',') || total == 0 {
        return None;
    }
    let (start_str, end_str) = spec.split_once('-')?;

    if start_str.is_empty() {
        // Suffix range: last N bytes.
        let suffix: u64 = end_str.parse().ok()?;
        if suffix == 0 {
            return Some(RangeOutcome::Unsatisfiable);
        }
        let start = total.saturating_sub(suffix);
        return Some(RangeOutcome::Satisfiable {
            start,
            end: total - 1,
        });
    }

    let start: u64 = start_str.parse().ok()?;
    let end: u64 = if end_str.is_empty() {
        total - 1
    } else {
        end_str.parse::<u64>().ok()?.min(total - 1)
    };
    if start > end || start >= total {
        return Some(RangeOutcome::Unsatisfiable);
    }
    Some(RangeOutcome::Satisfiable { start, end })
}

fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(',')
                .map(|token| token.split(';').next().unwrap_or("").trim())
                .any(|token| token.eq_ignore_ascii_case("gzip"))
        })
}

fn gzip(bytes: &Bytes) -> std::io::Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder.write_all(bytes)?;
    Ok(Bytes::from(encoder.finish()?))
}

fn gunzip(bytes: &Bytes) -> std::io::Result<Bytes> {
    use std::io::Read;
    let mut decoder = flate2::read::GzDecoder::new(&bytes[..]);
    let mut out = Vec::with_capacity(bytes.len() * 2);
    decoder.read_to_end(&mut out)?;
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::manifest::ResourceKind;

    fn artifact(content: &[u8]) -> CachedArtifact {
        CachedArtifact {
            bytes: Bytes::copy_from_slice(content),
            content_type: "text/html; charset=utf-8".into(),
            etag: strong_etag(content),
            last_modified: UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000),
            gzipped: false,
        }
    }

    fn resource() -> ManifestResource {
        ManifestResource {
            kind: ResourceKind::Static,
            url_path: "/index.html".into(),
            resource_path: "app/index.html".into(),
            headers: BTreeMap::new(),
        }
    }

    fn parts(builder: http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn strong_etag_is_quoted_sha256() {
        // sha256("") is well known.
        assert_eq!(
            strong_etag(b""),
            "\"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\""
        );
    }

    #[test]
    fn mime_table() {
        assert_eq!(content_type_for("a/b.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("x.js"), "application/javascript");
        assert_eq!(content_type_for("x.wasm"), "application/wasm");
        assert_eq!(content_type_for("x.svg"), "image/svg+xml");
        assert_eq!(content_type_for("x.unknownext"), "application/octet-stream");
    }

    #[test]
    fn hashed_filename_heuristic() {
        assert!(has_hashed_filename("assets/app.3f9d2c1a.js"));
        assert!(has_hashed_filename("chunk-5a6b7c8d9e.css"));
        assert!(!has_hashed_filename("index.html"));
        assert!(!has_hashed_filename("verylongname.css"));
    }

    #[test]
    fn serves_body_with_exact_content_length() {
        let artifact = artifact(b"<html>hi</html>");
        let response = serve_buffered(
            &artifact,
            &resource(),
            &parts(http::Request::get("/")),
            StatusCode::OK,
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            HeaderValue::from(15)
        );
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        assert_eq!(response.headers()[header::ETAG], artifact.etag.as_str());
    }

    #[test]
    fn if_none_match_returns_304() {
        let artifact = artifact(b"<html>hi</html>");
        let request = http::Request::get("/").header(header::IF_NONE_MATCH, &artifact.etag);
        let response = serve_buffered(&artifact, &resource(), &parts(request), StatusCode::OK);
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[header::ETAG], artifact.etag.as_str());
    }

    #[test]
    fn if_modified_since_returns_304() {
        let artifact = artifact(b"x");
        let request = http::Request::get("/").header(
            header::IF_MODIFIED_SINCE,
            httpdate::fmt_http_date(artifact.last_modified),
        );
        let response = serve_buffered(&artifact, &resource(), &parts(request), StatusCode::OK);
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[test]
    fn single_range_returns_206() {
        let artifact = artifact(b"0123456789");
        let request = http::Request::get("/").header(header::RANGE, "bytes=2-5");
        let response = serve_buffered(&artifact, &resource(), &parts(request), StatusCode::OK);
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], HeaderValue::from(4));
    }

    #[test]
    fn suffix_and_open_ranges() {
        assert!(matches!(
            parse_range(
                &collect_headers(&[(header::RANGE, "bytes=-3")]),
                10
            ),
            Some(RangeOutcome::Satisfiable { start: 7, end: 9 })
        ));
        assert!(matches!(
            parse_range(&collect_headers(&[(header::RANGE, "bytes=4-")]), 10),
            Some(RangeOutcome::Satisfiable { start: 4, end: 9 })
        ));
        // Multi-range is served whole.
        assert!(parse_range(&collect_headers(&[(header::RANGE, "bytes=0-1,4-5")]), 10).is_none());
        assert!(matches!(
            parse_range(&collect_headers(&[(header::RANGE, "bytes=12-")]), 10),
            Some(RangeOutcome::Unsatisfiable)
        ));
    }

    #[test]
    fn unsatisfiable_range_is_416() {
        let artifact = artifact(b"0123456789");
        let request = http::Request::get("/").header(header::RANGE, "bytes=50-60");
        let response = serve_buffered(&artifact, &resource(), &parts(request), StatusCode::OK);
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */10");
    }

    #[test]
    fn gzip_applies_to_large_compressible_bodies() {
        let content = "a".repeat(4096);
        let artifact = artifact(content.as_bytes());
        let request = http::Request::get("/").header(header::ACCEPT_ENCODING, "gzip, br");
        let response = serve_buffered(&artifact, &resource(), &parts(request), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()[header::VARY], "accept-encoding");
        let len: usize = response.headers()[header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(len < 4096);
    }

    #[test]
    fn small_bodies_stay_identity() {
        let artifact = artifact(b"tiny");
        let request = http::Request::get("/").header(header::ACCEPT_ENCODING, "gzip");
        let response = serve_buffered(&artifact, &resource(), &parts(request), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[test]
    fn range_disables_gzip() {
        let content = "b".repeat(4096);
        let artifact = artifact(content.as_bytes());
        let request = http::Request::get("/")
            .header(header::ACCEPT_ENCODING, "gzip")
            .header(header::RANGE, "bytes=0-99");
        let response = serve_buffered(&artifact, &resource(), &parts(request), StatusCode::OK);
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            HeaderValue::from(100)
        );
    }

    #[test]
    fn manifest_headers_override_defaults() {
        let artifact = artifact(b"body");
        let mut resource = resource();
        resource
            .headers
            .insert("Cache-Control".into(), "no-store".into());
        resource.headers.insert("X-Custom".into(), "1".into());
        let response = serve_buffered(
            &artifact,
            &resource,
            &parts(http::Request::get("/")),
            StatusCode::OK,
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(response.headers()["x-custom"], "1");
    }

    #[test]
    fn head_omits_body_but_keeps_headers() {
        let artifact = artifact(b"<html>hi</html>");
        let response = serve_buffered(
            &artifact,
            &resource(),
            &parts(http::Request::head("/")),
            StatusCode::OK,
        );
        assert_eq!(
            response.headers()[header::CONTENT_LENGTH],
            HeaderValue::from(15)
        );
        use hyper::body::Body as _;
        assert!(response.body().is_end_stream());
    }

    #[test]
    fn hashed_assets_get_immutable_cache_control() {
        let artifact = artifact(b"asset");
        let mut resource = resource();
        resource.resource_path = "assets/app.3f9d2c1a.js".into();
        let response = serve_buffered(
            &artifact,
            &resource,
            &parts(http::Request::get("/")),
            StatusCode::OK,
        );
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, max-age=31536000, immutable"
        );
    }

    fn collect_headers(pairs: &[(HeaderName, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        headers
    }
}
