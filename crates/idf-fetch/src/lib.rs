// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! idf-fetch
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Content-addressed blob storage.
pub mod blob;

pub use blob::{BlobEntry, BlobStore, RawManifestLine, extension_for};

use idf_error::{ErrorCode, FoundryError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

/// Fetcher version pinned into phase manifests for reproducibility.
pub const FETCHER_VERSION: &str = concat!("idf-fetch/", env!("CARGO_PKG_VERSION"));

/// Widest allowed sitemap fan-out.
pub const MAX_FANOUT: usize = 10;

// ---------------------------------------------------------------------------
// Options & results
// ---------------------------------------------------------------------------

/// Per-request deadlines and size caps.
#[derive(Debug, Clone)]
pub struct FetchLimits {
    /// Deadline for a single URL fetch.
    pub timeout: Duration,
    /// Deadline for a PDF fetch (larger payloads).
    pub pdf_timeout: Duration,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pdf_timeout: Duration::from_secs(60),
        }
    }
}

/// A fetched byte blob plus its content address and provenance.
#[derive(Debug, Clone)]
pub struct RawArtifact {
    /// Source URI as given by the caller.
    pub uri: String,
    /// Content address (`doc_id`) of the raw bytes.
    pub sha256: String,
    /// Where the blob landed on disk.
    pub path: PathBuf,
    /// Payload size in bytes.
    pub bytes: u64,
    /// MIME type, when known.
    pub content_type: Option<String>,
    /// `true` when the blob already existed and no ledger line was appended.
    pub skipped: bool,
    /// The raw bytes, handed straight to extraction.
    pub data: Vec<u8>,
}

/// A per-item failure inside a fan-out fetch.
#[derive(Debug)]
pub struct FetchFailure {
    /// The URI or path that failed.
    pub uri: String,
    /// Why it failed.
    pub error: FoundryError,
}

/// Result of a sitemap or folder fan-out: independent successes and failures.
#[derive(Debug, Default)]
pub struct FanoutOutcome {
    /// Successfully stored artifacts, in deterministic (sorted) input order.
    pub artifacts: Vec<RawArtifact>,
    /// Per-item failures, in the same order.
    pub failures: Vec<FetchFailure>,
}

/// Sitemap crawl options.
#[derive(Debug, Clone)]
pub struct SitemapOptions {
    /// Keep only URLs matching at least one of these regexes (empty = all).
    pub include: Vec<String>,
    /// Drop URLs matching any of these regexes, applied after includes.
    pub exclude: Vec<String>,
    /// Cap on pages fetched after sorting.
    pub max_pages: usize,
    /// Fan-out width, clamped to `1..=10`.
    pub concurrency: usize,
}

impl Default for SitemapOptions {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            max_pages: 50,
            concurrency: 3,
        }
    }
}

/// Folder walk options.
#[derive(Debug, Clone, Default)]
pub struct FolderOptions {
    /// Include globs relative to the root (empty = all files).
    pub include: Vec<String>,
    /// Exclude globs, taking precedence over includes.
    pub exclude: Vec<String>,
    /// Cap on files processed after sorting.
    pub max_files: Option<usize>,
    /// Per-file byte cap; larger files are recorded as failures.
    pub max_file_bytes: Option<u64>,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Bounded retrieval front-end over the blob store.
///
/// A non-empty allowlist requires an exact hostname match; the blocklist
/// pre-empts the allowlist.  All fan-out children share the same gates.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    store: BlobStore,
    allow_domains: Vec<String>,
    block_domains: Vec<String>,
    limits: FetchLimits,
}

impl Fetcher {
    /// Build a fetcher over `store` with default limits and open gates.
    pub fn new(store: BlobStore) -> Self {
        Self {
            client: reqwest::Client::new(),
            store,
            allow_domains: Vec::new(),
            block_domains: Vec::new(),
            limits: FetchLimits::default(),
        }
    }

    /// Restrict fetches to exactly these hostnames.
    #[must_use]
    pub fn with_allowlist(mut self, domains: Vec<String>) -> Self {
        self.allow_domains = domains;
        self
    }

    /// Refuse these hostnames even when allowlisted.
    #[must_use]
    pub fn with_blocklist(mut self, domains: Vec<String>) -> Self {
        self.block_domains = domains;
        self
    }

    /// Override the per-request deadlines.
    #[must_use]
    pub fn with_limits(mut self, limits: FetchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The underlying blob store.
    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    // -- URL -----------------------------------------------------------------

    /// Fetch a single URL into the blob store.
    ///
    /// # Errors
    ///
    /// `DOMAIN_BLOCKED` (non-recoverable) when gating fails; `FETCH_TIMEOUT`
    /// (recoverable) on deadline expiry; `FETCH_FAILED` on transport errors
    /// (recoverable) and HTTP >= 400 (recoverable only for 5xx, 408, 429);
    /// `FILE_TOO_LARGE` past the blob cap.
    pub async fn fetch_url(&self, url: &str, force: bool) -> Result<RawArtifact, FoundryError> {
        let parsed = self.gate(url)?;
        let (data, content_type) = self.get_bytes(&parsed, self.limits.timeout).await?;
        self.store_artifact(url, &parsed, data, content_type.as_deref(), force)
    }

    // -- PDF -----------------------------------------------------------------

    /// Fetch a PDF by URL or local path, validating the `%PDF` magic.
    ///
    /// # Errors
    ///
    /// `PARSE_ERROR` on bad magic; otherwise as [`Fetcher::fetch_url`].
    pub async fn fetch_pdf(&self, location: &str, force: bool) -> Result<RawArtifact, FoundryError> {
        let data = if location.starts_with("http://") || location.starts_with("https://") {
            let parsed = self.gate(location)?;
            self.get_bytes(&parsed, self.limits.pdf_timeout).await?.0
        } else {
            tokio::fs::read(location).await.map_err(|e| {
                FoundryError::new(
                    ErrorCode::FetchFailed,
                    format!("read pdf {location}: {e}"),
                )
                .with_detail("path", location)
            })?
        };

        if !data.starts_with(b"%PDF") {
            return Err(FoundryError::new(
                ErrorCode::ParseError,
                "payload does not carry a %PDF magic header",
            )
            .with_detail("uri", location));
        }

        let entry = self
            .store
            .write(location, &data, Some("application/pdf"), None, force)?;
        Ok(artifact(location, entry, data))
    }

    // -- Sitemap -------------------------------------------------------------

    /// Crawl a sitemap: fetch the XML, extract `<loc>` entries, filter,
    /// sort, truncate, and fan out bounded page fetches.
    ///
    /// Individual page failures do not abort the crawl; they are collected
    /// in the returned [`FanoutOutcome`].
    ///
    /// # Errors
    ///
    /// Fails outright only when the sitemap itself cannot be fetched or an
    /// include/exclude regex does not compile (`INVALID_INPUT`).
    pub async fn fetch_sitemap(
        &self,
        sitemap_url: &str,
        options: &SitemapOptions,
        force: bool,
    ) -> Result<FanoutOutcome, FoundryError> {
        let parsed = self.gate(sitemap_url)?;
        let (xml, _) = self.get_bytes(&parsed, self.limits.timeout).await?;
        let xml = String::from_utf8_lossy(&xml);

        let include = compile_regexes(&options.include)?;
        let exclude = compile_regexes(&options.exclude)?;

        let mut urls: Vec<String> = extract_locs(&xml)
            .into_iter()
            .filter(|u| include.is_empty() || include.iter().any(|re| re.is_match(u)))
            .filter(|u| !exclude.iter().any(|re| re.is_match(u)))
            .collect();
        urls.sort();
        urls.dedup();
        urls.truncate(options.max_pages);

        debug!(
            target: "idf.fetch",
            sitemap = sitemap_url,
            pages = urls.len(),
            "sitemap crawl planned"
        );

        let width = options.concurrency.clamp(1, MAX_FANOUT);
        let semaphore = Arc::new(Semaphore::new(width));
        let mut set = JoinSet::new();
        for (index, url) in urls.into_iter().enumerate() {
            let fetcher = self.clone();
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let result = fetcher.fetch_url(&url, force).await;
                (index, url, result)
            });
        }

        let mut slots: Vec<Option<(String, Result<RawArtifact, FoundryError>)>> = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (index, url, result) = joined.map_err(|e| {
                FoundryError::new(ErrorCode::FetchFailed, format!("fetch task panicked: {e}"))
            })?;
            if slots.len() <= index {
                slots.resize_with(index + 1, || None);
            }
            slots[index] = Some((url, result));
        }

        let mut outcome = FanoutOutcome::default();
        for slot in slots.into_iter().flatten() {
            match slot {
                (_, Ok(artifact)) => outcome.artifacts.push(artifact),
                (url, Err(error)) => {
                    warn!(target: "idf.fetch", %url, %error, "sitemap page failed");
                    outcome.failures.push(FetchFailure { uri: url, error });
                }
            }
        }
        Ok(outcome)
    }

    // -- Folder --------------------------------------------------------------

    /// Walk a local directory into the blob store.
    ///
    /// The file list is sorted lexicographically before truncation, so runs
    /// are deterministic.  Oversized and unreadable files are recorded as
    /// failures without aborting the walk.
    ///
    /// # Errors
    ///
    /// `FETCH_FAILED` when the root does not exist; `INVALID_INPUT` for
    /// malformed globs.
    pub async fn fetch_folder(
        &self,
        root: &Path,
        options: &FolderOptions,
        force: bool,
    ) -> Result<FanoutOutcome, FoundryError> {
        if !root.is_dir() {
            return Err(FoundryError::new(
                ErrorCode::FetchFailed,
                format!("folder does not exist: {}", root.display()),
            )
            .with_detail("path", root.display().to_string()));
        }

        let include = compile_globs(&options.include)?;
        let exclude = compile_globs(&options.exclude)?;

        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                let rel = p.strip_prefix(root).unwrap_or(p);
                if exclude.as_ref().is_some_and(|set| set.is_match(rel)) {
                    return false;
                }
                include.as_ref().is_none_or(|set| set.is_match(rel))
            })
            .collect();
        paths.sort();
        if let Some(cap) = options.max_files {
            paths.truncate(cap);
        }

        let byte_cap = options.max_file_bytes.unwrap_or(self.store.byte_cap());
        let mut outcome = FanoutOutcome::default();
        for path in paths {
            let uri = path.display().to_string();
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    outcome.failures.push(FetchFailure {
                        uri,
                        error: FoundryError::new(
                            ErrorCode::FetchFailed,
                            format!("read file: {e}"),
                        ),
                    });
                    continue;
                }
            };
            if data.len() as u64 > byte_cap {
                outcome.failures.push(FetchFailure {
                    uri: uri.clone(),
                    error: FoundryError::new(
                        ErrorCode::FileTooLarge,
                        format!("{} bytes exceeds cap {byte_cap}", data.len()),
                    )
                    .with_detail("path", uri),
                });
                continue;
            }

            let ext = path.extension().and_then(|e| e.to_str());
            let content_type = mime_for_extension(ext);
            match self.store.write(&uri, &data, content_type, ext, force) {
                Ok(entry) => outcome.artifacts.push(artifact(&uri, entry, data)),
                Err(error) => outcome.failures.push(FetchFailure { uri, error }),
            }
        }
        Ok(outcome)
    }

    // -- internals -----------------------------------------------------------

    fn gate(&self, url: &str) -> Result<Url, FoundryError> {
        let parsed = Url::parse(url).map_err(|e| {
            FoundryError::new(ErrorCode::InvalidInput, format!("invalid url {url}: {e}"))
        })?;
        let host = parsed.host_str().ok_or_else(|| {
            FoundryError::new(ErrorCode::InvalidInput, format!("url has no host: {url}"))
        })?;

        if self.block_domains.iter().any(|d| d == host) {
            return Err(FoundryError::new(
                ErrorCode::DomainBlocked,
                format!("domain {host} is blocklisted"),
            )
            .with_detail("host", host));
        }
        if !self.allow_domains.is_empty() && !self.allow_domains.iter().any(|d| d == host) {
            return Err(FoundryError::new(
                ErrorCode::DomainBlocked,
                format!("domain {host} is not on the allowlist"),
            )
            .with_detail("host", host)
            .with_suggestion("add the hostname to allow_domains"));
        }
        Ok(parsed)
    }

    async fn get_bytes(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<(Vec<u8>, Option<String>), FoundryError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport(url, e))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let recoverable =
                status.is_server_error() || status.as_u16() == 408 || status.as_u16() == 429;
            return Err(FoundryError::new(
                ErrorCode::FetchFailed,
                format!("GET {url} returned {status}"),
            )
            .recoverable(recoverable)
            .with_detail("status", status.as_u16())
            .with_detail("url", url.as_str()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let data = response
            .bytes()
            .await
            .map_err(|e| classify_transport(url, e))?;
        Ok((data.to_vec(), content_type))
    }

    fn store_artifact(
        &self,
        uri: &str,
        parsed: &Url,
        data: Vec<u8>,
        content_type: Option<&str>,
        force: bool,
    ) -> Result<RawArtifact, FoundryError> {
        let source_ext = Path::new(parsed.path())
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_string);
        let entry = self
            .store
            .write(uri, &data, content_type, source_ext.as_deref(), force)?;
        Ok(artifact(uri, entry, data))
    }
}

fn artifact(uri: &str, entry: BlobEntry, data: Vec<u8>) -> RawArtifact {
    RawArtifact {
        uri: uri.to_string(),
        sha256: entry.sha256,
        path: entry.path,
        bytes: entry.bytes,
        content_type: entry.content_type,
        skipped: entry.skipped,
        data,
    }
}

fn classify_transport(url: &Url, err: reqwest::Error) -> FoundryError {
    if err.is_timeout() {
        FoundryError::new(
            ErrorCode::FetchTimeout,
            format!("GET {url} timed out"),
        )
        .with_detail("url", url.as_str())
    } else {
        FoundryError::new(
            ErrorCode::FetchFailed,
            format!("GET {url} failed: {err}"),
        )
        .recoverable(true)
        .with_detail("url", url.as_str())
    }
}

fn compile_regexes(patterns: &[String]) -> Result<Vec<Regex>, FoundryError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                FoundryError::new(ErrorCode::InvalidInput, format!("bad pattern {p:?}: {e}"))
            })
        })
        .collect()
}

fn compile_globs(patterns: &[String]) -> Result<Option<globset::GlobSet>, FoundryError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::Glob::new(pattern).map_err(|e| {
            FoundryError::new(ErrorCode::InvalidInput, format!("bad glob {pattern:?}: {e}"))
        })?;
        builder.add(glob);
    }
    builder.build().map(Some).map_err(|e| {
        FoundryError::new(ErrorCode::InvalidInput, format!("glob set failed: {e}"))
    })
}

/// Pull `<loc>` values out of sitemap XML.
fn extract_locs(xml: &str) -> Vec<String> {
    // A full XML parser buys nothing here: sitemap <loc> bodies are flat
    // character data.
    let re = Regex::new(r"<loc>\s*([^<]+?)\s*</loc>").expect("static pattern");
    re.captures_iter(xml)
        .map(|cap| cap[1].to_string())
        .collect()
}

fn mime_for_extension(ext: Option<&str>) -> Option<&'static str> {
    match ext {
        Some("html") | Some("htm") => Some("text/html"),
        Some("md") | Some("markdown") => Some("text/markdown"),
        Some("txt") => Some("text/plain"),
        Some("csv") => Some("text/csv"),
        Some("json") => Some("application/json"),
        Some("pdf") => Some("application/pdf"),
        Some("xml") => Some("application/xml"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(dir: &TempDir) -> Fetcher {
        Fetcher::new(BlobStore::new(dir.path().join("raw")))
    }

    // -- URL fetching ----------------------------------------------------

    #[tokio::test]
    async fn fetch_url_stores_blob() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("hello docs")
                    .insert_header("content-type", "text/plain"),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let artifact = fetcher(&dir)
            .fetch_url(&format!("{}/doc", server.uri()), false)
            .await
            .unwrap();
        assert!(!artifact.skipped);
        assert_eq!(artifact.data, b"hello docs");
        assert_eq!(artifact.content_type.as_deref(), Some("text/plain"));
        assert!(artifact.path.exists());
    }

    #[tokio::test]
    async fn second_fetch_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("same bytes"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let f = fetcher(&dir);
        let url = format!("{}/doc", server.uri());
        let first = f.fetch_url(&url, false).await.unwrap();
        let second = f.fetch_url(&url, false).await.unwrap();
        assert!(!first.skipped);
        assert!(second.skipped);
        assert_eq!(f.store().manifest().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn http_404_is_non_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = fetcher(&dir)
            .fetch_url(&format!("{}/gone", server.uri()), false)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FetchFailed);
        assert!(!err.recoverable);
    }

    #[tokio::test]
    async fn http_503_and_429_are_recoverable() {
        for status in [503u16, 429] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let dir = TempDir::new().unwrap();
            let err = fetcher(&dir)
                .fetch_url(&format!("{}/busy", server.uri()), false)
                .await
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::FetchFailed);
            assert!(err.recoverable, "status {status} should be recoverable");
        }
    }

    #[tokio::test]
    async fn timeout_is_recoverable_and_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let f = fetcher(&dir).with_limits(FetchLimits {
            timeout: Duration::from_millis(1000),
            pdf_timeout: Duration::from_secs(60),
        });

        let started = Instant::now();
        let err = f
            .fetch_url(&format!("{}/slow", server.uri()), false)
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(1200));
        assert_eq!(err.code, ErrorCode::FetchTimeout);
        assert!(err.recoverable);
        assert!(f.store().manifest().unwrap().is_empty());
    }

    // -- Domain gating ---------------------------------------------------

    #[tokio::test]
    async fn allowlist_requires_exact_host() {
        let dir = TempDir::new().unwrap();
        let f = fetcher(&dir).with_allowlist(vec!["docs.example.com".into()]);
        let err = f
            .fetch_url("https://other.example.com/page", false)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DomainBlocked);
        assert!(!err.recoverable);
    }

    #[tokio::test]
    async fn blocklist_preempts_allowlist() {
        let dir = TempDir::new().unwrap();
        let f = fetcher(&dir)
            .with_allowlist(vec!["example.com".into()])
            .with_blocklist(vec!["example.com".into()]);
        let err = f.fetch_url("https://example.com/", false).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DomainBlocked);
    }

    // -- Sitemaps ----------------------------------------------------------

    fn sitemap_xml(base: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?><urlset>\
             <url><loc>{base}/c</loc></url>\
             <url><loc>{base}/a</loc></url>\
             <url><loc>{base}/b</loc></url>\
             </urlset>"
        )
    }

    #[tokio::test]
    async fn sitemap_fetches_sorted_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap_xml(&server.uri())))
            .mount(&server)
            .await;
        for page in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/{page}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!("page {page}")))
                .mount(&server)
                .await;
        }

        let dir = TempDir::new().unwrap();
        let outcome = fetcher(&dir)
            .fetch_sitemap(
                &format!("{}/sitemap.xml", server.uri()),
                &SitemapOptions::default(),
                false,
            )
            .await
            .unwrap();

        assert!(outcome.failures.is_empty());
        let uris: Vec<_> = outcome.artifacts.iter().map(|a| a.uri.clone()).collect();
        // Lexicographically sorted regardless of sitemap order.
        assert_eq!(
            uris,
            vec![
                format!("{}/a", server.uri()),
                format!("{}/b", server.uri()),
                format!("{}/c", server.uri()),
            ]
        );
    }

    #[tokio::test]
    async fn sitemap_applies_filters_and_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap_xml(&server.uri())))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let outcome = fetcher(&dir)
            .fetch_sitemap(
                &format!("{}/sitemap.xml", server.uri()),
                &SitemapOptions {
                    include: vec!["/(a|b|c)$".into()],
                    exclude: vec!["/c$".into()],
                    max_pages: 1,
                    concurrency: 2,
                },
                false,
            )
            .await
            .unwrap();

        // Include keeps a,b,c; exclude drops c; cap keeps only a.
        assert_eq!(outcome.artifacts.len(), 1);
        assert!(outcome.artifacts[0].uri.ends_with("/a"));
    }

    #[tokio::test]
    async fn sitemap_page_failure_does_not_abort() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap_xml(&server.uri())))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let outcome = fetcher(&dir)
            .fetch_sitemap(
                &format!("{}/sitemap.xml", server.uri()),
                &SitemapOptions::default(),
                false,
            )
            .await
            .unwrap();
        assert_eq!(outcome.artifacts.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].uri.ends_with("/b"));
        assert!(outcome.failures[0].error.recoverable);
    }

    #[tokio::test]
    async fn bad_sitemap_regex_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<urlset/>"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = fetcher(&dir)
            .fetch_sitemap(
                &format!("{}/sitemap.xml", server.uri()),
                &SitemapOptions {
                    include: vec!["(unclosed".into()],
                    ..SitemapOptions::default()
                },
                false,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    // -- Folders -----------------------------------------------------------

    #[tokio::test]
    async fn folder_walk_is_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("docs");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("b.md"), "bee").unwrap();
        std::fs::write(root.join("a.md"), "ay").unwrap();
        std::fs::write(root.join("skip.log"), "nope").unwrap();
        std::fs::write(root.join("sub/c.md"), "see").unwrap();

        let out_dir = TempDir::new().unwrap();
        let outcome = fetcher(&out_dir)
            .fetch_folder(
                &root,
                &FolderOptions {
                    include: vec!["**/*.md".into()],
                    ..FolderOptions::default()
                },
                false,
            )
            .await
            .unwrap();

        let names: Vec<_> = outcome
            .artifacts
            .iter()
            .map(|a| {
                Path::new(&a.uri)
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.md", "b.md", "c.md"]);
        assert_eq!(
            outcome.artifacts[0].content_type.as_deref(),
            Some("text/markdown")
        );
    }

    #[tokio::test]
    async fn oversized_file_is_recorded_not_fatal() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("docs");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("big.txt"), "x".repeat(100)).unwrap();
        std::fs::write(root.join("ok.txt"), "fine").unwrap();

        let out_dir = TempDir::new().unwrap();
        let outcome = fetcher(&out_dir)
            .fetch_folder(
                &root,
                &FolderOptions {
                    max_file_bytes: Some(10),
                    ..FolderOptions::default()
                },
                false,
            )
            .await
            .unwrap();
        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].error.code, ErrorCode::FileTooLarge);
    }

    #[tokio::test]
    async fn missing_folder_fails() {
        let dir = TempDir::new().unwrap();
        let err = fetcher(&dir)
            .fetch_folder(Path::new("/does/not/exist"), &FolderOptions::default(), false)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FetchFailed);
    }

    // -- PDFs ---------------------------------------------------------------

    #[tokio::test]
    async fn pdf_magic_validated() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.pdf");
        let bad = dir.path().join("bad.pdf");
        std::fs::write(&good, b"%PDF-1.7 rest of file").unwrap();
        std::fs::write(&bad, b"not a pdf at all").unwrap();

        let store_dir = TempDir::new().unwrap();
        let f = fetcher(&store_dir);

        let artifact = f.fetch_pdf(good.to_str().unwrap(), false).await.unwrap();
        assert_eq!(artifact.content_type.as_deref(), Some("application/pdf"));
        assert!(artifact.path.to_string_lossy().ends_with(".pdf"));

        let err = f.fetch_pdf(bad.to_str().unwrap(), false).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
    }

    // -- Loc extraction -----------------------------------------------------

    #[test]
    fn extract_locs_handles_whitespace() {
        let xml = "<urlset><url><loc> https://a.example/x </loc></url>\
                   <url><loc>https://a.example/y</loc></url></urlset>";
        assert_eq!(
            extract_locs(xml),
            vec!["https://a.example/x", "https://a.example/y"]
        );
    }
}
