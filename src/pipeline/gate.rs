//! Link accessibility gate: decide whether a URL is worth extracting from,
//! and classify exactly why when it is not.
//!
//! The sequence is strict and cheap-first:
//!
//! 1. syntax/scheme validation (no network),
//! 2. private/internal host rejection (no network, never retried),
//! 3. video links short-circuit to accessible — the transcript strategy has
//!    its own failure taxonomy,
//! 4. robots.txt evaluation for the origin (fail-open on fetch problems:
//!    robots is a courtesy protocol, not a security boundary),
//! 5. the page fetch, classified into the error taxonomy; 5xx, timeouts and
//!    connection failures are retried with exponential backoff, everything
//!    else is terminal on the first attempt.
//!
//! One verdict per attempt; a retry replaces the previous attempt's verdict
//! rather than accumulating.

use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError};
use crate::pipeline::extract::link::LinkStrategy;
use crate::pipeline::fetch::{FetchedPage, PageFetcher};
use crate::pipeline::robots::RobotsRules;
use crate::retry::{backoff_sleep, with_cancel};

/// Address ranges the gate refuses to fetch from, ever.
///
/// Loopback, RFC1918, link-local, the zero network, and their IPv6
/// counterparts. Requests for these are rejected before any socket opens.
static BLOCKED_NETS: Lazy<Vec<IpNet>> = Lazy::new(|| {
    [
        "127.0.0.0/8",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "169.254.0.0/16",
        "0.0.0.0/8",
        "::1/128",
        "fc00::/7",
        "fe80::/10",
    ]
    .iter()
    .map(|net| net.parse().expect("static CIDR literal"))
    .collect()
});

/// Substrings that mark a paywalled page body.
const PAYWALL_MARKERS: &[&str] = &[
    "paywall",
    "subscriber-only",
    "premium-content",
    "metered-content",
    "subscription-required",
    "article:content_tier=\"metered\"",
    "subscribe to continue",
    "subscribe to read",
    "members-only",
    "subscriber exclusive",
];

/// Substrings that mark a login-required page body.
const AUTH_WALL_MARKERS: &[&str] = &[
    "login required",
    "sign in to continue",
    "please log in",
    "authentication required",
    "you must be logged in",
    "please sign in",
];

/// Path fragments in a redirect target that indicate a login bounce.
const LOGIN_PATHS: &[&str] = &["/login", "/signin", "/sign-in"];

/// The gate's answer for one URL.
///
/// `reason` is `None` exactly when `accessible` is true. A verdict is a
/// classification summary; the richer error context lives in the
/// [`PipelineError`] the pipeline propagates.
#[derive(Debug, Clone)]
pub struct AccessibilityVerdict {
    pub accessible: bool,
    pub reason: Option<ErrorKind>,
    pub http_status: Option<u16>,
    pub content_type: Option<String>,
    pub final_url: String,
}

/// An accessible page plus the HTML that proved it, so the article extractor
/// never fetches twice.
pub(crate) struct GatePassage {
    pub verdict: AccessibilityVerdict,
    pub html: String,
}

/// Normalise a user-supplied URL and reject invalid or internal targets.
///
/// `https://` is assumed when no scheme is given. Runs no network I/O.
pub(crate) fn validate_url(raw: &str) -> Result<Url, PipelineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidUrl {
            url: raw.to_string(),
            reason: "empty URL".into(),
        });
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|e| PipelineError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(PipelineError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("scheme '{}' is not allowed", url.scheme()),
        });
    }

    let host = match url.host() {
        Some(h) => h,
        None => {
            return Err(PipelineError::InvalidUrl {
                url: raw.to_string(),
                reason: "missing domain".into(),
            })
        }
    };

    let blocked = match host {
        url::Host::Domain(domain) => {
            let d = domain.to_lowercase();
            d == "localhost" || d.ends_with(".localhost")
        }
        url::Host::Ipv4(addr) => is_blocked_ip(IpAddr::V4(addr)),
        url::Host::Ipv6(addr) => is_blocked_ip(IpAddr::V6(addr)),
    };
    if blocked {
        return Err(PipelineError::BlockedHost {
            host: url.host_str().unwrap_or_default().to_string(),
        });
    }

    Ok(url)
}

fn is_blocked_ip(addr: IpAddr) -> bool {
    BLOCKED_NETS.iter().any(|net| net.contains(&addr))
}

/// Detect common paywall patterns in a 200 response.
fn detect_paywall(body: &str, url: &str) -> bool {
    let lower = body.to_lowercase();
    if PAYWALL_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }

    // Site-specific signatures where the generic markers miss.
    if url.contains("nytimes.com") && lower.contains("meteredcount") {
        return true;
    }
    if url.contains("wsj.com") && lower.contains("wsj-snippet-login") {
        return true;
    }
    // Medium truncates paywalled articles to a short teaser body.
    if url.contains("medium.com") && body.len() < 5000 && lower.contains("member-only") {
        return true;
    }

    false
}

/// Detect login requirements: login redirects or auth markers in the body.
fn detect_auth_wall(body: &str, final_url: &str) -> bool {
    if LOGIN_PATHS.iter().any(|p| final_url.contains(p)) {
        return true;
    }
    let lower = body.to_lowercase();
    AUTH_WALL_MARKERS.iter().any(|m| lower.contains(m))
}

/// The accessibility gate. Safe to share across concurrent invocations; the
/// only mutable state is each call's own retry counter on its stack.
pub struct AccessibilityGate {
    fetcher: Arc<dyn PageFetcher>,
    robots_user_agent: String,
    max_retries: u32,
    backoff_ms: u64,
}

impl AccessibilityGate {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &PipelineConfig) -> Self {
        Self {
            fetcher,
            robots_user_agent: config.robots_user_agent.clone(),
            max_retries: config.max_retries.max(1),
            backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Probe a URL and report a verdict without extracting anything.
    ///
    /// Returns `Err` only on cancellation; every reachability outcome is
    /// expressed as a verdict.
    pub async fn check(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<AccessibilityVerdict, PipelineError> {
        match self.check_page(url, cancel).await {
            Ok(passage) => Ok(passage.verdict),
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => Ok(verdict_from_error(&e, url)),
        }
    }

    /// Full gate pass returning the fetched HTML for downstream extraction.
    ///
    /// Inaccessible URLs come back as the specific [`PipelineError`] the
    /// pipeline should surface.
    pub(crate) async fn check_page(
        &self,
        raw_url: &str,
        cancel: &CancellationToken,
    ) -> Result<GatePassage, PipelineError> {
        let url = validate_url(raw_url)?;

        // Video content is fetched by the transcript strategy, which carries
        // its own failure classification; the HTTP gate would only add noise.
        if LinkStrategy::detect(&url) == LinkStrategy::Video {
            debug!(url = %url, "video link, skipping HTTP gate");
            return Ok(GatePassage {
                verdict: AccessibilityVerdict {
                    accessible: true,
                    reason: None,
                    http_status: None,
                    content_type: None,
                    final_url: url.to_string(),
                },
                html: String::new(),
            });
        }

        self.check_robots(&url, cancel).await?;

        let page = self.fetch_with_retry(&url, cancel).await?;
        self.classify(&url, page)
    }

    /// Evaluate robots.txt for the origin. Fail-open: a missing or broken
    /// robots.txt allows the fetch.
    async fn check_robots(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let origin = format!(
            "{}://{}",
            url.scheme(),
            url.host_str().unwrap_or_default()
        );
        let robots_url = match url.port() {
            Some(port) => format!("{origin}:{port}/robots.txt"),
            None => format!("{origin}/robots.txt"),
        };

        match with_cancel(cancel, self.fetcher.fetch(&robots_url)).await? {
            Ok(page) if page.status == 200 => {
                let rules = RobotsRules::parse(&page.body);
                let mut path = url.path().to_string();
                if let Some(query) = url.query() {
                    path.push('?');
                    path.push_str(query);
                }
                if !rules.is_allowed(&self.robots_user_agent, &path) {
                    return Err(PipelineError::RobotsDisallowed {
                        url: url.to_string(),
                    });
                }
                Ok(())
            }
            Ok(page) => {
                debug!(url = %robots_url, status = page.status, "no usable robots.txt, allowing");
                Ok(())
            }
            Err(e) => {
                debug!(url = %robots_url, error = %e, "robots.txt fetch failed, allowing");
                Ok(())
            }
        }
    }

    /// Fetch the page, retrying 5xx/timeout/connection failures with
    /// exponential backoff. Terminal statuses return on the first attempt.
    async fn fetch_with_retry(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, PipelineError> {
        let mut last_detail = String::new();

        for attempt in 1..=self.max_retries {
            if attempt > 1 {
                warn!(url = %url, attempt, max = self.max_retries, "retrying fetch");
                backoff_sleep(self.backoff_ms, attempt - 1, cancel).await?;
            }

            match with_cancel(cancel, self.fetcher.fetch(url.as_str())).await? {
                Ok(page) if page.status >= 500 => {
                    last_detail = format!("server error (HTTP {})", page.status);
                    warn!(url = %url, status = page.status, attempt, "transient server error");
                }
                Ok(page) => return Ok(page),
                Err(e) => {
                    last_detail = e.to_string();
                    warn!(url = %url, error = %e, attempt, "fetch failed");
                }
            }
        }

        Err(PipelineError::TransientNetworkError {
            url: url.to_string(),
            attempts: self.max_retries,
            detail: last_detail,
        })
    }

    /// Classify a terminal HTTP response into accessible HTML or an error.
    fn classify(&self, url: &Url, page: FetchedPage) -> Result<GatePassage, PipelineError> {
        let url_str = url.to_string();

        match page.status {
            200 => {}
            404 => return Err(PipelineError::NotFound { url: url_str }),
            401 => return Err(PipelineError::AuthWall { url: url_str }),
            403 => return Err(PipelineError::Forbidden { url: url_str }),
            451 => return Err(PipelineError::GeoBlocked { url: url_str }),
            status => return Err(PipelineError::HttpError { url: url_str, status }),
        }

        if let Some(content_type) = page.content_type.as_deref() {
            if content_type.contains("application/pdf") {
                return Err(PipelineError::WrongContentType {
                    url: url_str,
                    content_type: content_type.to_string(),
                    hint: "this is a PDF file; upload it through the document pipeline instead"
                        .into(),
                });
            }
            if content_type.starts_with("image/") {
                return Err(PipelineError::WrongContentType {
                    url: url_str,
                    content_type: content_type.to_string(),
                    hint: "this is an image file; upload it through the image pipeline instead"
                        .into(),
                });
            }
        }

        if detect_paywall(&page.body, &url_str) {
            return Err(PipelineError::Paywalled { url: url_str });
        }
        if detect_auth_wall(&page.body, &page.final_url) {
            return Err(PipelineError::AuthWall { url: url_str });
        }

        debug!(url = %url_str, bytes = page.body.len(), "link accessible");
        Ok(GatePassage {
            verdict: AccessibilityVerdict {
                accessible: true,
                reason: None,
                http_status: Some(page.status),
                content_type: page.content_type.clone(),
                final_url: page.final_url.clone(),
            },
            html: page.body,
        })
    }
}

/// Summarise a gate error as a verdict for the probe API.
fn verdict_from_error(error: &PipelineError, url: &str) -> AccessibilityVerdict {
    let http_status = match error {
        PipelineError::NotFound { .. } => Some(404),
        PipelineError::Forbidden { .. } => Some(403),
        PipelineError::GeoBlocked { .. } => Some(451),
        PipelineError::HttpError { status, .. } => Some(*status),
        _ => None,
    };
    AccessibilityVerdict {
        accessible: false,
        reason: Some(error.kind()),
        http_status,
        content_type: None,
        final_url: url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_adds_https_scheme() {
        let url = validate_url("example.com/article").unwrap();
        assert_eq!(url.as_str(), "https://example.com/article");
    }

    #[test]
    fn validate_rejects_bad_schemes() {
        let err = validate_url("ftp://example.com/file").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidUrl);
    }

    #[test]
    fn validate_rejects_empty() {
        assert_eq!(
            validate_url("   ").unwrap_err().kind(),
            ErrorKind::InvalidUrl
        );
    }

    #[test]
    fn blocks_localhost_and_private_ranges() {
        for url in [
            "http://localhost/admin",
            "http://dev.localhost:3000/",
            "http://127.0.0.1/secrets",
            "https://10.1.2.3/internal",
            "https://172.16.0.1/",
            "https://192.168.1.1/router",
            "http://169.254.169.254/latest/meta-data",
            "http://0.0.0.0/",
            "http://[::1]/",
        ] {
            let err = validate_url(url).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BlockedHost, "should block {url}");
        }
    }

    #[test]
    fn allows_public_hosts() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("https://8.8.8.8/dns").is_ok());
        // 172.32.x is outside 172.16.0.0/12.
        assert!(validate_url("https://172.32.0.1/").is_ok());
    }

    #[test]
    fn paywall_markers_detected() {
        assert!(detect_paywall(
            "<html><body>Subscribe to continue reading</body></html>",
            "https://example.com/a"
        ));
        assert!(detect_paywall(
            "<meta property='article:content_tier=\"metered\"'>",
            "https://example.com/a"
        ));
        assert!(!detect_paywall(
            "<html><body>Free article text</body></html>",
            "https://example.com/a"
        ));
    }

    #[test]
    fn site_specific_paywall_signatures() {
        assert!(detect_paywall(
            "<script>var meteredCount = 3;</script>",
            "https://www.nytimes.com/2024/article"
        ));
        // The same marker on another site is not a paywall signal.
        assert!(!detect_paywall(
            "<script>var meteredCount = 3;</script>",
            "https://example.com/article"
        ));
    }

    #[test]
    fn auth_wall_from_redirect_or_markers() {
        assert!(detect_auth_wall("<html></html>", "https://example.com/login?next=/a"));
        assert!(detect_auth_wall(
            "<p>Please sign in to view this page</p>",
            "https://example.com/a"
        ));
        assert!(!detect_auth_wall(
            "<p>plain article</p>",
            "https://example.com/a"
        ));
    }

    #[test]
    fn error_verdict_summarises_status() {
        let v = verdict_from_error(
            &PipelineError::NotFound {
                url: "https://example.com/x".into(),
            },
            "https://example.com/x",
        );
        assert!(!v.accessible);
        assert_eq!(v.reason, Some(ErrorKind::NotFound));
        assert_eq!(v.http_status, Some(404));
    }
}
