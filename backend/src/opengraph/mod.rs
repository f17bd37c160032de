//! Open Graph metadata and preview pages.
//!
//! Fetches a page, reads its `og:*` and `twitter:*` tags, and either returns
//! a summary or renders a small page carrying (possibly overridden) tags that
//! redirects to the original URL.

pub mod parser;
pub mod types;

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{error, info, info_span, Instrument, Span};
use url::Url;

pub use parser::{parse_page, PageMeta};
pub use types::{Metadata, PreviewOverrides};

/// User agent sent when fetching pages.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; og-backend/0.1; +https://ogp.me)";

/// Delay before the preview page redirects to the original URL.
const REDIRECT_DELAY_MS: u64 = 200;

/// Preview page. Tag values are autoescaped; `target` is already a script-safe literal.
const PREVIEW_TEMPLATE: &str = concat!(
    "<html><head>",
    "{% for tag in tags %}<meta name=\"{{ tag.name }}\" content=\"{{ tag.content }}\">{% endfor %}",
    "</head><body><p></p>",
    "<script>setTimeout(function() { window.location.href = {{ target | safe }}; }, {{ delay }});</script>",
    "</body></html>",
);

#[derive(Debug, Error)]
pub enum OpenGraphError {
    #[error("invalid url {0:?}: only absolute http(s) URLs are supported")]
    InvalidUrl(String),

    #[error("failed to fetch page: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("page responded with status {0}")]
    UpstreamStatus(u16),

    #[error("failed to render preview: {0}")]
    Render(#[from] tera::Error),
}

#[derive(Serialize)]
struct MetaTag<'a> {
    name: &'a str,
    content: &'a str,
}

/// HTTP client for reading pages' Open Graph tags.
#[derive(Clone)]
pub struct OpenGraphClient {
    client: Client,
    timeout: Duration,
    span: Span,
}

impl OpenGraphClient {
    pub fn new(timeout: Duration, parent: &Span) -> Result<Self, OpenGraphError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            client,
            timeout,
            span: info_span!(parent: parent, "opengraph"),
        })
    }

    /// Fetch the HTML at `url`.
    pub async fn fetch_page(&self, url: &Url) -> Result<String, OpenGraphError> {
        let fetch = async {
            info!(url = %url, "opengraph_fetch_starting");

            let response = self
                .client
                .get(url.clone())
                .timeout(self.timeout)
                .header("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
                .send()
                .await
                .map_err(|e| {
                    error!(url = %url, error = %e, timed_out = e.is_timeout(), "opengraph_fetch_error");
                    e
                })?;

            let status = response.status();
            if !status.is_success() {
                error!(url = %url, status_code = status.as_u16(), "opengraph_fetch_bad_status");
                return Err(OpenGraphError::UpstreamStatus(status.as_u16()));
            }

            let body = response.text().await?;
            info!(url = %url, body_length = body.len(), "opengraph_fetch_complete");
            Ok::<_, OpenGraphError>(body)
        };

        fetch.instrument(self.span.clone()).await
    }

    /// Title, description and image of the page at `raw_url`.
    pub async fn metadata(&self, raw_url: &str) -> Result<Metadata, OpenGraphError> {
        let url = parse_target(raw_url)?;
        let html = self.fetch_page(&url).await?;
        Ok(parse_page(&html).to_metadata(raw_url))
    }

    /// Preview page for `raw_url` with `overrides` applied.
    pub async fn preview(&self, raw_url: &str, overrides: &PreviewOverrides) -> Result<String, OpenGraphError> {
        let url = parse_target(raw_url)?;
        let html = self.fetch_page(&url).await?;
        let mut page = parse_page(&html);
        apply_overrides(&mut page, overrides);
        render_preview(&page, url.as_str())
    }
}

/// Accept only absolute `http` and `https` URLs.
pub fn parse_target(raw: &str) -> Result<Url, OpenGraphError> {
    match Url::parse(raw.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(url),
        _ => Err(OpenGraphError::InvalidUrl(raw.to_string())),
    }
}

/// Replace title, description and image in both the `og:` and `twitter:` namespaces.
pub fn apply_overrides(page: &mut PageMeta, overrides: &PreviewOverrides) {
    let pairs = [
        ("title", &overrides.title),
        ("description", &overrides.description),
        ("image", &overrides.image),
    ];

    for (field, value) in pairs {
        if let Some(value) = value {
            page.tags.insert(format!("og:{field}"), value.clone());
            page.tags.insert(format!("twitter:{field}"), value.clone());
        }
    }
}

/// Page carrying `page`'s tags that sends the browser on to `target`.
pub fn render_preview(page: &PageMeta, target: &str) -> Result<String, OpenGraphError> {
    let tags: Vec<MetaTag<'_>> = page
        .tags
        .iter()
        .map(|(name, content)| MetaTag { name, content })
        .collect();

    let mut context = Context::new();
    context.insert("tags", &tags);
    context.insert("target", &js_string(target));
    context.insert("delay", &REDIRECT_DELAY_MS);

    Ok(Tera::one_off(PREVIEW_TEMPLATE, &context, true)?)
}

/// JSON string literal that is also safe inside a `<script>` element.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace('<', "\\u003c")
}
