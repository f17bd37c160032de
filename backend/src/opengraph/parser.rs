//! HTML parsing utilities for Open Graph and Twitter card tags.

use std::collections::BTreeMap;

use scraper::{Html, Selector};
use tracing::debug;

use super::types::Metadata;

/// What a page says about itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMeta {
    /// `og:*` tags keyed by `property`, `twitter:*` tags keyed by `name`
    pub tags: BTreeMap<String, String>,
    /// Text of the `<title>` element
    pub title: Option<String>,
    /// Content of `<meta name="description">`
    pub description: Option<String>,
}

impl PageMeta {
    /// Title, description and image for `url`, preferring Open Graph tags.
    pub fn to_metadata(&self, url: &str) -> Metadata {
        let tag = |key: &str| self.tags.get(key).filter(|v| !v.is_empty()).cloned();

        Metadata {
            title: tag("og:title")
                .or_else(|| self.title.clone())
                .unwrap_or_default(),
            description: tag("og:description")
                .or_else(|| self.description.clone())
                .unwrap_or_default(),
            image: tag("og:image").unwrap_or_default(),
            url: url.to_string(),
        }
    }
}

/// Parse the meta tags, title and description out of `html`.
///
/// Later duplicates of a tag win.
pub fn parse_page(html: &str) -> PageMeta {
    let document = Html::parse_document(html);
    let meta_selector = Selector::parse("meta").expect("Invalid selector");
    let title_selector = Selector::parse("title").expect("Invalid selector");

    let mut page = PageMeta::default();

    for meta in document.select(&meta_selector) {
        let element = meta.value();
        let content = element.attr("content").unwrap_or("");

        if let Some(property) = element.attr("property") {
            if property.starts_with("og:") {
                page.tags.insert(property.to_string(), content.to_string());
            }
        }

        if let Some(name) = element.attr("name") {
            if name.starts_with("twitter:") {
                page.tags.insert(name.to_string(), content.to_string());
            } else if name.eq_ignore_ascii_case("description") && page.description.is_none() {
                page.description = Some(content.to_string());
            }
        }
    }

    page.title = document
        .select(&title_selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    debug!(
        tag_count = page.tags.len(),
        has_title = page.title.is_some(),
        has_description = page.description.is_some(),
        "opengraph_page_parsed"
    );

    page
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
        <head>
            <title> Example Domain </title>
            <meta name="description" content="Plain description">
            <meta property="og:title" content="OG Title">
            <meta property="og:image" content="https://example.com/a.png">
            <meta name="twitter:card" content="summary">
            <meta property="article:author" content="ignored">
            <meta name="viewport" content="width=device-width">
        </head>
        <body></body>
        </html>
    "#;

    #[test]
    fn test_parse_page_collects_og_and_twitter_tags() {
        let page = parse_page(PAGE);

        assert_eq!(page.tags.len(), 3);
        assert_eq!(page.tags["og:title"], "OG Title");
        assert_eq!(page.tags["og:image"], "https://example.com/a.png");
        assert_eq!(page.tags["twitter:card"], "summary");
        assert!(!page.tags.contains_key("article:author"));
        assert_eq!(page.title.as_deref(), Some("Example Domain"));
        assert_eq!(page.description.as_deref(), Some("Plain description"));
    }

    #[test]
    fn test_metadata_prefers_og_tags() {
        let metadata = parse_page(PAGE).to_metadata("https://example.com");

        assert_eq!(metadata.title, "OG Title");
        assert_eq!(metadata.description, "Plain description");
        assert_eq!(metadata.image, "https://example.com/a.png");
        assert_eq!(metadata.url, "https://example.com");
    }

    #[test]
    fn test_metadata_falls_back_to_title() {
        let html = "<html><head><title>Only Title</title></head></html>";
        let metadata = parse_page(html).to_metadata("https://example.com");

        assert_eq!(metadata.title, "Only Title");
        assert_eq!(metadata.description, "");
        assert_eq!(metadata.image, "");
    }

    #[test]
    fn test_duplicate_tags_last_wins() {
        let html = r#"<meta property="og:title" content="first"><meta property="og:title" content="second">"#;
        assert_eq!(parse_page(html).tags["og:title"], "second");
    }
}
