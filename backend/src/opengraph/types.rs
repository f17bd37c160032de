//! Type definitions for Open Graph previews.

use serde::{Deserialize, Serialize};

/// Summary of a page, as returned by the metadata endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub description: String,
    pub image: String,
    pub url: String,
}

/// Values that replace the page's own tags in a generated preview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PreviewOverrides {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}
