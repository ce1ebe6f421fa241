use serde::{Deserialize, Serialize};

/// What was found at a locator on one page. Never persisted.
///
/// A locator that matched nothing yields an empty extraction rather than an
/// error, so "selector found nothing" stays distinct from a failed fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    /// Normalized plain text of the located fragment
    pub text: String,
    /// Cleaned markup of the fragment, links resolved to absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markup: Option<String>,
    /// The element's own link, or its first descendant link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_link: Option<String>,
    /// Helps tell a wrong selector from a blocked or redirected page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
}

impl Extraction {
    /// Extraction for a page where the locator matched nothing.
    pub fn unmatched(page_title: Option<String>) -> Self {
        Self {
            page_title,
            ..Self::default()
        }
    }

    /// True when the fragment has no visible text. Markup alone does not
    /// count: script-rendered pages often ship empty placeholder elements.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
