//! Element location strategies
//!
//! A locator names one way of finding an element. Callers hand the actuator an
//! ordered list of locators; the first one that yields an interactable element
//! wins. Keeping the order in data means markup drift on the remote site is
//! handled by editing configuration, not the crawl logic.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The strategy used to interpret a locator value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// CSS selector
    Css,
    /// XPath expression
    Xpath,
    /// Exact anchor text
    LinkText,
    /// Substring of anchor text
    PartialLinkText,
    /// Value of the `name` attribute
    Name,
    /// Value of the `id` attribute
    Id,
}

impl Strategy {
    /// Returns the configuration name of the strategy
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Xpath => "xpath",
            Self::LinkText => "link-text",
            Self::PartialLinkText => "partial-link-text",
            Self::Name => "name",
            Self::Id => "id",
        }
    }
}

/// A single element location strategy and its value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub by: Strategy,
    pub value: String,
}

impl Locator {
    pub fn new(by: Strategy, value: impl Into<String>) -> Self {
        Self {
            by,
            value: value.into(),
        }
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(Strategy::Css, value)
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(Strategy::Xpath, value)
    }

    pub fn link_text(value: impl Into<String>) -> Self {
        Self::new(Strategy::LinkText, value)
    }

    pub fn partial_link_text(value: impl Into<String>) -> Self {
        Self::new(Strategy::PartialLinkText, value)
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::new(Strategy::Name, value)
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(Strategy::Id, value)
    }

    /// Returns a copy with every `{key}` placeholder replaced by `replacement`
    pub fn fill(&self, key: &str, replacement: &str) -> Self {
        let placeholder = format!("{{{}}}", key);
        Self {
            by: self.by,
            value: self.value.replace(&placeholder, replacement),
        }
    }

    /// Returns true if the value contains the `{key}` placeholder
    pub fn has_placeholder(&self, key: &str) -> bool {
        self.value.contains(&format!("{{{}}}", key))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.by.as_str(), self.value)
    }
}

/// Fills a placeholder in every locator of a template list
pub fn fill_all(templates: &[Locator], key: &str, replacement: &str) -> Vec<Locator> {
    templates
        .iter()
        .map(|locator| locator.fill(key, replacement))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_replaces_every_placeholder() {
        let template = Locator::css("button.page_{page}, button[aria-label='Page {page}']");
        let filled = template.fill("page", "7");
        assert_eq!(filled.value, "button.page_7, button[aria-label='Page 7']");
        assert_eq!(filled.by, Strategy::Css);
        assert!(template.has_placeholder("page"));
        assert!(!filled.has_placeholder("page"));
    }

    #[test]
    fn test_fill_all_keeps_order() {
        let templates = vec![Locator::css("#a-{page}"), Locator::xpath("//b[{page}]")];
        let filled = fill_all(&templates, "page", "3");
        assert_eq!(filled[0], Locator::css("#a-3"));
        assert_eq!(filled[1], Locator::xpath("//b[3]"));
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            locators: Vec<Locator>,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
locators = [
    { by = "partial-link-text", value = "Database" },
    { by = "name", value = "user_id" },
]
"#,
        )
        .unwrap();

        assert_eq!(parsed.locators[0], Locator::partial_link_text("Database"));
        assert_eq!(parsed.locators[1], Locator::name("user_id"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Locator::id("login").to_string(), "id=login");
    }
}
