//! Site profile: where things are on the remote interface
//!
//! Every UI element the driver touches is described by an ordered list of
//! locators. The defaults describe the IEEE Xplore search interface reached
//! through the Kookmin University library proxy; any list can be overridden in
//! the `[site]` section of the configuration file.

use crate::actuator::{fill_all, Locator};
use serde::Deserialize;

/// Placeholder substituted with the page number in `next-page` locators
pub const PAGE_PLACEHOLDER: &str = "page";

/// Placeholder substituted with the collection name in `filter-option` locators
pub const NAME_PLACEHOLDER: &str = "name";

/// URLs, markers and locators for one remote interface
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SiteProfile {
    // ===== Portal and login =====
    pub login_url: String,
    pub login_link: Vec<Locator>,
    pub username_field: Vec<Locator>,
    pub password_field: Vec<Locator>,
    pub login_submit: Vec<Locator>,
    /// Page text that means the portal rejected the credentials
    pub login_failure_markers: Vec<String>,

    // ===== Proxy hop to the target system =====
    pub portal_link: Vec<Locator>,
    pub portal_search: Vec<Locator>,
    pub portal_search_term: String,
    pub target_link: Vec<Locator>,
    /// Proxied target URL used when the portal route fails
    pub direct_target_url: String,
    /// Page text confirming access is provided through the proxy
    pub proxy_markers: Vec<String>,

    // ===== Search configuration =====
    pub default_base_url: String,
    /// Path segment that marks where the target's base URL ends
    pub base_path_marker: String,
    pub advanced_search_path: String,
    pub range_start_field: Vec<Locator>,
    pub range_end_field: Vec<Locator>,
    pub search_submit: Vec<Locator>,

    // ===== Result refinement =====
    pub filter_input: Vec<Locator>,
    /// Templates containing `{name}`
    pub filter_option: Vec<Locator>,
    pub page_size_control: Vec<Locator>,

    // ===== Per-page actions =====
    pub select_all: Vec<Locator>,
    pub download_button: Vec<Locator>,
    pub format_option: Vec<Locator>,
    pub download_confirm: Vec<Locator>,
    pub dialog_close: Vec<Locator>,
    /// Templates containing `{page}`
    pub next_page: Vec<Locator>,

    /// Phrases that signal the remote seat limit
    pub contention_phrases: Vec<String>,
}

impl SiteProfile {
    /// Locators for the button leading to the given result page
    pub fn next_page_locators(&self, page: u32) -> Vec<Locator> {
        fill_all(&self.next_page, PAGE_PLACEHOLDER, &page.to_string())
    }

    /// Locators for the facet option matching the collection name
    pub fn filter_option_locators(&self, collection: &str) -> Vec<Locator> {
        fill_all(&self.filter_option, NAME_PLACEHOLDER, collection)
    }

    /// Derives the advanced search URL from the URL the target system was reached on
    pub fn advanced_search_url(&self, current_url: &str) -> String {
        let base = match current_url.find(&self.base_path_marker) {
            Some(index) if !self.base_path_marker.is_empty() => &current_url[..index],
            _ => self.default_base_url.as_str(),
        };
        format!(
            "{}{}",
            base.trim_end_matches('/'),
            self.advanced_search_path
        )
    }
}

fn name_or_id(names: &[&str]) -> Vec<Locator> {
    names
        .iter()
        .flat_map(|name| [Locator::name(*name), Locator::id(*name)])
        .collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for SiteProfile {
    fn default() -> Self {
        let mut username_field = name_or_id(&["user_id", "userId", "id", "username", "login_id"]);
        username_field.push(Locator::css("input[type='text']"));

        let mut password_field = name_or_id(&["password", "passwd", "pwd", "user_password"]);
        password_field.push(Locator::css("input[type='password']"));

        Self {
            login_url: "https://lib.kookmin.ac.kr/".to_string(),
            login_link: vec![
                Locator::link_text("로그인"),
                Locator::partial_link_text("로그인"),
                Locator::css("a[href*='login']"),
                Locator::xpath("//a[contains(text(), '로그인')]"),
            ],
            username_field,
            password_field,
            login_submit: vec![Locator::css("button[type='submit'], input[type='submit']")],
            login_failure_markers: Vec::new(),

            portal_link: vec![
                Locator::partial_link_text("학술정보"),
                Locator::partial_link_text("학술DB"),
                Locator::partial_link_text("Database"),
                Locator::xpath("//a[contains(text(), '학술정보')]"),
                Locator::xpath("//a[contains(text(), '학술DB')]"),
            ],
            portal_search: vec![Locator::css("input[type='text'], input[type='search']")],
            portal_search_term: "IEEE".to_string(),
            target_link: vec![Locator::partial_link_text("IEEE")],
            direct_target_url: "https://ieeexplore-ieee-org-ssl.proxy.kookmin.ac.kr/Xplore/home.jsp"
                .to_string(),
            proxy_markers: strings(&["Kookmin University", "Access provided by"]),

            default_base_url: "https://ieeexplore-ieee-org-ssl.proxy.kookmin.ac.kr".to_string(),
            base_path_marker: "/Xplore".to_string(),
            advanced_search_path: "/search/advanced".to_string(),
            range_start_field: vec![Locator::css(
                "input[placeholder*='Start Year'], input[name*='startYear']",
            )],
            range_end_field: vec![Locator::css(
                "input[placeholder*='End Year'], input[name*='endYear']",
            )],
            search_submit: vec![Locator::css("button[type='submit'], button.submit-button")],

            filter_input: vec![
                Locator::xpath("//xpl-facet-publication-title//input[@type='text']"),
                Locator::xpath("//div[contains(@class, 'facet-publication')]//input[@type='text']"),
            ],
            filter_option: vec![
                Locator::xpath(
                    "//xpl-facet-publication-title//label[contains(normalize-space(), '{name}')]",
                ),
                Locator::xpath(
                    "//div[contains(@class, 'facet-publication')]//label[contains(normalize-space(), '{name}')]",
                ),
            ],
            page_size_control: vec![Locator::css("select[aria-label*='results per page']")],

            select_all: vec![Locator::css("input[aria-label*='Select all']")],
            download_button: vec![Locator::xpath("//button[contains(text(), 'Download')]")],
            format_option: vec![Locator::xpath("//label[contains(text(), 'PDF')]")],
            download_confirm: vec![Locator::xpath("//button[contains(text(), 'Download')]")],
            dialog_close: vec![Locator::css("button[aria-label='Close']")],
            next_page: vec![
                Locator::css("button.stats-Pagination_{page}"),
                Locator::css("button[aria-label='Page {page} of search results']"),
            ],

            contention_phrases: strings(&[
                "seat limit",
                "maximum number of users",
                "too many users",
                "access denied",
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advanced_search_url_from_proxy_url() {
        let profile = SiteProfile::default();
        let url = profile.advanced_search_url(
            "https://ieeexplore-ieee-org-ssl.proxy.kookmin.ac.kr/Xplore/home.jsp",
        );
        assert_eq!(
            url,
            "https://ieeexplore-ieee-org-ssl.proxy.kookmin.ac.kr/search/advanced"
        );
    }

    #[test]
    fn test_advanced_search_url_falls_back_to_default_base() {
        let profile = SiteProfile::default();
        let url = profile.advanced_search_url("https://lib.kookmin.ac.kr/portal");
        assert_eq!(
            url,
            "https://ieeexplore-ieee-org-ssl.proxy.kookmin.ac.kr/search/advanced"
        );
    }

    #[test]
    fn test_next_page_locators_fill_page_number() {
        let profile = SiteProfile::default();
        let locators = profile.next_page_locators(4);
        assert_eq!(locators[0], Locator::css("button.stats-Pagination_4"));
        assert_eq!(
            locators[1],
            Locator::css("button[aria-label='Page 4 of search results']")
        );
    }

    #[test]
    fn test_username_fallbacks_try_name_then_id() {
        let profile = SiteProfile::default();
        assert_eq!(profile.username_field[0], Locator::name("user_id"));
        assert_eq!(profile.username_field[1], Locator::id("user_id"));
        assert_eq!(
            profile.username_field.last(),
            Some(&Locator::css("input[type='text']"))
        );
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let profile: SiteProfile = toml::from_str(
            r#"
login-url = "https://portal.example.org/"
contention-phrases = ["server busy"]
"#,
        )
        .unwrap();

        assert_eq!(profile.login_url, "https://portal.example.org/");
        assert_eq!(profile.contention_phrases, vec!["server busy".to_string()]);
        assert_eq!(profile.portal_search_term, "IEEE");
        assert!(!profile.next_page.is_empty());
    }
}
