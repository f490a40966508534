use crate::actuator::Locator;
use crate::config::site::{SiteProfile, NAME_PLACEHOLDER, PAGE_PLACEHOLDER};
use crate::config::types::{BrowserConfig, Config, CrawlSettings, TimingConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_settings(&config.crawl)?;
    validate_timing_config(&config.timing)?;
    validate_browser_config(&config.browser)?;
    validate_site_profile(&config.site)?;
    Ok(())
}

/// Validates crawl settings
fn validate_crawl_settings(config: &CrawlSettings) -> Result<(), ConfigError> {
    if config.collection.trim().is_empty() {
        return Err(ConfigError::Validation(
            "collection cannot be empty".to_string(),
        ));
    }

    if config.destination_root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "destination_root cannot be empty".to_string(),
        ));
    }

    for unit in &config.units {
        validate_unit_id(unit)?;
    }

    if config.start_page < 1 {
        return Err(ConfigError::Validation(format!(
            "start_page must be >= 1, got {}",
            config.start_page
        )));
    }

    if config.max_page_visits < 1 {
        return Err(ConfigError::Validation(format!(
            "max_page_visits must be >= 1, got {}",
            config.max_page_visits
        )));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "page_size must be >= 1, got {}",
            config.page_size
        )));
    }

    if config.accepted_extensions.is_empty() {
        return Err(ConfigError::Validation(
            "accepted_extensions must list at least one extension".to_string(),
        ));
    }

    for ext in &config.accepted_extensions {
        if ext.is_empty() || ext.starts_with('.') {
            return Err(ConfigError::Validation(format!(
                "accepted extension '{}' must be non-empty and given without a leading dot",
                ext
            )));
        }
    }

    Ok(())
}

/// Validates timing configuration
fn validate_timing_config(config: &TimingConfig) -> Result<(), ConfigError> {
    if config.contention_max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "contention_max_attempts must be >= 1, got {}",
            config.contention_max_attempts
        )));
    }

    if config.max_page_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_page_retries must be >= 1, got {}",
            config.max_page_retries
        )));
    }

    if config.download_poll_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "download_poll_secs must be >= 1, got {}",
            config.download_poll_secs
        )));
    }

    if config.download_poll_secs > config.download_timeout_secs {
        return Err(ConfigError::Validation(format!(
            "download_poll_secs ({}) cannot exceed download_timeout_secs ({})",
            config.download_poll_secs, config.download_timeout_secs
        )));
    }

    if config.settle_min_secs > config.settle_max_secs {
        return Err(ConfigError::Validation(format!(
            "settle_min_secs ({}) cannot exceed settle_max_secs ({})",
            config.settle_min_secs, config.settle_max_secs
        )));
    }

    Ok(())
}

/// Validates browser configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.webdriver_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid webdriver_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "webdriver_url '{}' must use http or https",
            config.webdriver_url
        )));
    }

    if config.browser_name.is_empty() {
        return Err(ConfigError::Validation(
            "browser_name cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the site profile's URLs and locator lists
fn validate_site_profile(site: &SiteProfile) -> Result<(), ConfigError> {
    for (field, value) in [
        ("login_url", &site.login_url),
        ("direct_target_url", &site.direct_target_url),
        ("default_base_url", &site.default_base_url),
    ] {
        Url::parse(value)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;
    }

    if !site.advanced_search_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "advanced_search_path '{}' must start with '/'",
            site.advanced_search_path
        )));
    }

    let required: [(&str, &[Locator]); 17] = [
        ("login_link", &site.login_link),
        ("username_field", &site.username_field),
        ("password_field", &site.password_field),
        ("login_submit", &site.login_submit),
        ("portal_link", &site.portal_link),
        ("portal_search", &site.portal_search),
        ("target_link", &site.target_link),
        ("range_start_field", &site.range_start_field),
        ("range_end_field", &site.range_end_field),
        ("search_submit", &site.search_submit),
        ("filter_input", &site.filter_input),
        ("filter_option", &site.filter_option),
        ("page_size_control", &site.page_size_control),
        ("select_all", &site.select_all),
        ("download_button", &site.download_button),
        ("format_option", &site.format_option),
        ("download_confirm", &site.download_confirm),
    ];

    for (field, locators) in required {
        validate_locators(field, locators)?;
    }

    // dialog_close may be empty: closing the dialog is best-effort
    for locator in &site.dialog_close {
        validate_locator("dialog_close", locator)?;
    }

    validate_locators("next_page", &site.next_page)?;
    validate_templates("next_page", &site.next_page, PAGE_PLACEHOLDER)?;
    validate_templates("filter_option", &site.filter_option, NAME_PLACEHOLDER)?;

    if site.contention_phrases.iter().any(|p| p.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "contention_phrases cannot contain empty phrases".to_string(),
        ));
    }

    Ok(())
}

fn validate_locators(field: &str, locators: &[Locator]) -> Result<(), ConfigError> {
    if locators.is_empty() {
        return Err(ConfigError::InvalidLocator(format!(
            "{} must list at least one locator",
            field
        )));
    }

    for locator in locators {
        validate_locator(field, locator)?;
    }

    Ok(())
}

fn validate_locator(field: &str, locator: &Locator) -> Result<(), ConfigError> {
    if locator.value.trim().is_empty() {
        return Err(ConfigError::InvalidLocator(format!(
            "{} contains a {} locator with an empty value",
            field,
            locator.by.as_str()
        )));
    }
    Ok(())
}

fn validate_templates(field: &str, locators: &[Locator], key: &str) -> Result<(), ConfigError> {
    if let Some(locator) = locators.iter().find(|l| !l.has_placeholder(key)) {
        return Err(ConfigError::InvalidLocator(format!(
            "{} locator '{}' is missing the {{{}}} placeholder",
            field, locator, key
        )));
    }
    Ok(())
}

/// Validates a crawl unit identifier
///
/// Unit ids become directory names under the destination root, so they must
/// be a single plain path component.
pub fn validate_unit_id(id: &str) -> Result<(), ConfigError> {
    if id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "unit id cannot be empty".to_string(),
        ));
    }

    if id.contains('/') || id.contains('\\') || id == "." || id == ".." {
        return Err(ConfigError::Validation(format!(
            "unit id '{}' must be a single directory name",
            id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    const BASE: &str = r#"
[crawl]
collection = "Nature"
destination-root = "./downloads"
"#;

    #[test]
    fn test_validate_unit_id() {
        assert!(validate_unit_id("2024").is_ok());
        assert!(validate_unit_id("spring-2024").is_ok());

        assert!(validate_unit_id("").is_err());
        assert!(validate_unit_id("  ").is_err());
        assert!(validate_unit_id("..").is_err());
        assert!(validate_unit_id("2024/extra").is_err());
        assert!(validate_unit_id("a\\b").is_err());
    }

    #[test]
    fn test_default_site_profile_is_valid() {
        assert!(load_config_from_str(BASE).is_ok());
    }

    #[test]
    fn test_empty_collection_rejected() {
        let config = r#"
[crawl]
collection = "  "
destination-root = "./downloads"
"#;
        assert!(matches!(
            load_config_from_str(config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_settle_bounds_checked() {
        let config = format!("{}\n[timing]\nsettle-min-secs = 20\nsettle-max-secs = 10\n", BASE);
        assert!(matches!(
            load_config_from_str(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_poll_longer_than_timeout_rejected() {
        let config = format!(
            "{}\n[timing]\ndownload-poll-secs = 10\ndownload-timeout-secs = 5\n",
            BASE
        );
        assert!(load_config_from_str(&config).is_err());
    }

    #[test]
    fn test_invalid_webdriver_url() {
        let config = format!("{}\n[browser]\nwebdriver-url = \"not a url\"\n", BASE);
        assert!(matches!(
            load_config_from_str(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_next_page_template_needs_placeholder() {
        let config = format!(
            "{}\n[site]\nnext-page = [{{ by = \"css\", value = \"button.next\" }}]\n",
            BASE
        );
        assert!(matches!(
            load_config_from_str(&config),
            Err(ConfigError::InvalidLocator(_))
        ));
    }

    #[test]
    fn test_empty_locator_list_rejected() {
        let config = format!("{}\n[site]\nselect-all = []\n", BASE);
        assert!(matches!(
            load_config_from_str(&config),
            Err(ConfigError::InvalidLocator(_))
        ));
    }

    #[test]
    fn test_dialog_close_may_be_empty() {
        let config = format!("{}\n[site]\ndialog-close = []\n", BASE);
        assert!(load_config_from_str(&config).is_ok());
    }
}
