use crate::config::types::{Config, FieldSelector, HttpConfig, JobSection, OutputConfig, SelectorConfig};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_job(&config.job)?;
    validate_http(&config.http)?;
    validate_output(&config.output)?;
    validate_selectors(&config.selectors)?;
    Ok(())
}

/// Validates job parameters
fn validate_job(job: &JobSection) -> Result<(), ConfigError> {
    let url = Url::parse(&job.target)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid target '{}': {}", job.target, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "target '{}' must use http or https",
            job.target
        )));
    }

    if job.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            job.max_pages
        )));
    }

    Ok(())
}

/// Validates HTTP session configuration
fn validate_http(http: &HttpConfig) -> Result<(), ConfigError> {
    if http.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if http.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be >= 1, got {}",
            http.timeout_secs
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output(output: &OutputConfig) -> Result<(), ConfigError> {
    if output.records_path.is_empty() {
        return Err(ConfigError::Validation(
            "records-path cannot be empty".to_string(),
        ));
    }

    if output.state_dir.is_empty() && output.checkpoint_path.is_none() {
        return Err(ConfigError::Validation(
            "either state-dir or checkpoint-path must be set".to_string(),
        ));
    }

    if matches!(output.checkpoint_path.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "checkpoint-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates that every selector parses
fn validate_selectors(selectors: &SelectorConfig) -> Result<(), ConfigError> {
    validate_selector(&selectors.row)?;
    validate_selector(&selectors.detail_link)?;

    if let Some(next) = &selectors.next_page {
        validate_selector(next)?;
    }

    if let Some(template) = &selectors.page_url_template {
        if !template.contains("{page}") {
            return Err(ConfigError::Validation(format!(
                "page-url-template '{}' must contain a {{page}} placeholder",
                template
            )));
        }
    }

    if matches!(selectors.key_attr.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "key-attr cannot be empty".to_string(),
        ));
    }

    validate_fields(&selectors.list_fields)?;
    validate_fields(&selectors.detail_fields)?;

    if let Some(pairs) = &selectors.detail_pairs {
        validate_selector(&pairs.item)?;
        validate_selector(&pairs.label)?;
        validate_selector(&pairs.value)?;
    }

    Ok(())
}

fn validate_fields(fields: &[FieldSelector]) -> Result<(), ConfigError> {
    for field in fields {
        if field.name.is_empty() {
            return Err(ConfigError::Validation(format!(
                "field for selector '{}' has an empty name",
                field.selector
            )));
        }
        validate_selector(&field.selector)?;
    }
    Ok(())
}

/// Checks that a CSS selector parses
fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            message: e.to_string(),
        })
}
