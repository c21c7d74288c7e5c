use crate::state::{ExecutionMode, JobConfig};
use serde::Deserialize;

/// Main configuration structure for Paged-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub job: JobSection,
    #[serde(default)]
    pub http: HttpConfig,
    pub output: OutputConfig,
    pub selectors: SelectorConfig,
}

/// Job parameters
#[derive(Debug, Clone, Deserialize)]
pub struct JobSection {
    /// Listing address the job starts from
    pub target: String,

    /// Highest page index to visit
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Delay between requests (milliseconds)
    #[serde(rename = "delay-ms", default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Operator interaction mode
    #[serde(default)]
    pub mode: ExecutionMode,
}

impl JobSection {
    /// Builds the job parameters stored in a new checkpoint
    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            page_limit: self.max_pages,
            delay_ms: self.delay_ms,
            mode: self.mode,
        }
    }
}

/// HTTP session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Which record sink receives the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Jsonl,
    Sqlite,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory holding per-target checkpoints
    #[serde(rename = "state-dir", default = "default_state_dir")]
    pub state_dir: String,

    /// Explicit checkpoint file, overriding the per-target default
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: Option<String>,

    /// Path of the records file (JSON lines or SQLite database)
    #[serde(rename = "records-path")]
    pub records_path: String,

    #[serde(default)]
    pub sink: SinkKind,
}

/// A named value taken from an element
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSelector {
    pub name: String,
    pub selector: String,
    /// Attribute to read; the element text is used when absent
    pub attr: Option<String>,
}

/// Label/value list on a detail page (e.g. `<li><strong>Rooms:</strong><span>3</span></li>`)
#[derive(Debug, Clone, Deserialize)]
pub struct PairSelector {
    pub item: String,
    pub label: String,
    pub value: String,
}

/// CSS selectors describing the listing and detail markup
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    /// Tag stored on every record
    #[serde(rename = "data-source", default = "default_data_source")]
    pub data_source: String,

    /// One element per listing row
    pub row: String,

    /// Rows carrying any of these classes are skipped (ads, promos)
    #[serde(rename = "skip-classes", default)]
    pub skip_classes: Vec<String>,

    /// Row attribute holding the item key; the detail address is used when absent
    #[serde(rename = "key-attr")]
    pub key_attr: Option<String>,

    /// Link to the detail page, relative to the row
    #[serde(rename = "detail-link")]
    pub detail_link: String,

    /// Link to the next listing page
    #[serde(rename = "next-page")]
    pub next_page: Option<String>,

    /// Direct address of page N, with `{page}` as placeholder
    #[serde(rename = "page-url-template")]
    pub page_url_template: Option<String>,

    #[serde(rename = "list-fields", default)]
    pub list_fields: Vec<FieldSelector>,

    #[serde(rename = "detail-fields", default)]
    pub detail_fields: Vec<FieldSelector>,

    #[serde(rename = "detail-pairs")]
    pub detail_pairs: Option<PairSelector>,
}

fn default_max_pages() -> u32 {
    1
}

fn default_delay_ms() -> u64 {
    1500
}

fn default_user_agent() -> String {
    format!("paged-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_state_dir() -> String {
    "./data/state".to_string()
}

fn default_data_source() -> String {
    "unknown".to_string()
}
