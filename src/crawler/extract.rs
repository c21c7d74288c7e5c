//! Extraction seam between the controller and page markup

use crate::crawler::fetcher::Page;
use crate::output::Fields;
use thiserror::Error;

/// One row of a listing page
#[derive(Debug, Clone, PartialEq)]
pub struct ListingItem {
    /// Stable identity used for de-duplication across runs
    pub key: String,
    /// Position of the row on its page
    pub order: usize,
    /// Absolute address of the detail page
    pub detail_address: String,
    /// Values read from the listing row
    pub fields: Fields,
}

/// Errors raised while reading page markup
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("No element matches '{selector}'")]
    MissingElement { selector: String },

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Invalid address '{address}': {source}")]
    InvalidAddress {
        address: String,
        source: url::ParseError,
    },

    #[error("Malformed page: {0}")]
    Malformed(String),
}

/// Turns loaded pages into listing items, detail fields and pagination links
pub trait Extractor: Send + Sync {
    /// Tag stored on every record
    fn data_source(&self) -> &str;

    /// Returns the page's items in natural order
    fn extract_items(&self, page: &Page) -> Result<Vec<ListingItem>, ExtractionError>;

    /// Reads the detail fields of one item
    fn extract_detail(&self, page: &Page) -> Result<Fields, ExtractionError>;

    /// Returns the next listing page, or `None` when the source is exhausted
    fn next_page_address(&self, page: &Page) -> Option<String>;

    /// Returns the direct address of listing page `page_number`, if known
    ///
    /// When this returns `None` a resumed job reaches its page by following
    /// next-page links from the target.
    fn page_address(&self, _target: &str, _page_number: u32) -> Option<String> {
        None
    }
}

/// Drops every item up to and including the one keyed `last_key`
///
/// Items are compared by position, so a marker that moved down the page
/// still skips everything before it. When the marker is not on the page
/// nothing is dropped.
pub fn skip_through(items: Vec<ListingItem>, last_key: &str) -> Vec<ListingItem> {
    let Some(marker) = items.iter().find(|item| item.key == last_key).map(|i| i.order) else {
        return items;
    };

    items.into_iter().filter(|item| item.order > marker).collect()
}
