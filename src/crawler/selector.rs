//! CSS selector extractor
//!
//! This module reads listing and detail markup described by a
//! `SelectorConfig`:
//! - Listing rows, skipping rows tagged with an ignored class (ads, promos)
//! - Item keys from a row attribute, or the detail address
//! - Named fields from rows and detail pages
//! - Label/value lists on detail pages
//! - Pagination links and page address templates

use crate::config::{FieldSelector, PairSelector, SelectorConfig};
use crate::crawler::extract::{ExtractionError, Extractor, ListingItem};
use crate::crawler::fetcher::Page;
use crate::output::Fields;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Field selector with its CSS compiled
#[derive(Debug)]
struct CompiledField {
    name: String,
    selector: Selector,
    attr: Option<String>,
}

#[derive(Debug)]
struct CompiledPairs {
    item: Selector,
    label: Selector,
    value: Selector,
}

/// `Extractor` driven by CSS selectors
#[derive(Debug)]
pub struct SelectorExtractor {
    data_source: String,
    row: Selector,
    row_css: String,
    skip_classes: Vec<String>,
    key_attr: Option<String>,
    detail_link: Selector,
    next_page: Option<Selector>,
    page_url_template: Option<String>,
    list_fields: Vec<CompiledField>,
    detail_fields: Vec<CompiledField>,
    detail_pairs: Option<CompiledPairs>,
}

impl SelectorExtractor {
    /// Compiles every selector in the configuration
    pub fn new(config: &SelectorConfig) -> Result<Self, ExtractionError> {
        Ok(Self {
            data_source: config.data_source.clone(),
            row: compile(&config.row)?,
            row_css: config.row.clone(),
            skip_classes: config.skip_classes.clone(),
            key_attr: config.key_attr.clone(),
            detail_link: compile(&config.detail_link)?,
            next_page: config.next_page.as_deref().map(compile).transpose()?,
            page_url_template: config.page_url_template.clone(),
            list_fields: compile_fields(&config.list_fields)?,
            detail_fields: compile_fields(&config.detail_fields)?,
            detail_pairs: config.detail_pairs.as_ref().map(compile_pairs).transpose()?,
        })
    }

    fn is_skipped(&self, row: &ElementRef) -> bool {
        row.value()
            .classes()
            .any(|class| self.skip_classes.iter().any(|skip| skip == class))
    }

    fn read_row(
        &self,
        row: ElementRef,
        order: usize,
        base: &Url,
    ) -> Option<ListingItem> {
        let link = row.select(&self.detail_link).next()?;
        let detail_address = resolve_link(link.value().attr("href")?, base)?;

        let key = match &self.key_attr {
            Some(attr) => {
                let key = row.value().attr(attr)?.trim();
                if key.is_empty() {
                    return None;
                }
                key.to_string()
            }
            None => detail_address.clone(),
        };

        let fields = self
            .list_fields
            .iter()
            .filter_map(|field| Some((field.name.clone(), field_value(row, field)?)))
            .collect();

        Some(ListingItem {
            key,
            order,
            detail_address,
            fields,
        })
    }
}

impl Extractor for SelectorExtractor {
    fn data_source(&self) -> &str {
        &self.data_source
    }

    fn extract_items(&self, page: &Page) -> Result<Vec<ListingItem>, ExtractionError> {
        let base = parse_base(&page.address)?;
        let document = Html::parse_document(&page.body);

        let mut items = Vec::new();
        let mut rows = 0;
        for (order, row) in document.select(&self.row).enumerate() {
            rows += 1;
            if self.is_skipped(&row) {
                continue;
            }
            match self.read_row(row, order, &base) {
                Some(item) => items.push(item),
                None => tracing::debug!("Row {} on {} has no usable key or link", order, page.address),
            }
        }

        if rows == 0 {
            return Err(ExtractionError::MissingElement {
                selector: self.row_css.clone(),
            });
        }
        Ok(items)
    }

    fn extract_detail(&self, page: &Page) -> Result<Fields, ExtractionError> {
        let document = Html::parse_document(&page.body);
        let root = document.root_element();

        let mut fields: Fields = self
            .detail_fields
            .iter()
            .filter_map(|field| Some((field.name.clone(), field_value(root, field)?)))
            .collect();

        if let Some(pairs) = &self.detail_pairs {
            for item in document.select(&pairs.item) {
                let label = item.select(&pairs.label).next().map(text_of);
                let value = item.select(&pairs.value).next().map(text_of);
                if let (Some(label), Some(value)) = (label, value) {
                    let label = label.trim_end_matches(':').trim().to_string();
                    if !label.is_empty() {
                        fields.insert(label, value);
                    }
                }
            }
        }

        let expects_fields = !self.detail_fields.is_empty() || self.detail_pairs.is_some();
        if expects_fields && fields.is_empty() {
            return Err(ExtractionError::Malformed(format!(
                "no detail fields found on {}",
                page.address
            )));
        }
        Ok(fields)
    }

    fn next_page_address(&self, page: &Page) -> Option<String> {
        let selector = self.next_page.as_ref()?;
        let base = Url::parse(&page.address).ok()?;
        let document = Html::parse_document(&page.body);

        let href = document.select(selector).next()?.value().attr("href")?;
        let next = resolve_link(href, &base)?;

        // A link back to the current page would loop forever
        if next == page.address {
            return None;
        }
        Some(next)
    }

    fn page_address(&self, target: &str, page_number: u32) -> Option<String> {
        let template = self.page_url_template.as_ref()?;
        let filled = template.replace("{page}", &page_number.to_string());
        let base = Url::parse(target).ok()?;
        base.join(&filled).ok().map(|url| url.to_string())
    }
}

fn compile(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::InvalidSelector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

fn compile_fields(fields: &[FieldSelector]) -> Result<Vec<CompiledField>, ExtractionError> {
    fields
        .iter()
        .map(|field| {
            Ok(CompiledField {
                name: field.name.clone(),
                selector: compile(&field.selector)?,
                attr: field.attr.clone(),
            })
        })
        .collect()
}

fn compile_pairs(pairs: &PairSelector) -> Result<CompiledPairs, ExtractionError> {
    Ok(CompiledPairs {
        item: compile(&pairs.item)?,
        label: compile(&pairs.label)?,
        value: compile(&pairs.value)?,
    })
}

fn parse_base(address: &str) -> Result<Url, ExtractionError> {
    Url::parse(address).map_err(|source| ExtractionError::InvalidAddress {
        address: address.to_string(),
        source,
    })
}

/// Element text with whitespace collapsed
fn text_of(element: ElementRef) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn field_value(scope: ElementRef, field: &CompiledField) -> Option<String> {
    let element = scope.select(&field.selector).next()?;
    let value = match &field.attr {
        Some(attr) => element.value().attr(attr)?.trim().to_string(),
        None => text_of(element),
    };
    (!value.is_empty()).then_some(value)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    if absolute.scheme() == "http" || absolute.scheme() == "https" {
        Some(absolute.to_string())
    } else {
        None
    }
}
