//! Result-block parser for saved Google Scholar result pages.
//!
//! A page holds one structural block per search hit. Each block yields a
//! [`SearchResultRecord`]; any field whose element is missing falls back to
//! the [`NOT_AVAILABLE`] sentinel. The record URL is resolved by an ordered
//! list of [`LinkLocator`]s, first hit wins.

use crate::error::{Result, ScholarError};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Sentinel used for every field that could not be located.
pub const NOT_AVAILABLE: &str = "N/A";

/// Visible marker Scholar puts on direct PDF links.
const PDF_MARKER: &str = "[PDF]";

/// Byline separator: `"Author1, Author2 - Venue, Year - Source"`.
const BYLINE_SEPARATOR: &str = " - ";

/// One parsed search hit. Serialized with the fixed column names
/// `Title,Author,Year,URL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Author")]
    pub author: String,
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "URL")]
    pub url: String,
}

impl Default for SearchResultRecord {
    fn default() -> Self {
        Self {
            title: NOT_AVAILABLE.to_string(),
            author: NOT_AVAILABLE.to_string(),
            year: NOT_AVAILABLE.to_string(),
            url: NOT_AVAILABLE.to_string(),
        }
    }
}

impl SearchResultRecord {
    /// True when the URL survived locator resolution and filtering.
    pub fn has_url(&self) -> bool {
        self.url != NOT_AVAILABLE
    }
}

/// Structural signature of a result block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSignature {
    /// `div.gs_ri`: title, byline and footer only.
    Inner,
    /// `div.gs_r.gs_or.gs_scl`: the whole row, including the PDF side block.
    Row,
}

impl BlockSignature {
    fn css(self) -> &'static str {
        match self {
            BlockSignature::Inner => "div.gs_ri",
            BlockSignature::Row => "div.gs_r.gs_or.gs_scl",
        }
    }
}

/// One strategy for locating a candidate link inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLocator {
    /// Link inside the PDF side block whose text carries `[PDF]`.
    MarkedPdfInSideBlock,
    /// Any link with an `href` inside the PDF side block.
    AnyInSideBlock,
    /// Any link with an `href` anywhere in the block.
    AnyInBlock,
    /// The link wrapped by the result heading.
    TitleLink,
}

/// Block signature plus the locator chain used to resolve the URL.
#[derive(Debug, Clone, Copy)]
pub struct ParseProfile {
    pub block: BlockSignature,
    pub locators: &'static [LinkLocator],
    /// Discard URLs that do not end with `.pdf`.
    pub require_pdf_suffix: bool,
}

impl ParseProfile {
    /// Plain listing: inner blocks, first link in the block.
    pub const LISTING: ParseProfile = ParseProfile {
        block: BlockSignature::Inner,
        locators: &[LinkLocator::AnyInBlock],
        require_pdf_suffix: false,
    };

    /// PDF harvesting: whole rows, side-block links preferred, `.pdf` only.
    pub const PDF_LINKS: ParseProfile = ParseProfile {
        block: BlockSignature::Row,
        locators: &[
            LinkLocator::MarkedPdfInSideBlock,
            LinkLocator::AnyInSideBlock,
            LinkLocator::AnyInBlock,
        ],
        require_pdf_suffix: true,
    };

    /// Live harvesting: inner blocks, heading link.
    pub const HARVEST: ParseProfile = ParseProfile {
        block: BlockSignature::Inner,
        locators: &[LinkLocator::TitleLink],
        require_pdf_suffix: false,
    };
}

struct Selectors {
    block: Selector,
    title: Selector,
    byline: Selector,
    footer: Selector,
    side_block: Selector,
    link: Selector,
    title_link: Selector,
}

impl Selectors {
    fn new(block: BlockSignature) -> Result<Self> {
        let parse = |css: &str| Selector::parse(css).map_err(|e| ScholarError::Parse(e.to_string()));
        Ok(Self {
            block: parse(block.css())?,
            title: parse("h3.gs_rt")?,
            byline: parse("div.gs_a")?,
            footer: parse("span.gs_fl, div.gs_fl.gs_flb")?,
            side_block: parse("div.gs_or_ggsm")?,
            link: parse("a[href]")?,
            title_link: parse("h3.gs_rt a[href]")?,
        })
    }
}

/// Parser bound to one [`ParseProfile`].
pub struct ResultParser {
    profile: ParseProfile,
    selectors: Selectors,
    year_regex: Regex,
}

impl ResultParser {
    pub fn new(profile: ParseProfile) -> Result<Self> {
        Ok(Self {
            profile,
            selectors: Selectors::new(profile.block)?,
            year_regex: Regex::new(r"\b(19|20)\d{2}\b")
                .map_err(|e| ScholarError::Parse(e.to_string()))?,
        })
    }

    pub fn profile(&self) -> &ParseProfile {
        &self.profile
    }

    /// Parse every result block in a page. Never fails on missing structure.
    pub fn parse_document(&self, html: &str) -> Vec<SearchResultRecord> {
        let document = Html::parse_document(html);
        document
            .select(&self.selectors.block)
            .map(|block| self.parse_block(block))
            .collect()
    }

    fn parse_block(&self, block: ElementRef<'_>) -> SearchResultRecord {
        let title = block
            .select(&self.selectors.title)
            .next()
            .map(element_text);

        let byline = block
            .select(&self.selectors.byline)
            .next()
            .map(element_text);

        let author = byline.as_deref().map(|text| match text.split_once(BYLINE_SEPARATOR) {
            Some((authors, _)) => authors.trim().to_string(),
            None => text.to_string(),
        });

        let year = block
            .select(&self.selectors.footer)
            .next()
            .map(element_text)
            .and_then(|footer| footer.split_whitespace().last().map(str::to_string))
            .or_else(|| byline.as_deref().and_then(|b| self.year_from_byline(b)));

        let url = self.locate_url(block).filter(|href| {
            !self.profile.require_pdf_suffix || href.to_ascii_lowercase().ends_with(".pdf")
        });

        SearchResultRecord {
            title: or_sentinel(title),
            author: or_sentinel(author),
            year: or_sentinel(year),
            url: or_sentinel(url),
        }
    }

    fn year_from_byline(&self, byline: &str) -> Option<String> {
        let (_, venue) = byline.split_once(BYLINE_SEPARATOR)?;
        self.year_regex
            .find(venue)
            .map(|m| m.as_str().to_string())
    }

    fn locate_url(&self, block: ElementRef<'_>) -> Option<String> {
        self.profile
            .locators
            .iter()
            .find_map(|locator| self.apply_locator(*locator, block))
    }

    fn apply_locator(&self, locator: LinkLocator, block: ElementRef<'_>) -> Option<String> {
        let s = &self.selectors;
        let found = match locator {
            LinkLocator::MarkedPdfInSideBlock => block
                .select(&s.side_block)
                .flat_map(|side| side.select(&s.link))
                .find(|link| link.text().collect::<String>().contains(PDF_MARKER)),
            LinkLocator::AnyInSideBlock => block
                .select(&s.side_block)
                .flat_map(|side| side.select(&s.link))
                .next(),
            LinkLocator::AnyInBlock => block.select(&s.link).next(),
            LinkLocator::TitleLink => block.select(&s.title_link).next(),
        };

        let href = found
            .and_then(|link| link.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())?;
        debug!(?locator, href, "Located link");
        Some(href.to_string())
    }
}

/// Whitespace-normalized text of an element (non-breaking spaces included).
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn or_sentinel(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// List `*.<extension>` files in a directory in natural order
/// (`2.html` before `10.html`).
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
        .collect();

    files.sort_by_key(|path| natural_key(path));
    Ok(files)
}

fn natural_key(path: &Path) -> (u64, String) {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    (stem.parse::<u64>().unwrap_or(u64::MAX), name)
}

/// Parse every saved page in `dir`, writing accepted URLs to `link_sink`
/// one per line in discovery order.
pub fn process_directory<W: Write>(
    dir: &Path,
    profile: ParseProfile,
    link_sink: &mut W,
) -> Result<Vec<SearchResultRecord>> {
    let parser = ResultParser::new(profile)?;
    let files = list_files_with_extension(dir, "html")?;
    let mut results = Vec::new();

    for path in files {
        let html = match std::fs::read_to_string(&path) {
            Ok(html) => html,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Failed to read page");
                continue;
            }
        };

        let records = parser.parse_document(&html);
        info!(file = %path.display(), count = records.len(), "Processed page");

        for record in records {
            if record.has_url() {
                writeln!(link_sink, "{}", record.url)?;
            }
            results.push(record);
        }
    }

    Ok(results)
}

/// Write records with a fixed `Title,Author,Year,URL` header, even when empty.
pub fn write_records_csv(path: &Path, records: &[SearchResultRecord]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    wtr.write_record(["Title", "Author", "Year", "URL"])?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;

    info!(path = %path.display(), count = records.len(), "Results saved");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct UrlRow {
    #[serde(rename = "URL")]
    url: String,
}

/// Read the `URL` column of a results file, in row order.
pub fn read_urls_csv(path: &Path) -> Result<Vec<String>> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut urls = Vec::new();
    for row in rdr.deserialize::<UrlRow>() {
        urls.push(row?.url);
    }
    Ok(urls)
}
