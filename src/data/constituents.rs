use std::collections::HashSet;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::ExtractReferenceError;

/// One company listed in the index reference table.
///
/// # Fields
/// * `symbol`: Ticker symbol, used as the fetch key for the price panel
/// * `name`: Security name
/// * `sector`: Sector classification, when the table carries one
/// * `headquarters`: Headquarters location, when the table carries one
/// * `founded`: Founding date as printed in the table, when present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstituentRecord {
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub headquarters: Option<String>,
    pub founded: Option<String>,
}

/// A source of the current constituent list.
///
/// The production implementation scrapes a public web page; tests inject
/// doubles through this seam.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn fetch_constituents(&self) -> Result<Vec<ConstituentRecord>, ExtractReferenceError>;
}

/// Scrapes the constituent list from the first table of a Wikipedia page.
pub struct WikipediaSource {
    url: String,
    client: reqwest::Client,
}

impl WikipediaSource {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl ReferenceSource for WikipediaSource {
    async fn fetch_constituents(&self) -> Result<Vec<ConstituentRecord>, ExtractReferenceError> {
        let http_err = |source| ExtractReferenceError::Http {
            url: self.url.clone(),
            source,
        };

        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?
            .text()
            .await
            .map_err(http_err)?;

        parse_constituent_table(&body, &self.url)
    }
}

// Header spellings recognized for each field. The reference page exists in
// several language editions; both the English and Spanish headers map to
// the same normalized columns.
const SYMBOL_HEADERS: &[&str] = &["symbol", "símbolo", "ticker"];
const NAME_HEADERS: &[&str] = &["security", "company", "seguridad"];
const HEADQUARTERS_HEADERS: &[&str] = &[
    "headquarters location",
    "headquarters",
    "ubicación de la sede",
];
const FOUNDED_HEADERS: &[&str] = &["founded", "fundada"];

/// Extracts constituent records from the FIRST `<table>` in `html`.
///
/// Column positions are resolved from the table's header row by name, so
/// the parser survives column reordering. Rows without both a symbol and a
/// security name are skipped.
///
/// # Errors
/// * `NoTable` if the document has no table or the table has no header row
/// * `MissingColumn` if the symbol or name column cannot be located
/// * `Empty` if no row yields a usable record
pub fn parse_constituent_table(
    html: &str,
    url: &str,
) -> Result<Vec<ConstituentRecord>, ExtractReferenceError> {
    let document = Html::parse_document(html);
    let table_selector = selector("table");
    let row_selector = selector("tr");
    let cell_selector = selector("th, td");

    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| ExtractReferenceError::NoTable(url.to_string()))?;

    let mut rows = table.select(&row_selector);
    let header_row = rows
        .next()
        .ok_or_else(|| ExtractReferenceError::NoTable(url.to_string()))?;
    let headers: Vec<String> = header_row
        .select(&cell_selector)
        .map(|cell| cell_text(&cell).to_lowercase())
        .collect();

    let symbol_idx = find_column(&headers, SYMBOL_HEADERS)
        .ok_or(ExtractReferenceError::MissingColumn("symbol"))?;
    let name_idx = find_column(&headers, NAME_HEADERS)
        .ok_or(ExtractReferenceError::MissingColumn("security name"))?;
    let sector_idx = headers.iter().position(|h| h.contains("sector"));
    let headquarters_idx = find_column(&headers, HEADQUARTERS_HEADERS);
    let founded_idx = find_column(&headers, FOUNDED_HEADERS);

    let mut records = Vec::new();
    for row in rows {
        let cells: Vec<String> = row.select(&cell_selector).map(|c| cell_text(&c)).collect();

        let symbol = match cells.get(symbol_idx) {
            Some(s) if !s.is_empty() => s.clone(),
            _ => continue,
        };
        let name = match cells.get(name_idx) {
            Some(s) if !s.is_empty() => s.clone(),
            _ => continue,
        };

        records.push(ConstituentRecord {
            symbol,
            name,
            sector: optional_cell(&cells, sector_idx),
            headquarters: optional_cell(&cells, headquarters_idx),
            founded: optional_cell(&cells, founded_idx),
        });
    }

    if records.is_empty() {
        return Err(ExtractReferenceError::Empty);
    }

    Ok(records)
}

/// Derives the ordered, deduplicated symbol set from a constituent list.
///
/// First occurrence wins; a duplicate row in the scraped table cannot cause
/// a symbol to be fetched twice.
pub fn symbol_set(records: &[ConstituentRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.symbol.clone()))
        .map(|r| r.symbol.clone())
        .collect()
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.iter().any(|c| h == c))
}

fn optional_cell(cells: &[String], idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| cells.get(i))
        .filter(|s| !s.is_empty())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGLISH_PAGE: &str = r#"
        <html><body>
        <p>Intro paragraph</p>
        <table>
          <tr><th>Symbol</th><th>Security</th><th>GICS Sector</th>
              <th>Headquarters Location</th><th>Founded</th></tr>
          <tr><td>MMM</td><td>3M</td><td>Industrials</td>
              <td>Saint Paul, Minnesota</td><td>1902</td></tr>
          <tr><td>AOS</td><td>A. O. Smith</td><td>Industrials</td>
              <td>Milwaukee, Wisconsin</td><td>1916</td></tr>
        </table>
        </body></html>"#;

    const SPANISH_PAGE: &str = r#"
        <table>
          <tr><th>Seguridad</th><th>Símbolo</th><th>Sector GICS</th>
              <th>Ubicación de la sede</th><th>Fundada</th></tr>
          <tr><td>3M</td><td>MMM</td><td>Industriales</td>
              <td>Saint Paul, Minnesota</td><td>1902</td></tr>
        </table>"#;

    #[test]
    fn test_parse_english_headers() {
        let records = parse_constituent_table(ENGLISH_PAGE, "http://test").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "MMM");
        assert_eq!(records[0].name, "3M");
        assert_eq!(records[0].sector.as_deref(), Some("Industrials"));
        assert_eq!(
            records[0].headquarters.as_deref(),
            Some("Saint Paul, Minnesota")
        );
        assert_eq!(records[0].founded.as_deref(), Some("1902"));
        assert_eq!(records[1].symbol, "AOS");
    }

    #[test]
    fn test_parse_spanish_headers_and_column_order() {
        let records = parse_constituent_table(SPANISH_PAGE, "http://test").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "MMM");
        assert_eq!(records[0].name, "3M");
        assert_eq!(records[0].founded.as_deref(), Some("1902"));
    }

    #[test]
    fn test_first_table_wins() {
        let html = r#"
            <table>
              <tr><th>Symbol</th><th>Security</th></tr>
              <tr><td>AAA</td><td>Alpha Corp</td></tr>
            </table>
            <table>
              <tr><th>Symbol</th><th>Security</th></tr>
              <tr><td>ZZZ</td><td>Omega Corp</td></tr>
            </table>"#;
        let records = parse_constituent_table(html, "http://test").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "AAA");
    }

    #[test]
    fn test_rows_without_symbol_are_skipped() {
        let html = r#"
            <table>
              <tr><th>Symbol</th><th>Security</th></tr>
              <tr><td></td><td>Nameless Inc</td></tr>
              <tr><td>BBB</td><td>Beta Corp</td></tr>
            </table>"#;
        let records = parse_constituent_table(html, "http://test").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "BBB");
    }

    #[test]
    fn test_no_table_is_an_error() {
        let err = parse_constituent_table("<html><p>nothing</p></html>", "http://test");
        assert!(matches!(err, Err(ExtractReferenceError::NoTable(_))));
    }

    #[test]
    fn test_missing_symbol_column_is_an_error() {
        let html = r#"
            <table>
              <tr><th>Security</th><th>Founded</th></tr>
              <tr><td>Alpha Corp</td><td>1901</td></tr>
            </table>"#;
        let err = parse_constituent_table(html, "http://test");
        assert!(matches!(
            err,
            Err(ExtractReferenceError::MissingColumn("symbol"))
        ));
    }

    #[test]
    fn test_symbol_set_preserves_order_and_dedupes() {
        let record = |symbol: &str| ConstituentRecord {
            symbol: symbol.to_string(),
            name: format!("{symbol} Corp"),
            sector: None,
            headquarters: None,
            founded: None,
        };
        let records = vec![record("BBB"), record("AAA"), record("BBB"), record("CCC")];
        assert_eq!(symbol_set(&records), vec!["BBB", "AAA", "CCC"]);
    }
}
