use std::fmt;

use chrono::NaiveDate;

use crate::data::constituents::ConstituentRecord;
use crate::data::reshape::PriceRecord;

/// A single typed value inside a [`DataTable`].
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Float(f64),
    Date(NaiveDate),
    Null,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Cell::Null => Ok(()),
        }
    }
}

/// The column-ordered table shape handed to sink writers.
///
/// Sinks only see this representation, never the domain records, so both
/// writers stay independent of where the data came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl DataTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }

    /// Constituent list in its destination column layout.
    pub fn from_constituents(records: &[ConstituentRecord]) -> Self {
        let columns = ["Company", "Symbol", "Sector", "Headquarters", "Founded"]
            .map(String::from)
            .to_vec();
        let rows = records
            .iter()
            .map(|r| {
                vec![
                    Cell::Text(r.name.clone()),
                    Cell::Text(r.symbol.clone()),
                    optional_text(&r.sector),
                    optional_text(&r.headquarters),
                    optional_text(&r.founded),
                ]
            })
            .collect();
        Self { columns, rows }
    }

    /// Tidy price records in their destination column layout.
    pub fn from_prices(records: &[PriceRecord]) -> Self {
        let columns = ["Date", "Symbol", "Close"].map(String::from).to_vec();
        let rows = records
            .iter()
            .map(|r| {
                vec![
                    Cell::Date(r.date),
                    Cell::Text(r.symbol.clone()),
                    Cell::Float(r.close),
                ]
            })
            .collect();
        Self { columns, rows }
    }

    /// Returns a copy with columns renamed per `renames`
    /// (source name, destination name). Columns not named in the map keep
    /// their name; rows are untouched.
    pub fn rename_columns(&self, renames: &[(String, String)]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                renames
                    .iter()
                    .find(|(from, _)| from == column)
                    .map(|(_, to)| to.clone())
                    .unwrap_or_else(|| column.clone())
            })
            .collect();
        Self {
            columns,
            rows: self.rows.clone(),
        }
    }
}

fn optional_text(value: &Option<String>) -> Cell {
    match value {
        Some(s) => Cell::Text(s.clone()),
        None => Cell::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constituent(symbol: &str, name: &str) -> ConstituentRecord {
        ConstituentRecord {
            symbol: symbol.to_string(),
            name: name.to_string(),
            sector: Some("Industrials".to_string()),
            headquarters: None,
            founded: Some("1902".to_string()),
        }
    }

    #[test]
    fn test_constituent_layout() {
        let table = DataTable::from_constituents(&[constituent("MMM", "3M")]);
        assert_eq!(
            table.columns,
            ["Company", "Symbol", "Sector", "Headquarters", "Founded"]
        );
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], Cell::Text("3M".to_string()));
        assert_eq!(table.rows[0][1], Cell::Text("MMM".to_string()));
        assert_eq!(table.rows[0][3], Cell::Null);
    }

    #[test]
    fn test_price_layout() {
        let record = PriceRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            symbol: "MMM".to_string(),
            close: 101.25,
        };
        let table = DataTable::from_prices(&[record]);
        assert_eq!(table.columns, ["Date", "Symbol", "Close"]);
        assert_eq!(table.rows[0][0].to_string(), "2024-01-02");
        assert_eq!(table.rows[0][2].to_string(), "101.25");
    }

    #[test]
    fn test_rename_columns_leaves_unmapped_names() {
        let table = DataTable::from_prices(&[]);
        let renamed = table.rename_columns(&[
            ("Date".to_string(), "Fecha".to_string()),
            ("Close".to_string(), "Cerrado".to_string()),
        ]);
        assert_eq!(renamed.columns, ["Fecha", "Symbol", "Cerrado"]);
        // Source table is untouched.
        assert_eq!(table.columns, ["Date", "Symbol", "Close"]);
    }

    #[test]
    fn test_null_cell_displays_empty() {
        assert_eq!(Cell::Null.to_string(), "");
        assert_eq!(Cell::Float(12.5).to_string(), "12.5");
    }
}
