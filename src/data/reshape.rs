use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::prices::PricePanel;
use crate::error::TransformError;

/// One observation in tidy form: a close price for a (date, symbol) pair.
///
/// Invariant: a record is only ever created from a present close value, so
/// no record carries a missing price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub symbol: String,
    pub close: f64,
}

/// Result of reshaping a panel: the tidy records plus how many
/// (date, symbol) cells were dropped for having no close value.
#[derive(Debug, Clone)]
pub struct Reshaped {
    pub records: Vec<PriceRecord>,
    pub dropped: usize,
}

/// Converts a wide panel into long form, one row per (date, symbol) pair
/// with a present close value.
///
/// Cells with a missing close are dropped, not imputed; the drop is silent
/// at the record level but counted in [`Reshaped::dropped`] so the caller
/// can surface it. Output order is date-major, then symbol, matching the
/// panel axes.
///
/// # Errors
/// Returns an error for a malformed panel: no symbol columns or no date
/// rows.
pub fn reshape(panel: &PricePanel) -> Result<Reshaped, TransformError> {
    if panel.symbols().is_empty() {
        return Err(TransformError::NoSymbols);
    }
    if panel.dates().is_empty() {
        return Err(TransformError::NoDates);
    }

    let mut records = Vec::with_capacity(panel.dates().len() * panel.symbols().len());
    let mut dropped = 0;

    for (date_idx, date) in panel.dates().iter().enumerate() {
        for (symbol_idx, symbol) in panel.symbols().iter().enumerate() {
            match panel.close(date_idx, symbol_idx) {
                Some(close) => records.push(PriceRecord {
                    date: *date,
                    symbol: symbol.clone(),
                    close,
                }),
                None => dropped += 1,
            }
        }
    }

    Ok(Reshaped { records, dropped })
}
