use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::data::constituents::{symbol_set, ReferenceSource};
use crate::data::prices::PriceSource;
use crate::data::reshape::{reshape, PriceRecord};
use crate::error::{ExtractReferenceError, LoadError, PipelineError};
use crate::sink::table::DataTable;
use crate::sink::TableSink;

/// File stem for the raw constituent snapshot written during extraction.
pub const CONSTITUENTS_DESTINATION: &str = "sp500_constituents";
/// File stem for the processed tidy price table.
pub const PRICES_DESTINATION: &str = "sp500_prices_processed";
/// Relational destination for the constituent profiles.
pub const PROFILES_TABLE: &str = "CompanyProfiles";
/// Relational destination for the tidy price rows.
pub const PRICES_TABLE: &str = "Companies";

/// The ETL orchestrator: sequences extract, transform and load, aborting
/// the run at the first failing stage.
///
/// The sequence is linear with no branching:
/// extract the constituent reference table, derive the symbol set, fetch
/// the price panel in one batch, reshape it to tidy records, then write
/// every sink destination. Each stage receives an immutable snapshot of
/// its input and owns its output until it hands it on; a failure logs
/// once at the stage and short-circuits everything downstream.
pub struct EtlPipeline<R, P> {
    reference: R,
    prices: P,
    file_sink: Box<dyn TableSink>,
    db_sink: Option<Box<dyn TableSink>>,
    start: NaiveDate,
    end: NaiveDate,
}

impl<R: ReferenceSource, P: PriceSource> EtlPipeline<R, P> {
    pub fn new(
        reference: R,
        prices: P,
        file_sink: Box<dyn TableSink>,
        db_sink: Option<Box<dyn TableSink>>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            reference,
            prices,
            file_sink,
            db_sink,
            start,
            end,
        }
    }

    /// Runs the full sequence once. There are no retries and no partial
    /// resumption; a new invocation always restarts from the top.
    ///
    /// # Returns
    /// The tidy price records on success. On failure, the typed error
    /// carries the stage the run aborted at; the failure has already been
    /// logged when this returns.
    pub async fn run(&self) -> Result<Vec<PriceRecord>, PipelineError> {
        // EXTRACT_REFERENCE
        info!("extracting constituent reference table");
        let constituents = self
            .reference
            .fetch_constituents()
            .await
            .map_err(abort)?;
        info!(rows = constituents.len(), "reference table extracted");

        // Persist the raw snapshot immediately so it survives a failure in
        // any later stage.
        let constituent_table = DataTable::from_constituents(&constituents);
        self.file_sink
            .write(&constituent_table, CONSTITUENTS_DESTINATION)
            .await
            .map_err(|e| abort(ExtractReferenceError::Persist(e)))?;
        info!(destination = CONSTITUENTS_DESTINATION, "raw constituent table persisted");

        let symbols = symbol_set(&constituents);

        // EXTRACT_PRICES
        info!(
            symbols = symbols.len(),
            start = %self.start,
            end = %self.end,
            "fetching price panel"
        );
        let panel = self
            .prices
            .fetch_prices(&symbols, self.start, self.end)
            .await
            .map_err(abort)?;
        info!(dates = panel.dates().len(), "price panel fetched");

        // TRANSFORM
        let reshaped = reshape(&panel).map_err(abort)?;
        if reshaped.dropped > 0 {
            warn!(
                dropped = reshaped.dropped,
                "cells with missing closes were dropped during reshape"
            );
        }
        info!(rows = reshaped.records.len(), "panel reshaped to tidy records");

        // LOAD
        let price_table = DataTable::from_prices(&reshaped.records);
        let mut writes: Vec<(&dyn TableSink, &DataTable, &str)> = vec![(
            self.file_sink.as_ref(),
            &price_table,
            PRICES_DESTINATION,
        )];
        if let Some(db) = &self.db_sink {
            writes.push((db.as_ref(), &constituent_table, PROFILES_TABLE));
            writes.push((db.as_ref(), &price_table, PRICES_TABLE));
        }

        // Sink writes are independent: every destination is attempted even
        // when a sibling fails, and only afterwards does the stage report.
        let attempted = writes.len();
        let mut failed = 0;
        for (sink, table, destination) in writes {
            match sink.write(table, destination).await {
                Ok(()) => info!(
                    sink = sink.kind(),
                    destination,
                    rows = table.rows.len(),
                    "load write complete"
                ),
                Err(e) => {
                    failed += 1;
                    error!(sink = sink.kind(), destination, error = %e, "load write failed");
                }
            }
        }
        if failed > 0 {
            return Err(abort(LoadError::Partial { failed, attempted }));
        }

        info!(rows = reshaped.records.len(), "pipeline complete");
        Ok(reshaped.records)
    }
}

/// Logs a stage failure once and converts it for propagation.
fn abort<E: Into<PipelineError>>(err: E) -> PipelineError {
    let err = err.into();
    error!(stage = %err.stage(), error = %err, "pipeline aborted");
    err
}
