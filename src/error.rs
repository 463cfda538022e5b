use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

/// One discrete step of the ETL sequence.
///
/// The pipeline moves linearly through these stages; a failure in any of
/// them aborts the run without executing later stages. The stage tag is
/// attached to every failure event so log readers can tell where a run
/// stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractReference,
    ExtractPrices,
    Transform,
    Load,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ExtractReference => "extract_reference",
            Stage::ExtractPrices => "extract_prices",
            Stage::Transform => "transform",
            Stage::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures while retrieving or parsing the constituent reference table.
#[derive(Debug, Error)]
pub enum ExtractReferenceError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("no table found in document at {0}")]
    NoTable(String),
    #[error("reference table is missing a {0} column")]
    MissingColumn(&'static str),
    #[error("reference table contained no usable rows")]
    Empty,
    #[error("failed to persist raw constituent table: {0}")]
    Persist(#[source] LoadError),
}

/// Failures while fetching the multi-symbol price panel.
#[derive(Debug, Error)]
pub enum ExtractPricesError {
    #[error("symbol set is empty")]
    EmptySymbolSet,
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("price request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider rejected the request: {0}")]
    Provider(String),
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(&'static str),
    #[error("no price data returned for the requested range")]
    Empty,
}

/// Failures while reshaping the wide panel into tidy records.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("price panel has no symbol columns")]
    NoSymbols,
    #[error("price panel has no date rows")]
    NoDates,
}

/// Failures while writing a table to a sink.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("csv serialization failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no schema mapping for destination table {0:?}")]
    UnknownDestination(String),
    #[error("{failed} of {attempted} load writes failed")]
    Partial { failed: usize, attempted: usize },
}

/// A pipeline run failure, tagged with the stage that produced it.
///
/// Each stage logs its failure once before this error propagates; callers
/// only use it to decide the exit code.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("reference extraction failed: {0}")]
    ExtractReference(#[from] ExtractReferenceError),
    #[error("price extraction failed: {0}")]
    ExtractPrices(#[from] ExtractPricesError),
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("load failed: {0}")]
    Load(#[from] LoadError),
}

impl PipelineError {
    /// The stage this failure aborted the run at.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ExtractReference(_) => Stage::ExtractReference,
            PipelineError::ExtractPrices(_) => Stage::ExtractPrices,
            PipelineError::Transform(_) => Stage::Transform,
            PipelineError::Load(_) => Stage::Load,
        }
    }
}
