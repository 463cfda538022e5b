pub mod file;
pub mod sql;
pub mod table;

use async_trait::async_trait;

use crate::error::LoadError;

pub use file::CsvSink;
pub use sql::{SchemaMap, SqlSink};
pub use table::{Cell, DataTable};

/// A persistence destination for tabular data.
///
/// `destination` is a logical name each sink resolves its own way: the
/// file sink treats it as a file stem, the relational sink as a table
/// name with its own column mapping.
#[async_trait]
pub trait TableSink: Send + Sync {
    async fn write(&self, table: &DataTable, destination: &str) -> Result<(), LoadError>;

    /// Short label for log events ("csv", "sql").
    fn kind(&self) -> &'static str;
}
