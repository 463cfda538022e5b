pub mod constituents;
pub mod prices;
pub mod reshape;

pub use constituents::{symbol_set, ConstituentRecord, ReferenceSource, WikipediaSource};
pub use prices::{PricePanel, PriceSource, SparkApiSource};
pub use reshape::{reshape, PriceRecord, Reshaped};
