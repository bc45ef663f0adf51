pub mod price_history;
pub mod price_source;
pub mod trade_stream;

pub use price_history::{HistorySnapshot, PriceHistory};
pub use price_source::{PriceSource, SourceError};
