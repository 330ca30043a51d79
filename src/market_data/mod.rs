pub mod candle_buffer;
pub mod price_book;
pub mod tick;

// Re-export the core types for convenient access (e.g. `use crate::market_data::Tick`).
pub use candle_buffer::{Candle, CandleBuffer, CandleKey, Timeframe};
pub use price_book::PriceBook;
pub use tick::Tick;
