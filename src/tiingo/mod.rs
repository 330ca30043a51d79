pub mod client;

pub use client::{ConnectionState, TiingoClient};
