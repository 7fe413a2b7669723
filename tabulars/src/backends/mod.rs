//! Query runners for concrete engines.
//!
//! Each runner lives in its own file and is gated behind a feature flag.

#[cfg(feature = "duckdb")]
pub mod duckdb;

#[cfg(feature = "duckdb")]
pub use self::duckdb::DuckDbRunner;
