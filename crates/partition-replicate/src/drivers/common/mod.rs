//! Utilities shared across database drivers.
//!
//! - [`tls`]: rustls configuration for PostgreSQL connections

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
