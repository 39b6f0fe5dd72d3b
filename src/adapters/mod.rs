pub mod sucuri;

/// Re-export commonly used types from adapters
pub use sucuri::{DEFAULT_API_URL, SucuriClient};
