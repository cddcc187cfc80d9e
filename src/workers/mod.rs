pub mod common;
pub mod search;

// Common re-exports
pub use common::{store_report, SearchJobParams};
