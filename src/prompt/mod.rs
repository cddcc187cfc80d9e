// Declare submodules
mod audit;
mod common;
mod enrichment;
mod search;

// Re-export the prompt builders
pub use audit::audit_report_prompt;
pub use common::*;
pub use enrichment::enrichment_prompt;
pub use search::grant_search_prompt;
