// Re-export the Database struct and other public items
pub mod core;
mod drafts;
mod enrichment;
mod history;
mod queue;
mod schema;

// Re-export Database and essential traits
pub use self::core::Database;
pub use sqlx::Row;
