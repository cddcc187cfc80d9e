pub mod normalize;
pub mod parse;
pub mod types;

pub use types::*;

pub use normalize::{earliest_deadline, normalize_report};
pub use parse::{clean_and_parse_json, parse_audit_verdict, parse_profile_fragment, parse_report};
