use std::env;

/// Retrieves an environment variable, falling back to a default when unset or empty.
pub fn get_env_var_or(var: &str, default: &str) -> String {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}
