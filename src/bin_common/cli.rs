//! CLI utilities for binaries
//!
//! Handles the configuration path and command line arguments.

use std::path::PathBuf;

/// Environment variable naming the client config file
pub const CONFIG_PATH_ENV: &str = "KNOT_CONFIG_PATH";

/// Config file used when `KNOT_CONFIG_PATH` is unset
pub const DEFAULT_CONFIG_PATH: &str = "config/knot.yaml";

/// Load configuration path from environment or use default
///
/// A path given as the first command line argument wins over both.
///
/// # Examples
/// ```
/// use knot_cloud_client::bin_common::load_config_from_env;
///
/// let path = load_config_from_env(&[]);
/// ```
pub fn load_config_from_env(args: &[String]) -> PathBuf {
    if let Some(path) = args.first() {
        return PathBuf::from(path);
    }

    std::env::var(CONFIG_PATH_ENV)
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_overrides_env() {
        let args = vec!["custom/knot.yaml".to_string()];
        assert_eq!(
            load_config_from_env(&args),
            PathBuf::from("custom/knot.yaml")
        );
    }
}
