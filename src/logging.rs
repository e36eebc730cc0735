//! Logger setup shared by the binaries
//!
//! `RUST_LOG` always wins. Otherwise the filter is `info`, lowered to `warn`
//! when the init helper's `VERBOSE` variable is `no`.

use std::collections::HashMap;

/// Variable set by the system init helpers (`/lib/init/vars.sh`)
pub const VERBOSE_ENV: &str = "VERBOSE";

/// Default filter for a given VERBOSE value
pub fn default_filter(verbose: Option<&str>) -> &'static str {
    match verbose.map(str::trim) {
        Some("no") | Some("0") | Some("false") => "warn",
        _ => "info",
    }
}

/// `VERBOSE` from an override file, falling back to the process environment
pub fn verbose_setting(overrides: &HashMap<String, String>) -> Option<String> {
    overrides
        .get(VERBOSE_ENV)
        .cloned()
        .or_else(|| std::env::var(VERBOSE_ENV).ok())
}

/// Initialize env_logger, honoring `VERBOSE` from the environment
pub fn init() {
    init_with(std::env::var(VERBOSE_ENV).ok().as_deref());
}

/// Initialize env_logger with an explicit `VERBOSE` value
pub fn init_with(verbose: Option<&str>) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(verbose)),
    )
    .format_target(false)
    .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(None), "info");
        assert_eq!(default_filter(Some("yes")), "info");
        assert_eq!(default_filter(Some("no")), "warn");
        assert_eq!(default_filter(Some(" no\n")), "warn");
    }

    #[test]
    fn test_override_file_sets_verbose() {
        let overrides = HashMap::from([(VERBOSE_ENV.to_string(), "no".to_string())]);
        let verbose = verbose_setting(&overrides);
        assert_eq!(verbose.as_deref(), Some("no"));
        assert_eq!(default_filter(verbose.as_deref()), "warn");
    }
}
