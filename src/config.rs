//! Dispatcher configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), each with a default.

use std::time::Duration;

/// Settings shared by the dispatchers and the host tick loop.
///
/// Loaded once at startup via [`DispatchConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum number of events one `drain` call processes.
    pub drain_limit: usize,

    /// Milliseconds between two host ticks.
    pub tick_interval_ms: u64,

    /// Whether the host also drives a game-server dispatcher.
    pub game_server_enabled: bool,

    /// Stop after this many ticks (0 = run until interrupted).
    pub max_ticks: u64,
}

impl DispatchConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to the [`Default`] values when a variable is missing or
    /// cannot be parsed. Calls `dotenvy::dotenv().ok()` to optionally load
    /// a `.env` file.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            drain_limit: parse_env(&lookup, "DISPATCH_DRAIN_LIMIT", defaults.drain_limit).max(1),
            tick_interval_ms: parse_env(
                &lookup,
                "DISPATCH_TICK_INTERVAL_MS",
                defaults.tick_interval_ms,
            )
            .max(1),
            game_server_enabled: parse_env_bool(
                &lookup,
                "DISPATCH_GAME_SERVER_ENABLED",
                defaults.game_server_enabled,
            ),
            max_ticks: parse_env(&lookup, "DISPATCH_MAX_TICKS", defaults.max_ticks),
        }
    }

    /// Tick interval as a [`Duration`].
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            drain_limit: 64,
            tick_interval_ms: 16,
            game_server_enabled: false,
            max_ticks: 0,
        }
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a variable as a boolean. Accepts `"true"`, `"1"`, `"false"`,
/// `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = DispatchConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, DispatchConfig::default());
        assert_eq!(config.tick_interval(), Duration::from_millis(16));
    }

    #[test]
    fn values_are_parsed() {
        let config = DispatchConfig::from_lookup(lookup_from(&[
            ("DISPATCH_DRAIN_LIMIT", "8"),
            ("DISPATCH_TICK_INTERVAL_MS", "100"),
            ("DISPATCH_GAME_SERVER_ENABLED", "TRUE"),
            ("DISPATCH_MAX_TICKS", "3"),
        ]));
        assert_eq!(config.drain_limit, 8);
        assert_eq!(config.tick_interval_ms, 100);
        assert!(config.game_server_enabled);
        assert_eq!(config.max_ticks, 3);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = DispatchConfig::from_lookup(lookup_from(&[
            ("DISPATCH_DRAIN_LIMIT", "lots"),
            ("DISPATCH_GAME_SERVER_ENABLED", "maybe"),
        ]));
        assert_eq!(config.drain_limit, 64);
        assert!(!config.game_server_enabled);
    }

    #[test]
    fn zero_limits_are_clamped() {
        let config = DispatchConfig::from_lookup(lookup_from(&[
            ("DISPATCH_DRAIN_LIMIT", "0"),
            ("DISPATCH_TICK_INTERVAL_MS", "0"),
        ]));
        assert_eq!(config.drain_limit, 1);
        assert_eq!(config.tick_interval_ms, 1);
    }
}
