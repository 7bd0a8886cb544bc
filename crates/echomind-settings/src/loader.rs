//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EchomindSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `ECHOMIND_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::EchomindSettings;

/// Resolve the path to the settings file (`~/.echomind/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".echomind").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<EchomindSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// [`EchomindSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<EchomindSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<EchomindSettings> {
    let defaults = serde_json::to_value(EchomindSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Out-of-range or unparseable values are logged and ignored.
pub fn apply_env_overrides(settings: &mut EchomindSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_u16("ECHOMIND_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("ECHOMIND_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_string("ECHOMIND_ENVIRONMENT") {
        settings.server.environment = v;
    }
    if let Some(v) = read_env_string("ECHOMIND_API_TOKENS") {
        match parse_token_table(&v) {
            Some(tokens) => settings.auth.tokens = tokens,
            None => tracing::warn!(key = "ECHOMIND_API_TOKENS", "malformed token table, ignoring"),
        }
    }

    // ── Chat pipeline ───────────────────────────────────────────────
    if let Some(v) = read_env_u32("ECHOMIND_RATE_LIMIT_CAPACITY", 1, 100_000) {
        settings.rate_limit.capacity = v;
    }
    if let Some(v) = read_env_u64("ECHOMIND_RATE_LIMIT_WINDOW_SECS", 1, 86_400) {
        settings.rate_limit.window_secs = v;
    }
    if let Some(v) = read_env_u32("ECHOMIND_QUOTA_DEFAULT_LIMIT", 1, 1_000_000) {
        settings.quota.default_limit = v;
    }
    if let Some(v) = read_env_string("ECHOMIND_DB_PATH") {
        settings.quota.db_path = Some(v);
    }

    // ── Generation ──────────────────────────────────────────────────
    if let Some(v) = read_env_string("ECHOMIND_GENERATION_URL") {
        settings.generation.base_url = v;
    }
    if let Some(v) = read_env_string("ECHOMIND_GENERATION_API_KEY") {
        settings.generation.api_key = Some(v);
    }
    if let Some(v) = read_env_string("ECHOMIND_DEFAULT_MODEL") {
        settings.generation.default_model = v;
    }
    if let Some(v) = read_env_u64("ECHOMIND_GENERATION_TIMEOUT_SECS", 1, 3600) {
        settings.generation.timeout_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("ECHOMIND_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("ECHOMIND_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse `token:principal,token:principal` into a credential table.
///
/// Any entry missing either half rejects the whole value.
pub fn parse_token_table(val: &str) -> Option<BTreeMap<String, String>> {
    let mut table = BTreeMap::new();
    for entry in val.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (token, principal) = entry.split_once(':')?;
        let (token, principal) = (token.trim(), principal.trim());
        if token.is_empty() || principal.is_empty() {
            return None;
        }
        let _ = table.insert(token.to_string(), principal.to_string());
    }
    (!table.is_empty()).then_some(table)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8000, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"allowedModels": ["a", "b"]});
        let source = serde_json::json!({"allowedModels": ["c"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["allowedModels"], serde_json::json!(["c"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(
            serde_json::json!({"a": {"nested": true}}),
            serde_json::json!({"a": 42}),
        );
        assert_eq!(merged["a"], 42);
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.quota.default_limit, 25);
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"rateLimit": {"capacity": 3}, "auth": {"tokens": {"t1": "alice"}}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.rate_limit.capacity, 3);
        assert_eq!(settings.rate_limit.window_secs, 60);
        assert_eq!(settings.auth.tokens["t1"], "alice");
    }

    #[test]
    fn extra_rules_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"safety": {"extraRules": [{"id": "x.grief", "tier": "caution", "pattern": "grieving", "reason": "grief"}]}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.safety.extra_rules.len(), 1);
        assert_eq!(settings.safety.extra_rules[0].id, "x.grief");
    }

    #[test]
    fn invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_file_layer(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn unreadable_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file_layer(dir.path()).unwrap_err();
        assert!(matches!(&err, SettingsError::Read { path, .. } if path == dir.path()));
    }

    #[test]
    fn invalid_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"quota": {"defaultLimit": 0}}"#).unwrap();

        let settings = load_file_layer(&path).unwrap();
        let err = settings.validate().unwrap_err();
        assert_eq!(err.field(), Some("quota.defaultLimit"));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u32_range("25", 1, 1000), Some(25));
        assert_eq!(parse_u32_range("abc", 1, 1000), None);
        assert_eq!(parse_u64_range("7200", 1, 3600), None);
    }

    #[test]
    fn parse_token_table_pairs() {
        let table = parse_token_table("tok-a:alice, tok-b:bob").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table["tok-a"], "alice");
        assert_eq!(table["tok-b"], "bob");
    }

    #[test]
    fn parse_token_table_rejects_malformed() {
        assert!(parse_token_table("tok-a").is_none());
        assert!(parse_token_table("tok-a:").is_none());
        assert!(parse_token_table(",,").is_none());
    }
}
