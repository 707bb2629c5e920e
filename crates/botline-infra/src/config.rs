//! Gateway configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.botline/` in production),
//! then layers `BOTLINE_*` environment variables on top. Falls back to
//! defaults when the file is missing or malformed; an environment value that
//! does not parse is ignored with a warning.

use std::path::Path;
use std::str::FromStr;

use botline_types::config::GatewayConfig;
use botline_types::tenant::parse_tenant_list;

/// Load configuration from `{data_dir}/config.toml` plus the process
/// environment.
pub async fn load_gateway_config(data_dir: &Path) -> GatewayConfig {
    let config = load_config_file(data_dir).await;
    apply_env_overrides(config, |key| std::env::var(key).ok())
}

/// Load `{data_dir}/config.toml` without environment overrides.
///
/// - If the file does not exist, returns [`GatewayConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_config_file(data_dir: &Path) -> GatewayConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GatewayConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GatewayConfig::default();
        }
    };

    match toml::from_str::<GatewayConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GatewayConfig::default()
        }
    }
}

/// Apply `BOTLINE_*` overrides read through `lookup`.
///
/// Taking the lookup as a closure keeps tests independent of the real
/// process environment.
pub fn apply_env_overrides<L>(mut config: GatewayConfig, lookup: L) -> GatewayConfig
where
    L: Fn(&str) -> Option<String>,
{
    override_with(&lookup, "BOTLINE_AUTO_START_ENABLED", parse_bool, &mut config.auto_start.enabled);
    if let Some(raw) = lookup("BOTLINE_AUTO_START_TENANTS") {
        config.auto_start.tenants = parse_tenant_list(&raw);
    }

    override_with(&lookup, "BOTLINE_RECONNECT_ENABLED", parse_bool, &mut config.reconnection.enabled);
    override_parsed(&lookup, "BOTLINE_RECONNECT_MAX_ATTEMPTS", &mut config.reconnection.max_attempts);
    override_parsed(&lookup, "BOTLINE_RECONNECT_BACKOFF_MS", &mut config.reconnection.backoff_ms);
    override_parsed(&lookup, "BOTLINE_RECONNECT_TIMEOUT_MS", &mut config.reconnection.timeout_ms);

    override_parsed(&lookup, "BOTLINE_BUFFER_TIMEOUT_MS", &mut config.buffer.timeout_ms);
    override_parsed(&lookup, "BOTLINE_BUFFER_MAX_RETRY_COUNT", &mut config.buffer.max_retry_count);
    override_parsed(&lookup, "BOTLINE_BUFFER_RETRY_DELAY_MS", &mut config.buffer.retry_delay_ms);

    override_parsed(&lookup, "BOTLINE_CLEANUP_INTERVAL_MS", &mut config.cleanup.interval_ms);
    override_parsed(
        &lookup,
        "BOTLINE_CLEANUP_INACTIVE_TIMEOUT_MS",
        &mut config.cleanup.inactive_timeout_ms,
    );
    override_with(&lookup, "BOTLINE_AUTO_CLEANUP", parse_bool, &mut config.cleanup.auto_cleanup);

    if let Some(url) = lookup("BOTLINE_DISPATCH_URL") {
        let url = url.trim();
        config.dispatch.url = (!url.is_empty()).then(|| url.to_string());
    }

    config
}

/// Parse a boolean flag: `true/false`, `1/0`, `yes/no`, `on/off`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn override_parsed<L, T>(lookup: &L, key: &str, target: &mut T)
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    override_with(lookup, key, |raw| raw.trim().parse().ok(), target);
}

fn override_with<L, T, P>(lookup: &L, key: &str, parse: P, target: &mut T)
where
    L: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match parse(&raw) {
        Some(value) => *target = value,
        None => tracing::warn!(key, value = %raw, "ignoring unparseable environment override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botline_types::tenant::TenantId;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[tokio::test]
    async fn load_config_file_missing_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config_file(tmp.path()).await;
        assert_eq!(config, GatewayConfig::default());
    }

    #[tokio::test]
    async fn load_config_file_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[auto_start]
enabled = true
tenants = ["1", "2"]

[reconnection]
enabled = true
max_attempts = 5

[buffer]
timeout_ms = 1500
"#,
        )
        .await
        .unwrap();

        let config = load_config_file(tmp.path()).await;
        assert_eq!(config.auto_start_tenants(), &[TenantId::new("1"), TenantId::new("2")]);
        assert!(config.reconnection.enabled);
        assert_eq!(config.reconnection.max_attempts, 5);
        assert_eq!(config.reconnection.backoff_ms, 5_000);
        assert_eq!(config.buffer.timeout_ms, 1_500);
        assert_eq!(config.buffer.max_retry_count, 3);
    }

    #[tokio::test]
    async fn load_config_file_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config_file(tmp.path()).await;
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn env_overrides_every_section() {
        let config = apply_env_overrides(
            GatewayConfig::default(),
            env(&[
                ("BOTLINE_AUTO_START_ENABLED", "true"),
                ("BOTLINE_AUTO_START_TENANTS", " 1, 2,, 6 "),
                ("BOTLINE_RECONNECT_ENABLED", "yes"),
                ("BOTLINE_RECONNECT_MAX_ATTEMPTS", "7"),
                ("BOTLINE_RECONNECT_BACKOFF_MS", "250"),
                ("BOTLINE_RECONNECT_TIMEOUT_MS", "9000"),
                ("BOTLINE_BUFFER_TIMEOUT_MS", "500"),
                ("BOTLINE_BUFFER_MAX_RETRY_COUNT", "0"),
                ("BOTLINE_BUFFER_RETRY_DELAY_MS", "20"),
                ("BOTLINE_CLEANUP_INTERVAL_MS", "60000"),
                ("BOTLINE_CLEANUP_INACTIVE_TIMEOUT_MS", "120000"),
                ("BOTLINE_AUTO_CLEANUP", "off"),
                ("BOTLINE_DISPATCH_URL", "http://localhost:9000/hook"),
            ]),
        );

        assert_eq!(
            config.auto_start_tenants(),
            &[TenantId::new("1"), TenantId::new("2"), TenantId::new("6")]
        );
        assert!(config.reconnection.enabled);
        assert_eq!(config.reconnection.max_attempts, 7);
        assert_eq!(config.reconnection.backoff_ms, 250);
        assert_eq!(config.reconnection.timeout_ms, 9_000);
        assert_eq!(config.buffer.timeout_ms, 500);
        assert_eq!(config.buffer.max_retry_count, 0);
        assert_eq!(config.buffer.retry_delay_ms, 20);
        assert_eq!(config.cleanup.interval_ms, 60_000);
        assert_eq!(config.cleanup.inactive_timeout_ms, 120_000);
        assert!(!config.cleanup.auto_cleanup);
        assert_eq!(config.dispatch.url.as_deref(), Some("http://localhost:9000/hook"));
    }

    #[test]
    fn unparseable_override_keeps_previous_value() {
        let config = apply_env_overrides(
            GatewayConfig::default(),
            env(&[
                ("BOTLINE_RECONNECT_MAX_ATTEMPTS", "lots"),
                ("BOTLINE_AUTO_CLEANUP", "maybe"),
            ]),
        );
        assert_eq!(config.reconnection.max_attempts, 3);
        assert!(config.cleanup.auto_cleanup);
    }

    #[test]
    fn tenant_list_without_enable_flag_is_inert() {
        let config = apply_env_overrides(
            GatewayConfig::default(),
            env(&[("BOTLINE_AUTO_START_TENANTS", "1,2")]),
        );
        assert_eq!(config.auto_start.tenants.len(), 2);
        assert!(config.auto_start_tenants().is_empty());
    }

    #[test]
    fn blank_dispatch_url_clears_it() {
        let mut base = GatewayConfig::default();
        base.dispatch.url = Some("http://example.invalid".into());
        let config = apply_env_overrides(base, env(&[("BOTLINE_DISPATCH_URL", "  ")]));
        assert!(config.dispatch.url.is_none());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for raw in ["true", "TRUE", "1", "yes", "on", " On "] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["false", "0", "no", "off"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("enabled"), None);
    }
}
