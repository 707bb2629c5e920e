//! `botline config`: print the effective configuration.

use std::path::Path;

use botline_infra::config::load_gateway_config;
use botline_types::config::GatewayConfig;

/// Load the configuration the server would run with and print it.
pub async fn show_config(data_dir: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_gateway_config(data_dir).await;
    let rendered = render_config(&config, json)?;

    if json {
        println!("{rendered}");
    } else {
        println!();
        println!(
            "  {} Effective configuration ({})",
            console::style("⚙").bold(),
            console::style(data_dir.join("config.toml").display()).cyan()
        );
        println!();
        for line in rendered.lines() {
            println!("  {line}");
        }
        println!();
    }
    Ok(())
}

/// Render as pretty JSON or as TOML (the config file format).
pub fn render_config(config: &GatewayConfig, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string_pretty(config)?)
    } else {
        Ok(toml::to_string_pretty(config)?)
    }
}
