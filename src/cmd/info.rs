//! Read-only relay queries: `veil levels`, `veil history`, `veil export`.

use anyhow::{Context, Result};
use std::path::Path;

use veil::config::VeilConfig;
use veil::transport::{HttpTransport, SessionTransport};
use veil::ui::icons::CHECK;
use veil::ui::report;

fn transport(config: &VeilConfig) -> Result<HttpTransport> {
    HttpTransport::new(&config.server_url, config.request_timeout())
}

pub async fn cmd_levels(config: &VeilConfig) -> Result<()> {
    let levels = transport(config)?
        .levels()
        .await
        .context("Failed to fetch revenue tiers")?;
    report::print_levels(&levels);
    Ok(())
}

pub async fn cmd_history(config: &VeilConfig) -> Result<()> {
    let history = transport(config)?
        .history()
        .await
        .context("Failed to fetch comparison history")?;
    report::print_history(&history);
    Ok(())
}

pub async fn cmd_export(config: &VeilConfig, session_id: &str, output: Option<&Path>) -> Result<()> {
    let record = transport(config)?
        .export(session_id)
        .await
        .with_context(|| format!("Failed to export session {}", session_id))?;
    let json = serde_json::to_string_pretty(&record)?;

    match output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", json))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}Exported session {} to {}", CHECK, session_id, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
