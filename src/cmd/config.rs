//! Configuration view and validation commands: `veil config`.

use anyhow::{Context, Result};
use console::style;

use veil::config::{SERVER_URL_ENV, VeilConfig, VeilToml};
use veil::ui::icons::{CHECK, WARN};

use super::super::ConfigCommands;

pub fn cmd_config(config: &VeilConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", style("Veil Configuration").bold());
            println!("==================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No veil.toml found at {}", config_path.display());
                println!("Using defaults. Run 'veil config init' to create one.");
            }
            println!();

            let rendered =
                toml::to_string_pretty(&config.toml).context("Failed to render configuration")?;
            print!("{}", rendered);
            println!();

            println!("Effective values (with env/CLI overrides):");
            let source = if config.server_url != config.toml.server.url {
                format!(" (overridden by {} or --server-url)", SERVER_URL_ENV)
            } else {
                String::new()
            };
            println!("  server_url = \"{}\"{}", config.server_url, source);
            println!("  state_dir = \"{}\"", config.state_dir.display());
            println!("  session_file = \"{}\"", config.snapshot_file().display());
            println!("  log_dir = \"{}\"", config.log_dir().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No veil.toml found. Using defaults.");
            }

            let problems = config.validate();
            if problems.is_empty() {
                println!("{}Configuration is valid.", CHECK);
            } else {
                println!("{}Configuration problems:", WARN);
                for problem in &problems {
                    println!("  - {}", problem);
                }
                println!();
                anyhow::bail!("{} configuration problem(s) found", problems.len());
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("veil.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            VeilToml::default().save(&config_path)?;

            println!("{}Created veil.toml at {}", CHECK, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] url, request_timeout_secs");
            println!("  - [polling] interval_ms, auto_reset_delay_ms");
            println!("  - [session] ttl_secs, minimum_amount");
            println!("  - [upload] max_file_bytes");
            println!();
        }
    }

    Ok(())
}
