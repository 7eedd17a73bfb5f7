//! Config command handlers

use anyhow::{bail, Context, Result};
use serde_json::json;

use qnote_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config: &Config, output: &Output) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                json!({
                    "data_dir": config.data_dir,
                    "database": config.database_path(),
                    "default_book": config.default_book,
                    "compression_level": config.compression_level,
                    "log_level": config.log_level,
                    "config_file": Config::config_file_path()
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:          {}", config.data_dir.display());
            println!("  default_book:      {}", config.default_book);
            println!("  compression_level: {}", config.compression_level);
            println!(
                "  log_level:         {}",
                config.log_level.as_deref().unwrap_or("(not set)")
            );
            println!();
            println!("Database:    {}", config.database_path().display());
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value and save it
pub fn set(mut config: Config, key: String, value: String, output: &Output) -> Result<()> {
    apply(&mut config, &key, &value)?;
    config.save().context("Failed to save configuration")?;
    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "default_book" => {
            if value.is_empty() {
                bail!("default_book cannot be empty");
            }
            config.default_book = value.to_string();
        }
        "compression_level" => {
            config.compression_level = value
                .parse()
                .context("Invalid value for compression_level. Use an integer such as 3.")?;
        }
        "log_level" => {
            config.log_level = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, default_book, compression_level, log_level",
                key
            );
        }
    }
    Ok(())
}
