//! Configuration management commands.
//!
//! Settings live in `~/.codetrail/config.toml`:
//!
//! ```toml
//! api-url = "http://trail.internal:8080"
//! output = "json"
//! ```

use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a value (keys: api-url, output)
    Set { key: String, value: String },

    /// Print one value
    Get { key: String },

    /// Clear one value
    Unset { key: String },

    /// Show every value that is set
    Show,

    /// Delete the config file
    Reset {
        /// Do not ask, just delete
        #[arg(short, long)]
        force: bool,
    },
}

/// On-disk CLI settings. Unset keys fall back to flags and built-in defaults.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl CliConfig {
    fn slot(&mut self, key: &str) -> Result<&mut Option<String>> {
        match key {
            "api-url" => Ok(&mut self.api_url),
            "output" => Ok(&mut self.output),
            other => bail!("Unknown key '{}' (expected api-url or output)", other),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        match key {
            "api-url" => self.api_url.as_deref(),
            "output" => self.output.as_deref(),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        if key == "output" && OutputFormat::from_str(&value, true).is_err() {
            bail!("Invalid output format '{}' (expected table, json or yaml)", value);
        }
        *self.slot(key)? = Some(value);
        Ok(())
    }

    fn entries(&self) -> Vec<(&'static str, &str)> {
        [("api-url", self.api_url.as_deref()), ("output", self.output.as_deref())]
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect()
    }
}

fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".codetrail").join("config.toml"))
}

fn read_config(path: &Path) -> Result<CliConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CliConfig::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn write_config(cfg: &CliConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let body = toml::to_string_pretty(cfg).context("Failed to encode config")?;
    std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}

fn stored() -> Option<CliConfig> {
    config_path().and_then(|path| read_config(&path)).ok()
}

/// `api-url` from the config file, if set.
pub fn load_api_url() -> Option<String> {
    stored().and_then(|cfg| cfg.api_url)
}

/// Default `output` format from the config file, if set.
pub fn load_output() -> Option<String> {
    stored().and_then(|cfg| cfg.output)
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    let path = config_path()?;

    match cmd {
        ConfigCommands::Set { key, value } => {
            let mut cfg = read_config(&path)?;
            cfg.set(&key, value.clone())?;
            write_config(&cfg, &path)?;
            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, value)),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }

        ConfigCommands::Get { key } => {
            let cfg = read_config(&path)?;
            let Some(value) = cfg.get(&key) else {
                bail!("'{}' is not set", key);
            };
            match format {
                OutputFormat::Table => println!("{}", value),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }

        ConfigCommands::Unset { key } => {
            let mut cfg = read_config(&path)?;
            if cfg.slot(&key)?.take().is_none() {
                output::print_info(&format!("'{}' was not set", key));
                return Ok(());
            }
            write_config(&cfg, &path)?;
            output::print_success(&format!("Cleared {}", key));
        }

        ConfigCommands::Show => {
            let cfg = read_config(&path)?;
            match format {
                OutputFormat::Table => {
                    let entries = cfg.entries();
                    if entries.is_empty() {
                        output::print_info(&format!("Nothing set in {}", path.display()));
                        return Ok(());
                    }
                    output::print_header("Configuration");
                    for (key, value) in entries {
                        output::print_detail(key, value);
                    }
                }
                _ => output::print_item(&cfg, format)?,
            }
        }

        ConfigCommands::Reset { force } => {
            if !force {
                output::print_warning(&format!("Re-run with --force to delete {}", path.display()));
                return Ok(());
            }
            match std::fs::remove_file(&path) {
                Ok(()) => output::print_success("Configuration reset"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => output::print_info("No config file to reset"),
                Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", path.display())),
            }
        }
    }

    Ok(())
}
