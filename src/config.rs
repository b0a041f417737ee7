use anyhow::{Result, bail};
use clap::Parser;
use serde::Deserialize;
use serde_yaml;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Default)]
#[command(name = "catalog")]
#[command(about = "Runs the library catalog service", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    /// Overrides `app.database` from the config file.
    #[arg(long)]
    pub database: Option<String>,

    /// Overrides `app.port` from the config file.
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub debug: bool,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".catalog")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct App {
    #[serde(default = "default_database")]
    database: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    pub debug: bool,
}

fn default_database() -> String {
    "catalog.db".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for App {
    fn default() -> Self {
        App {
            database: default_database(),
            port: default_port(),
            debug: false,
        }
    }
}

impl App {
    #[cfg(test)]
    pub fn get_db(&self) -> &str {
        &self.database
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Resolves the database location against `data_dir` unless it is absolute
    /// or in-memory.
    pub fn db_path(&self, data_dir: &Path) -> PathBuf {
        let db = Path::new(&self.database);
        if self.database == ":memory:" || db.is_absolute() {
            db.to_path_buf()
        } else {
            data_dir.join(db)
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub app: App,
}

/// What happened while loading the config. Loading runs before the tracing
/// subscriber is installed, so the caller logs these afterwards.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadNotes {
    pub used_defaults: bool,
    pub missing_env_vars: Vec<String>,
}

impl Config {
    pub fn new(path: &str) -> Result<(Self, Vec<String>)> {
        Config::load_config(path)
    }

    /// Loads the config named on the command line, falling back to the default
    /// location, then applies the command line overrides.
    ///
    /// A missing file at the default location means built-in defaults; a missing
    /// file that was asked for explicitly is an error.
    pub fn from_cli(cli: &Cli, config_path: &Path) -> Result<(Self, LoadNotes)> {
        let mut notes = LoadNotes::default();
        let mut cfg = if config_path.exists() {
            let Some(path) = config_path.to_str() else {
                bail!("config path {:?} is not valid utf-8", config_path);
            };
            let (cfg, missing) = Config::new(path)?;
            notes.missing_env_vars = missing;
            cfg
        } else if cli.config_path.is_some() {
            bail!("config file {:?} does not exist", config_path);
        } else {
            notes.used_defaults = true;
            Config::default()
        };

        if let Some(database) = &cli.database {
            cfg.app.database = database.clone();
        }
        if let Some(port) = cli.port {
            cfg.app.port = port;
        }
        cfg.app.debug |= cli.debug;

        Ok((cfg, notes))
    }

    fn load_config(path: &str) -> Result<(Config, Vec<String>)> {
        let yaml_str = fs::read_to_string(path)?;
        Config::parse(&yaml_str)
    }

    fn parse(yaml_str: &str) -> Result<(Config, Vec<String>)> {
        let (yaml_with_env, missing) = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok((config, missing))
    }

    /// Expands `${VAR}` and `${VAR:-default}`, returning the names of unset
    /// variables that had no default.
    fn substitute_env_vars(yaml_str: &str) -> Result<(String, Vec<String>)> {
        let mut result = yaml_str.to_string();
        let mut missing = Vec::new();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        missing.push(var_name.to_string());
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok((result, missing))
    }
}
