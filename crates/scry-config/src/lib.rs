// SPDX-License-Identifier: AGPL-3.0

//! Configuration management for scry
//!
//! Options come from the command line and from an optional TOML file with a
//! `[global]` table. Options given on the command line win.

use anyhow::{Context, Result};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "scry.toml";

/// Main scry configuration
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[clap(
    name = "scry",
    version,
    about = "Symbolic security analysis of recorded contract executions"
)]
pub struct Config {
    /// Recorded execution trace to analyze (JSON)
    pub trace: Option<PathBuf>,

    /// Path to the config file
    #[clap(long)]
    pub config: Option<PathBuf>,

    // === Analysis options ===
    /// Detection modules to run, comma separated (default: all)
    #[clap(long, short = 'm', default_value = "")]
    #[serde(default)]
    pub modules: String,

    /// Instrument exactly these plugins, comma separated
    #[clap(long, default_value = "")]
    #[serde(default)]
    pub with_plugins: String,

    /// Plugins to switch off after loading, comma separated
    #[clap(long, default_value = "")]
    #[serde(default)]
    pub disable_plugins: String,

    /// Worker threads for exploration (0 or 1 = sequential)
    #[clap(long, default_value = "1")]
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Max length in steps of a single path (0 = unlimited)
    #[clap(long, default_value = "0")]
    #[serde(default)]
    pub max_depth: usize,

    // === Solver options ===
    /// Solver backend: z3, yices, cvc5, bitwuzla
    #[clap(long, default_value = "z3")]
    #[serde(default = "default_solver")]
    pub solver: String,

    /// Run this external command instead of the named solver
    #[clap(long, default_value = "")]
    #[serde(default)]
    pub solver_command: String,

    /// Per-query timeout (units: ms, s, m, h; default ms)
    #[clap(long, default_value = "10s")]
    #[serde(default = "default_solver_timeout")]
    pub solver_timeout: String,

    /// Keep the SMT-LIB queries sent to an external solver in this directory
    #[clap(long)]
    pub dump_smt_directory: Option<PathBuf>,

    // === Output options ===
    /// Write findings as JSON to this file
    #[clap(long)]
    pub json_output: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[clap(short, long, action = clap::ArgAction::Count)]
    #[serde(default)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[clap(long)]
    #[serde(default)]
    pub json_logs: bool,
}

fn default_workers() -> usize {
    1
}

fn default_solver() -> String {
    "z3".to_string()
}

fn default_solver_timeout() -> String {
    "10s".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trace: None,
            config: None,
            modules: String::new(),
            with_plugins: String::new(),
            disable_plugins: String::new(),
            workers: default_workers(),
            max_depth: 0,
            solver: default_solver(),
            solver_command: String::new(),
            solver_timeout: default_solver_timeout(),
            dump_smt_directory: None,
            json_output: None,
            verbose: 0,
            json_logs: false,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let parsed: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        parsed.to_config()
    }

    /// Parse the process arguments. The matches are kept so [`merge`](Self::merge)
    /// can tell flags given on the command line from clap defaults.
    pub fn from_command_line() -> Result<(Self, ArgMatches)> {
        let matches = Self::command().get_matches();
        let config = Self::from_arg_matches(&matches)?;
        Ok((config, matches))
    }

    /// Like [`from_command_line`](Self::from_command_line), over `args`
    pub fn from_args<I, T>(args: I) -> Result<(Self, ArgMatches)>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let config = Self::from_arg_matches(&matches)?;
        Ok((config, matches))
    }

    /// Merge with the command line: every option given there overrides the
    /// file value, even when it equals the default.
    pub fn merge(&mut self, cli: Self, matches: &ArgMatches) {
        let given = |id: &str| matches.value_source(id) == Some(ValueSource::CommandLine);
        macro_rules! take_given {
            ($($field:ident),* $(,)?) => {
                $(
                    if given(stringify!($field)) {
                        self.$field = cli.$field;
                    }
                )*
            };
        }
        take_given!(
            trace,
            config,
            modules,
            with_plugins,
            disable_plugins,
            workers,
            max_depth,
            solver,
            solver_command,
            solver_timeout,
            dump_smt_directory,
            json_output,
            verbose,
            json_logs,
        );
    }

    /// Explicit config path, or `scry.toml` in the working directory if present
    pub fn resolve_config_path(&self) -> Option<PathBuf> {
        if let Some(config) = &self.config {
            Some(config.clone())
        } else {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                Some(default_path)
            } else {
                None
            }
        }
    }

    /// Detection module white list; empty means every registered module
    pub fn parse_modules(&self) -> Result<Vec<String>> {
        parse_name_list(&self.modules)
    }

    /// Instrumentation override list; `None` when no override was given
    pub fn parse_with_plugins(&self) -> Result<Option<Vec<String>>> {
        let names = parse_name_list(&self.with_plugins)?;
        Ok(if names.is_empty() { None } else { Some(names) })
    }

    pub fn parse_disabled_plugins(&self) -> Result<Vec<String>> {
        parse_name_list(&self.disable_plugins)
    }

    pub fn solver_timeout_ms(&self) -> Result<u64> {
        parse_time(&self.solver_timeout, "ms")
            .with_context(|| format!("Invalid solver timeout: {}", self.solver_timeout))
    }

    /// Whether queries go to an external solver process instead of the
    /// in-process z3 bridge
    pub fn uses_external_solver(&self) -> bool {
        !self.solver_command.is_empty() || self.solver != "z3"
    }

    /// Resolve solver command from solver name or explicit command
    pub fn resolved_solver_command(&self) -> Result<Vec<String>> {
        if !self.solver_command.is_empty() {
            return Ok(shell_words::split(&self.solver_command)?);
        }

        get_solver_command(&self.solver)
    }

    pub fn get_workers(&self) -> usize {
        self.workers.max(1)
    }
}

/// TOML configuration structure (for parsing from file)
#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    global: HashMap<String, toml::Value>,
}

impl TomlConfig {
    fn to_config(self) -> Result<Config> {
        let mut config = Config::default();

        for (key, value) in self.global {
            // Convert kebab-case to snake_case
            let key = key.replace('-', "_");

            match key.as_str() {
                "trace" => config.trace = Some(parse_toml_path(&value)?),
                "modules" => config.modules = parse_toml_list(&value)?,
                "with_plugins" => config.with_plugins = parse_toml_list(&value)?,
                "disable_plugins" => config.disable_plugins = parse_toml_list(&value)?,
                "workers" => config.workers = parse_toml_usize(&value)?,
                "max_depth" => config.max_depth = parse_toml_usize(&value)?,
                "solver" => config.solver = parse_toml_string(&value)?,
                "solver_command" => config.solver_command = parse_toml_string(&value)?,
                "solver_timeout" => config.solver_timeout = parse_toml_time(&value)?,
                "dump_smt_directory" => config.dump_smt_directory = Some(parse_toml_path(&value)?),
                "json_output" => config.json_output = Some(parse_toml_path(&value)?),
                "verbose" => config.verbose = parse_toml_u8(&value)?,
                "json_logs" => config.json_logs = parse_toml_bool(&value)?,
                _ => {
                    // Ignore unknown fields (allows forward compatibility)
                }
            }
        }

        Ok(config)
    }
}

// TOML parsing helpers
fn parse_toml_string(value: &toml::Value) -> Result<String> {
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Expected string, got {:?}", value))
}

fn parse_toml_bool(value: &toml::Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| anyhow::anyhow!("Expected bool, got {:?}", value))
}

fn parse_toml_usize(value: &toml::Value) -> Result<usize> {
    value
        .as_integer()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| anyhow::anyhow!("Expected usize, got {:?}", value))
}

fn parse_toml_u8(value: &toml::Value) -> Result<u8> {
    value
        .as_integer()
        .and_then(|i| u8::try_from(i).ok())
        .ok_or_else(|| anyhow::anyhow!("Expected u8, got {:?}", value))
}

fn parse_toml_path(value: &toml::Value) -> Result<PathBuf> {
    Ok(PathBuf::from(parse_toml_string(value)?))
}

/// Lists may be written as an array or as a comma-separated string
fn parse_toml_list(value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::Array(items) => Ok(items
            .iter()
            .map(parse_toml_string)
            .collect::<Result<Vec<_>>>()?
            .join(",")),
        _ => parse_toml_string(value),
    }
}

/// Integers are milliseconds; strings may carry a unit
fn parse_toml_time(value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::Integer(ms) => Ok(format!("{}ms", ms)),
        _ => parse_toml_string(value),
    }
}

fn parse_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Comma-separated plugin or module identifiers
pub fn parse_name_list(s: &str) -> Result<Vec<String>> {
    let name_regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_\-]*$")?;
    let names = parse_csv(s);
    if let Some(bad) = names.iter().find(|name| !name_regex.is_match(name)) {
        return Err(anyhow::anyhow!("Invalid identifier in list: {}", bad));
    }
    Ok(names)
}

/// Parse time string with unit support
/// Supports: "100ms", "5s", "2m", "1h", or plain numbers (default_unit)
pub fn parse_time(time_str: &str, default_unit: &str) -> Result<u64> {
    let time_str = time_str.trim();

    let (num_str, unit) = ["ms", "s", "m", "h"]
        .iter()
        .find_map(|unit| time_str.strip_suffix(*unit).map(|num| (num.trim(), *unit)))
        .unwrap_or((time_str, default_unit));

    let millis_per_unit: u64 = match unit {
        "ms" => 1,
        "s" => 1000,
        "m" => 60 * 1000,
        "h" => 60 * 60 * 1000,
        _ => return Err(anyhow::anyhow!("Invalid default unit: {}", default_unit)),
    };

    num_str
        .parse::<u64>()?
        .checked_mul(millis_per_unit)
        .ok_or_else(|| anyhow::anyhow!("Time value out of range: {}", time_str))
}

/// Command line of an external solver that reads an SMT-LIB file argument
pub fn get_solver_command(solver: &str) -> Result<Vec<String>> {
    match solver {
        "z3" => Ok(vec!["z3".to_string(), "-smt2".to_string()]),
        "yices" => Ok(vec!["yices-smt2".to_string()]),
        "cvc5" => Ok(vec!["cvc5".to_string(), "--produce-models".to_string()]),
        "bitwuzla" => Ok(vec!["bitwuzla".to_string(), "--produce-models".to_string()]),
        _ => Err(anyhow::anyhow!("Unknown solver: {}", solver)),
    }
}
