//! treeconf CLI - load, merge and inspect configuration files
//!
//! Usage:
//!   treeconf dump base.yaml prod.yaml --resolve
//!   treeconf get config.yaml database.host --set database.host=db1
//!   treeconf check config.yaml

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use treeconf_core::{merge, Config, EnumRepr, Value};

/// treeconf - Typed, mergeable configuration trees
#[derive(Parser)]
#[command(name = "treeconf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge configuration files and print the result
    Dump {
        /// Configuration file(s), merged left to right
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Override a value after merging (key=value, repeatable)
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,

        /// Resolve interpolations
        #[arg(short, long)]
        resolve: bool,

        /// Output format: yaml, json
        #[arg(short, long, default_value = "yaml")]
        format: String,

        /// Write to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Get a specific value from the merged configuration
    Get {
        /// Configuration file(s), merged left to right
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Path to the value (e.g., database.host)
        path: String,

        /// Override a value after merging (key=value, repeatable)
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,

        /// Print the raw value without resolving interpolations
        #[arg(long)]
        raw: bool,

        /// Output format: text, json, yaml
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Default value if key not found
        #[arg(short, long)]
        default: Option<String>,
    },

    /// Load, merge and fully resolve the files, reporting the first error
    Check {
        /// Configuration file(s) to check
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Override a value after merging (key=value, repeatable)
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },
}

/// Run the CLI with the given arguments
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Dump {
            files,
            overrides,
            resolve,
            format,
            output,
        } => cmd_dump(&files, &overrides, resolve, &format, output),

        Commands::Get {
            files,
            path,
            overrides,
            raw,
            format,
            default,
        } => cmd_get(&files, &path, &overrides, raw, &format, default),

        Commands::Check { files, overrides } => cmd_check(&files, &overrides),
    }
}

/// Parse a YAML or JSON file into a value; the extension picks the format
fn read_file(path: &Path) -> Result<Value, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if ext == "json" {
        serde_json::from_str(&content).map_err(|e| format!("Invalid JSON in {}: {}", path.display(), e))
    } else {
        serde_yaml::from_str(&content).map_err(|e| format!("Invalid YAML in {}: {}", path.display(), e))
    }
}

/// Split a `key=value` override; the value is decoded as YAML flow data
fn parse_override(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Override '{}' is not of the form key=value", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Override '{}' has an empty key", raw));
    }
    let value = if value.is_empty() {
        Value::String(String::new())
    } else {
        serde_yaml::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
    };
    Ok((key.to_string(), value))
}

fn load_config(files: &[PathBuf], overrides: &[String]) -> Result<Config, String> {
    let Some((first, rest)) = files.split_first() else {
        return Err("No configuration files specified".to_string());
    };

    let create = |path: &PathBuf| {
        read_file(path).and_then(|v| {
            Config::create(v).map_err(|e| format!("Failed to load {}: {}", path.display(), e))
        })
    };
    let base = create(first)?;
    let others = rest.iter().map(create).collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&Config> = others.iter().collect();
    let mut config = merge(&base, &refs).map_err(|e| format!("Failed to merge: {}", e))?;

    for raw in overrides {
        let (key, value) = parse_override(raw)?;
        config
            .update(&key, value)
            .map_err(|e| format!("Failed to apply override '{}': {}", raw, e))?;
    }
    Ok(config)
}

fn render(value: &Value, format: &str) -> Result<String, String> {
    match format {
        "json" => serde_json::to_string_pretty(value)
            .map(|s| s + "\n")
            .map_err(|e| e.to_string()),
        _ => serde_yaml::to_string(value).map_err(|e| e.to_string()),
    }
}

fn cmd_dump(
    files: &[PathBuf],
    overrides: &[String],
    resolve: bool,
    format: &str,
    output: Option<PathBuf>,
) -> ExitCode {
    let config = match load_config(files, overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::from(2);
        }
    };

    let result = config
        .to_value(resolve, EnumRepr::Name)
        .map_err(|e| e.to_string())
        .and_then(|v| render(&v, format));

    match result {
        Ok(content) => {
            if let Some(output_path) = output {
                if let Err(e) = std::fs::write(&output_path, &content) {
                    eprintln!("{}: {}", "Error writing file".red(), e);
                    return ExitCode::from(2);
                }
                eprintln!("{} Wrote to {}", "✓".green(), output_path.display());
            } else {
                print!("{}", content);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

/// Value at `path`: resolved through the config, or raw from its dump
fn lookup(config: &Config, path: &str, raw: bool) -> Result<Option<Value>, String> {
    if raw {
        let dump = config
            .to_value(false, EnumRepr::Name)
            .map_err(|e| e.to_string())?;
        return Ok(dump.get_path(path).ok().cloned());
    }
    match config.select(path).map_err(|e| e.to_string())? {
        Some(item) => item
            .to_value(EnumRepr::Name)
            .map(Some)
            .map_err(|e| e.to_string()),
        None => Ok(None),
    }
}

fn cmd_get(
    files: &[PathBuf],
    path: &str,
    overrides: &[String],
    raw: bool,
    format: &str,
    default: Option<String>,
) -> ExitCode {
    let config = match load_config(files, overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.red());
            return ExitCode::from(2);
        }
    };

    match lookup(&config, path, raw) {
        Ok(Some(value)) => {
            let text = match (format, &value) {
                ("json" | "yaml", _) => render(&value, format),
                (_, Value::Sequence(_) | Value::Mapping(_)) => render(&value, "yaml"),
                (_, scalar) => Ok(format!("{}\n", scalar)),
            };
            match text {
                Ok(text) => {
                    print!("{}", text);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    ExitCode::from(1)
                }
            }
        }
        Ok(None) => match default {
            Some(default_val) => {
                println!("{}", default_val);
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("{}: Path '{}' not found", "Error".red(), path);
                ExitCode::from(1)
            }
        },
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::from(1)
        }
    }
}

fn cmd_check(files: &[PathBuf], overrides: &[String]) -> ExitCode {
    let names: Vec<_> = files.iter().map(|f| f.display().to_string()).collect();
    let result = load_config(files, overrides).and_then(|config| {
        config
            .to_value(true, EnumRepr::Name)
            .map_err(|e| e.to_string())
    });

    match result {
        Ok(_) => {
            println!("{} {} is valid", "✓".green(), names.join(", "));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} Check failed\n", "✗".red());
            eprintln!("{}", e);
            ExitCode::from(1)
        }
    }
}
