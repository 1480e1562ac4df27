//=====================================================
// File: main.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: sciblock CLI entry point
// Objective: Run data and plot snippets from files, printing JSON results on
//            stdout and diagnostics on stderr
//=====================================================

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

use sciblock::interpreter::value::{json_to_value, value_to_json};
use sciblock::{BlockError, Config, DataBlock, Fields, PlotBlock};

const LOG_ENV: &str = "SCIBLOCK_LOG";

#[derive(Parser, Debug)]
#[command(name = "sciblock", about = "Run data and plot snippets with line-accurate diagnostics")]
pub struct Args {
    /// Config file (defaults to $SCIBLOCK_CONFIG, then the user config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a snippet that sets `result` and print the mapping as JSON.
    Data(BlockArgs),
    /// Run a drawing snippet and print the captured image as JSON.
    Plot(PlotArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct BlockArgs {
    /// Snippet source file, or `-` for stdin.
    pub code: PathBuf,

    /// JSON object of prior fields visible to the snippet.
    #[arg(long)]
    pub fields: Option<PathBuf>,

    /// Virtual identifier the snippet is registered under.
    #[arg(long = "virtual-id")]
    pub virtual_id: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlotArgs {
    #[command(flatten)]
    pub block: BlockArgs,

    /// Also write the raw image to this path.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Hand the figure to the interactive display as well.
    #[arg(long)]
    pub show: bool,
}

fn main() -> Result<ExitCode> {
    install_tracing();
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    match args.command {
        Command::Data(cmd) => {
            apply_overrides(&mut config, &cmd);
            run_data(&config, &cmd)
        }
        Command::Plot(cmd) => {
            apply_overrides(&mut config, &cmd.block);
            if cmd.show {
                config.show_plots = true;
            }
            run_plot(&config, &cmd)
        }
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn apply_overrides(config: &mut Config, args: &BlockArgs) {
    if let Some(virtual_id) = &args.virtual_id {
        config.virtual_id = virtual_id.clone();
    }
}

fn run_data(config: &Config, args: &BlockArgs) -> Result<ExitCode> {
    let code = read_code(&args.code)?;
    let prior = read_fields(args.fields.as_deref())?;
    match DataBlock::from_config(config).produce_data(&prior, &code) {
        Ok(fields) => {
            let json: serde_json::Map<String, JsonValue> = fields
                .iter()
                .map(|(name, value)| (name.clone(), value_to_json(value)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&JsonValue::Object(json))?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Ok(report(&err)),
    }
}

fn run_plot(config: &Config, args: &PlotArgs) -> Result<ExitCode> {
    let code = read_code(&args.block.code)?;
    let prior = read_fields(args.block.fields.as_deref())?;
    match PlotBlock::from_config(config).produce_plot(&prior, &code) {
        Ok(output) => {
            if let Some(path) = &args.out {
                fs::write(path, &output.image.data)
                    .with_context(|| format!("failed to write image to {}", path.display()))?;
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Ok(report(&err)),
    }
}

fn report(err: &BlockError) -> ExitCode {
    eprintln!("{}", err);
    ExitCode::from(err.exit_code() as u8)
}

fn read_code(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut code = String::new();
        io::stdin()
            .read_to_string(&mut code)
            .context("failed to read snippet from stdin")?;
        return Ok(code);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read snippet {}", path.display()))
}

fn read_fields(path: Option<&Path>) -> Result<Fields> {
    let Some(path) = path else {
        return Ok(Fields::new());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read fields {}", path.display()))?;
    let json: JsonValue = serde_json::from_str(&text)
        .with_context(|| format!("fields file {} is not valid JSON", path.display()))?;
    let JsonValue::Object(map) = json else {
        bail!("fields file {} must contain a JSON object", path.display());
    };
    Ok(map
        .iter()
        .map(|(name, value)| (name.clone(), json_to_value(value)))
        .collect())
}
