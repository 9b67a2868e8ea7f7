//! # qface
//!
//! Generates code from QFace interface documents using a YAML rule
//! document and a directory of templates.
//!
//! ```bash
//! qface --rules templates/rules.yaml --target out interfaces/
//! ```
//!
//! Defaults may be kept in a `qface.toml` next to the project; flags win.

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process;

mod config;
mod generate;
mod telemetry;
mod ui;
mod watch;

use config::{QfaceConfig, Settings};

#[derive(Parser, Debug)]
#[command(name = "qface")]
#[command(about = "Generate code from QFace interface documents", long_about = None)]
#[command(version)]
pub struct Cli {
    /// QFace documents or directories to parse
    #[arg(value_name = "SOURCE")]
    pub sources: Vec<PathBuf>,

    #[arg(long, env = "QFACE_RULES", value_name = "PATH")]
    pub rules: Option<PathBuf>,

    #[arg(long, env = "QFACE_TARGET", value_name = "DIRECTORY")]
    pub target: Option<PathBuf>,

    /// Auto reload script on changes
    #[arg(long, overrides_with = "no_reload")]
    pub reload: bool,

    #[arg(long, overrides_with = "reload", hide = true)]
    pub no_reload: bool,

    /// Add extra scaffolding code
    #[arg(long, overrides_with = "no_scaffold")]
    pub scaffold: bool,

    #[arg(long, overrides_with = "scaffold", hide = true)]
    pub no_scaffold: bool,

    /// Additional directory to watch in reload mode
    #[arg(long, value_name = "DIRECTORY")]
    pub watch: Vec<PathBuf>,

    /// Enable a feature for `when` gates in rule documents
    #[arg(
        long = "feature",
        env = "QFACE_FEATURES",
        value_name = "TEXT",
        value_delimiter = ','
    )]
    pub features: Vec<String>,

    /// run script after generation
    #[arg(long, value_name = "TEXT")]
    pub run: Option<String>,

    /// forces overwriting of files
    #[arg(long, overrides_with = "no_force")]
    pub force: bool,

    #[arg(long, overrides_with = "force", hide = true)]
    pub no_force: bool,

    /// YAML filter document to load
    #[arg(long, value_name = "PATH")]
    pub filters: Option<PathBuf>,

    /// Path to qface.toml configuration file
    #[arg(short, long, default_value = "qface.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = QfaceConfig::load_optional(&cli.config)?;
    let settings = Settings::resolve(&cli, config)?;
    tracing::debug!(?settings, "resolved settings");

    let report = generate::generate(&settings)?;
    if settings.reload {
        ui::print_summary(&report);
        return watch::watch(&settings);
    }
    if report.aborted {
        anyhow::bail!("Rule document {} could not be processed", settings.rules.display());
    }
    if !report.is_success() {
        ui::print_summary(&report);
    }
    Ok(())
}
