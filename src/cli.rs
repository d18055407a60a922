//! The command line interface for ELCI.
use crate::error::{RunReport, Stage};
use crate::input::load_model;
use crate::log;
use crate::output::{create_output_directory, get_output_dir};
use crate::pipeline;
use crate::settings::Settings;
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod example;
use example::ExampleSubcommands;
pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for ELCI.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the run command
#[derive(Args, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
    /// Directory in which downloaded sources are cached
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    /// Never download sources; use cached copies only
    #[arg(long)]
    pub offline: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Build and export the inventory for a model.
    Run {
        /// Path to the model directory.
        model_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Manage example models.
    Example {
        /// The available subcommands for managing example models.
        #[command(subcommand)]
        subcommand: ExampleSubcommands,
    },
    /// Validate a model.
    Validate {
        /// The path to the model directory.
        model_dir: PathBuf,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { model_dir, opts } => {
                handle_run_command(&model_dir, &opts, None)?;
            }
            Self::Example { subcommand } => subcommand.execute()?,
            Self::Validate { model_dir } => handle_validate_command(&model_dir, None)?,
            Self::Settings { subcommand } => subcommand.execute()?,
        }

        Ok(())
    }
}

/// Parse CLI arguments and start ELCI
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ elci --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Initialise the program logger, unless that has already been done in this process
fn init_logger(settings: &Settings, log_file_path: Option<&Path>) -> Result<()> {
    if log::is_logger_initialised() {
        return Ok(());
    }

    log::init(Some(settings.log_level.as_str()), log_file_path).context("Failed to initialise logging.")
}

/// Load the model at `model_path`, attributing any error to the configuration stage
fn load(model_path: &Path) -> Result<crate::model::Model> {
    load_model(model_path).with_context(|| Stage::Configuration.failure_message())
}

/// Handle the `run` command.
///
/// # Returns
///
/// The warnings raised during the run
pub fn handle_run_command(
    model_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<RunReport> {
    // Load program settings, if not provided
    let settings = if let Some(settings) = settings {
        settings
    } else {
        Settings::load().context("Failed to load settings.")?
    };

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(model_path)?;
        &pathbuf
    };

    let overwrite = create_output_directory(output_path, opts.overwrite || settings.overwrite)
        .with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    init_logger(&settings, Some(output_path))?;

    let model = load(model_path)?;
    info!("Loaded model from {}", model_path.display());
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    let cache = settings.source_cache(opts.cache_dir.as_deref(), opts.offline);
    let report = pipeline::run(&model, &cache, output_path)?;
    info!("Run complete with {} warnings", report.len());

    Ok(report)
}

/// Handle the `validate` command.
pub fn handle_validate_command(model_path: &Path, settings: Option<Settings>) -> Result<()> {
    // Load program settings, if not provided
    let settings = if let Some(settings) = settings {
        settings
    } else {
        Settings::load().context("Failed to load settings.")?
    };

    // We don't save log files when running the validate command
    init_logger(&settings, None)?;

    load(model_path)?;
    info!("Model validation successful!");

    Ok(())
}
