//! Program logging.
//!
//! Log lines are tagged with the pipeline stage of the module which emitted them, so that a
//! warning can be traced back to the part of the run which raised it. Messages go to the console
//! and, for runs which write output, to two log files in the output folder: one with the whole run
//! and one with just the warnings and errors.
use crate::error::Stage;
use anyhow::{Context, Result, bail};
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use fern::{Dispatch, FormatCallback};
use log::{Level, LevelFilter, Record};
use std::borrow::Cow;
use std::env;
use std::fmt::{Arguments, Display};
use std::fs::File;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::OnceLock;

static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// The log level used when neither the environment nor `settings.toml` gives one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// The environment variable which overrides the configured log level
pub const LOG_LEVEL_ENV_VAR: &str = "ELCI_LOG_LEVEL";

/// The log file with every message from the run
pub const RUN_LOG_FILE_NAME: &str = "elci_run.log";

/// The log file with only warnings and errors
pub const WARNINGS_LOG_FILE_NAME: &str = "elci_warnings.log";

/// Whether the program logger has been initialised
pub fn is_logger_initialised() -> bool {
    LOGGER_INIT.get().is_some()
}

/// Initialise the program logger.
///
/// The level is taken from the `ELCI_LOG_LEVEL` environment variable if set, otherwise from
/// `settings.toml`. Log files are only created if `log_file_path` is given.
pub fn init(log_level_from_settings: Option<&str>, log_file_path: Option<&Path>) -> Result<()> {
    let log_level = choose_log_level(env::var(LOG_LEVEL_ENV_VAR).ok(), log_level_from_settings)?;

    let mut dispatch = Dispatch::new()
        .chain(
            console_sink(std::io::stdout().is_terminal())
                .filter(|metadata| metadata.level() > Level::Warn)
                .level(log_level)
                .chain(std::io::stdout()),
        )
        .chain(
            console_sink(std::io::stderr().is_terminal())
                .level(log_level.min(LevelFilter::Warn))
                .chain(std::io::stderr()),
        );

    if let Some(log_file_path) = log_file_path {
        let create = |file_name| {
            let path = log_file_path.join(file_name);
            File::create(&path).with_context(|| format!("Could not create {}", path.display()))
        };
        dispatch = dispatch
            .chain(
                Dispatch::new()
                    .format(write_plain)
                    .level(log_level.max(LevelFilter::Info))
                    .chain(create(RUN_LOG_FILE_NAME)?),
            )
            .chain(
                Dispatch::new()
                    .format(write_plain)
                    .level(LevelFilter::Warn)
                    .chain(create(WARNINGS_LOG_FILE_NAME)?),
            );
    }

    dispatch.apply().context("Logger already initialised")?;
    let _ = LOGGER_INIT.set(());

    Ok(())
}

/// Pick the log level, preferring the environment's over the settings'
fn choose_log_level(from_env: Option<String>, from_settings: Option<&str>) -> Result<LevelFilter> {
    let name = from_env
        .as_deref()
        .or(from_settings)
        .unwrap_or(DEFAULT_LOG_LEVEL);
    parse_log_level(name)
}

/// Convert a log level name (in any case) to a [`LevelFilter`]
fn parse_log_level(log_level: &str) -> Result<LevelFilter> {
    let level = match log_level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        unknown => bail!("Unknown log level: {unknown}"),
    };

    Ok(level)
}

/// The pipeline stage whose work is done by the module at `target`
fn stage_for_target(target: &str) -> Option<Stage> {
    let module = target.strip_prefix("elci::")?;
    let stage = match module.split("::").next()? {
        "input" | "model" | "settings" => Stage::Configuration,
        "source" | "facility" | "flow" => Stage::Ingestion,
        "region" | "regionalisation" => Stage::Regionalisation,
        "allocation" | "aggregation" => Stage::Allocation,
        "distribution" => Stage::Distribution,
        "output" | "process" => Stage::Export,
        _ => return None,
    };

    Some(stage)
}

/// The tag shown for a record: its stage if it has one, otherwise its target
fn tag(target: &str) -> Cow<'_, str> {
    match stage_for_target(target) {
        Some(stage) => stage.to_string().into(),
        None => target.into(),
    }
}

fn write_line<T: Display>(out: FormatCallback, level: T, record: &Record, message: &Arguments) {
    let timestamp = Local::now().format("%H:%M:%S");
    let tag = tag(record.target());
    out.finish(format_args!("[{timestamp} {level} {tag}] {message}"));
}

fn write_plain(out: FormatCallback, message: &Arguments, record: &Record) {
    write_line(out, record.level(), record, message);
}

/// A console sink, colouring the level if writing to a terminal
fn console_sink(use_colour: bool) -> Dispatch {
    if !use_colour {
        return Dispatch::new().format(write_plain);
    }

    let colours = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);
    Dispatch::new().format(move |out, message, record| {
        write_line(out, colours.color(record.level()), record, message);
    })
}
