//! Common functionality for ELCI, a builder of regionalised electricity life cycle inventories.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod aggregation;
pub mod allocation;
pub mod cli;
pub mod distribution;
pub mod error;
pub mod facility;
pub mod flow;
pub mod id;
pub mod input;
pub mod log;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod quantity;
pub mod region;
pub mod regionalisation;
pub mod settings;
pub mod source;
pub mod units;

#[cfg(test)]
mod fixture;

/// Get the path to the directory where ELCI's configuration files are stored
pub fn get_elci_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        // No platform config dir, so fall back on the current directory
        return PathBuf::new();
    };
    config_dir.push("elci");

    config_dir
}
