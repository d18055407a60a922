//! Common routines for handling input data.
use crate::error::RunError;
use crate::model::{Model, ModelConfig};
use anyhow::{Context, Result, ensure};
use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use std::fs;
use std::path::Path;

pub mod coproduct;
use coproduct::read_facility_outputs;
pub mod region;
use region::{read_facility_regions, read_regions};
pub mod trade;
use trade::{read_losses, read_trade};

/// Read a series of type `T`s from a CSV file.
///
/// Will raise an error if the file is empty.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    let vec = read_csv_internal(file_path)?;
    ensure!(!vec.is_empty(), "CSV file {} cannot be empty", file_path.display());

    Ok(vec.into_iter())
}

/// Read a series of type `T`s from a CSV file.
///
/// Returns an empty iterator if the file does not exist.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv_optional<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    if !file_path.exists() {
        return Ok(Vec::new().into_iter());
    }

    Ok(read_csv_internal(file_path)?.into_iter())
}

fn read_csv_internal<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let vec = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(file_path)
        .with_context(|| input_err_msg(file_path))?
        .into_deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| input_err_msg(file_path))?;

    Ok(vec)
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Convert any error raised while reading a model file into a [`RunError::Configuration`].
///
/// The full chain of causes is folded into the message so that nothing is lost.
pub fn configuration_error<P: AsRef<Path>>(file_path: P, err: &anyhow::Error) -> anyhow::Error {
    RunError::Configuration {
        path: file_path.as_ref().to_path_buf(),
        message: format!("{err:#}"),
    }
    .into()
}

/// Read an f64, checking that it is between 0 and 1
pub fn deserialise_proportion<'de, D>(deserialiser: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Deserialize::deserialize(deserialiser)?;
    if !(0.0..=1.0).contains(&value) {
        Err(serde::de::Error::custom("Value must be between 0 and 1"))?;
    }

    Ok(value)
}

/// Read an optional f64, checking that it is between 0 and 1 if present
pub fn deserialise_optional_proportion<'de, D>(deserialiser: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = Deserialize::deserialize(deserialiser)?;
    if value.is_some_and(|value| !(0.0..=1.0).contains(&value)) {
        Err(serde::de::Error::custom("Value must be between 0 and 1"))?;
    }

    Ok(value)
}

/// Read a model from the specified directory.
///
/// Any problem with the model files is reported as a [`RunError::Configuration`] naming the
/// offending file; no source data are read at this point.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
pub fn load_model<P: AsRef<Path>>(model_dir: P) -> Result<Model> {
    let model_dir = model_dir.as_ref();
    let config = ModelConfig::from_path(model_dir)?;

    let regions = read_regions(model_dir)?;
    config
        .validate_region_priority(&regions)
        .map_err(|err| configuration_error(model_dir.join(ModelConfig::FILE_NAME), &err))?;

    let facility_regions = read_facility_regions(model_dir, &regions)?;
    let trade = read_trade(model_dir, &regions)?;
    let losses = read_losses(model_dir, &regions)?;
    let facility_outputs = read_facility_outputs(model_dir)?;

    Ok(Model {
        model_path: model_dir.to_path_buf(),
        config,
        regions,
        facility_regions,
        trade,
        losses,
        facility_outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Record {
        id: String,
        #[serde(deserialize_with = "deserialise_proportion")]
        value: f64,
    }

    /// Create an example CSV file in dir_path
    fn create_csv_file(dir_path: &Path, contents: &str) -> std::path::PathBuf {
        let file_path = dir_path.join("test.csv");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{contents}").unwrap();
        file_path
    }

    #[test]
    fn test_read_csv() {
        let dir = tempdir().unwrap();
        let file_path = create_csv_file(dir.path(), "id,value\nhello, 0.5\nworld,1");
        let records: Vec<Record> = read_csv(&file_path).unwrap().collect();
        assert_eq!(
            records,
            &[
                Record {
                    id: "hello".to_string(),
                    value: 0.5,
                },
                Record {
                    id: "world".to_string(),
                    value: 1.0,
                }
            ]
        );

        // Empty file
        let file_path = create_csv_file(dir.path(), "id,value\n");
        assert!(read_csv::<Record>(&file_path).is_err());

        // Out of range proportion
        let file_path = create_csv_file(dir.path(), "id,value\nhello,1.5");
        assert!(read_csv::<Record>(&file_path).is_err());
    }

    #[test]
    fn test_read_csv_optional_missing_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("missing.csv");
        assert_eq!(read_csv_optional::<Record>(&file_path).unwrap().count(), 0);
    }

    #[test]
    fn test_read_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.toml");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "value = 1").unwrap();
        }

        #[derive(Debug, Deserialize, PartialEq)]
        struct Value {
            value: u32,
        }

        assert_eq!(read_toml::<Value>(&file_path).unwrap(), Value { value: 1 });
        assert!(read_toml::<Value>(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_configuration_error_keeps_cause() {
        let err = anyhow::anyhow!("bad value").context("Error reading model.toml");
        let err = configuration_error("model.toml", &err);
        assert_eq!(
            err.to_string(),
            "Invalid configuration in model.toml: Error reading model.toml: bad value"
        );
    }
}
