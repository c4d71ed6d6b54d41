//! Text export and import of serde models in JSON or YAML.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::path::validate_file;

/// Text formats a model can be exported to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseFormat {
    /// JSON, pretty printed.
    Json,
    /// YAML.
    #[default]
    Yaml,
}

impl ParseFormat {
    /// Accepted file suffixes.
    #[must_use]
    pub fn suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Json => &[".json", ".js"],
            Self::Yaml => &[".yaml", ".yml"],
        }
    }

    /// Format for a file, based on its suffix.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let suffix = format!(".{}", path.extension()?.to_string_lossy().to_lowercase());
        [Self::Json, Self::Yaml]
            .into_iter()
            .find(|format| format.suffixes().contains(&suffix.as_str()))
    }

    fn resolve(path: &Path, format: Option<Self>) -> Result<Self> {
        format
            .or_else(|| Self::from_path(path))
            .ok_or_else(|| Error::path(path, "can't tell the format from the file suffix"))
    }
}

impl FromStr for ParseFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "js" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(Error::invalid_value(s, "expected json or yaml")),
        }
    }
}

impl fmt::Display for ParseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}

/// Models that can be written to and read from JSON or YAML text.
///
/// Implemented for every serde type.
pub trait ParseModel: Serialize + DeserializeOwned {
    /// Text representation in `format`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export(&self, format: ParseFormat) -> Result<String> {
        Ok(match format {
            ParseFormat::Json => serde_json::to_string_pretty(self)?,
            ParseFormat::Yaml => serde_yaml::to_string(self)?,
        })
    }

    /// Write the model to `path`. The format is taken from the suffix when
    /// not given.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid for the format, or on
    /// serialization or I/O failures.
    fn export_file(&self, path: &Path, format: Option<ParseFormat>) -> Result<String> {
        let format = ParseFormat::resolve(path, format)?;
        validate_file(path, false, format.suffixes())?;
        let text = self.export(format)?;
        fs::write(path, &text)?;
        Ok(text)
    }

    /// Parse the model from text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not describe the model.
    fn parse_str(text: &str, format: ParseFormat) -> Result<Self> {
        Ok(match format {
            ParseFormat::Json => serde_json::from_str(text)?,
            ParseFormat::Yaml => serde_yaml::from_str(text)?,
        })
    }

    /// Parse the model from a file. The format is taken from the suffix when
    /// not given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, has an unexpected suffix or
    /// does not describe the model.
    fn parse_file(path: &Path, format: Option<ParseFormat>) -> Result<Self> {
        let format = ParseFormat::resolve(path, format)?;
        validate_file(path, true, format.suffixes())?;
        let text = fs::read_to_string(path)?;
        Self::parse_str(&text, format)
    }
}

impl<T: Serialize + DeserializeOwned> ParseModel for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Board {
        name: String,
        flash_kb: u32,
        serial: Vec<String>,
    }

    fn board() -> Board {
        Board {
            name: "nucleo-f401re".to_string(),
            flash_kb: 512,
            serial: vec!["/dev/ttyACM0".to_string()],
        }
    }

    #[test]
    fn test_export_parse_each_format() {
        for format in [ParseFormat::Json, ParseFormat::Yaml] {
            let text = board().export(format).unwrap();
            assert!(text.contains("nucleo-f401re"));
            assert_eq!(Board::parse_str(&text, format).unwrap(), board());
        }
    }

    #[test]
    fn test_file_format_from_suffix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["board.json", "board.yml"] {
            let path = dir.path().join(name);
            board().export_file(&path, None).unwrap();
            assert_eq!(Board::parse_file(&path, None).unwrap(), board());
        }
    }

    #[test]
    fn test_suffix_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.txt");
        assert!(board().export_file(&path, None).is_err());
        assert!(board()
            .export_file(&path, Some(ParseFormat::Json))
            .unwrap_err()
            .is_path_error());
    }

    #[test]
    fn test_parse_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Board::parse_file(&dir.path().join("none.yaml"), None).unwrap_err();
        assert!(err.is_path_error());
    }

    #[test]
    fn test_parse_invalid_content() {
        let err = Board::parse_str("{\"name\": 1}", ParseFormat::Json).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<ParseFormat>().unwrap(), ParseFormat::Json);
        assert_eq!("yml".parse::<ParseFormat>().unwrap(), ParseFormat::Yaml);
        assert!("toml".parse::<ParseFormat>().is_err());
        assert_eq!(ParseFormat::from_path(Path::new("a/b.JS")), Some(ParseFormat::Json));
        assert_eq!(ParseFormat::from_path(Path::new("a/b")), None);
    }
}
