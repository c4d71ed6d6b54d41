//! Three-part version numbers (`major.minor.build`).
//!
//! Firmware projects often put a VCS hash in the build field, so the build
//! part can be read and printed as hex.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the build number is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildFormat {
    /// Base 10.
    #[default]
    Decimal,
    /// Base 16, lower case, without prefix.
    Hex,
}

/// A `major.minor.build` version.
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Major number.
    pub major: u32,
    /// Minor number.
    pub minor: u32,
    /// Build number.
    pub build: u32,
    /// Display format of the build number.
    #[serde(default)]
    pub build_format: BuildFormat,
}

impl Default for Version {
    fn default() -> Self {
        Self::new(99, 0, 0)
    }
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(([0-9]*\.){2,}([a-z0-9]+))").expect("Invalid regex pattern")
    })
}

fn hex_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^(0x)?([a-f0-9]+)$").expect("Invalid regex pattern"))
}

impl Version {
    /// Create a version with a decimal build number.
    #[must_use]
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            build,
            build_format: BuildFormat::Decimal,
        }
    }

    /// Same version, printed with a hex build number.
    #[must_use]
    pub const fn with_hex_build(mut self) -> Self {
        self.build_format = BuildFormat::Hex;
        self
    }

    /// Find and parse the first version in `text`.
    ///
    /// A build made of digits is decimal. Any other build is read as hex if it
    /// looks like hex, otherwise it becomes 0 (so `1.2.X` is `1.2.0`).
    ///
    /// # Errors
    ///
    /// Returns an error if `text` holds no `major.minor.build` sequence.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with(text, BuildFormat::Decimal)
    }

    /// Like [`Version::parse`], but the build is always hex.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` holds no `major.minor.build` sequence.
    pub fn parse_hex_build(text: &str) -> Result<Self> {
        Self::parse_with(text, BuildFormat::Hex)
    }

    fn parse_with(text: &str, format: BuildFormat) -> Result<Self> {
        let found = version_pattern()
            .find(text.trim())
            .ok_or_else(|| Error::version(text, "no version number found"))?;

        let parts: Vec<&str> = found.as_str().split('.').collect();
        let [major, minor, build] = parts.as_slice() else {
            return Err(Error::version(text, "expected exactly three components"));
        };
        let number = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| Error::version(text, format!("'{part}' is not a number")))
        };

        let build = match format {
            BuildFormat::Decimal if build.bytes().all(|b| b.is_ascii_digit()) => number(build)?,
            _ => parse_hex(build),
        };
        Ok(Self {
            major: number(major)?,
            minor: number(minor)?,
            build,
            build_format: format,
        })
    }

    /// Apply a bump request.
    ///
    /// `major` and `minor` increment the matching field. `M.m` (optionally
    /// `M.m.b`, the build is ignored) sets major and minor explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error for any other request.
    pub fn bump(&mut self, request: &str) -> Result<()> {
        match request.trim().to_ascii_lowercase().as_str() {
            "major" => self.major += 1,
            "minor" => self.minor += 1,
            other => {
                let parts: Vec<&str> = other.split('.').collect();
                let valid = (2..=3).contains(&parts.len())
                    && parts
                        .iter()
                        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
                if !valid {
                    return Err(Error::version(
                        request,
                        "bump must be 'major', 'minor' or 'M.m'",
                    ));
                }
                let field = |part: &str| {
                    part.parse::<u32>()
                        .map_err(|e| Error::version(request, e.to_string()))
                };
                self.major = field(parts[0])?;
                self.minor = field(parts[1])?;
            }
        }
        Ok(())
    }

    /// `major.minor` without the build.
    #[must_use]
    pub fn short(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    fn key(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.build)
    }
}

fn parse_hex(build: &str) -> u32 {
    hex_pattern()
        .captures(build)
        .and_then(|caps| u32::from_str_radix(&caps[2], 16).ok())
        .unwrap_or(0)
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.build_format {
            BuildFormat::Decimal => write!(f, "{}.{}.{}", self.major, self.minor, self.build),
            BuildFormat::Hex => write!(f, "{}.{}.{:x}", self.major, self.minor, self.build),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failures() {
        for text in ["", "1", "1.0", "version", "1.2.3.4"] {
            assert!(Version::parse(text).is_err(), "'{text}' should fail");
        }
    }

    #[test]
    fn test_parse_success() {
        let cases = [
            ("99.0.abcd", true, "99.0.abcd"),
            ("99.0.1234", false, "99.0.1234"),
            ("99.0.X", false, "99.0.0"),
            ("99.0.X", true, "99.0.0"),
        ];
        for (text, hex, expected) in cases {
            let version = if hex {
                Version::parse_hex_build(text)
            } else {
                Version::parse(text)
            }
            .unwrap();
            assert_eq!(version.to_string(), expected, "{text}");
        }
    }

    #[test]
    fn test_parse_embedded() {
        let version = Version::parse("firmware v1.2.3 (release)").unwrap();
        assert_eq!(version, Version::new(1, 2, 3));
    }

    #[test]
    fn test_parse_non_digit_build_as_hex() {
        let version = Version::parse("1.2.0x1F").unwrap();
        assert_eq!(version.build, 0x1F);
        assert_eq!(version.build_format, BuildFormat::Decimal);
        assert_eq!(version.to_string(), "1.2.31");
    }

    #[test]
    fn test_default() {
        assert_eq!(Version::default().to_string(), "99.0.0");
    }

    #[test]
    fn test_bump() {
        let mut version = Version::new(1, 2, 3);
        version.bump("minor").unwrap();
        assert_eq!(version, Version::new(1, 3, 3));
        version.bump("MAJOR").unwrap();
        assert_eq!(version, Version::new(2, 3, 3));
        version.bump("4.5").unwrap();
        assert_eq!(version, Version::new(4, 5, 3));
        version.bump("6.7.8").unwrap();
        assert_eq!(version, Version::new(6, 7, 3));
    }

    #[test]
    fn test_bump_invalid() {
        let mut version = Version::new(1, 2, 3);
        for request in ["patch", "1", "1.", "1.2.3.4", "a.b"] {
            assert!(version.bump(request).is_err(), "'{request}' should fail");
        }
        assert_eq!(version, Version::new(1, 2, 3));
    }

    #[test]
    fn test_ordering_ignores_format() {
        assert!(Version::new(1, 2, 3) < Version::new(1, 3, 0));
        assert_eq!(Version::new(1, 2, 3), Version::new(1, 2, 3).with_hex_build());
    }

    #[test]
    fn test_serde() {
        let version = Version::new(1, 2, 3);
        let json = serde_json::to_string(&version).unwrap();
        assert!(json.contains("\"major\":1"));
        let back: Version = serde_json::from_str(r#"{"major":1,"minor":2,"build":3}"#).unwrap();
        assert_eq!(back, version);
    }
}
