use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::Error;

pub type Section = BTreeMap<String, String>;

/// Layered key-value settings: sections of `key = value` pairs.
///
/// Read once from the settings file; each `Workflow` holds its own copy,
/// so changes made while building one graph are not seen by others.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    sections: BTreeMap<String, Section>,
}

impl Config {
    /// Parse settings file text. Later duplicate keys override earlier ones.
    pub fn parse(text: &str) -> Result<Self> {
        let mut config = Self::default();
        for section in syntax::parse(text)? {
            for (key, value) in section.entries {
                config.set(section.name, key, value);
            }
        }
        Ok(config)
    }

    /// Read and parse a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("while reading settings file {:?}", path))?;
        Self::parse(&text).with_context(|| format!("while parsing settings file {:?}", path))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, section: &str, key: &str, fallback: &'a str) -> &'a str {
        self.get(section, key).unwrap_or(fallback)
    }

    /// Get a value that has no fallback.
    pub fn require(&self, section: &str, key: &str) -> Result<&str, Error> {
        self.get(section, key).ok_or_else(|| Error::MissingConfig {
            section: section.to_owned(),
            key: key.to_owned(),
        })
    }

    pub fn get_float(&self, section: &str, key: &str, fallback: f64) -> Result<f64, Error> {
        self.get_parsed(section, key, fallback, "a number", |v| v.parse().ok())
    }

    pub fn get_int(&self, section: &str, key: &str, fallback: i64) -> Result<i64, Error> {
        self.get_parsed(section, key, fallback, "an integer", |v| v.parse().ok())
    }

    pub fn get_bool(&self, section: &str, key: &str, fallback: bool) -> Result<bool, Error> {
        self.get_parsed(section, key, fallback, "a boolean", parse_bool)
    }

    /// Get a path, made absolute against the current dir if relative.
    pub fn get_path(&self, section: &str, key: &str, fallback: &str) -> Result<PathBuf> {
        let path = Path::new(self.get_or(section, key, fallback));
        Ok(std::path::absolute(path)?)
    }

    /// Like `get_path`, but without a fallback.
    pub fn require_path(&self, section: &str, key: &str) -> Result<PathBuf> {
        let path = Path::new(self.require(section, key)?);
        Ok(std::path::absolute(path)?)
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_owned())
            .or_default()
            .insert(key.to_owned(), value.into());
    }

    pub fn sections(&self) -> &BTreeMap<String, Section> {
        &self.sections
    }

    /// `[execution] parameterize_dirs`: keep long parameterization dir names verbatim.
    pub fn parameterize_dirs(&self) -> Result<bool, Error> {
        self.get_bool("execution", "parameterize_dirs", false)
    }

    fn get_parsed<T>(
        &self,
        section: &str,
        key: &str,
        fallback: T,
        expected: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, Error> {
        match self.get(section, key) {
            None => Ok(fallback),
            Some(value) => parse(value).ok_or_else(|| Error::InvalidConfigValue {
                section: section.to_owned(),
                key: key.to_owned(),
                value: value.to_owned(),
                expected,
            }),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "y" | "yes" | "t" | "true" | "on" => Some(true),
        "0" | "n" | "no" | "f" | "false" | "off" => Some(false),
        _ => None,
    }
}
