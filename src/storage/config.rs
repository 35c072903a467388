//! Configuration strings for tables and cursors.
//!
//! Both use the same list syntax: comma separated entries which are either `key=value`,
//! `key=(a,b,...)` or a bare `key` meaning `key=true`.

use super::{CursorError, Result};

/// One parsed configuration entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Str(String),
    List(Vec<String>),
}

/// Splits a configuration string into `(key, value)` pairs, keeping their order.
pub fn parse_config(input: &str) -> Result<Vec<(String, ConfigValue)>> {
    let mut entries = Vec::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let end = rest.find([',', '=']).unwrap_or(rest.len());
        let key = rest[..end].trim();
        if key.is_empty() {
            return Err(CursorError::config(format!("missing key in `{input}`")));
        }

        rest = &rest[end..];
        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            if let Some(list) = after_eq.strip_prefix('(') {
                let close = list
                    .find(')')
                    .ok_or_else(|| CursorError::config(format!("unclosed list in `{input}`")))?;
                let items = list[..close]
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                rest = &list[close + 1..];
                ConfigValue::List(items)
            } else {
                let end = after_eq.find(',').unwrap_or(after_eq.len());
                let value = after_eq[..end].trim();
                rest = &after_eq[end..];
                ConfigValue::Str(value.to_string())
            }
        } else {
            ConfigValue::Str("true".to_string())
        };

        entries.push((key.to_string(), value));

        rest = rest.trim_start();
        match rest.strip_prefix(',') {
            Some(after_comma) => rest = after_comma.trim_start(),
            None if rest.is_empty() => (),
            None => return Err(CursorError::config(format!("expected `,` in `{input}`"))),
        }
    }

    Ok(entries)
}

fn parse_bool(key: &str, value: &ConfigValue) -> Result<bool> {
    match value {
        ConfigValue::Str(s) => match s.as_str() {
            "true" | "1" | "on" | "yes" => Ok(true),
            "false" | "0" | "off" | "no" => Ok(false),
            other => Err(CursorError::config(format!(
                "`{key}` expects a boolean, got `{other}`"
            ))),
        },
        ConfigValue::List(_) => Err(CursorError::config(format!(
            "`{key}` expects a boolean, got a list"
        ))),
    }
}

fn parse_str(key: &str, value: ConfigValue) -> Result<String> {
    match value {
        ConfigValue::Str(s) if !s.is_empty() => Ok(s),
        _ => Err(CursorError::config(format!("`{key}` expects a format string"))),
    }
}

/// Schema of a table, given when the table is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Key format; defaults to raw bytes (`u`)
    pub key_format: String,
    /// Value format; defaults to raw bytes (`u`)
    pub value_format: String,
    /// Names of the key columns followed by the value columns; empty when unnamed
    pub columns: Vec<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            key_format: "u".to_string(),
            value_format: "u".to_string(),
            columns: Vec::new(),
        }
    }
}

impl TableConfig {
    pub fn parse(input: &str) -> Result<Self> {
        let mut cfg = Self::default();

        for (key, value) in parse_config(input)? {
            match key.as_str() {
                "key_format" => cfg.key_format = parse_str(&key, value)?,
                "value_format" => cfg.value_format = parse_str(&key, value)?,
                "columns" => match value {
                    ConfigValue::List(cols) => cfg.columns = cols,
                    ConfigValue::Str(_) => {
                        return Err(CursorError::config("`columns` expects a list"))
                    }
                },
                other => {
                    return Err(CursorError::config(format!(
                        "unknown table option `{other}`"
                    )))
                }
            }
        }

        Ok(cfg)
    }
}

/// Per-cursor behaviour chosen at open time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorConfig {
    /// Insert on an existing key replaces it instead of failing with a duplicate key error
    pub overwrite: bool,
    /// Insert on a record number table always allocates a fresh record number
    pub append: bool,
    /// Insert, update and remove are rejected
    pub readonly: bool,
}

impl CursorConfig {
    pub fn parse(input: &str) -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply(input)?;
        Ok(cfg)
    }

    /// Applies the options named in `input` on top of the current values.
    ///
    /// Nothing changes unless the whole string is valid.
    pub fn apply(&mut self, input: &str) -> Result<()> {
        let mut cfg = *self;

        for (key, value) in parse_config(input)? {
            match key.as_str() {
                "overwrite" => cfg.overwrite = parse_bool(&key, &value)?,
                "append" => cfg.append = parse_bool(&key, &value)?,
                "readonly" => cfg.readonly = parse_bool(&key, &value)?,
                other => {
                    return Err(CursorError::config(format!(
                        "unknown cursor option `{other}`"
                    )))
                }
            }
        }

        *self = cfg;
        Ok(())
    }
}
