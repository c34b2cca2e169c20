//! Byte sizes: parsing config values like `"50G"` and formatting for humans.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const KIB: f64 = 1024.0;

/// A size as written in the config file: either raw bytes or a string with
/// a binary unit suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl SizeValue {
    pub fn to_bytes(&self) -> Result<u64, CoreError> {
        match self {
            Self::Bytes(b) => Ok(*b),
            Self::Text(s) => parse_size(s),
        }
    }
}

/// Parse `"512"`, `"512B"`, `"64K"`, `"1.5G"`, `"2TiB"` into bytes.
///
/// Units are binary (K = 1024). Case-insensitive.
pub fn parse_size(input: &str) -> Result<u64, CoreError> {
    let s = input.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| CoreError::Validation(format!("Invalid size '{input}'")))?;

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "K" | "KB" | "KIB" => KIB,
        "M" | "MB" | "MIB" => KIB.powi(2),
        "G" | "GB" | "GIB" => KIB.powi(3),
        "T" | "TB" | "TIB" => KIB.powi(4),
        other => {
            return Err(CoreError::Validation(format!(
                "Invalid size unit '{other}' in '{input}'. Use B, K, M, G or T"
            )))
        }
    };

    let bytes = value * multiplier;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(CoreError::Validation(format!("Size out of range: '{input}'")));
    }
    Ok(bytes.round() as u64)
}

/// Human-readable byte formatting.
pub fn format_bytes(bytes: u64) -> String {
    const MB: f64 = KIB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;

    let b = bytes as f64;
    if b >= TB {
        format!("{:.2} TB", b / TB)
    } else if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KIB {
        format!("{:.2} KB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}
