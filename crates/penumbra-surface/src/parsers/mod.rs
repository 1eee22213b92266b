//! File format parsers for figure-error and thickness-error data.
//!
//! Supported formats:
//! - [1D profile](profile): two columns, position and height
//! - [2D surface](surface): `nx ny` header, y grid, then `x h_1..h_ny` rows
//!
//! All positions and heights are in metres. Lines starting with `#` are
//! comments.

pub mod profile;
pub mod surface;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::field::FieldError;
use crate::profile::FigureErrorProfile;

/// Errors during figure-error file parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    FormatError { line: usize, message: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid sampled data: {0}")]
    InvalidData(#[from] FieldError),
}

/// Layout of a figure-error file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FigureErrorFormat {
    Profile1D,
    Surface2D,
}

impl std::str::FromStr for FigureErrorFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "profile" | "profile_1d" | "1d" => Ok(FigureErrorFormat::Profile1D),
            "surface" | "surface_2d" | "2d" => Ok(FigureErrorFormat::Surface2D),
            other => Err(ParseError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Read and parse a figure-error file.
pub fn load_figure_error(
    path: &Path,
    format: FigureErrorFormat,
) -> Result<FigureErrorProfile, ParseError> {
    let content = std::fs::read_to_string(path)?;
    log::debug!("Parsing {:?} figure error from {}", format, path.display());
    match format {
        FigureErrorFormat::Profile1D => profile::parse_profile(&content).map(FigureErrorProfile::Profile),
        FigureErrorFormat::Surface2D => surface::parse_surface(&content).map(FigureErrorProfile::Surface),
    }
}

/// Non-empty, non-comment lines with their 1-based line numbers.
pub(crate) fn data_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
}

pub(crate) fn parse_number(token: &str, line: usize, what: &str) -> Result<f64, ParseError> {
    token.parse().map_err(|_| ParseError::FormatError {
        line,
        message: format!("Invalid {}: {}", what, token),
    })
}
