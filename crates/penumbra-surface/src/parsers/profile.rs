//! Parser for two-column height profiles.
//!
//! ```text
//! # position  height
//! -0.100  1.2e-9
//! -0.099  1.1e-9
//! ...
//! ```
//!
//! Positions must be strictly increasing. Extra columns are ignored.

use super::{data_lines, parse_number, ParseError};
use crate::field::ScalarField1D;

/// Parse a 1D height profile from a string.
pub fn parse_profile(content: &str) -> Result<ScalarField1D, ParseError> {
    let mut positions = Vec::new();
    let mut heights = Vec::new();

    for (line, text) in data_lines(content) {
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() < 2 {
            return Err(ParseError::FormatError {
                line,
                message: format!("Expected 'position height', got '{}'", text),
            });
        }
        positions.push(parse_number(parts[0], line, "position")?);
        heights.push(parse_number(parts[1], line, "height")?);
    }

    Ok(ScalarField1D::new(positions, heights)?)
}
