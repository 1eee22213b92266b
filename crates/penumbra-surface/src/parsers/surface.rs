//! Parser for 2D height maps.
//!
//! The layout is:
//! ```text
//! <nx> <ny>
//! <y_1> <y_2> ... <y_ny>
//! <x_1> <h_11> ... <h_1ny>
//! ...
//! <x_nx> <h_nx1> ... <h_nxny>
//! ```
//!
//! `x` runs across the surface (width) and `y` along it (length).

use ndarray::Array2;

use super::{data_lines, parse_number, ParseError};
use crate::field::ScalarField2D;

/// Parse a 2D height map from a string.
pub fn parse_surface(content: &str) -> Result<ScalarField2D, ParseError> {
    let mut lines = data_lines(content);

    let (line, header) = lines.next().ok_or(ParseError::FormatError {
        line: 1,
        message: "Empty surface file".into(),
    })?;
    let dims: Vec<&str> = header.split_whitespace().collect();
    if dims.len() != 2 {
        return Err(ParseError::FormatError {
            line,
            message: format!("Expected 'nx ny' header, got '{}'", header),
        });
    }
    let parse_dim = |tok: &str| -> Result<usize, ParseError> {
        tok.parse().map_err(|_| ParseError::FormatError {
            line,
            message: format!("Invalid grid dimension: {}", tok),
        })
    };
    let nx = parse_dim(dims[0])?;
    let ny = parse_dim(dims[1])?;

    let (line, y_line) = lines.next().ok_or(ParseError::FormatError {
        line: line + 1,
        message: "Missing y-coordinate line".into(),
    })?;
    let y = y_line
        .split_whitespace()
        .map(|t| parse_number(t, line, "y coordinate"))
        .collect::<Result<Vec<_>, _>>()?;
    if y.len() != ny {
        return Err(ParseError::FormatError {
            line,
            message: format!("Header says {} y values but found {}", ny, y.len()),
        });
    }

    let mut x = Vec::with_capacity(nx);
    let mut values = Array2::<f64>::zeros((nx, ny));
    for (line, row) in lines {
        let parts: Vec<&str> = row.split_whitespace().collect();
        if parts.len() != ny + 1 {
            return Err(ParseError::FormatError {
                line,
                message: format!("Expected x followed by {} heights, got {} values", ny, parts.len()),
            });
        }
        let i = x.len();
        if i >= nx {
            return Err(ParseError::FormatError {
                line,
                message: format!("More than {} rows", nx),
            });
        }
        x.push(parse_number(parts[0], line, "x coordinate")?);
        for (j, tok) in parts[1..].iter().enumerate() {
            values[[i, j]] = parse_number(tok, line, "height")?;
        }
    }

    if x.len() != nx {
        return Err(ParseError::FormatError {
            line: 1,
            message: format!("Header says {} rows but found {}", nx, x.len()),
        });
    }

    Ok(ScalarField2D::new(x, y, values)?)
}
