//! Matrix Market coordinate reader.
//!
//! Every process reads the whole file and keeps the rows its [`RowMap`] assigns to it.
//! Supported headers: `%%MatrixMarket matrix coordinate <real|complex|integer|pattern>
//! <general|symmetric|skew-symmetric|hermitian>`. Indices are 1-based, `%` lines are comments
//! and duplicate entries are summed.
//!
//! # References
//! - [Matrix Market exchange formats](https://math.nist.gov/MatrixMarket/formats.html)

use crate::core::C_ONE;
use crate::error::KError;
use crate::matrix::CsrMatrix;
use crate::parallel::{Comm, RowMap};
use faer::c64;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Real,
    Complex,
    Integer,
    Pattern,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Symmetry {
    General,
    Symmetric,
    SkewSymmetric,
    Hermitian,
}

/// Entries of a coordinate file, 0-based, with symmetric halves expanded.
#[derive(Debug)]
pub struct Coordinates {
    pub nrows: usize,
    pub ncols: usize,
    pub entries: Vec<(usize, usize, c64)>,
}

fn parse_err(line: usize, msg: impl Into<String>) -> KError {
    KError::Parse { line, msg: msg.into() }
}

fn parse_header(line: &str) -> Result<(Field, Symmetry), KError> {
    let parts: Vec<String> = line.split_whitespace().map(str::to_ascii_lowercase).collect();
    if parts.len() != 5 || parts[0] != "%%matrixmarket" || parts[1] != "matrix" {
        return Err(parse_err(1, format!("not a Matrix Market header: {line:?}")));
    }
    if parts[2] != "coordinate" {
        return Err(KError::Unsupported("only coordinate Matrix Market files are supported"));
    }
    let field = match parts[3].as_str() {
        "real" => Field::Real,
        "complex" => Field::Complex,
        "integer" => Field::Integer,
        "pattern" => Field::Pattern,
        other => return Err(parse_err(1, format!("unknown field {other:?}"))),
    };
    let symmetry = match parts[4].as_str() {
        "general" => Symmetry::General,
        "symmetric" => Symmetry::Symmetric,
        "skew-symmetric" => Symmetry::SkewSymmetric,
        "hermitian" => Symmetry::Hermitian,
        other => return Err(parse_err(1, format!("unknown symmetry {other:?}"))),
    };
    Ok((field, symmetry))
}

fn number<T: std::str::FromStr>(tok: Option<&str>, line: usize, what: &str) -> Result<T, KError> {
    tok.ok_or_else(|| parse_err(line, format!("missing {what}")))?
        .parse()
        .map_err(|_| parse_err(line, format!("invalid {what}")))
}

/// Parse a coordinate Matrix Market stream.
pub fn parse_matrix_market(reader: impl Read) -> Result<Coordinates, KError> {
    let mut lines = BufReader::new(reader).lines().enumerate();
    let header = match lines.next() {
        Some((_, line)) => line?,
        None => return Err(parse_err(1, "empty file")),
    };
    let (field, symmetry) = parse_header(header.trim())?;

    let mut size: Option<(usize, usize, usize)> = None;
    let mut entries = Vec::new();
    for (idx, line) in lines {
        let line = line?;
        let lineno = idx + 1;
        let text = line.trim();
        if text.is_empty() || text.starts_with('%') {
            continue;
        }
        let mut tok = text.split_whitespace();
        let Some((nrows, ncols, _)) = size else {
            let dims = (
                number(tok.next(), lineno, "row count")?,
                number(tok.next(), lineno, "column count")?,
                number(tok.next(), lineno, "entry count")?,
            );
            entries.reserve(dims.2 * if symmetry == Symmetry::General { 1 } else { 2 });
            size = Some(dims);
            continue;
        };
        let i: usize = number(tok.next(), lineno, "row index")?;
        let j: usize = number(tok.next(), lineno, "column index")?;
        if i == 0 || j == 0 || i > nrows || j > ncols {
            return Err(parse_err(lineno, format!("entry ({i}, {j}) outside {nrows}x{ncols}")));
        }
        let v = match field {
            Field::Pattern => C_ONE,
            Field::Real | Field::Integer => c64::new(number(tok.next(), lineno, "value")?, 0.0),
            Field::Complex => c64::new(
                number(tok.next(), lineno, "real part")?,
                number(tok.next(), lineno, "imaginary part")?,
            ),
        };
        let (i, j) = (i - 1, j - 1);
        entries.push((i, j, v));
        if i != j {
            match symmetry {
                Symmetry::General => {}
                Symmetry::Symmetric => entries.push((j, i, v)),
                Symmetry::SkewSymmetric => entries.push((j, i, -v)),
                Symmetry::Hermitian => entries.push((j, i, v.conj())),
            }
        }
    }
    let (nrows, ncols, nnz) = size.ok_or_else(|| parse_err(1, "missing size line"))?;
    let stored = entries.len();
    if symmetry == Symmetry::General && stored != nnz {
        log::warn!("Matrix Market: header announces {nnz} entries, read {stored}");
    }
    Ok(Coordinates { nrows, ncols, entries })
}

/// Load a square coordinate file and distribute its rows uniformly over `comm`.
pub fn load_matrix_market(path: impl AsRef<Path>, comm: Arc<dyn Comm>) -> Result<CsrMatrix, KError> {
    let path = path.as_ref();
    let coords = parse_matrix_market(File::open(path)?)?;
    if coords.nrows != coords.ncols {
        return Err(KError::DimensionError(format!(
            "{} is {}x{}, a square matrix is required",
            path.display(),
            coords.nrows,
            coords.ncols
        )));
    }
    let map = Arc::new(RowMap::uniform(coords.nrows, comm));
    CsrMatrix::from_triplets(map, coords.ncols, coords.entries)
}
