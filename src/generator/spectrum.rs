//! Target spectra: the default distribution and plain-text spectrum files.

use crate::error::KError;
use faer::c64;
use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// `λ_k = 1.5 + exp(2πi·k/n)`: a unit circle centred at 1.5, clear of the origin.
pub fn default_spectrum(n: usize) -> Vec<c64> {
    (0..n)
        .map(|k| c64::new(1.5, 0.0) + c64::from_polar(1.0, 2.0 * PI * k as f64 / n as f64))
        .collect()
}

/// One eigenvalue per line, `re` or `re im`; blank lines and lines starting with `%` or `#`
/// are skipped.
pub fn parse_spectrum(reader: impl Read) -> Result<Vec<c64>, KError> {
    let mut values = Vec::new();
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() || text.starts_with('%') || text.starts_with('#') {
            continue;
        }
        let parsed: Result<Vec<f64>, _> = text.split_whitespace().map(str::parse::<f64>).collect();
        let parts = parsed.map_err(|e| KError::Parse { line: idx + 1, msg: e.to_string() })?;
        let value = match parts.as_slice() {
            [re] => c64::new(*re, 0.0),
            [re, im] => c64::new(*re, *im),
            _ => {
                return Err(KError::Parse {
                    line: idx + 1,
                    msg: format!("expected `re` or `re im`, got {} fields", parts.len()),
                })
            }
        };
        values.push(value);
    }
    Ok(values)
}

pub fn load_spectrum(path: impl AsRef<Path>) -> Result<Vec<c64>, KError> {
    parse_spectrum(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn default_spectrum_avoids_origin() {
        let s = default_spectrum(16);
        assert_eq!(s.len(), 16);
        assert!(s.iter().all(|z| z.norm() >= 0.5 - 1e-12));
        assert!((s[0] - c64::new(2.5, 0.0)).norm() < 1e-15);
    }

    #[test]
    fn parses_real_and_complex_lines() {
        let text = "% eigenvalues\n1.0\n\n# next\n2.0 -0.5\n";
        let s = parse_spectrum(Cursor::new(text)).unwrap();
        assert_eq!(s, vec![c64::new(1.0, 0.0), c64::new(2.0, -0.5)]);
        let bad = parse_spectrum(Cursor::new("1 2 3\n")).unwrap_err();
        assert!(matches!(bad, KError::Parse { line: 1, .. }));
    }
}
