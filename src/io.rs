//! Readers for the whitespace-delimited input files: noise spectral
//! estimates and reconstructed-waveform samples.

use std::fs;
use std::path::Path;

use itertools::Itertools;
use log::info;
use rand::Rng;

use crate::error::{Error, Result};

/// Read a whitespace-delimited numeric table, skipping blank lines and
/// `#` comments. Rows may differ in length; callers validate shape.
pub fn read_table(path: &Path) -> Result<Vec<Vec<f64>>> {
    let text = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row: std::result::Result<Vec<f64>, _> =
            line.split_whitespace().map(str::parse::<f64>).collect();
        let row = row.map_err(|e| Error::Config(format!(
            "{}: line {}: {e}",
            path.display(),
            idx + 1
        )))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Read a two-column `(frequency, amplitude)` spectral-estimate file.
///
/// Frequencies must increase monotonically.
pub fn read_asd(path: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
    let rows = read_table(path)?;
    let mut freqs = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len());
    for row in &rows {
        if row.len() < 2 {
            return Err(Error::Config(format!(
                "{}: expected two columns of (frequency, ASD)",
                path.display()
            )));
        }
        freqs.push(row[0]);
        values.push(row[1]);
    }
    if freqs.windows(2).any(|w| w[1] <= w[0]) {
        return Err(Error::Config(format!(
            "{}: frequencies must be monotonically increasing",
            path.display()
        )));
    }
    if freqs.is_empty() {
        return Err(Error::Config(format!("{}: empty ASD file", path.display())));
    }
    Ok((freqs, values))
}

/// Read a reconstruction file as one sample per row.
pub fn read_samples(path: &Path) -> Result<Vec<Vec<f64>>> {
    let rows = read_table(path)?;
    if rows.is_empty() {
        return Err(Error::Config(format!(
            "{}: empty reconstruction file",
            path.display()
        )));
    }
    info!("read {} reconstruction samples from {}", rows.len(), path.display());
    Ok(rows)
}

/// Read a reconstruction file as a single long series, regardless of how
/// the samples are wrapped across lines.
pub fn read_series(path: &Path) -> Result<Vec<f64>> {
    let series = read_table(path)?.into_iter().flatten().collect_vec();
    if series.is_empty() {
        return Err(Error::Config(format!(
            "{}: empty reconstruction file",
            path.display()
        )));
    }
    Ok(series)
}

/// Draw `count` row indices uniformly, with replacement.
///
/// Replacement mirrors the posterior-thinning behaviour of the analysis
/// this feeds; use an explicit index range for distinct samples.
pub fn draw_sample_indices<R: Rng>(rng: &mut R, len: usize, count: usize) -> Vec<usize> {
    (0..count).map(|_| rng.gen_range(0..len)).collect()
}
