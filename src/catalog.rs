//! NR simulation catalog: manifest loading, parameter-bound selection, and
//! deduplication of physically identical runs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Columns that set the mass scale of a run rather than its physical
/// configuration; excluded from the uniqueness comparison.
const MASS_SCALE_PARAMS: [&str; 2] = ["Mmin30Hz", "Mchirpmin30Hz"];

/// One row of the catalog manifest.
///
/// Records are immutable once loaded; selection removes whole records from
/// the working set but never rewrites their fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    /// Unique per manifest row (not per physical configuration).
    pub run_id: u32,
    /// Handle to the underlying waveform data.
    pub wave_file: PathBuf,
    /// Declared parameters, keyed exactly by the manifest header names.
    pub parameters: HashMap<String, f64>,
}

impl SimulationRecord {
    /// Look up a declared parameter by name.
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    /// Symmetric mass ratio, which every catalog declares.
    pub fn eta(&self) -> f64 {
        self.parameter("eta").unwrap_or(f64::NAN)
    }
}

/// Inclusive per-parameter intervals; parameters without an entry are
/// unconstrained. The stored endpoint order is not significant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    bounds: HashMap<String, (f64, f64)>,
}

impl ParameterBounds {
    /// No constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inclusive interval for one parameter. Endpoint order does not
    /// matter; the effective interval is `[min, max]`.
    pub fn with(mut self, name: &str, a: f64, b: f64) -> Self {
        self.bounds.insert(name.to_owned(), (a.min(b), a.max(b)));
        self
    }

    /// Whether any constraint is registered.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Per-parameter interval intersection of two bound sets.
    ///
    /// Intervals are stored normalised, so an empty intersection stays
    /// empty (`lo > hi`) and admits nothing.
    pub fn intersect(&self, other: &ParameterBounds) -> ParameterBounds {
        let mut out = self.clone();
        for (name, &(lo, hi)) in &other.bounds {
            out.bounds
                .entry(name.clone())
                .and_modify(|(x, y)| {
                    *x = x.max(lo);
                    *y = y.min(hi);
                })
                .or_insert((lo, hi));
        }
        out
    }

    /// Whether a record satisfies every registered interval.
    ///
    /// A record missing a bounded parameter never satisfies that bound.
    pub fn admits(&self, record: &SimulationRecord) -> bool {
        self.bounds.iter().all(|(name, &(lo, hi))| {
            match record.parameter(name) {
                Some(value) => value >= lo && value <= hi,
                None => false,
            }
        })
    }
}

/// The loaded catalog: declared parameter names plus one record per
/// manifest row, in manifest order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Parameter column names, in manifest order.
    pub parameter_names: Vec<String>,
    /// Simulation records in manifest order.
    pub simulations: Vec<SimulationRecord>,
}

impl Catalog {
    /// Parse a whitespace-delimited manifest.
    ///
    /// The header row starts with a marker token to discard, followed by the
    /// run-identifier and wave-file column names and the declared parameter
    /// names. Every data row must carry exactly the declared columns.
    pub fn load(manifest: &Path) -> Result<Catalog> {
        let text = fs::read_to_string(manifest)?;
        let mut lines = text.lines().enumerate();

        let (_, header) = lines.next().ok_or_else(|| Error::MalformedManifest {
            path: manifest.to_owned(),
            line: 1,
            reason: "empty manifest".into(),
        })?;
        // Discard the marker token, then the runID / wavefile column names.
        let parameter_names: Vec<String> = header
            .split_whitespace()
            .skip(1)
            .filter(|name| *name != "runID" && *name != "wavefile")
            .map(str::to_owned)
            .collect();

        let mut simulations = Vec::new();
        for (idx, row) in lines {
            if row.trim().is_empty() {
                continue;
            }
            let tokens = row.split_whitespace().collect_vec();
            let expected = 2 + parameter_names.len();
            if tokens.len() != expected {
                return Err(Error::MalformedManifest {
                    path: manifest.to_owned(),
                    line: idx + 1,
                    reason: format!("expected {expected} columns, found {}", tokens.len()),
                });
            }

            let run_id = tokens[0].parse::<u32>().map_err(|e| Error::MalformedManifest {
                path: manifest.to_owned(),
                line: idx + 1,
                reason: format!("run id {:?}: {e}", tokens[0]),
            })?;

            let mut parameters = HashMap::with_capacity(parameter_names.len());
            for (name, token) in parameter_names.iter().zip(&tokens[2..]) {
                let value = token.parse::<f64>().map_err(|e| Error::MalformedManifest {
                    path: manifest.to_owned(),
                    line: idx + 1,
                    reason: format!("parameter {name} {token:?}: {e}"),
                })?;
                parameters.insert(name.clone(), value);
            }

            simulations.push(SimulationRecord {
                run_id,
                wave_file: PathBuf::from(tokens[1]),
                parameters,
            });
        }

        info!(
            "loaded {} simulations ({} parameters) from {}",
            simulations.len(),
            parameter_names.len(),
            manifest.display()
        );
        Ok(Catalog {
            parameter_names,
            simulations,
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.simulations.len()
    }

    /// Whether the catalog holds no records.
    pub fn is_empty(&self) -> bool {
        self.simulations.is_empty()
    }

    /// Index of the record whose wave-file name matches `file_name`.
    pub fn position_of_wave_file(&self, file_name: &str) -> Option<usize> {
        self.simulations.iter().position(|sim| {
            sim.wave_file
                .file_name()
                .is_some_and(|f| f == file_name)
        })
    }

    /// Apply the parameter bounds, then deduplicate physically identical
    /// records. Relative manifest order is preserved.
    ///
    /// An empty result is reported but not fatal here; the sweep driver
    /// refuses to run over an empty selection.
    pub fn select(&self, bounds: &ParameterBounds) -> Catalog {
        let filtered = self
            .simulations
            .iter()
            .filter(|sim| bounds.admits(sim))
            .cloned()
            .collect_vec();
        debug!(
            "{} of {} simulations satisfy the parameter bounds",
            filtered.len(),
            self.len()
        );

        let unique = deduplicate(&self.parameter_names, filtered);
        if unique.is_empty() {
            warn!("parameter bounds admit no simulations");
        } else {
            info!("selected {} unique simulations", unique.len());
        }

        Catalog {
            parameter_names: self.parameter_names.clone(),
            simulations: unique,
        }
    }
}

/// Key under which two records count as the same physical configuration:
/// the tuple of all declared parameters except the mass-scale columns.
///
/// NaN is mapped to `+inf` so that two missing values compare equal, and
/// `-0.0` to `0.0` so the sign of zero cannot split a group. This equality
/// is used for deduplication only.
fn physical_key(names: &[String], record: &SimulationRecord) -> Vec<u64> {
    names
        .iter()
        .filter(|name| !MASS_SCALE_PARAMS.contains(&name.as_str()))
        .map(|name| {
            let v = record.parameter(name).unwrap_or(f64::NAN);
            let v = if v.is_nan() { f64::INFINITY } else { v };
            let v = if v == 0.0 { 0.0 } else { v };
            v.to_bits()
        })
        .collect()
}

/// Keep one record per physical configuration: the one with the smallest
/// `Mmin30Hz`, ties broken by manifest order.
fn deduplicate(names: &[String], records: Vec<SimulationRecord>) -> Vec<SimulationRecord> {
    let mut groups: HashMap<Vec<u64>, Vec<usize>> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        groups.entry(physical_key(names, record)).or_default().push(i);
    }

    let mut keep = vec![true; records.len()];
    for indices in groups.values().filter(|g| g.len() > 1) {
        let mass_floor = |i: usize| {
            records[i]
                .parameter("Mmin30Hz")
                .filter(|m| !m.is_nan())
                .unwrap_or(f64::INFINITY)
        };
        // Strict `<` keeps the earliest record on ties.
        let mut keeper = indices[0];
        for &i in &indices[1..] {
            if mass_floor(i) < mass_floor(keeper) {
                keeper = i;
            }
        }
        for &i in indices {
            if i != keeper {
                debug!(
                    "removing duplicate simulation {} (kept {})",
                    records[i].wave_file.display(),
                    records[keeper].wave_file.display()
                );
                keep[i] = false;
            }
        }
    }

    records
        .into_iter()
        .enumerate()
        .filter_map(|(i, r)| keep[i].then_some(r))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn record(run_id: u32, params: &[(&str, f64)]) -> SimulationRecord {
        SimulationRecord {
            run_id,
            wave_file: PathBuf::from(format!("CAT{run_id:04}.dat")),
            parameters: params
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn catalog(names_list: &[&str], sims: Vec<SimulationRecord>) -> Catalog {
        Catalog {
            parameter_names: names(names_list),
            simulations: sims,
        }
    }

    #[test]
    fn load_parses_header_and_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# runID wavefile q eta Mmin30Hz Mchirpmin30Hz").unwrap();
        writeln!(file, "0 waves/CAT0000.dat 1.0 0.25 65.9 28.7").unwrap();
        writeln!(file, "1 waves/CAT0001.dat 2.0 0.2222 70.2 27.1").unwrap();

        let cat = Catalog::load(file.path()).unwrap();
        assert_eq!(cat.parameter_names, names(&["q", "eta", "Mmin30Hz", "Mchirpmin30Hz"]));
        assert_eq!(cat.len(), 2);
        assert_eq!(cat.simulations[1].run_id, 1);
        assert_eq!(cat.simulations[1].parameter("q"), Some(2.0));
        assert_eq!(
            cat.position_of_wave_file("CAT0001.dat"),
            Some(1)
        );
    }

    #[test]
    fn load_rejects_short_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# runID wavefile q eta").unwrap();
        writeln!(file, "0 CAT0000.dat 1.0").unwrap();

        let err = Catalog::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::MalformedManifest { line: 2, .. }));
    }

    #[test]
    fn load_rejects_unparseable_numbers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# runID wavefile q").unwrap();
        writeln!(file, "0 CAT0000.dat not-a-number").unwrap();

        assert!(Catalog::load(file.path()).is_err());
    }

    #[test]
    fn bounds_select_in_manifest_order() {
        let cat = catalog(
            &["q"],
            vec![
                record(0, &[("q", 2.0)]),
                record(1, &[("q", 4.0)]),
                record(2, &[("q", 15.0)]),
            ],
        );

        let selected = cat.select(&ParameterBounds::new().with("q", 1.9, 4.1));
        assert_eq!(selected.len(), 2);
        assert_eq!(selected.simulations[0].run_id, 0);
        assert_eq!(selected.simulations[1].run_id, 1);
    }

    #[test]
    fn bounds_endpoint_order_is_irrelevant() {
        let cat = catalog(&["q"], vec![record(0, &[("q", 2.0)])]);
        let selected = cat.select(&ParameterBounds::new().with("q", 4.1, 1.9));
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn sequential_filters_equal_intersected_filter() {
        let cat = catalog(
            &["q", "spin1z"],
            vec![
                record(0, &[("q", 1.0), ("spin1z", 0.0)]),
                record(1, &[("q", 2.0), ("spin1z", 0.6)]),
                record(2, &[("q", 3.0), ("spin1z", 0.6)]),
                record(3, &[("q", 4.0), ("spin1z", -0.6)]),
            ],
        );
        let b1 = ParameterBounds::new().with("q", 1.5, 3.5);
        let b2 = ParameterBounds::new().with("spin1z", 0.0, 1.0).with("q", 0.0, 2.5);

        let sequential = cat.select(&b1).select(&b2);
        let intersected = cat.select(&b1.intersect(&b2));
        assert_eq!(sequential.simulations, intersected.simulations);
        assert_eq!(sequential.len(), 1);
        assert_eq!(sequential.simulations[0].run_id, 1);
    }

    #[test]
    fn dedup_keeps_smallest_mass_floor() {
        let cat = catalog(
            &["q", "Mmin30Hz"],
            vec![
                record(0, &[("q", 2.0), ("Mmin30Hz", 95.1)]),
                record(1, &[("q", 2.0), ("Mmin30Hz", 80.3)]),
            ],
        );
        let selected = cat.select(&ParameterBounds::new());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected.simulations[0].parameter("Mmin30Hz"), Some(80.3));
    }

    #[test]
    fn dedup_tie_keeps_first_occurrence() {
        let cat = catalog(
            &["q", "Mmin30Hz"],
            vec![
                record(0, &[("q", 2.0), ("Mmin30Hz", 150.0)]),
                record(1, &[("q", 2.0), ("Mmin30Hz", 150.0)]),
            ],
        );
        let selected = cat.select(&ParameterBounds::new());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected.simulations[0].run_id, 0);
    }

    #[test]
    fn dedup_treats_nan_parameters_as_equal() {
        let cat = catalog(
            &["q", "spin1x", "Mmin30Hz"],
            vec![
                record(0, &[("q", 2.0), ("spin1x", f64::NAN), ("Mmin30Hz", 150.0)]),
                record(1, &[("q", 2.0), ("spin1x", f64::NAN), ("Mmin30Hz", 120.0)]),
            ],
        );
        let selected = cat.select(&ParameterBounds::new());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected.simulations[0].parameter("Mmin30Hz"), Some(120.0));
    }

    #[test]
    fn dedup_is_idempotent_and_never_grows() {
        let cat = catalog(
            &["q", "Mmin30Hz"],
            vec![
                record(0, &[("q", 2.0), ("Mmin30Hz", 95.1)]),
                record(1, &[("q", 2.0), ("Mmin30Hz", 80.3)]),
                record(2, &[("q", 3.0), ("Mmin30Hz", 70.0)]),
            ],
        );
        let once = cat.select(&ParameterBounds::new());
        let twice = once.select(&ParameterBounds::new());
        assert!(once.len() <= cat.len());
        assert_eq!(once.simulations, twice.simulations);
    }

    #[test]
    fn distinct_mass_scale_columns_do_not_split_groups() {
        // Same physics at two resolutions, different chirp-mass floors.
        let cat = catalog(
            &["q", "Mmin30Hz", "Mchirpmin30Hz"],
            vec![
                record(0, &[("q", 2.0), ("Mmin30Hz", 95.1), ("Mchirpmin30Hz", 40.0)]),
                record(1, &[("q", 2.0), ("Mmin30Hz", 80.3), ("Mchirpmin30Hz", 33.0)]),
            ],
        );
        assert_eq!(cat.select(&ParameterBounds::new()).len(), 1);
    }
}
