//! The match sweep: one fitting-factor optimization per
//! `(simulation, sample)` pair, collected into dense result matrices and
//! persisted together with the run context.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::config::{Algorithm, Configuration};
use crate::error::{Error, Result};
use crate::io::{read_asd, read_samples, read_series};
use crate::netmatch::{
    DetectorInput, FittingFactorSearch, NetworkObjective, chirp_mass, total_mass_bounds,
};
use crate::ndarray_utils::argmax;
use crate::optimize::NelderMead;
use crate::series::{extract_wave, resample_asd};
use crate::spin::{spin_opening_angle, spin_vector, total_spin_alignment};
use crate::waveform::{WaveformParams, WaveformSource};

/// One detector's inputs: whitened reconstruction samples plus the ASD on
/// the analysis frequency axis.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorData {
    /// Whitened reconstruction samples, each one analysis segment long.
    pub samples: Vec<Vec<f64>>,
    /// Amplitude spectral density on the analysis frequency axis.
    pub asd: Array1<f64>,
}

impl DetectorData {
    /// Load a detector's reconstruction and spectral estimate.
    ///
    /// Stochastic reconstructions carry one sample per row; deterministic
    /// ones are a single long series that gets peak-extracted into one
    /// sample.
    pub fn load(
        reconstruction: &Path,
        spectral_estimate: &Path,
        config: &Configuration,
    ) -> Result<DetectorData> {
        let (freqs, values) = read_asd(spectral_estimate)?;
        let asd = resample_asd(&freqs, &values, config.datalen, config.delta_t);

        let segment = config.segment_samples();
        let samples = match config.algorithm {
            Algorithm::Bw => {
                let rows = read_samples(reconstruction)?;
                for (idx, row) in rows.iter().enumerate() {
                    if row.len() != segment {
                        return Err(Error::Config(format!(
                            "{}: sample {idx} has {} values, expected {segment}",
                            reconstruction.display(),
                            row.len()
                        )));
                    }
                }
                rows
            }
            Algorithm::Cwb | Algorithm::Hwinj => {
                let series = read_series(reconstruction)?;
                vec![
                    extract_wave(&series, config.datalen, config.sample_rate as f64).to_vec(),
                ]
            }
        };

        Ok(DetectorData { samples, asd })
    }

    /// Restrict to the given sample indices, in order. Repeated indices
    /// duplicate samples.
    pub fn select_samples(&mut self, indices: &[usize]) {
        self.samples = indices.iter().map(|&i| self.samples[i].clone()).collect();
    }
}

/// The persisted output of one sweep: result matrices indexed
/// `[simulation, sample]` plus the configuration and catalog snapshot
/// they were computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepBundle {
    /// Fitting factor per cell.
    pub matches: Array2<f64>,
    /// Best-fit total mass per cell, in solar masses.
    pub total_masses: Array2<f64>,
    /// Best-fit inclination per cell, in degrees.
    pub inclinations: Array2<f64>,
    /// The run configuration.
    pub config: Configuration,
    /// The selected catalog the sweep iterated over.
    pub catalog: Catalog,
}

impl SweepBundle {
    /// Serialize to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string(self)?)?;
        info!("wrote result bundle to {}", path.display());
        Ok(())
    }

    /// Read a bundle back.
    pub fn load(path: &Path) -> Result<SweepBundle> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Drives the nested simulations × samples loop.
pub struct MatchSweep<'a, S: WaveformSource> {
    catalog: &'a Catalog,
    h1: &'a DetectorData,
    l1: &'a DetectorData,
    config: &'a Configuration,
    source: &'a S,
    minimizer: NelderMead,
    restarts: usize,
}

impl<'a, S: WaveformSource> MatchSweep<'a, S> {
    /// Set up a sweep over the given selection and detector data.
    pub fn new(
        catalog: &'a Catalog,
        h1: &'a DetectorData,
        l1: &'a DetectorData,
        config: &'a Configuration,
        source: &'a S,
    ) -> Self {
        Self {
            catalog,
            h1,
            l1,
            config,
            source,
            minimizer: NelderMead::default(),
            restarts: 1,
        }
    }

    /// Replace the per-cell minimizer settings.
    pub fn with_minimizer(mut self, minimizer: NelderMead) -> Self {
        self.minimizer = minimizer;
        self
    }

    /// Use best-of-`n` randomized starts per cell.
    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts.max(1);
        self
    }

    fn validate(&self) -> Result<(usize, usize)> {
        if self.catalog.is_empty() {
            return Err(Error::EmptyCatalog);
        }
        if self.h1.samples.len() != self.l1.samples.len() {
            return Err(Error::Config(format!(
                "detector sample counts differ: H1 has {}, L1 has {}",
                self.h1.samples.len(),
                self.l1.samples.len()
            )));
        }
        Ok((self.catalog.len(), self.h1.samples.len()))
    }

    /// Mass interval and generation-probe for one simulation; `None`
    /// marks the simulation as skipped.
    fn prepare_simulation<R: Rng>(&self, w: usize, rng: &mut R) -> Option<(f64, f64)> {
        let sim = &self.catalog.simulations[w];
        self.log_simulation_label(w);
        let (min_mass, max_mass) = total_mass_bounds(
            self.config.min_chirp_mass,
            self.config.max_chirp_mass,
            sim.eta(),
        );

        // Verify the polarizations can be generated at all before spending
        // an optimization on every sample; broken wave files are skipped.
        let probe = WaveformParams::new(
            rng.gen_range(min_mass..max_mass),
            rng.gen_range(0.0..90.0),
            self.config.delta_t,
            self.config.f_min,
        );
        if let Err(err) = self.source.polarizations(&sim.wave_file, &probe) {
            warn!(
                "polarization extraction failure, skipping {}: {err}",
                sim.wave_file.display()
            );
            return None;
        }
        Some((min_mass, max_mass))
    }

    /// Announce the physical configuration being matched, deriving the
    /// spin labels the catalog does not carry explicitly.
    fn log_simulation_label(&self, w: usize) {
        let sim = &self.catalog.simulations[w];
        let spin = |prefix: &str| {
            nalgebra::Vector3::new(
                sim.parameter(&format!("{prefix}x")).unwrap_or(0.0),
                sim.parameter(&format!("{prefix}y")).unwrap_or(0.0),
                sim.parameter(&format!("{prefix}z")).unwrap_or(0.0),
            )
        };
        let s1 = spin("spin1");
        let s2 = spin("spin2");
        let q = sim.parameter("q").unwrap_or(f64::NAN);
        let a1 = sim
            .parameter("a1")
            .unwrap_or_else(|| spin_vector(s1.x, s1.y, s1.z).1);
        let a2 = sim
            .parameter("a2")
            .unwrap_or_else(|| spin_vector(s2.x, s2.y, s2.z).1);
        let (_, theta_s_l) = total_spin_alignment(q, s1, s2);
        info!(
            "{}: q = {q:.2}, a1 = {a1:.2}, a2 = {a2:.2}, theta_12 = {:.1}, theta_SL = {theta_s_l:.1}",
            sim.wave_file.display(),
            spin_opening_angle(s1, s2),
        );
    }

    fn search_for(
        &self,
        w: usize,
        s: usize,
        mass_bounds: (f64, f64),
    ) -> FittingFactorSearch<'_, S, NelderMead> {
        let sim = &self.catalog.simulations[w];
        let objective = NetworkObjective::new(
            self.source,
            &sim.wave_file,
            mass_bounds,
            DetectorInput {
                data: &self.h1.samples[s],
                asd: &self.h1.asd,
            },
            DetectorInput {
                data: &self.l1.samples[s],
                asd: &self.l1.asd,
            },
            self.config.delta_t,
            self.config.f_min,
        );
        FittingFactorSearch::new(objective)
            .with_minimizer(self.minimizer.clone())
            .with_restarts(self.restarts)
    }

    fn log_best_row(&self, w: usize, matches: &Array2<f64>, masses: &Array2<f64>, inclinations: &Array2<f64>) {
        let sim = &self.catalog.simulations[w];
        let best = argmax(matches.row(w));
        info!(
            "best match for {}: fitting factor {:.3} (sample {best}), Mchirp = {:.2}, Mtot = {:.2}, inclination = {:.1}",
            sim.wave_file.display(),
            matches[[w, best]],
            chirp_mass(masses[[w, best]], sim.eta()),
            masses[[w, best]],
            inclinations[[w, best]],
        );
    }

    /// Run the sweep serially.
    pub fn run<R: Rng>(&self, rng: &mut R) -> Result<SweepBundle> {
        let (n_simulations, n_samples) = self.validate()?;
        let mut matches = Array2::zeros((n_simulations, n_samples));
        let mut total_masses = Array2::zeros((n_simulations, n_samples));
        let mut inclinations = Array2::zeros((n_simulations, n_samples));

        for w in 0..n_simulations {
            info!("computing match ({}/{n_simulations})", w + 1);
            let Some(mass_bounds) = self.prepare_simulation(w, rng) else {
                continue;
            };

            for s in 0..n_samples {
                debug!("evaluating sample {s} of {n_samples}");
                let result = self.search_for(w, s, mass_bounds).run(rng);
                matches[[w, s]] = result.fitting_factor;
                total_masses[[w, s]] = result.total_mass;
                inclinations[[w, s]] = result.inclination;
            }
            self.log_best_row(w, &matches, &total_masses, &inclinations);
        }

        Ok(SweepBundle {
            matches,
            total_masses,
            inclinations,
            config: self.config.clone(),
            catalog: self.catalog.clone(),
        })
    }
}

#[cfg(feature = "parallel")]
impl<'a, S: WaveformSource + Sync> MatchSweep<'a, S> {
    /// Run the sweep with the per-sample cells of each simulation spread
    /// across the rayon pool.
    ///
    /// Starting points are drawn up front in the same order as [`run`],
    /// so a seeded rng produces identical results either way; each cell
    /// writes only its own output slot.
    ///
    /// [`run`]: MatchSweep::run
    pub fn run_par<R: Rng>(&self, rng: &mut R) -> Result<SweepBundle> {
        use rayon::prelude::*;

        let (n_simulations, n_samples) = self.validate()?;
        let mut matches = Array2::zeros((n_simulations, n_samples));
        let mut total_masses = Array2::zeros((n_simulations, n_samples));
        let mut inclinations = Array2::zeros((n_simulations, n_samples));

        for w in 0..n_simulations {
            info!("computing match ({}/{n_simulations})", w + 1);
            let Some(mass_bounds) = self.prepare_simulation(w, rng) else {
                continue;
            };

            let searches: Vec<_> = (0..n_samples)
                .map(|s| self.search_for(w, s, mass_bounds))
                .collect();
            let starts: Vec<_> = searches
                .iter()
                .map(|search| search.draw_starts(rng))
                .collect();

            let results: Vec<_> = searches
                .par_iter()
                .zip(&starts)
                .map(|(search, start)| search.run_with_starts(start))
                .collect();

            for (s, result) in results.into_iter().enumerate() {
                matches[[w, s]] = result.fitting_factor;
                total_masses[[w, s]] = result.total_mass;
                inclinations[[w, s]] = result.inclination;
            }
            self.log_best_row(w, &matches, &total_masses, &inclinations);
        }

        Ok(SweepBundle {
            matches,
            total_masses,
            inclinations,
            config: self.config.clone(),
            catalog: self.catalog.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::catalog::SimulationRecord;
    use crate::waveform::NrFileSource;

    const ETA: f64 = 0.25;

    fn test_config() -> Configuration {
        Configuration {
            sample_rate: 512,
            delta_t: 1.0 / 512.0,
            datalen: 4.0,
            f_min: 30.0,
            algorithm: Algorithm::Bw,
            nsampls: None,
            // eta = 0.25 maps these to total masses of roughly 149-218.
            min_chirp_mass: 65.0,
            max_chirp_mass: 95.0,
            h1_reconstruction: PathBuf::new(),
            h1_spectral_estimate: PathBuf::new(),
            l1_reconstruction: PathBuf::new(),
            l1_spectral_estimate: PathBuf::new(),
            catalog: PathBuf::new(),
        }
    }

    fn chirp_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let n = 3000;
        for i in 0..n {
            let t = i as f64;
            let phi = 2.0 * std::f64::consts::PI * (0.02 * t + 6.667e-6 * t * t);
            let amp = 0.2 + 0.2 * (t / n as f64);
            writeln!(file, "{t:.4} {:.8} {:.8}", amp * phi.cos(), amp * phi.sin()).unwrap();
        }
        file
    }

    fn record(wave_file: PathBuf) -> SimulationRecord {
        SimulationRecord {
            run_id: 0,
            wave_file,
            parameters: [
                ("eta".to_string(), ETA),
                ("q".to_string(), 1.0),
                ("Mmin30Hz".to_string(), 110.0),
                ("Mchirpmin30Hz".to_string(), 48.0),
            ]
            .into_iter()
            .collect(),
        }
    }

    fn catalog_of(records: Vec<SimulationRecord>) -> Catalog {
        Catalog {
            parameter_names: ["eta", "q", "Mmin30Hz", "Mchirpmin30Hz"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            simulations: records,
        }
    }

    fn detector_data(config: &Configuration, wave: &Path, mass: f64) -> DetectorData {
        let params = WaveformParams::new(mass, 0.0, config.delta_t, config.f_min);
        let (mut hp, _) = NrFileSource.polarizations(wave, &params).unwrap();
        hp.resize(config.segment_samples());
        DetectorData {
            samples: vec![hp.data.to_vec()],
            asd: Array1::from_elem(
                config.segment_samples().next_power_of_two() / 2 + 1,
                1.0,
            ),
        }
    }

    fn quick_minimizer() -> NelderMead {
        NelderMead::default().with_max_evaluations(250)
    }

    #[test]
    fn sweep_fills_result_matrices() {
        let config = test_config();
        let wave = chirp_file();
        let catalog = catalog_of(vec![record(wave.path().to_owned())]);
        let data = detector_data(&config, wave.path(), 180.0);

        let mut rng = StdRng::seed_from_u64(11);
        let bundle = MatchSweep::new(&catalog, &data, &data, &config, &NrFileSource)
            .with_minimizer(quick_minimizer())
            .run(&mut rng)
            .unwrap();

        assert_eq!(bundle.matches.dim(), (1, 1));
        assert!(bundle.matches[[0, 0]] > 0.5);
        assert!(bundle.total_masses[[0, 0]] > 100.0);
    }

    #[test]
    fn broken_wave_file_skips_the_simulation() {
        let config = test_config();
        let wave = chirp_file();
        let catalog = catalog_of(vec![
            record(PathBuf::from("/nonexistent/wave.dat")),
            record(wave.path().to_owned()),
        ]);
        let data = detector_data(&config, wave.path(), 170.0);

        let mut rng = StdRng::seed_from_u64(5);
        let bundle = MatchSweep::new(&catalog, &data, &data, &config, &NrFileSource)
            .with_minimizer(quick_minimizer())
            .run(&mut rng)
            .unwrap();

        // Skipped row stays at zero, the healthy row does not.
        assert_eq!(bundle.matches[[0, 0]], 0.0);
        assert_eq!(bundle.total_masses[[0, 0]], 0.0);
        assert!(bundle.matches[[1, 0]] > 0.0);
    }

    #[test]
    fn empty_catalog_is_an_error() {
        let config = test_config();
        let wave = chirp_file();
        let catalog = catalog_of(vec![]);
        let data = detector_data(&config, wave.path(), 170.0);

        let mut rng = StdRng::seed_from_u64(5);
        let err = MatchSweep::new(&catalog, &data, &data, &config, &NrFileSource)
            .run(&mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::EmptyCatalog));
    }

    #[test]
    fn mismatched_sample_counts_are_an_error() {
        let config = test_config();
        let wave = chirp_file();
        let catalog = catalog_of(vec![record(wave.path().to_owned())]);
        let h1 = detector_data(&config, wave.path(), 170.0);
        let mut l1 = h1.clone();
        l1.samples.push(l1.samples[0].clone());

        let mut rng = StdRng::seed_from_u64(5);
        let err = MatchSweep::new(&catalog, &h1, &l1, &config, &NrFileSource)
            .run(&mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn bundle_roundtrips_through_json() {
        let config = test_config();
        let wave = chirp_file();
        let catalog = catalog_of(vec![record(wave.path().to_owned())]);
        let data = detector_data(&config, wave.path(), 180.0);

        let mut rng = StdRng::seed_from_u64(11);
        let bundle = MatchSweep::new(&catalog, &data, &data, &config, &NrFileSource)
            .with_minimizer(quick_minimizer())
            .run(&mut rng)
            .unwrap();

        let out = tempfile::NamedTempFile::new().unwrap();
        bundle.save(out.path()).unwrap();
        let back = SweepBundle::load(out.path()).unwrap();
        assert_eq!(bundle, back);
    }

    #[test]
    fn select_samples_duplicates_and_reorders() {
        let mut data = DetectorData {
            samples: vec![vec![1.0], vec![2.0], vec![3.0]],
            asd: Array1::from_elem(3, 1.0),
        };
        data.select_samples(&[2, 0, 2]);
        assert_eq!(data.samples, vec![vec![3.0], vec![1.0], vec![3.0]]);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_sweep_matches_serial() {
        let config = test_config();
        let wave = chirp_file();
        let catalog = catalog_of(vec![record(wave.path().to_owned())]);
        let mut data = detector_data(&config, wave.path(), 180.0);
        data.samples.push(data.samples[0].clone());

        let mut rng = StdRng::seed_from_u64(23);
        let serial = MatchSweep::new(&catalog, &data, &data, &config, &NrFileSource)
            .with_minimizer(quick_minimizer())
            .run(&mut rng)
            .unwrap();

        let mut rng = StdRng::seed_from_u64(23);
        let parallel = MatchSweep::new(&catalog, &data, &data, &config, &NrFileSource)
            .with_minimizer(quick_minimizer())
            .run_par(&mut rng)
            .unwrap();

        assert_eq!(serial.matches, parallel.matches);
        assert_eq!(serial.total_masses, parallel.total_masses);
    }
}
