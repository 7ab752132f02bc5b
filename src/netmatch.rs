//! Two-detector network match and the fitting-factor search over total
//! mass and inclination.
//!
//! The reconstructions handed in here are whitened detector responses, so
//! templates are whitened by the detector ASD before correlation and no
//! noise weighting enters the matched filter itself.

use std::path::Path;

use log::debug;
use ndarray::Array1;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::filter::{matched_filter_peak, sigmasq};
use crate::optimize::{LocalMinimizer, NelderMead};
use crate::series::TimeSeries;
use crate::waveform::{WaveformParams, WaveformSource};

/// Total-mass search interval implied by chirp-mass bounds at a given
/// symmetric mass ratio: `M = M_chirp · η^(-3/5)`.
pub fn total_mass_bounds(min_chirp_mass: f64, max_chirp_mass: f64, eta: f64) -> (f64, f64) {
    let scale = eta.powf(-3.0 / 5.0);
    (min_chirp_mass * scale, max_chirp_mass * scale)
}

/// Chirp mass corresponding to a total mass at symmetric mass ratio `eta`.
pub fn chirp_mass(total_mass: f64, eta: f64) -> f64 {
    total_mass * eta.powf(3.0 / 5.0)
}

/// Per-detector fixed inputs of one search: a whitened reconstruction
/// sample and the ASD sampled on the analysis frequency axis.
#[derive(Debug, Clone, Copy)]
pub struct DetectorInput<'a> {
    /// Whitened reconstructed strain, one analysis segment long.
    pub data: &'a [f64],
    /// Amplitude spectral density on the segment's frequency axis.
    pub asd: &'a Array1<f64>,
}

/// Best-fit parameters of one `(simulation, sample)` cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchSearchResult {
    /// `1 − minimized mismatch`; the maximum network match reached.
    pub fitting_factor: f64,
    /// Total mass at the optimum, in solar masses.
    pub total_mass: f64,
    /// Inclination at the optimum, in degrees.
    pub inclination: f64,
}

/// The network-match objective for one simulation against one pair of
/// detector samples.
#[derive(Clone, Copy)]
pub struct NetworkObjective<'a, S: WaveformSource> {
    source: &'a S,
    wave_file: &'a Path,
    mass_bounds: (f64, f64),
    h1: DetectorInput<'a>,
    l1: DetectorInput<'a>,
    delta_t: f64,
    f_min: f64,
}

impl<'a, S: WaveformSource> NetworkObjective<'a, S> {
    /// Bundle the fixed inputs of one search.
    pub fn new(
        source: &'a S,
        wave_file: &'a Path,
        mass_bounds: (f64, f64),
        h1: DetectorInput<'a>,
        l1: DetectorInput<'a>,
        delta_t: f64,
        f_min: f64,
    ) -> Self {
        Self {
            source,
            wave_file,
            mass_bounds,
            h1,
            l1,
            delta_t,
            f_min,
        }
    }

    /// Maximum overlap and the two power normalisations for one detector.
    ///
    /// A total mass outside the search interval contributes an exact zero
    /// triple (no penalty slope); so does any waveform-generation failure.
    /// The objective therefore stays finite everywhere and the simplex can
    /// keep stepping.
    fn single_detector_overlap(
        &self,
        detector: &DetectorInput<'_>,
        total_mass: f64,
        inclination: f64,
    ) -> (f64, f64, f64) {
        let (min_mass, max_mass) = self.mass_bounds;
        if !(total_mass >= min_mass && total_mass <= max_mass) {
            return (0.0, 0.0, 0.0);
        }

        let params = WaveformParams::new(total_mass, inclination, self.delta_t, self.f_min);
        let mut template = match self.source.polarizations(self.wave_file, &params) {
            Ok((h_plus, _)) => h_plus,
            Err(err) => {
                debug!("treating infeasible point as zero match: {err}");
                return (0.0, 0.0, 0.0);
            }
        };

        let segment = detector.data.len();
        if template.len() > segment {
            // The template outlasts the analysis segment; the fixed ASD
            // axis cannot represent it.
            debug!(
                "template of {} samples exceeds the {} sample segment",
                template.len(),
                segment
            );
            return (0.0, 0.0, 0.0);
        }
        template.resize(segment);

        let mut template_fs = template.to_frequency_series();
        template_fs.whiten(detector.asd);

        let data = TimeSeries::new(Array1::from_iter(detector.data.iter().copied()), self.delta_t);
        let data_fs = data.to_frequency_series();

        let max_snr = matched_filter_peak(&template_fs, &data_fs, self.f_min);
        let template_power = sigmasq(&template_fs, self.f_min);
        let data_power = sigmasq(&data_fs, self.f_min);
        (max_snr, template_power, data_power)
    }

    /// The two-detector network match at `(total mass, inclination)`.
    pub fn network_match(&self, total_mass: f64, inclination: f64) -> f64 {
        let (h1_snr, h1_template_power, h1_data_power) =
            self.single_detector_overlap(&self.h1, total_mass, inclination);
        let (l1_snr, l1_template_power, l1_data_power) =
            self.single_detector_overlap(&self.l1, total_mass, inclination);

        let numerator = h1_snr + l1_snr;
        if numerator == 0.0 {
            return 0.0;
        }
        numerator
            / ((h1_template_power + l1_template_power) * (h1_data_power + l1_data_power)).sqrt()
    }

    /// Minimization objective: `1 − network match`.
    pub fn mismatch(&self, params: &[f64]) -> f64 {
        1.0 - self.network_match(params[0], params[1])
    }
}

/// Fitting-factor search: local optimization of the network mismatch from
/// a randomized start inside the mass interval.
pub struct FittingFactorSearch<'a, S: WaveformSource, M: LocalMinimizer = NelderMead> {
    objective: NetworkObjective<'a, S>,
    minimizer: M,
    restarts: usize,
}

impl<'a, S: WaveformSource> FittingFactorSearch<'a, S, NelderMead> {
    /// Search with the default simplex minimizer and a single start.
    pub fn new(objective: NetworkObjective<'a, S>) -> Self {
        Self {
            objective,
            minimizer: NelderMead::default(),
            restarts: 1,
        }
    }
}

impl<'a, S: WaveformSource, M: LocalMinimizer> FittingFactorSearch<'a, S, M> {
    /// Swap in a different local minimizer.
    pub fn with_minimizer<M2: LocalMinimizer>(
        self,
        minimizer: M2,
    ) -> FittingFactorSearch<'a, S, M2> {
        FittingFactorSearch {
            objective: self.objective,
            minimizer,
            restarts: self.restarts,
        }
    }

    /// Keep the best of `restarts` independent randomized starts.
    ///
    /// A single start gives only a local optimum; extra starts trade
    /// compute for robustness near the flat out-of-bounds region.
    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts.max(1);
        self
    }

    /// Draw the randomized starting points for this search: total mass
    /// uniform over the mass interval, inclination uniform over [0°, 90°].
    pub fn draw_starts<R: Rng>(&self, rng: &mut R) -> Vec<[f64; 2]> {
        let (min_mass, max_mass) = self.objective.mass_bounds;
        (0..self.restarts)
            .map(|_| [rng.gen_range(min_mass..max_mass), rng.gen_range(0.0..90.0)])
            .collect()
    }

    /// Run the search from explicit starting points, keeping the best.
    pub fn run_with_starts(&self, starts: &[[f64; 2]]) -> MatchSearchResult {
        let mut best: Option<MatchSearchResult> = None;

        for start in starts {
            debug!(
                "start: mass {:.2}, inclination {:.2}",
                start[0], start[1]
            );
            let mut objective = |x: &[f64]| self.objective.mismatch(x);
            let minimum = self.minimizer.minimize(&mut objective, start);

            let candidate = MatchSearchResult {
                fitting_factor: 1.0 - minimum.value,
                total_mass: minimum.x[0],
                inclination: minimum.x[1],
            };
            if best.is_none_or(|b| candidate.fitting_factor > b.fitting_factor) {
                best = Some(candidate);
            }
        }

        best.expect("at least one start")
    }

    /// Run the search, drawing starts from `rng`.
    pub fn run<R: Rng>(&self, rng: &mut R) -> MatchSearchResult {
        self.run_with_starts(&self.draw_starts(rng))
    }
}
