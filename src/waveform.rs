//! Template synthesis boundary.
//!
//! The match engine only needs plus/cross polarizations at a requested
//! total mass, inclination and sample spacing; [`WaveformSource`] is that
//! seam. [`NrFileSource`] implements it for plain-text dominant-mode data
//! in geometric units, which is what the catalog's wave files hold.

use std::path::Path;

use log::debug;
use ndarray::Array1;

use crate::error::{Error, Result};
use crate::io::read_table;
use crate::ndarray_utils::interp;
use crate::series::TimeSeries;

/// Geometrized solar mass, `G·M☉/c³`, in seconds.
pub const MTSUN_SI: f64 = 4.925491025543576e-6;
/// Geometrized solar mass, `G·M☉/c²`, in metres.
pub const MRSUN_SI: f64 = 1.476625061404649e3;
/// One megaparsec in metres.
pub const MPC_SI: f64 = 3.085677581491367e22;

/// Reference luminosity distance when the caller does not override it.
const DEFAULT_DISTANCE_MPC: f64 = 100.0;

/// Parameters of one polarization synthesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformParams {
    /// Total mass in solar masses.
    pub total_mass: f64,
    /// Inclination in degrees.
    pub inclination_deg: f64,
    /// Output sample spacing in seconds.
    pub delta_t: f64,
    /// Lowest frequency the template must cover, in Hz.
    pub f_lower: f64,
    /// Luminosity distance in Mpc.
    pub distance_mpc: f64,
}

impl WaveformParams {
    /// Synthesis at the default 100 Mpc distance.
    pub fn new(total_mass: f64, inclination_deg: f64, delta_t: f64, f_lower: f64) -> Self {
        Self {
            total_mass,
            inclination_deg,
            delta_t,
            f_lower,
            distance_mpc: DEFAULT_DISTANCE_MPC,
        }
    }

    /// Override the luminosity distance.
    pub fn with_distance(mut self, distance_mpc: f64) -> Self {
        self.distance_mpc = distance_mpc;
        self
    }
}

/// Anything that can turn a catalog wave file into polarizations.
///
/// Implementations must fail with [`Error::Waveform`] when the requested
/// configuration cannot be synthesized (mass too small for the band,
/// missing or truncated data); the optimizer treats such failures as
/// infeasible points rather than aborting its search.
pub trait WaveformSource {
    /// Generate `(h_plus, h_cross)` for the given parameters, start-tapered.
    fn polarizations(
        &self,
        wave_file: &Path,
        params: &WaveformParams,
    ) -> Result<(TimeSeries, TimeSeries)>;
}

/// Reads dominant-mode strain from a plain-text wave file.
///
/// Expected columns: `t/M`, `Re(r·h)/M`, `Im(r·h)/M`, all in geometric
/// units and scaled to unit total mass. Time and amplitude are rescaled to
/// the requested total mass and distance, the dominant-mode inclination
/// weighting is applied, and the result is resampled onto the uniform
/// output grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct NrFileSource;

impl WaveformSource for NrFileSource {
    fn polarizations(
        &self,
        wave_file: &Path,
        params: &WaveformParams,
    ) -> Result<(TimeSeries, TimeSeries)> {
        let rows = read_table(wave_file)
            .map_err(|e| Error::Waveform(format!("{}: {e}", wave_file.display())))?;
        if rows.len() < 4 {
            return Err(Error::Waveform(format!(
                "{}: too few samples to resample",
                wave_file.display()
            )));
        }

        let mut t_geo = Vec::with_capacity(rows.len());
        let mut h_re = Vec::with_capacity(rows.len());
        let mut h_im = Vec::with_capacity(rows.len());
        for row in &rows {
            if row.len() < 3 {
                return Err(Error::Waveform(format!(
                    "{}: expected columns t/M, Re(rh)/M, Im(rh)/M",
                    wave_file.display()
                )));
            }
            t_geo.push(row[0]);
            h_re.push(row[1]);
            h_im.push(row[2]);
        }
        if t_geo.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::Waveform(format!(
                "{}: time column must increase monotonically",
                wave_file.display()
            )));
        }

        let mass_seconds = params.total_mass * MTSUN_SI;
        let f_start = start_frequency(&t_geo, &h_re, &h_im)
            .map(|f_geo| f_geo / mass_seconds)
            .ok_or_else(|| {
                Error::Waveform(format!("{}: no phase evolution at start", wave_file.display()))
            })?;
        if f_start > params.f_lower {
            return Err(Error::Waveform(format!(
                "{}: starts at {f_start:.1} Hz for M = {:.1}, above the requested {:.1} Hz",
                wave_file.display(),
                params.total_mass,
                params.f_lower
            )));
        }

        // Physical scalings: time stretches with M, amplitude grows with M
        // and falls off with distance.
        let amp = params.total_mass * MRSUN_SI / (params.distance_mpc * MPC_SI);
        let iota = params.inclination_deg.to_radians();
        let plus_fac = amp * (1.0 + iota.cos() * iota.cos()) / 2.0;
        let cross_fac = amp * iota.cos();

        let t_sec: Vec<f64> = t_geo.iter().map(|t| (t - t_geo[0]) * mass_seconds).collect();
        let duration = *t_sec.last().expect("nonempty");
        let n_out = (duration / params.delta_t).floor() as usize;
        if n_out < 2 {
            return Err(Error::Waveform(format!(
                "{}: waveform shorter than one output sample",
                wave_file.display()
            )));
        }
        let grid: Vec<f64> = (0..n_out).map(|i| i as f64 * params.delta_t).collect();

        let re = interp(&grid, &t_sec, &h_re);
        let im = interp(&grid, &t_sec, &h_im);
        let mut h_plus = TimeSeries::new(
            Array1::from_iter(re.iter().map(|x| plus_fac * x)),
            params.delta_t,
        );
        let mut h_cross = TimeSeries::new(
            Array1::from_iter(im.iter().map(|x| cross_fac * x)),
            params.delta_t,
        );

        // Taper over one starting gravitational-wave cycle.
        let n_ramp = ((1.0 / f_start) / params.delta_t).ceil() as usize;
        h_plus.taper_start(n_ramp.min(n_out / 2));
        h_cross.taper_start(n_ramp.min(n_out / 2));

        debug!(
            "synthesized {} samples from {} at M = {:.2}, inclination {:.1} deg",
            n_out,
            wave_file.display(),
            params.total_mass,
            params.inclination_deg
        );
        Ok((h_plus, h_cross))
    }
}

/// Starting gravitational-wave frequency in geometric units (cycles per M),
/// estimated from the phase the complex strain accumulates over its first
/// quarter cycle.
fn start_frequency(t_geo: &[f64], h_re: &[f64], h_im: &[f64]) -> Option<f64> {
    let phase = |i: usize| f64::atan2(h_im[i], h_re[i]);

    let mut accumulated = 0.0;
    let mut prev = phase(0);
    for i in 1..t_geo.len() {
        let mut step = phase(i) - prev;
        // Unwrap across the branch cut.
        if step > std::f64::consts::PI {
            step -= 2.0 * std::f64::consts::PI;
        } else if step < -std::f64::consts::PI {
            step += 2.0 * std::f64::consts::PI;
        }
        accumulated += step.abs();
        prev = phase(i);

        if accumulated >= std::f64::consts::FRAC_PI_2 {
            let elapsed = t_geo[i] - t_geo[0];
            return Some(accumulated / (2.0 * std::f64::consts::PI * elapsed));
        }
    }
    None
}
