//! Time- and frequency-domain series plus the conditioning steps applied
//! to reconstructed waveforms before matching.

use std::f64::consts::PI;

use ndarray::Array1;
use num_complex::Complex64;

use crate::fft::real_forward;
use crate::ndarray_utils::loglog_interp;

/// Number of seconds of reconstruction retained around the waveform peak
/// by [`extract_wave`].
const EXTRACT_LEN: f64 = 2.0;
/// The retained stretch is centred on the peak minus this many seconds.
const EXTRACT_OFFSET: f64 = 0.5;

/// A uniformly sampled real-valued strain series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    /// Strain samples.
    pub data: Array1<f64>,
    /// Sample spacing in seconds.
    pub delta_t: f64,
}

impl TimeSeries {
    /// Wrap raw samples at the given spacing.
    pub fn new(data: Array1<f64>, delta_t: f64) -> Self {
        Self { data, delta_t }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the series holds no samples.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.len() as f64 * self.delta_t
    }

    /// Zero-pad or truncate to exactly `n` samples.
    pub fn resize(&mut self, n: usize) {
        if n == self.len() {
            return;
        }
        let mut out = Array1::zeros(n);
        let keep = n.min(self.len());
        out.slice_mut(ndarray::s![..keep])
            .assign(&self.data.slice(ndarray::s![..keep]));
        self.data = out;
    }

    /// Transform to the frequency domain with the physical `Δt · DFT`
    /// normalisation, zero-padding to the next power of two first.
    pub fn to_frequency_series(&self) -> FrequencySeries {
        let n = self.len().max(2).next_power_of_two();
        let mut padded = vec![0.0; n];
        padded[..self.len()].copy_from_slice(self.data.as_slice().expect("contiguous"));

        let spectrum: Vec<Complex64> = real_forward(&padded)
            .into_iter()
            .map(|x| x * self.delta_t)
            .collect();

        FrequencySeries {
            data: Array1::from_vec(spectrum),
            delta_f: 1.0 / (n as f64 * self.delta_t),
            delta_t: self.delta_t,
            time_len: n,
        }
    }

    /// Ramp the first `n_ramp` samples up from zero with a half-Hann
    /// window, suppressing the startup transient of a truncated inspiral.
    pub fn taper_start(&mut self, n_ramp: usize) {
        let n_ramp = n_ramp.min(self.len());
        for (i, x) in self.data.iter_mut().take(n_ramp).enumerate() {
            let w = 0.5 * (1.0 - (PI * i as f64 / n_ramp as f64).cos());
            *x *= w;
        }
    }
}

/// One-sided spectrum of a real series (bins `0..=n/2`).
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencySeries {
    /// Complex spectrum, `Δt`-normalised.
    pub data: Array1<Complex64>,
    /// Bin spacing in Hz.
    pub delta_f: f64,
    /// Sample spacing of the originating time series.
    pub delta_t: f64,
    /// Length of the (padded) time series this spectrum came from.
    pub time_len: usize,
}

impl FrequencySeries {
    /// Number of frequency bins (`n/2 + 1`).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the spectrum holds no bins.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Frequency of each bin in Hz.
    pub fn frequencies(&self) -> Array1<f64> {
        Array1::from_iter((0..self.len()).map(|k| k as f64 * self.delta_f))
    }

    /// Divide the spectrum by a per-bin amplitude spectral density.
    ///
    /// # Panics
    /// Panics if `asd` does not have one value per bin.
    pub fn whiten(&mut self, asd: &Array1<f64>) {
        assert_eq!(
            asd.len(),
            self.len(),
            "ASD must be sampled on the analysis frequency axis"
        );
        for (x, &a) in self.data.iter_mut().zip(asd.iter()) {
            *x /= a;
        }
    }
}

/// Tukey (tapered-cosine) window of length `n` with taper fraction `alpha`.
pub fn tukey(n: usize, alpha: f64) -> Array1<f64> {
    if n == 0 {
        return Array1::zeros(0);
    }
    let taper = (alpha * (n - 1) as f64 / 2.0).floor() as usize;
    Array1::from_iter((0..n).map(|i| {
        let i_mirrored = i.min(n - 1 - i);
        if i_mirrored < taper {
            0.5 * (1.0 + (PI * (2.0 * i_mirrored as f64 / (alpha * (n - 1) as f64) - 1.0)).cos())
        } else {
            1.0
        }
    }))
}

/// Resample an amplitude-spectral-density table onto the analysis
/// frequency axis of a `datalen`-second, `1/delta_t`-Hz segment.
///
/// Interpolation happens in log–log space; out-of-band bins clamp to the
/// table endpoints.
pub fn resample_asd(
    table_freqs: &[f64],
    table_values: &[f64],
    datalen: f64,
    delta_t: f64,
) -> Array1<f64> {
    let n = ((datalen / delta_t) as usize).max(2).next_power_of_two();
    let delta_f = 1.0 / (n as f64 * delta_t);
    let freqs: Vec<f64> = (0..n / 2 + 1).map(|k| k as f64 * delta_f).collect();
    Array1::from_vec(loglog_interp(&freqs, table_freqs, table_values))
}

/// Extract the 2 s of a reconstruction around its peak, window it with a
/// Tukey(0.1) taper, and re-centre it in a fresh `datalen`-second buffer.
///
/// Used to clean up single-sample reconstructions whose raw output spans
/// much more data than the signal itself.
pub fn extract_wave(inwave: &[f64], datalen: f64, sample_rate: f64) -> Array1<f64> {
    let nsamp = (EXTRACT_LEN * sample_rate) as usize;
    let peak = inwave
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.abs().partial_cmp(&b.abs()).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0);
    let center = peak.saturating_sub((EXTRACT_OFFSET * sample_rate) as usize);

    let start = center.saturating_sub(nsamp / 2);
    let stop = (center + nsamp / 2).min(inwave.len());
    let window = tukey(stop - start, 0.1);
    let extracted: Vec<f64> = inwave[start..stop]
        .iter()
        .zip(window.iter())
        .map(|(x, w)| x * w)
        .collect();

    let out_len = (datalen * sample_rate) as usize;
    let mut out = Array1::zeros(out_len);
    let place = out_len / 2 - extracted.len().min(out_len) / 2;
    for (i, &x) in extracted.iter().take(out_len).enumerate() {
        out[place + i] = x;
    }
    out
}
