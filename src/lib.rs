#![warn(missing_docs)]

//! Fitting factors between gravitational-wave burst reconstructions and
//! numerical-relativity merger waveforms. \
//! Given per-detector burst reconstructions (BayesWave posterior samples,
//! a coherent WaveBurst point estimate, or a hardware injection) and a
//! catalog of binary-black-hole simulations, this crate finds, for every
//! simulation and reconstruction sample, the total mass and inclination
//! that maximise the two-detector network match.
//!
//! ## Interface
//! The catalog side starts with [`Catalog`]: load a manifest, restrict it
//! with [`ParameterBounds`], and physically duplicate runs are removed
//! deterministically. The match side is driven by [`MatchSweep`], which
//! optimizes a [`NetworkObjective`] per `(simulation, sample)` cell via
//! [`FittingFactorSearch`] and collects the results into a persistable
//! [`SweepBundle`].
//!
//! Example:
//! ```no_run
//! # use nrmatch::{Catalog, ParameterBounds};
//! # fn main() -> nrmatch::Result<()> {
//! let catalog = Catalog::load("catalog/README.txt".as_ref())?;
//! let selected = catalog.select(
//!     &ParameterBounds::new().with("q", 1.9, 4.1).with("spin1z", 0.0, 0.8),
//! );
//! # Ok(()) }
//! ```
//!
//! ## Parameters
//! - The search interval in total mass comes from the configured
//!   chirp-mass bounds through `M = M_chirp · η^(-3/5)` per simulation.
//! - Outside that interval the per-detector match is defined to be
//!   exactly zero, so the mismatch surface is flat there; the randomized
//!   starts always fall inside the interval.
//! - Templates are whitened by the detector amplitude spectral density;
//!   the reconstructions are expected to be whitened detector responses
//!   already.
//!
//! With the `parallel` feature (default), [`MatchSweep::run_par`] spreads
//! the independent per-sample optimizations across a rayon pool.

pub mod catalog;
pub mod config;
pub mod error;
pub(crate) mod fft;
pub mod filter;
pub mod io;
pub mod netmatch;
pub(crate) mod ndarray_utils;
pub mod optimize;
pub mod series;
pub mod spin;
pub mod sweep;
pub mod waveform;

pub use catalog::{Catalog, ParameterBounds, SimulationRecord};
pub use config::{Algorithm, Configuration};
pub use error::{Error, Result};
pub use netmatch::{
    DetectorInput, FittingFactorSearch, MatchSearchResult, NetworkObjective,
};
pub use optimize::{LocalMinimizer, Minimum, NelderMead};
pub use series::{FrequencySeries, TimeSeries};
pub use sweep::{DetectorData, MatchSweep, SweepBundle};
pub use waveform::{NrFileSource, WaveformParams, WaveformSource};
