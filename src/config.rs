//! Analysis-run configuration, read from a sectioned key–value file.
//!
//! The file carries an `[analysis]` section (sampling and band), a
//! `[parameters]` section (sample count and chirp-mass search bounds) and
//! a `[paths]` section (per-detector reconstructions and spectral
//! estimates plus the catalog manifest).

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which reconstruction algorithm produced the input samples.
///
/// `Bw` reconstructions are posterior draws (many samples per event);
/// `Cwb` and `Hwinj` are deterministic (a single series to window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// BayesWave posterior samples.
    Bw,
    /// Coherent WaveBurst point estimate.
    Cwb,
    /// Hardware-injection reference waveform.
    Hwinj,
}

impl Algorithm {
    /// The tag used in configuration files and output names.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bw => "BW",
            Self::Cwb => "CWB",
            Self::Hwinj => "HWINJ",
        }
    }

    /// Whether this algorithm yields one sample per event.
    pub const fn is_deterministic(self) -> bool {
        !matches!(self, Self::Bw)
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BW" => Ok(Self::Bw),
            "CWB" => Ok(Self::Cwb),
            "HWINJ" => Ok(Self::Hwinj),
            other => Err(Error::Config(format!(
                "algorithm {other:?} not recognised; must be one of BW, CWB, HWINJ"
            ))),
        }
    }
}

/// Everything a sweep needs to know about one analysis run.
///
/// Constructed once at startup and read-only afterwards; the persisted
/// result bundle embeds a copy so a result file is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Samples per second of the reconstructions.
    pub sample_rate: u32,
    /// Derived sample spacing, `1 / sample_rate`.
    pub delta_t: f64,
    /// Analysis segment length in seconds.
    pub datalen: f64,
    /// Low-frequency cutoff of the match in Hz.
    pub f_min: f64,
    /// Source of the reconstructions.
    pub algorithm: Algorithm,
    /// How many posterior samples to analyse; `None` means all of them.
    pub nsampls: Option<usize>,
    /// Lower chirp-mass bound of the search, in solar masses.
    pub min_chirp_mass: f64,
    /// Upper chirp-mass bound of the search, in solar masses.
    pub max_chirp_mass: f64,
    /// H1 reconstruction file.
    pub h1_reconstruction: PathBuf,
    /// H1 amplitude-spectral-density file.
    pub h1_spectral_estimate: PathBuf,
    /// L1 reconstruction file.
    pub l1_reconstruction: PathBuf,
    /// L1 amplitude-spectral-density file.
    pub l1_spectral_estimate: PathBuf,
    /// Catalog manifest file.
    pub catalog: PathBuf,
}

impl Configuration {
    /// Read a configuration file; `algorithm_override` takes precedence
    /// over the `[analysis] algorithm` key when present.
    pub fn load(path: &Path, algorithm_override: Option<Algorithm>) -> Result<Configuration> {
        type Sections = HashMap<String, HashMap<String, String>>;

        fn get<'a>(sections: &'a Sections, section: &str, key: &str) -> Result<&'a str> {
            sections
                .get(section)
                .and_then(|s| s.get(key))
                .map(String::as_str)
                .ok_or_else(|| Error::Config(format!("missing [{section}] {key}")))
        }

        fn get_f64(sections: &Sections, section: &str, key: &str) -> Result<f64> {
            let raw = get(sections, section, key)?;
            raw.parse()
                .map_err(|e| Error::Config(format!("[{section}] {key} = {raw:?}: {e}")))
        }

        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read configuration {}: {e}", path.display()))
        })?;
        let sections = parse_sections(&text)?;

        let algorithm = match algorithm_override {
            Some(algorithm) => algorithm,
            None => match sections.get("analysis").and_then(|s| s.get("algorithm")) {
                Some(raw) => raw.parse()?,
                None => {
                    return Err(Error::Config(
                        "algorithm not defined; set [analysis] algorithm or pass --algorithm"
                            .into(),
                    ));
                }
            },
        };

        let sample_rate = get(&sections, "analysis", "sample-rate")?
            .parse::<u32>()
            .map_err(|e| Error::Config(format!("[analysis] sample-rate: {e}")))?;
        let nsampls = match sections.get("parameters").and_then(|s| s.get("nsampls")) {
            None => None,
            Some(raw) if raw == "all" => None,
            Some(raw) => Some(raw.parse::<usize>().map_err(|e| {
                Error::Config(format!("[parameters] nsampls = {raw:?}: {e}"))
            })?),
        };

        Ok(Configuration {
            sample_rate,
            delta_t: 1.0 / sample_rate as f64,
            datalen: get_f64(&sections, "analysis", "datalen")?,
            f_min: get_f64(&sections, "analysis", "f-min")?,
            algorithm,
            nsampls,
            min_chirp_mass: get_f64(&sections, "parameters", "min-chirp-mass")?,
            max_chirp_mass: get_f64(&sections, "parameters", "max-chirp-mass")?,
            h1_reconstruction: get(&sections, "paths", "h1_reconstruction")?.into(),
            h1_spectral_estimate: get(&sections, "paths", "h1_spectral-estimate")?.into(),
            l1_reconstruction: get(&sections, "paths", "l1_reconstruction")?.into(),
            l1_spectral_estimate: get(&sections, "paths", "l1_spectral-estimate")?.into(),
            catalog: get(&sections, "paths", "catalog")?.into(),
        })
    }

    /// Number of samples in one analysis segment.
    pub fn segment_samples(&self) -> usize {
        (self.datalen * self.sample_rate as f64) as usize
    }
}

/// Parse `[section]` / `key = value` text. `#` and `;` start comments;
/// blank lines are ignored.
fn parse_sections(text: &str) -> Result<HashMap<String, HashMap<String, String>>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = Some(name.trim().to_owned());
            sections.entry(name.trim().to_owned()).or_default();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(Error::Config(format!(
                "line {}: expected `key = value` or `[section]`, got {line:?}",
                idx + 1
            )));
        };
        let Some(section) = &current else {
            return Err(Error::Config(format!(
                "line {}: key {key:?} appears before any [section]",
                idx + 1
            )));
        };
        sections
            .get_mut(section)
            .expect("section inserted on entry")
            .insert(key.trim().to_owned(), value.trim().to_owned());
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use approx::assert_abs_diff_eq;

    use super::*;

    fn write_config(algorithm_line: &str, nsampls_line: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# analysis run\n\
             [analysis]\n\
             sample-rate = 2048\n\
             datalen = 4.0\n\
             f-min = 30.0\n\
             {algorithm_line}\n\
             \n\
             [parameters]\n\
             {nsampls_line}\n\
             min-chirp-mass = 25.0\n\
             max-chirp-mass = 45.0\n\
             \n\
             [paths]\n\
             h1_reconstruction = data/h1_waveforms.dat\n\
             h1_spectral-estimate = data/h1_asd.dat\n\
             l1_reconstruction = data/l1_waveforms.dat\n\
             l1_spectral-estimate = data/l1_asd.dat\n\
             catalog = catalog/README.txt"
        )
        .unwrap();
        file
    }

    #[test]
    fn full_file_parses() {
        let file = write_config("algorithm = BW", "nsampls = 200");
        let config = Configuration::load(file.path(), None).unwrap();

        assert_eq!(config.sample_rate, 2048);
        assert_abs_diff_eq!(config.delta_t, 1.0 / 2048.0);
        assert_eq!(config.algorithm, Algorithm::Bw);
        assert_eq!(config.nsampls, Some(200));
        assert_abs_diff_eq!(config.min_chirp_mass, 25.0);
        assert_eq!(config.segment_samples(), 8192);
        assert_eq!(config.catalog, PathBuf::from("catalog/README.txt"));
    }

    #[test]
    fn nsampls_all_means_every_sample() {
        let file = write_config("algorithm = CWB", "nsampls = all");
        let config = Configuration::load(file.path(), None).unwrap();
        assert_eq!(config.nsampls, None);
        assert!(config.algorithm.is_deterministic());
    }

    #[test]
    fn override_beats_the_file() {
        let file = write_config("algorithm = BW", "nsampls = all");
        let config = Configuration::load(file.path(), Some(Algorithm::Hwinj)).unwrap();
        assert_eq!(config.algorithm, Algorithm::Hwinj);
    }

    #[test]
    fn unknown_algorithm_is_fatal() {
        let file = write_config("algorithm = MAGIC", "nsampls = all");
        let err = Configuration::load(file.path(), None).unwrap_err();
        assert!(err.to_string().contains("MAGIC"));
    }

    #[test]
    fn missing_algorithm_is_fatal_without_override() {
        let file = write_config("", "nsampls = all");
        assert!(Configuration::load(file.path(), None).is_err());
        assert!(Configuration::load(file.path(), Some(Algorithm::Cwb)).is_ok());
    }

    #[test]
    fn missing_key_names_section_and_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[analysis]\nsample-rate = 1024\nalgorithm = CWB").unwrap();
        let err = Configuration::load(file.path(), None).unwrap_err();
        assert!(err.to_string().contains("[analysis] datalen"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Configuration::load(Path::new("/nonexistent.ini"), None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn roundtrips_through_serde() {
        let file = write_config("algorithm = BW", "nsampls = 100");
        let config = Configuration::load(file.path(), None).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: Configuration = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
