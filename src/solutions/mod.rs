// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to read and write calibration solutions.
//!
//! Solutions are carried in a calfits-style FITS layout; see the module
//! docs of [`calfits`] for the exact HDUs. Reading supports concatenating
//! a batch of files along the time axis — the batch must agree on its
//! frequency array, gain convention, integration time and calibration
//! type — and merging single-polarization files into one
//! multi-polarization set.

mod calfits;
mod error;
#[cfg(test)]
mod tests;

pub use error::{SolutionsReadError, SolutionsWriteError};

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use marlu::c64;
use ndarray::prelude::*;
use strum_macros::{Display, EnumString};

use crate::pol::Pol;
use crate::redinfo::GainMap;

/// Whether the forward model multiplies or divides raw data by antenna
/// gains to predict the true sky signal.
#[derive(Debug, Display, EnumString, Clone, Copy, PartialEq, Eq)]
pub enum GainConvention {
    #[strum(serialize = "multiply")]
    Multiply,

    #[strum(serialize = "divide")]
    Divide,
}

/// What the solution arrays hold: complex gains over (time, freq), or one
/// delay per integration.
#[derive(Debug, Display, EnumString, Clone, Copy, PartialEq, Eq)]
pub enum CalType {
    #[strum(serialize = "gain")]
    Gain,

    #[strum(serialize = "delay")]
    Delay,
}

/// Per-antenna delays: polarization → antenna → (time, 1) array \[seconds\].
pub type DelayMap = HashMap<Pol, IndexMap<usize, Array2<f64>>>;

/// Per-antenna flags: polarization → antenna → (time, freq) array.
pub type FlagMap = HashMap<Pol, IndexMap<usize, Array2<bool>>>;

/// Per-antenna quality (chi-square): polarization → antenna → (time, freq).
pub type QualityMap = HashMap<Pol, IndexMap<usize, Array2<f64>>>;

/// Calibration solution metadata.
#[derive(Debug, Clone)]
pub struct CalMeta {
    /// Channel frequencies \[Hz\].
    pub freqs: Vec<f64>,

    /// Times \[Julian date\].
    pub times: Vec<f64>,

    /// Local sidereal times \[radians\]; may be empty.
    pub lsts: Vec<f64>,

    pub history: String,

    pub gain_convention: GainConvention,

    /// \[seconds\]
    pub integration_time: f64,

    /// Overall chi-square per (time, freq) cell, when known.
    pub chisq: Option<Array2<f64>>,
}

/// One set of calibration solutions, in memory.
#[derive(Debug, Clone)]
pub struct CalSolutions {
    pub meta: CalMeta,
    pub cal_type: CalType,

    /// The antennas carried by the arrays, sorted.
    pub ants: Vec<usize>,

    /// Complex gains; empty for a delay-type set that hasn't been
    /// converted.
    pub gains: GainMap,

    /// Raw delays of a delay-type set.
    pub delays: Option<DelayMap>,

    pub flags: FlagMap,

    /// Per-antenna solution quality, when known.
    pub quality: Option<QualityMap>,
}

/// Options for [`CalSolutions::read`].
#[derive(Debug, Default, Clone)]
pub struct ReadOptions {
    /// Keep delay-type solutions as delays instead of converting them to
    /// gains.
    pub keep_delay: bool,

    /// Select only these antennas.
    pub antenna_nums: Option<Vec<usize>>,
}

/// The phase gains implied by per-antenna delays: e^{-2πifτ} over the
/// frequency array, per time.
pub fn gains_from_delays(freqs: &[f64], delays: &Array2<f64>) -> Array2<c64> {
    let nt = delays.len_of(Axis(0));
    Array2::from_shape_fn((nt, freqs.len()), |(t, f)| {
        let phase = -TAU * freqs[f] * delays[(t, 0)];
        c64::new(phase.cos(), phase.sin())
    })
}

fn float_key_mismatch(a: f64, b: f64) -> bool {
    (a - b).abs() > 1e-9
}

impl CalSolutions {
    /// The polarizations carried, in rank order.
    pub fn pols(&self) -> Vec<Pol> {
        let mut pols: Vec<Pol> = self
            .gains
            .keys()
            .chain(self.delays.iter().flat_map(|d| d.keys()))
            .chain(self.flags.keys())
            .copied()
            .collect();
        pols.sort_unstable();
        pols.dedup();
        pols
    }

    /// Read one or more calibration files, concatenating along the time
    /// axis. The batch must agree on frequencies, gain convention,
    /// integration time and calibration type; any disagreement rejects the
    /// whole batch.
    pub fn read(files: &[PathBuf], opts: &ReadOptions) -> Result<CalSolutions, SolutionsReadError> {
        let (first, rest) = files.split_first().ok_or(SolutionsReadError::NoFiles)?;
        debug!("Reading calibration solutions from {}", first.display());
        let mut sols = calfits::read(first)?;

        for file in rest {
            debug!("Concatenating calibration solutions from {}", file.display());
            let next = calfits::read(file)?;
            validate_batch_headers(&sols, &next, file)?;
            concat_time(&mut sols, next)?;
        }

        if let Some(antenna_nums) = &opts.antenna_nums {
            sols.select_antennas(antenna_nums);
        }

        if sols.cal_type == CalType::Delay && !opts.keep_delay {
            sols.convert_delays_to_gains();
        }
        Ok(sols)
    }

    /// Write these solutions to a calfits-style file.
    pub fn write(&self, file: &Path) -> Result<(), SolutionsWriteError> {
        if self.pols().is_empty() {
            return Err(SolutionsWriteError::NoPols);
        }
        debug!("Writing calibration solutions to {}", file.display());
        calfits::write(self, file)
    }

    /// Merge single-polarization files into one multi-polarization set.
    /// The files must agree on everything but their polarizations, and no
    /// polarization may appear twice.
    pub fn concatenate_on_pol(files: &[PathBuf]) -> Result<CalSolutions, SolutionsReadError> {
        let (first, rest) = files.split_first().ok_or(SolutionsReadError::NoFiles)?;
        let mut sols = calfits::read(first)?;

        for file in rest {
            let next = calfits::read(file)?;
            validate_batch_headers(&sols, &next, file)?;
            if sols.meta.times.len() != next.meta.times.len()
                || sols
                    .meta
                    .times
                    .iter()
                    .zip(next.meta.times.iter())
                    .any(|(&a, &b)| float_key_mismatch(a, b))
            {
                return Err(SolutionsReadError::Mismatch {
                    file: file.display().to_string(),
                    key: "TIMES",
                    expected: format!("{} times", sols.meta.times.len()),
                    got: "a different time array".to_string(),
                });
            }
            for pol in next.pols() {
                if sols.pols().contains(&pol) {
                    return Err(SolutionsReadError::DuplicatePol {
                        file: file.display().to_string(),
                        pol,
                    });
                }
            }

            let mut ants = sols.ants.clone();
            ants.extend(next.ants.iter().copied());
            ants.sort_unstable();
            ants.dedup();
            sols.ants = ants;
            for (pol, m) in next.gains {
                sols.gains.insert(pol, m);
            }
            if let Some(next_delays) = next.delays {
                let delays = sols.delays.get_or_insert_with(DelayMap::default);
                for (pol, m) in next_delays {
                    delays.insert(pol, m);
                }
            }
            for (pol, m) in next.flags {
                sols.flags.insert(pol, m);
            }
            if let Some(next_quality) = next.quality {
                let quality = sols.quality.get_or_insert_with(QualityMap::default);
                for (pol, m) in next_quality {
                    quality.insert(pol, m);
                }
            }
        }
        Ok(sols)
    }

    fn select_antennas(&mut self, antenna_nums: &[usize]) {
        self.ants.retain(|a| antenna_nums.contains(a));
        for maps in self.gains.values_mut() {
            maps.retain(|ant, _| antenna_nums.contains(ant));
        }
        if let Some(delays) = &mut self.delays {
            for maps in delays.values_mut() {
                maps.retain(|ant, _| antenna_nums.contains(ant));
            }
        }
        for maps in self.flags.values_mut() {
            maps.retain(|ant, _| antenna_nums.contains(ant));
        }
        if let Some(quality) = &mut self.quality {
            for maps in quality.values_mut() {
                maps.retain(|ant, _| antenna_nums.contains(ant));
            }
        }
    }

    /// Replace delay-type solutions with the phase gains they imply.
    pub fn convert_delays_to_gains(&mut self) {
        if let Some(delays) = &self.delays {
            for (&pol, per_ant) in delays {
                let pol_gains = self.gains.entry(pol).or_default();
                for (&ant, tau) in per_ant {
                    pol_gains.insert(ant, gains_from_delays(&self.meta.freqs, tau));
                }
            }
        }
        self.delays = None;
    }
}

fn validate_batch_headers(
    first: &CalSolutions,
    next: &CalSolutions,
    file: &Path,
) -> Result<(), SolutionsReadError> {
    let file = || file.display().to_string();
    if first.cal_type != next.cal_type {
        return Err(SolutionsReadError::Mismatch {
            file: file(),
            key: "CALTYPE",
            expected: first.cal_type.to_string(),
            got: next.cal_type.to_string(),
        });
    }
    if first.meta.gain_convention != next.meta.gain_convention {
        return Err(SolutionsReadError::Mismatch {
            file: file(),
            key: "GAINCONV",
            expected: first.meta.gain_convention.to_string(),
            got: next.meta.gain_convention.to_string(),
        });
    }
    if float_key_mismatch(first.meta.integration_time, next.meta.integration_time) {
        return Err(SolutionsReadError::Mismatch {
            file: file(),
            key: "INTTIME",
            expected: first.meta.integration_time.to_string(),
            got: next.meta.integration_time.to_string(),
        });
    }
    if first.meta.freqs.len() != next.meta.freqs.len()
        || first
            .meta
            .freqs
            .iter()
            .zip(next.meta.freqs.iter())
            .any(|(&a, &b)| float_key_mismatch(a, b))
    {
        return Err(SolutionsReadError::Mismatch {
            file: file(),
            key: "FREQS",
            expected: format!("{} channels", first.meta.freqs.len()),
            got: "a different frequency array".to_string(),
        });
    }
    Ok(())
}

fn concat_map_arrays<T: Clone>(
    target: &mut HashMap<Pol, IndexMap<usize, Array2<T>>>,
    source: HashMap<Pol, IndexMap<usize, Array2<T>>>,
    thing: &'static str,
) -> Result<(), SolutionsReadError> {
    for (pol, per_ant) in source {
        let target_per_ant = target.entry(pol).or_default();
        for (ant, arr) in per_ant {
            match target_per_ant.get_mut(&ant) {
                Some(existing) => {
                    let expected = existing.len_of(Axis(1));
                    let actual = arr.len_of(Axis(1));
                    *existing = ndarray::concatenate(Axis(0), &[existing.view(), arr.view()])
                        .map_err(|_| SolutionsReadError::BadShape {
                            thing,
                            expected,
                            actual,
                        })?;
                }
                None => {
                    target_per_ant.insert(ant, arr);
                }
            }
        }
    }
    Ok(())
}

fn concat_time(sols: &mut CalSolutions, next: CalSolutions) -> Result<(), SolutionsReadError> {
    sols.meta.times.extend(next.meta.times);
    sols.meta.lsts.extend(next.meta.lsts);
    sols.meta.chisq = match (sols.meta.chisq.take(), next.meta.chisq) {
        (Some(a), Some(b)) => {
            let expected = a.len_of(Axis(1));
            let actual = b.len_of(Axis(1));
            Some(
                ndarray::concatenate(Axis(0), &[a.view(), b.view()]).map_err(|_| {
                    SolutionsReadError::BadShape {
                        thing: "the chi-square array being concatenated",
                        expected,
                        actual,
                    }
                })?,
            )
        }
        _ => None,
    };

    concat_map_arrays(&mut sols.gains, next.gains, "a gain array being concatenated")?;
    if let Some(next_delays) = next.delays {
        let delays = sols.delays.get_or_insert_with(DelayMap::default);
        concat_map_arrays(delays, next_delays, "a delay array being concatenated")?;
    }
    concat_map_arrays(&mut sols.flags, next.flags, "a flag array being concatenated")?;
    if let Some(next_quality) = next.quality {
        let quality = sols.quality.get_or_insert_with(QualityMap::default);
        concat_map_arrays(quality, next_quality, "a quality array being concatenated")?;
    }
    Ok(())
}
