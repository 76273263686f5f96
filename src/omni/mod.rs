// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The redundant-calibration driver.
//!
//! No iteration happens here: the driver orders the input data, packs a
//! starting parameter vector, hands both to a [`CalSolver`] — the opaque
//! external minimizer seam — and unpacks and post-processes whatever comes
//! back. Its correctness rests entirely on the ordering and
//! packing/unpacking contracts of [`RedundantInfo`].

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use indexmap::IndexMap;
use log::debug;
use marlu::c64;
use ndarray::prelude::*;
use rayon::prelude::*;
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::container::DataContainer;
use crate::pol::{Pol, PolPair};
use crate::redinfo::{GainMap, InfoError, OmniMeta, RedundantInfo, VisMap};

/// Per-baseline weights with the same nesting as a [`VisMap`].
pub type WeightMap = HashMap<PolPair, IndexMap<(usize, usize), Array2<f64>>>;

#[derive(Error, Debug)]
pub enum OmniError {
    #[error(transparent)]
    Info(#[from] InfoError),

    #[error("The data supplied for calibration are empty")]
    NoData,

    #[error("The calibration solver failed: {0}")]
    Solver(String),
}

/// The external iterative solver: refine `calpar` against the ordered data.
/// `data` is laid out as (time, freq, baseline) in exactly
/// [`RedundantInfo::bl_order`] order, and `calpar` in the
/// [`RedundantInfo`] cell layout.
pub trait CalSolver {
    fn solve(
        &self,
        data: ArrayView3<c64>,
        calpar: &mut Array3<f64>,
        info: &RedundantInfo,
    ) -> Result<(), OmniError>;
}

/// Accepts the packed first-guess parameters unchanged. This is the default
/// wiring when no external minimizer is linked; the driver's seeding makes
/// it exact for internally-consistent data.
pub struct PassthroughSolver;

impl CalSolver for PassthroughSolver {
    fn solve(
        &self,
        _data: ArrayView3<c64>,
        _calpar: &mut Array3<f64>,
        _info: &RedundantInfo,
    ) -> Result<(), OmniError> {
        Ok(())
    }
}

/// How per-baseline crosstalk estimates combine residuals over time.
#[derive(Debug, Display, EnumString, Clone, Copy, PartialEq, Eq)]
pub enum XtalkCombine {
    #[strum(serialize = "mean")]
    Mean,

    #[strum(serialize = "median")]
    Median,
}

fn unit_gains(info: &RedundantInfo, nt: usize, nf: usize) -> GainMap {
    let mut gains = GainMap::default();
    for &pol in info.pols() {
        let pol_gains = gains.entry(pol).or_default();
        for &ant in info.subsetant() {
            pol_gains.insert(ant, Array2::from_elem((nt, nf), c64::new(1.0, 0.0)));
        }
    }
    gains
}

fn gain_at(gains: &GainMap, pol: Pol, ant: usize, t: usize, f: usize) -> c64 {
    gains
        .get(&pol)
        .and_then(|m| m.get(&ant))
        .map(|arr| arr[(t, f)])
        .unwrap_or_else(|| c64::new(1.0, 0.0))
}

/// Run one redundant-calibration pass: order the data, seed the parameter
/// vector from `gains0` (the first-pass "nondegenerate" gains) and the
/// gain-corrected group means, refine with `solver`, and return the
/// unpacked gains, unique-baseline visibilities and diagnostics with
/// per-baseline residuals.
///
/// The forward model is `data(i,j) ≈ g_i · conj(g_j) · V_ubl`. When
/// `gains0` is `None`, unit gains are assumed.
pub fn run_omnical<S: CalSolver>(
    data: &DataContainer<Array2<c64>>,
    info: &RedundantInfo,
    gains0: Option<&GainMap>,
    solver: &S,
) -> Result<(OmniMeta, GainMap, VisMap), OmniError> {
    let ordered = info.order_data(data)?;
    let (nt, nf, nbl) = ordered.dim();
    if nt == 0 || nf == 0 || nbl == 0 {
        return Err(OmniError::NoData);
    }
    debug!("run_omnical: {nt} times, {nf} freqs, {nbl} baselines");

    let unit;
    let gains0 = match gains0 {
        Some(g) => g,
        None => {
            unit = unit_gains(info, nt, nf);
            &unit
        }
    };

    // Seed each unique-baseline visibility with the mean of its group's
    // gain-corrected members.
    let mut vis0 = VisMap::default();
    let mut k = 0;
    for group in info.get_reds() {
        let (ra, rb) = group[0];
        let mut acc = Array2::<c64>::zeros((nt, nf));
        for &(a, b) in group {
            for t in 0..nt {
                for f in 0..nf {
                    let g = gain_at(gains0, a.pol(), a.ant(), t, f)
                        * gain_at(gains0, b.pol(), b.ant(), t, f).conj();
                    acc[(t, f)] += ordered[(t, f, k)] / g;
                }
            }
            k += 1;
        }
        acc.mapv_inplace(|v| v / group.len() as f64);
        vis0.entry(PolPair(ra.pol(), rb.pol()))
            .or_default()
            .insert((ra.ant(), rb.ant()), acc);
    }

    let mut calpar = Array3::zeros((nt, nf, info.calpar_width()));
    info.pack_calpar(&mut calpar, Some(gains0), Some(&vis0), Some(gains0))?;

    solver.solve(ordered.view(), &mut calpar, info)?;

    let (mut meta, gains, vis) = info.unpack_calpar(calpar.view(), Some(gains0))?;

    // Post-fit residuals against the refined model, and the resulting
    // chi-square per cell.
    let mut res = VisMap::default();
    let mut chisq = Array2::<f64>::zeros((nt, nf));
    let mut k = 0;
    for group in info.get_reds() {
        let (ra, rb) = group[0];
        let v = &vis[&PolPair(ra.pol(), rb.pol())][&(ra.ant(), rb.ant())];
        for &(a, b) in group {
            let gi = &gains[&a.pol()][&a.ant()];
            let gj = &gains[&b.pol()][&b.ant()];
            let mut r = Array2::<c64>::zeros((nt, nf));
            for t in 0..nt {
                for f in 0..nf {
                    let model = gi[(t, f)] * gj[(t, f)].conj() * v[(t, f)];
                    let resid = ordered[(t, f, k)] - model;
                    r[(t, f)] = resid;
                    chisq[(t, f)] += resid.norm_sqr();
                }
            }
            res.entry(PolPair(a.pol(), b.pol()))
                .or_default()
                .insert((a.ant(), b.ant()), r);
            k += 1;
        }
    }
    meta.res = res;
    meta.chisq = chisq;
    Ok((meta, gains, vis))
}

fn median(values: &mut Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Estimate per-baseline crosstalk: a time-static signal component, taken
/// as the weighted time-average (or component-wise median) of calibration
/// residuals at each frequency, broadcast back across all times. Cells
/// with zero total weight produce zeros rather than a divide-by-zero
/// fault.
pub fn compute_xtalk(res: &VisMap, wgts: &WeightMap, combine: XtalkCombine) -> VisMap {
    let mut xtalk = VisMap::default();
    for (pp, bls) in res {
        let estimates: Vec<((usize, usize), Array2<c64>)> = bls
            .iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(&bl, r)| {
                let (nt, nf) = r.dim();
                let w = wgts.get(pp).and_then(|m| m.get(&bl));
                let mut avg = Array1::<c64>::zeros(nf);
                for f in 0..nf {
                    avg[f] = match combine {
                        XtalkCombine::Mean => {
                            let mut sum = c64::new(0.0, 0.0);
                            let mut sum_w = 0.0;
                            for t in 0..nt {
                                let wt = w.map(|w| w[(t, f)]).unwrap_or(1.0);
                                sum += r[(t, f)] * wt;
                                sum_w += wt;
                            }
                            if sum_w > 0.0 {
                                sum / sum_w
                            } else {
                                c64::new(0.0, 0.0)
                            }
                        }
                        XtalkCombine::Median => {
                            let mut re = vec![];
                            let mut im = vec![];
                            for t in 0..nt {
                                let wt = w.map(|w| w[(t, f)]).unwrap_or(1.0);
                                if wt > 0.0 {
                                    re.push(r[(t, f)].re);
                                    im.push(r[(t, f)].im);
                                }
                            }
                            c64::new(median(&mut re), median(&mut im))
                        }
                    };
                }
                // Broadcast the one estimate per frequency across times.
                let full = Array2::from_shape_fn((nt, nf), |(_, f)| avg[f]);
                (bl, full)
            })
            .collect();
        let out = xtalk.entry(*pp).or_default();
        for (bl, estimate) in estimates {
            out.insert(bl, estimate);
        }
    }
    xtalk
}
