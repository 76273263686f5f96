// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The central bookkeeping structure of redundant calibration.
//!
//! A [`RedundantInfo`] fixes, once per calibration run, the mapping between
//! physical (antenna, polarization) identities and the offsets of the
//! solver's real-valued parameter vectors: one complex gain per usable
//! antenna feed, one complex visibility per unique baseline, plus trailing
//! diagnostics per (time, frequency) cell. It also fixes `bl_order()`, the
//! canonical baseline ordering presented to the solver, and is the single
//! place where baseline-reversal conjugation is enforced on solver input.
//!
//! Calpar cell layout: `[re, im]` per gain (first-feed major over
//! `subsetant`), then `[re, im]` per unique baseline, then the diagnostics
//! (iteration count, convergence measure, chi-square). Gains are stored
//! conjugated — the solver's forward model pairs each gain with the
//! conjugate of its partner — and are divided by previously-solved
//! "nondegenerate" gains when those are supplied, so the packed parameters
//! carry only the redundant-calibration degrees of freedom.


use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use log::debug;
use marlu::c64;
use ndarray::prelude::*;
use rayon::prelude::*;
use thiserror::Error;

use crate::antpol::AntPol;
use crate::constants::NUM_CALPAR_DIAGNOSTICS;
use crate::container::DataContainer;
use crate::layout::ArrayLayout;
use crate::pol::{unique_pols, Pol, PolPair};
use crate::reds::{compute_reds, filter_reds, reds_for_minimal_v, Red, RedFilter, RedsError};

/// Gain solutions: polarization → antenna → (time, freq) array.
pub type GainMap = HashMap<Pol, IndexMap<usize, Array2<c64>>>;

/// Visibility solutions: polarization pair → baseline → (time, freq) array.
pub type VisMap = HashMap<PolPair, IndexMap<(usize, usize), Array2<c64>>>;

#[derive(Error, Debug)]
pub enum InfoError {
    #[error(transparent)]
    Reds(#[from] RedsError),

    #[error("Antenna {ant} appears in the redundant groups but is outside the antenna count {nant}")]
    AntOutOfRange { ant: usize, nant: usize },

    #[error("Polarization '{0}' appears in the redundant groups but not in the polarization list")]
    UnknownPol(Pol),

    #[error("Baseline ({i},{j}) [{pol}] was present in neither orientation of the input data")]
    MissingBaseline { i: usize, j: usize, pol: PolPair },

    #[error("Expected calpar cells {expected} values wide, but the supplied array is {actual} wide")]
    BadCalparWidth { expected: usize, actual: usize },

    #[error("Expected {thing} to have shape {expected:?}, but got {actual:?}")]
    BadShape {
        thing: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

fn check_shape(
    thing: &'static str,
    actual: (usize, usize),
    expected: (usize, usize),
) -> Result<(), InfoError> {
    if actual == expected {
        Ok(())
    } else {
        Err(InfoError::BadShape {
            thing,
            expected,
            actual,
        })
    }
}

/// Options for building a [`RedundantInfo`] from array geometry.
#[derive(Debug, Clone)]
pub struct InfoOptions {
    /// Antennas to exclude from calibration.
    pub ex_ants: Vec<usize>,

    /// Separation-vector clustering tolerance \[metres\].
    pub tol: f64,

    /// Apply the minimal-V reduction (merge xy with yx classes).
    pub minimal_v: bool,
}

impl Default for InfoOptions {
    fn default() -> InfoOptions {
        InfoOptions {
            ex_ants: vec![],
            tol: crate::constants::DEFAULT_REDUNDANCY_TOL,
            minimal_v: false,
        }
    }
}

/// Immutable-after-construction parameter bookkeeping for one calibration
/// run.
#[derive(Debug, Clone)]
pub struct RedundantInfo {
    nant: usize,
    pols: Vec<Pol>,
    subsetant: Vec<usize>,
    ant_index: HashMap<usize, usize>,
    reds: Vec<Red>,
    bl_order: Vec<(AntPol, AntPol)>,
}

impl RedundantInfo {
    /// Build from already-grouped baselines. `nant` is the antenna index
    /// space the groups were enumerated over (not the usable count).
    pub fn from_reds(nant: usize, pols: &[Pol], reds: Vec<Red>) -> Result<RedundantInfo, InfoError> {
        let mut pols = pols.to_vec();
        pols.sort_unstable();
        pols.dedup();

        let mut ants = BTreeSet::new();
        for group in &reds {
            if group.is_empty() {
                return Err(InfoError::Reds(RedsError::EmptyGroup));
            }
            for &(a, b) in group {
                for ap in [a, b] {
                    if ap.ant() >= nant {
                        return Err(InfoError::AntOutOfRange {
                            ant: ap.ant(),
                            nant,
                        });
                    }
                    if !pols.contains(&ap.pol()) {
                        return Err(InfoError::UnknownPol(ap.pol()));
                    }
                    ants.insert(ap.ant());
                }
            }
        }

        let subsetant: Vec<usize> = ants.into_iter().collect();
        let ant_index = subsetant
            .iter()
            .enumerate()
            .map(|(dense, &ant)| (ant, dense))
            .collect();
        let bl_order = reds.iter().flatten().copied().collect();

        debug!(
            "RedundantInfo: {} usable antennas, {} groups, {} baselines",
            subsetant.len(),
            reds.len(),
            reds.iter().map(Vec::len).sum::<usize>()
        );
        Ok(RedundantInfo {
            nant,
            pols,
            subsetant,
            ant_index,
            reds,
            bl_order,
        })
    }

    /// Build from array geometry: group usable antennas into redundant
    /// classes for the requested polarization pairs, optionally applying
    /// the minimal-V reduction.
    pub fn from_layout(
        layout: &ArrayLayout,
        pol_pairs: &[PolPair],
        opts: &InfoOptions,
    ) -> Result<RedundantInfo, InfoError> {
        let pols = unique_pols(pol_pairs);
        let nant = layout.nant();
        let antpos: Vec<Option<[f64; 3]>> = (0..nant)
            .map(|a| {
                if opts.ex_ants.contains(&a) {
                    None
                } else {
                    layout.position(a)
                }
            })
            .collect();

        let reds = compute_reds(nant, &pols, &antpos, opts.tol)?;
        let reds = filter_reds(
            &reds,
            &RedFilter {
                pols: Some(pol_pairs.to_vec()),
                ..Default::default()
            },
        );
        let reds = if opts.minimal_v {
            reds_for_minimal_v(&reds)?
        } else {
            reds
        };
        Self::from_reds(nant, &pols, reds)
    }

    /// The antenna index space this structure was built over.
    pub fn nant(&self) -> usize {
        self.nant
    }

    pub fn pols(&self) -> &[Pol] {
        &self.pols
    }

    /// The sorted usable antenna indices.
    pub fn subsetant(&self) -> &[usize] {
        &self.subsetant
    }

    pub fn get_reds(&self) -> &[Red] {
        &self.reds
    }

    /// The representative (first) baseline of each redundant group; one
    /// free visibility parameter each.
    pub fn ubls(&self) -> Vec<(AntPol, AntPol)> {
        self.reds.iter().map(|group| group[0]).collect()
    }

    pub fn num_ubls(&self) -> usize {
        self.reds.len()
    }

    /// The number of gain parameters: one per (usable antenna, feed).
    pub fn num_gains(&self) -> usize {
        self.subsetant.len() * self.pols.len()
    }

    /// The canonical baseline ordering presented to the solver: groups in
    /// construction order, members in group order. Stable across calls for
    /// the same construction inputs.
    pub fn bl_order(&self) -> &[(AntPol, AntPol)] {
        &self.bl_order
    }

    /// The exact calpar cell width for a parameter universe of `num_gains`
    /// gains and `num_ubls` unique baselines.
    pub fn calpar_size(num_gains: usize, num_ubls: usize) -> usize {
        2 * (num_gains + num_ubls) + NUM_CALPAR_DIAGNOSTICS
    }

    /// The calpar cell width of this parameter universe.
    pub fn calpar_width(&self) -> usize {
        Self::calpar_size(self.num_gains(), self.num_ubls())
    }

    /// The calpar offset of one antenna feed's gain, or `None` when the
    /// antenna isn't usable or the polarization isn't carried.
    pub fn gain_offset(&self, ant: usize, pol: Pol) -> Option<usize> {
        let dense = *self.ant_index.get(&ant)?;
        let prank = self.pols.iter().position(|&p| p == pol)?;
        Some(2 * (prank * self.subsetant.len() + dense))
    }

    fn vis_offset(&self, group: usize) -> usize {
        2 * self.num_gains() + 2 * group
    }

    fn diag_offset(&self) -> usize {
        2 * (self.num_gains() + self.num_ubls())
    }

    fn check_calpar_width(&self, width: usize) -> Result<(), InfoError> {
        if width == self.calpar_width() {
            Ok(())
        } else {
            Err(InfoError::BadCalparWidth {
                expected: self.calpar_width(),
                actual: width,
            })
        }
    }

    /// Stack the input data along the last axis in exactly [`bl_order`]
    /// order, conjugating entries stored in the reversed orientation.
    /// A baseline present in neither orientation is an error, never
    /// guessed.
    ///
    /// [`bl_order`]: RedundantInfo::bl_order
    pub fn order_data(
        &self,
        data: &DataContainer<Array2<c64>>,
    ) -> Result<Array3<c64>, InfoError> {
        let mut columns = Vec::with_capacity(self.bl_order.len());
        for &(a, b) in &self.bl_order {
            let pp = PolPair(a.pol(), b.pol());
            let column =
                data.get((a.ant(), b.ant()), pp)
                    .ok_or_else(|| InfoError::MissingBaseline {
                        i: a.ant(),
                        j: b.ant(),
                        pol: pp,
                    })?;
            columns.push(column);
        }

        let (nt, nf) = match columns.first() {
            Some(first) => first.dim(),
            None => return Ok(Array3::zeros((0, 0, 0))),
        };
        for column in &columns {
            check_shape("a visibility array", column.dim(), (nt, nf))?;
        }

        let mut ordered = Array3::zeros((nt, nf, columns.len()));
        ordered
            .axis_iter_mut(Axis(2))
            .into_par_iter()
            .zip(columns.par_iter())
            .for_each(|(mut out, column)| out.assign(column));
        Ok(ordered)
    }

    /// Write gain and visibility values into the fixed calpar layout at
    /// every (time, freq) cell. Entries missing for a valid antenna or
    /// group are zero-filled — the solver is expected to converge from
    /// zero — but a `None` map leaves that whole section untouched.
    /// Diagnostic slots are never written.
    pub fn pack_calpar(
        &self,
        calpar: &mut Array3<f64>,
        gains: Option<&GainMap>,
        vis: Option<&VisMap>,
        nondegenerategains: Option<&GainMap>,
    ) -> Result<(), InfoError> {
        let (nt, nf, width) = calpar.dim();
        self.check_calpar_width(width)?;

        if let Some(gains) = gains {
            for (prank, &pol) in self.pols.iter().enumerate() {
                for (dense, &ant) in self.subsetant.iter().enumerate() {
                    let slot = 2 * (prank * self.subsetant.len() + dense);
                    let g = gains.get(&pol).and_then(|m| m.get(&ant));
                    let ndg = nondegenerategains
                        .and_then(|n| n.get(&pol))
                        .and_then(|m| m.get(&ant));
                    match g {
                        Some(g) => {
                            check_shape("a gain array", g.dim(), (nt, nf))?;
                            if let Some(ndg) = ndg {
                                check_shape("a nondegenerate gain array", ndg.dim(), (nt, nf))?;
                            }
                            for t in 0..nt {
                                for f in 0..nf {
                                    let mut v = g[(t, f)];
                                    if let Some(ndg) = ndg {
                                        v /= ndg[(t, f)];
                                    }
                                    let v = v.conj();
                                    calpar[(t, f, slot)] = v.re;
                                    calpar[(t, f, slot + 1)] = v.im;
                                }
                            }
                        }
                        None => calpar.slice_mut(s![.., .., slot..slot + 2]).fill(0.0),
                    }
                }
            }
        }

        if let Some(vis) = vis {
            for (u, group) in self.reds.iter().enumerate() {
                let (a, b) = group[0];
                let pp = PolPair(a.pol(), b.pol());
                let slot = self.vis_offset(u);
                // The representative may be stored in either orientation.
                let v = vis
                    .get(&pp)
                    .and_then(|m| m.get(&(a.ant(), b.ant())).cloned())
                    .or_else(|| {
                        vis.get(&pp.swapped()).and_then(|m| {
                            m.get(&(b.ant(), a.ant())).map(|arr| arr.mapv(|x| x.conj()))
                        })
                    });
                match v {
                    Some(v) => {
                        check_shape("a visibility array", v.dim(), (nt, nf))?;
                        for t in 0..nt {
                            for f in 0..nf {
                                calpar[(t, f, slot)] = v[(t, f)].re;
                                calpar[(t, f, slot + 1)] = v[(t, f)].im;
                            }
                        }
                    }
                    None => calpar.slice_mut(s![.., .., slot..slot + 2]).fill(0.0),
                }
            }
        }

        Ok(())
    }

    /// Reconstruct (meta, gains, vis) from a calpar array: the inverse of
    /// [`pack_calpar`]. When `nondegenerategains` is supplied the
    /// degeneracy removal is inverted (multiply back) before gains are
    /// returned.
    ///
    /// [`pack_calpar`]: RedundantInfo::pack_calpar
    pub fn unpack_calpar(
        &self,
        calpar: ArrayView3<f64>,
        nondegenerategains: Option<&GainMap>,
    ) -> Result<(OmniMeta, GainMap, VisMap), InfoError> {
        let (nt, nf, width) = calpar.dim();
        self.check_calpar_width(width)?;
        let d = self.diag_offset();

        let meta = OmniMeta {
            iters: calpar.slice(s![.., .., d]).to_owned(),
            conv: calpar.slice(s![.., .., d + 1]).to_owned(),
            chisq: calpar.slice(s![.., .., d + 2]).to_owned(),
            res: VisMap::default(),
        };

        let mut gains = GainMap::default();
        for (prank, &pol) in self.pols.iter().enumerate() {
            let pol_gains = gains.entry(pol).or_default();
            for (dense, &ant) in self.subsetant.iter().enumerate() {
                let slot = 2 * (prank * self.subsetant.len() + dense);
                let ndg = nondegenerategains
                    .and_then(|n| n.get(&pol))
                    .and_then(|m| m.get(&ant));
                if let Some(ndg) = ndg {
                    check_shape("a nondegenerate gain array", ndg.dim(), (nt, nf))?;
                }
                let mut arr = Array2::zeros((nt, nf));
                for t in 0..nt {
                    for f in 0..nf {
                        let stored = c64::new(calpar[(t, f, slot)], calpar[(t, f, slot + 1)]);
                        let mut v = stored.conj();
                        if let Some(ndg) = ndg {
                            v *= ndg[(t, f)];
                        }
                        arr[(t, f)] = v;
                    }
                }
                pol_gains.insert(ant, arr);
            }
        }

        let mut vis = VisMap::default();
        for (u, group) in self.reds.iter().enumerate() {
            let (a, b) = group[0];
            let pp = PolPair(a.pol(), b.pol());
            let slot = self.vis_offset(u);
            let mut arr = Array2::zeros((nt, nf));
            for t in 0..nt {
                for f in 0..nf {
                    arr[(t, f)] = c64::new(calpar[(t, f, slot)], calpar[(t, f, slot + 1)]);
                }
            }
            vis.entry(pp).or_default().insert((a.ant(), b.ant()), arr);
        }

        Ok((meta, gains, vis))
    }
}

/// Solver diagnostics and residuals for one calibration run.
#[derive(Debug, Clone, Default)]
pub struct OmniMeta {
    /// Iteration counts per (time, freq) cell.
    pub iters: Array2<f64>,

    /// Convergence measure per (time, freq) cell.
    pub conv: Array2<f64>,

    /// Chi-square per (time, freq) cell.
    pub chisq: Array2<f64>,

    /// Post-fit residuals per polarization pair and baseline; populated by
    /// the calibration driver.
    pub res: VisMap,
}
