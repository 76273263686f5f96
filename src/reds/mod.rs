// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Grouping baselines into redundant classes.
//!
//! Two baselines are redundant when their separation vectors agree within a
//! tolerance; a regular array layout predicts the same true sky visibility
//! for every member of such a class, so each class contributes one free
//! "unique baseline" parameter to calibration. Polarization combinations
//! are enumerated explicitly on top of the positional classes; the
//! *minimal-V* reduction additionally merges each cross-polarization class
//! with its pol-swapped partner, assuming V_xy == V_yx on the sky.


use indexmap::IndexMap;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use thiserror::Error;

use crate::antpol::AntPol;
use crate::pol::{Pol, PolPair};

/// A redundant class: the baselines sharing one separation vector and one
/// polarization combination.
pub type Red = Vec<(AntPol, AntPol)>;

#[derive(Error, Debug)]
pub enum RedsError {
    #[error("Redundancy tolerance must be positive, got {0}")]
    BadTolerance(f64),

    #[error("No polarizations were supplied for redundancy grouping")]
    NoPols,

    #[error("Expected positions for {expected} antennas, but only {actual} were supplied")]
    BadPositions { expected: usize, actual: usize },

    #[error("Cannot apply the minimal-V reduction to {0} groups; the group count must divide into same- and cross-polarization quarters")]
    MinimalVIndivisible(usize),

    #[error("Minimal-V reduction found {0} cross-polarization groups without a pol-swapped partner")]
    MinimalVUnpaired(usize),

    #[error("Redundant groups cannot be empty")]
    EmptyGroup,
}

fn quantise(sep: [f64; 3], tol: f64) -> [i64; 3] {
    [
        (sep[0] / tol).round() as i64,
        (sep[1] / tol).round() as i64,
        (sep[2] / tol).round() as i64,
    ]
}

/// Group every usable antenna pair into redundant classes, then enumerate
/// all polarization combinations of each class.
///
/// Antenna pairs whose quantised separation vectors agree (up to overall
/// sign) land in one class; the orientation of a class's first-encountered
/// baseline fixes the sign convention for later members, so each physical
/// baseline appears exactly once, in a deterministic orientation.
/// Non-redundant classes (a single member) are dropped. Antennas with no
/// position are skipped entirely.
pub fn compute_reds(
    nant: usize,
    pols: &[Pol],
    antpos: &[Option<[f64; 3]>],
    tol: f64,
) -> Result<Vec<Red>, RedsError> {
    if !(tol > 0.0) {
        return Err(RedsError::BadTolerance(tol));
    }
    if pols.is_empty() {
        return Err(RedsError::NoPols);
    }
    if antpos.len() < nant {
        return Err(RedsError::BadPositions {
            expected: nant,
            actual: antpos.len(),
        });
    }

    // Insertion order of this map fixes the class enumeration order.
    let mut classes: IndexMap<[i64; 3], Vec<(usize, usize)>> = IndexMap::new();
    for i in 0..nant {
        let pi = match antpos[i] {
            Some(p) => p,
            None => continue,
        };
        for (j, pj) in antpos.iter().enumerate().take(nant).skip(i + 1) {
            let pj = match pj {
                Some(p) => *p,
                None => continue,
            };
            let sep = [pj[0] - pi[0], pj[1] - pi[1], pj[2] - pi[2]];
            let key = quantise(sep, tol);
            let neg = [-key[0], -key[1], -key[2]];
            if let Some(class) = classes.get_mut(&key) {
                class.push((i, j));
            } else if let Some(class) = classes.get_mut(&neg) {
                class.push((j, i));
            } else {
                classes.insert(key, vec![(i, j)]);
            }
        }
    }

    let positional: Vec<Vec<(usize, usize)>> = classes
        .into_iter()
        .map(|(_, class)| class)
        .filter(|class| class.len() > 1)
        .collect();

    // Polarization enumeration: first-feed major, matching the flattened
    // AntPol index ordering.
    let mut reds = Vec::with_capacity(positional.len() * pols.len() * pols.len());
    for &pi in pols {
        for &pj in pols {
            for class in &positional {
                reds.push(
                    class
                        .iter()
                        .map(|&(i, j)| (AntPol::new(i, pi, nant), AntPol::new(j, pj, nant)))
                        .collect(),
                );
            }
        }
    }
    Ok(reds)
}

fn group_pol_pair(group: &Red) -> Result<PolPair, RedsError> {
    let (a, b) = group.first().ok_or(RedsError::EmptyGroup)?;
    Ok(PolPair(a.pol(), b.pol()))
}

/// Merge each cross-polarization class with its pol-swapped partner (xy
/// with yx), halving the cross-polarization parameter count.
///
/// The merged class keeps the orientation and position of whichever partner
/// was encountered first. Every baseline of the input appears exactly once
/// in the output; inputs whose group count does not divide into
/// polarization quarters, or whose cross classes do not pair up, are
/// rejected.
pub fn reds_for_minimal_v(reds: &[Red]) -> Result<Vec<Red>, RedsError> {
    if reds.len() % 4 != 0 {
        return Err(RedsError::MinimalVIndivisible(reds.len()));
    }

    let mut out: Vec<Red> = Vec::with_capacity(reds.len() - reds.len() / 4);
    // Cross classes awaiting their partner, keyed by their sorted physical
    // antenna pairs.
    let mut pending: HashMap<Vec<(usize, usize)>, usize> = HashMap::new();
    for group in reds {
        if group_pol_pair(group)?.is_linear() {
            out.push(group.clone());
            continue;
        }
        let mut key: Vec<(usize, usize)> = group
            .iter()
            .map(|(a, b)| (a.ant().min(b.ant()), a.ant().max(b.ant())))
            .collect();
        key.sort_unstable();
        match pending.entry(key) {
            Entry::Occupied(entry) => {
                let i = entry.remove();
                out[i].extend(group.iter().copied());
            }
            Entry::Vacant(entry) => {
                out.push(group.clone());
                entry.insert(out.len() - 1);
            }
        }
    }
    if !pending.is_empty() {
        return Err(RedsError::MinimalVUnpaired(pending.len()));
    }
    Ok(out)
}

/// Criteria for selecting subsets of redundant groups. All baseline and
/// unique-baseline matching is orientation-insensitive.
#[derive(Debug, Default, Clone)]
pub struct RedFilter {
    /// Keep only baselines whose antennas are both in this list.
    pub ants: Option<Vec<usize>>,
    /// Drop baselines involving any of these antennas.
    pub ex_ants: Vec<usize>,
    /// Keep only these baselines.
    pub bls: Option<Vec<(usize, usize)>>,
    /// Drop these baselines.
    pub ex_bls: Vec<(usize, usize)>,
    /// Keep only groups containing one of these baselines.
    pub ubls: Option<Vec<(usize, usize)>>,
    /// Drop groups containing any of these baselines.
    pub ex_ubls: Vec<(usize, usize)>,
    /// Keep only groups with one of these polarization pairs.
    pub pols: Option<Vec<PolPair>>,
    /// Drop groups with any of these polarization pairs.
    pub ex_pols: Vec<PolPair>,
}

fn bl_in(list: &[(usize, usize)], i: usize, j: usize) -> bool {
    list.iter().any(|&(a, b)| (a, b) == (i, j) || (b, a) == (i, j))
}

/// Select subsets of redundant groups: pure set intersection/exclusion over
/// the group list, order-preserving. Groups reduced below two members are
/// no longer redundant and are dropped; criteria naming antennas or
/// baselines absent from the array simply select nothing.
pub fn filter_reds(reds: &[Red], filter: &RedFilter) -> Vec<Red> {
    reds.iter()
        .filter_map(|group| {
            let pp = match group_pol_pair(group) {
                Ok(pp) => pp,
                Err(_) => return None,
            };
            if let Some(pols) = &filter.pols {
                if !pols.contains(&pp) {
                    return None;
                }
            }
            if filter.ex_pols.contains(&pp) {
                return None;
            }
            if let Some(ubls) = &filter.ubls {
                if !group.iter().any(|(a, b)| bl_in(ubls, a.ant(), b.ant())) {
                    return None;
                }
            }
            if group
                .iter()
                .any(|(a, b)| bl_in(&filter.ex_ubls, a.ant(), b.ant()))
            {
                return None;
            }

            let group: Red = group
                .iter()
                .filter(|(a, b)| {
                    let (i, j) = (a.ant(), b.ant());
                    if let Some(ants) = &filter.ants {
                        if !(ants.contains(&i) && ants.contains(&j)) {
                            return false;
                        }
                    }
                    if filter.ex_ants.contains(&i) || filter.ex_ants.contains(&j) {
                        return false;
                    }
                    if let Some(bls) = &filter.bls {
                        if !bl_in(bls, i, j) {
                            return false;
                        }
                    }
                    !bl_in(&filter.ex_bls, i, j)
                })
                .copied()
                .collect();
            if group.len() > 1 {
                Some(group)
            } else {
                None
            }
        })
        .collect()
}
