// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A unified lookup surface over baseline/polarization-keyed data.
//!
//! Visibility-like data arrives in several nesting shapes: baseline-major
//! (`{baseline: {pol: value}}`), polarization-major (`{pol: {baseline:
//! value}}`), or flat (`{(i, j, pol): value}`). A [`DataContainer`]
//! normalises all of them to one canonical flat-keyed store at
//! construction, derives the distinct baseline and polarization sets, and
//! resolves lookups of a reversed baseline to the complex conjugate of the
//! stored value with the polarization pair swapped.


use std::collections::BTreeSet;

use indexmap::IndexMap;
use marlu::c64;
use ndarray::{Array1, Array2};

use crate::pol::PolPair;

/// Values a [`DataContainer`] can serve in either baseline orientation.
pub trait Conjugate {
    /// The value for the reversed baseline orientation.
    fn conjugate(&self) -> Self;
}

impl Conjugate for c64 {
    fn conjugate(&self) -> c64 {
        self.conj()
    }
}

impl Conjugate for Array1<c64> {
    fn conjugate(&self) -> Array1<c64> {
        self.mapv(|v| v.conj())
    }
}

impl Conjugate for Array2<c64> {
    fn conjugate(&self) -> Array2<c64> {
        self.mapv(|v| v.conj())
    }
}

/// Baseline/polarization-keyed data behind one canonical key shape.
#[derive(Debug, Clone)]
pub struct DataContainer<V> {
    data: IndexMap<(usize, usize, PolPair), V>,
    bls: BTreeSet<(usize, usize)>,
    pols: BTreeSet<PolPair>,
}

impl<V: Conjugate + Clone> DataContainer<V> {
    fn insert(&mut self, i: usize, j: usize, pol: PolPair, value: V) {
        self.bls.insert((i, j));
        self.pols.insert(pol);
        self.data.insert((i, j, pol), value);
    }

    fn empty() -> DataContainer<V> {
        DataContainer {
            data: IndexMap::new(),
            bls: BTreeSet::new(),
            pols: BTreeSet::new(),
        }
    }

    /// Build from flat `(i, j, pol)` keys.
    pub fn from_flat<I>(entries: I) -> DataContainer<V>
    where
        I: IntoIterator<Item = ((usize, usize, PolPair), V)>,
    {
        let mut dc = Self::empty();
        for ((i, j, pol), value) in entries {
            dc.insert(i, j, pol, value);
        }
        dc
    }

    /// Build from baseline-major nesting (`{baseline: {pol: value}}`).
    pub fn from_bl_major<I, J>(entries: I) -> DataContainer<V>
    where
        I: IntoIterator<Item = ((usize, usize), J)>,
        J: IntoIterator<Item = (PolPair, V)>,
    {
        let mut dc = Self::empty();
        for ((i, j), pols) in entries {
            for (pol, value) in pols {
                dc.insert(i, j, pol, value);
            }
        }
        dc
    }

    /// Build from polarization-major nesting (`{pol: {baseline: value}}`).
    pub fn from_pol_major<I, J>(entries: I) -> DataContainer<V>
    where
        I: IntoIterator<Item = (PolPair, J)>,
        J: IntoIterator<Item = ((usize, usize), V)>,
    {
        let mut dc = Self::empty();
        for (pol, bls) in entries {
            for ((i, j), value) in bls {
                dc.insert(i, j, pol, value);
            }
        }
        dc
    }

    /// The distinct baselines, in their stored orientations.
    pub fn bls(&self) -> &BTreeSet<(usize, usize)> {
        &self.bls
    }

    /// The distinct baselines carrying data for one polarization pair.
    pub fn bls_for_pol(&self, pol: PolPair) -> BTreeSet<(usize, usize)> {
        self.data
            .keys()
            .filter(|(_, _, p)| *p == pol)
            .map(|&(i, j, _)| (i, j))
            .collect()
    }

    /// The distinct polarization pairs.
    pub fn pols(&self) -> &BTreeSet<PolPair> {
        &self.pols
    }

    /// The polarization pairs carrying data for one baseline (either
    /// orientation).
    pub fn pols_for_bl(&self, bl: (usize, usize)) -> BTreeSet<PolPair> {
        self.pols
            .iter()
            .copied()
            .filter(|&pol| self.has_key(bl, pol))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &(usize, usize, PolPair)> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(usize, usize, PolPair), &V)> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Look up one (baseline, polarization) cell. A baseline stored in the
    /// opposite orientation is served as the conjugate of the stored value,
    /// with the polarization pair swapped.
    pub fn get(&self, (i, j): (usize, usize), pol: PolPair) -> Option<V> {
        if let Some(v) = self.data.get(&(i, j, pol)) {
            return Some(v.clone());
        }
        self.data
            .get(&(j, i, pol.swapped()))
            .map(Conjugate::conjugate)
    }

    /// [`DataContainer::get`] with a flat key.
    pub fn get_data(&self, (i, j, pol): (usize, usize, PolPair)) -> Option<V> {
        self.get((i, j), pol)
    }

    /// The polarization sub-mapping of one baseline.
    pub fn bl_items(&self, bl: (usize, usize)) -> IndexMap<PolPair, V> {
        self.pols
            .iter()
            .filter_map(|&pol| self.get(bl, pol).map(|v| (pol, v)))
            .collect()
    }

    /// The baseline sub-mapping of one polarization pair, in stored
    /// orientations.
    pub fn pol_items(&self, pol: PolPair) -> IndexMap<(usize, usize), V> {
        self.data
            .iter()
            .filter(|((_, _, p), _)| *p == pol)
            .map(|(&(i, j, _), v)| ((i, j), v.clone()))
            .collect()
    }

    /// Is this (baseline, polarization) cell present, in either baseline
    /// orientation?
    pub fn has_key(&self, (i, j): (usize, usize), pol: PolPair) -> bool {
        self.data.contains_key(&(i, j, pol)) || self.data.contains_key(&(j, i, pol.swapped()))
    }

    /// Is this baseline present (either orientation) for any polarization?
    pub fn has_bl(&self, (i, j): (usize, usize)) -> bool {
        self.bls.contains(&(i, j)) || self.bls.contains(&(j, i))
    }

    pub fn has_pol(&self, pol: PolPair) -> bool {
        self.pols.contains(&pol)
    }
}
