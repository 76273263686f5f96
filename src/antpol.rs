// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The (antenna, polarization) identity used throughout redundant
//! calibration.
//!
//! An [`AntPol`] flattens an (antenna index, feed polarization) pair into a
//! single integer for a fixed total antenna count: `pol.rank() * nant + ant`.
//! For a fixed count and polarization ordering this is a bijection, so two
//! `AntPol`s built under the same count compare, hash and order exactly like
//! their flattened indices.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::pol::Pol;

/// One antenna feed: an antenna index paired with a polarization label,
/// flattened against a total antenna count. Immutable once constructed.
#[derive(Debug, Clone, Copy)]
pub struct AntPol {
    ant: usize,
    pol: Pol,
    nant: usize,
}

impl AntPol {
    pub fn new(ant: usize, pol: Pol, nant: usize) -> AntPol {
        debug_assert!(ant < nant, "antenna index {ant} out of range 0..{nant}");
        AntPol { ant, pol, nant }
    }

    /// Reconstruct an `AntPol` from its flattened index. `None` when the
    /// index implies a polarization rank outside the recognised set.
    pub fn from_index(index: usize, nant: usize) -> Option<AntPol> {
        let pol = Pol::from_rank(index / nant)?;
        Some(AntPol {
            ant: index % nant,
            pol,
            nant,
        })
    }

    pub fn ant(&self) -> usize {
        self.ant
    }

    pub fn pol(&self) -> Pol {
        self.pol
    }

    /// The (antenna, polarization) pair.
    pub fn antpol(&self) -> (usize, Pol) {
        (self.ant, self.pol)
    }

    /// The flattened integer index; the equality/hash/ordering key.
    pub fn index(&self) -> usize {
        self.pol.rank() * self.nant + self.ant
    }
}

impl PartialEq for AntPol {
    fn eq(&self, other: &AntPol) -> bool {
        self.index() == other.index()
    }
}

impl Eq for AntPol {}

impl Hash for AntPol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index().hash(state);
    }
}

impl PartialOrd for AntPol {
    fn partial_cmp(&self, other: &AntPol) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AntPol {
    fn cmp(&self, other: &AntPol) -> Ordering {
        self.index().cmp(&other.index())
    }
}

impl fmt::Display for AntPol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.ant, self.pol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn accessors_and_display() {
        for (rank, pol) in [Pol::X, Pol::Y].into_iter().enumerate() {
            let ap = AntPol::new(0, pol, 1);
            assert_eq!(ap.antpol(), (0, pol));
            assert_eq!(ap.ant(), 0);
            assert_eq!(ap.pol(), pol);
            assert_eq!(ap.index(), rank);
            assert_eq!(ap.to_string(), format!("0{pol}"));
        }
    }

    #[test]
    fn equality_is_by_flattened_index() {
        let a = AntPol::new(0, Pol::X, 1);
        let b = AntPol::new(0, Pol::X, 1);
        assert_eq!(a, b);
        let mut map = HashMap::new();
        map.insert(a, ());
        assert!(map.contains_key(&b));
    }

    #[test]
    fn flattened_indices_are_a_bijection() {
        // All (antenna, pol) pairs map onto 0..nant*npols exactly once.
        for nant in [1, 4, 7] {
            let mut seen = vec![false; nant * Pol::count()];
            for pol in [Pol::X, Pol::Y] {
                for ant in 0..nant {
                    let i = AntPol::new(ant, pol, nant).index();
                    assert!(!seen[i]);
                    seen[i] = true;
                }
            }
            assert!(seen.into_iter().all(|s| s));
        }
    }

    #[test]
    fn from_index_inverts_index() {
        let nant = 5;
        for pol in [Pol::X, Pol::Y] {
            for ant in 0..nant {
                let ap = AntPol::new(ant, pol, nant);
                let rt = AntPol::from_index(ap.index(), nant).unwrap();
                assert_eq!(rt.antpol(), ap.antpol());
            }
        }
        // An index beyond the recognised polarization ranks has no inverse.
        assert!(AntPol::from_index(nant * Pol::count(), nant).is_none());
    }
}
