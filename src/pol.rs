// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Polarization labels and polarization-pair bookkeeping.
//!
//! Single-antenna feeds are labelled `x` or `y`; visibilities carry an
//! ordered pair of feed labels ("xx", "xy", "yx", "yy"). Integer codes
//! follow the AIPS convention used by calibration and visibility files.

use std::fmt;
use std::str::FromStr;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolParseError {
    #[error("'{0}' is not a recognised polarization; expected one of 'x', 'y'")]
    UnrecognisedPol(String),

    #[error("'{0}' is not a recognised polarization pair; expected e.g. 'xx', 'xy'")]
    UnrecognisedPair(String),

    #[error("{0} is not a recognised AIPS polarization code")]
    UnrecognisedCode(i32),
}

/// A single feed polarization label.
#[derive(Debug, Display, EnumString, EnumIter, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pol {
    #[strum(serialize = "x")]
    X,

    #[strum(serialize = "y")]
    Y,
}

impl Pol {
    /// The fixed position of this polarization in flattened (antenna,
    /// polarization) index spaces.
    pub fn rank(self) -> usize {
        self as usize
    }

    /// The inverse of [`Pol::rank`].
    pub fn from_rank(rank: usize) -> Option<Pol> {
        Pol::iter().nth(rank)
    }

    /// The AIPS/pyuvdata Jones integer for this feed (Jxx = -5, Jyy = -6).
    pub fn jones_code(self) -> i32 {
        match self {
            Pol::X => -5,
            Pol::Y => -6,
        }
    }

    pub fn from_jones_code(code: i32) -> Result<Pol, PolParseError> {
        match code {
            -5 => Ok(Pol::X),
            -6 => Ok(Pol::Y),
            _ => Err(PolParseError::UnrecognisedCode(code)),
        }
    }

    /// The number of recognised polarizations.
    pub fn count() -> usize {
        Pol::iter().count()
    }
}

/// An ordered pair of feed polarizations, e.g. the "xy" of a cross-polarized
/// visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolPair(pub Pol, pub Pol);

impl PolPair {
    pub fn new(a: Pol, b: Pol) -> PolPair {
        PolPair(a, b)
    }

    /// Is this a same-feed ("linear") pair? "xx" and "yy" are; "xy" and "yx"
    /// are not.
    pub fn is_linear(self) -> bool {
        self.0 == self.1
    }

    /// The pair with its feeds swapped; lookups of a reversed baseline use
    /// this together with conjugation.
    pub fn swapped(self) -> PolPair {
        PolPair(self.1, self.0)
    }

    /// The AIPS visibility polarization code (XX = -5, YY = -6, XY = -7,
    /// YX = -8).
    pub fn aips_code(self) -> i32 {
        match (self.0, self.1) {
            (Pol::X, Pol::X) => -5,
            (Pol::Y, Pol::Y) => -6,
            (Pol::X, Pol::Y) => -7,
            (Pol::Y, Pol::X) => -8,
        }
    }

    pub fn from_aips_code(code: i32) -> Result<PolPair, PolParseError> {
        match code {
            -5 => Ok(PolPair(Pol::X, Pol::X)),
            -6 => Ok(PolPair(Pol::Y, Pol::Y)),
            -7 => Ok(PolPair(Pol::X, Pol::Y)),
            -8 => Ok(PolPair(Pol::Y, Pol::X)),
            _ => Err(PolParseError::UnrecognisedCode(code)),
        }
    }
}

impl fmt::Display for PolPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.0, self.1)
    }
}

impl FromStr for PolPair {
    type Err = PolParseError;

    fn from_str(s: &str) -> Result<PolPair, PolParseError> {
        let mut chars = s.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(a), Some(b), None) => {
                let a = Pol::from_str(&a.to_string())
                    .map_err(|_| PolParseError::UnrecognisedPair(s.to_string()))?;
                let b = Pol::from_str(&b.to_string())
                    .map_err(|_| PolParseError::UnrecognisedPair(s.to_string()))?;
                Ok(PolPair(a, b))
            }
            _ => Err(PolParseError::UnrecognisedPair(s.to_string())),
        }
    }
}

/// The distinct single-feed polarizations participating in a collection of
/// pairs, in rank order.
pub fn unique_pols(pairs: &[PolPair]) -> Vec<Pol> {
    let mut pols: Vec<Pol> = pairs.iter().flat_map(|pp| [pp.0, pp.1]).collect();
    pols.sort_unstable();
    pols.dedup();
    pols
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pol_parsing_and_ranks() {
        assert_eq!(Pol::from_str("x").unwrap(), Pol::X);
        assert_eq!(Pol::from_str("y").unwrap(), Pol::Y);
        assert!(Pol::from_str("z").is_err());
        assert_eq!(Pol::X.rank(), 0);
        assert_eq!(Pol::Y.rank(), 1);
        assert_eq!(Pol::from_rank(1), Some(Pol::Y));
        assert_eq!(Pol::from_rank(2), None);
        assert_eq!(Pol::X.to_string(), "x");
    }

    #[test]
    fn pol_pair_parsing() {
        let xy = PolPair::from_str("xy").unwrap();
        assert_eq!(xy, PolPair(Pol::X, Pol::Y));
        assert_eq!(xy.to_string(), "xy");
        assert!(!xy.is_linear());
        assert!(PolPair::from_str("xx").unwrap().is_linear());
        assert_eq!(xy.swapped().to_string(), "yx");
        // A 4-character "pair" is not a pair.
        assert!(PolPair::from_str("xxyy").is_err());
        assert!(PolPair::from_str("xq").is_err());
    }

    #[test]
    fn aips_codes_round_trip() {
        for s in ["xx", "yy", "xy", "yx"] {
            let pp = PolPair::from_str(s).unwrap();
            assert_eq!(PolPair::from_aips_code(pp.aips_code()).unwrap(), pp);
        }
        assert_eq!(PolPair::from_str("xx").unwrap().aips_code(), -5);
        assert_eq!(PolPair::from_str("yx").unwrap().aips_code(), -8);
    }

    #[test]
    fn unique_pols_from_pairs() {
        let pairs = [
            PolPair::from_str("xx").unwrap(),
            PolPair::from_str("xy").unwrap(),
        ];
        assert_eq!(unique_pols(&pairs), vec![Pol::X, Pol::Y]);
        let pairs = [PolPair::from_str("yy").unwrap()];
        assert_eq!(unique_pols(&pairs), vec![Pol::Y]);
    }
}
