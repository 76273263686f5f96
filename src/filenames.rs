// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to parse HERA filename conventions.
//!
//! Observation files are named like `zen.2457698.40355.xx.HH.uvcA`: a
//! Julian date to five decimal places and a polarization-pair component.
//! The CLI uses these to group per-polarization files of one observation
//! and to derive output names.

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::pol::{PolParseError, PolPair};

lazy_static! {
    static ref RE_POL: Regex = Regex::new(r"\.([xy]{2})\.").unwrap();
    static ref RE_JD: Regex = Regex::new(r"\d{7}\.\d{5}").unwrap();
}

#[derive(Error, Debug)]
pub enum FilenameError {
    #[error("Couldn't find a polarization component (e.g. '.xx.') in filename {0}")]
    NoPol(String),

    #[error("Couldn't find a Julian date (e.g. '2457698.40355') in filename {0}")]
    NoJulianDate(String),

    #[error(transparent)]
    Pol(#[from] PolParseError),
}

/// The polarization pair named in a filename.
pub fn pol_from_filename(filename: &str) -> Result<PolPair, FilenameError> {
    let caps = RE_POL
        .captures(filename)
        .ok_or_else(|| FilenameError::NoPol(filename.to_string()))?;
    Ok(caps[1].parse()?)
}

/// The Julian-date component of a filename, as written.
pub fn jd_from_filename(filename: &str) -> Result<&str, FilenameError> {
    RE_JD
        .find(filename)
        .map(|m| m.as_str())
        .ok_or_else(|| FilenameError::NoJulianDate(filename.to_string()))
}

/// The filename with its polarization component removed; multi-polarization
/// outputs are named per observation, not per input file.
pub fn strip_pol(filename: &str) -> String {
    RE_POL.replace(filename, ".").into_owned()
}

/// An output path in `out_dir` named after `vis_file` with `suffix`
/// appended (e.g. "omni.calfits", "vis.uvfits"). With `multi_pol`, the
/// input's polarization component is dropped first.
pub fn output_path(vis_file: &Path, out_dir: &Path, suffix: &str, multi_pol: bool) -> PathBuf {
    let name = vis_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let name = if multi_pol {
        strip_pol(name)
    } else {
        name.to_string()
    };
    out_dir.join(format!("{name}.{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pol_is_extracted() {
        assert_eq!(
            pol_from_filename("zen.2457698.40355.xx.HH.uvcA")
                .unwrap()
                .to_string(),
            "xx"
        );
        assert_eq!(
            pol_from_filename("zen.2457698.40355.yx.HH.uvcA")
                .unwrap()
                .to_string(),
            "yx"
        );
        assert!(matches!(
            pol_from_filename("zen.2457698.40355.HH.uvcA"),
            Err(FilenameError::NoPol(_))
        ));
    }

    #[test]
    fn jd_is_extracted() {
        assert_eq!(
            jd_from_filename("zen.2457698.40355.xx.HH.uvcA").unwrap(),
            "2457698.40355"
        );
        assert!(matches!(
            jd_from_filename("zen.nope.xx.HH.uvcA"),
            Err(FilenameError::NoJulianDate(_))
        ));
    }

    #[test]
    fn output_naming() {
        let out = Path::new("/data/out");
        let vis = Path::new("/data/zen.2457698.40355.xx.HH.uvcAA");
        assert_eq!(
            output_path(vis, out, "omni.calfits", false),
            Path::new("/data/out/zen.2457698.40355.xx.HH.uvcAA.omni.calfits")
        );
        // 4-pol runs name outputs per observation.
        assert_eq!(
            output_path(vis, out, "vis.uvfits", true),
            Path::new("/data/out/zen.2457698.40355.HH.uvcAA.vis.uvfits")
        );
        assert_eq!(
            strip_pol("zen.2457698.40355.xy.HH.uvcA"),
            "zen.2457698.40355.HH.uvcA"
        );
    }
}
