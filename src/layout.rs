// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The boundary to the external antenna-array geometry provider.
//!
//! Only the antenna count and the position table are consumed by redundant
//! calibration. Layouts are declared in JSON or YAML files; an antenna with
//! a `null` position exists in the index space but cannot participate in
//! redundancy grouping.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::debug;
use marlu::LatLngHeight;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Tried to read an array layout with an unsupported extension '{ext}'! Supported: json, yaml, yml")]
    UnsupportedExt { ext: String },

    #[error("Array layout {0} lists no antennas")]
    NoAntennas(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

/// An antenna-array layout: the array's geodetic position and per-antenna
/// east-north-up coordinates \[metres\], indexed by antenna number.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArrayLayout {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub height_m: f64,

    /// One entry per antenna; `null` marks an antenna with no valid position.
    pub antpos_enu: Vec<Option<[f64; 3]>>,
}

impl ArrayLayout {
    /// Read a layout from a JSON or YAML file, determined by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ArrayLayout, LayoutError> {
        fn inner(path: &Path) -> Result<ArrayLayout, LayoutError> {
            debug!("Reading array layout from {}", path.display());
            let reader = BufReader::new(File::open(path)?);
            let layout: ArrayLayout = match path.extension().and_then(|e| e.to_str()) {
                Some("json") => serde_json::from_reader(reader)?,
                Some("yaml") | Some("yml") => serde_yaml::from_reader(reader)?,
                ext => {
                    return Err(LayoutError::UnsupportedExt {
                        ext: ext.unwrap_or("<no extension>").to_string(),
                    })
                }
            };
            if layout.antpos_enu.is_empty() {
                return Err(LayoutError::NoAntennas(path.display().to_string()));
            }
            Ok(layout)
        }
        inner(path.as_ref())
    }

    /// The total antenna count (the index space; includes antennas without
    /// positions).
    pub fn nant(&self) -> usize {
        self.antpos_enu.len()
    }

    pub fn position(&self, ant: usize) -> Option<[f64; 3]> {
        self.antpos_enu.get(ant).copied().flatten()
    }

    /// Antennas with a valid position that are not explicitly excluded,
    /// sorted.
    pub fn usable_ants(&self, ex_ants: &[usize]) -> Vec<usize> {
        (0..self.nant())
            .filter(|&a| self.position(a).is_some() && !ex_ants.contains(&a))
            .collect()
    }

    pub fn array_position(&self) -> LatLngHeight {
        LatLngHeight {
            longitude_rad: self.longitude_deg.to_radians(),
            latitude_rad: self.latitude_deg.to_radians(),
            height_metres: self.height_m,
        }
    }
}
