// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `redcal apply` subcommand: correct visibility files with solved
//! calibration.

use std::path::PathBuf;

use clap::Parser;
use indexmap::IndexMap;
use log::{debug, info, warn};
use marlu::c64;
use ndarray::Array2;
use vec1::Vec1;

use super::parse_pol_pairs;
use crate::container::DataContainer;
use crate::error::RedcalError;
use crate::layout::ArrayLayout;
use crate::pol::PolPair;
use crate::solutions::{CalSolutions, GainConvention, ReadOptions};
use crate::vis_io::{read_vis, write_vis};

#[derive(Debug, Parser)]
pub(super) struct ApplyArgs {
    /// The array layout file (JSON or YAML).
    #[clap(short = 'C', long)]
    layout: PathBuf,

    /// Comma-separated polarization pairs to correct.
    #[clap(short, long, default_value = "xx")]
    pols: String,

    /// The solved calibration file to apply.
    #[clap(long)]
    omnipath: PathBuf,

    /// Filename extension appended to each corrected output.
    #[clap(long, default_value = "O")]
    extension: String,

    /// Directory for output files; defaults to each input's directory.
    #[clap(long)]
    outpath: Option<PathBuf>,

    /// The input visibility files.
    #[clap(name = "VIS_FILES", parse(from_os_str))]
    files: Vec<PathBuf>,
}

impl ApplyArgs {
    pub(super) fn run(self) -> Result<(), RedcalError> {
        let files = Vec1::try_from_vec(self.files.clone()).map_err(|_| RedcalError::NoVisFiles)?;
        let pol_pairs = parse_pol_pairs(&self.pols)?;
        let layout = ArrayLayout::from_file(&self.layout)?;

        let sols = CalSolutions::read(
            &[self.omnipath.clone()],
            &ReadOptions::default(),
        )?;
        info!(
            "Applying {} ({} convention) to {} file(s)",
            self.omnipath.display(),
            sols.meta.gain_convention,
            files.len()
        );

        for file in files {
            let (vis_meta, data, _) = read_vis(&file, &pol_pairs)?;
            let (nt, nf) = (vis_meta.times.len(), vis_meta.freqs.len());
            let (sol_t, sol_f) = (sols.meta.times.len(), sols.meta.freqs.len());
            if (sol_t, sol_f) != (nt, nf) {
                return Err(RedcalError::ApplyShapeMismatch {
                    sol_t,
                    sol_f,
                    vis_t: nt,
                    vis_f: nf,
                });
            }

            let mut corrected: IndexMap<(usize, usize, PolPair), Array2<c64>> = IndexMap::new();
            for (&(i, j, pp), values) in data.iter() {
                let gi = sols.gains.get(&pp.0).and_then(|m| m.get(&i));
                let gj = sols.gains.get(&pp.1).and_then(|m| m.get(&j));
                let (gi, gj) = match (gi, gj) {
                    (Some(gi), Some(gj)) => (gi, gj),
                    _ => {
                        warn!("No solutions for baseline ({i},{j}) [{pp}]; leaving it uncorrected");
                        corrected.insert((i, j, pp), values.clone());
                        continue;
                    }
                };
                let out = Array2::from_shape_fn((nt, nf), |(t, f)| {
                    let factor = gi[(t, f)] * gj[(t, f)].conj();
                    match sols.meta.gain_convention {
                        GainConvention::Divide => values[(t, f)] / factor,
                        GainConvention::Multiply => values[(t, f)] * factor,
                    }
                });
                corrected.insert((i, j, pp), out);
            }

            let out_dir = match &self.outpath {
                Some(p) => p.clone(),
                None => file.parent().map(PathBuf::from).unwrap_or_default(),
            };
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let out_file = out_dir.join(format!("{name}{}", self.extension));
            debug!("Writing corrected visibilities to {}", out_file.display());

            write_vis(
                &out_file,
                &layout,
                &vis_meta.times,
                &vis_meta.freqs,
                vis_meta.integration_time,
                &DataContainer::from_flat(corrected),
                false,
                Some("calibration applied"),
            )?;
        }
        Ok(())
    }
}
