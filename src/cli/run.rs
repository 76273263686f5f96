// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `redcal run` subcommand: redundantly calibrate visibility files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use marlu::c64;
use ndarray::Array2;
use vec1::Vec1;

use super::{parse_ants, parse_pol_pairs};
use crate::container::DataContainer;
use crate::error::RedcalError;
use crate::filenames::{jd_from_filename, output_path, pol_from_filename};
use crate::layout::ArrayLayout;
use crate::omni::{compute_xtalk, run_omnical, PassthroughSolver, WeightMap, XtalkCombine};
use crate::pol::PolPair;
use crate::redinfo::{GainMap, InfoOptions, RedundantInfo};
use crate::solutions::{CalMeta, CalSolutions, CalType, FlagMap, GainConvention};
use crate::vis_io::{read_vis, write_vis};

#[derive(Debug, Parser)]
pub(super) struct RunArgs {
    /// The array layout file (JSON or YAML).
    #[clap(short = 'C', long)]
    layout: PathBuf,

    /// Comma-separated polarization pairs to calibrate (e.g. xx or
    /// xx,xy,yx,yy).
    #[clap(short, long, default_value = "xx")]
    pols: String,

    /// Comma-separated first-pass calibration files, one per linear
    /// polarization.
    #[clap(long)]
    firstcal: Option<String>,

    /// Comma-separated antennas to exclude from calibration.
    #[clap(long)]
    ex_ants: Option<String>,

    /// Directory for output files.
    #[clap(long, default_value = ".")]
    outpath: PathBuf,

    /// Combine crosstalk estimates with a median over time instead of a
    /// weighted mean.
    #[clap(long)]
    median: bool,

    /// Merge cross-polarization redundant groups with their pol-swapped
    /// partners (minimal-V).
    #[clap(long)]
    minimal_v: bool,

    /// Separation tolerance for redundancy grouping [metres].
    #[clap(long, default_value = "0.1")]
    tol: f64,

    /// The input visibility files.
    #[clap(name = "VIS_FILES", parse(from_os_str))]
    files: Vec<PathBuf>,
}

impl RunArgs {
    pub(super) fn run(self) -> Result<(), RedcalError> {
        let files =
            Vec1::try_from_vec(self.files.clone()).map_err(|_| RedcalError::NoVisFiles)?;
        let pol_pairs = parse_pol_pairs(&self.pols)?;
        if self.minimal_v && pol_pairs.iter().all(|pp| pp.is_linear()) {
            return Err(RedcalError::MinimalVNeedsCrossPols);
        }
        let firstcal_files: Vec<PathBuf> = self
            .firstcal
            .as_deref()
            .ok_or(RedcalError::MissingFirstcal)?
            .split(',')
            .map(|f| PathBuf::from(f.trim()))
            .collect();
        let ex_ants = match self.ex_ants.as_deref() {
            Some(s) => parse_ants(s)?,
            None => vec![],
        };

        let layout = ArrayLayout::from_file(&self.layout)?;
        let info = RedundantInfo::from_layout(
            &layout,
            &pol_pairs,
            &InfoOptions {
                ex_ants,
                tol: self.tol,
                minimal_v: self.minimal_v,
            },
        )?;
        info!(
            "Redundancy: {} usable antennas, {} unique baselines, {} baselines",
            info.subsetant().len(),
            info.num_ubls(),
            info.bl_order().len()
        );

        let mut firstcal = CalSolutions::concatenate_on_pol(&firstcal_files)?;
        firstcal.convert_delays_to_gains();

        // Group the input files into observations by Julian date; a 4-pol
        // run has one file per polarization pair.
        let mut obs: BTreeMap<String, Vec<(PolPair, PathBuf)>> = BTreeMap::new();
        for file in &files {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let jd = jd_from_filename(name)?.to_string();
            let pol = pol_from_filename(name)?;
            if !pol_pairs.contains(&pol) {
                warn!("{name} carries polarization {pol}, which wasn't requested; skipping it");
                continue;
            }
            obs.entry(jd).or_default().push((pol, file.clone()));
        }

        let combine = if self.median {
            XtalkCombine::Median
        } else {
            XtalkCombine::Mean
        };
        let history = std::env::args().collect::<Vec<String>>().join(" ");

        let progress = ProgressBar::new(obs.len() as u64).with_style(
            ProgressStyle::default_bar()
                .template("{msg}: [{wide_bar:.blue}] {pos:3}/{len:3} ({elapsed_precise}<{eta_precise})")
                .unwrap()
                .progress_chars("=> "),
        );
        progress.set_message("calibrating");

        for (jd, group) in obs {
            debug!("Calibrating observation {jd}");
            let multi_pol = group.len() > 1;
            let first_file = group[0].1.clone();

            // Pool every polarization's data and weights for this
            // observation.
            let mut entries: IndexMap<(usize, usize, PolPair), Array2<c64>> = IndexMap::new();
            let mut wgts = WeightMap::default();
            let mut vis_meta = None;
            for (pol, file) in group {
                let (meta, dc, w) = read_vis(&file, &[pol])?;
                for (&key, value) in dc.iter() {
                    entries.insert(key, value.clone());
                }
                for (pp, per_bl) in w {
                    wgts.entry(pp).or_default().extend(per_bl);
                }
                vis_meta.get_or_insert(meta);
            }
            let vis_meta = vis_meta.expect("at least one file per observation");
            let data = DataContainer::from_flat(entries);

            // A first-pass file need not cover the same integrations as the
            // data; tile its solutions out to match.
            let gains0 = resize_gains(
                &firstcal.gains,
                vis_meta.times.len(),
                vis_meta.freqs.len(),
            );
            let (meta, gains, vis) =
                run_omnical(&data, &info, Some(&gains0), &PassthroughSolver)?;
            let xtalk = compute_xtalk(&meta.res, &wgts, combine);

            // Solutions go to a calfits file, the unique-baseline
            // visibilities and crosstalk estimates to uvfits.
            let ants = info.subsetant().to_vec();
            let mut flags = FlagMap::default();
            let (nt, nf) = (vis_meta.times.len(), vis_meta.freqs.len());
            for &pol in info.pols() {
                let per_ant = flags.entry(pol).or_default();
                for &ant in &ants {
                    per_ant.insert(ant, Array2::from_elem((nt, nf), false));
                }
            }
            let sols = CalSolutions {
                meta: CalMeta {
                    freqs: vis_meta.freqs.clone(),
                    times: vis_meta.times.clone(),
                    lsts: vec![],
                    history: history.clone(),
                    gain_convention: GainConvention::Divide,
                    integration_time: vis_meta.integration_time,
                    chisq: Some(meta.chisq.clone()),
                },
                cal_type: CalType::Gain,
                ants,
                gains,
                delays: None,
                flags,
                quality: None,
            };
            sols.write(&output_path(
                &first_file,
                &self.outpath,
                "omni.calfits",
                multi_pol,
            ))?;

            let vis_dc = DataContainer::from_pol_major(vis);
            write_vis(
                &output_path(&first_file, &self.outpath, "vis.uvfits", multi_pol),
                &layout,
                &vis_meta.times,
                &vis_meta.freqs,
                vis_meta.integration_time,
                &vis_dc,
                false,
                Some("omnical unique-baseline visibilities"),
            )?;

            let xtalk_dc = DataContainer::from_pol_major(xtalk);
            write_vis(
                &output_path(&first_file, &self.outpath, "xtalk.uvfits", multi_pol),
                &layout,
                &vis_meta.times,
                &vis_meta.freqs,
                vis_meta.integration_time,
                &xtalk_dc,
                true,
                Some("omnical crosstalk estimates"),
            )?;

            progress.inc(1);
        }
        progress.finish();
        Ok(())
    }
}

fn resize_gains(gains: &GainMap, nt: usize, nf: usize) -> GainMap {
    let mut out = GainMap::default();
    for (&pol, per_ant) in gains {
        let out_per_ant = out.entry(pol).or_default();
        for (&ant, arr) in per_ant {
            let (st, sf) = arr.dim();
            if (st, sf) == (nt, nf) || st == 0 || sf == 0 {
                out_per_ant.insert(ant, arr.clone());
                continue;
            }
            let resized = Array2::from_shape_fn((nt, nf), |(t, f)| arr[(t % st, f % sf)]);
            out_per_ant.insert(ant, resized);
        }
    }
    out
}
