// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to handle writing out visibilities.

use std::path::Path;

use hifitime::{Duration, Epoch};
use log::debug;
use marlu::{
    precession::get_lmst, History, Jones, RADec, UvfitsWriter, VisContext, VisWrite, XyzGeodetic,
    ENH,
};
use ndarray::prelude::*;
use num_complex::Complex;

use super::VisWriteError;
use crate::container::DataContainer;
use crate::layout::ArrayLayout;
use crate::pol::PolPair;

/// The slot of a polarization pair in a marlu `Jones` matrix.
fn jones_slot(pp: PolPair) -> usize {
    match pp.aips_code() {
        -5 => 0, // xx
        -7 => 1, // xy
        -8 => 2, // yx
        _ => 3,  // yy
    }
}

/// Write baseline/polarization-keyed visibilities to a uvfits file, phased
/// to the zenith of the first integration (drift-scan data). With `xtalk`,
/// time-static (1, nfreq) inputs are accepted and broadcast across all
/// times. Polarization slots with no data get zero visibilities.
#[allow(clippy::too_many_arguments)]
pub fn write_vis(
    path: &Path,
    layout: &ArrayLayout,
    times_jd: &[f64],
    freqs_hz: &[f64],
    integration_time_s: f64,
    data: &DataContainer<Array2<marlu::c64>>,
    xtalk: bool,
    message: Option<&str>,
) -> Result<(), VisWriteError> {
    let (nt, nf) = (times_jd.len(), freqs_hz.len());
    let baselines: Vec<(usize, usize)> = data.bls().iter().copied().collect();
    if nt == 0 || nf == 0 || baselines.is_empty() {
        return Err(VisWriteError::NoData);
    }
    debug!(
        "Writing {} ({} baselines, {} times, {} channels, xtalk={})",
        path.display(),
        baselines.len(),
        nt,
        nf,
        xtalk
    );

    let array_pos = layout.array_position();
    let start = Epoch::from_jde_utc(times_jd[0]);
    let dut1 = Duration::from_seconds(0.0);
    let vis_ctx = VisContext {
        num_sel_timesteps: nt,
        start_timestamp: start,
        int_time: Duration::from_seconds(integration_time_s),
        num_sel_chans: nf,
        start_freq_hz: freqs_hz[0],
        freq_resolution_hz: if nf > 1 {
            freqs_hz[1] - freqs_hz[0]
        } else {
            1.0
        },
        sel_baselines: baselines.clone(),
        avg_time: 1,
        avg_freq: 1,
        num_vis_pols: 4,
    };

    // Zenith at the first timestamp.
    let lst = get_lmst(array_pos.longitude_rad, start, dut1);
    let phase_centre = RADec::new(lst, array_pos.latitude_rad);

    let nant = layout.nant();
    let antenna_names: Vec<String> = (0..nant).map(|a| format!("ANT{a}")).collect();
    let antenna_positions: Vec<XyzGeodetic> = (0..nant)
        .map(|a| {
            let [e, n, h] = layout.position(a).unwrap_or([0.0; 3]);
            ENH { e, n, h }.to_xyz(array_pos.latitude_rad)
        })
        .collect();

    // It's possible that the command-line call has invalid UTF-8. So use
    // args_os and attempt to convert to UTF-8 strings. If there are
    // problems on the way, don't bother trying to write the CMDLINE key.
    let cmd_line = std::env::args_os()
        .map(|a| a.into_string())
        .collect::<Result<Vec<String>, _>>()
        .map(|v| v.join(" "))
        .ok();
    let history = History {
        application: Some("hera_redcal"),
        cmd_line: cmd_line.as_deref(),
        message,
    };

    let mut uvfits = UvfitsWriter::from_marlu(
        path,
        &vis_ctx,
        array_pos,
        phase_centre,
        dut1,
        None,
        antenna_names,
        antenna_positions,
        true,
        Some(&history),
    )?;

    let mut vis = Array3::from_elem((nt, nf, baselines.len()), Jones::<f32>::default());
    let mut weights = Array3::from_elem((nt, nf, baselines.len()), 0.0_f32);
    for (b, &bl) in baselines.iter().enumerate() {
        for &pp in data.pols().iter() {
            let arr = match data.get(bl, pp) {
                Some(arr) => arr,
                None => continue,
            };
            let time_static = arr.dim() == (1, nf);
            if arr.dim() != (nt, nf) && !(xtalk && time_static) {
                return Err(VisWriteError::BadShape {
                    i: bl.0,
                    j: bl.1,
                    pol: pp,
                    expected: (nt, nf),
                    actual: arr.dim(),
                });
            }
            let slot = jones_slot(pp);
            for t in 0..nt {
                for f in 0..nf {
                    let v = if time_static { arr[(0, f)] } else { arr[(t, f)] };
                    vis[(t, f, b)][slot] = Complex::new(v.re as f32, v.im as f32);
                    weights[(t, f, b)] = 1.0;
                }
            }
        }
    }

    uvfits.write_vis(vis.view(), weights.view(), &vis_ctx)?;
    uvfits.finalise()?;
    Ok(())
}
