// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to handle reading from uvfits files.
//!
//! A compact random-groups reader: enough to consume drift-scan HERA
//! visibility files (and everything this crate writes) into
//! baseline/polarization-keyed mappings. Parameter positions are
//! discovered from the `PTYPE` keys, times from the `DATE` parameters plus
//! their `PZERO` offsets.

use std::collections::HashMap;
use std::path::Path;

use fitsio::errors::check_status as fits_check_status;
use fitsio::FitsFile;
use indexmap::IndexMap;
use log::debug;
use marlu::{c64, io::uvfits::decode_uvfits_baseline};
use ndarray::prelude::*;

use super::VisReadError;
use crate::constants::SECONDS_PER_DAY;
use crate::container::DataContainer;
use crate::omni::WeightMap;
use crate::pol::PolPair;

/// Metadata of one visibility file.
#[derive(Debug, Clone)]
pub struct VisMeta {
    /// Integration centroids \[Julian date\].
    pub times: Vec<f64>,

    /// Channel frequencies \[Hz\].
    pub freqs: Vec<f64>,

    /// \[seconds\]
    pub integration_time: f64,
}

/// Read the requested polarizations of a uvfits file into a
/// [`DataContainer`] (and the matching weights).
pub fn read_vis(
    path: &Path,
    pols: &[PolPair],
) -> Result<(VisMeta, DataContainer<Array2<c64>>, WeightMap), VisReadError> {
    if !path.exists() {
        return Err(VisReadError::BadFile(path.to_path_buf()));
    }
    debug!("Reading visibilities from {}", path.display());
    let mut fptr = FitsFile::open(path)?;
    let hdu = fptr.hdu(0)?;
    let file = || path.display().to_string();

    let gcount: i64 = hdu.read_key(&mut fptr, "GCOUNT")?;
    let pcount: i64 = hdu.read_key(&mut fptr, "PCOUNT")?;
    let floats_per_pol: i64 = hdu.read_key(&mut fptr, "NAXIS2")?;
    if floats_per_pol != 3 {
        return Err(VisReadError::UnexpectedFloatsPerPol {
            file: file(),
            expected: 3,
            actual: floats_per_pol as usize,
        });
    }
    let num_pols = hdu.read_key::<i64>(&mut fptr, "NAXIS3")? as usize;
    let nf = hdu.read_key::<i64>(&mut fptr, "NAXIS4")? as usize;

    // The polarization (STOKES) and frequency axes.
    let crval3: f64 = hdu.read_key(&mut fptr, "CRVAL3")?;
    let cdelt3: f64 = hdu.read_key(&mut fptr, "CDELT3")?;
    let crpix3 = hdu.read_key::<f64>(&mut fptr, "CRPIX3").unwrap_or(1.0);
    let crval4: f64 = hdu.read_key(&mut fptr, "CRVAL4")?;
    let cdelt4: f64 = hdu.read_key(&mut fptr, "CDELT4")?;
    let crpix4 = hdu.read_key::<f64>(&mut fptr, "CRPIX4").unwrap_or(1.0);
    let freqs: Vec<f64> = (0..nf)
        .map(|f| crval4 + ((f + 1) as f64 - crpix4) * cdelt4)
        .collect();

    // Group parameter positions, from the PTYPE keys (1-indexed).
    let mut baseline_index = None;
    let mut date_indices = vec![];
    let mut inttim_index = None;
    for i in 1..=pcount {
        let ptype: String = match hdu.read_key(&mut fptr, &format!("PTYPE{i}")) {
            Ok(p) => p,
            Err(_) => break,
        };
        match ptype.as_str() {
            "BASELINE" => baseline_index = Some(i as usize),
            "DATE" => date_indices.push(i as usize),
            "INTTIM" => inttim_index = Some(i as usize),
            _ => (),
        }
    }
    let baseline_index = baseline_index.ok_or(VisReadError::MissingGroupParam {
        file: file(),
        key: "BASELINE",
    })?;
    if date_indices.is_empty() {
        return Err(VisReadError::MissingGroupParam {
            file: file(),
            key: "DATE",
        });
    }
    let pzeros: Vec<f64> = (1..=pcount)
        .map(|i| hdu.read_key::<f64>(&mut fptr, &format!("PZERO{i}")).unwrap_or(0.0))
        .collect();

    // Which STOKES slot carries each requested polarization pair?
    let slot_of = |pp: PolPair| -> Option<usize> {
        (0..num_pols)
            .find(|&p| (crval3 + ((p + 1) as f64 - crpix3) * cdelt3).round() as i32 == pp.aips_code())
    };
    let mut requested: Vec<(PolPair, usize)> = Vec::with_capacity(pols.len());
    for &pp in pols {
        let slot = slot_of(pp).ok_or(VisReadError::PolNotPresent {
            file: file(),
            pol: pp,
        })?;
        requested.push((pp, slot));
    }

    // Bulk-read every row's group parameters.
    let num_rows = gcount as usize;
    let mut group_params = Array2::<f32>::zeros((num_rows, pcount as usize));
    unsafe {
        let mut status = 0;
        // ffggpe = fits_read_grppar_flt
        fitsio_sys::ffggpe(
            fptr.as_raw(),             /* I - FITS file pointer                       */
            1,                         /* I - group to read (1 = 1st group)           */
            1,                         /* I - first vector element to read (1 = 1st)  */
            (gcount * pcount) as i64,  /* I - number of values to read                */
            group_params.as_mut_ptr(), /* O - array of values that are returned       */
            &mut status,               /* IO - error status                           */
        );
        fits_check_status(status)?;
    }

    // Times (preserving file order) and the baseline of every row.
    let mut time_indices: HashMap<u64, usize> = HashMap::new();
    let mut times: Vec<f64> = vec![];
    let mut row_time: Vec<usize> = Vec::with_capacity(num_rows);
    let mut row_bl: Vec<(usize, usize)> = Vec::with_capacity(num_rows);
    for r in 0..num_rows {
        let jd: f64 = date_indices
            .iter()
            .map(|&d| group_params[(r, d - 1)] as f64 + pzeros[d - 1])
            .sum();
        // Floats can't be hashed; hash the bits.
        let i = *time_indices.entry(jd.to_bits()).or_insert_with(|| {
            times.push(jd);
            times.len() - 1
        });
        row_time.push(i);

        let uvfits_bl =
            group_params[(r, baseline_index - 1)] as f64 + pzeros[baseline_index - 1];
        let (ant1, ant2) = decode_uvfits_baseline(uvfits_bl.round() as usize);
        row_bl.push((ant1.saturating_sub(1), ant2.saturating_sub(1)));
    }
    let nt = times.len();

    let integration_time = match inttim_index {
        Some(i) => group_params[(0, i - 1)] as f64,
        None if nt > 1 => (times[1] - times[0]) * SECONDS_PER_DAY,
        None => 0.0,
    };

    // Read each row's visibilities into per-(baseline, pol) arrays.
    let mut data_arrays: IndexMap<(usize, usize, PolPair), Array2<c64>> = IndexMap::new();
    let mut weight_arrays: IndexMap<(usize, usize, PolPair), Array2<f64>> = IndexMap::new();
    let mut row_buf = vec![0_f32; 3 * num_pols * nf];
    for r in 0..num_rows {
        let mut status = 0;
        unsafe {
            // ffgpve = fits_read_img_flt
            fitsio_sys::ffgpve(
                fptr.as_raw(),        /* I - FITS file pointer                       */
                1 + r as i64,         /* I - group to read (1 = 1st group)           */
                1,                    /* I - first vector element to read (1 = 1st)  */
                row_buf.len() as i64, /* I - number of values to read                */
                0.0,                  /* I - value for undefined pixels              */
                row_buf.as_mut_ptr(), /* O - array of values that are returned       */
                &mut 0,               /* O - set to 1 if any values are null; else 0 */
                &mut status,          /* IO - error status                           */
            );
        }
        fits_check_status(status)?;

        let t = row_time[r];
        let (i, j) = row_bl[r];
        for &(pp, slot) in &requested {
            let data = data_arrays
                .entry((i, j, pp))
                .or_insert_with(|| Array2::zeros((nt, nf)));
            let weights = weight_arrays
                .entry((i, j, pp))
                .or_insert_with(|| Array2::zeros((nt, nf)));
            for f in 0..nf {
                let base = (f * num_pols + slot) * 3;
                data[(t, f)] = c64::new(row_buf[base] as f64, row_buf[base + 1] as f64);
                weights[(t, f)] = row_buf[base + 2] as f64;
            }
        }
    }

    let container = DataContainer::from_flat(data_arrays);
    let mut wgts = WeightMap::default();
    for ((i, j, pp), arr) in weight_arrays {
        wgts.entry(pp).or_default().insert((i, j), arr);
    }

    Ok((
        VisMeta {
            times,
            freqs,
            integration_time,
        },
        container,
        wgts,
    ))
}
