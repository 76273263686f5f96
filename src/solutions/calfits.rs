// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The calfits-style on-disk layout of calibration solutions.
//!
//! Primary HDU keys: `CALTYPE` ("gain" or "delay"), `GAINCONV` ("multiply"
//! or "divide"), `INTTIME` \[s\], `SOFTWARE`, and the long-string
//! `CALHIST` history. Binary tables: `ANTENNAS` (column "Antenna") and
//! `JONES` (column "Jones", AIPS codes). Image HDUs: `FREQS` \[Hz\],
//! `TIMES` \[JD\], optional `LSTS` \[rad\], `GAINS` (jones, antenna, time,
//! freq, re/im) or `DELAYS` (jones, antenna, time, 1), `FLAGS` (0/1),
//! optional `QUALITY` and optional `CHISQ` (time, freq). Antennas missing
//! from a polarization's maps are written as NaNs.

use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;
use std::str::FromStr;

use fitsio::errors::check_status as fits_check_status;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::tables::{ColumnDataType, ColumnDescription};
use fitsio::FitsFile;
use marlu::c64;
use ndarray::prelude::*;

use super::{
    CalMeta, CalSolutions, CalType, DelayMap, FlagMap, GainConvention, QualityMap,
    SolutionsReadError, SolutionsWriteError,
};
use crate::pol::Pol;
use crate::redinfo::GainMap;

fn optional_hdu(
    fptr: &mut FitsFile,
    name: &str,
) -> Result<Option<fitsio::hdu::FitsHdu>, fitsio::errors::Error> {
    match fptr.hdu(name) {
        Ok(hdu) => Ok(Some(hdu)),
        // Status code 301 means "unavailable".
        Err(fitsio::errors::Error::Fits(fitsio::errors::FitsError { status: 301, .. })) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read a long-string key, following cfitsio's CONTINUE convention.
fn read_long_string(
    fptr: &mut FitsFile,
    keyword: &str,
) -> Result<Option<String>, fitsio::errors::Error> {
    let keyword_ffi =
        CString::new(keyword).expect("read_long_string: CString::new() failed for keyword");
    unsafe {
        let mut status = 0;
        let mut long_string_ptr = ptr::null_mut();
        // ffgkls = fits_read_key_longstr
        fitsio_sys::ffgkls(
            fptr.as_raw(),
            keyword_ffi.as_ptr(),
            &mut long_string_ptr,
            ptr::null_mut(),
            &mut status,
        );
        match status {
            0 => {
                let long_string = CStr::from_ptr(long_string_ptr)
                    .to_string_lossy()
                    .into_owned();
                // fffree = fits_free_memory
                fitsio_sys::fffree(long_string_ptr.cast(), &mut 0);
                Ok(Some(long_string))
            }
            202 | 204 => Ok(None),
            _ => {
                fits_check_status(status)?;
                Ok(None)
            }
        }
    }
}

/// Write a long-string key, following cfitsio's CONTINUE convention.
fn write_long_string(
    fptr: &mut FitsFile,
    keyword: &str,
    value: &str,
    comment: Option<&str>,
) -> Result<(), fitsio::errors::Error> {
    let keyword = CString::new(keyword).expect("write_long_string: bad keyword");
    let value = CString::new(value).unwrap_or_default();
    let comment = comment.map(|c| CString::new(c).expect("write_long_string: bad comment"));
    let mut status = 0;
    unsafe {
        // ffpkls = fits_write_key_longstr
        fitsio_sys::ffpkls(
            fptr.as_raw(),
            keyword.as_ptr(),
            value.as_ptr(),
            comment.as_ref().map(|c| c.as_ptr()).unwrap_or(ptr::null()),
            &mut status,
        );
    }
    fits_check_status(status)
}

fn expect_len(
    thing: &'static str,
    actual: usize,
    expected: usize,
) -> Result<(), SolutionsReadError> {
    if actual == expected {
        Ok(())
    } else {
        Err(SolutionsReadError::BadShape {
            thing,
            expected,
            actual,
        })
    }
}

pub(super) fn read(file: &Path) -> Result<CalSolutions, SolutionsReadError> {
    let mut fptr = FitsFile::open(file)?;
    let hdu = fptr.hdu(0)?;

    let cal_type_str: String = hdu.read_key(&mut fptr, "CALTYPE")?;
    let cal_type = CalType::from_str(&cal_type_str).map_err(|_| SolutionsReadError::BadCalType {
        file: file.display().to_string(),
        got: cal_type_str,
    })?;
    let gain_convention_str: String = hdu.read_key(&mut fptr, "GAINCONV")?;
    let gain_convention = GainConvention::from_str(&gain_convention_str).map_err(|_| {
        SolutionsReadError::BadGainConvention {
            file: file.display().to_string(),
            got: gain_convention_str,
        }
    })?;
    let integration_time: f64 = hdu.read_key(&mut fptr, "INTTIME")?;
    let history = read_long_string(&mut fptr, "CALHIST")?.unwrap_or_default();

    let ants: Vec<u32> = {
        let hdu = fptr.hdu("ANTENNAS")?;
        hdu.read_col(&mut fptr, "Antenna")?
    };
    let jones: Vec<i32> = {
        let hdu = fptr.hdu("JONES")?;
        hdu.read_col(&mut fptr, "Jones")?
    };
    let pols = jones
        .iter()
        .map(|&code| Pol::from_jones_code(code))
        .collect::<Result<Vec<_>, _>>()?;

    let freqs: Vec<f64> = {
        let hdu = fptr.hdu("FREQS")?;
        hdu.read_image(&mut fptr)?
    };
    let times: Vec<f64> = {
        let hdu = fptr.hdu("TIMES")?;
        hdu.read_image(&mut fptr)?
    };
    let lsts: Vec<f64> = match optional_hdu(&mut fptr, "LSTS")? {
        Some(hdu) => hdu.read_image(&mut fptr)?,
        None => vec![],
    };

    let (njones, nant, nt, nf) = (pols.len(), ants.len(), times.len(), freqs.len());

    let mut gains = GainMap::default();
    let mut delays: Option<DelayMap> = None;
    match cal_type {
        CalType::Gain => {
            let hdu = fptr.hdu("GAINS")?;
            let v: Vec<f64> = hdu.read_image(&mut fptr)?;
            expect_len("the GAINS image", v.len(), njones * nant * nt * nf * 2)?;
            for (p, &pol) in pols.iter().enumerate() {
                let per_ant = gains.entry(pol).or_default();
                for (a, &ant) in ants.iter().enumerate() {
                    let arr = Array2::from_shape_fn((nt, nf), |(t, f)| {
                        let base = ((((p * nant) + a) * nt + t) * nf + f) * 2;
                        c64::new(v[base], v[base + 1])
                    });
                    per_ant.insert(ant as usize, arr);
                }
            }
        }
        CalType::Delay => {
            let hdu = fptr.hdu("DELAYS")?;
            let v: Vec<f64> = hdu.read_image(&mut fptr)?;
            expect_len("the DELAYS image", v.len(), njones * nant * nt)?;
            let mut delay_map = DelayMap::default();
            for (p, &pol) in pols.iter().enumerate() {
                let per_ant = delay_map.entry(pol).or_default();
                for (a, &ant) in ants.iter().enumerate() {
                    let arr = Array2::from_shape_fn((nt, 1), |(t, _)| v[((p * nant) + a) * nt + t]);
                    per_ant.insert(ant as usize, arr);
                }
            }
            delays = Some(delay_map);
        }
    }

    let mut flags = FlagMap::default();
    {
        let hdu = fptr.hdu("FLAGS")?;
        let v: Vec<f64> = hdu.read_image(&mut fptr)?;
        expect_len("the FLAGS image", v.len(), njones * nant * nt * nf)?;
        for (p, &pol) in pols.iter().enumerate() {
            let per_ant = flags.entry(pol).or_default();
            for (a, &ant) in ants.iter().enumerate() {
                let arr = Array2::from_shape_fn((nt, nf), |(t, f)| {
                    v[(((p * nant) + a) * nt + t) * nf + f] != 0.0
                });
                per_ant.insert(ant as usize, arr);
            }
        }
    }

    let quality: Option<QualityMap> = match optional_hdu(&mut fptr, "QUALITY")? {
        Some(hdu) => {
            let v: Vec<f64> = hdu.read_image(&mut fptr)?;
            expect_len("the QUALITY image", v.len(), njones * nant * nt * nf)?;
            let mut quality = QualityMap::default();
            for (p, &pol) in pols.iter().enumerate() {
                let per_ant = quality.entry(pol).or_default();
                for (a, &ant) in ants.iter().enumerate() {
                    let arr = Array2::from_shape_fn((nt, nf), |(t, f)| {
                        v[(((p * nant) + a) * nt + t) * nf + f]
                    });
                    per_ant.insert(ant as usize, arr);
                }
            }
            Some(quality)
        }
        None => None,
    };

    let chisq: Option<Array2<f64>> = match optional_hdu(&mut fptr, "CHISQ")? {
        Some(hdu) => {
            let v: Vec<f64> = hdu.read_image(&mut fptr)?;
            expect_len("the CHISQ image", v.len(), nt * nf)?;
            Some(Array2::from_shape_vec((nt, nf), v).unwrap())
        }
        None => None,
    };

    Ok(CalSolutions {
        meta: CalMeta {
            freqs,
            times,
            lsts,
            history,
            gain_convention,
            integration_time,
            chisq,
        },
        cal_type,
        ants: ants.into_iter().map(|a| a as usize).collect(),
        gains,
        delays,
        flags,
        quality,
    })
}

fn write_image_f64(
    fptr: &mut FitsFile,
    name: &str,
    dimensions: &[usize],
    data: &[f64],
) -> Result<(), fitsio::errors::Error> {
    let image_description = ImageDescription {
        data_type: ImageType::Double,
        dimensions,
    };
    let hdu = fptr.create_image(name, &image_description)?;
    hdu.write_image(fptr, data)
}

pub(super) fn write(sols: &CalSolutions, file: &Path) -> Result<(), SolutionsWriteError> {
    if file.exists() {
        std::fs::remove_file(file)?;
    }
    let mut fptr = FitsFile::create(file).open()?;
    let hdu = fptr.hdu(0)?;

    // Signal that we're using long strings.
    let mut status = 0;
    unsafe {
        // ffplsw = fits_write_key_longwarn
        fitsio_sys::ffplsw(fptr.as_raw(), &mut status);
    }
    fits_check_status(status).map_err(SolutionsWriteError::Fitsio)?;

    hdu.write_key(&mut fptr, "CALTYPE", sols.cal_type.to_string())?;
    hdu.write_key(&mut fptr, "GAINCONV", sols.meta.gain_convention.to_string())?;
    hdu.write_key(&mut fptr, "INTTIME", sols.meta.integration_time)?;
    hdu.write_key(
        &mut fptr,
        "SOFTWARE",
        format!(
            "Created by {} v{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ),
    )?;
    write_long_string(
        &mut fptr,
        "CALHIST",
        &sols.meta.history,
        Some("Calibration history"),
    )?;

    let pols = sols.pols();
    let (njones, nant) = (pols.len(), sols.ants.len());
    let (nt, nf) = (sols.meta.times.len(), sols.meta.freqs.len());

    {
        let antenna_col = ColumnDescription::new("Antenna")
            .with_type(ColumnDataType::Int)
            .create()?;
        let hdu = fptr.create_table("ANTENNAS", &[antenna_col])?;
        hdu.write_col(
            &mut fptr,
            "Antenna",
            &sols.ants.iter().map(|&a| a as u32).collect::<Vec<u32>>(),
        )?;
    }
    {
        let jones_col = ColumnDescription::new("Jones")
            .with_type(ColumnDataType::Int)
            .create()?;
        let hdu = fptr.create_table("JONES", &[jones_col])?;
        hdu.write_col(
            &mut fptr,
            "Jones",
            &pols.iter().map(|p| p.jones_code()).collect::<Vec<i32>>(),
        )?;
    }

    write_image_f64(&mut fptr, "FREQS", &[nf], &sols.meta.freqs)?;
    write_image_f64(&mut fptr, "TIMES", &[nt], &sols.meta.times)?;
    if !sols.meta.lsts.is_empty() {
        write_image_f64(&mut fptr, "LSTS", &[sols.meta.lsts.len()], &sols.meta.lsts)?;
    }

    match sols.cal_type {
        CalType::Gain => {
            let dim = [njones, nant, nt, nf, 2];
            let mut data = vec![f64::NAN; dim.iter().product()];
            for (p, pol) in pols.iter().enumerate() {
                for (a, ant) in sols.ants.iter().enumerate() {
                    let arr = match sols.gains.get(pol).and_then(|m| m.get(ant)) {
                        Some(arr) => arr,
                        None => continue,
                    };
                    for t in 0..nt {
                        for f in 0..nf {
                            let base = ((((p * nant) + a) * nt + t) * nf + f) * 2;
                            data[base] = arr[(t, f)].re;
                            data[base + 1] = arr[(t, f)].im;
                        }
                    }
                }
            }
            write_image_f64(&mut fptr, "GAINS", &dim, &data)?;
        }
        CalType::Delay => {
            let dim = [njones, nant, nt, 1];
            let mut data = vec![f64::NAN; dim.iter().product()];
            for (p, pol) in pols.iter().enumerate() {
                for (a, ant) in sols.ants.iter().enumerate() {
                    let arr = match sols.delays.as_ref().and_then(|d| d.get(pol)).and_then(|m| m.get(ant))
                    {
                        Some(arr) => arr,
                        None => continue,
                    };
                    for t in 0..nt {
                        data[((p * nant) + a) * nt + t] = arr[(t, 0)];
                    }
                }
            }
            write_image_f64(&mut fptr, "DELAYS", &dim, &data)?;
        }
    }

    {
        let dim = [njones, nant, nt, nf];
        // An antenna missing from the flag maps is flagged throughout.
        let mut data = vec![1.0; dim.iter().product()];
        for (p, pol) in pols.iter().enumerate() {
            for (a, ant) in sols.ants.iter().enumerate() {
                let arr = match sols.flags.get(pol).and_then(|m| m.get(ant)) {
                    Some(arr) => arr,
                    None => continue,
                };
                for t in 0..nt {
                    for f in 0..nf {
                        data[(((p * nant) + a) * nt + t) * nf + f] =
                            if arr[(t, f)] { 1.0 } else { 0.0 };
                    }
                }
            }
        }
        write_image_f64(&mut fptr, "FLAGS", &dim, &data)?;
    }

    if let Some(quality) = &sols.quality {
        let dim = [njones, nant, nt, nf];
        let mut data = vec![0.0; dim.iter().product()];
        for (p, pol) in pols.iter().enumerate() {
            for (a, ant) in sols.ants.iter().enumerate() {
                let arr = match quality.get(pol).and_then(|m| m.get(ant)) {
                    Some(arr) => arr,
                    None => continue,
                };
                for t in 0..nt {
                    for f in 0..nf {
                        data[(((p * nant) + a) * nt + t) * nf + f] = arr[(t, f)];
                    }
                }
            }
        }
        write_image_f64(&mut fptr, "QUALITY", &dim, &data)?;
    }

    if let Some(chisq) = &sols.meta.chisq {
        let mut data = Vec::with_capacity(nt * nf);
        for t in 0..nt {
            for f in 0..nf {
                data.push(chisq[(t, f)]);
            }
        }
        write_image_f64(&mut fptr, "CHISQ", &[nt, nf], &data)?;
    }

    Ok(())
}
