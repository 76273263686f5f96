// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility adapter tests: what we write, we can read back.

use approx::assert_abs_diff_eq;
use marlu::c64;
use ndarray::prelude::*;
use tempfile::TempDir;

use super::*;
use crate::container::DataContainer;
use crate::layout::ArrayLayout;
use crate::pol::PolPair;

const NT: usize = 2;
const NF: usize = 4;

fn test_layout() -> ArrayLayout {
    ArrayLayout {
        latitude_deg: -30.7215,
        longitude_deg: 21.4283,
        height_m: 1073.0,
        antpos_enu: vec![
            Some([0.0, 0.0, 0.0]),
            Some([14.6, 0.0, 0.0]),
            Some([14.6, 14.6, 0.0]),
        ],
    }
}

fn times_jd() -> Vec<f64> {
    vec![2457698.40355, 2457698.40367]
}

fn freqs_hz() -> Vec<f64> {
    (0..NF).map(|f| 100e6 + 1e6 * f as f64).collect()
}

fn xx() -> PolPair {
    "xx".parse().unwrap()
}

#[test]
fn write_then_read_round_trips() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("vis.uvfits");

    let bls = [(0_usize, 1_usize), (0, 2), (1, 2)];
    let data = DataContainer::from_flat(bls.iter().enumerate().map(|(b, &(i, j))| {
        (
            (i, j, xx()),
            Array2::from_shape_fn((NT, NF), |(t, f)| {
                c64::new((b + 1) as f64 + t as f64 * 0.5, f as f64 * 0.25)
            }),
        )
    }));

    write_vis(
        &path,
        &test_layout(),
        &times_jd(),
        &freqs_hz(),
        10.7,
        &data,
        false,
        Some("test write"),
    )
    .unwrap();

    let (meta, read, wgts) = read_vis(&path, &[xx()]).unwrap();
    assert_eq!(meta.times.len(), NT);
    for (a, b) in meta.times.iter().zip(times_jd()) {
        assert_abs_diff_eq!(*a, b, epsilon = 1e-6);
    }
    for (a, b) in meta.freqs.iter().zip(freqs_hz()) {
        assert_abs_diff_eq!(*a, b, epsilon = 1.0);
    }
    assert_abs_diff_eq!(meta.integration_time, 10.7, epsilon = 1e-3);

    for &(i, j) in &bls {
        let expected = data.get((i, j), xx()).unwrap();
        let got = read.get((i, j), xx()).unwrap();
        assert_eq!(got.dim(), (NT, NF));
        for t in 0..NT {
            for f in 0..NF {
                assert_abs_diff_eq!(got[(t, f)], expected[(t, f)], epsilon = 1e-3);
            }
        }
        let w = &wgts[&xx()][&(i, j)];
        assert!(w.iter().all(|&w| w > 0.0));
    }
}

#[test]
fn xtalk_mode_broadcasts_time_static_input() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("xtalk.uvfits");

    // One estimate per frequency, no time axis to speak of.
    let data = DataContainer::from_flat([(
        (0_usize, 1_usize, xx()),
        Array2::from_shape_fn((1, NF), |(_, f)| c64::new(f as f64, -1.0)),
    )]);

    write_vis(
        &path,
        &test_layout(),
        &times_jd(),
        &freqs_hz(),
        10.7,
        &data,
        true,
        None,
    )
    .unwrap();

    let (meta, read, _) = read_vis(&path, &[xx()]).unwrap();
    assert_eq!(meta.times.len(), NT);
    let got = read.get((0, 1), xx()).unwrap();
    assert_eq!(got.dim(), (NT, NF));
    for f in 0..NF {
        assert_abs_diff_eq!(got[(0, f)], got[(1, f)], epsilon = 1e-9);
        assert_abs_diff_eq!(got[(0, f)], c64::new(f as f64, -1.0), epsilon = 1e-3);
    }
}

#[test]
fn non_xtalk_writes_reject_time_static_arrays() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.uvfits");
    let data = DataContainer::from_flat([(
        (0_usize, 1_usize, xx()),
        Array2::from_elem((1, NF), c64::new(1.0, 0.0)),
    )]);
    let result = write_vis(
        &path,
        &test_layout(),
        &times_jd(),
        &freqs_hz(),
        10.7,
        &data,
        false,
        None,
    );
    assert!(matches!(result, Err(VisWriteError::BadShape { .. })));
}

#[test]
fn all_four_stokes_slots_are_addressable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("vis.uvfits");
    let data = DataContainer::from_flat([(
        (0_usize, 1_usize, xx()),
        Array2::from_elem((NT, NF), c64::new(1.0, 0.0)),
    )]);
    write_vis(
        &path,
        &test_layout(),
        &times_jd(),
        &freqs_hz(),
        10.7,
        &data,
        false,
        None,
    )
    .unwrap();

    // The file carries a 4-pol STOKES axis; unwritten slots read back as
    // zeros.
    let yx: PolPair = "yx".parse().unwrap();
    let (_, read, _) = read_vis(&path, &[yx]).unwrap();
    let got = read.get((0, 1), yx).unwrap();
    assert_abs_diff_eq!(
        got.view(),
        Array2::zeros((NT, NF)).view(),
        epsilon = 1e-9
    );
}
