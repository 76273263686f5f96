// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Calibration solutions tests.

use approx::assert_abs_diff_eq;
use marlu::c64;
use ndarray::prelude::*;
use tempfile::TempDir;

use super::*;

const NT: usize = 2;
const NF: usize = 3;

fn test_meta() -> CalMeta {
    CalMeta {
        freqs: vec![100e6, 101e6, 102e6],
        times: vec![2457698.40355, 2457698.40366],
        lsts: vec![1.1, 1.2],
        history: "calibrated in a test".to_string(),
        gain_convention: GainConvention::Divide,
        integration_time: 10.7,
        chisq: Some(Array2::from_shape_fn((NT, NF), |(t, f)| (t + f) as f64)),
    }
}

fn gain_sols(pol: Pol) -> CalSolutions {
    let ants = vec![0, 1];
    let mut gains = GainMap::default();
    let per_ant = gains.entry(pol).or_default();
    for &ant in &ants {
        per_ant.insert(
            ant,
            Array2::from_shape_fn((NT, NF), |(t, f)| {
                c64::new(1.0 + ant as f64, (t * NF + f) as f64 * 0.1)
            }),
        );
    }
    let mut flags = FlagMap::default();
    let per_ant = flags.entry(pol).or_default();
    for &ant in &ants {
        per_ant.insert(
            ant,
            Array2::from_shape_fn((NT, NF), |(t, f)| ant == 1 && t == 0 && f == 2),
        );
    }
    CalSolutions {
        meta: test_meta(),
        cal_type: CalType::Gain,
        ants,
        gains,
        delays: None,
        flags,
        quality: None,
    }
}

fn delay_sols() -> CalSolutions {
    let ants = vec![0, 1];
    let mut delays = DelayMap::default();
    let per_ant = delays.entry(Pol::X).or_default();
    for &ant in &ants {
        per_ant.insert(
            ant,
            Array2::from_shape_fn((NT, 1), |(t, _)| 1e-9 * (ant + t + 1) as f64),
        );
    }
    let mut flags = FlagMap::default();
    let per_ant = flags.entry(Pol::X).or_default();
    for &ant in &ants {
        per_ant.insert(ant, Array2::from_elem((NT, NF), false));
    }
    CalSolutions {
        meta: test_meta(),
        cal_type: CalType::Delay,
        ants,
        gains: GainMap::default(),
        delays: Some(delays),
        flags,
        quality: None,
    }
}

#[test]
fn delays_become_unit_amplitude_phase_gains() {
    let freqs = [100e6, 150e6];
    let delays = Array2::from_elem((1, 1), 10e-9);
    let gains = gains_from_delays(&freqs, &delays);
    assert_eq!(gains.dim(), (1, 2));
    for f in 0..2 {
        assert_abs_diff_eq!(gains[(0, f)].norm(), 1.0, epsilon = 1e-12);
        let expected = -std::f64::consts::TAU * freqs[f] * 10e-9;
        assert_abs_diff_eq!(gains[(0, f)].arg().sin(), expected.sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(gains[(0, f)].arg().cos(), expected.cos(), epsilon = 1e-12);
    }
    // A zero delay is no correction at all.
    let gains = gains_from_delays(&freqs, &Array2::zeros((1, 1)));
    assert_abs_diff_eq!(gains[(0, 0)], c64::new(1.0, 0.0), epsilon = 1e-12);
}

#[test]
fn gain_write_read_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sols.calfits");
    let sols = gain_sols(Pol::X);
    sols.write(&path).unwrap();

    let read = CalSolutions::read(&[path], &ReadOptions::default()).unwrap();
    assert_eq!(read.cal_type, CalType::Gain);
    assert_eq!(read.ants, sols.ants);
    assert_eq!(read.meta.gain_convention, GainConvention::Divide);
    assert_eq!(read.meta.history, sols.meta.history);
    assert_abs_diff_eq!(
        read.meta.integration_time,
        sols.meta.integration_time,
        epsilon = 1e-9
    );
    assert_eq!(read.meta.freqs, sols.meta.freqs);
    assert_eq!(read.meta.times, sols.meta.times);
    for &ant in &sols.ants {
        assert_abs_diff_eq!(
            read.gains[&Pol::X][&ant].view(),
            sols.gains[&Pol::X][&ant].view(),
            epsilon = 1e-12
        );
        assert_eq!(read.flags[&Pol::X][&ant], sols.flags[&Pol::X][&ant]);
    }
    assert_abs_diff_eq!(
        read.meta.chisq.as_ref().unwrap().view(),
        sols.meta.chisq.as_ref().unwrap().view(),
        epsilon = 1e-12
    );
}

#[test]
fn reading_a_file_twice_concatenates_in_time() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sols.calfits");
    gain_sols(Pol::X).write(&path).unwrap();

    let read = CalSolutions::read(&[path.clone(), path], &ReadOptions::default()).unwrap();
    assert_eq!(read.meta.times.len(), 2 * NT);
    assert_eq!(read.gains[&Pol::X][&0].dim(), (2 * NT, NF));
    assert_eq!(read.meta.chisq.as_ref().unwrap().dim(), (2 * NT, NF));
    // Both halves carry the same values.
    let g = &read.gains[&Pol::X][&0];
    assert_abs_diff_eq!(
        g.slice(s![..NT, ..]),
        g.slice(s![NT.., ..]),
        epsilon = 1e-12
    );
}

#[test]
fn mismatched_headers_reject_the_batch() {
    let tmp = TempDir::new().unwrap();
    let a = tmp.path().join("a.calfits");
    let b = tmp.path().join("b.calfits");
    gain_sols(Pol::X).write(&a).unwrap();

    // Gain convention.
    let mut other = gain_sols(Pol::X);
    other.meta.gain_convention = GainConvention::Multiply;
    other.write(&b).unwrap();
    assert!(matches!(
        CalSolutions::read(&[a.clone(), b.clone()], &ReadOptions::default()),
        Err(SolutionsReadError::Mismatch { key: "GAINCONV", .. })
    ));

    // Integration time.
    let mut other = gain_sols(Pol::X);
    other.meta.integration_time = 3.145;
    other.write(&b).unwrap();
    assert!(matches!(
        CalSolutions::read(&[a.clone(), b.clone()], &ReadOptions::default()),
        Err(SolutionsReadError::Mismatch { key: "INTTIME", .. })
    ));

    // Frequencies.
    let mut other = gain_sols(Pol::X);
    for f in &mut other.meta.freqs {
        *f += 1e4;
    }
    other.write(&b).unwrap();
    assert!(matches!(
        CalSolutions::read(&[a.clone(), b.clone()], &ReadOptions::default()),
        Err(SolutionsReadError::Mismatch { key: "FREQS", .. })
    ));

    // Calibration type.
    delay_sols().write(&b).unwrap();
    assert!(matches!(
        CalSolutions::read(&[a, b], &ReadOptions::default()),
        Err(SolutionsReadError::Mismatch { key: "CALTYPE", .. })
    ));
}

#[test]
fn antenna_selection() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sols.calfits");
    gain_sols(Pol::X).write(&path).unwrap();

    let read = CalSolutions::read(
        &[path],
        &ReadOptions {
            antenna_nums: Some(vec![1, 9, 112]),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(read.ants, vec![1]);
    assert!(read.gains[&Pol::X].get(&0).is_none());
    assert!(read.gains[&Pol::X].get(&1).is_some());
}

#[test]
fn delay_files_convert_to_gains_unless_kept() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("first.calfits");
    let sols = delay_sols();
    sols.write(&path).unwrap();

    let converted = CalSolutions::read(&[path.clone()], &ReadOptions::default()).unwrap();
    assert!(converted.delays.is_none());
    let expected = gains_from_delays(
        &sols.meta.freqs,
        &sols.delays.as_ref().unwrap()[&Pol::X][&1],
    );
    assert_abs_diff_eq!(
        converted.gains[&Pol::X][&1].view(),
        expected.view(),
        epsilon = 1e-12
    );

    let kept = CalSolutions::read(
        &[path],
        &ReadOptions {
            keep_delay: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(kept.gains.is_empty());
    assert_abs_diff_eq!(
        kept.delays.as_ref().unwrap()[&Pol::X][&1].view(),
        sols.delays.as_ref().unwrap()[&Pol::X][&1].view(),
        epsilon = 1e-15
    );
}

#[test]
fn concatenating_on_pol_merges_and_rejects_duplicates() {
    let tmp = TempDir::new().unwrap();
    let x = tmp.path().join("x.calfits");
    let y = tmp.path().join("y.calfits");
    gain_sols(Pol::X).write(&x).unwrap();
    gain_sols(Pol::Y).write(&y).unwrap();

    let merged = CalSolutions::concatenate_on_pol(&[x.clone(), y]).unwrap();
    assert_eq!(merged.pols(), vec![Pol::X, Pol::Y]);
    assert_eq!(merged.meta.times.len(), NT);
    assert_eq!(merged.gains[&Pol::X][&0].dim(), (NT, NF));
    assert_eq!(merged.gains[&Pol::Y][&0].dim(), (NT, NF));

    assert!(matches!(
        CalSolutions::concatenate_on_pol(&[x.clone(), x]),
        Err(SolutionsReadError::DuplicatePol { pol: Pol::X, .. })
    ));
}

#[test]
fn empty_batches_are_rejected() {
    assert!(matches!(
        CalSolutions::read(&[], &ReadOptions::default()),
        Err(SolutionsReadError::NoFiles)
    ));
}
