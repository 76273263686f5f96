// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Calibration driver tests.

use approx::assert_abs_diff_eq;
use marlu::c64;
use ndarray::prelude::*;

use super::*;
use crate::constants::DEFAULT_REDUNDANCY_TOL;
use crate::reds::compute_reds;

const NANT: usize = 4;
const NTIMES: usize = 3;
const NFREQS: usize = 5;

fn xx() -> PolPair {
    "xx".parse().unwrap()
}

fn single_pol_info() -> RedundantInfo {
    let antpos: Vec<Option<[f64; 3]>> =
        (0..NANT).map(|i| Some([50.0 * i as f64, 0.0, 0.0])).collect();
    let reds = compute_reds(NANT, &[Pol::X], &antpos, DEFAULT_REDUNDANCY_TOL).unwrap();
    RedundantInfo::from_reds(NANT, &[Pol::X], reds).unwrap()
}

fn ones_data(info: &RedundantInfo) -> DataContainer<Array2<c64>> {
    DataContainer::from_flat(info.bl_order().iter().map(|&(a, b)| {
        (
            (a.ant(), b.ant(), xx()),
            Array2::from_elem((NTIMES, NFREQS), c64::new(1.0, 0.0)),
        )
    }))
}

fn unit_gain_map(info: &RedundantInfo) -> GainMap {
    let mut gains = GainMap::default();
    let pol_gains = gains.entry(Pol::X).or_default();
    for &ant in info.subsetant() {
        pol_gains.insert(ant, Array2::from_elem((NTIMES, NFREQS), c64::new(1.0, 0.0)));
    }
    gains
}

#[test]
fn unit_data_returns_unit_gains_and_unit_vis() {
    let info = single_pol_info();
    let data = ones_data(&info);
    let gains0 = unit_gain_map(&info);

    let (meta, g, v) = run_omnical(&data, &info, Some(&gains0), &PassthroughSolver).unwrap();

    for &ant in info.subsetant() {
        assert_abs_diff_eq!(
            g[&Pol::X][&ant].view(),
            Array2::from_elem((NTIMES, NFREQS), c64::new(1.0, 0.0)).view(),
            epsilon = 1e-10
        );
    }
    for arr in v[&xx()].values() {
        assert_abs_diff_eq!(
            arr.view(),
            Array2::from_elem((NTIMES, NFREQS), c64::new(1.0, 0.0)).view(),
            epsilon = 1e-10
        );
    }
    // Unit gains and unit visibilities model unit data exactly.
    for arr in meta.res[&xx()].values() {
        assert_abs_diff_eq!(
            arr.view(),
            Array2::zeros((NTIMES, NFREQS)).view(),
            epsilon = 1e-10
        );
    }
    assert_abs_diff_eq!(
        meta.chisq.view(),
        Array2::zeros((NTIMES, NFREQS)).view(),
        epsilon = 1e-10
    );
}

/// Data built as g_i conj(g_j) V from known gains and per-group
/// visibilities, with some baselines stored reversed, must come back out
/// of the driver unchanged.
#[test]
fn consistent_data_round_trips_through_the_driver() {
    let info = single_pol_info();

    let mut gains0 = GainMap::default();
    let pol_gains = gains0.entry(Pol::X).or_default();
    for &ant in info.subsetant() {
        let arr = Array2::from_shape_fn((NTIMES, NFREQS), |(t, f)| {
            let phase = 0.2 * (ant + 1) as f64 + 0.05 * t as f64 - 0.03 * f as f64;
            c64::new(phase.cos(), phase.sin()) * (1.0 + 0.1 * ant as f64)
        });
        pol_gains.insert(ant, arr);
    }

    let mut true_vis = VisMap::default();
    let vis_pol = true_vis.entry(xx()).or_default();
    for (u, (a, b)) in info.ubls().into_iter().enumerate() {
        let arr = Array2::from_shape_fn((NTIMES, NFREQS), |(t, f)| {
            c64::new(1.0 + u as f64, 0.5 * (t + f) as f64)
        });
        vis_pol.insert((a.ant(), b.ant()), arr);
    }

    let mut entries = vec![];
    for (k, group) in info.get_reds().iter().enumerate() {
        let (ra, rb) = group[0];
        let v = &true_vis[&xx()][&(ra.ant(), rb.ant())];
        for (m, &(a, b)) in group.iter().enumerate() {
            let gi = &gains0[&Pol::X][&a.ant()];
            let gj = &gains0[&Pol::X][&b.ant()];
            let data = Array2::from_shape_fn((NTIMES, NFREQS), |(t, f)| {
                gi[(t, f)] * gj[(t, f)].conj() * v[(t, f)]
            });
            // Store every other baseline reversed to exercise conjugation.
            if (k + m) % 2 == 0 {
                entries.push(((a.ant(), b.ant(), xx()), data));
            } else {
                entries.push(((b.ant(), a.ant(), xx()), data.mapv(|x| x.conj())));
            }
        }
    }
    let data = DataContainer::from_flat(entries);

    let (meta, g, v) = run_omnical(&data, &info, Some(&gains0), &PassthroughSolver).unwrap();

    for &ant in info.subsetant() {
        assert_abs_diff_eq!(
            g[&Pol::X][&ant].view(),
            gains0[&Pol::X][&ant].view(),
            epsilon = 1e-8
        );
    }
    for (bl, expected) in &true_vis[&xx()] {
        assert_abs_diff_eq!(v[&xx()][bl].view(), expected.view(), epsilon = 1e-8);
    }
    for arr in meta.res[&xx()].values() {
        assert_abs_diff_eq!(
            arr.view(),
            Array2::zeros((NTIMES, NFREQS)).view(),
            epsilon = 1e-8
        );
    }
}

#[test]
fn xtalk_of_zero_residuals_is_zero_everywhere() {
    let info = single_pol_info();
    let data = ones_data(&info);
    let gains0 = unit_gain_map(&info);
    let (meta, _, _) = run_omnical(&data, &info, Some(&gains0), &PassthroughSolver).unwrap();

    let mut wgts = WeightMap::default();
    let w = wgts.entry(xx()).or_default();
    for &(a, b) in info.bl_order() {
        w.insert((a.ant(), b.ant()), Array2::ones((NTIMES, NFREQS)));
    }

    let xtalk = compute_xtalk(&meta.res, &wgts, XtalkCombine::Mean);
    for arr in xtalk[&xx()].values() {
        assert_eq!(arr.dim(), (NTIMES, NFREQS));
        assert_abs_diff_eq!(
            arr.view(),
            Array2::zeros((NTIMES, NFREQS)).view(),
            epsilon = 1e-12
        );
    }
}

#[test]
fn xtalk_broadcasts_the_time_average() {
    let mut res = VisMap::default();
    let r = Array2::from_shape_fn((4, 2), |(t, f)| c64::new(t as f64, f as f64));
    res.entry(xx()).or_default().insert((0, 1), r);

    let xtalk = compute_xtalk(&res, &WeightMap::default(), XtalkCombine::Mean);
    let out = &xtalk[&xx()][&(0, 1)];
    // Time-mean of 0,1,2,3 is 1.5; every time row carries it.
    for t in 0..4 {
        assert_abs_diff_eq!(out[(t, 0)], c64::new(1.5, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(out[(t, 1)], c64::new(1.5, 1.0), epsilon = 1e-12);
    }
}

#[test]
fn xtalk_zero_weights_do_not_fault() {
    let mut res = VisMap::default();
    res.entry(xx())
        .or_default()
        .insert((0, 1), Array2::from_elem((3, 2), c64::new(5.0, -5.0)));
    let mut wgts = WeightMap::default();
    wgts.entry(xx())
        .or_default()
        .insert((0, 1), Array2::zeros((3, 2)));

    for combine in [XtalkCombine::Mean, XtalkCombine::Median] {
        let xtalk = compute_xtalk(&res, &wgts, combine);
        assert_abs_diff_eq!(
            xtalk[&xx()][&(0, 1)].view(),
            Array2::zeros((3, 2)).view(),
            epsilon = 1e-12
        );
    }
}

#[test]
fn median_combination_resists_outliers() {
    let mut res = VisMap::default();
    let r = Array2::from_shape_fn((3, 1), |(t, _)| match t {
        0 => c64::new(1.0, 0.0),
        1 => c64::new(2.0, 0.0),
        _ => c64::new(100.0, 0.0),
    });
    res.entry(xx()).or_default().insert((0, 1), r);

    let med = compute_xtalk(&res, &WeightMap::default(), XtalkCombine::Median);
    assert_abs_diff_eq!(med[&xx()][&(0, 1)][(0, 0)], c64::new(2.0, 0.0), epsilon = 1e-12);

    let mean = compute_xtalk(&res, &WeightMap::default(), XtalkCombine::Mean);
    assert_abs_diff_eq!(
        mean[&xx()][&(0, 1)][(0, 0)],
        c64::new(103.0 / 3.0, 0.0),
        epsilon = 1e-12
    );
}

#[test]
fn xtalk_combine_parses_from_strings() {
    assert_eq!("mean".parse::<XtalkCombine>().unwrap(), XtalkCombine::Mean);
    assert_eq!(
        "median".parse::<XtalkCombine>().unwrap(),
        XtalkCombine::Median
    );
    assert!("mode".parse::<XtalkCombine>().is_err());
}
