// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Useful constants.

/// Default tolerance when clustering baseline separation vectors \[metres\].
/// Must exceed antenna-position measurement noise while staying below the
/// smallest true baseline separation in the array.
pub const DEFAULT_REDUNDANCY_TOL: f64 = 0.1;

/// The number of diagnostic scalars appended to each (time, freq) cell of a
/// calibration parameter vector: iteration count, convergence measure and
/// chi-square.
pub const NUM_CALPAR_DIAGNOSTICS: usize = 3;

/// Seconds in a solar day; HERA file times are Julian dates.
pub const SECONDS_PER_DAY: f64 = 86400.0;
