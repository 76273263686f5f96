// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Redundant-baseline calibration software for the HERA radio telescope.
 */

pub mod antpol;
pub mod cli;
pub mod constants;
pub mod container;
mod error;
pub mod filenames;
pub mod layout;
pub mod omni;
pub mod pol;
pub mod redinfo;
pub mod reds;
pub mod solutions;
pub mod vis_io;

// Re-exports.
pub use antpol::AntPol;
pub use container::DataContainer;
pub use error::RedcalError;
pub use layout::ArrayLayout;
pub use omni::{compute_xtalk, run_omnical, CalSolver, PassthroughSolver, XtalkCombine};
pub use pol::{Pol, PolPair};
pub use redinfo::{GainMap, InfoOptions, OmniMeta, RedundantInfo, VisMap};
pub use reds::{compute_reds, filter_reds, reds_for_minimal_v, Red, RedFilter};
pub use solutions::CalSolutions;

// External re-exports.
pub use marlu::c64;
