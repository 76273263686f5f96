// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Visibility file format adapters.
//!
//! Internal baseline/polarization-keyed mappings go to and from uvfits
//! files: writing via marlu's [`UvfitsWriter`](marlu::UvfitsWriter), and
//! reading via a compact random-groups reader. A boolean mode switch
//! selects the "crosstalk" variant on write, where time-static estimates
//! are broadcast across every integration.

mod error;
mod read;
#[cfg(test)]
mod tests;
mod write;

pub use error::{VisReadError, VisWriteError};
pub use read::{read_vis, VisMeta};
pub use write::write_vis;
