// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all hera_redcal-related errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedcalError {
    #[error("No input visibility files were supplied")]
    NoVisFiles,

    #[error("The minimal-V reduction requires cross-polarizations (e.g. -p xx,xy,yx,yy)")]
    MinimalVNeedsCrossPols,

    #[error("A first-pass calibration file (--firstcal) is required")]
    MissingFirstcal,

    #[error("Couldn't parse '{0}' as an antenna list (e.g. '81' or '81,72')")]
    BadAntList(String),

    #[error("Calibration solutions ({sol_t} times, {sol_f} channels) don't match the visibility data ({vis_t} times, {vis_f} channels)")]
    ApplyShapeMismatch {
        sol_t: usize,
        sol_f: usize,
        vis_t: usize,
        vis_f: usize,
    },

    #[error(transparent)]
    Pol(#[from] crate::pol::PolParseError),

    #[error(transparent)]
    Layout(#[from] crate::layout::LayoutError),

    #[error(transparent)]
    Filename(#[from] crate::filenames::FilenameError),

    #[error(transparent)]
    Reds(#[from] crate::reds::RedsError),

    #[error(transparent)]
    Info(#[from] crate::redinfo::InfoError),

    #[error(transparent)]
    Omni(#[from] crate::omni::OmniError),

    #[error(transparent)]
    SolutionsRead(#[from] crate::solutions::SolutionsReadError),

    #[error(transparent)]
    SolutionsWrite(#[from] crate::solutions::SolutionsWriteError),

    #[error(transparent)]
    VisRead(#[from] crate::vis_io::VisReadError),

    #[error(transparent)]
    VisWrite(#[from] crate::vis_io::VisWriteError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
