// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with reading or writing calibration solutions.

use thiserror::Error;

use crate::pol::{Pol, PolParseError};

#[derive(Error, Debug)]
pub enum SolutionsReadError {
    #[error("No calibration solution files were supplied")]
    NoFiles,

    #[error("{file} has {key} = '{got}', but the first file of the batch has '{expected}'; refusing to concatenate")]
    Mismatch {
        file: String,
        key: &'static str,
        expected: String,
        got: String,
    },

    #[error("Polarization '{pol}' appears in more than one of the files being merged ({file})")]
    DuplicatePol { file: String, pol: Pol },

    #[error("{file} has an unrecognised gain convention '{got}'; expected 'multiply' or 'divide'")]
    BadGainConvention { file: String, got: String },

    #[error("{file} has an unrecognised calibration type '{got}'; expected 'gain' or 'delay'")]
    BadCalType { file: String, got: String },

    #[error("Based on the dimensions of the solutions, expected {thing} to have {expected} elements, but it had {actual} instead!")]
    BadShape {
        thing: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Pol(#[from] PolParseError),

    #[error(transparent)]
    Fitsio(#[from] fitsio::errors::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SolutionsWriteError {
    #[error("Cannot write calibration solutions with no polarizations")]
    NoPols,

    #[error(transparent)]
    Fitsio(#[from] fitsio::errors::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
