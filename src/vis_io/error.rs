// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with reading or writing visibility files.

use std::path::PathBuf;

use thiserror::Error;

use crate::pol::PolPair;

#[derive(Error, Debug)]
pub enum VisReadError {
    #[error("Visibility file {0} does not exist")]
    BadFile(PathBuf),

    #[error("{file} does not carry polarization '{pol}'")]
    PolNotPresent { file: String, pol: PolPair },

    #[error("Expected {file} to describe its visibilities with {expected} floats per polarization, but found {actual}")]
    UnexpectedFloatsPerPol {
        file: String,
        expected: usize,
        actual: usize,
    },

    #[error("When reading {file}, couldn't find the '{key}' group parameter")]
    MissingGroupParam { file: String, key: &'static str },

    #[error("Couldn't parse the '{key}' key of {file}")]
    Parse { file: String, key: String },

    #[error(transparent)]
    Fitsio(#[from] fitsio::errors::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum VisWriteError {
    #[error("No visibility data to write")]
    NoData,

    #[error("Expected the array for baseline ({i},{j}) [{pol}] to have shape {expected:?}, but got {actual:?}")]
    BadShape {
        i: usize,
        j: usize,
        pol: PolPair,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error(transparent)]
    UvfitsWrite(#[from] marlu::UvfitsWriteError),

    #[error(transparent)]
    MarluIO(#[from] marlu::io::error::IOError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
