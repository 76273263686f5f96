// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command-line interface code. More specific options for `redcal`
//! subcommands are contained in modules.

mod apply;
mod run;

use clap::{AppSettings, Parser, Subcommand};
use log::info;

use crate::error::RedcalError;
use crate::pol::PolPair;

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

#[derive(Debug, Parser)]
#[clap(
    version,
    about = "Redundant-baseline calibration software for the HERA radio telescope"
)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_subcommands = true)]
#[clap(propagate_version = true)]
#[clap(infer_long_args = true)]
pub struct Redcal {
    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, global = true, parse(from_occurrences))]
    verbosity: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
#[clap(arg_required_else_help = true)]
enum Command {
    #[clap(about = "Redundantly calibrate visibility files and write omnical solutions.")]
    Run(run::RunArgs),

    #[clap(about = "Apply solved calibration to visibility files.")]
    Apply(apply::ApplyArgs),
}

impl Redcal {
    pub fn run(self) -> Result<(), RedcalError> {
        setup_logging(self.verbosity).expect("Failed to initialise logging.");

        let sub_command = match &self.command {
            Command::Run(_) => "run",
            Command::Apply(_) => "apply",
        };
        info!("redcal {} {}", sub_command, env!("CARGO_PKG_VERSION"));
        display_build_info();

        match self.command {
            Command::Run(args) => args.run()?,
            Command::Apply(args) => args.run()?,
        }

        info!("redcal {} complete.", sub_command);
        Ok(())
    }
}

/// A comma-separated polarization-pair list (e.g. "xx" or "xx,xy,yx,yy").
pub(crate) fn parse_pol_pairs(s: &str) -> Result<Vec<PolPair>, RedcalError> {
    s.split(',')
        .map(|p| p.trim().parse::<PolPair>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(RedcalError::from)
}

/// A comma-separated antenna list (e.g. "81" or "81,72").
pub(crate) fn parse_ants(s: &str) -> Result<Vec<usize>, RedcalError> {
    s.split(',')
        .map(|a| a.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| RedcalError::BadAntList(s.to_string()))
}

/// Activate a logger. All log messages are put onto `stdout`. `env_logger`
/// automatically only uses colours and fancy symbols if we're on a tty
/// (e.g. a terminal); piped output will be formatted sensibly.
fn setup_logging(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        _ => builder.filter_level(log::LevelFilter::Trace),
    };
    builder.init();
    Ok(())
}

/// Write many info-level log lines of how this executable was compiled.
fn display_build_info() {
    let dirty = match GIT_DIRTY {
        Some(true) => " (dirty)",
        _ => "",
    };
    match GIT_COMMIT_HASH_SHORT {
        Some(hash) => {
            info!("Compiled on git commit hash: {hash}{dirty}");
        }
        None => info!("Compiled on git commit hash: <no git info>"),
    }
    if let Some(hr) = GIT_HEAD_REF {
        info!("            git head ref: {}", hr);
    }
    info!("            {}", BUILT_TIME_UTC);
    info!("         with compiler {}", RUSTC_VERSION);
    info!("");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pol_pair_lists_parse() {
        let pairs = parse_pol_pairs("xx,xy, yx,yy").unwrap();
        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[1].to_string(), "xy");
        assert!(parse_pol_pairs("xx,zz").is_err());
    }

    #[test]
    fn ant_lists_parse() {
        assert_eq!(parse_ants("81").unwrap(), vec![81]);
        assert_eq!(parse_ants("81, 72").unwrap(), vec![81, 72]);
        assert!(matches!(
            parse_ants("81,ant"),
            Err(RedcalError::BadAntList(_))
        ));
    }
}
