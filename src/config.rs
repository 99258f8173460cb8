// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::str::FromStr;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command};
use cpuid::MatchPolicy;
use smu::{SmuConfig, DEFAULT_MAX_RETRIES};
use telemetry::TelemetryConfig;
use thiserror::Error;

pub const DEFAULT_SAMPLE_MS: &str = "10";

/// Errors associated with the command line
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Unknown report format
    #[error("Unknown output format {0:?}, expected \"text\" or \"json\"")]
    InvalidFormat(String),
    /// The power sampling interval must be positive
    #[error("The sampling interval must be at least 1 ms")]
    ZeroSampleInterval,
    /// The mailbox polling cap must be positive
    #[error("The SMU retry count must be at least 1")]
    ZeroSmuRetries,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ConfigError::InvalidFormat(s.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub format: OutputFormat,
    pub topology: bool,
    pub raw: bool,
    pub telemetry: bool,
    pub msr_dump: bool,
    /// Logical CPU used for telemetry, the first sampled one when unset.
    pub cpu: Option<usize>,
    pub min_codename_score: Option<i32>,
    pub sample_interval: Duration,
    pub smu_retries: u32,
    pub verbosity: u8,
}

/// Command line arguments, sorted by id.
pub fn create_app() -> Command {
    Command::new("cpuscope")
        .version(env!("BUILD_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Identify x86 processors and read their live telemetry.")
        .arg(
            Arg::new("cpu")
                .long("cpu")
                .help("Logical CPU to read telemetry from")
                .num_args(1)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .help("Report format: text|json")
                .num_args(1)
                .default_value("text"),
        )
        .arg(
            Arg::new("min-codename-score")
                .long("min-codename-score")
                .help("Reject codename matches scoring below this value")
                .num_args(1)
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new("msr-dump")
                .long("msr-dump")
                .help("Print every documented field of the vendor's MSRs")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("raw")
                .long("raw")
                .help("Dump the raw CPUID leaves of every processor group")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("sample-ms")
                .long("sample-ms")
                .help("Busy wait between the two energy counter reads, in milliseconds")
                .num_args(1)
                .default_value(DEFAULT_SAMPLE_MS)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("smu-retries")
                .long("smu-retries")
                .help("Polls of the SMU response register before a command times out")
                .num_args(1)
                .default_value(DEFAULT_MAX_RETRIES.to_string())
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("telemetry")
                .long("telemetry")
                .help("Read MSR and SMU telemetry (needs root)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("topology")
                .long("topology")
                .help("Print one entry per processor group")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("v")
                .short('v')
                .action(ArgAction::Count)
                .help("Sets the level of debugging output"),
        )
}

impl Config {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let format = matches
            .get_one::<String>("format")
            .map(|s| s.parse::<OutputFormat>())
            .transpose()?
            .unwrap_or_default();

        let sample_ms = matches.get_one::<u64>("sample-ms").copied().unwrap_or(10);
        if sample_ms == 0 {
            return Err(ConfigError::ZeroSampleInterval);
        }
        let smu_retries = matches
            .get_one::<u32>("smu-retries")
            .copied()
            .unwrap_or(DEFAULT_MAX_RETRIES);
        if smu_retries == 0 {
            return Err(ConfigError::ZeroSmuRetries);
        }

        Ok(Config {
            format,
            topology: matches.get_flag("topology"),
            raw: matches.get_flag("raw"),
            telemetry: matches.get_flag("telemetry"),
            msr_dump: matches.get_flag("msr-dump"),
            cpu: matches.get_one::<usize>("cpu").copied(),
            min_codename_score: matches.get_one::<i32>("min-codename-score").copied(),
            sample_interval: Duration::from_millis(sample_ms),
            smu_retries,
            verbosity: matches.get_count("v"),
        })
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            min_score: self.min_codename_score,
        }
    }

    pub fn needs_hardware(&self) -> bool {
        self.telemetry || self.msr_dump
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            sample_interval: self.sample_interval,
            smu: SmuConfig {
                max_retries: self.smu_retries,
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::tests::assert_args_sorted;

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        let matches = create_app()
            .try_get_matches_from(std::iter::once("cpuscope").chain(args.iter().copied()))
            .unwrap();
        Config::from_matches(&matches)
    }

    #[test]
    fn test_args_sorted() {
        let app = create_app();
        assert_args_sorted(|| app.get_arguments());
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.format, OutputFormat::Text);
        assert!(!config.telemetry && !config.topology && !config.raw && !config.msr_dump);
        assert_eq!(config.cpu, None);
        assert_eq!(config.match_policy().min_score, None);
        assert_eq!(config.sample_interval, Duration::from_millis(10));
        assert_eq!(config.smu_retries, 8096);
        assert_eq!(config.verbosity, 0);
        assert!(!config.needs_hardware());
    }

    #[test]
    fn flags_and_values() {
        let config = parse(&[
            "--format",
            "json",
            "--telemetry",
            "--cpu",
            "3",
            "--min-codename-score",
            "2",
            "--sample-ms",
            "25",
            "--smu-retries",
            "100",
            "-vv",
        ])
        .unwrap();
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.cpu, Some(3));
        assert_eq!(config.match_policy().min_score, Some(2));
        assert_eq!(config.telemetry_config().sample_interval, Duration::from_millis(25));
        assert_eq!(config.telemetry_config().smu.max_retries, 100);
        assert_eq!(config.verbosity, 2);
        assert!(config.needs_hardware());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            parse(&["--format", "xml"]),
            Err(ConfigError::InvalidFormat(f)) if f == "xml"
        ));
        assert!(matches!(parse(&["--sample-ms", "0"]), Err(ConfigError::ZeroSampleInterval)));
        assert!(matches!(parse(&["--smu-retries", "0"]), Err(ConfigError::ZeroSmuRetries)));
    }
}
