// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

#[macro_use]
extern crate log;

use std::io;
use std::process;

use anyhow::Context;
use cpuid::{acquire_sample, build_topology};
use cpuscope::cli_print_error_chain;
use cpuscope::config::{create_app, Config, OutputFormat};
use cpuscope::report::{render_json, render_text, RawDump, Report};
use log::LevelFilter;
use telemetry::TelemetryReader;

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG is parsed last so it wins over -v.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(config: &Config) -> anyhow::Result<()> {
    let topology =
        build_topology(config.match_policy()).context("Failed to identify the processors")?;

    let cpu = match config.cpu {
        Some(cpu) => cpu,
        None => topology
            .entries
            .first()
            .map(|e| e.index)
            .context("No processor group was sampled")?,
    };
    let processor = topology
        .entry_for(cpu)
        .with_context(|| format!("Logical CPU {cpu} is not part of any sampled processor group"))?;

    let mut report = Report::new(processor);
    if config.topology {
        report.topology = Some(&topology);
    }

    if config.raw {
        for entry in &topology.entries {
            match acquire_sample(entry.index) {
                Ok(sample) => report.raw.push(RawDump {
                    label: entry.label(),
                    sample,
                }),
                Err(e) => warn!("No raw dump for {}: {e}", entry.label()),
            }
        }
    }

    if config.needs_hardware() {
        match hwaccess::new() {
            Ok(hw) => match TelemetryReader::new(hw, processor, config.telemetry_config()) {
                Some(reader) => {
                    let reader = reader.on_cpu(cpu as u32);
                    if config.telemetry {
                        report.telemetry = Some(reader.snapshot());
                    }
                    if config.msr_dump {
                        report.msr_dump = reader.msr_dump();
                    }
                }
                None => warn!("No telemetry support for {} processors", processor.vendor),
            },
            Err(e) => warn!("Telemetry unavailable: {e}"),
        }
    }

    let out = io::stdout().lock();
    match config.format {
        OutputFormat::Text => render_text(&report, out).context("Failed to write the report")?,
        OutputFormat::Json => render_json(&report, out).context("Failed to write the report")?,
    }
    Ok(())
}

fn main() {
    let matches = create_app().get_matches();

    let config = match Config::from_matches(&matches) {
        Ok(config) => config,
        Err(e) => {
            cli_print_error_chain(&e, "cpuscope");
            process::exit(1);
        }
    };

    init_logger(config.verbosity);

    if let Err(e) = run(&config) {
        cli_print_error_chain(&*e, "cpuscope");
        process::exit(1);
    }
}
