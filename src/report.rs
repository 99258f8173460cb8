// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::io::{self, Write};

use cpuid::{CacheLevel, ProcessorIdentity, RawProcessorSample, SystemTopology};
use serde::Serialize;
use telemetry::{Reading, RegisterDump, TelemetrySnapshot};

const UNAVAILABLE: &str = "unavailable";

/// Raw CPUID leaves of one processor group.
#[derive(Serialize)]
pub struct RawDump {
    pub label: String,
    pub sample: RawProcessorSample,
}

/// Everything one invocation prints.
#[derive(Serialize)]
pub struct Report<'a> {
    pub processor: &'a ProcessorIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<&'a SystemTopology>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub raw: Vec<RawDump>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetrySnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub msr_dump: Vec<RegisterDump>,
}

impl<'a> Report<'a> {
    pub fn new(processor: &'a ProcessorIdentity) -> Self {
        Report {
            processor,
            topology: None,
            raw: Vec::new(),
            telemetry: None,
            msr_dump: Vec::new(),
        }
    }
}

pub fn render_json<W: Write>(report: &Report, out: W) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(out, report)
}

fn count(value: i32) -> String {
    if value < 0 {
        UNAVAILABLE.to_owned()
    } else {
        value.to_string()
    }
}

fn write_identity<W: Write>(out: &mut W, id: &ProcessorIdentity) -> io::Result<()> {
    writeln!(out, "Vendor:            {} ({})", id.vendor, id.vendor_str)?;
    let brand = if id.brand.is_empty() {
        UNAVAILABLE
    } else {
        id.brand.as_str()
    };
    writeln!(out, "Brand:             {brand}")?;
    match &id.codename {
        Some(name) => writeln!(out, "Codename:          {name} (score {})", id.codename_score)?,
        None => writeln!(out, "Codename:          {UNAVAILABLE}")?,
    }
    writeln!(
        out,
        "Family/Model:      {:#x}/{:#x} stepping {} (extended {:#x}/{:#x})",
        id.family, id.model, id.stepping, id.ext_family, id.ext_model
    )?;
    writeln!(
        out,
        "Cores/Threads:     {}/{} of {} logical",
        count(id.num_cores),
        count(id.num_logical_cpus),
        id.total_logical_cpus
    )?;
    writeln!(out, "Purpose:           {}", id.purpose)?;
    writeln!(out, "Hypervisor:        {:?}", id.hypervisor)?;
    for level in CacheLevel::ALL {
        let cache = id.caches.get(level);
        if cache.size_kb <= 0 {
            continue;
        }
        write!(out, "{:<19}{} KB", format!("{} cache:", level.name()), cache.size_kb)?;
        if cache.assoc > 0 {
            write!(out, ", {}-way", cache.assoc)?;
        }
        if cache.line_size > 0 {
            write!(out, ", {} byte lines", cache.line_size)?;
        }
        if cache.instances > 0 {
            write!(out, ", {} instances", cache.instances)?;
        }
        writeln!(out)?;
    }
    let features: Vec<String> = id.features.names().collect();
    writeln!(out, "Features:          {}", features.join(" "))
}

fn write_topology<W: Write>(out: &mut W, topology: &SystemTopology) -> io::Result<()> {
    writeln!(out, "\nTopology ({} logical processors)", topology.total_logical_cpus)?;
    for entry in &topology.entries {
        writeln!(
            out,
            "  {:<8} {:<22} cores {:<4} logical {:<4} mask {}",
            entry.label(),
            entry.purpose.to_string(),
            count(entry.num_cores),
            count(entry.num_logical_cpus),
            entry.affinity_mask
        )?;
    }
    if let Some(e) = &topology.last_error {
        writeln!(out, "  incomplete: {e}")?;
    }
    Ok(())
}

fn write_raw<W: Write>(out: &mut W, dump: &RawDump) -> io::Result<()> {
    writeln!(out, "\nRaw CPUID ({})", dump.label)?;
    let rows = serde_json::to_value(&dump.sample).map_err(io::Error::other)?;
    for row in rows.as_array().into_iter().flatten() {
        let reg = |name: &str| row[name].as_u64().unwrap_or_default();
        writeln!(
            out,
            "  {} {:>2}: {:08x} {:08x} {:08x} {:08x}",
            row["leaf"].as_str().unwrap_or_default(),
            row["sub_leaf"].as_u64().unwrap_or_default(),
            reg("eax"),
            reg("ebx"),
            reg("ecx"),
            reg("edx")
        )?;
    }
    Ok(())
}

fn write_telemetry<W: Write>(out: &mut W, t: &TelemetrySnapshot) -> io::Result<()> {
    writeln!(out, "\nTelemetry ({}, logical CPU {})", t.label, t.cpu)?;
    let rows: [(&str, Reading, &str); 16] = [
        ("Temperature", t.temperature, "°C"),
        ("Package temperature", t.package_temperature, "°C"),
        ("Package power", t.package_power, "W"),
        ("Power limit 1", t.power_limit_1, "W"),
        ("Power limit 2", t.power_limit_2, "W"),
        ("Core voltage", t.core_voltage, "V"),
        ("Bus clock", t.bus_clock, "MHz"),
        ("Multiplier", t.current_multiplier, "x"),
        ("Min multiplier", t.min_multiplier, "x"),
        ("Max multiplier", t.max_multiplier, "x"),
        ("iGPU energy", t.igpu_energy, "J"),
        ("iGPU temperature", t.igpu_temperature, "°C"),
        ("STAPM limit", t.stapm_limit, "W"),
        ("STAPM value", t.stapm_value, "W"),
        ("Fast PPT value", t.fast_value, "W"),
        ("Slow PPT value", t.slow_value, "W"),
    ];
    for (name, reading, unit) in rows {
        if reading.is_available() {
            writeln!(out, "  {name:<21}{reading} {unit}")?;
        } else {
            writeln!(out, "  {name:<21}{reading}")?;
        }
    }
    for (core, reading) in t.core_temperatures.iter().enumerate() {
        writeln!(out, "  {:<21}{reading}", format!("Core {core} temperature"))?;
    }
    match t.microcode {
        Some(v) => writeln!(out, "  {:<21}{v:#x}", "Microcode")?,
        None => writeln!(out, "  {:<21}{UNAVAILABLE}", "Microcode")?,
    }
    writeln!(
        out,
        "  {:<21}{}",
        "SMU version",
        t.smu_version.as_deref().unwrap_or(UNAVAILABLE)
    )
}

fn write_msr_dump<W: Write>(out: &mut W, dump: &[RegisterDump]) -> io::Result<()> {
    writeln!(out, "\nMSR dump")?;
    for register in dump {
        match &register.raw {
            Some(raw) => writeln!(out, "  {} {} = {raw}", register.address, register.name)?,
            None => writeln!(out, "  {} {} = {UNAVAILABLE}", register.address, register.name)?,
        }
        for field in &register.fields {
            writeln!(
                out,
                "      [{:>5}] {:<16} {:<12} {}",
                field.bits, field.name, field.value, field.description
            )?;
        }
    }
    Ok(())
}

pub fn render_text<W: Write>(report: &Report, mut out: W) -> io::Result<()> {
    write_identity(&mut out, report.processor)?;
    if let Some(topology) = report.topology {
        write_topology(&mut out, topology)?;
    }
    for dump in &report.raw {
        write_raw(&mut out, dump)?;
    }
    if let Some(t) = &report.telemetry {
        write_telemetry(&mut out, t)?;
    }
    if !report.msr_dump.is_empty() {
        write_msr_dump(&mut out, &report.msr_dump)?;
    }
    Ok(())
}
