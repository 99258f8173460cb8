// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use serde::Serialize;

use crate::reader::TelemetryReader;
use crate::Reading;

/// Every metric of one reader, unavailable ones included.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub label: String,
    pub cpu: u32,
    pub temperature: Reading,
    pub package_temperature: Reading,
    pub package_power: Reading,
    pub power_limit_1: Reading,
    pub power_limit_2: Reading,
    pub core_voltage: Reading,
    pub bus_clock: Reading,
    pub current_multiplier: Reading,
    pub min_multiplier: Reading,
    pub max_multiplier: Reading,
    pub igpu_energy: Reading,
    pub igpu_temperature: Reading,
    pub stapm_limit: Reading,
    pub stapm_value: Reading,
    pub fast_value: Reading,
    pub slow_value: Reading,
    /// Per-core temperatures from the SMU table, empty when there are none.
    pub core_temperatures: Vec<Reading>,
    #[serde(serialize_with = "serialize_hex")]
    pub microcode: Option<u32>,
    pub smu_version: Option<String>,
}

fn serialize_hex<S: serde::Serializer>(
    value: &Option<u32>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_str(&format!("{v:#x}")),
        None => serializer.serialize_none(),
    }
}

impl TelemetrySnapshot {
    pub(crate) fn collect(reader: &TelemetryReader) -> Self {
        let cores = reader.identity().num_cores.max(0) as u32;
        let core_temperatures: Vec<Reading> = (0..cores)
            .map(|core| Reading::from(reader.core_temperature(core)))
            .collect();
        let core_temperatures = if core_temperatures.iter().any(Reading::is_available) {
            core_temperatures
        } else {
            Vec::new()
        };

        TelemetrySnapshot {
            label: reader.label(),
            cpu: reader.cpu(),
            temperature: reader.temperature().into(),
            package_temperature: reader.package_temperature().into(),
            package_power: reader.package_power_draw().into(),
            power_limit_1: reader.power_limit_1().into(),
            power_limit_2: reader.power_limit_2().into(),
            core_voltage: reader.core_voltage().into(),
            bus_clock: reader.bus_clock().into(),
            current_multiplier: reader.current_multiplier().into(),
            min_multiplier: reader.min_multiplier().into(),
            max_multiplier: reader.max_multiplier().into(),
            igpu_energy: reader.igpu_energy().into(),
            igpu_temperature: reader.igpu_temperature().into(),
            stapm_limit: reader.stapm_limit().into(),
            stapm_value: reader.stapm_value().into(),
            fast_value: reader.fast_value().into(),
            slow_value: reader.slow_value().into(),
            core_temperatures,
            microcode: reader.microcode_version(),
            smu_version: reader.smu_version().map(smu::format_version),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cpuid::{decode, MatchPolicy, SampleBuilder};
    use hwaccess::mock::MockAccess;

    use crate::clock::Rdtsc;
    use crate::reader::{TelemetryConfig, TelemetryReader};
    use crate::sampling::tests::SteppingClock;

    #[test]
    fn unsupported_metrics_serialize_as_null() {
        let raw = SampleBuilder::new()
            .vendor(b"CentaurHauls")
            .max_basic(1)
            .signature(6, 0x0f, 2)
            .build();
        let id = decode(&raw, MatchPolicy::default()).unwrap();
        let hw = Arc::new(MockAccess::new().with_msr(0xcd, 2).with_msr(0x8b, 0x0c << 32));
        let reader = TelemetryReader::with_time_sources(
            hw,
            &id,
            TelemetryConfig::default(),
            Arc::new(SteppingClock::new(1000)),
            Arc::new(Rdtsc),
        )
        .unwrap();

        let snapshot = reader.snapshot();
        assert_eq!(snapshot.label, "CPU0-G");
        assert_eq!(snapshot.bus_clock.get(), Some(200.0));
        assert!(!snapshot.package_power.is_available());
        assert!(snapshot.core_temperatures.is_empty());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["bus_clock"], 200.0);
        assert!(json["temperature"].is_null());
        assert_eq!(json["microcode"], "0xc");
        assert!(json["smu_version"].is_null());
    }
}
