//! Static sensor metadata: keys, display names, units, device classes.

use std::fmt::{Display, Formatter};

pub const PV_POWER: &str = "pv_power";
pub const LOAD_POWER: &str = "load_power";
pub const GRID_POWER: &str = "grid_power";
pub const GRID_IMPORT_POWER: &str = "grid_import_power";
pub const GRID_EXPORT_POWER: &str = "grid_export_power";
pub const BATTERY_POWER: &str = "battery_power";
pub const BATTERY_SOC: &str = "battery_soc";
pub const ENERGY_TODAY: &str = "energy_today";
pub const ENERGY_TOTAL: &str = "energy_total";

pub const BATTERY_VOLTAGE: &str = "battery_voltage";
pub const BATTERY_FLOAT_VOLTAGE: &str = "battery_float_voltage";
pub const BATTERY_CAPACITY: &str = "battery_capacity";
pub const BATTERY_LOW_CAP: &str = "battery_low_cap";
pub const BATTERY_RESTART_CAP: &str = "battery_restart_cap";
pub const BATTERY_SHUTDOWN_CAP: &str = "battery_shutdown_cap";
pub const GRID_PEAK_POWER: &str = "grid_peak_power";
pub const GEN_PEAK_POWER: &str = "gen_peak_power";
pub const PV_MAX_LIMIT: &str = "pv_max_limit";
pub const SOLAR_MAX_SELL_POWER: &str = "solar_max_sell_power";
pub const GRID_METER_A: &str = "grid_meter_a";
pub const GRID_METER_B: &str = "grid_meter_b";
pub const GRID_METER_C: &str = "grid_meter_c";
pub const INVERTER_OUTPUT_VOLTAGE: &str = "inverter_output_voltage";
pub const INVERTER_OUTPUT_CURRENT: &str = "inverter_output_current";
pub const BATTERY_DC_VOLTAGE: &str = "battery_dc_voltage";
pub const BATTERY_CURRENT: &str = "battery_current";

/// Keys that every reading carries even when the cloud sent nothing usable.
pub const GUARANTEED: [&str; 9] = [
    PV_POWER,
    BATTERY_POWER,
    GRID_POWER,
    LOAD_POWER,
    GRID_IMPORT_POWER,
    GRID_EXPORT_POWER,
    BATTERY_SOC,
    ENERGY_TODAY,
    ENERGY_TOTAL,
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Unit {
    Watts,
    KilowattHours,
    Percent,
    Volts,
    Amps,
    AmpHours,
}

impl Display for Unit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Watts => "W",
            Self::KilowattHours => "kWh",
            Self::Percent => "%",
            Self::Volts => "V",
            Self::Amps => "A",
            Self::AmpHours => "Ah",
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceClass {
    Power,
    Energy,
    Battery,
    Voltage,
    Current,
}

pub struct Descriptor {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: Unit,
    pub class: DeviceClass,
}

pub static DESCRIPTORS: &[Descriptor] = &[
    Descriptor { key: PV_POWER, name: "PV Power", unit: Unit::Watts, class: DeviceClass::Power },
    Descriptor { key: LOAD_POWER, name: "Load Power", unit: Unit::Watts, class: DeviceClass::Power },
    Descriptor {
        key: GRID_POWER,
        name: "Grid Power (net)",
        unit: Unit::Watts,
        class: DeviceClass::Power,
    },
    Descriptor {
        key: GRID_IMPORT_POWER,
        name: "Grid Import Power",
        unit: Unit::Watts,
        class: DeviceClass::Power,
    },
    Descriptor {
        key: GRID_EXPORT_POWER,
        name: "Grid Export Power",
        unit: Unit::Watts,
        class: DeviceClass::Power,
    },
    Descriptor {
        key: BATTERY_POWER,
        name: "Battery Power",
        unit: Unit::Watts,
        class: DeviceClass::Power,
    },
    Descriptor {
        key: BATTERY_SOC,
        name: "Battery SOC",
        unit: Unit::Percent,
        class: DeviceClass::Battery,
    },
    Descriptor {
        key: ENERGY_TODAY,
        name: "Energy Today",
        unit: Unit::KilowattHours,
        class: DeviceClass::Energy,
    },
    Descriptor {
        key: ENERGY_TOTAL,
        name: "Energy Total",
        unit: Unit::KilowattHours,
        class: DeviceClass::Energy,
    },
    Descriptor {
        key: BATTERY_VOLTAGE,
        name: "Battery Voltage",
        unit: Unit::Volts,
        class: DeviceClass::Voltage,
    },
    Descriptor {
        key: BATTERY_FLOAT_VOLTAGE,
        name: "Battery Float Voltage",
        unit: Unit::Volts,
        class: DeviceClass::Voltage,
    },
    Descriptor {
        key: BATTERY_CAPACITY,
        name: "Battery Capacity",
        unit: Unit::AmpHours,
        class: DeviceClass::Battery,
    },
    Descriptor {
        key: BATTERY_LOW_CAP,
        name: "Battery Low Capacity",
        unit: Unit::Percent,
        class: DeviceClass::Battery,
    },
    Descriptor {
        key: BATTERY_RESTART_CAP,
        name: "Battery Restart Capacity",
        unit: Unit::Percent,
        class: DeviceClass::Battery,
    },
    Descriptor {
        key: BATTERY_SHUTDOWN_CAP,
        name: "Battery Shutdown Capacity",
        unit: Unit::Percent,
        class: DeviceClass::Battery,
    },
    Descriptor {
        key: GRID_PEAK_POWER,
        name: "Grid Peak Power",
        unit: Unit::Watts,
        class: DeviceClass::Power,
    },
    Descriptor {
        key: GEN_PEAK_POWER,
        name: "Generator Peak Power",
        unit: Unit::Watts,
        class: DeviceClass::Power,
    },
    Descriptor {
        key: PV_MAX_LIMIT,
        name: "PV Max Limit",
        unit: Unit::Watts,
        class: DeviceClass::Power,
    },
    Descriptor {
        key: SOLAR_MAX_SELL_POWER,
        name: "Solar Max Sell Power",
        unit: Unit::Watts,
        class: DeviceClass::Power,
    },
    Descriptor {
        key: GRID_METER_A,
        name: "Grid Meter Phase A",
        unit: Unit::Watts,
        class: DeviceClass::Power,
    },
    Descriptor {
        key: GRID_METER_B,
        name: "Grid Meter Phase B",
        unit: Unit::Watts,
        class: DeviceClass::Power,
    },
    Descriptor {
        key: GRID_METER_C,
        name: "Grid Meter Phase C",
        unit: Unit::Watts,
        class: DeviceClass::Power,
    },
    Descriptor {
        key: INVERTER_OUTPUT_VOLTAGE,
        name: "Inverter Output Voltage",
        unit: Unit::Volts,
        class: DeviceClass::Voltage,
    },
    Descriptor {
        key: INVERTER_OUTPUT_CURRENT,
        name: "Inverter Output Current",
        unit: Unit::Amps,
        class: DeviceClass::Current,
    },
    Descriptor {
        key: BATTERY_DC_VOLTAGE,
        name: "Battery DC Voltage",
        unit: Unit::Volts,
        class: DeviceClass::Voltage,
    },
    Descriptor {
        key: BATTERY_CURRENT,
        name: "Battery Charge Current",
        unit: Unit::Amps,
        class: DeviceClass::Current,
    },
];

#[must_use]
pub fn describe(key: &str) -> Option<&'static Descriptor> {
    DESCRIPTORS.iter().find(|descriptor| descriptor.key == key)
}

/// Unit lookup covering the dynamic per-string PV keys as well.
#[must_use]
pub fn unit_of(key: &str) -> Option<Unit> {
    if let Some(index) = key.strip_prefix("pv_string_").and_then(|rest| rest.strip_suffix("_power"))
        && index.parse::<u8>().is_ok()
    {
        return Some(Unit::Watts);
    }
    describe(key).map(|descriptor| descriptor.unit)
}
