//! Turns one cycle's raw plant record into the canonical sensor reading.
//!
//! Three generations of cloud payloads feed this: classic records carrying
//! direct power fields, protocol-2 records that only report per-string
//! voltage/current pairs, and flow-summary overlays. Each canonical key is
//! resolved from its direct field first; the computed fallback fires only
//! when that field is absent.

use serde_json::Value;

use crate::{api::solark::RawPlantRecord, reading::Reading, sensor};

/// Best-effort numeric coercion: anything unusable counts as `0.0`.
fn to_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Direction flags arrive as booleans, 0/1 numbers, or strings depending on
/// the firmware.
fn to_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|number| number != 0.0),
        Some(Value::String(text)) => matches!(text.trim(), "true" | "True" | "1"),
        _ => false,
    }
}

fn field(record: &RawPlantRecord, key: &str) -> f64 {
    to_f64(record.get(key))
}

fn first_present<'a>(record: &'a RawPlantRecord, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| record.get(*key))
}

/// Maps the raw record to the canonical reading. Pure and total: never
/// fails, and never leaves a guaranteed key out.
#[must_use]
pub fn normalize(record: &RawPlantRecord) -> Reading {
    let mut reading = Reading::new();

    reading.set(sensor::ENERGY_TODAY, to_f64(first_present(record, &["energyToday", "etoday"])));
    reading.set(sensor::ENERGY_TOTAL, to_f64(first_present(record, &["energyTotal", "etotal"])));

    // PV: the reported figure when given, otherwise summed MPPT string pairs.
    if record.contains_key("pvPower") {
        reading.set(sensor::PV_POWER, field(record, "pvPower"));
    } else {
        let mut total = 0.0;
        for index in 1..=12 {
            let string_power =
                field(record, &format!("volt{index}")) * field(record, &format!("current{index}"));
            if string_power != 0.0 {
                reading.set(format!("pv_string_{index}_power"), string_power);
                total += string_power;
            }
        }
        reading.set(sensor::PV_POWER, total);
    }

    // Load: the EPS/load figure, otherwise AC output voltage × current × pf.
    if record.contains_key("loadOrEpsPower") {
        reading.set(sensor::LOAD_POWER, field(record, "loadOrEpsPower"));
    } else {
        let power_factor = match field(record, "pf") {
            0.0 => 1.0,
            power_factor => power_factor,
        };
        reading.set(
            sensor::LOAD_POWER,
            field(record, "inverterOutputVoltage") * field(record, "curCurrent") * power_factor,
        );
    }

    // Battery power: the reported figure, otherwise DC voltage × charge current.
    if record.contains_key("battPower") {
        reading.set(sensor::BATTERY_POWER, field(record, "battPower"));
    } else {
        reading.set(sensor::BATTERY_POWER, field(record, "curVolt") * field(record, "chargeCurrent"));
    }

    // SOC: the reported figure, otherwise remaining over total capacity.
    if record.contains_key("soc") {
        reading.set(sensor::BATTERY_SOC, field(record, "soc"));
    } else {
        let battery_cap = field(record, "batteryCap");
        if battery_cap > 0.0 {
            reading.set(sensor::BATTERY_SOC, field(record, "curCap") / battery_cap * 100.0);
        }
    }

    let meter_a = field(record, "meterA");
    let meter_b = field(record, "meterB");
    let meter_c = field(record, "meterC");
    let grid_net = meter_a + meter_b + meter_c;

    // Net grid power: the meter-side figure, otherwise the three-phase sum.
    if record.contains_key("gridOrMeterPower") {
        reading.set(sensor::GRID_POWER, field(record, "gridOrMeterPower"));
    } else if grid_net != 0.0 {
        reading.set(sensor::GRID_POWER, grid_net);
    }

    // Import vs export, from the most to the least reliable signal: phase
    // meters, then flow direction flags, then pre-split vendor fields. At
    // most one of the pair is ever non-zero on the first two paths.
    if grid_net != 0.0 {
        if grid_net > 0.0 {
            reading.set(sensor::GRID_IMPORT_POWER, grid_net);
            reading.set(sensor::GRID_EXPORT_POWER, 0.0);
        } else {
            reading.set(sensor::GRID_IMPORT_POWER, 0.0);
            reading.set(sensor::GRID_EXPORT_POWER, grid_net.abs());
        }
    } else {
        let to_grid = to_bool(record.get("toGrid"));
        let grid_to = to_bool(record.get("gridTo"));
        if to_grid || grid_to {
            let flow_power = field(record, "gridOrMeterPower");
            if flow_power != 0.0 {
                if to_grid {
                    reading.set(sensor::GRID_EXPORT_POWER, flow_power.abs());
                } else {
                    reading.set(sensor::GRID_IMPORT_POWER, flow_power.abs());
                }
            }
        } else {
            // Face value on purpose: these vendor fields are assumed to be
            // pre-split with the right sign, unlike the meter and flag paths.
            if record.contains_key("gridImportPower") {
                reading.set(sensor::GRID_IMPORT_POWER, field(record, "gridImportPower"));
            }
            if record.contains_key("gridExportPower") {
                reading.set(sensor::GRID_EXPORT_POWER, field(record, "gridExportPower"));
            }
        }
    }

    // Ratings and battery configuration, kept only when meaningful.
    for (key, source) in [
        (sensor::BATTERY_VOLTAGE, "chargeVolt"),
        (sensor::BATTERY_FLOAT_VOLTAGE, "floatVolt"),
        (sensor::BATTERY_CAPACITY, "batteryCap"),
        (sensor::BATTERY_LOW_CAP, "batteryLowCap"),
        (sensor::BATTERY_RESTART_CAP, "batteryRestartCap"),
        (sensor::BATTERY_SHUTDOWN_CAP, "batteryShutdownCap"),
        (sensor::GRID_PEAK_POWER, "gridPeakPower"),
        (sensor::GEN_PEAK_POWER, "genPeakPower"),
        (sensor::PV_MAX_LIMIT, "pvMaxLimit"),
        (sensor::SOLAR_MAX_SELL_POWER, "solarMaxSellPower"),
    ] {
        let value = field(record, source);
        if value != 0.0 {
            reading.set(key, value);
        }
    }

    if meter_a != 0.0 || meter_b != 0.0 || meter_c != 0.0 {
        reading.set(sensor::GRID_METER_A, meter_a);
        reading.set(sensor::GRID_METER_B, meter_b);
        reading.set(sensor::GRID_METER_C, meter_c);
    }

    // Raw AC/DC measurements are always reported, zero or not.
    reading.set(sensor::INVERTER_OUTPUT_VOLTAGE, field(record, "inverterOutputVoltage"));
    reading.set(sensor::INVERTER_OUTPUT_CURRENT, field(record, "curCurrent"));
    reading.set(sensor::BATTERY_DC_VOLTAGE, field(record, "curVolt"));
    reading.set(sensor::BATTERY_CURRENT, field(record, "chargeCurrent"));

    // Downstream observers never see a missing key.
    for key in sensor::GUARANTEED {
        reading.default_to(key, 0.0);
    }

    reading
}
