use comfy_table::{Cell, CellAlignment, Table, modifiers, presets};

use crate::{reading::Reading, sensor};

#[must_use]
pub fn build_reading_table(reading: &Reading) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.set_header(vec!["Sensor", "Value", "Unit"]);
    for (key, value) in reading.iter() {
        let name = sensor::describe(key).map_or(key, |descriptor| descriptor.name);
        let unit = sensor::unit_of(key).map_or_else(String::new, |unit| unit.to_string());
        table.add_row(vec![
            Cell::new(name),
            Cell::new(format!("{value:.1}")).set_alignment(CellAlignment::Right),
            Cell::new(unit),
        ]);
    }
    table
}
