use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use photolog_core::domain::Observation;
use photolog_core::PhotoLog;

use super::short_id;

pub fn run(log: &PhotoLog, path: Option<&str>) -> Result<()> {
    let observations = match path {
        Some(path) => log.observations_of(path)?,
        None => log.observations()?,
    };
    if observations.is_empty() {
        println!("No observations. Run `photolog load` to catalog the image folder.");
        return Ok(());
    }

    let shown: Vec<&str> = log
        .schema()
        .annotation_fields()
        .filter(|f| f.show)
        .map(|f| f.name.as_str())
        .collect();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    let mut header = vec![
        Cell::new("Id"),
        Cell::new("Path"),
        Cell::new("#"),
        Cell::new("Time"),
        Cell::new("Related"),
    ];
    header.extend(shown.iter().map(|name| Cell::new(name)));
    table.set_header(header);

    for obs in &observations {
        table.add_row(observation_row(obs, &shown));
    }

    println!("{table}");
    println!("  {} observations", observations.len());
    Ok(())
}

fn observation_row(obs: &Observation, shown: &[&str]) -> Vec<Cell> {
    let time = match obs.image_time {
        Some(ref time) => Cell::new(time),
        None => Cell::new("undated").fg(Color::DarkGrey),
    };
    let related = match (&obs.related, obs.related_seconds) {
        (Some(id), Some(seconds)) => Cell::new(format!("{} ({seconds}s)", short_id(id))),
        (Some(id), None) => Cell::new(short_id(id)),
        (None, _) => Cell::new(""),
    };
    let mut row = vec![
        Cell::new(short_id(&obs.observation_id)),
        Cell::new(&obs.image_path),
        Cell::new(obs.group_number),
        time,
        related,
    ];
    row.extend(shown.iter().map(|name| Cell::new(obs.get(name).to_string())));
    row
}

pub fn show(log: &PhotoLog, reference: &str) -> Result<()> {
    let obs = log.resolve(reference)?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Field"), Cell::new("Value")]);
    for field in &log.schema().fields {
        let value = obs.get(&field.name);
        let cell = if value.is_null() {
            Cell::new("-").fg(Color::DarkGrey)
        } else if field.allows(&value) {
            Cell::new(value.to_string())
        } else {
            Cell::new(value.to_string()).fg(Color::Yellow)
        };
        table.add_row(vec![Cell::new(&field.name), cell]);
    }
    println!("{table}");

    let partners = log.related_records(&obs.observation_id)?;
    for partner in partners {
        println!(
            "  related to {}#{} ({})",
            partner.image_path,
            partner.group_number,
            short_id(&partner.observation_id)
        );
    }
    Ok(())
}
