use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use photolog_core::domain::CatalogStats;
use photolog_core::fields::FieldDef;
use photolog_core::PhotoLog;

pub fn run(log: &PhotoLog) -> Result<()> {
    let stats = log.status()?;
    let root = log.get_image_root()?;

    println!();
    match root {
        Some(root) => println!("  Image root: {}", root.display()),
        None => println!("  Image root: not set"),
    }
    println!("{}", stats_table(&stats));
    println!();
    Ok(())
}

pub(crate) fn stats_table(stats: &CatalogStats) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Catalog"), Cell::new("Count")]);
    table.add_row(vec![Cell::new("Files"), Cell::new(stats.total_files)]);
    table.add_row(vec![
        Cell::new("Observations"),
        Cell::new(stats.total_observations),
    ]);
    table.add_row(vec![
        Cell::new("Extra group observations"),
        Cell::new(stats.total_observations.saturating_sub(stats.total_files)),
    ]);
    table.add_row(vec![
        Cell::new("Related observations"),
        Cell::new(stats.related_observations),
    ]);
    let undated = Cell::new(stats.undated_files);
    table.add_row(vec![
        Cell::new("Files without capture time"),
        if stats.undated_files > 0 {
            undated.fg(Color::Yellow)
        } else {
            undated
        },
    ]);
    table
}

pub fn fields(log: &PhotoLog, json: bool) -> Result<()> {
    let schema = log.schema();
    if json {
        println!("{}", schema.to_json()?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Field"),
        Cell::new("Type"),
        Cell::new("Show"),
        Cell::new("Input"),
        Cell::new("Values"),
        Cell::new("New group"),
    ]);
    for field in &schema.fields {
        table.add_row(field_row(field));
    }
    println!("  Field schema v{}", schema.version);
    println!("{table}");
    Ok(())
}

fn flag(on: bool) -> &'static str {
    if on {
        "yes"
    } else {
        ""
    }
}

pub(crate) fn field_row(field: &FieldDef) -> Vec<Cell> {
    let name = if field.is_protected() {
        Cell::new(&field.name).fg(Color::DarkGrey)
    } else {
        Cell::new(&field.name)
    };
    let reset = match field.clear_to {
        Some(ref value) if value.is_null() => "cleared".to_string(),
        Some(ref value) => format!("reset to {value}"),
        None => "copied".to_string(),
    };
    vec![
        name,
        Cell::new(field.kind.sql_type()),
        Cell::new(flag(field.show)),
        Cell::new(flag(field.input)),
        Cell::new(field.values.as_deref().unwrap_or_default().join(" ")),
        Cell::new(reset),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use photolog_core::fields::{FieldSchema, FieldType};

    #[test]
    fn test_stats_table_lists_counts() {
        let stats = CatalogStats {
            total_files: 3,
            total_observations: 5,
            related_observations: 2,
            undated_files: 1,
        };
        let rendered = stats_table(&stats).to_string();
        assert!(rendered.contains("Observations"));
        assert!(rendered.contains("Extra group observations"));
        assert!(rendered.contains('5'));
    }

    #[test]
    fn test_field_row_describes_reset() {
        let schema = FieldSchema::default();
        let adults = schema.field("adults_n").unwrap();
        let notes = schema.field("notes").unwrap();
        let mut table = Table::new();
        table.add_row(field_row(adults));
        table.add_row(field_row(notes));
        let rendered = table.to_string();
        assert!(rendered.contains("cleared"));
        assert!(rendered.contains("copied"));
        assert_eq!(adults.kind, FieldType::Integer);
    }
}
