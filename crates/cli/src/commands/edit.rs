use anyhow::Result;
use photolog_core::domain::FieldValue;
use photolog_core::PhotoLog;

use super::short_id;

pub fn set(log: &mut PhotoLog, reference: &str, field: &str, value: String) -> Result<()> {
    let obs = log.resolve(reference)?;
    let updated = log.set_field(&obs.observation_id, field, FieldValue::Text(value))?;
    let value = updated.get(field);
    if let Some(def) = log.schema().field(field) {
        if !def.allows(&value) {
            println!(
                "  note: {value} is not one of {}",
                def.values.as_deref().unwrap_or_default().join(", ")
            );
        }
    }
    if value.is_null() {
        println!("Cleared {field} on {}#{}", updated.image_path, updated.group_number);
    } else {
        println!(
            "Set {field} = {value} on {}#{}",
            updated.image_path, updated.group_number
        );
    }
    Ok(())
}

pub fn group(log: &mut PhotoLog, path: &str) -> Result<()> {
    let obs = log.add_group(path)?;
    println!(
        "Added observation {}#{} ({})",
        obs.image_path,
        obs.group_number,
        short_id(&obs.observation_id)
    );
    Ok(())
}

pub fn relate(log: &mut PhotoLog, a: &str, b: &str) -> Result<()> {
    let a = log.resolve(a)?;
    let b = log.resolve(b)?;
    let change = log.set_related(&a.observation_id, &b.observation_id)?;

    for id in &change.detached {
        println!("  detached previous partner {}", short_id(id));
    }
    match change.separation_seconds {
        Some(seconds) => println!(
            "Related {} and {} ({seconds}s apart)",
            a.image_path, b.image_path
        ),
        None => println!("Related {} and {}", a.image_path, b.image_path),
    }
    Ok(())
}

pub fn unrelate(log: &mut PhotoLog, reference: &str) -> Result<()> {
    let obs = log.resolve(reference)?;
    let cleared = log.unset_related(&obs.observation_id)?;
    if cleared.is_empty() {
        println!("{}#{} has no relation.", obs.image_path, obs.group_number);
    } else {
        println!("Cleared relation on {} observations.", cleared.len());
    }
    Ok(())
}
