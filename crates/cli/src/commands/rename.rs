use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use photolog_core::PhotoLog;

pub fn run(log: &mut PhotoLog, apply: bool) -> Result<()> {
    let plan = log.propose_renames()?;

    for (path, err) in &plan.failures {
        println!("  skipped: {path}: {err}");
    }
    if !plan.undated.is_empty() {
        println!("  {} files have no capture time and keep their name.", plan.undated.len());
    }
    if plan.proposals.is_empty() {
        println!("All file names already match their capture time.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Current"), Cell::new("Proposed")]);
    for proposal in &plan.proposals {
        table.add_row(vec![Cell::new(&proposal.from), Cell::new(&proposal.to)]);
    }
    println!("{table}");

    if !apply {
        println!(
            "{} renames proposed. Run `photolog rename --apply` to rename.",
            plan.proposals.len()
        );
        return Ok(());
    }

    let report = log.apply_renames(&plan.proposals)?;
    for (proposal, err) in &report.failures {
        println!("  not renamed: {}: {err}", proposal.from);
    }
    println!(
        "Renamed {} files, {} failed.",
        report.renamed.len(),
        report.failures.len()
    );
    Ok(())
}
