use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use photolog_core::sync::MergeProgress;
use photolog_core::PhotoLog;

const LIST_LIMIT: usize = 20;

fn print_paths<'a>(title: &str, paths: impl ExactSizeIterator<Item = &'a String>) {
    let total = paths.len();
    if total == 0 {
        return;
    }
    println!();
    println!("  {title} ({total})");
    for path in paths.take(LIST_LIMIT) {
        println!("    {path}");
    }
    if total > LIST_LIMIT {
        println!("    ... and {} more", total - LIST_LIMIT);
    }
}

pub fn check(log: &PhotoLog) -> Result<()> {
    let diff = log.check_new()?;
    print_paths("New on disk", diff.only_on_disk.iter());
    print_paths("Catalogued but missing on disk", diff.only_in_store.iter());
    println!();
    if diff.is_in_sync() {
        println!("  Catalog is in sync ({} files).", diff.both.len());
    } else {
        println!(
            "  {} new, {} missing, {} in sync. Run `photolog load` to catalog new files.",
            diff.only_on_disk.len(),
            diff.only_in_store.len(),
            diff.both.len()
        );
    }
    println!();
    Ok(())
}

pub fn load(log: &mut PhotoLog) -> Result<()> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let report = log.merge_new(Some(&mut |progress| match progress {
        MergeProgress::Start { total } => {
            pb.set_length(total as u64);
            pb.set_position(0);
            pb.set_message("Cataloguing new images...");
        }
        MergeProgress::Inserted { path } => {
            pb.inc(1);
            pb.set_message(path);
        }
        MergeProgress::Skipped { .. } | MergeProgress::Failed { .. } => {
            pb.inc(1);
        }
        MergeProgress::Complete {
            inserted,
            skipped,
            failed,
        } => {
            pb.finish_with_message(format!("{inserted} inserted, {skipped} skipped, {failed} failed"));
        }
    }))?;

    for (path, err) in &report.failures {
        println!("  failed: {path}: {err}");
    }
    for (_, missing) in &report.incomplete {
        println!("  incomplete: {missing}");
    }
    for (path, twin) in &report.same_content {
        println!("  same content: {path} = {twin}");
    }
    println!("Load complete: {}.", report.summary());
    Ok(())
}
