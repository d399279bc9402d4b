//! Canonical, capture-time based file names.
//!
//! Proposals are computed without touching the filesystem; renames only
//! happen through [`apply_renames`].

use std::fs;
use std::path::Path;

use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::catalog::RecordStore;
use crate::domain::parse_image_time;
use crate::error::{Error, Result};
use crate::metadata;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameProposal {
    /// Current path relative to the image root.
    pub from: String,
    /// Proposed path relative to the image root, in the same directory.
    pub to: String,
}

#[derive(Debug, Default)]
pub struct RenamePlan {
    pub proposals: Vec<RenameProposal>,
    /// Paths with no usable capture time.
    pub undated: Vec<String>,
    pub failures: Vec<(String, Error)>,
}

#[derive(Debug, Default)]
pub struct RenameReport {
    pub renamed: Vec<RenameProposal>,
    pub failures: Vec<(RenameProposal, Error)>,
}

/// `YYYYMMDD_HHMMSS.<ext>` for a stored-form capture time.
pub fn canonical_file_name(image_time: &str, ext: &str) -> Option<String> {
    let time = parse_image_time(image_time)?;
    let stem = time.format("%Y%m%d_%H%M%S");
    Some(if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{ext}")
    })
}

/// Propose a rename for every path whose file name differs from its
/// canonical name. The parent directory is kept.
pub fn propose_renames(root: &Path, paths: &[String]) -> RenamePlan {
    let outcomes: Vec<(String, Result<Option<String>>)> = paths
        .par_iter()
        .map(|path| {
            let time = metadata::extract_metadata(&root.join(path)).map(|m| m.capture_time());
            (path.clone(), time)
        })
        .collect();

    let mut plan = RenamePlan::default();
    for (path, outcome) in outcomes {
        let time = match outcome {
            Ok(Some(time)) => time,
            Ok(None) => {
                plan.undated.push(path);
                continue;
            }
            Err(err) => {
                plan.failures.push((path, err));
                continue;
            }
        };

        let (dir, file_name) = match path.rsplit_once('/') {
            Some((dir, name)) => (Some(dir), name),
            None => (None, path.as_str()),
        };
        let ext = Path::new(file_name)
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(canonical) = canonical_file_name(&time, &ext) else {
            plan.undated.push(path);
            continue;
        };

        if canonical != file_name {
            let to = match dir {
                Some(dir) => format!("{dir}/{canonical}"),
                None => canonical,
            };
            plan.proposals.push(RenameProposal { from: path, to });
        }
    }
    plan
}

/// Perform the proposed renames, moving each file's observations in `store`
/// right after the file itself.
///
/// A target that exists on disk or is still catalogued is reported as
/// [`Error::RenameCollision`] and never overwritten. If the catalog update
/// fails the file is moved back. Failures never stop the remaining renames.
pub fn apply_renames<S: RecordStore + ?Sized>(
    root: &Path,
    store: &mut S,
    proposals: &[RenameProposal],
) -> RenameReport {
    let mut report = RenameReport::default();
    for proposal in proposals {
        match rename_one(root, store, proposal) {
            Ok(()) => report.renamed.push(proposal.clone()),
            Err(err) => {
                warn!(from = %proposal.from, to = %proposal.to, error = %err, "rename failed");
                report.failures.push((proposal.clone(), err));
            }
        }
    }
    info!(
        renamed = report.renamed.len(),
        failed = report.failures.len(),
        "applied renames"
    );
    report
}

fn rename_one<S: RecordStore + ?Sized>(
    root: &Path,
    store: &mut S,
    proposal: &RenameProposal,
) -> Result<()> {
    let from = root.join(&proposal.from);
    let to = root.join(&proposal.to);

    if to.exists() || !store.records_by_path(&proposal.to)?.is_empty() {
        return Err(Error::RenameCollision { from, to });
    }

    fs::rename(&from, &to).map_err(|source| Error::UnreadableFile {
        path: from.clone(),
        source,
    })?;

    if let Err(err) = store.rename_path(&proposal.from, &proposal.to) {
        if let Err(undo) = fs::rename(&to, &from) {
            error!(
                from = %proposal.from,
                to = %proposal.to,
                error = %undo,
                "could not move file back after catalog update failed"
            );
        }
        return Err(err);
    }
    Ok(())
}
