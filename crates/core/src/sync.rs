//! Reconciling the image folder with the catalog.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::catalog::RecordStore;
use crate::domain::{Observation, SyncDiff};
use crate::error::{Error, Result};
use crate::metadata::{self, DATETIME_ORIGINAL, PIXEL_HEIGHT, PIXEL_WIDTH};
use crate::{hasher, scanner};

/// Progress events emitted by [`merge`].
pub enum MergeProgress {
    /// Starting with this many candidate files.
    Start { total: usize },
    /// A new first observation was inserted.
    Inserted { path: String },
    /// The path already had an observation.
    Skipped { path: String },
    /// The file could not be catalogued.
    Failed { path: String },
    /// Merge finished (or was interrupted).
    Complete {
        inserted: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Per-file outcome of a merge. Failures here never abort the batch.
#[derive(Debug, Default)]
pub struct MergeReport {
    pub inserted: Vec<String>,
    pub already_present: Vec<String>,
    /// Inserted paths whose required metadata was partly or wholly absent,
    /// each with its [`Error::MissingMetadata`].
    pub incomplete: Vec<(String, Error)>,
    /// `(new path, catalogued path)` pairs with byte-identical content.
    /// Both paths get their own observation.
    pub same_content: Vec<(String, String)>,
    pub failures: Vec<(String, Error)>,
    /// Paths left unprocessed because the merge was cancelled.
    pub not_processed: Vec<String>,
}

impl MergeReport {
    pub fn interrupted(&self) -> bool {
        !self.not_processed.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} inserted, {} already catalogued, {} failed",
            self.inserted.len(),
            self.already_present.len(),
            self.failures.len()
        );
        if !self.incomplete.is_empty() {
            text.push_str(&format!(", {} with missing metadata", self.incomplete.len()));
        }
        if self.interrupted() {
            text.push_str(&format!(", {} not processed (interrupted)", self.not_processed.len()));
        }
        text
    }
}

/// Compare image files under `root` with the catalogued first observations.
pub fn diff<S: RecordStore + ?Sized>(root: &Path, store: &S) -> Result<SyncDiff> {
    let on_disk: BTreeSet<String> = scanner::scan_directory(root)?.into_iter().collect();
    let known = store.known_paths()?;

    let diff = SyncDiff {
        only_on_disk: on_disk.difference(&known).cloned().collect(),
        only_in_store: known.difference(&on_disk).cloned().collect(),
        both: on_disk.intersection(&known).cloned().collect(),
    };
    debug!(
        only_on_disk = diff.only_on_disk.len(),
        only_in_store = diff.only_in_store.len(),
        both = diff.both.len(),
        "compared image folder with catalog"
    );
    Ok(diff)
}

/// Insert a first observation for every path in `new_paths` that has none.
///
/// Safe to re-run: paths with an existing observation are skipped. Files are
/// hashed and read in parallel; the existence check and insert for each path
/// then run back to back on the store. Setting `cancel` stops work at the
/// next file boundary; every inserted record is complete.
pub fn merge<S: RecordStore + ?Sized>(
    root: &Path,
    store: &mut S,
    new_paths: &[String],
    mut progress_cb: Option<&mut dyn FnMut(MergeProgress)>,
    cancel: Option<&AtomicBool>,
) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    let cancelled = || cancel.is_some_and(|flag| flag.load(Ordering::Relaxed));

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for path in new_paths {
        if !seen.insert(path.as_str()) {
            continue;
        }
        if store.records_by_path(path)?.is_empty() {
            candidates.push(path.clone());
        } else {
            report.already_present.push(path.clone());
        }
    }

    if let Some(ref mut cb) = progress_cb {
        cb(MergeProgress::Start {
            total: candidates.len() + report.already_present.len(),
        });
        for path in &report.already_present {
            cb(MergeProgress::Skipped { path: path.clone() });
        }
    }

    // Hash + metadata in parallel (no store access here)
    let prepared: Vec<(String, Option<Result<Prepared>>)> = candidates
        .into_par_iter()
        .map(|path| {
            if cancelled() {
                return (path, None);
            }
            let result = prepare_observation(root, &path);
            (path, Some(result))
        })
        .collect();

    for (path, outcome) in prepared {
        let prepared = match outcome {
            None => {
                report.not_processed.push(path);
                continue;
            }
            Some(Err(err)) => {
                warn!(path = %path, error = %err, "skipping file");
                report.failures.push((path.clone(), err));
                if let Some(ref mut cb) = progress_cb {
                    cb(MergeProgress::Failed { path });
                }
                continue;
            }
            Some(Ok(prepared)) => prepared,
        };

        if cancelled() {
            report.not_processed.push(path);
            continue;
        }

        // Check and insert as one unit: nothing else holds the store meanwhile.
        if !store.records_by_path(&path)?.is_empty() {
            report.already_present.push(path.clone());
            if let Some(ref mut cb) = progress_cb {
                cb(MergeProgress::Skipped { path });
            }
            continue;
        }
        if let Some(ref hash) = prepared.observation.image_hash {
            if let Some(twin) = store
                .records_by_hash(hash)?
                .into_iter()
                .find(|o| o.group_number == 1 && o.image_path != path)
            {
                report.same_content.push((path.clone(), twin.image_path));
            }
        }

        match store.insert(&prepared.observation) {
            Ok(()) => {}
            Err(err @ Error::DuplicatePath(_)) => {
                warn!(path = %path, "store reported a duplicate path");
                report.failures.push((path.clone(), err));
                if let Some(ref mut cb) = progress_cb {
                    cb(MergeProgress::Failed { path });
                }
                continue;
            }
            Err(err) => return Err(err),
        }

        if let Some(missing) = prepared.missing {
            warn!(path = %path, "catalogued: {missing}");
            report.incomplete.push((path.clone(), missing));
        }
        debug!(path = %path, "catalogued");
        report.inserted.push(path.clone());
        if let Some(ref mut cb) = progress_cb {
            cb(MergeProgress::Inserted { path });
        }
    }

    if let Some(ref mut cb) = progress_cb {
        cb(MergeProgress::Complete {
            inserted: report.inserted.len(),
            skipped: report.already_present.len(),
            failed: report.failures.len(),
        });
    }
    info!(root = %root.display(), "merge: {}", report.summary());
    Ok(report)
}

struct Prepared {
    observation: Observation,
    missing: Option<Error>,
}

/// Build the first observation of `path`. Metadata gaps and undecodable
/// images yield null fields; only an unreadable file is an error.
fn prepare_observation(root: &Path, path: &str) -> Result<Prepared> {
    let full = root.join(path);
    let digest = hasher::digest_file(&full)?;

    let mut observation = Observation::new(path);
    observation.image_hash = Some(digest.sha256);
    observation.image_bytes = Some(digest.bytes);

    let attributes = match metadata::extract_metadata(&full) {
        Ok(meta) => {
            observation.image_time = meta.capture_time();
            observation.image_w = meta.width();
            observation.image_h = meta.height();
            meta.missing_required()
        }
        Err(Error::UnreadableImage { message, .. }) => {
            debug!(path = %path, %message, "image not decodable");
            vec![DATETIME_ORIGINAL, PIXEL_WIDTH, PIXEL_HEIGHT]
        }
        Err(err) => return Err(err),
    };
    let missing = (!attributes.is_empty()).then(|| Error::MissingMetadata {
        path: full,
        attributes,
    });

    Ok(Prepared {
        observation,
        missing,
    })
}
