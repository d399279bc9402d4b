pub mod catalog;
pub mod domain;
pub mod error;
pub mod fields;
pub mod hasher;
pub mod metadata;
pub mod observation;
pub mod relation;
pub mod rename;
pub mod scanner;
pub mod sync;
pub mod table;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use catalog::{Catalog, RecordStore};
use domain::*;
use error::{Error, Result};
use fields::FieldSchema;
use relation::RelationChange;
use rename::{RenamePlan, RenameProposal, RenameReport};
use sync::{MergeProgress, MergeReport};

const IMAGE_ROOT_KEY: &str = "image_root";

/// The main entry point: a catalog, its field schema and the configured image root.
pub struct PhotoLog {
    catalog: Catalog,
    schema: FieldSchema,
    cancel: Arc<AtomicBool>,
}

impl PhotoLog {
    /// Open or create a catalog at `catalog_path`, adding columns for any
    /// new field in `schema`.
    pub fn open(catalog_path: &Path, schema: FieldSchema) -> Result<Self> {
        let catalog = Catalog::open(catalog_path, &schema)?;
        Ok(Self::with_catalog(catalog, schema))
    }

    pub fn open_in_memory(schema: FieldSchema) -> Result<Self> {
        let catalog = Catalog::open_in_memory(&schema)?;
        Ok(Self::with_catalog(catalog, schema))
    }

    fn with_catalog(catalog: Catalog, schema: FieldSchema) -> Self {
        Self {
            catalog,
            schema,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Flag checked between files by [`PhotoLog::merge`]; set it to stop early.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    // ── Image root ───────────────────────────────────────────────

    /// Set the directory that every `image_path` is relative to.
    pub fn set_image_root(&self, path: &Path) -> Result<PathBuf> {
        let canonical = path
            .canonicalize()
            .map_err(|_| Error::ImageRootNotFound(path.to_path_buf()))?;
        if !canonical.is_dir() {
            return Err(Error::ImageRootNotFound(path.to_path_buf()));
        }
        self.catalog
            .set_config(IMAGE_ROOT_KEY, &canonical.to_string_lossy())?;
        info!(root = %canonical.display(), "image root set");
        Ok(canonical)
    }

    pub fn get_image_root(&self) -> Result<Option<PathBuf>> {
        Ok(self.catalog.get_config(IMAGE_ROOT_KEY)?.map(PathBuf::from))
    }

    fn image_root(&self) -> Result<PathBuf> {
        let root = self.get_image_root()?.ok_or(Error::ImageRootNotSet)?;
        if !root.is_dir() {
            return Err(Error::ImageRootNotFound(root));
        }
        Ok(root)
    }

    // ── Sync ─────────────────────────────────────────────────────

    /// Image files under the root, as sorted relative paths.
    pub fn scan(&self) -> Result<Vec<String>> {
        scanner::scan_directory(&self.image_root()?)
    }

    /// Compare the image folder with the catalog without changing anything.
    pub fn check_new(&self) -> Result<SyncDiff> {
        sync::diff(&self.image_root()?, &self.catalog)
    }

    /// Catalog the given paths (relative to the image root).
    pub fn merge(
        &mut self,
        paths: &[String],
        progress_cb: Option<&mut dyn FnMut(MergeProgress)>,
    ) -> Result<MergeReport> {
        let root = self.image_root()?;
        self.cancel.store(false, Ordering::Relaxed);
        sync::merge(
            &root,
            &mut self.catalog,
            paths,
            progress_cb,
            Some(self.cancel.as_ref()),
        )
    }

    /// Catalog every image file that has no observation yet.
    pub fn merge_new(
        &mut self,
        progress_cb: Option<&mut dyn FnMut(MergeProgress)>,
    ) -> Result<MergeReport> {
        let diff = self.check_new()?;
        let paths: Vec<String> = diff.only_on_disk.into_iter().collect();
        self.merge(&paths, progress_cb)
    }

    // ── Renames ──────────────────────────────────────────────────

    /// Proposals for every image file under the root. Nothing is renamed.
    pub fn propose_renames(&self) -> Result<RenamePlan> {
        let root = self.image_root()?;
        let paths = scanner::scan_directory(&root)?;
        Ok(rename::propose_renames(&root, &paths))
    }

    /// Rename files on disk and move their observations along, one file
    /// at a time.
    pub fn apply_renames(&mut self, proposals: &[RenameProposal]) -> Result<RenameReport> {
        let root = self.image_root()?;
        Ok(rename::apply_renames(&root, &mut self.catalog, proposals))
    }

    // ── Observations ─────────────────────────────────────────────

    pub fn observation(&self, observation_id: &str) -> Result<Option<Observation>> {
        self.catalog.record(observation_id)
    }

    /// Resolve an id, an `image_path` (first group) or `image_path#group`.
    pub fn resolve(&self, reference: &str) -> Result<Observation> {
        if let Some(observation) = self.catalog.record(reference)? {
            return Ok(observation);
        }
        let (path, group) = match reference.rsplit_once('#') {
            Some((path, group)) => match group.parse::<u32>() {
                Ok(group) => (path, group),
                Err(_) => (reference, 1),
            },
            None => (reference, 1),
        };
        self.catalog
            .records_by_path(path)?
            .into_iter()
            .find(|o| o.group_number == group)
            .ok_or_else(|| Error::RelationTargetNotFound(reference.to_string()))
    }

    /// Every observation, chronologically; undated ones last.
    pub fn observations(&self) -> Result<Vec<Observation>> {
        self.catalog.all_records()
    }

    pub fn observations_of(&self, image_path: &str) -> Result<Vec<Observation>> {
        self.catalog.records_by_path(image_path)
    }

    pub fn add_group(&mut self, image_path: &str) -> Result<Observation> {
        observation::add_group(&mut self.catalog, &self.schema, image_path)
    }

    pub fn set_field(
        &mut self,
        observation_id: &str,
        name: &str,
        value: FieldValue,
    ) -> Result<Observation> {
        observation::set_field(&mut self.catalog, &self.schema, observation_id, name, value)
    }

    // ── Relations ────────────────────────────────────────────────

    pub fn set_related(&mut self, id_a: &str, id_b: &str) -> Result<RelationChange> {
        relation::set_related(&mut self.catalog, id_a, id_b)
    }

    pub fn unset_related(&mut self, observation_id: &str) -> Result<Vec<String>> {
        relation::unset_related(&mut self.catalog, observation_id)
    }

    pub fn related_records(&self, observation_id: &str) -> Result<Vec<Observation>> {
        relation::partners(&self.catalog, observation_id)
    }

    // ── Summary and exchange ─────────────────────────────────────

    pub fn status(&self) -> Result<CatalogStats> {
        self.catalog.stats()
    }

    pub fn export_table(&self, destination: &Path) -> Result<usize> {
        table::export_table(&self.catalog, &self.schema, destination)
    }

    pub fn import_table(&mut self, source: &Path) -> Result<usize> {
        table::import_table(source, &self.schema, &mut self.catalog)
    }
}
