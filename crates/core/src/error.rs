use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("field schema error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read {}: {source}", .path.display())]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode image {}: {message}", .path.display())]
    UnreadableImage { path: PathBuf, message: String },

    #[error("missing metadata in {}: {}", .path.display(), .attributes.join(", "))]
    MissingMetadata {
        path: PathBuf,
        attributes: Vec<&'static str>,
    },

    #[error("path already catalogued: {0}")]
    DuplicatePath(String),

    #[error("rename target already exists: {} -> {}", .from.display(), .to.display())]
    RenameCollision { from: PathBuf, to: PathBuf },

    #[error("observation not found: {0}")]
    RelationTargetNotFound(String),

    #[error("an observation cannot be related to itself: {0}")]
    SelfRelation(String),

    #[error("path has no catalogued observation: {0}")]
    PathNotCataloged(String),

    #[error("observation id already present: {0}")]
    DuplicateObservation(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("field is maintained by the catalog and cannot be edited: {0}")]
    ProtectedField(String),

    #[error("invalid value for field {field}: {message}")]
    InvalidFieldValue { field: String, message: String },

    #[error("invalid field schema: {0}")]
    InvalidFieldSchema(String),

    #[error("image root not configured; run `photolog root set <dir>` first")]
    ImageRootNotSet,

    #[error("image root does not exist: {}", .0.display())]
    ImageRootNotFound(PathBuf),

    #[error("catalog schema version {db} is newer than supported version {code}")]
    SchemaTooNew { db: u32, code: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
