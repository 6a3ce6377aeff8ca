//! Rich diagnostic error types for relprob.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers know what went wrong and
//! where to look. Statistical edge cases (single-class nodes, empty branches)
//! are not errors and never surface here.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for relprob.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum RelError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Learn(#[from] LearnError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Infer(#[from] InferError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Profile(#[from] ProfileError),
}

// ---------------------------------------------------------------------------
// Data-access errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DataError {
    #[error("item {id} not found in the store")]
    #[diagnostic(
        code(relprob::data::unknown_item),
        help("Add the item with `GraphStore::add_item` before linking or labelling it.")
    )]
    UnknownItem { id: u64 },

    #[error("item {id} already exists")]
    #[diagnostic(
        code(relprob::data::duplicate_item),
        help("Item ids must be unique across all item kinds.")
    )]
    DuplicateItem { id: u64 },

    #[error("invalid item id 0")]
    #[diagnostic(
        code(relprob::data::zero_id),
        help("Item ids are non-zero. Renumber the graph document starting at 1.")
    )]
    ZeroId,

    #[error("scope {scope} is not open")]
    #[diagnostic(
        code(relprob::data::scope_not_open),
        help("Each scope must be ended exactly once. Use `Scope::open` to get a guard that releases itself.")
    )]
    ScopeNotOpen { scope: u64 },

    #[error("store lock poisoned")]
    #[diagnostic(
        code(relprob::data::lock_poisoned),
        help("A thread panicked while holding the graph lock. Rebuild the store.")
    )]
    LockPoisoned,

    #[error("failed to read graph document: {path}")]
    #[diagnostic(
        code(relprob::data::document_read),
        help("Ensure the file exists and is readable.")
    )]
    DocumentRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse graph document: {path}")]
    #[diagnostic(
        code(relprob::data::document_parse),
        help("Graph documents are JSON objects with `items` and `links` arrays.")
    )]
    DocumentParse { path: String, message: String },

    #[error("failed to write graph document: {path}")]
    #[diagnostic(
        code(relprob::data::document_write),
        help("Ensure you have write permissions to the target directory.")
    )]
    DocumentWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for data-access operations.
pub type DataResult<T> = std::result::Result<T, DataError>;

// ---------------------------------------------------------------------------
// Feature errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FeatureError {
    #[error("feature setting has no source")]
    #[diagnostic(
        code(relprob::feature::null_source),
        help("Attribute sources need a non-empty attribute name and every hop needs a link type.")
    )]
    NullSource,

    #[error("feature setting has no aggregator")]
    #[diagnostic(
        code(relprob::feature::null_aggregator),
        help("Pass the id of a registered aggregator such as `count` or `mode`.")
    )]
    NullAggregator,

    #[error("unknown aggregator: \"{id}\"")]
    #[diagnostic(
        code(relprob::feature::unknown_aggregator),
        help("Register the aggregator with `AggregatorRegistry::register` or use one of: nop, mode, count, proportion, degree, count_distinct, average, min, max, sum.")
    )]
    UnknownAggregator { id: String },

    #[error("invalid source \"{input}\": {reason}")]
    #[diagnostic(
        code(relprob::feature::invalid_source),
        help("Sources look like `[self].budget`, `[<acted_in:actor].gender` or `[>made_by:studio]`.")
    )]
    InvalidSource { input: String, reason: String },

    #[error("no feature table for \"{feature}\"")]
    #[diagnostic(
        code(relprob::feature::missing_table),
        help("Feature vectors must be computed for the population before scoring.")
    )]
    MissingTable { feature: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Data(#[from] DataError),
}

/// Result type for feature operations.
pub type FeatureResult<T> = std::result::Result<T, FeatureError>;

// ---------------------------------------------------------------------------
// Learning errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LearnError {
    #[error("empty training population for {item_kind}.{attr}")]
    #[diagnostic(
        code(relprob::learn::empty_population),
        help("No item of the class-label kind carries the label attribute. Check the class label.")
    )]
    EmptyPopulation { item_kind: String, attr: String },

    #[error("item {id} has no value for class label {attr}")]
    #[diagnostic(
        code(relprob::learn::missing_label),
        help("Every training instance needs a label. Filter the population first.")
    )]
    MissingLabel { id: u64, attr: String },

    #[error("invalid fold count {folds} for population of {population}")]
    #[diagnostic(
        code(relprob::learn::invalid_folds),
        help("Cross-validation needs at least 2 folds and at least one instance per fold.")
    )]
    InvalidFolds { folds: usize, population: usize },

    #[error("empty pruning sequence")]
    #[diagnostic(
        code(relprob::learn::empty_sequence),
        help("Tree selection needs at least one candidate tree.")
    )]
    EmptySequence,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Profile(#[from] ProfileError),
}

/// Result type for learning operations.
pub type LearnResult<T> = std::result::Result<T, LearnError>;

// ---------------------------------------------------------------------------
// Collective inference errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum InferError {
    #[error("no initializing model found for \"{model}\"")]
    #[diagnostic(
        code(relprob::infer::missing_init_model),
        help("Every model needs an initializing tree when seeding from predictions.")
    )]
    MissingInitModel { model: String },

    #[error("duplicate model name \"{model}\"")]
    #[diagnostic(
        code(relprob::infer::duplicate_model),
        help("Model names key the label caches and statistics; give each model a unique name.")
    )]
    DuplicateModel { model: String },

    #[error("no models to run")]
    #[diagnostic(
        code(relprob::infer::no_models),
        help("Pass at least one trained tree bound to a population.")
    )]
    NoModels,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Learn(#[from] LearnError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Data(#[from] DataError),
}

/// Result type for collective inference.
pub type InferResult<T> = std::result::Result<T, InferError>;

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PersistError {
    #[error("failed to read model: {path}")]
    #[diagnostic(
        code(relprob::persist::read),
        help("Ensure the model file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write model: {path}")]
    #[diagnostic(
        code(relprob::persist::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("model serialization failed: {message}")]
    #[diagnostic(
        code(relprob::persist::serialize),
        help("This is a bug; please report it with the model that failed.")
    )]
    Serialize { message: String },

    #[error("model deserialization failed: {message}")]
    #[diagnostic(
        code(relprob::persist::deserialize),
        help("The file may be truncated, or written by an incompatible version.")
    )]
    Deserialize { message: String },

    #[error("unsupported model format version {found} (expected {expected})")]
    #[diagnostic(
        code(relprob::persist::version),
        help("Re-learn the model with this version of relprob.")
    )]
    Version { found: u32, expected: u32 },
}

/// Result type for persistence.
pub type PersistResult<T> = std::result::Result<T, PersistError>;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(relprob::config::read),
        help("Ensure the config file exists and is valid TOML.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(relprob::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(relprob::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config value for {field}: {message}")]
    #[diagnostic(
        code(relprob::config::invalid),
        help("See the documented defaults in `LearnerConfig` and `RdnConfig`.")
    )]
    Invalid { field: String, message: String },
}

/// Result type for configuration.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Profiling errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ProfileError {
    #[error("end_call(\"{name}\") without matching start_call")]
    #[diagnostic(
        code(relprob::profile::end_without_start),
        help("Every `end_call` must be preceded by a `start_call` with the same name.")
    )]
    EndWithoutStart { name: String },

    #[error("start_call(\"{name}\") while a call with that name is already open")]
    #[diagnostic(
        code(relprob::profile::already_started),
        help("Calls with the same name cannot nest; end the first one before starting again.")
    )]
    AlreadyStarted { name: String },
}

/// Result type for profiling.
pub type ProfileResult<T> = std::result::Result<T, ProfileError>;

/// Convenience result type using the top-level error.
pub type RelResult<T> = std::result::Result<T, RelError>;
