//! Hierarchical survey case-data stores.
//!
//! A store is a SQLite file holding one table per iteration level: `L1`
//! has a row per respondent, and every grid or loop gets a child table
//! keyed by its ancestors' keys. [`DataFile`] binds a store to the schema
//! document that describes it and offers counting, join-path resolution,
//! splitting, merging, export and extraction on top of that binding.

pub mod cache;
pub mod codec;
pub mod connection;
pub mod copy;
pub mod create;
pub mod error;
pub mod export;
pub mod extract;
pub mod join;
pub mod layout;
pub mod merge;
pub mod predicate;
pub mod split;
pub mod store;

pub use cache::{FileIdentity, SessionCache, file_digest};
pub use connection::{Access, CategoryRepresentation, ConnectionBuilder, ConnectionDescriptor, Mode, Overwrite};
pub use copy::{PendingOutput, Selection, copy_store};
pub use create::{CaseWriter, create_store};
pub use error::{Result, StoreError};
pub use export::{ExportOptions, ExportRow, ExportTable};
pub use extract::{ExtractOptions, ExtractOutcome, RemapTable};
pub use join::{CategoryValue, JoinPath, JoinStep, Leaf, LevelFilter};
pub use layout::{ColumnSpec, ColumnTag, LevelRow, LevelTable, StoreLayout};
pub use merge::{MergeReport, MergedSource, key_shift};
pub use predicate::{CompareOp, Operand, Predicate};
pub use split::{Shard, SplitOptions, SplitReport, shard_bounds};
pub use store::{CategoryLabel, DataFile};
