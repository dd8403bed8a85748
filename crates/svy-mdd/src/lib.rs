//! Reading and editing survey schema documents (`.mdd`).

pub mod error;
pub mod reader;
pub mod save;
pub mod writer;
pub mod xml;

pub use error::{MddError, Result};
pub use reader::{parse_schema, read_schema};
pub use save::{backup_original, write_atomic};
pub use writer::{
    DATA_FILE_DSC, NewTextVariable, TEXT_VARIABLE_MAX, add_text_variable, copy_with_datasource,
    derived_id, rewrite_datasource,
};
