pub mod category;
pub mod error;
pub mod field;
pub mod instance;
pub mod label;
pub mod naming;
pub mod property;
pub mod schema;

pub use category::{Category, CategoryEntry, CategoryList, CategoryMap, TypeArena, TypeId};
pub use error::{ModelError, ReferenceKind, Result};
pub use field::{
    Class, DataType, Field, FieldNode, Group, GroupKind, IteratorKind, NumericRange, Variable,
};
pub use instance::{
    IndexStep, IndexValue, InstanceKind, VariableInstance, VariableInstances, enumerate,
};
pub use label::{Contexts, Labels, Language, Languages, Locale};
pub use naming::{GRID, SIMPLE_VAR, VALUE_GRID, generic_name, split_components};
pub use property::{Properties, Property};
pub use schema::{DataSource, DataSources, FieldRef, Schema};
