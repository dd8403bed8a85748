//! Schema field tree: variables, loops/grids and classes.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::category::CategoryEntry;
use crate::label::{Labels, Locale};
use crate::property::Properties;

/// Declared data type of a variable (document `type` attribute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Information item; carries no case data and no instances.
    Info,
    Long,
    Text,
    Categorical,
    Object,
    Date,
    Double,
    Boolean,
    Level,
}

impl DataType {
    pub fn from_code(code: i64) -> Option<Self> {
        let data_type = match code {
            0 => DataType::Info,
            1 => DataType::Long,
            2 => DataType::Text,
            3 => DataType::Categorical,
            4 => DataType::Object,
            5 => DataType::Date,
            6 => DataType::Double,
            7 => DataType::Boolean,
            8 => DataType::Level,
            _ => return None,
        };
        Some(data_type)
    }

    pub fn code(self) -> i64 {
        match self {
            DataType::Info => 0,
            DataType::Long => 1,
            DataType::Text => 2,
            DataType::Categorical => 3,
            DataType::Object => 4,
            DataType::Date => 5,
            DataType::Double => 6,
            DataType::Boolean => 7,
            DataType::Level => 8,
        }
    }

    pub fn has_instances(self) -> bool {
        self != DataType::Info
    }
}

/// How a loop/grid is iterated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IteratorKind {
    /// Iterates over a category list (`iteratortype="2"`).
    Categorical,
    /// Iterates over a numeric range (`iteratortype="3"`).
    Numeric,
}

impl IteratorKind {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "2" => Some(IteratorKind::Categorical),
            "3" => Some(IteratorKind::Numeric),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    Loop,
    Grid,
}

/// Upper bound the document uses for an open-ended numeric loop.
pub const UNBOUNDED_UPPER: i64 = 2_147_483_647;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericRange {
    pub lower: i64,
    pub upper: i64,
}

impl NumericRange {
    pub fn is_unbounded(&self) -> bool {
        self.upper >= UNBOUNDED_UPPER
    }

    fn is_iterable(&self) -> bool {
        !self.is_unbounded() && (self.lower > 0 || self.upper > 0)
    }

    /// Iteration indices; empty for unbounded or degenerate ranges.
    pub fn indices(&self) -> RangeInclusive<i64> {
        if self.is_iterable() {
            self.lower..=self.upper
        } else {
            1..=0
        }
    }

    /// Number of iteration indices.
    pub fn len(&self) -> usize {
        if self.is_iterable() && self.upper >= self.lower {
            usize::try_from(self.upper.abs_diff(self.lower)).map_or(usize::MAX, |span| {
                span.saturating_add(1)
            })
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Common surface of every schema object that has a name, labels and properties.
pub trait Field {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn labels(&self) -> &Labels;
    fn properties(&self) -> &Properties;

    fn label<'a>(&'a self, requested: &Locale, base: &Locale) -> &'a str {
        self.labels().resolve(requested, base, self.name())
    }
}

/// A simple question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub name: String,
    pub data_type: DataType,
    pub min: Option<i64>,
    /// Declared maximum as written in the document.
    pub max: Option<i64>,
    /// Maximum response count after defaulting (categorical only).
    pub effective_max: Option<i64>,
    pub default_answer: Option<String>,
    pub expression: Option<String>,
    pub axis_expression: Option<String>,
    pub categories: Vec<CategoryEntry>,
    pub helpers: Vec<Variable>,
    /// "Other, specify" sub-variables hanging off categories.
    pub others: Vec<Variable>,
    pub labels: Labels,
    pub properties: Properties,
    pub has_case_data: bool,
    pub usage_type: i64,
    pub is_system: bool,
}

impl Variable {
    pub fn new(id: impl Into<String>, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data_type,
            min: None,
            max: None,
            effective_max: None,
            default_answer: None,
            expression: None,
            axis_expression: None,
            categories: Vec::new(),
            helpers: Vec::new(),
            others: Vec::new(),
            labels: Labels::new(),
            properties: Properties::default(),
            has_case_data: true,
            usage_type: 0,
            is_system: false,
        }
    }

    /// Compute the effective maximum from the resolved category counts.
    ///
    /// Without a declared maximum it is the number of categories minus the
    /// exclusive ones.
    pub fn resolve_effective_max(&mut self, category_count: usize, exclusive_count: usize) {
        if self.data_type != DataType::Categorical {
            self.effective_max = None;
            return;
        }
        let derived = category_count.saturating_sub(exclusive_count) as i64;
        self.effective_max = Some(self.max.unwrap_or(derived));
    }

    /// Maximum number of responses; 1 for non-categorical variables.
    pub fn max_responses(&self) -> i64 {
        match self.data_type {
            DataType::Categorical => self.effective_max.or(self.max).unwrap_or(1),
            _ => 1,
        }
    }

    pub fn is_single_response(&self) -> bool {
        self.data_type == DataType::Categorical && self.max_responses() == 1
    }

    pub fn is_multi_response(&self) -> bool {
        self.data_type == DataType::Categorical && self.max_responses() != 1
    }
}

/// A loop or grid: an iterated container with a nested class of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub kind: GroupKind,
    pub iterator: IteratorKind,
    pub categories: Vec<CategoryEntry>,
    pub range: Option<NumericRange>,
    pub fields: Vec<FieldNode>,
    pub helpers: Vec<Variable>,
    pub labels: Labels,
    pub properties: Properties,
    pub is_system: bool,
}

impl Group {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: GroupKind,
        iterator: IteratorKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            iterator,
            categories: Vec::new(),
            range: None,
            fields: Vec::new(),
            helpers: Vec::new(),
            labels: Labels::new(),
            properties: Properties::default(),
            is_system: false,
        }
    }
}

/// A named, non-iterated block of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: String,
    pub name: String,
    pub fields: Vec<FieldNode>,
    pub labels: Labels,
    pub properties: Properties,
    pub is_system: bool,
}

impl Class {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fields: Vec::new(),
            labels: Labels::new(),
            properties: Properties::default(),
            is_system: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldNode {
    Variable(Variable),
    Group(Group),
    Class(Class),
}

impl FieldNode {
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            FieldNode::Variable(variable) => Some(variable),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            FieldNode::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&Class> {
        match self {
            FieldNode::Class(class) => Some(class),
            _ => None,
        }
    }

    /// Nested fields of a group or class; empty for variables.
    pub fn children(&self) -> &[FieldNode] {
        match self {
            FieldNode::Variable(_) => &[],
            FieldNode::Group(group) => &group.fields,
            FieldNode::Class(class) => &class.fields,
        }
    }

    pub fn is_system(&self) -> bool {
        match self {
            FieldNode::Variable(variable) => variable.is_system,
            FieldNode::Group(group) => group.is_system,
            FieldNode::Class(class) => class.is_system,
        }
    }
}

macro_rules! impl_field {
    ($($ty:ty),*) => {
        $(impl Field for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn name(&self) -> &str {
                &self.name
            }
            fn labels(&self) -> &Labels {
                &self.labels
            }
            fn properties(&self) -> &Properties {
                &self.properties
            }
        })*
    };
}

impl_field!(Variable, Group, Class);

impl Field for FieldNode {
    fn id(&self) -> &str {
        match self {
            FieldNode::Variable(variable) => variable.id(),
            FieldNode::Group(group) => group.id(),
            FieldNode::Class(class) => class.id(),
        }
    }

    fn name(&self) -> &str {
        match self {
            FieldNode::Variable(variable) => variable.name(),
            FieldNode::Group(group) => group.name(),
            FieldNode::Class(class) => class.name(),
        }
    }

    fn labels(&self) -> &Labels {
        match self {
            FieldNode::Variable(variable) => variable.labels(),
            FieldNode::Group(group) => group.labels(),
            FieldNode::Class(class) => class.labels(),
        }
    }

    fn properties(&self) -> &Properties {
        match self {
            FieldNode::Variable(variable) => variable.properties(),
            FieldNode::Group(group) => group.properties(),
            FieldNode::Class(class) => class.properties(),
        }
    }
}
