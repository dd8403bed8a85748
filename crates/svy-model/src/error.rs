use thiserror::Error;

/// What kind of document reference failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `categoriesref` pointing at a shared category list.
    CategoryList,
    /// `helperfields/variable/@ref`.
    HelperField,
    /// `category/othervariable/@ref`.
    OtherVariable,
    /// `design/fields/variable/@ref` (or a system class member).
    DesignField,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::CategoryList => "category list",
            ReferenceKind::HelperField => "helper field",
            ReferenceKind::OtherVariable => "other-specify variable",
            ReferenceKind::DesignField => "design field",
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    /// A reference inside the schema document points at an id that does not exist.
    #[error("dangling {kind} reference `{reference}` in `{owner}`")]
    DanglingReference {
        kind: ReferenceKind,
        reference: String,
        owner: String,
    },
    /// Two children of the same container share a name.
    #[error("duplicate field `{name}` in `{container}`")]
    DuplicateName { container: String, name: String },
    /// The name does not match any enumerated variable instance.
    #[error("unknown variable `{name}`")]
    UnknownVariable { name: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
