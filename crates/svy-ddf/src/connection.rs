//! Provider connection descriptors.
//!
//! A descriptor bundles the open mode, metadata access levels, category
//! representation and overwrite behaviour of a schema/store pair. Every
//! setting is validated when the descriptor is built, before any file is
//! touched, and renders to the provider connection string.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

const PROVIDER: &str = "mrOleDB.Provider.2";
const DATA_SOURCE: &str = "mrDataFileDsc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Read,
    Write,
    #[default]
    ReadWrite,
}

impl Mode {
    pub fn code(self) -> u8 {
        match self {
            Mode::Read => 1,
            Mode::Write => 2,
            Mode::ReadWrite => 3,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(Mode::Read),
            2 => Ok(Mode::Write),
            3 => Ok(Mode::ReadWrite),
            other => Err(invalid("Mode", other)),
        }
    }
}

/// Access granted to the schema through the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    /// Changes are written back to the schema document.
    ReadWrite,
    /// Changes are kept in memory only.
    ReadWriteUnsaved,
}

impl Access {
    pub fn code(self) -> u8 {
        match self {
            Access::ReadOnly => 0,
            Access::ReadWrite => 1,
            Access::ReadWriteUnsaved => 2,
        }
    }

    fn from_code(field: &'static str, code: i64) -> Result<Self> {
        match code {
            0 => Ok(Access::ReadOnly),
            1 => Ok(Access::ReadWrite),
            2 => Ok(Access::ReadWriteUnsaved),
            other => Err(invalid(field, other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overwrite {
    /// Append to existing data.
    #[default]
    Append,
    /// Replace data and schema.
    ReplaceAll,
    /// Replace data, keep the schema.
    ReplaceData,
}

impl Overwrite {
    pub fn code(self) -> u8 {
        match self {
            Overwrite::Append => 0,
            Overwrite::ReplaceAll => 1,
            Overwrite::ReplaceData => 2,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Overwrite::Append),
            1 => Ok(Overwrite::ReplaceAll),
            2 => Ok(Overwrite::ReplaceData),
            other => Err(invalid("Overwrite", other)),
        }
    }
}

/// How categorical values are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryRepresentation {
    #[default]
    Names,
    Values,
}

fn invalid(field: &'static str, value: impl fmt::Display) -> StoreError {
    StoreError::InvalidConnection {
        field,
        value: value.to_string(),
    }
}

fn flag(field: &'static str, value: i64) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(invalid(field, other)),
    }
}

/// A validated connection to a schema/store pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub location: PathBuf,
    pub initial_catalog: PathBuf,
    pub mode: Mode,
    pub mdsc_access: Access,
    pub mdm_access: Access,
    pub categories: CategoryRepresentation,
    pub overwrite: Overwrite,
}

impl ConnectionDescriptor {
    pub fn builder(location: impl AsRef<Path>, initial_catalog: impl AsRef<Path>) -> ConnectionBuilder {
        ConnectionBuilder::new(location, initial_catalog)
    }

    /// Render the provider connection string.
    pub fn connection_string(&self) -> String {
        let names = u8::from(self.categories == CategoryRepresentation::Names);
        let values = u8::from(self.categories == CategoryRepresentation::Values);
        format!(
            "Provider = {PROVIDER}; Persist Security Info = False; Data Source = {DATA_SOURCE}; \
             Location = {}; Initial Catalog = {}; Mode = {}; MR Init MDSC Access = {}; \
             MR Init MDM Access = {}; MR Init Category Names = {names}; \
             MR Init Category Values = {values}; MR Init Overwrite = {}; \
             MR Init Allow Dirty = False; MR Init Validation = True",
            self.location.display(),
            self.initial_catalog.display(),
            self.mode.code(),
            self.mdsc_access.code(),
            self.mdm_access.code(),
            self.overwrite.code(),
        )
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connection_string())
    }
}

/// Builder accepting the raw numeric settings of a connection.
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    location: PathBuf,
    initial_catalog: PathBuf,
    mode: i64,
    mdsc_access: i64,
    mdm_access: i64,
    use_category_names: i64,
    use_category_values: i64,
    overwrite: i64,
}

impl ConnectionBuilder {
    pub fn new(location: impl AsRef<Path>, initial_catalog: impl AsRef<Path>) -> Self {
        Self {
            location: location.as_ref().to_path_buf(),
            initial_catalog: initial_catalog.as_ref().to_path_buf(),
            mode: 3,
            mdsc_access: 2,
            mdm_access: 0,
            use_category_names: 1,
            use_category_values: 0,
            overwrite: 0,
        }
    }

    pub fn mode(mut self, mode: i64) -> Self {
        self.mode = mode;
        self
    }

    pub fn mdsc_access(mut self, access: i64) -> Self {
        self.mdsc_access = access;
        self
    }

    pub fn mdm_access(mut self, access: i64) -> Self {
        self.mdm_access = access;
        self
    }

    pub fn use_category_names(mut self, flag: i64) -> Self {
        self.use_category_names = flag;
        self
    }

    pub fn use_category_values(mut self, flag: i64) -> Self {
        self.use_category_values = flag;
        self
    }

    pub fn overwrite(mut self, overwrite: i64) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn build(self) -> Result<ConnectionDescriptor> {
        let names = flag("MR Init Category Names", self.use_category_names)?;
        let values = flag("MR Init Category Values", self.use_category_values)?;
        let categories = match (names, values) {
            (true, false) => CategoryRepresentation::Names,
            (false, true) => CategoryRepresentation::Values,
            _ => {
                return Err(invalid(
                    "MR Init Category Names",
                    "category names and category values must differ",
                ));
            }
        };
        Ok(ConnectionDescriptor {
            location: self.location,
            initial_catalog: self.initial_catalog,
            mode: Mode::from_code(self.mode)?,
            mdsc_access: Access::from_code("MR Init MDSC Access", self.mdsc_access)?,
            mdm_access: Access::from_code("MR Init MDM Access", self.mdm_access)?,
            categories,
            overwrite: Overwrite::from_code(self.overwrite)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_provider_string() {
        let descriptor = ConnectionDescriptor::builder("data/w1.ddf", "data/w1.mdd")
            .build()
            .unwrap();
        insta::assert_snapshot!(
            descriptor.connection_string(),
            @"Provider = mrOleDB.Provider.2; Persist Security Info = False; Data Source = mrDataFileDsc; Location = data/w1.ddf; Initial Catalog = data/w1.mdd; Mode = 3; MR Init MDSC Access = 2; MR Init MDM Access = 0; MR Init Category Names = 1; MR Init Category Values = 0; MR Init Overwrite = 0; MR Init Allow Dirty = False; MR Init Validation = True"
        );
    }

    #[test]
    fn values_representation_flips_both_flags() {
        let descriptor = ConnectionDescriptor::builder("a.ddf", "a.mdd")
            .use_category_names(0)
            .use_category_values(1)
            .mode(1)
            .build()
            .unwrap();
        assert_eq!(descriptor.categories, CategoryRepresentation::Values);
        let rendered = descriptor.to_string();
        assert!(rendered.contains("Mode = 1;"));
        assert!(rendered.contains("MR Init Category Names = 0; MR Init Category Values = 1;"));
    }

    #[test]
    fn rejects_equal_category_flags() {
        for (names, values) in [(1, 1), (0, 0)] {
            let err = ConnectionDescriptor::builder("a.ddf", "a.mdd")
                .use_category_names(names)
                .use_category_values(values)
                .build()
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidConnection { .. }));
        }
    }

    #[test]
    fn rejects_out_of_range_codes() {
        let cases = [
            ConnectionDescriptor::builder("a.ddf", "a.mdd").mode(0),
            ConnectionDescriptor::builder("a.ddf", "a.mdd").mode(4),
            ConnectionDescriptor::builder("a.ddf", "a.mdd").mdsc_access(3),
            ConnectionDescriptor::builder("a.ddf", "a.mdd").mdm_access(-1),
            ConnectionDescriptor::builder("a.ddf", "a.mdd").overwrite(3),
            ConnectionDescriptor::builder("a.ddf", "a.mdd").use_category_names(2),
        ];
        for builder in cases {
            assert!(matches!(
                builder.build(),
                Err(StoreError::InvalidConnection { .. })
            ));
        }
    }
}
