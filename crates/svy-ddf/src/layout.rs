//! Physical table layout of a case-data store.
//!
//! Respondent-level fields live in `L1`. Every group gets its own table,
//! numbered depth-first in declared order. A group table at depth `d` keys
//! its rows with `[:P0]` (the row's own iteration key) followed by the
//! ancestor keys `[:P1]..[:P{d}]`, where `[:P{d}]` is the respondent key.

use serde::{Deserialize, Serialize};
use svy_model::{DataType, FieldNode, Group, IteratorKind, Schema, Variable};

/// Table holding one row per respondent.
pub const ROOT_TABLE: &str = "L1";
/// Table recording the parent of every level table.
pub const LEVELS_TABLE: &str = "Levels";
/// Tables describing the store rather than holding case data.
pub const METADATA_TABLES: [&str; 3] = ["DataVersion", "Levels", "SchemaVersion"];
/// Metadata tables whose content must agree before stores can be merged.
pub const MATCHED_METADATA_TABLES: [&str; 1] = [LEVELS_TABLE];
/// Index built on the respondent serial of every written store.
pub const SERIAL_INDEX: &str = "Respondent_Serial_idx";
/// Root column the serial index covers.
pub const SERIAL_COLUMN: &str = "Respondent.Serial:L";

pub fn is_metadata_table(name: &str) -> bool {
    METADATA_TABLES
        .iter()
        .any(|table| table.eq_ignore_ascii_case(name))
}

/// Name of positional key column `index`.
pub fn key_column(index: usize) -> String {
    format!(":P{index}")
}

/// Quote an identifier for SQLite.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Storage tag appended to a column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnTag {
    /// Single-response categorical.
    C1,
    /// Multi-response categorical.
    S,
    /// Text.
    X,
    /// Date.
    T,
    /// Long.
    L,
    /// Double.
    D,
    /// Boolean.
    B,
}

impl ColumnTag {
    pub fn for_variable(data_type: DataType, max_responses: i64) -> Option<Self> {
        match data_type {
            DataType::Categorical if max_responses == 1 => Some(ColumnTag::C1),
            DataType::Categorical => Some(ColumnTag::S),
            DataType::Text => Some(ColumnTag::X),
            DataType::Date => Some(ColumnTag::T),
            DataType::Long => Some(ColumnTag::L),
            DataType::Double => Some(ColumnTag::D),
            DataType::Boolean => Some(ColumnTag::B),
            DataType::Info | DataType::Object | DataType::Level => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnTag::C1 => "C1",
            ColumnTag::S => "S",
            ColumnTag::X => "X",
            ColumnTag::T => "T",
            ColumnTag::L => "L",
            ColumnTag::D => "D",
            ColumnTag::B => "B",
        }
    }

    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnTag::C1 | ColumnTag::L | ColumnTag::B => "INTEGER",
            ColumnTag::S | ColumnTag::X => "TEXT",
            ColumnTag::T | ColumnTag::D => "REAL",
        }
    }

    /// Split `Q1.Codes:X` into its local name and tag.
    pub fn split_column(column: &str) -> Option<(&str, ColumnTag)> {
        let (local, tag) = column.rsplit_once(':')?;
        let tag = match tag {
            "C1" => ColumnTag::C1,
            "S" => ColumnTag::S,
            "X" => ColumnTag::X,
            "T" => ColumnTag::T,
            "L" => ColumnTag::L,
            "D" => ColumnTag::D,
            "B" => ColumnTag::B,
            _ => return None,
        };
        Some((local, tag))
    }
}

/// A data column of a level table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Name relative to the table's group, e.g. `Q1.Codes`.
    pub local_name: String,
    pub tag: ColumnTag,
}

impl ColumnSpec {
    pub fn column_name(&self) -> String {
        format!("{}:{}", self.local_name, self.tag.as_str())
    }
}

/// One level table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTable {
    pub name: String,
    /// Parent table; the root is its own parent.
    pub parent: String,
    /// Group path relative to the parent level; empty for the root.
    pub dsc_name: String,
    /// Generic path of the group, `None` for the root.
    pub group: Option<String>,
    pub depth: usize,
    pub iterator: Option<IteratorKind>,
    pub columns: Vec<ColumnSpec>,
}

impl LevelTable {
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    /// Column holding the respondent key.
    pub fn respondent_key(&self) -> String {
        key_column(self.depth)
    }

    pub fn key_columns(&self) -> Vec<String> {
        (0..=self.depth).map(key_column).collect()
    }

    /// Column naming the category or index a group row instantiates.
    pub fn level_id_column(&self) -> Option<&'static str> {
        match self.iterator {
            Some(IteratorKind::Categorical) => Some("LevelId:C1"),
            Some(IteratorKind::Numeric) => Some("LevelId:L"),
            None => None,
        }
    }

    pub fn column(&self, local_name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|column| column.local_name.eq_ignore_ascii_case(local_name))
    }

    pub fn create_sql(&self) -> String {
        let mut columns: Vec<String> = self
            .key_columns()
            .iter()
            .map(|key| format!("{} INTEGER NOT NULL", quote(key)))
            .collect();
        if let Some(level_id) = self.level_id_column() {
            columns.push(format!("{} INTEGER", quote(level_id)));
        }
        for column in &self.columns {
            columns.push(format!(
                "{} {}",
                quote(&column.column_name()),
                column.tag.sql_type()
            ));
        }
        let keys = self
            .key_columns()
            .iter()
            .map(|key| quote(key))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE {} ({}, PRIMARY KEY ({keys}))",
            quote(&self.name),
            columns.join(", ")
        )
    }
}

/// All level tables derived from a schema, root first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLayout {
    pub tables: Vec<LevelTable>,
}

impl StoreLayout {
    pub fn from_schema(schema: &Schema) -> Self {
        let mut builder = LayoutBuilder {
            tables: vec![LevelTable {
                name: ROOT_TABLE.to_string(),
                parent: ROOT_TABLE.to_string(),
                dsc_name: String::new(),
                group: None,
                depth: 0,
                iterator: None,
                columns: Vec::new(),
            }],
        };
        builder.walk(&schema.fields, 0, "", "");
        StoreLayout {
            tables: builder.tables,
        }
    }

    pub fn root(&self) -> &LevelTable {
        &self.tables[0]
    }

    pub fn table(&self, name: &str) -> Option<&LevelTable> {
        self.tables
            .iter()
            .find(|table| table.name.eq_ignore_ascii_case(name))
    }

    /// Table of a group, by generic path (`Outer[..].Inner`).
    pub fn table_for_group(&self, group: &str) -> Option<&LevelTable> {
        self.tables.iter().find(|table| {
            table
                .group
                .as_deref()
                .is_some_and(|path| path.eq_ignore_ascii_case(group))
        })
    }

    /// Table holding fields at a level, `None` being the root.
    pub fn table_for_level(&self, level: Option<&str>) -> Option<&LevelTable> {
        match level {
            None => Some(self.root()),
            Some(group) => self.table_for_group(group),
        }
    }

    /// Rows of the `Levels` metadata table.
    pub fn level_rows(&self) -> Vec<LevelRow> {
        self.tables
            .iter()
            .map(|table| LevelRow {
                table_name: table.name.clone(),
                parent_name: table.parent.clone(),
                dsc_table_name: table.dsc_name.clone(),
            })
            .collect()
    }
}

/// One row of the `Levels` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRow {
    pub table_name: String,
    pub parent_name: String,
    pub dsc_table_name: String,
}

struct LayoutBuilder {
    tables: Vec<LevelTable>,
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

impl LayoutBuilder {
    /// `generic` is the generic path of the current position, `local` the
    /// same path relative to the current table.
    fn walk(&mut self, nodes: &[FieldNode], table: usize, generic: &str, local: &str) {
        for node in nodes {
            match node {
                FieldNode::Variable(variable) => {
                    let name = join_path(local, &variable.name);
                    self.add_variable(table, &name, variable);
                    for nested in variable.helpers.iter().chain(&variable.others) {
                        self.add_variable(table, &join_path(&name, &nested.name), nested);
                    }
                }
                FieldNode::Class(class) => {
                    self.walk(
                        &class.fields,
                        table,
                        &join_path(generic, &class.name),
                        &join_path(local, &class.name),
                    );
                }
                FieldNode::Group(group) => {
                    let name = join_path(local, &group.name);
                    for helper in &group.helpers {
                        self.add_variable(table, &join_path(&name, &helper.name), helper);
                    }
                    self.add_group(group, table, generic, local);
                }
            }
        }
    }

    fn add_group(&mut self, group: &Group, parent: usize, generic: &str, local: &str) {
        let path = join_path(generic, &group.name);
        let index = self.tables.len();
        let table = LevelTable {
            name: format!("L{}", index + 1),
            parent: self.tables[parent].name.clone(),
            dsc_name: join_path(local, &group.name),
            group: Some(path.clone()),
            depth: self.tables[parent].depth + 1,
            iterator: Some(group.iterator),
            columns: Vec::new(),
        };
        self.tables.push(table);
        self.walk(&group.fields, index, &format!("{path}[..]"), "");
    }

    fn add_variable(&mut self, table: usize, local_name: &str, variable: &Variable) {
        if !variable.has_case_data {
            return;
        }
        let Some(tag) = ColumnTag::for_variable(variable.data_type, variable.max_responses()) else {
            return;
        };
        let columns = &mut self.tables[table].columns;
        if columns
            .iter()
            .any(|column| column.local_name.eq_ignore_ascii_case(local_name))
        {
            return;
        }
        columns.push(ColumnSpec {
            local_name: local_name.to_string(),
            tag,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svy_model::{Category, CategoryEntry, Class, GroupKind, NumericRange};

    fn schema() -> Schema {
        let mut schema = Schema::default();
        let mut q1 = Variable::new("v1", "Q1", DataType::Categorical);
        q1.categories = vec![
            CategoryEntry::Category(Category::new("yes", 1)),
            CategoryEntry::Category(Category::new("no", 2)),
        ];
        q1.max = Some(1);
        q1.helpers.push(Variable::new("h1", "Codes", DataType::Text));

        let mut block = Class::new("c1", "Block");
        block
            .fields
            .push(FieldNode::Variable(Variable::new("v2", "When", DataType::Date)));

        let mut inner = Group::new("g2", "Inner", GroupKind::Loop, IteratorKind::Categorical);
        inner.categories = vec![CategoryEntry::Category(Category::new("red", 3))];
        inner
            .fields
            .push(FieldNode::Variable(Variable::new("v3", "Score", DataType::Long)));
        inner.helpers.push(Variable::new("h2", "Comment", DataType::Text));
        let mut outer = Group::new("g1", "Outer", GroupKind::Loop, IteratorKind::Numeric);
        outer.range = Some(NumericRange { lower: 1, upper: 2 });
        outer.fields.push(FieldNode::Group(inner));

        schema.fields = vec![
            FieldNode::Variable(q1),
            FieldNode::Class(block),
            FieldNode::Group(outer),
        ];
        schema
    }

    #[test]
    fn builds_tables_depth_first() {
        let layout = StoreLayout::from_schema(&schema());
        let names: Vec<_> = layout.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["L1", "L2", "L3"]);

        let root = layout.root();
        let columns: Vec<_> = root.columns.iter().map(ColumnSpec::column_name).collect();
        assert_eq!(columns, ["Q1:C1", "Q1.Codes:X", "Block.When:T"]);

        let inner = layout.table_for_group("Outer[..].Inner").unwrap();
        assert_eq!(inner.name, "L3");
        assert_eq!(inner.parent, "L2");
        assert_eq!(inner.dsc_name, "Inner");
        assert_eq!(inner.depth, 2);
        assert_eq!(inner.respondent_key(), ":P2");
        assert_eq!(inner.level_id_column(), Some("LevelId:C1"));

        let outer = layout.table("L2").unwrap();
        let columns: Vec<_> = outer.columns.iter().map(ColumnSpec::column_name).collect();
        assert_eq!(columns, ["Inner.Comment:X"]);
    }

    #[test]
    fn create_sql_lists_keys_first() {
        let layout = StoreLayout::from_schema(&schema());
        let outer = layout.table("L2").unwrap();
        insta::assert_snapshot!(
            outer.create_sql(),
            @r#"CREATE TABLE "L2" (":P0" INTEGER NOT NULL, ":P1" INTEGER NOT NULL, "LevelId:L" INTEGER, "Inner.Comment:X" TEXT, PRIMARY KEY (":P0", ":P1"))"#
        );
    }

    #[test]
    fn column_tags_round_trip() {
        assert_eq!(
            ColumnTag::split_column("Q1.Codes:X"),
            Some(("Q1.Codes", ColumnTag::X))
        );
        assert_eq!(ColumnTag::split_column("LevelId"), None);
        assert_eq!(
            ColumnTag::for_variable(DataType::Categorical, 3),
            Some(ColumnTag::S)
        );
        assert_eq!(ColumnTag::for_variable(DataType::Info, 1), None);
    }
}
