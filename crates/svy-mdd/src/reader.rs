//! Schema document to [`Schema`].
//!
//! Variables are defined once under `definition` and placed by reference
//! under `design/fields`; loops, grids and classes are defined inline in
//! the design tree. Shared category lists live under `definition/categories`
//! and are referenced through `categoriesref`.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use svy_model::{
    Category, CategoryEntry, CategoryList, CategoryMap, Class, Contexts, DataSource, DataSources,
    DataType, Field, FieldNode, Group, GroupKind, IteratorKind, Labels, Language, Languages, ModelError,
    NumericRange, Properties, Property, ReferenceKind, Schema, TypeArena, Variable,
};
use tracing::{debug, info};

use crate::error::{MddError, Result};
use crate::save::read_text;
use crate::xml::{XmlElement, parse_document};

/// Read and resolve a schema document from disk.
pub fn read_schema(path: &Path) -> Result<Schema> {
    let text = read_text(path)?;
    let schema = parse_schema(&text)?;
    info!(
        path = %path.display(),
        fields = schema.fields.len(),
        types = schema.types.len(),
        "loaded schema document"
    );
    Ok(schema)
}

/// Resolve a schema from document text.
pub fn parse_schema(text: &str) -> Result<Schema> {
    let root = parse_document(text)?;
    let metadata = root.find("metadata").ok_or_else(|| MddError::MissingElement {
        element: "metadata",
        parent: root.name.clone(),
    })?;
    SchemaReader::new(metadata)?.read()
}

struct SchemaReader<'x> {
    metadata: &'x XmlElement,
    category_map: CategoryMap,
    types: TypeArena,
    variables: HashMap<&'x str, &'x XmlElement>,
    others: HashMap<&'x str, &'x XmlElement>,
    /// Ids of variables currently being built, to stop helper cycles.
    building: HashSet<String>,
}

impl<'x> SchemaReader<'x> {
    fn new(metadata: &'x XmlElement) -> Result<Self> {
        let mut variables = HashMap::new();
        let mut others = HashMap::new();
        if let Some(definition) = metadata.child("definition") {
            for element in &definition.children {
                let Some(id) = element.attr("id") else {
                    continue;
                };
                match element.name.as_str() {
                    "variable" => {
                        variables.insert(id, element);
                    }
                    "othervariable" => {
                        others.insert(id, element);
                    }
                    _ => {}
                }
            }
        }
        Ok(Self {
            metadata,
            category_map: read_category_map(metadata)?,
            types: TypeArena::default(),
            variables,
            others,
            building: HashSet::new(),
        })
    }

    fn read(mut self) -> Result<Schema> {
        let languages = read_languages(self.metadata);
        let contexts = read_contexts(self.metadata);
        let datasources = read_datasources(self.metadata);
        self.read_shared_lists()?;

        let mut fields = Vec::new();
        if let Some(system) = self.metadata.child("system") {
            for class in system.children_named("class") {
                fields.push(FieldNode::Class(self.read_class(class, true)?));
            }
        }
        let design = self
            .metadata
            .child("design")
            .ok_or_else(|| MddError::MissingElement {
                element: "design",
                parent: self.metadata.name.clone(),
            })?;
        if let Some(design_fields) = design.child("fields") {
            fields.extend(self.read_fields(design_fields, false)?);
        }
        ensure_unique("(root)", &fields)?;

        Ok(Schema {
            languages,
            contexts,
            category_map: self.category_map,
            types: self.types,
            fields,
            datasources,
        })
    }

    /// Register every shared list first so lists may reference one another.
    fn read_shared_lists(&mut self) -> Result<()> {
        let Some(definition) = self.metadata.child("definition") else {
            return Ok(());
        };
        let lists: Vec<&XmlElement> = definition.children_named("categories").collect();
        let mut ids = Vec::with_capacity(lists.len());
        for element in &lists {
            let id = self.types.insert(CategoryList {
                id: element.require_attr("id")?.to_string(),
                name: element.require_attr("name")?.to_string(),
                labels: read_labels(element),
                properties: read_properties(element),
                entries: Vec::new(),
            });
            ids.push(id);
        }
        for (element, id) in lists.into_iter().zip(ids) {
            let mut others = Vec::new();
            let entries = self.read_category_block(element, &mut others)?;
            if let Some(list) = self.types.get_mut(id) {
                list.entries = entries;
            }
        }
        debug!(count = self.types.len(), "registered shared category lists");
        Ok(())
    }

    /// Children of a `fields` element, in document order.
    fn read_fields(&mut self, fields: &'x XmlElement, is_system: bool) -> Result<Vec<FieldNode>> {
        let mut nodes = Vec::new();
        for element in &fields.children {
            match element.name.as_str() {
                "variable" => {
                    let reference = element.require_attr("ref")?;
                    let definition = self.variables.get(reference).copied().ok_or_else(|| {
                        ModelError::DanglingReference {
                            kind: ReferenceKind::DesignField,
                            reference: reference.to_string(),
                            owner: fields.describe(),
                        }
                    })?;
                    nodes.push(FieldNode::Variable(self.read_variable(definition, is_system)?));
                }
                "loop" | "grid" => nodes.push(FieldNode::Group(self.read_group(element, is_system)?)),
                "class" => nodes.push(FieldNode::Class(self.read_class(element, is_system)?)),
                other => debug!(element = other, "skipping design element"),
            }
        }
        Ok(nodes)
    }

    fn read_class(&mut self, element: &'x XmlElement, is_system: bool) -> Result<Class> {
        let mut class = Class::new(
            element.attr("id").unwrap_or_default(),
            element.require_attr("name")?,
        );
        class.is_system = is_system;
        class.labels = read_labels(element);
        class.properties = read_properties(element);
        if let Some(fields) = element.child("fields") {
            class.fields = self.read_fields(fields, is_system)?;
        }
        ensure_unique(&class.name, &class.fields)?;
        Ok(class)
    }

    fn read_group(&mut self, element: &'x XmlElement, is_system: bool) -> Result<Group> {
        let name = element.require_attr("name")?;
        let has_ranges = element.child("ranges").is_some();
        let iterator = match element.attr("iteratortype").and_then(IteratorKind::from_code) {
            Some(kind) => kind,
            None if has_ranges => IteratorKind::Numeric,
            None => IteratorKind::Categorical,
        };
        let kind = if element.name == "grid" || element.flag("isgrid") {
            GroupKind::Grid
        } else {
            GroupKind::Loop
        };
        let mut group = Group::new(element.attr("id").unwrap_or_default(), name, kind, iterator);
        group.is_system = is_system;
        group.labels = read_labels(element);
        group.properties = read_properties(element);

        if let Some(block) = element.child("categories") {
            let mut others = Vec::new();
            group.categories = self.read_category_block(block, &mut others)?;
        }
        if let Some(range) = element.child("ranges").and_then(|ranges| ranges.child("range")) {
            group.range = Some(NumericRange {
                lower: range.int_attr("lowerbound")?.unwrap_or(0),
                upper: range.int_attr("upperbound")?.unwrap_or(0),
            });
        }
        group.helpers = self.read_helpers(element, name, is_system)?;
        if let Some(fields) = element.child("class").and_then(|class| class.child("fields")) {
            group.fields = self.read_fields(fields, is_system)?;
        }
        ensure_unique(name, &group.fields)?;
        Ok(group)
    }

    fn read_variable(&mut self, element: &'x XmlElement, is_system: bool) -> Result<Variable> {
        let id = element.require_attr("id")?;
        let name = element.require_attr("name")?;
        let type_code = element.int_attr("type")?.unwrap_or(0);
        let data_type = DataType::from_code(type_code).ok_or_else(|| MddError::InvalidAttribute {
            attribute: "type",
            element: element.describe(),
            value: type_code.to_string(),
        })?;

        let mut variable = Variable::new(id, name, data_type);
        variable.is_system = is_system;
        variable.min = element.int_attr("min")?;
        variable.max = element.int_attr("max")?;
        variable.usage_type = element.int_attr("usagetype")?.unwrap_or(0);
        variable.default_answer = element.attr("defaultanswer").map(str::to_string);
        variable.expression = element.attr("expression").map(str::to_string);
        variable.has_case_data = element.attr("no-casedata") != Some("-1");
        variable.axis_expression = element
            .child("axis")
            .and_then(|axis| axis.attr("expression"))
            .map(str::to_string);
        variable.labels = read_labels(element);
        variable.properties = read_properties(element);

        self.building.insert(id.to_string());
        let mut other_refs = Vec::new();
        if let Some(block) = element.child("categories") {
            variable.categories = self.read_category_block(block, &mut other_refs)?;
        }
        variable.helpers = self.read_helpers(element, name, is_system)?;
        for reference in other_refs {
            let definition = self.others.get(reference.as_str()).copied().ok_or_else(|| {
                ModelError::DanglingReference {
                    kind: ReferenceKind::OtherVariable,
                    reference: reference.clone(),
                    owner: name.to_string(),
                }
            })?;
            variable.others.push(self.read_variable(definition, is_system)?);
        }
        self.building.remove(id);

        if data_type == DataType::Categorical {
            let categories = self.types.flatten(&variable.categories);
            let exclusive = categories.iter().filter(|category| category.exclusive).count();
            let total = categories.len();
            variable.resolve_effective_max(total, exclusive);
        }
        Ok(variable)
    }

    fn read_helpers(
        &mut self,
        element: &'x XmlElement,
        owner: &str,
        is_system: bool,
    ) -> Result<Vec<Variable>> {
        let mut helpers = Vec::new();
        for block in element.children_named("helperfields") {
            for reference in block.children_named("variable") {
                let reference = reference.require_attr("ref")?;
                if self.building.contains(reference) {
                    debug!(owner, reference, "skipping recursive helper field");
                    continue;
                }
                let definition = self.variables.get(reference).copied().ok_or_else(|| {
                    ModelError::DanglingReference {
                        kind: ReferenceKind::HelperField,
                        reference: reference.to_string(),
                        owner: owner.to_string(),
                    }
                })?;
                helpers.push(self.read_variable(definition, is_system)?);
            }
        }
        let container = format!("{owner} helper fields");
        let mut seen = HashSet::new();
        for helper in &helpers {
            if !seen.insert(helper.name.to_lowercase()) {
                return Err(ModelError::DuplicateName {
                    container,
                    name: helper.name.clone(),
                }
                .into());
            }
        }
        Ok(helpers)
    }

    /// Entries of a `categories` element. Collects other-specify references.
    fn read_category_block(
        &self,
        block: &XmlElement,
        other_refs: &mut Vec<String>,
    ) -> Result<Vec<CategoryEntry>> {
        if let Some(reference) = block.attr("categoriesref") {
            return Ok(vec![self.shared_entry(block, reference)?]);
        }
        let mut entries = Vec::new();
        for child in &block.children {
            match child.name.as_str() {
                "category" => entries.push(CategoryEntry::Category(
                    self.read_category(child, other_refs)?,
                )),
                "categories" => match child.attr("categoriesref") {
                    Some(reference) => entries.push(self.shared_entry(child, reference)?),
                    None => entries.push(CategoryEntry::List {
                        name: child.attr("name").unwrap_or_default().to_string(),
                        labels: read_labels(child),
                        entries: self.read_category_block(child, other_refs)?,
                    }),
                },
                _ => {}
            }
        }
        Ok(entries)
    }

    fn shared_entry(&self, element: &XmlElement, reference: &str) -> Result<CategoryEntry> {
        let list = self
            .types
            .find_by_id(reference)
            .ok_or_else(|| ModelError::DanglingReference {
                kind: ReferenceKind::CategoryList,
                reference: reference.to_string(),
                owner: element.describe(),
            })?;
        let name = element
            .attr("name")
            .map(str::to_string)
            .or_else(|| self.types.get(list).map(|shared| shared.name.clone()))
            .unwrap_or_default();
        Ok(CategoryEntry::Shared { name, list })
    }

    fn read_category(&self, element: &XmlElement, other_refs: &mut Vec<String>) -> Result<Category> {
        let name = element.require_attr("name")?;
        let value = self.category_map.value_of(name).unwrap_or(-1);
        let mut category = Category::new(name, value);
        category.id = element.attr("id").unwrap_or(name).to_string();
        category.fixed = element.flag("fixed");
        category.exclusive = element.flag("exclusive");
        category.factor = element.attr("factor-value").map(str::to_string);
        category.labels = read_labels(element);
        category.properties = read_properties(element);
        if let Some(reference) = element.child("othervariable").and_then(|o| o.attr("ref")) {
            category.other_variable = Some(reference.to_string());
            other_refs.push(reference.to_string());
        }
        Ok(category)
    }
}

fn ensure_unique(container: &str, nodes: &[FieldNode]) -> Result<()> {
    let mut seen = HashSet::new();
    for node in nodes {
        if !seen.insert(node.name().to_lowercase()) {
            return Err(ModelError::DuplicateName {
                container: container.to_string(),
                name: node.name().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn read_category_map(metadata: &XmlElement) -> Result<CategoryMap> {
    let mut map = CategoryMap::default();
    if let Some(section) = metadata.child("categorymap") {
        for entry in section.children_named("categoryid") {
            let name = entry.require_attr("name")?;
            let value = entry
                .int_attr("value")?
                .ok_or_else(|| MddError::MissingAttribute {
                    attribute: "value",
                    element: entry.describe(),
                })?;
            map.insert(name, value);
        }
    }
    Ok(map)
}

fn read_languages(metadata: &XmlElement) -> Languages {
    let Some(section) = metadata.child("languages") else {
        return Languages::default();
    };
    let items = section
        .children_named("language")
        .filter_map(|language| {
            let name = language.attr("name")?;
            let alternatives = language
                .child("alternatives")
                .map(|alternatives| {
                    alternatives
                        .children_named("alternative")
                        .filter_map(|alt| alt.attr("name").map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            Some(Language {
                name: name.to_string(),
                alternatives,
            })
        })
        .collect::<Vec<_>>();
    let base = section
        .attr("base")
        .map(str::to_string)
        .or_else(|| items.first().map(|language| language.name.clone()))
        .unwrap_or_default();
    Languages { base, items }
}

fn read_contexts(metadata: &XmlElement) -> Contexts {
    let Some(section) = metadata.child("contexts") else {
        return Contexts::default();
    };
    let items: Vec<String> = section
        .children_named("context")
        .filter_map(|context| context.attr("name").map(str::to_string))
        .collect();
    let base = section
        .attr("base")
        .map(str::to_string)
        .or_else(|| items.first().cloned())
        .unwrap_or_default();
    Contexts { base, items }
}

fn read_datasources(metadata: &XmlElement) -> DataSources {
    let Some(section) = metadata.child("datasources") else {
        return DataSources::default();
    };
    DataSources {
        default: section.attr("default").map(str::to_string),
        items: section
            .children_named("connection")
            .map(|connection| DataSource {
                name: connection.attr("name").unwrap_or_default().to_string(),
                location: connection.attr("dblocation").unwrap_or_default().to_string(),
                dsc_name: connection.attr("cdscname").unwrap_or_default().to_string(),
                project: connection.attr("project").unwrap_or_default().to_string(),
            })
            .collect(),
    }
}

fn read_labels(element: &XmlElement) -> Labels {
    let mut labels = Labels::new();
    for block in element.children_named("labels") {
        for text in block.children_named("text") {
            let language = text.attr("xml:lang").unwrap_or_default();
            let context = text.attr("context").unwrap_or_default();
            labels.set(language, context, text.text.clone());
        }
    }
    labels
}

fn read_properties(element: &XmlElement) -> Properties {
    element
        .children_named("properties")
        .flat_map(|block| block.children_named("property"))
        .filter_map(|property| {
            Some(Property {
                name: property.attr("name")?.to_string(),
                value: property.attr("value")?.to_string(),
                data_type: property.attr("type").map(str::to_string),
                context: property.attr("context").map(str::to_string),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<xml><mdm:metadata xmlns:mdm="urn:mdm">
  <datasources default="mrDataFileDsc">
    <connection name="mrDataFileDsc" dblocation="survey.ddf" cdscname="mrDataFileDsc" project="p"/>
  </datasources>
  <definition>
    <variable id="v1" name="Q1" type="3" max="1">
      <categories>
        <category id="c1" name="yes"><labels><text xml:lang="en-US" context="QUESTION">Yes</text></labels></category>
        <category id="c2" name="no"/>
      </categories>
    </variable>
    <variable id="v2" name="Q2" type="3">
      <categories>
        <category id="c3" name="red"/>
        <category id="c4" name="blue"/>
        <category id="c5" name="none" exclusive="-1"/>
      </categories>
    </variable>
  </definition>
  <design><fields>
    <variable id="_v2" name="Q2" ref="v2"/>
    <variable id="_v1" name="Q1" ref="v1"/>
  </fields></design>
  <languages base="ENU"><language name="ENU"/></languages>
  <contexts base="Question"><context name="Question"/></contexts>
  <categorymap>
    <categoryid name="yes" value="1"/><categoryid name="no" value="2"/>
    <categoryid name="red" value="3"/><categoryid name="blue" value="4"/>
  </categorymap>
</mdm:metadata></xml>"#;

    #[test]
    fn design_order_wins_over_definition_order() {
        let schema = parse_schema(DOC).unwrap();
        let names: Vec<&str> = schema
            .fields
            .iter()
            .map(|node| match node {
                FieldNode::Variable(v) => v.name.as_str(),
                _ => "?",
            })
            .collect();
        assert_eq!(names, ["Q2", "Q1"]);
    }

    #[test]
    fn effective_max_excludes_exclusive_categories() {
        let schema = parse_schema(DOC).unwrap();
        let q2 = schema.variable("Q2").unwrap();
        assert_eq!(q2.effective_max, Some(2));
        assert!(q2.is_multi_response());
        assert!(schema.variable("Q1").unwrap().is_single_response());
    }

    #[test]
    fn unmapped_category_gets_sentinel_value() {
        let schema = parse_schema(DOC).unwrap();
        let q2 = schema.variable("Q2").unwrap();
        let values: Vec<i64> = schema
            .categories(&q2.categories)
            .into_iter()
            .map(|category| category.value)
            .collect();
        assert_eq!(values, [3, 4, -1]);
    }

    #[test]
    fn dangling_design_reference_fails() {
        let broken = DOC.replace(r#"ref="v1""#, r#"ref="missing""#);
        let err = parse_schema(&broken).unwrap_err();
        assert!(matches!(
            err,
            MddError::Model(ModelError::DanglingReference {
                kind: ReferenceKind::DesignField,
                ..
            })
        ));
    }

    #[test]
    fn datasource_and_locale_are_read() {
        let schema = parse_schema(DOC).unwrap();
        let source = schema.datasources.current().unwrap();
        assert_eq!(source.location, "survey.ddf");
        let base = schema.base_locale();
        assert_eq!(base.language, "ENU");
        assert_eq!(base.context, "QUESTION");
    }
}
