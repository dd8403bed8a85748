use serde::{Deserialize, Serialize};

/// Custom property attached to a schema object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub data_type: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    items: Vec<Property>,
}

impl Properties {
    pub fn push(&mut self, property: Property) {
        self.items.push(property);
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.items
            .iter()
            .find(|property| property.name.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// True when the property exists and its value is not empty, `0` or `false`.
    pub fn is_truthy(&self, name: &str) -> bool {
        self.get(name).is_some_and(|property| {
            let value = property.value.trim();
            !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Property> for Properties {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
