//! Minimal element tree over quick-xml events.

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};

use crate::error::{MddError, Result};

/// An element with its attributes, child elements and concatenated text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Local name (namespace prefix removed).
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    /// Attribute value by qualified name (`name`, `xml:lang`).
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn require_attr(&self, key: &'static str) -> Result<&str> {
        self.attr(key).ok_or_else(|| MddError::MissingAttribute {
            attribute: key,
            element: self.describe(),
        })
    }

    /// MDM flags are written as `-1` (true) or `0`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.attr(key), Some("-1" | "1" | "true"))
    }

    pub fn int_attr(&self, key: &'static str) -> Result<Option<i64>> {
        match self.attr(key) {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| MddError::InvalidAttribute {
                    attribute: key,
                    element: self.describe(),
                    value: raw.to_string(),
                }),
        }
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Depth-first search for the first descendant with this name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    /// `name` plus the `name` attribute, for diagnostics.
    pub fn describe(&self) -> String {
        match self.attr("name") {
            Some(name) => format!("{} '{name}'", self.name),
            None => self.name.clone(),
        }
    }
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn open_element(start: &BytesStart<'_>, position: u64) -> Result<XmlElement> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MddError::xml(position, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| MddError::xml(position, e))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name: local_name(start.name().as_ref()),
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

/// Parse a document into its root element.
pub fn parse_document(text: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| MddError::xml(reader.error_position(), e))?;
        match event {
            Event::Start(start) => stack.push(open_element(&start, position)?),
            Event::Empty(start) => {
                let element = open_element(&start, position)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| MddError::xml(position, "unbalanced end tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let decoded = text.decode().map_err(|e| MddError::xml(position, e))?;
                    current.text.push_str(&decoded);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::GeneralRef(reference) => {
                if let Some(current) = stack.last_mut() {
                    if let Some(ch) = reference
                        .resolve_char_ref()
                        .map_err(|e| MddError::xml(position, e))?
                    {
                        current.text.push(ch);
                    } else {
                        let name = reference.decode().map_err(|e| MddError::xml(position, e))?;
                        let resolved = resolve_predefined_entity(&name).ok_or_else(|| {
                            MddError::xml(position, format!("unknown entity `&{name};`"))
                        })?;
                        current.text.push_str(resolved);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(MddError::xml(
            reader.buffer_position(),
            "unexpected end of document",
        ));
    }
    root.ok_or_else(|| MddError::xml(0, "document has no root element"))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tree_with_local_names() {
        let root = parse_document(
            r#"<?xml version="1.0"?>
<xml><mdm:metadata xmlns:mdm="urn:x"><labels><text xml:lang="en-US" context="QUESTION">Tom &amp; Jerry&#33;</text></labels><variable id="a" name="Q1"/></mdm:metadata></xml>"#,
        )
        .unwrap();
        let metadata = root.find("metadata").unwrap();
        let text = metadata.child("labels").unwrap().child("text").unwrap();
        assert_eq!(text.attr("xml:lang"), Some("en-US"));
        assert_eq!(text.text, "Tom & Jerry!");
        assert_eq!(metadata.child("variable").unwrap().describe(), "variable 'Q1'");
    }

    #[test]
    fn reports_malformed_documents() {
        let err = parse_document("<a><b></a>").unwrap_err();
        assert!(matches!(err, MddError::Xml { .. }));
    }

    #[test]
    fn int_attr_rejects_garbage() {
        let root = parse_document(r#"<variable name="Q" max="x"/>"#).unwrap();
        assert!(matches!(
            root.int_attr("max"),
            Err(MddError::InvalidAttribute { attribute: "max", .. })
        ));
        assert_eq!(root.int_attr("min").unwrap(), None);
    }
}
