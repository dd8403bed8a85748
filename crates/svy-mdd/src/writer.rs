//! In-place edits of schema documents.
//!
//! Edits stream the document through quick-xml, copying every event and
//! rewriting only the elements they touch, so the rest of the document is
//! preserved byte for byte.

use std::io::Cursor;
use std::path::Path;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{MddError, Result};
use crate::save::{read_text, write_atomic};

/// Data source name of the case-data file provider.
pub const DATA_FILE_DSC: &str = "mrDataFileDsc";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn new_writer() -> XmlWriter {
    Writer::new(Cursor::new(Vec::new()))
}

fn finish(writer: XmlWriter) -> Result<String> {
    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| MddError::xml(0, e))
}

fn local_name(raw: &[u8]) -> &[u8] {
    match raw.iter().rposition(|&b| b == b':') {
        Some(index) => &raw[index + 1..],
        None => raw,
    }
}

fn write(writer: &mut XmlWriter, event: Event<'_>) -> Result<()> {
    let position = writer.get_ref().position();
    writer
        .write_event(event)
        .map_err(|e| MddError::xml(position, e))
}

/// Point the document's case-data connection at `<store_stem>.ddf`.
pub fn rewrite_datasource(text: &str, store_stem: &str) -> Result<String> {
    let mut reader = Reader::from_str(text);
    let mut writer = new_writer();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| MddError::xml(reader.error_position(), e))?;
        match event {
            Event::Eof => break,
            Event::Start(start) if local_name(start.name().as_ref()) == b"connection" => {
                let rewritten = rewrite_connection(&start, store_stem, reader.buffer_position())?;
                write(&mut writer, Event::Start(rewritten))?;
            }
            Event::Empty(start) if local_name(start.name().as_ref()) == b"connection" => {
                let rewritten = rewrite_connection(&start, store_stem, reader.buffer_position())?;
                write(&mut writer, Event::Empty(rewritten))?;
            }
            other => write(&mut writer, other)?,
        }
    }
    finish(writer)
}

fn rewrite_connection(
    start: &BytesStart<'_>,
    store_stem: &str,
    position: u64,
) -> Result<BytesStart<'static>> {
    let mut attributes = Vec::new();
    let mut is_data_file = false;
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MddError::xml(position, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| MddError::xml(position, e))?
            .into_owned();
        if key == "cdscname" && value.eq_ignore_ascii_case(DATA_FILE_DSC) {
            is_data_file = true;
        }
        if key == "dblocation" {
            let lower = value.to_ascii_lowercase();
            is_data_file |= lower.ends_with(".ddf") || lower.ends_with(".dzf");
        }
        attributes.push((key, value));
    }

    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = BytesStart::new(name);
    for (key, value) in &attributes {
        if is_data_file && key == "dblocation" {
            element.push_attribute((key.as_str(), format!("{store_stem}.ddf").as_str()));
        } else {
            element.push_attribute((key.as_str(), value.as_str()));
        }
    }
    Ok(element)
}

/// Copy a schema document, pointing its data source at `store_path`.
pub fn copy_with_datasource(source: &Path, destination: &Path, store_path: &Path) -> Result<()> {
    let text = read_text(source)?;
    let stem = store_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let rewritten = rewrite_datasource(&text, &stem)?;
    write_atomic(destination, rewritten.as_bytes())?;
    info!(
        source = %source.display(),
        destination = %destination.display(),
        store = %stem,
        "wrote schema copy"
    );
    Ok(())
}

/// A root-level text variable to add to a document.
#[derive(Debug, Clone)]
pub struct NewTextVariable<'a> {
    pub name: &'a str,
    pub label: &'a str,
    pub language: &'a str,
    pub context: &'a str,
}

/// Maximum length of an added text variable.
pub const TEXT_VARIABLE_MAX: i64 = 4000;

/// Deterministic id for an added variable, shaped like a GUID.
pub fn derived_id(document: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    hasher.update([0]);
    hasher.update(name.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!(
        "{}-{}-{}-{}-{}",
        &digest[0..8],
        &digest[8..12],
        &digest[12..16],
        &digest[16..20],
        &digest[20..32]
    )
}

/// Add a text variable definition and its design reference.
pub fn add_text_variable(text: &str, variable: &NewTextVariable<'_>) -> Result<String> {
    let id = derived_id(text, variable.name);
    let mut reader = Reader::from_str(text);
    let mut writer = new_writer();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut defined = false;
    let mut placed = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| MddError::xml(reader.error_position(), e))?;
        match event {
            Event::Eof => break,
            Event::Start(start) => {
                stack.push(local_name(start.name().as_ref()).to_vec());
                write(&mut writer, Event::Start(start))?;
            }
            Event::End(end) => {
                let name = stack.pop().unwrap_or_default();
                let parent = stack.last().map(Vec::as_slice);
                if !defined && name == b"definition" && parent == Some(b"metadata".as_slice()) {
                    write_definition(&mut writer, &id, variable)?;
                    defined = true;
                }
                if !placed && name == b"fields" && parent == Some(b"design".as_slice()) {
                    write_design_reference(&mut writer, &id, variable.name)?;
                    placed = true;
                }
                write(&mut writer, Event::End(end))?;
            }
            other => write(&mut writer, other)?,
        }
    }

    if !defined {
        return Err(MddError::MissingElement {
            element: "definition",
            parent: "metadata".to_string(),
        });
    }
    if !placed {
        return Err(MddError::MissingElement {
            element: "fields",
            parent: "design".to_string(),
        });
    }
    finish(writer)
}

fn write_definition(writer: &mut XmlWriter, id: &str, variable: &NewTextVariable<'_>) -> Result<()> {
    let max = TEXT_VARIABLE_MAX.to_string();
    let mut element = BytesStart::new("variable");
    element.push_attribute(("id", id));
    element.push_attribute(("name", variable.name));
    element.push_attribute(("type", "2"));
    element.push_attribute(("min", "1"));
    element.push_attribute(("mintype", "3"));
    element.push_attribute(("max", max.as_str()));
    element.push_attribute(("maxtype", "3"));
    write(writer, Event::Start(element))?;

    let mut labels = BytesStart::new("labels");
    labels.push_attribute(("context", "LABEL"));
    write(writer, Event::Start(labels))?;
    let mut text = BytesStart::new("text");
    text.push_attribute(("context", variable.context));
    text.push_attribute(("xml:lang", variable.language));
    write(writer, Event::Start(text))?;
    write(writer, Event::Text(BytesText::new(variable.label)))?;
    write(writer, Event::End(BytesEnd::new("text")))?;
    write(writer, Event::End(BytesEnd::new("labels")))?;

    write(writer, Event::End(BytesEnd::new("variable")))
}

fn write_design_reference(writer: &mut XmlWriter, id: &str, name: &str) -> Result<()> {
    let design_id = format!("_{id}");
    let mut element = BytesStart::new("variable");
    element.push_attribute(("id", design_id.as_str()));
    element.push_attribute(("name", name));
    element.push_attribute(("ref", id));
    write(writer, Event::Empty(element))
}
