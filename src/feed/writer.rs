//! Serialises a [`Feed`] as an Atom document with the Google Shopping
//! namespace.
use std::io::Cursor;

use anyhow::{Context, Result};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::builder::Feed;
use super::entry::{FieldValue, ATOM_DATE_FORMAT};
use crate::util::strip_control_chars;

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
pub const GOOGLE_NS: &str = "http://base.google.com/ns/1.0";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Catalog text reaches the writer unfiltered; characters XML 1.0 forbids
/// are dropped here so one stray byte cannot break the whole document.
fn write_text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    let text = strip_control_chars(text);
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .with_context(|| format!("Failed to write <{name}>"))?;
    writer
        .write_event(Event::Text(BytesText::new(&text)))
        .with_context(|| format!("Failed to write <{name}> text"))?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("Failed to write </{name}>"))?;
    Ok(())
}

/// CDATA cannot contain `]]>`; split the payload so the terminator is
/// spread across two adjacent sections.
fn cdata_sections(text: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut rest = text;
    while let Some(idx) = rest.find("]]>") {
        // Keep "]]" in this section, start the next one with ">".
        sections.push(&rest[..idx + 2]);
        rest = &rest[idx + 2..];
    }
    sections.push(rest);
    sections
}

fn write_cdata_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .with_context(|| format!("Failed to write <{name}>"))?;
    let text = strip_control_chars(text);
    for section in cdata_sections(&text) {
        writer
            .write_event(Event::CData(BytesCData::new(section)))
            .with_context(|| format!("Failed to write <{name}> character data"))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("Failed to write </{name}>"))?;
    Ok(())
}

impl Feed {
    /// Renders the feed document.
    ///
    /// Text values are entity-escaped; descriptions are written as CDATA.
    /// No indentation is added, so element content is exactly the value.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .context("Failed to write XML declaration")?;

        let mut root = BytesStart::new("feed");
        root.push_attribute(("xmlns", ATOM_NS));
        root.push_attribute(("xmlns:g", GOOGLE_NS));
        writer
            .write_event(Event::Start(root))
            .context("Failed to write feed element")?;

        write_text_element(&mut writer, "title", &self.title)?;

        let mut link = BytesStart::new("link");
        link.push_attribute(("rel", "self"));
        let href = strip_control_chars(&self.link);
        link.push_attribute(("href", &*href));
        writer
            .write_event(Event::Empty(link))
            .context("Failed to write link element")?;

        write_text_element(
            &mut writer,
            "updated",
            &self.updated.format(ATOM_DATE_FORMAT).to_string(),
        )?;

        for entry in &self.entries {
            writer
                .write_event(Event::Start(BytesStart::new("entry")))
                .context("Failed to write entry element")?;
            for field in entry.fields() {
                match &field.value {
                    FieldValue::Text(text) => write_text_element(&mut writer, field.name, text)?,
                    FieldValue::CData(text) => write_cdata_element(&mut writer, field.name, text)?,
                }
            }
            writer
                .write_event(Event::End(BytesEnd::new("entry")))
                .context("Failed to write entry end")?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("feed")))
            .context("Failed to write feed end")?;

        let result = writer.into_inner().into_inner();
        String::from_utf8(result).context("Generated feed contains invalid UTF-8")
    }
}
