// Spreadsheet XML documents
//
// <?xml version="1.0" encoding="utf-8"?>
// <spreadsheet version="...">
//   <cell>
//     <name>A1</name>
//     <contents>=B1+2</contents>
//   </cell>
// </spreadsheet>
//
// Contents are the literal text that recreates a cell when assigned, so a
// load is a replay of set_content in document order.

use std::fs;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tally_engine::{SheetConfig, SheetError, Spreadsheet};

use crate::error::IoError;

const ROOT: &[u8] = b"spreadsheet";
const CELL: &[u8] = b"cell";
const NAME: &[u8] = b"name";
const CONTENTS: &[u8] = b"contents";

// ============================================================================
// Writing
// ============================================================================

/// Render every non-empty cell, in the order the cells were first set.
pub fn write_xml(sheet: &Spreadsheet) -> Result<String, IoError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(IoError::xml)?;

    let mut root = BytesStart::new("spreadsheet");
    root.push_attribute(("version", sheet.version()));
    writer.write_event(Event::Start(root)).map_err(IoError::xml)?;

    for (name, contents) in sheet.cells() {
        writer
            .write_event(Event::Start(BytesStart::new("cell")))
            .map_err(IoError::xml)?;
        write_text_element(&mut writer, "name", name)?;
        write_text_element(&mut writer, "contents", &contents.to_input())?;
        writer
            .write_event(Event::End(BytesEnd::new("cell")))
            .map_err(IoError::xml)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("spreadsheet")))
        .map_err(IoError::xml)?;

    String::from_utf8(writer.into_inner()).map_err(IoError::xml)
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, tag: &str, text: &str) -> Result<(), IoError> {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(IoError::xml)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(IoError::xml)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(IoError::xml)
}

/// Write the document to `path`, then clear the sheet's changed flag.
pub fn save(sheet: &mut Spreadsheet, path: impl AsRef<Path>) -> Result<(), IoError> {
    let path = path.as_ref();
    let xml = write_xml(sheet)?;
    fs::write(path, xml).map_err(|e| IoError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    sheet.mark_saved();

    log::info!(
        "saved {} cells to {}",
        sheet.names_of_nonempty_cells().len(),
        path.display()
    );
    Ok(())
}

// ============================================================================
// Reading
// ============================================================================

/// Which text-bearing element the reader is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Contents,
}

#[derive(Debug, Default)]
struct PendingCell {
    name: Option<String>,
    contents: Option<String>,
}

impl PendingCell {
    fn set(&mut self, field: Field, text: String) -> Result<(), IoError> {
        let slot = match field {
            Field::Name => &mut self.name,
            Field::Contents => &mut self.contents,
        };
        if slot.is_some() {
            return Err(IoError::Malformed(format!(
                "duplicate <{}> in <cell>",
                field.tag()
            )));
        }
        *slot = Some(text);
        Ok(())
    }

    fn replay(self, sheet: &mut Spreadsheet) -> Result<(), IoError> {
        let name = self
            .name
            .ok_or_else(|| IoError::Malformed("<cell> without <name>".to_string()))?;
        let replayed = match self.contents.as_deref() {
            Some(raw) => sheet.set_content(&name, raw),
            None => Err(SheetError::NullContent),
        };
        replayed
            .map(|_| ())
            .map_err(|source| IoError::Replay { name, source })
    }
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            NAME => Some(Field::Name),
            CONTENTS => Some(Field::Contents),
            _ => None,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Contents => "contents",
        }
    }
}

/// Parse a document into a new spreadsheet built from `config`.
///
/// The document's version must equal `config.version`. The returned sheet
/// reports no unsaved changes.
pub fn read_xml(xml: &str, config: SheetConfig) -> Result<Spreadsheet, IoError> {
    let mut sheet = Spreadsheet::with_config(config);
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut in_root = false;
    let mut finished = false;
    let mut cell: Option<PendingCell> = None;
    // Field being read and the text collected for it so far
    let mut field: Option<(Field, String)> = None;

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf).map_err(IoError::xml)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) if finished => {
                return Err(unexpected_element(e));
            }
            Event::Start(ref e) if !in_root && e.name().as_ref() == ROOT => {
                check_version(e, sheet.version())?;
                in_root = true;
            }
            Event::Empty(ref e) if !in_root && e.name().as_ref() == ROOT => {
                check_version(e, sheet.version())?;
                finished = true;
            }
            Event::Start(ref e) if in_root && cell.is_none() && e.name().as_ref() == CELL => {
                cell = Some(PendingCell::default());
            }
            Event::Empty(ref e) if in_root && cell.is_none() && e.name().as_ref() == CELL => {
                PendingCell::default().replay(&mut sheet)?;
            }
            Event::Start(ref e) | Event::Empty(ref e) if cell.is_some() && field.is_none() => {
                let Some(f) = Field::from_tag(e.name().as_ref()) else {
                    return Err(unexpected_element(e));
                };
                if matches!(event, Event::Empty(_)) {
                    if let Some(pending) = cell.as_mut() {
                        pending.set(f, String::new())?;
                    }
                } else {
                    field = Some((f, String::new()));
                }
            }
            Event::Start(ref e) | Event::Empty(ref e) => {
                return Err(unexpected_element(e));
            }
            Event::Text(ref e) => {
                // Entities arrive as separate GeneralRef events, so text only needs decoding
                let text = e.decode().map_err(IoError::xml)?;
                match field.as_mut() {
                    Some((_, collected)) => collected.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(IoError::Malformed(format!(
                            "unexpected text {:?}",
                            text.trim()
                        )));
                    }
                }
            }
            Event::GeneralRef(ref e) => {
                let Some((_, collected)) = field.as_mut() else {
                    return Err(IoError::Malformed("unexpected entity reference".to_string()));
                };
                let entity = format!("&{};", String::from_utf8_lossy(e));
                let resolved = quick_xml::escape::unescape(&entity).map_err(IoError::xml)?;
                collected.push_str(&resolved);
            }
            Event::CData(ref e) => {
                let Some((_, collected)) = field.as_mut() else {
                    return Err(IoError::Malformed("unexpected CDATA section".to_string()));
                };
                collected.push_str(&String::from_utf8_lossy(e));
            }
            Event::End(ref e) => match e.name().as_ref() {
                tag @ (NAME | CONTENTS) => {
                    let (f, text) = field
                        .take()
                        .filter(|(f, _)| Field::from_tag(tag) == Some(*f))
                        .ok_or_else(|| unexpected_end(e))?;
                    if let Some(pending) = cell.as_mut() {
                        pending.set(f, text)?;
                    }
                }
                CELL if field.is_none() => {
                    let pending = cell.take().ok_or_else(|| unexpected_end(e))?;
                    pending.replay(&mut sheet)?;
                }
                ROOT if in_root && cell.is_none() => {
                    in_root = false;
                    finished = true;
                }
                _ => return Err(unexpected_end(e)),
            },
            Event::Eof => break,
            // Declaration, comments, processing instructions, doctype
            _ => {}
        }
    }

    if !finished {
        let message = if in_root {
            "unexpected end of document"
        } else {
            "missing <spreadsheet> element"
        };
        return Err(IoError::Malformed(message.to_string()));
    }

    sheet.mark_saved();
    Ok(sheet)
}

fn unexpected_element(e: &BytesStart) -> IoError {
    IoError::Malformed(format!(
        "unexpected element <{}>",
        String::from_utf8_lossy(e.name().as_ref())
    ))
}

fn unexpected_end(e: &BytesEnd) -> IoError {
    IoError::Malformed(format!(
        "unexpected closing tag </{}>",
        String::from_utf8_lossy(e.name().as_ref())
    ))
}

fn version_attr(e: &BytesStart) -> Result<Option<String>, IoError> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"version" {
            let raw = String::from_utf8_lossy(&attr.value);
            let value = quick_xml::escape::unescape(&raw).map_err(IoError::xml)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn check_version(e: &BytesStart, expected: &str) -> Result<(), IoError> {
    let found = version_attr(e)?.ok_or(IoError::MissingVersion)?;
    if found != expected {
        log::warn!("version mismatch: expected {:?}, found {:?}", expected, found);
        return Err(IoError::VersionMismatch {
            expected: expected.to_string(),
            found,
        });
    }
    Ok(())
}

/// Load a document from `path`.
pub fn load(path: impl AsRef<Path>, config: SheetConfig) -> Result<Spreadsheet, IoError> {
    let path = path.as_ref();
    let xml = read_file(path)?;
    let sheet = read_xml(&xml, config)?;

    log::info!(
        "loaded {} cells from {}",
        sheet.names_of_nonempty_cells().len(),
        path.display()
    );
    Ok(sheet)
}

/// Version attribute of a document, without loading its cells.
pub fn read_version(xml: &str) -> Result<String, IoError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(IoError::xml)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.name().as_ref() == ROOT => {
                return version_attr(e)?.ok_or(IoError::MissingVersion);
            }
            Event::Start(ref e) | Event::Empty(ref e) => return Err(unexpected_element(e)),
            Event::Eof => {
                return Err(IoError::Malformed("missing <spreadsheet> element".to_string()));
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Version of the document saved at `path`.
pub fn saved_version(path: impl AsRef<Path>) -> Result<String, IoError> {
    read_version(&read_file(path.as_ref())?)
}

fn read_file(path: &Path) -> Result<String, IoError> {
    fs::read_to_string(path).map_err(|e| IoError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_engine::cell_name::is_a1_style;
    use tally_engine::{CellContents, CellValue, NamePolicy};

    fn sheet_with(cells: &[(&str, &str)]) -> Spreadsheet {
        let mut sheet = Spreadsheet::new();
        for (name, raw) in cells {
            sheet.set_content(name, raw).unwrap();
        }
        sheet
    }

    fn reload(sheet: &Spreadsheet) -> Spreadsheet {
        let xml = write_xml(sheet).unwrap();
        read_xml(&xml, sheet.config().clone()).unwrap()
    }

    fn doc(version: &str, body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<spreadsheet version=\"{version}\">{body}</spreadsheet>"
        )
    }

    #[test]
    fn test_write_layout() {
        let sheet = sheet_with(&[("A1", "=B1+2")]);
        let xml = write_xml(&sheet).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<spreadsheet version=\"default\">"));
        assert!(xml.contains("<name>A1</name>"));
        assert!(xml.contains("<contents>=B1+2</contents>"));
    }

    #[test]
    fn test_round_trip() {
        let sheet = sheet_with(&[
            ("a", "1.5"),
            ("b", "=a * 2"),
            ("c", "note"),
            ("d", "=b + a / 4"),
            ("e", "1e-7"),
        ]);
        let loaded = reload(&sheet);

        assert_eq!(loaded.names_of_nonempty_cells(), sheet.names_of_nonempty_cells());
        for name in sheet.names_of_nonempty_cells() {
            assert_eq!(loaded.contents(&name).unwrap(), sheet.contents(&name).unwrap(), "{name}");
        }
        assert_eq!(loaded.value("d").unwrap(), CellValue::Number(3.375));
        loaded.check_invariants().unwrap();
    }

    #[test]
    fn test_loaded_sheet_is_unchanged() {
        let loaded = reload(&sheet_with(&[("a", "1")]));
        assert!(!loaded.changed());
    }

    #[test]
    fn test_escaping_and_whitespace() {
        let text = "  <tag> & \"quotes\" 'apos'  ";
        let sheet = sheet_with(&[("t", text), ("nl", "line one\nline two")]);
        let xml = write_xml(&sheet).unwrap();
        assert!(xml.contains("&lt;tag&gt; &amp;"));

        let loaded = reload(&sheet);
        assert_eq!(loaded.contents("t").unwrap(), CellContents::Text(text.to_string()));
        assert_eq!(
            loaded.contents("nl").unwrap(),
            CellContents::Text("line one\nline two".to_string())
        );
    }

    #[test]
    fn test_carriage_returns_survive() {
        let sheet = sheet_with(&[("crlf", "a\r\nb"), ("cr", "x\ry")]);
        let loaded = reload(&sheet);
        assert_eq!(loaded.contents("crlf").unwrap(), CellContents::Text("a\r\nb".to_string()));
        assert_eq!(loaded.contents("cr").unwrap(), CellContents::Text("x\ry".to_string()));
    }

    #[test]
    fn test_control_characters_survive() {
        let text = "tab\there\u{1}end";
        let loaded = reload(&sheet_with(&[("t", text)]));
        assert_eq!(loaded.contents("t").unwrap(), CellContents::Text(text.to_string()));
    }

    #[test]
    fn test_entity_and_cdata_contents() {
        let xml = doc(
            "default",
            "<cell><name>a</name><contents>x &amp; &#65;</contents></cell>\
             <cell><name>b</name><contents><![CDATA[<raw>]]></contents></cell>",
        );
        let sheet = read_xml(&xml, SheetConfig::default()).unwrap();
        assert_eq!(sheet.contents("a").unwrap(), CellContents::Text("x & A".to_string()));
        assert_eq!(sheet.contents("b").unwrap(), CellContents::Text("<raw>".to_string()));
    }

    #[test]
    fn test_version_mismatch() {
        let xml = doc("v2", "");
        let err = read_xml(&xml, SheetConfig::default()).unwrap_err();
        match err {
            IoError::VersionMismatch { expected, found } => {
                assert_eq!(expected, "default");
                assert_eq!(found, "v2");
            }
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_version() {
        let xml = "<spreadsheet><cell><name>a</name><contents>1</contents></cell></spreadsheet>";
        assert!(matches!(read_xml(xml, SheetConfig::default()), Err(IoError::MissingVersion)));
        assert!(matches!(read_version(xml), Err(IoError::MissingVersion)));
    }

    #[test]
    fn test_read_version() {
        assert_eq!(read_version(&doc("1.0 &amp; up", "")).unwrap(), "1.0 & up");
        assert!(matches!(read_version("<other/>"), Err(IoError::Malformed(_))));
        assert!(matches!(read_version(""), Err(IoError::Malformed(_))));
    }

    #[test]
    fn test_missing_contents_is_null_content() {
        let xml = doc("default", "<cell><name>a</name></cell>");
        match read_xml(&xml, SheetConfig::default()).unwrap_err() {
            IoError::Replay { name, source } => {
                assert_eq!(name, "a");
                assert_eq!(source, SheetError::NullContent);
            }
            other => panic!("expected replay error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_name() {
        let xml = doc("default", "<cell><contents>1</contents></cell>");
        assert!(matches!(read_xml(&xml, SheetConfig::default()), Err(IoError::Malformed(_))));
    }

    #[test]
    fn test_unknown_element() {
        let xml = doc("default", "<cell><name>a</name><value>1</value></cell>");
        assert!(matches!(read_xml(&xml, SheetConfig::default()), Err(IoError::Malformed(_))));

        let xml = doc("default", "<row/>");
        assert!(matches!(read_xml(&xml, SheetConfig::default()), Err(IoError::Malformed(_))));
    }

    #[test]
    fn test_duplicate_field() {
        let xml = doc(
            "default",
            "<cell><name>a</name><name>b</name><contents>1</contents></cell>",
        );
        assert!(matches!(read_xml(&xml, SheetConfig::default()), Err(IoError::Malformed(_))));
    }

    #[test]
    fn test_truncated_document() {
        let xml = "<spreadsheet version=\"default\"><cell><name>a</name>";
        assert!(read_xml(xml, SheetConfig::default()).is_err());
    }

    #[test]
    fn test_replayed_cycle_is_rejected() {
        let xml = doc(
            "default",
            "<cell><name>a</name><contents>=b</contents></cell>\
             <cell><name>b</name><contents>=a</contents></cell>",
        );
        match read_xml(&xml, SheetConfig::default()).unwrap_err() {
            IoError::Replay { name, source } => {
                assert_eq!(name, "b");
                assert!(source.is_circular());
            }
            other => panic!("expected replay error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_name_under_policy() {
        let config = SheetConfig::new(NamePolicy::new(is_a1_style, |s| s.to_uppercase()), "v1");
        let xml = doc("v1", "<cell><name>total</name><contents>1</contents></cell>");
        match read_xml(&xml, config).unwrap_err() {
            IoError::Replay { source, .. } => {
                assert!(matches!(source, SheetError::InvalidName(_)));
            }
            other => panic!("expected replay error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_contents_element() {
        let xml = doc("default", "<cell><name>a</name><contents/></cell><cell><name>b</name><contents></contents></cell>");
        let sheet = read_xml(&xml, SheetConfig::default()).unwrap();
        assert!(sheet.names_of_nonempty_cells().is_empty());
    }

    #[test]
    fn test_empty_spreadsheet() {
        let sheet = read_xml("<spreadsheet version=\"default\"/>", SheetConfig::default()).unwrap();
        assert!(sheet.names_of_nonempty_cells().is_empty());

        let xml = write_xml(&Spreadsheet::new()).unwrap();
        let loaded = read_xml(&xml, SheetConfig::default()).unwrap();
        assert!(loaded.names_of_nonempty_cells().is_empty());
    }

    #[test]
    fn test_normalized_names_round_trip() {
        let config = SheetConfig::new(NamePolicy::new(is_a1_style, |s| s.to_uppercase()), "v1");
        let mut sheet = Spreadsheet::with_config(config);
        sheet.set_content("a1", "2").unwrap();
        sheet.set_content("b1", "=a1*3").unwrap();

        let loaded = reload(&sheet);
        assert_eq!(loaded.version(), "v1");
        assert_eq!(loaded.save_text("B1").unwrap(), "=A1*3");
        assert_eq!(loaded.value("B1").unwrap(), CellValue::Number(6.0));
    }
}
