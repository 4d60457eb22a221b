//! Terms of a saved warehouse query definition.
//!
//! Every `<item>` of the query XML (at any depth) gets a 0-based id in
//! document order. Each `item_key` x `item_name` pair of its direct children
//! yields one [`QueryTerm`]. Items without either still consume an id.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;

use crate::error::{IngestError, Result};

/// CSV header of a term listing.
pub const QUERY_TERM_COLUMNS: [&str; 5] = ["id", "item_key", "concept_path", "name_char", "name"];

/// One term of a query definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    pub id: usize,
    /// Full item key, `\\<table>\<path>...`.
    pub item_key: String,
    /// Item key without its table segment.
    pub concept_path: String,
    pub name_char: String,
    /// Display name up to the first `[` (usually a patient count).
    pub name: String,
}

impl QueryTerm {
    fn new(id: usize, item_key: &str, item_name: &str) -> Self {
        let name_char = fix_text(item_name);
        let name = name_char
            .split_once('[')
            .map_or(name_char.as_str(), |(head, _)| head)
            .to_string();
        Self {
            id,
            item_key: item_key.to_string(),
            concept_path: key_to_path(item_key),
            name_char,
            name,
        }
    }

    /// Cells in [`QUERY_TERM_COLUMNS`] order.
    pub fn values(&self) -> [String; 5] {
        [
            self.id.to_string(),
            self.item_key.clone(),
            self.concept_path.clone(),
            self.name_char.clone(),
            self.name.clone(),
        ]
    }
}

/// `\\i2b2_meds\i2b2\Medications\X\` -> `\i2b2\Medications\X\`.
pub fn key_to_path(item_key: &str) -> String {
    let rest: Vec<&str> = item_key.split('\\').skip(3).collect();
    format!("\\{}", rest.join("\\"))
}

/// Some exports carry `¿` where an apostrophe was.
fn fix_text(text: &str) -> String {
    text.replace('\u{bf}', "'")
}

#[derive(Debug, Default)]
struct OpenItem {
    id: usize,
    keys: Vec<String>,
    names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Key,
    Name,
}

/// Parse the terms of a query definition file.
pub fn read_query_terms(path: &Path) -> Result<Vec<QueryTerm>> {
    let file = File::open(path).map_err(|source| IngestError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    let terms = parse_query_terms(&mut reader).map_err(|source| IngestError::Xml {
        path: path.to_path_buf(),
        position: reader.error_position(),
        source,
    })?;
    tracing::debug!(path = %path.display(), term_count = terms.len(), "read query terms");
    Ok(terms)
}

/// Parse terms from XML text.
pub fn query_terms_from_str(xml: &str) -> std::result::Result<Vec<QueryTerm>, quick_xml::Error> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    parse_query_terms(&mut reader)
}

fn parse_query_terms<R: std::io::BufRead>(
    reader: &mut Reader<R>,
) -> std::result::Result<Vec<QueryTerm>, quick_xml::Error> {
    let mut terms = Vec::new();
    let mut buf = Vec::new();
    let mut item_count = 0usize;
    // element depth, and the depth of the open <item>
    let mut depth = 0usize;
    let mut item: Option<(usize, OpenItem)> = None;
    let mut capture: Option<(Capture, String)> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                let local = e.local_name();
                let open_at = item.as_ref().map(|(at, _)| *at);
                match (local.as_ref(), open_at) {
                    (b"item", None) => {
                        let open = OpenItem {
                            id: item_count,
                            ..OpenItem::default()
                        };
                        item = Some((depth, open));
                        item_count += 1;
                    }
                    (b"item", Some(_)) => item_count += 1,
                    (b"item_key", Some(at)) if depth == at + 1 => {
                        capture = Some((Capture::Key, String::new()));
                    }
                    (b"item_name", Some(at)) if depth == at + 1 => {
                        capture = Some((Capture::Name, String::new()));
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"item" {
                    item_count += 1;
                }
            }
            Event::Text(e) => {
                if let Some((_, text)) = capture.as_mut() {
                    text.push_str(&e.decode()?);
                }
            }
            Event::CData(e) => {
                if let Some((_, text)) = capture.as_mut() {
                    text.push_str(&e.decode()?);
                }
            }
            Event::GeneralRef(e) => {
                if let Some((_, text)) = capture.as_mut() {
                    if let Some(ch) = e.resolve_char_ref()? {
                        text.push(ch);
                    } else {
                        let name = e.decode()?;
                        match resolve_predefined_entity(&name) {
                            Some(resolved) => text.push_str(resolved),
                            None => {
                                tracing::warn!(entity = %name, "unknown entity kept verbatim");
                                text.push('&');
                                text.push_str(&name);
                                text.push(';');
                            }
                        }
                    }
                }
            }
            Event::End(e) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"item_key" | b"item_name" => {
                        if let (Some((kind, text)), Some((_, open))) = (capture.take(), item.as_mut()) {
                            let text = text.trim().to_string();
                            match kind {
                                Capture::Key => open.keys.push(text),
                                Capture::Name => open.names.push(text),
                            }
                        }
                    }
                    b"item" if item.as_ref().is_some_and(|(at, _)| *at == depth) => {
                        if let Some((_, open)) = item.take() {
                            for key in &open.keys {
                                for name in &open.names {
                                    terms.push(QueryTerm::new(open.id, key, name));
                                }
                            }
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    tracing::debug!(item_count, term_count = terms.len(), "parsed query definition");
    Ok(terms)
}
