//! Extraction of attribute tables from Markdown reference documentation.
//!
//! Uses pulldown-cmark with table support to find the first table that
//! follows a given heading, before the next heading of the same or a higher
//! level.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;

/// A table found in a document, with cell contents as plain text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Outcome of looking up the table under a heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLookup {
    Found(Table),
    HeadingNotFound,
    TableNotFound,
}

/// Finds the table that belongs to the section titled `heading`.
///
/// Headings are compared case-insensitively with whitespace collapsed, so
/// `"Create a new label"` matches `## Create a  new Label`.
pub fn extract_table(document: &str, heading: &str) -> TableLookup {
    let wanted = normalize(heading);
    let parser = Parser::new_ext(document, Options::ENABLE_TABLES);

    let mut heading_text: Option<String> = None;
    let mut section_level: Option<HeadingLevel> = None;

    let mut table: Option<Table> = None;
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<String> = None;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => heading_text = Some(String::new()),
            Event::End(TagEnd::Heading(level)) => {
                let text = heading_text.take().unwrap_or_default();
                match section_level {
                    Some(current) if level <= current => return TableLookup::TableNotFound,
                    Some(_) => {}
                    None if normalize(&text) == wanted => section_level = Some(level),
                    None => {}
                }
            }
            Event::Start(Tag::Table(_)) if section_level.is_some() => {
                table = Some(Table::default());
            }
            Event::End(TagEnd::Table) => {
                if let Some(found) = table.take() {
                    return TableLookup::Found(found);
                }
            }
            Event::Start(Tag::TableCell) if table.is_some() => cell = Some(String::new()),
            Event::End(TagEnd::TableCell) => {
                if let Some(text) = cell.take() {
                    row.push(normalize_whitespace(&text));
                }
            }
            Event::End(TagEnd::TableHead) => {
                if let Some(t) = table.as_mut() {
                    t.header = std::mem::take(&mut row);
                }
            }
            Event::End(TagEnd::TableRow) => {
                if let Some(t) = table.as_mut() {
                    t.rows.push(std::mem::take(&mut row));
                }
            }
            Event::Text(text) | Event::Code(text) => push_text(&mut heading_text, &mut cell, &text),
            Event::SoftBreak | Event::HardBreak => push_text(&mut heading_text, &mut cell, " "),
            Event::InlineHtml(html) if html.trim_start().starts_with("<br") => {
                push_text(&mut heading_text, &mut cell, " ")
            }
            _ => {}
        }
    }

    if section_level.is_some() {
        TableLookup::TableNotFound
    } else {
        TableLookup::HeadingNotFound
    }
}

fn push_text(heading: &mut Option<String>, cell: &mut Option<String>, text: &str) {
    if let Some(h) = heading.as_mut() {
        h.push_str(text);
    } else if let Some(c) = cell.as_mut() {
        c.push_str(text);
    }
}

fn normalize(text: &str) -> String {
    normalize_whitespace(text).to_lowercase()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
