//! Owned XML element tree used by every save/load routine.
//!
//! Saves build a [`XmlDocument`] and serialize it; loads parse text with
//! `roxmltree` into the same tree. A document may carry several top-level
//! sections (`tile_map`, `occluders`, `entry`, `group`, ...), so the parser
//! accepts fragments with more than one root element.

use std::fmt;
use std::fmt::Write as _;

use roxmltree::Document;
use thiserror::Error;

const FRAGMENT_ROOT: &str = "document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("malformed XML: {message}{}", location_suffix(.location))]
    Malformed {
        message: String,
        location: SourceLocation,
    },
    #[error("document has no <{name}> element")]
    MissingElement { name: String },
    #[error("element <{element}> is missing attribute '{attribute}'{}", line_suffix(.line))]
    MissingAttribute {
        element: String,
        attribute: String,
        line: Option<usize>,
    },
    #[error(
        "element <{element}> has invalid attribute {attribute}=\"{value}\"; expected {expected}{}",
        line_suffix(.line)
    )]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
        expected: &'static str,
        line: Option<usize>,
    },
    #[error("element <{element}> has invalid text \"{value}\"; expected {expected}{}", line_suffix(.line))]
    InvalidText {
        element: String,
        value: String,
        expected: &'static str,
        line: Option<usize>,
    },
}

pub(crate) fn line_suffix(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!(" (line {line})"),
        None => String::new(),
    }
}

fn location_suffix(location: &SourceLocation) -> String {
    format!(" (line {}, column {})", location.line, location.column)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
    text: Option<String>,
    line: Option<usize>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Line in the parsed source, `None` for elements built in memory.
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn set_attr(&mut self, name: &str, value: impl fmt::Display) -> &mut Self {
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
        self
    }

    pub fn set_text(&mut self, text: impl fmt::Display) -> &mut Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn add_child(&mut self, name: impl Into<String>) -> &mut XmlElement {
        self.children.push(XmlElement::new(name));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn required_attr(&self, name: &str) -> Result<&str, DocumentError> {
        self.attr(name).ok_or_else(|| DocumentError::MissingAttribute {
            element: self.name.clone(),
            attribute: name.to_string(),
            line: self.line,
        })
    }

    pub fn int_attr(&self, name: &str) -> Result<i32, DocumentError> {
        let raw = self.required_attr(name)?;
        raw.trim()
            .parse::<i32>()
            .map_err(|_| self.invalid_attr(name, raw, "an integer"))
    }

    pub fn int2_attr(&self, name: &str) -> Result<[i32; 2], DocumentError> {
        let raw = self.required_attr(name)?;
        parse_ints::<2>(raw).ok_or_else(|| self.invalid_attr(name, raw, "two integers"))
    }

    pub fn int3_attr(&self, name: &str) -> Result<[i32; 3], DocumentError> {
        let raw = self.required_attr(name)?;
        parse_ints::<3>(raw).ok_or_else(|| self.invalid_attr(name, raw, "three integers"))
    }

    pub fn text_int(&self) -> Result<i32, DocumentError> {
        let raw = self.text.as_deref().unwrap_or_default();
        raw.trim()
            .parse::<i32>()
            .map_err(|_| DocumentError::InvalidText {
                element: self.name.clone(),
                value: raw.to_string(),
                expected: "an integer",
                line: self.line,
            })
    }

    pub(crate) fn invalid_attr(
        &self,
        name: &str,
        value: &str,
        expected: &'static str,
    ) -> DocumentError {
        DocumentError::InvalidAttribute {
            element: self.name.clone(),
            attribute: name.to_string(),
            value: value.to_string(),
            expected,
            line: self.line,
        }
    }

    fn write_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            let _ = write!(out, " {key}=\"{}\"", escape(value));
        }

        match (&self.text, self.children.is_empty()) {
            (None, true) => out.push_str("/>\n"),
            (Some(text), true) => {
                let _ = writeln!(out, ">{}</{}>", escape(text), self.name);
            }
            (text, false) => {
                out.push_str(">\n");
                if let Some(text) = text {
                    for _ in 0..=depth {
                        out.push_str("  ");
                    }
                    out.push_str(&escape(text));
                    out.push('\n');
                }
                for child in &self.children {
                    child.write_into(out, depth + 1);
                }
                for _ in 0..depth {
                    out.push_str("  ");
                }
                let _ = writeln!(out, "</{}>", self.name);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlDocument {
    nodes: Vec<XmlElement>,
}

impl XmlDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Result<Self, DocumentError> {
        let body = blank_declaration(raw);
        // The wrapper sits on its own line so source rows shift by exactly one.
        let wrapped = format!("<{FRAGMENT_ROOT}>\n{body}\n</{FRAGMENT_ROOT}>");
        let doc = Document::parse(&wrapped).map_err(|error| DocumentError::Malformed {
            message: error.to_string(),
            location: SourceLocation {
                line: (error.pos().row as usize).saturating_sub(1).max(1),
                column: error.pos().col as usize,
            },
        })?;

        let nodes = doc
            .root_element()
            .children()
            .filter(|node| node.is_element())
            .map(|node| convert_node(&doc, node))
            .collect();
        Ok(Self { nodes })
    }

    pub fn add_child(&mut self, name: impl Into<String>) -> &mut XmlElement {
        self.nodes.push(XmlElement::new(name));
        let last = self.nodes.len() - 1;
        &mut self.nodes[last]
    }

    pub fn nodes(&self) -> &[XmlElement] {
        &self.nodes
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn required_child(&self, name: &str) -> Result<&XmlElement, DocumentError> {
        self.child(name).ok_or_else(|| DocumentError::MissingElement {
            name: name.to_string(),
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.nodes.iter().filter(move |node| node.name == name)
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write_into(&mut out, 0);
        }
        out
    }
}

fn convert_node(doc: &Document<'_>, node: roxmltree::Node<'_, '_>) -> XmlElement {
    let text = node
        .children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .collect::<String>();
    let text = text.trim();

    XmlElement {
        name: node.tag_name().name().to_string(),
        attributes: node
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect(),
        children: node
            .children()
            .filter(|child| child.is_element())
            .map(|child| convert_node(doc, child))
            .collect(),
        text: (!text.is_empty()).then(|| text.to_string()),
        line: Some((doc.text_pos_at(node.range().start).row as usize).saturating_sub(1)),
    }
}

/// Replaces a leading `<?xml ...?>` declaration with spaces so positions stay put.
fn blank_declaration(raw: &str) -> String {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with("<?xml") {
        return raw.to_string();
    }
    let Some(end) = trimmed.find("?>") else {
        return raw.to_string();
    };
    let start = raw.len() - trimmed.len();
    let stop = start + end + 2;
    let mut out = String::with_capacity(raw.len());
    out.push_str(&raw[..start]);
    out.extend(raw[start..stop].chars().map(|ch| if ch == '\n' { '\n' } else { ' ' }));
    out.push_str(&raw[stop..]);
    out
}

fn parse_ints<const N: usize>(raw: &str) -> Option<[i32; N]> {
    let mut out = [0; N];
    let mut parts = raw.split_whitespace();
    for slot in &mut out {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
