//! Minimal attribute-based XML reader/writer for table `to_xml`/`from_xml`.
//!
//! Not a general-purpose XML processor: just enough structure (nested
//! elements, quoted attributes, self-closing tags) to round-trip what this
//! crate's own `to_xml()` writers emit. Mirrors the attribute-per-field,
//! child-element-per-loop-entry convention real signalization XML uses, down
//! to falling back to a `generic_descriptor` element with a hex `content`
//! attribute for descriptors with no dedicated XML mapping.

use crate::error::{Error, Result};

/// A parsed or to-be-serialized XML element: a name, its attributes in
/// declaration order, and its child elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.push((name.to_string(), value.into()));
        self
    }

    pub fn with_hex_attr(self, name: &str, value: u32, digits: usize) -> Self {
        self.with_attr(name, format!("0x{value:0digits$x}"))
    }

    pub fn with_bool_attr(self, name: &str, value: bool) -> Self {
        self.with_attr(name, if value { "true" } else { "false" })
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or(Error::InvalidField("missing XML attribute"))
    }

    /// Parses a hex (`0x...`) or decimal attribute as `u8`.
    pub fn attr_u8(&self, name: &str) -> Result<u8> {
        parse_int(self.require(name)?)
    }
    /// Parses a hex (`0x...`) or decimal attribute as `u16`.
    pub fn attr_u16(&self, name: &str) -> Result<u16> {
        parse_int(self.require(name)?)
    }
    /// Parses a `true`/`false` attribute, defaulting when absent.
    pub fn attr_bool(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }
    /// Parses a hex (`0x...`) or decimal attribute as `u16`, defaulting when absent.
    pub fn attr_u16_or(&self, name: &str, default: u16) -> Result<u16> {
        match self.get(name) {
            Some(v) => parse_int(v),
            None => Ok(default),
        }
    }

    /// All direct children named `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Renders this element and its descendants as indented XML text.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, 0);
        out
    }

    fn write(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        out.push_str(&pad);
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape(v));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>\n");
            return;
        }
        out.push_str(">\n");
        for child in &self.children {
            child.write(out, indent + 1);
        }
        out.push_str(&pad);
        out.push_str("</");
        out.push_str(&self.name);
        out.push_str(">\n");
    }

    /// Parses a single root element (with optional leading `<?xml ... ?>`
    /// prolog) from `xml`.
    pub fn parse(xml: &str) -> Result<Element> {
        let bytes = xml.as_bytes();
        let mut pos = 0usize;
        skip_ws(bytes, &mut pos);
        if bytes[pos..].starts_with(b"<?") {
            pos = find(bytes, pos, b"?>")? + 2;
            skip_ws(bytes, &mut pos);
        }
        let (element, end) = parse_element(bytes, pos)?;
        pos = end;
        skip_ws(bytes, &mut pos);
        Ok(element)
    }
}

fn parse_int<T: TryFromHexOrDec>(s: &str) -> Result<T> {
    T::parse(s).ok_or(Error::InvalidField("malformed XML integer attribute"))
}

trait TryFromHexOrDec: Sized {
    fn parse(s: &str) -> Option<Self>;
}

impl TryFromHexOrDec for u8 {
    fn parse(s: &str) -> Option<Self> {
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u8::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        }
    }
}

impl TryFromHexOrDec for u16 {
    fn parse(s: &str) -> Option<Self> {
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u16::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn skip_ws(bytes: &[u8], pos: &mut usize) {
    while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Result<usize> {
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| from + i)
        .ok_or(Error::InvalidField("malformed XML: unterminated token"))
}

fn parse_name(bytes: &[u8], pos: &mut usize) -> Result<String> {
    let start = *pos;
    while *pos < bytes.len()
        && (bytes[*pos].is_ascii_alphanumeric() || bytes[*pos] == b'_' || bytes[*pos] == b'-')
    {
        *pos += 1;
    }
    if *pos == start {
        return Err(Error::InvalidField("malformed XML: expected element/attribute name"));
    }
    Ok(String::from_utf8_lossy(&bytes[start..*pos]).into_owned())
}

fn parse_element(bytes: &[u8], mut pos: usize) -> Result<(Element, usize)> {
    if bytes.get(pos) != Some(&b'<') {
        return Err(Error::InvalidField("malformed XML: expected '<'"));
    }
    pos += 1;
    let name = parse_name(bytes, &mut pos)?;
    let mut element = Element::new(name);
    loop {
        skip_ws(bytes, &mut pos);
        match bytes.get(pos) {
            Some(b'/') if bytes.get(pos + 1) == Some(&b'>') => {
                return Ok((element, pos + 2));
            }
            Some(b'>') => {
                pos += 1;
                break;
            }
            Some(_) => {
                let attr_name = parse_name(bytes, &mut pos)?;
                skip_ws(bytes, &mut pos);
                if bytes.get(pos) != Some(&b'=') {
                    return Err(Error::InvalidField("malformed XML: expected '=' after attribute name"));
                }
                pos += 1;
                skip_ws(bytes, &mut pos);
                if bytes.get(pos) != Some(&b'"') {
                    return Err(Error::InvalidField("malformed XML: expected quoted attribute value"));
                }
                pos += 1;
                let value_start = pos;
                pos = find(bytes, pos, b"\"")?;
                let raw = std::str::from_utf8(&bytes[value_start..pos])
                    .map_err(|_| Error::InvalidField("malformed XML: non-UTF8 attribute value"))?;
                element.attrs.push((attr_name, unescape(raw)));
                pos += 1;
            }
            None => return Err(Error::InvalidField("malformed XML: truncated start tag")),
        }
    }
    loop {
        skip_ws(bytes, &mut pos);
        match bytes.get(pos) {
            Some(b'<') if bytes.get(pos + 1) == Some(&b'/') => {
                pos += 2;
                let closing = parse_name(bytes, &mut pos)?;
                if closing != element.name {
                    return Err(Error::InvalidField("malformed XML: mismatched closing tag"));
                }
                skip_ws(bytes, &mut pos);
                if bytes.get(pos) != Some(&b'>') {
                    return Err(Error::InvalidField("malformed XML: expected '>' after closing tag name"));
                }
                return Ok((element, pos + 1));
            }
            Some(b'<') => {
                let (child, new_pos) = parse_element(bytes, pos)?;
                element.children.push(child);
                pos = new_pos;
            }
            _ => return Err(Error::InvalidField("malformed XML: truncated element body")),
        }
    }
}

/// Renders a descriptor list as `generic_descriptor` elements (tag plus hex
/// payload), the fallback representation for descriptors with no dedicated
/// XML mapping.
pub fn descriptors_to_xml(descriptors: &crate::descriptor::DescriptorList) -> Vec<Element> {
    descriptors
        .iter()
        .map(|(d, _)| {
            Element::new("generic_descriptor")
                .with_hex_attr("tag", d.tag() as u32, 2)
                .with_attr("content", hex_dump(d.payload()))
        })
        .collect()
}

/// Parses `generic_descriptor` children back into a [`DescriptorList`](crate::descriptor::DescriptorList).
pub fn descriptors_from_xml(parent: &Element) -> Result<crate::descriptor::DescriptorList> {
    let mut list = crate::descriptor::DescriptorList::new();
    for child in parent.children_named("generic_descriptor") {
        let tag = child.attr_u8("tag")?;
        let content = hex_undump(child.get("content").unwrap_or(""))?;
        list.add(crate::descriptor::Descriptor::new(tag, &content)?);
    }
    Ok(list)
}

fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_undump(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(Error::InvalidField("malformed XML: odd-length hex content"));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| Error::InvalidField("malformed XML: non-hex content"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_nested_elements_with_attributes() {
        let el = Element::new("PMT")
            .with_hex_attr("program_number", 0x0001, 4)
            .with_attr("version", "2")
            .with_child(
                Element::new("stream")
                    .with_hex_attr("elementary_pid", 0x0100, 4)
                    .with_child(
                        Element::new("generic_descriptor")
                            .with_hex_attr("tag", 0x52, 2)
                            .with_attr("content", "01"),
                    ),
            );
        let text = el.to_xml_string();
        let parsed = Element::parse(&text).unwrap();
        assert_eq!(parsed.name, "PMT");
        assert_eq!(parsed.get("program_number"), Some("0x0001"));
        assert_eq!(parsed.children.len(), 1);
        assert_eq!(parsed.children[0].name, "stream");
        assert_eq!(parsed.children[0].children[0].get("tag"), Some("0x52"));
    }

    #[test]
    fn escapes_and_unescapes_attribute_values() {
        let el = Element::new("x").with_attr("name", "A & B <C> \"D\"");
        let text = el.to_xml_string();
        let parsed = Element::parse(&text).unwrap();
        assert_eq!(parsed.get("name"), Some("A & B <C> \"D\""));
    }

    #[test]
    fn self_closing_element_with_no_children_parses() {
        let parsed = Element::parse("<x a=\"1\"/>").unwrap();
        assert_eq!(parsed.get("a"), Some("1"));
        assert!(parsed.children.is_empty());
    }

    #[test]
    fn mismatched_closing_tag_is_rejected() {
        assert!(Element::parse("<a><b></c></a>").is_err());
    }
}
