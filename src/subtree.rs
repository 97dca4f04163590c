//! Pull cursor over the export and an owned element tree for one page.
//!
//! The engine never builds a tree for the whole document. Only the element
//! under the cursor is expanded into an [`Element`] when a page is
//! intercepted; everything else streams through as raw events.

use crate::error::{RemapError, Result};
use quick_xml::escape::partial_escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::borrow::Cow;
use std::io::{BufRead, Write};

/// Forward-only event source.
pub struct Cursor<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> Cursor<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(false);
        Self {
            reader,
            buf: Vec::with_capacity(8192),
        }
    }

    /// Next event, borrowing the cursor's buffer until the event is dropped.
    pub fn next(&mut self) -> Result<Event<'_>> {
        self.buf.clear();
        Ok(self.reader.read_event_into(&mut self.buf)?)
    }

    /// Reads the remainder of the element opened by `start` into a tree.
    pub fn expand(&mut self, start: BytesStart<'static>) -> Result<Element> {
        let mut element = Element::from_start(start);
        loop {
            let event = self.next()?.into_owned();
            match event {
                Event::Start(child) => {
                    let child = self.expand(child)?;
                    element.children.push(Node::Element(child));
                }
                Event::Empty(child) => {
                    element
                        .children
                        .push(Node::Element(Element::empty_from_start(child)));
                }
                Event::End(_) => return Ok(element),
                Event::Eof => {
                    return Err(RemapError::structural(format!(
                        "input ended inside <{}>",
                        element.name()
                    )))
                }
                other => element.children.push(Node::Leaf(other)),
            }
        }
    }
}

pub fn local_name_is(start: &BytesStart<'_>, name: &str) -> bool {
    start.local_name().as_ref() == name.as_bytes()
}

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    /// Text, CDATA, comments and processing instructions, kept raw.
    Leaf(Event<'static>),
}

impl Node {
    fn is_whitespace(&self) -> bool {
        match self {
            Node::Leaf(Event::Text(t)) => t.iter().all(u8::is_ascii_whitespace),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    start: BytesStart<'static>,
    pub children: Vec<Node>,
    /// Written back as `<name/>` while it has no children.
    self_closing: bool,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self::from_start(BytesStart::new(name.to_owned()))
    }

    pub fn with_text(name: &str, text: &str) -> Self {
        let mut element = Self::new(name);
        element.set_text(text);
        element
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.start.push_attribute((key, value));
        self
    }

    fn from_start(start: BytesStart<'static>) -> Self {
        Self {
            start,
            children: Vec::new(),
            self_closing: false,
        }
    }

    fn empty_from_start(start: BytesStart<'static>) -> Self {
        Self {
            start,
            children: Vec::new(),
            self_closing: true,
        }
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.start.name().as_ref()).into_owned()
    }

    pub fn is(&self, name: &str) -> bool {
        local_name_is(&self.start, name)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|node| match node {
            Node::Element(e) if e.is(name) => Some(e),
            _ => None,
        })
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(e) if e.is(name) => Some(e),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter_map(move |node| match node {
            Node::Element(e) if e.is(name) => Some(e),
            _ => None,
        })
    }

    pub fn children_named_mut<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a mut Element> + 'a {
        self.children.iter_mut().filter_map(move |node| match node {
            Node::Element(e) if e.is(name) => Some(e),
            _ => None,
        })
    }

    /// Unescaped character content of the direct text children.
    pub fn text(&self) -> Result<String> {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Leaf(Event::Text(t)) => out.push_str(&t.unescape()?),
                Node::Leaf(Event::CData(c)) => out.push_str(&String::from_utf8_lossy(c)),
                _ => {}
            }
        }
        Ok(out)
    }

    /// Replaces the content with `text`. Only `<`, `>` and `&` are escaped so
    /// wikitext quotes survive as written.
    pub fn set_text(&mut self, text: &str) {
        self.children.clear();
        if !text.is_empty() {
            let escaped = partial_escape(text).into_owned();
            self.children
                .push(Node::Leaf(Event::Text(BytesText::from_escaped(escaped))));
        }
    }

    pub fn attribute(&self, key: &str) -> Result<Option<String>> {
        for attr in self.start.attributes() {
            let attr = attr?;
            if attr.key.as_ref() == key.as_bytes() {
                return Ok(Some(attr.unescape_value()?.into_owned()));
            }
        }
        Ok(None)
    }

    /// Replaces (`Some`) or removes (`None`) an attribute, keeping the others raw.
    pub fn set_attribute(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        let mut kept: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for attr in self.start.attributes() {
            let attr = attr?;
            if attr.key.as_ref() != key.as_bytes() {
                kept.push((attr.key.as_ref().to_vec(), attr.value.into_owned()));
            }
        }

        let mut start = BytesStart::new(self.name());
        for (k, v) in &kept {
            start.push_attribute(Attribute {
                key: QName(k),
                value: Cow::Borrowed(v.as_slice()),
            });
        }
        if let Some(value) = value {
            start.push_attribute((key, value));
        }
        self.start = start;
        Ok(())
    }

    /// Removes every direct child element called `name`, together with the
    /// indentation in front of it. Returns how many were removed.
    pub fn remove_children(&mut self, name: &str) -> usize {
        let mut removed = 0;
        let mut kept: Vec<Node> = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            if matches!(&node, Node::Element(e) if e.is(name)) {
                if kept.last().is_some_and(Node::is_whitespace) {
                    kept.pop();
                }
                removed += 1;
            } else {
                kept.push(node);
            }
        }
        self.children = kept;
        removed
    }

    /// Appends a child element before the closing indentation, reusing the
    /// indentation of the first child so the output stays readable.
    pub fn append_child(&mut self, child: Element) {
        let indent = self.children.first().filter(|n| n.is_whitespace()).cloned();
        let closing = if self.children.last().is_some_and(Node::is_whitespace) {
            self.children.pop()
        } else {
            None
        };
        self.children.extend(indent);
        self.children.push(Node::Element(child));
        self.children.extend(closing);
    }

    pub fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        if self.self_closing && self.children.is_empty() {
            writer.write_event(Event::Empty(self.start.borrow()))?;
            return Ok(());
        }
        writer.write_event(Event::Start(self.start.borrow()))?;
        for node in &self.children {
            match node {
                Node::Element(e) => e.write(writer)?,
                Node::Leaf(event) => writer.write_event(event)?,
            }
        }
        writer.write_event(Event::End(self.start.to_end()))?;
        Ok(())
    }
}
