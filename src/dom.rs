use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexMap;

use crate::config::SiteConfig;
use crate::page::{BindControl, Page};
use crate::{Error, Result};

/// In-memory page: an arena DOM parsed from markup.
///
/// Supports what bind pages need: form control values, lookup by id and
/// outer-HTML replacement. Scripts are kept as text and never run.
#[derive(Debug)]
pub struct StaticPage {
    dom: RefCell<Dom>,
}

impl StaticPage {
    pub fn from_html(html: &str) -> Result<Self> {
        let dom = parse_html(html)?;
        Ok(Self {
            dom: RefCell::new(dom),
        })
    }

    /// Sets the value of the input control inside the bind container `bind`,
    /// the way a user edit does before `change` fires.
    pub fn set_control_value(&self, config: &SiteConfig, bind: &str, value: &str) -> Result<()> {
        let mut dom = self.dom.borrow_mut();
        let control = dom
            .bind_containers(config)
            .into_iter()
            .find(|container| dom.attr(*container, &config.bind_name_attr) == Some(bind))
            .and_then(|container| dom.first_element_child(container))
            .filter(|child| dom.is_form_control(*child))
            .ok_or_else(|| Error::BindNotFound(bind.to_string()))?;
        dom.set_value(control, value)
    }

    pub fn outer_html(&self, id: &str) -> Option<String> {
        let dom = self.dom.borrow();
        dom.by_id(id).map(|node| dom.dump_node(node))
    }

    pub fn text_content(&self, id: &str) -> Option<String> {
        let dom = self.dom.borrow();
        dom.by_id(id).map(|node| dom.text_content(node))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.dom.borrow().by_id(id).is_some()
    }

    /// Serializes the whole document.
    pub fn dump(&self) -> String {
        let dom = self.dom.borrow();
        dom.dump_node(dom.root)
    }
}

impl Page for StaticPage {
    fn bind_controls(&self, config: &SiteConfig) -> Vec<BindControl> {
        let dom = self.dom.borrow();
        dom.bind_containers(config)
            .into_iter()
            .map(|container| {
                let value = dom
                    .first_element_child(container)
                    .filter(|child| dom.is_form_control(*child))
                    .and_then(|child| dom.element(child))
                    .map(|element| element.value.clone());
                BindControl {
                    name: dom
                        .attr(container, &config.bind_name_attr)
                        .map(str::to_string),
                    value,
                }
            })
            .collect()
    }

    fn replace_outer_html(&self, element_id: &str, html: &str) -> Result<bool> {
        self.dom.borrow_mut().replace_outer_html(element_id, html)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    node_type: NodeType,
}

#[derive(Debug, Clone)]
struct Element {
    tag_name: String,
    attrs: IndexMap<String, String>,
    value: String,
}

#[derive(Debug, Clone)]
struct Dom {
    nodes: Vec<Node>,
    root: NodeId,
    id_index: HashMap<String, NodeId>,
    // Slots of replaced subtrees, reused by `create_node`.
    free: Vec<NodeId>,
}

impl Dom {
    fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Document,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            id_index: HashMap::new(),
            free: Vec::new(),
        }
    }

    fn create_node(&mut self, parent: Option<NodeId>, node_type: NodeType) -> NodeId {
        let node = Node {
            parent,
            children: Vec::new(),
            node_type,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        };
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    fn create_element(
        &mut self,
        parent: NodeId,
        tag_name: String,
        attrs: IndexMap<String, String>,
    ) -> NodeId {
        let value = attrs.get("value").cloned().unwrap_or_default();
        let element = Element {
            tag_name,
            attrs,
            value,
        };
        self.create_node(Some(parent), NodeType::Element(element))
    }

    /// Appends `text` to `parent`, merging it into a trailing text child.
    fn append_text(&mut self, parent: NodeId, text: &str) {
        if let Some(last) = self.nodes[parent.0].children.last().copied() {
            if let NodeType::Text(existing) = &mut self.nodes[last.0].node_type {
                existing.push_str(text);
                return;
            }
        }
        self.create_node(Some(parent), NodeType::Text(text.to_string()));
    }

    fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.nodes[node_id.0].node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, node_id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[node_id.0].node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    fn tag_name(&self, node_id: NodeId) -> Option<&str> {
        self.element(node_id).map(|e| e.tag_name.as_str())
    }

    fn has_tag(&self, node_id: NodeId, tag: &str) -> bool {
        self.tag_name(node_id)
            .map(|name| name.eq_ignore_ascii_case(tag))
            .unwrap_or(false)
    }

    fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes[node_id.0].parent
    }

    fn by_id(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).copied()
    }

    fn attr(&self, node_id: NodeId, name: &str) -> Option<&str> {
        self.element(node_id)
            .and_then(|e| e.attrs.get(name).map(String::as_str))
    }

    fn text_content(&self, node_id: NodeId) -> String {
        match &self.nodes[node_id.0].node_type {
            NodeType::Document | NodeType::Element(_) => {
                let mut out = String::new();
                for child in &self.nodes[node_id.0].children {
                    out.push_str(&self.text_content(*child));
                }
                out
            }
            NodeType::Text(text) => text.clone(),
        }
    }

    fn first_element_child(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes[node_id.0]
            .children
            .iter()
            .copied()
            .find(|child| self.element(*child).is_some())
    }

    fn is_form_control(&self, node_id: NodeId) -> bool {
        self.has_tag(node_id, "input")
            || self.has_tag(node_id, "select")
            || self.has_tag(node_id, "textarea")
    }

    fn bind_containers(&self, config: &SiteConfig) -> Vec<NodeId> {
        self.all_element_nodes()
            .into_iter()
            .filter(|node| self.has_tag(*node, &config.bind_tag))
            .collect()
    }

    fn set_value(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        if self.has_tag(node_id, "select") {
            let mut options = Vec::new();
            self.collect_select_options(node_id, &mut options);
            let known = options
                .iter()
                .any(|option| self.option_effective_value(*option) == value);
            if !known {
                return Err(Error::Dom(format!("select has no option with value {value}")));
            }
        }

        let element = self
            .element_mut(node_id)
            .ok_or_else(|| Error::Dom("value target is not an element".into()))?;
        element.value = value.to_string();
        Ok(())
    }

    fn initialize_form_control_values(&mut self) {
        for node in self.all_element_nodes() {
            let value = if self.has_tag(node, "textarea") {
                self.text_content(node)
            } else if self.has_tag(node, "select") {
                self.select_value_from_options(node)
            } else {
                continue;
            };
            if let Some(element) = self.element_mut(node) {
                element.value = value;
            }
        }
    }

    fn select_value_from_options(&self, select_node: NodeId) -> String {
        let mut options = Vec::new();
        self.collect_select_options(select_node, &mut options);
        let Some(first) = options.first().copied() else {
            return String::new();
        };

        let selected = options
            .iter()
            .copied()
            .find(|option| self.attr(*option, "selected").is_some())
            .unwrap_or(first);
        self.option_effective_value(selected)
    }

    fn collect_select_options(&self, node: NodeId, out: &mut Vec<NodeId>) {
        for child in &self.nodes[node.0].children {
            if self.has_tag(*child, "option") {
                out.push(*child);
            }
            self.collect_select_options(*child, out);
        }
    }

    fn option_effective_value(&self, option_node: NodeId) -> String {
        match self.attr(option_node, "value") {
            Some(value) => value.to_string(),
            None => self.text_content(option_node).trim().to_string(),
        }
    }

    fn replace_outer_html(&mut self, element_id: &str, html: &str) -> Result<bool> {
        let Some(target) = self.by_id(element_id) else {
            return Ok(false);
        };
        let parent = self
            .parent(target)
            .ok_or_else(|| Error::Dom(format!("#{element_id} is detached")))?;

        // Parse before touching the tree so a bad fragment leaves the page as it was.
        let fragment = parse_html(html)?;

        let position = self.nodes[parent.0]
            .children
            .iter()
            .position(|id| *id == target)
            .ok_or_else(|| Error::Dom(format!("#{element_id} is not a child of its parent")))?;

        let mut replacements = Vec::new();
        for child in fragment.nodes[fragment.root.0].children.clone() {
            replacements.push(self.clone_subtree_from_dom(&fragment, child, None)?);
        }
        for node in &replacements {
            self.nodes[node.0].parent = Some(parent);
        }

        self.nodes[parent.0]
            .children
            .splice(position..=position, replacements);
        self.release_subtree(target);
        self.rebuild_id_index();
        Ok(true)
    }

    fn release_subtree(&mut self, top: NodeId) {
        let mut stack = vec![top];
        while let Some(node) = stack.pop() {
            let slot = &mut self.nodes[node.0];
            stack.append(&mut slot.children);
            slot.parent = None;
            slot.node_type = NodeType::Text(String::new());
            self.free.push(node);
        }
    }

    fn clone_subtree_from_dom(
        &mut self,
        source: &Dom,
        source_node: NodeId,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        let node_type = match &source.nodes[source_node.0].node_type {
            NodeType::Document => {
                return Err(Error::Dom("cannot clone a document node".into()));
            }
            NodeType::Element(element) => NodeType::Element(element.clone()),
            NodeType::Text(text) => NodeType::Text(text.clone()),
        };

        let node = self.create_node(parent, node_type);
        for child in &source.nodes[source_node.0].children {
            let _ = self.clone_subtree_from_dom(source, *child, Some(node))?;
        }
        Ok(node)
    }

    /// First element in document order wins, as with `getElementById`.
    fn rebuild_id_index(&mut self) {
        let mut next = HashMap::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            if let NodeType::Element(element) = &self.nodes[node.0].node_type {
                if let Some(id) = element.attrs.get("id") {
                    if !id.is_empty() {
                        next.entry(id.clone()).or_insert(node);
                    }
                }
            }
            for child in self.nodes[node.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        self.id_index = next;
    }

    fn collect_elements_dfs(&self, node_id: NodeId, out: &mut Vec<NodeId>) {
        if matches!(self.nodes[node_id.0].node_type, NodeType::Element(_)) {
            out.push(node_id);
        }
        for child in &self.nodes[node_id.0].children {
            self.collect_elements_dfs(*child, out);
        }
    }

    fn all_element_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_elements_dfs(self.root, &mut out);
        out
    }

    fn dump_node(&self, node_id: NodeId) -> String {
        match &self.nodes[node_id.0].node_type {
            NodeType::Document => {
                let mut out = String::new();
                for child in &self.nodes[node_id.0].children {
                    out.push_str(&self.dump_node(*child));
                }
                out
            }
            NodeType::Text(text) => text.clone(),
            NodeType::Element(element) => {
                let mut out = String::new();
                out.push('<');
                out.push_str(&element.tag_name);
                for (k, v) in &element.attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(v);
                    out.push('"');
                }
                out.push('>');
                if is_void_tag(&element.tag_name) {
                    return out;
                }
                for child in &self.nodes[node_id.0].children {
                    out.push_str(&self.dump_node(*child));
                }
                out.push_str("</");
                out.push_str(&element.tag_name);
                out.push('>');
                out
            }
        }
    }
}

fn parse_html(html: &str) -> Result<Dom> {
    let mut dom = Dom::new();
    let mut open = vec![dom.root];
    let mut cursor = Cursor::new(html);

    while !cursor.at_end() {
        let parent = open.last().copied().unwrap_or(dom.root);

        if cursor.eat("<!--") {
            cursor
                .take_until("-->")
                .ok_or_else(|| Error::HtmlParse("unclosed HTML comment".into()))?;
        } else if cursor.eat("<!") {
            // <!DOCTYPE ...> and other declarations carry nothing we keep.
            cursor
                .take_until(">")
                .ok_or_else(|| Error::HtmlParse("unclosed declaration".into()))?;
        } else if cursor.eat("</") {
            let tag = cursor.take_while(is_name_byte).to_ascii_lowercase();
            cursor
                .take_until(">")
                .ok_or_else(|| Error::HtmlParse(format!("unclosed end tag </{tag}")))?;
            if let Some(depth) = open.iter().rposition(|node| dom.has_tag(*node, &tag)) {
                open.truncate(depth.max(1));
            }
        } else if cursor.at_start_tag() {
            let tag = StartTag::parse(&mut cursor)?;
            let raw = is_raw_text_tag(&tag.name) && !tag.self_closing;
            let keeps_children = !raw && !tag.self_closing && !is_void_tag(&tag.name);
            let name = tag.name.clone();
            let node = dom.create_element(parent, tag.name, tag.attrs);
            if raw {
                let body = cursor
                    .take_raw_text(&name)
                    .ok_or_else(|| Error::HtmlParse(format!("unclosed <{name}>")))?;
                if !body.is_empty() {
                    dom.append_text(node, body);
                }
            } else if keeps_children {
                open.push(node);
            }
        } else {
            dom.append_text(parent, cursor.take_text());
        }
    }

    dom.rebuild_id_index();
    dom.initialize_form_control_values();
    Ok(dom)
}

/// Position in the markup being parsed.
///
/// It only ever stops on ASCII bytes or at the end, so every slice it hands out
/// falls on char boundaries.
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, prefix: &str) -> bool {
        let found = self.rest().starts_with(prefix);
        if found {
            self.pos += prefix.len();
        }
        found
    }

    fn skip_ws(&mut self) {
        self.take_while(|b| b.is_ascii_whitespace());
    }

    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&keep) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    /// Moves past the next `needle` and returns what precedes it.
    fn take_until(&mut self, needle: &str) -> Option<&'a str> {
        let offset = self.rest().find(needle)?;
        let before = &self.rest()[..offset];
        self.pos += offset + needle.len();
        Some(before)
    }

    /// `<` followed by a letter. Any other `<` is ordinary text.
    fn at_start_tag(&self) -> bool {
        self.peek() == Some(b'<')
            && self
                .src
                .as_bytes()
                .get(self.pos + 1)
                .is_some_and(u8::is_ascii_alphabetic)
    }

    /// Text up to the next `<`, including a leading `<` that opens no tag.
    fn take_text(&mut self) -> &'a str {
        let start = self.pos;
        if self.peek() == Some(b'<') {
            self.pos += 1;
        }
        self.take_while(|b| b != b'<');
        &self.src[start..self.pos]
    }

    /// Body of a `<script>`/`<style>` element, consuming its end tag.
    fn take_raw_text(&mut self, tag: &str) -> Option<&'a str> {
        let close = format!("</{tag}");
        let offset = self.rest().to_ascii_lowercase().find(&close)?;
        let body = &self.rest()[..offset];
        self.pos += offset + close.len();
        self.take_until(">")?;
        Some(body)
    }

    fn attr_value(&mut self) -> Result<String> {
        match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                self.pos += 1;
                let quote = if quote == b'"' { "\"" } else { "'" };
                self.take_until(quote)
                    .map(str::to_string)
                    .ok_or_else(|| Error::HtmlParse("unclosed quoted attribute value".into()))
            }
            Some(_) => Ok(self
                .take_while(|b| !b.is_ascii_whitespace() && b != b'>')
                .to_string()),
            None => Err(Error::HtmlParse("missing attribute value".into())),
        }
    }
}

struct StartTag {
    name: String,
    attrs: IndexMap<String, String>,
    self_closing: bool,
}

impl StartTag {
    /// Parses `<name attr="v" bare ...>` or `.../>`; names are lowercased and a
    /// bare attribute gets an empty value.
    fn parse(cursor: &mut Cursor<'_>) -> Result<Self> {
        cursor.eat("<");
        let mut tag = Self {
            name: cursor.take_while(is_name_byte).to_ascii_lowercase(),
            attrs: IndexMap::new(),
            self_closing: false,
        };

        loop {
            cursor.skip_ws();
            if cursor.eat(">") {
                return Ok(tag);
            }
            if cursor.eat("/>") {
                tag.self_closing = true;
                return Ok(tag);
            }
            if cursor.at_end() {
                return Err(Error::HtmlParse(format!("unclosed start tag <{}>", tag.name)));
            }

            let attr = cursor
                .take_while(|b| is_name_byte(b) || b == b':')
                .to_ascii_lowercase();
            if attr.is_empty() {
                return Err(Error::HtmlParse(format!(
                    "invalid attribute name in <{}>",
                    tag.name
                )));
            }
            cursor.skip_ws();
            let value = if cursor.eat("=") {
                cursor.skip_ws();
                cursor.attr_value()?
            } else {
                String::new()
            };
            tag.attrs.insert(attr, value);
        }
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}
