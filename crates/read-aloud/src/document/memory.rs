use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{Document, DocumentError, ElementId, Selector, SelectorTarget};

/// Page description loaded from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageFixture {
    pub elements: Vec<FixtureElement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureElement {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class: Vec<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<FixtureElement>,
}

impl PageFixture {
    /// Load a page fixture from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read page {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("parse page {:?}", path))
    }
}

#[derive(Debug, Default)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    classes: Vec<String>,
    text: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

impl SelectorTarget for Node {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn node(&self, el: ElementId) -> Result<&Node, DocumentError> {
        self.nodes
            .get(el.0 as usize)
            .ok_or(DocumentError::UnknownElement(el))
    }

    fn node_mut(&mut self, el: ElementId) -> Result<&mut Node, DocumentError> {
        self.nodes
            .get_mut(el.0 as usize)
            .ok_or(DocumentError::UnknownElement(el))
    }

    fn insert(&mut self, parent: ElementId, node: Node, first: bool) -> Result<ElementId, DocumentError> {
        self.node(parent)?;
        let id = ElementId(self.nodes.len() as u64);
        self.nodes.push(Node {
            parent: Some(parent),
            ..node
        });
        let children = &mut self.node_mut(parent)?.children;
        if first {
            children.insert(0, id);
        } else {
            children.push(id);
        }
        Ok(id)
    }

    /// Pre-order walk below `scope`, excluding `scope` itself.
    fn descendants(&self, scope: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = match self.node(scope) {
            Ok(node) => node.children.iter().rev().copied().collect(),
            Err(_) => return out,
        };
        while let Some(el) = stack.pop() {
            out.push(el);
            if let Ok(node) = self.node(el) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn render_into(&self, el: ElementId, depth: usize, out: &mut String) {
        let Ok(node) = self.node(el) else {
            return;
        };
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(&node.tag);
        if !node.classes.is_empty() {
            out.push_str(&format!(" class=\"{}\"", node.classes.join(" ")));
        }
        for (name, value) in &node.attrs {
            out.push_str(&format!(" {name}=\"{value}\""));
        }
        out.push('>');
        if node.children.is_empty() {
            out.push_str(&node.text);
        } else {
            out.push('\n');
            for child in &node.children {
                self.render_into(*child, depth + 1, out);
            }
            if !node.text.is_empty() {
                out.push_str(&"  ".repeat(depth + 1));
                out.push_str(&node.text);
                out.push('\n');
            }
            out.push_str(&indent);
        }
        out.push_str(&format!("</{}>\n", node.tag));
    }
}

/// In-memory element tree with a `body` root.
#[derive(Debug)]
pub struct MemoryDocument {
    tree: Mutex<Tree>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(Tree {
                nodes: vec![Node {
                    tag: "body".to_string(),
                    ..Node::default()
                }],
            }),
        }
    }

    /// Build a document from a page fixture.
    pub fn from_fixture(page: &PageFixture) -> Result<Self, DocumentError> {
        let doc = Self::new();
        for element in &page.elements {
            doc.append_fixture(doc.root(), element)?;
        }
        Ok(doc)
    }

    fn append_fixture(&self, parent: ElementId, element: &FixtureElement) -> Result<(), DocumentError> {
        let el = self.append(parent, &element.tag)?;
        if let Some(id) = &element.id {
            self.set_attr(el, "id", id)?;
        }
        for class in &element.class {
            self.add_class(el, class)?;
        }
        for (name, value) in &element.attrs {
            self.set_attr(el, name, value)?;
        }
        if let Some(text) = &element.text {
            self.set_text(el, text)?;
        }
        for child in &element.children {
            self.append_fixture(el, child)?;
        }
        Ok(())
    }

    pub fn root(&self) -> ElementId {
        ElementId(0)
    }

    /// Append a new empty `tag` element as the last child of `parent`.
    pub fn append(&self, parent: ElementId, tag: &str) -> Result<ElementId, DocumentError> {
        let node = Node {
            tag: tag.to_ascii_lowercase(),
            ..Node::default()
        };
        self.tree().insert(parent, node, false)
    }

    pub fn set_text(&self, el: ElementId, text: &str) -> Result<(), DocumentError> {
        self.tree().node_mut(el)?.text = text.to_string();
        Ok(())
    }

    pub fn text(&self, el: ElementId) -> Option<String> {
        self.tree().node(el).ok().map(|n| n.text.clone())
    }

    pub fn children(&self, el: ElementId) -> Vec<ElementId> {
        self.tree()
            .node(el)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn tag(&self, el: ElementId) -> Option<String> {
        self.tree().node(el).ok().map(|n| n.tag.clone())
    }

    /// Look up an element by its `id` attribute.
    pub fn element_by_id(&self, id: &str) -> Option<ElementId> {
        let tree = self.tree();
        tree.descendants(ElementId(0))
            .into_iter()
            .find(|el| tree.node(*el).ok().and_then(|n| n.attr("id")) == Some(id))
    }

    /// HTML-like dump of the tree below the root.
    pub fn render(&self) -> String {
        let tree = self.tree();
        let mut out = String::new();
        for child in &tree.nodes[0].children {
            tree.render_into(*child, 0, &mut out);
        }
        out
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Document for MemoryDocument {
    fn select(&self, selector: &Selector) -> Vec<ElementId> {
        self.find(self.root(), selector)
    }

    fn find(&self, scope: ElementId, selector: &Selector) -> Vec<ElementId> {
        let tree = self.tree();
        tree.descendants(scope)
            .into_iter()
            .filter(|el| tree.node(*el).is_ok_and(|n| selector.matches(n)))
            .collect()
    }

    fn closest(&self, el: ElementId, selector: &Selector) -> Option<ElementId> {
        let tree = self.tree();
        let mut cursor = Some(el);
        while let Some(current) = cursor {
            let node = tree.node(current).ok()?;
            if selector.matches(node) {
                return Some(current);
            }
            cursor = node.parent;
        }
        None
    }

    fn attr(&self, el: ElementId, name: &str) -> Option<String> {
        let tree = self.tree();
        tree.node(el).ok()?.attr(name).map(str::to_string)
    }

    fn set_attr(&self, el: ElementId, name: &str, value: &str) -> Result<(), DocumentError> {
        self.tree()
            .node_mut(el)?
            .attrs
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn has_class(&self, el: ElementId, class: &str) -> bool {
        self.tree().node(el).is_ok_and(|n| n.has_class(class))
    }

    fn add_class(&self, el: ElementId, class: &str) -> Result<(), DocumentError> {
        let mut tree = self.tree();
        let node = tree.node_mut(el)?;
        if !node.has_class(class) {
            node.classes.push(class.to_string());
        }
        Ok(())
    }

    fn remove_class(&self, el: ElementId, class: &str) -> Result<(), DocumentError> {
        self.tree().node_mut(el)?.classes.retain(|c| c != class);
        Ok(())
    }

    fn check_markup(&self, markup: &str) -> Result<(), DocumentError> {
        parse_markup(markup).map(|_| ())
    }

    fn prepend(&self, parent: ElementId, markup: &str, class: &str) -> Result<ElementId, DocumentError> {
        let mut node = parse_markup(markup)?;
        if !class.is_empty() && !node.has_class(class) {
            node.classes.push(class.to_string());
        }
        self.tree().insert(parent, node, true)
    }
}

/// Parse a single element of markup: `<tag attr="v">text</tag>` or `<tag/>`.
fn parse_markup(markup: &str) -> Result<Node, DocumentError> {
    let invalid = |reason| DocumentError::InvalidMarkup {
        markup: markup.to_string(),
        reason,
    };
    let src = markup.trim();
    let rest = src.strip_prefix('<').ok_or_else(|| invalid("expected '<'"))?;
    let close = rest.find('>').ok_or_else(|| invalid("unterminated start tag"))?;
    let (head, self_closing) = match rest[..close].strip_suffix('/') {
        Some(head) => (head, true),
        None => (&rest[..close], false),
    };

    let mut parts = head.trim().splitn(2, char::is_whitespace);
    let tag = parts.next().unwrap_or_default().to_ascii_lowercase();
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid("invalid tag name"));
    }
    let mut node = Node {
        tag: tag.clone(),
        ..Node::default()
    };
    for (name, value) in parse_attrs(parts.next().unwrap_or_default()).map_err(invalid)? {
        if name == "class" {
            node.classes
                .extend(value.split_whitespace().map(str::to_string));
        } else {
            node.attrs.insert(name, value);
        }
    }

    let body = &rest[close + 1..];
    if self_closing {
        if !body.trim().is_empty() {
            return Err(invalid("trailing content after element"));
        }
        return Ok(node);
    }
    let end_tag = format!("</{tag}>");
    let inner = body
        .strip_suffix(end_tag.as_str())
        .ok_or_else(|| invalid("missing end tag"))?;
    if inner.contains('<') {
        return Err(invalid("nested markup is not supported"));
    }
    node.text = inner.to_string();
    Ok(node)
}

fn parse_attrs(src: &str) -> Result<Vec<(String, String)>, &'static str> {
    let mut out = Vec::new();
    let mut rest = src.trim_start();
    while !rest.is_empty() {
        let name_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_string();
        if name.is_empty() {
            return Err("invalid attribute");
        }
        rest = rest[name_end..].trim_start();
        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let quote = after_eq
                .chars()
                .next()
                .filter(|c| *c == '"' || *c == '\'')
                .ok_or("attribute values must be quoted")?;
            let body = &after_eq[1..];
            let end = body.find(quote).ok_or("unterminated attribute value")?;
            rest = body[end + 1..].trim_start();
            body[..end].to_string()
        } else {
            String::new()
        };
        out.push((name, value));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (MemoryDocument, ElementId, ElementId) {
        let doc = MemoryDocument::new();
        let section = doc.append(doc.root(), "section").unwrap();
        let p = doc.append(section, "p").unwrap();
        doc.add_class(p, "audio-attach-paragraph").unwrap();
        doc.set_attr(p, "data-audio-url", "a.mp3").unwrap();
        doc.set_text(p, "Hello").unwrap();
        (doc, section, p)
    }

    #[test]
    fn select_walks_in_document_order() {
        let (doc, section, p) = sample();
        let q = doc.append(doc.root(), "p").unwrap();
        doc.add_class(q, "audio-attach-paragraph").unwrap();
        let sel: Selector = "p".parse().unwrap();
        assert_eq!(doc.select(&sel), vec![p, q]);
        assert_eq!(doc.find(section, &sel), vec![p]);
    }

    #[test]
    fn prepend_inserts_first_child_with_class() {
        let (doc, _, p) = sample();
        let first = doc.append(p, "span").unwrap();
        let icon = doc.prepend(p, "<b>▶️</b>", "audio-state-icon").unwrap();
        assert_eq!(doc.children(p), vec![icon, first]);
        assert!(doc.has_class(icon, "audio-state-icon"));
        assert_eq!(doc.text(icon).as_deref(), Some("▶️"));
        assert_eq!(doc.tag(icon).as_deref(), Some("b"));
    }

    #[test]
    fn closest_includes_self_and_ancestors() {
        let (doc, section, p) = sample();
        let icon = doc.prepend(p, "<i/>", "icon").unwrap();
        let sel = Selector::class("audio-attach-paragraph");
        assert_eq!(doc.closest(icon, &sel), Some(p));
        assert_eq!(doc.closest(p, &sel), Some(p));
        assert_eq!(doc.closest(section, &sel), None);
    }

    #[test]
    fn class_mutation_is_set_like() {
        let (doc, _, p) = sample();
        doc.add_class(p, "x").unwrap();
        doc.add_class(p, "x").unwrap();
        doc.remove_class(p, "x").unwrap();
        assert!(!doc.has_class(p, "x"));
        assert!(doc.has_class(p, "audio-attach-paragraph"));
    }

    #[test]
    fn unknown_elements_are_errors() {
        let doc = MemoryDocument::new();
        let ghost = ElementId(99);
        assert_eq!(
            doc.add_class(ghost, "x"),
            Err(DocumentError::UnknownElement(ghost))
        );
        assert!(doc.attr(ghost, "id").is_none());
        assert!(doc.closest(ghost, &Selector::class("x")).is_none());
    }

    #[test]
    fn parse_markup_reads_attributes_and_text() {
        let node = parse_markup(r#"<span class="a b" title='play'>go</span>"#).unwrap();
        assert_eq!(node.tag, "span");
        assert_eq!(node.classes, vec!["a", "b"]);
        assert_eq!(node.attrs.get("title").map(String::as_str), Some("play"));
        assert_eq!(node.text, "go");
    }

    #[test]
    fn check_markup_leaves_the_tree_alone() {
        let doc = MemoryDocument::new();
        assert!(doc.check_markup("<b></b>").is_ok());
        assert!(matches!(
            doc.check_markup("<b>"),
            Err(DocumentError::InvalidMarkup { .. })
        ));
        assert!(doc.children(doc.root()).is_empty());
    }

    #[test]
    fn parse_markup_rejects_nested_or_broken_markup() {
        assert!(parse_markup("<b><i>x</i></b>").is_err());
        assert!(parse_markup("<b>x").is_err());
        assert!(parse_markup("plain").is_err());
        assert!(parse_markup("<b title=x></b>").is_err());
    }

    #[test]
    fn fixture_builds_tree_and_renders() {
        let page: PageFixture = serde_json::from_str(
            r#"{"elements":[{"tag":"p","id":"intro","class":["audio-attach-paragraph"],
                "attrs":{"data-audio-url":"a.mp3"},"text":"Hi"}]}"#,
        )
        .unwrap();
        let doc = MemoryDocument::from_fixture(&page).unwrap();
        let p = doc.element_by_id("intro").unwrap();
        assert_eq!(doc.attr(p, "data-audio-url").as_deref(), Some("a.mp3"));
        let html = doc.render();
        assert!(html.contains("<p class=\"audio-attach-paragraph\""));
        assert!(html.contains(">Hi</p>"));
    }
}
