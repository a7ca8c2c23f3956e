//! crates/synthstyle_core/src/page.rs
//!
//! An in-memory model of the host page a content script runs in. It supports the
//! handful of operations the extension needs: reading the URL, querying elements by
//! simple CSS selectors, and creating or mutating elements in place.

use std::collections::BTreeMap;

pub type NodeId = usize;

/// Read access to a page, as needed for product extraction.
pub trait PageView {
    fn url(&self) -> &str;

    /// Text content of the first element matching `selector`.
    fn text(&self, selector: &str) -> Option<String>;

    /// The `attribute` value of every element matching `selector` that has it.
    fn attributes(&self, selector: &str, attribute: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
    pub style: BTreeMap<String, String>,
    parent: Option<NodeId>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_style(mut self, property: &str, value: &str) -> Self {
        self.style.insert(property.to_string(), value.to_string());
        self
    }

    pub fn style_value(&self, property: &str) -> Option<&str> {
        self.style.get(property).map(String::as_str)
    }

    fn matches(&self, part: &SelectorPart) -> bool {
        part.tag.as_deref().map_or(true, |t| t == self.tag)
            && part.id.as_deref().map_or(true, |id| self.id.as_deref() == Some(id))
            && part.classes.iter().all(|c| self.classes.contains(c))
    }
}

//=========================================================================================
// Selectors
//=========================================================================================

/// One compound selector, such as `img`, `#productTitle` or `div.a-price-whole`.
#[derive(Debug, Default)]
struct SelectorPart {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl SelectorPart {
    fn parse(raw: &str) -> Self {
        let mut part = SelectorPart::default();
        let mut current = String::new();
        let mut marker: Option<char> = None;

        let flush = |marker: Option<char>, value: &mut String, part: &mut SelectorPart| {
            if value.is_empty() {
                return;
            }
            let value = std::mem::take(value);
            match marker {
                Some('#') => part.id = Some(value),
                Some('.') => part.classes.push(value),
                _ => part.tag = Some(value.to_ascii_lowercase()),
            }
        };

        for c in raw.chars() {
            if c == '#' || c == '.' {
                flush(marker, &mut current, &mut part);
                marker = Some(c);
            } else {
                current.push(c);
            }
        }
        flush(marker, &mut current, &mut part);
        part
    }
}

/// Descendant selectors separated by whitespace, e.g. `#altImages img`.
fn parse_selector(selector: &str) -> Vec<SelectorPart> {
    selector.split_whitespace().map(SelectorPart::parse).collect()
}

//=========================================================================================
// The Page
//=========================================================================================

#[derive(Debug, Clone)]
pub struct Page {
    url: String,
    nodes: Vec<Option<Element>>,
}

impl Page {
    /// A page with an empty `<body>` as its root.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            nodes: vec![Some(Element::new("body"))],
        }
    }

    pub fn body(&self) -> NodeId {
        0
    }

    pub fn navigate(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub fn append(&mut self, parent: NodeId, mut element: Element) -> NodeId {
        element.parent = Some(parent);
        self.nodes.push(Some(element));
        self.nodes.len() - 1
    }

    /// Removes an element and everything below it.
    pub fn remove(&mut self, node: NodeId) {
        if node == self.body() {
            return;
        }
        let doomed: Vec<NodeId> = self
            .live_nodes()
            .filter(|(id, _)| self.is_within(*id, node))
            .map(|(id, _)| id)
            .collect();
        for id in doomed {
            self.nodes[id] = None;
        }
    }

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        self.nodes.get(node).and_then(Option::as_ref)
    }

    pub fn element_mut(&mut self, node: NodeId) -> Option<&mut Element> {
        self.nodes.get_mut(node).and_then(Option::as_mut)
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.live_nodes()
            .find(|(_, e)| e.id.as_deref() == Some(id))
            .map(|(node, _)| node)
    }

    pub fn count_by_id(&self, id: &str) -> usize {
        self.live_nodes()
            .filter(|(_, e)| e.id.as_deref() == Some(id))
            .count()
    }

    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        self.live_nodes()
            .filter(|(_, e)| e.parent == Some(parent))
            .map(|(node, _)| node)
            .collect()
    }

    pub fn query_all(&self, selector: &str) -> Vec<NodeId> {
        let parts = parse_selector(selector);
        let Some((last, ancestors)) = parts.split_last() else {
            return Vec::new();
        };
        self.live_nodes()
            .filter(|(_, e)| e.matches(last))
            .filter(|(node, _)| self.ancestors_match(*node, ancestors))
            .map(|(node, _)| node)
            .collect()
    }

    pub fn query(&self, selector: &str) -> Option<NodeId> {
        self.query_all(selector).into_iter().next()
    }

    fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &Element)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(node, e)| e.as_ref().map(|e| (node, e)))
    }

    fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.element(node).and_then(|e| e.parent)
    }

    fn is_within(&self, node: NodeId, root: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == root {
                return true;
            }
            current = self.parent_of(n);
        }
        false
    }

    /// Walks up from `node`, matching `ancestors` right to left.
    fn ancestors_match(&self, node: NodeId, ancestors: &[SelectorPart]) -> bool {
        let mut remaining = ancestors.len();
        let mut current = self.parent_of(node);
        while remaining > 0 {
            let Some(n) = current else {
                return false;
            };
            if self
                .element(n)
                .is_some_and(|e| e.matches(&ancestors[remaining - 1]))
            {
                remaining -= 1;
            }
            current = self.parent_of(n);
        }
        true
    }
}

impl PageView for Page {
    fn url(&self) -> &str {
        &self.url
    }

    fn text(&self, selector: &str) -> Option<String> {
        self.query(selector)
            .and_then(|node| self.element(node))
            .map(|e| e.text.clone())
    }

    fn attributes(&self, selector: &str, attribute: &str) -> Vec<String> {
        self.query_all(selector)
            .into_iter()
            .filter_map(|node| self.element(node))
            .filter_map(|e| e.attributes.get(attribute).cloned())
            .collect()
    }
}
