use std::sync::Arc;

use crate::error::SsrError;
use crate::render::scope::RenderScope;
use crate::render::suspend::Readiness;

pub type RenderFn =
    dyn Fn(&mut RenderScope) -> Result<Readiness<Node>, SsrError> + Send + Sync + 'static;

/// View tree handed to the streaming renderer.
#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
    /// Markup written verbatim, used for inline scripts.
    Raw(String),
    Fragment(Vec<Node>),
    Suspense(Box<SuspenseNode>),
    Component(Component),
}

#[derive(Debug, Clone)]
pub struct SuspenseNode {
    pub fallback: Node,
    pub children: Node,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub tag: &'static str,
    pub attributes: Vec<(&'static str, String)>,
    pub children: Vec<Node>,
}

/// A render function evaluated every time its subtree is (re)rendered.
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    render: Arc<RenderFn>,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Component {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn call(&self, scope: &mut RenderScope) -> Result<Readiness<Node>, SsrError> {
        (self.render)(scope)
    }
}

impl Element {
    pub fn attr(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attributes.push((name, value.into()));
        self
    }

    pub fn class(self, value: impl Into<String>) -> Self {
        self.attr("class", value)
    }

    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn children<I, N>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.children.extend(nodes.into_iter().map(Into::into));
        self
    }
}

impl Node {
    pub fn empty() -> Self {
        Self::Fragment(Vec::new())
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<Node>> for Node {
    fn from(nodes: Vec<Node>) -> Self {
        Self::Fragment(nodes)
    }
}

pub fn el(tag: &'static str) -> Element {
    Element { tag, attributes: Vec::new(), children: Vec::new() }
}

pub fn text(content: impl Into<String>) -> Node {
    Node::Text(content.into())
}

pub fn raw(markup: impl Into<String>) -> Node {
    Node::Raw(markup.into())
}

pub fn fragment<I, N>(nodes: I) -> Node
where
    I: IntoIterator<Item = N>,
    N: Into<Node>,
{
    Node::Fragment(nodes.into_iter().map(Into::into).collect())
}

/// Fallback boundary: `fallback` is shown while anything in `children` is suspended.
pub fn suspense(fallback: impl Into<Node>, children: impl Into<Node>) -> Node {
    Node::Suspense(Box::new(SuspenseNode { fallback: fallback.into(), children: children.into() }))
}

pub fn component<F>(name: &'static str, render: F) -> Node
where
    F: Fn(&mut RenderScope) -> Result<Readiness<Node>, SsrError> + Send + Sync + 'static,
{
    Node::Component(Component { name, render: Arc::new(render) })
}
