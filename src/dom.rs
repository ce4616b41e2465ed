use scraper::{ElementRef, Html};

/// Tags serialized without a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn to_html(&self) -> String {
        match self {
            Node::Element(el) => el.outer_html(),
            Node::Text(t) => {
                let mut out = String::new();
                escape_text(t, &mut out);
                out
            }
        }
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Node::Element(el) => el.write_html(out),
            Node::Text(t) => escape_text(t, out),
        }
    }
}

/// Owned element tree. Attributes keep document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Attribute value, or "" when missing.
    pub fn attr(&self, key: &str) -> &str {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class").split_whitespace().any(|c| c == class)
    }

    /// Whitespace-normalized text of this element and all descendants.
    pub fn text(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw);
        collapse_ws(&raw)
    }

    fn collect_text(&self, out: &mut String) {
        if self.tag == "br" {
            out.push(' ');
        }
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(el) => el.collect_text(out),
            }
        }
    }

    /// Whitespace-normalized text of the direct text children only.
    pub fn own_text(&self) -> String {
        let raw: String = self
            .children
            .iter()
            .filter_map(|c| match c {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect();
        collapse_ws(&raw)
    }

    /// Serializes the owned tree. `scraper`'s `html()` needs the borrowed
    /// `ElementRef`, which is gone once the tree is converted. Attribute-less
    /// tags come out bare (`<tr>`), which row splitting relies on.
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            escape_attr(v, out);
            out.push('"');
        }
        out.push('>');
        if VOID_TAGS.contains(&self.tag.as_str()) {
            return;
        }
        for child in &self.children {
            child.write_html(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }

    /// Pre-order traversal starting with `self`.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }
}

pub struct Walk<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let el = self.stack.pop()?;
        for child in el.children.iter().rev() {
            if let Node::Element(c) = child {
                self.stack.push(c);
            }
        }
        Some(el)
    }
}

#[cfg(test)]
impl Element {
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(Node::Text(text.to_string()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }
}

/// Parsed page. The root is the `<html>` element.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        Self {
            root: convert(parsed.root_element()),
        }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// All matching elements in document order.
    pub fn select<'a>(&'a self, matcher: &'a Matcher) -> impl Iterator<Item = &'a Element> + 'a {
        self.root.walk().filter(move |el| matcher.matches(el))
    }

    pub fn select_last<'a>(&'a self, matcher: &'a Matcher) -> Option<&'a Element> {
        self.select(matcher).last()
    }
}

fn convert(el: ElementRef<'_>) -> Element {
    let value = el.value();
    let mut out = Element::new(value.name());
    for (k, v) in value.attrs() {
        out.attrs.push((k.to_string(), v.to_string()));
    }
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                let text: &str = text;
                out.children.push(Node::Text(text.to_string()));
            }
            scraper::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    out.children.push(Node::Element(convert(child_el)));
                }
            }
            _ => {}
        }
    }
    out
}

/// Declarative element filter. Composes with `and` and `not`.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// `class` attribute contains this token.
    HasClass(&'static str),
    /// `class` attribute equals this string exactly.
    ClassIs(&'static str),
    AttrEq(&'static str, &'static str),
    AttrContains(&'static str, &'static str),
    /// Own text contains the (lowercase) needle, compared case-insensitively.
    OwnTextContains(&'static str),
    HasText,
    TextContains(&'static str),
    TextEq(&'static str),
    Not(Box<Matcher>),
    All(Vec<Matcher>),
    Any(Vec<Matcher>),
}

impl Matcher {
    pub fn matches(&self, el: &Element) -> bool {
        match self {
            Matcher::HasClass(c) => el.has_class(c),
            Matcher::ClassIs(c) => el.attr("class") == *c,
            Matcher::AttrEq(k, v) => el.attr(k) == *v,
            Matcher::AttrContains(k, v) => el.attr(k).contains(v),
            Matcher::OwnTextContains(needle) => el.own_text().to_lowercase().contains(needle),
            Matcher::HasText => !el.text().is_empty(),
            Matcher::TextContains(needle) => el.text().contains(needle),
            Matcher::TextEq(s) => el.text() == *s,
            Matcher::Not(inner) => !inner.matches(el),
            Matcher::All(all) => all.iter().all(|m| m.matches(el)),
            Matcher::Any(any) => any.iter().any(|m| m.matches(el)),
        }
    }

    pub fn and(self, other: Matcher) -> Matcher {
        match self {
            Matcher::All(mut all) => {
                all.push(other);
                Matcher::All(all)
            }
            m => Matcher::All(vec![m, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Matcher {
        Matcher::Not(Box::new(self))
    }
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape_text(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_walk_in_document_order() {
        let doc = Document::parse("<ul><li>a</li><li>b<span>c</span></li></ul>");
        let tags: Vec<&str> = doc.root().walk().map(|e| e.tag.as_str()).collect();
        let li = tags.iter().position(|t| *t == "li").unwrap();
        assert_eq!(&tags[li..], &["li", "li", "span"]);
    }

    #[test]
    fn own_text_excludes_children() {
        let el = Element::new("a")
            .with_text("Duke ")
            .with_child(Element::new("b").with_text("University"));
        assert_eq!(el.own_text(), "Duke");
        assert_eq!(el.text(), "Duke University");
    }

    #[test]
    fn outer_html_escapes_and_skips_void_close() {
        let el = Element::new("td")
            .with_attr("class", "x\"y")
            .with_text("A & B\u{a0}C")
            .with_child(Element::new("br"));
        assert_eq!(el.outer_html(), "<td class=\"x&quot;y\">A &amp; B&nbsp;C<br></td>");
    }

    #[test]
    fn table_rows_serialize_with_bare_tr() {
        let doc = Document::parse("<table class=\"infobox vcard\"><tr><th>Type</th><td>Private</td></tr></table>");
        let table = doc.select_last(&Matcher::ClassIs("infobox vcard")).unwrap();
        let html = table.outer_html();
        assert!(html.contains("<tbody><tr><th>Type</th><td>Private</td></tr></tbody>"), "{}", html);
    }

    #[test]
    fn matcher_combinators() {
        let el = Element::new("a")
            .with_attr("href", "/wiki/List_of_things")
            .with_attr("class", "mw-headline extra")
            .with_text("Some College");
        assert!(Matcher::HasClass("extra").matches(&el));
        assert!(!Matcher::ClassIs("extra").matches(&el));
        assert!(Matcher::OwnTextContains("college").matches(&el));
        assert!(Matcher::AttrContains("href", "/wiki/List_of_").matches(&el));
        let m = Matcher::HasText.and(Matcher::TextEq("School").not());
        assert!(m.matches(&el));
        let either = Matcher::Any(vec![
            Matcher::TextEq("nope"),
            Matcher::AttrEq("href", "/wiki/List_of_things"),
        ]);
        assert!(either.matches(&el));
    }

    #[test]
    fn missing_attr_is_empty() {
        let el = Element::new("a");
        assert_eq!(el.attr("href"), "");
    }
}
