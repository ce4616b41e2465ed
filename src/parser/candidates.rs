use std::collections::HashSet;
use std::sync::LazyLock;

use serde::Serialize;
use tracing::debug;

use crate::dom::{Document, Element, Matcher};

/// Institution-class nouns searched for in each element's own text.
const TYPE_KEYWORDS: &[&str] = &["university", "college", "institute", "seminary", "school"];

const REDIRECT_MARKER: &str = "/w/index.php?title=";

/// Structural and known non-entity elements on a listing page.
static NOISE: LazyLock<Matcher> = LazyLock::new(|| {
    Matcher::Any(vec![
        Matcher::HasClass("toctext"),
        Matcher::HasClass("mw-headline"),
        Matcher::HasClass("navbox-group"),
        Matcher::HasClass("reference-text"),
        Matcher::AttrContains(
            "href",
            "/wiki/Carnegie_Classification_of_Institutions_of_Higher_Education",
        ),
        Matcher::AttrContains("href", "/wiki/List_of_"),
        Matcher::AttrContains("href", "/wiki/Category"),
        Matcher::AttrEq("href", "/wiki/College"),
        Matcher::AttrEq("href", "/wiki/North_Carolina_Community_College_System"),
        Matcher::AttrEq("href", "/wiki/University_of_North_Carolina"),
        Matcher::AttrEq("dir", "auto"),
        Matcher::AttrEq("dir", "ltr"),
        Matcher::AttrEq("rel", "nofollow"),
        Matcher::AttrEq("color", "#FFDD00"),
        Matcher::ClassIs("citation web"),
        Matcher::AttrEq("style", "color:white"),
        Matcher::HasText.not(),
        Matcher::TextContains("List of"),
        Matcher::TextEq("School"),
    ])
});

/// An entity reference discovered on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub link: String,
}

impl Candidate {
    fn from_element(el: &Element) -> Self {
        Self {
            name: el.text(),
            link: el.attr("href").to_string(),
        }
    }
}

/// Scan a listing page for institution links, drop noise, dedup, repair links.
pub fn extract(listing: &Document) -> Vec<Candidate> {
    let pool = collect_pool(listing);
    let pooled = pool.len();
    let mut unique = dedup(pool);
    for c in &mut unique {
        if c.link.contains(REDIRECT_MARKER) {
            c.link = repair_link(&c.link);
        }
    }
    debug!("Candidates: {} pooled, {} unique", pooled, unique.len());
    unique
}

/// Every surviving element for every keyword, duplicates included.
fn collect_pool(listing: &Document) -> Vec<Candidate> {
    let mut pool = Vec::new();
    for keyword in TYPE_KEYWORDS {
        let matcher = Matcher::OwnTextContains(keyword).and(NOISE.clone().not());
        pool.extend(listing.select(&matcher).map(Candidate::from_element));
    }
    pool
}

/// Drop a candidate whose link or name was already kept. First one wins.
pub fn dedup(pool: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen_links = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut unique = Vec::new();

    for c in pool {
        if seen_links.contains(&c.link) || seen_names.contains(&c.name) {
            continue;
        }
        seen_links.insert(c.link.clone());
        seen_names.insert(c.name.clone());
        unique.push(c);
    }

    unique
}

/// `/w/index.php?title=Foo_College&action=edit&redlink=1` → `/wiki/Foo_College`
pub fn repair_link(link: &str) -> String {
    let Some(eq) = link.find('=') else {
        return link.to_string();
    };
    let rest = &link[eq + 1..];
    let title = rest.split('&').next().unwrap_or(rest);
    format!("/wiki/{}", title)
}
