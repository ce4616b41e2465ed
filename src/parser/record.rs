use std::cmp::Ordering;
use std::sync::LazyLock;

use serde::Serialize;
use tracing::debug;

use super::candidates::Candidate;
use super::normalize::{normalize, trim_boundaries, Branch};
use crate::dom::{Document, Matcher, Node};
use crate::error::DropReason;
use crate::region::Region;
use crate::resolve::HostResolver;

pub const NAME: &str = "Name";
pub const LOCATIONS: &str = "Locations";
pub const WEBSITE: &str = "Website";
pub const COORDINATES: &str = "Coordinates";
pub const IP_ADDRESS: &str = "IP Address";

/// Stored in place of every value once a record fails the region check.
pub const INVALID_SENTINEL: &str = "INVALID_INSTITUTION";

/// Cell value for anything unknown.
pub const PLACEHOLDER: &str = " ";

const MAX_NAME_CHARS: usize = 100;

const ROW_OPEN: &str = "<tr>";
const ROW_CLOSE: &str = "</tr>";
const HEADER_OPEN: &str = "<th";
const HEADER_CLOSE: &str = "</th>";
const VALUE_OPEN: &str = "<td";
const VALUE_CLOSE: &str = "</td>";
const COORD_SEPARATOR: &str = " / ";

/// Checked in order; the first one found at a label boundary wins.
const KNOWN_TLDS: &[&str] = &[".gov", ".mil", ".us", ".edu", ".org", ".net", ".com"];
const DEFAULT_TLD: &str = ".edu";

static INFO_PANEL: LazyLock<Matcher> = LazyLock::new(|| Matcher::ClassIs("infobox vcard"));
static GEO_DECIMAL: LazyLock<Matcher> = LazyLock::new(|| Matcher::ClassIs("geo-dec"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeRow {
    pub header: Option<String>,
    pub value: Option<String>,
}

/// Everything that can be read off a detail page without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailPage {
    pub name: String,
    /// Serialized info panel and its payload node, kept for dumps.
    pub panel_html: String,
    pub payload_html: String,
    pub raw_rows: Vec<String>,
    pub rows: Vec<AttributeRow>,
    pub coordinates: String,
}

impl DetailPage {
    /// Value of the first row whose header is `Website`.
    pub fn website(&self) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.header.as_deref() == Some(WEBSITE))
            .and_then(|r| r.value.as_deref())
    }
}

/// One entity's attributes, keyed by unique header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub name: String,
    pub region: String,
    fields: Vec<(String, String)>,
    valid: bool,
}

impl Record {
    pub fn new(name: &str, region: &str) -> Self {
        Self {
            name: name.to_string(),
            region: region.to_string(),
            fields: Vec::new(),
            valid: true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(h, _)| h.as_str())
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    /// Add a field. Ignored once invalid, or when the header is already
    /// present (the first occurrence is kept).
    pub fn insert(&mut self, header: &str, value: &str) -> bool {
        if !self.valid || self.get(header).is_some() {
            return false;
        }
        self.fields.push((header.to_string(), value.to_string()));
        true
    }

    /// Insert, or overwrite the existing value in place.
    fn upsert(&mut self, header: &str, value: &str) {
        if !self.valid {
            return;
        }
        match self.fields.iter_mut().find(|(h, _)| h == header) {
            Some((_, v)) => *v = value.to_string(),
            None => self.fields.push((header.to_string(), value.to_string())),
        }
    }

    /// Terminal. Headers gathered so far stay, their values become the sentinel.
    pub fn invalidate(&mut self) {
        self.valid = false;
        for (_, v) in &mut self.fields {
            *v = INVALID_SENTINEL.to_string();
        }
    }

    fn alphabetize(&mut self) {
        self.fields.sort_by(|(a, _), (b, _)| name_first(a, b));
    }

    /// Padded `header: value` listing, one field per line.
    pub fn describe(&self) -> String {
        let width = self.headers().map(|h| h.chars().count()).max().unwrap_or(0);
        let mut out = self.name.clone();
        for (h, v) in &self.fields {
            out.push_str(&format!("\n{:<width$}:\t{}", h, v, width = width));
        }
        out
    }
}

/// Header ordering used everywhere: `Name` first, the rest ascending.
pub fn name_first(a: &str, b: &str) -> Ordering {
    match (a == NAME, b == NAME) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.cmp(b),
    }
}

/// Names double as cache keys and file names.
pub fn display_name(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\u{fffd}' | '\u{2013}' | '/' => '-',
            c => c,
        })
        .take(MAX_NAME_CHARS)
        .collect()
}

/// Read the info panel and coordinates off a detail page.
pub fn parse_detail(candidate: &Candidate, doc: Option<&Document>) -> Result<DetailPage, DropReason> {
    let name = display_name(&candidate.name);
    let doc = doc.ok_or(DropReason::DocumentUnavailable)?;
    let panel = doc
        .select_last(&INFO_PANEL)
        .ok_or(DropReason::Malformed("no info panel"))?;

    let payload = panel
        .children
        .iter()
        .rev()
        .map(Node::to_html)
        .find(|html| !html.trim().is_empty())
        .ok_or(DropReason::Malformed("empty info panel"))?;
    let payload = payload.replace('\n', "");

    let raw_rows = split_rows(&payload);
    if raw_rows.is_empty() {
        return Err(DropReason::Malformed("no rows"));
    }

    let rows = raw_rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            if i == 0 {
                return AttributeRow {
                    header: Some(NAME.to_string()),
                    value: Some(name.clone()),
                };
            }
            AttributeRow {
                header: slice_fragment(row, HEADER_OPEN, HEADER_CLOSE)
                    .and_then(|f| normalize(f, Branch::Header)),
                value: slice_fragment(row, VALUE_OPEN, VALUE_CLOSE)
                    .and_then(|f| normalize(f, Branch::Value)),
            }
        })
        .collect();

    Ok(DetailPage {
        name,
        panel_html: panel.outer_html(),
        payload_html: payload,
        raw_rows,
        rows,
        coordinates: coordinates(doc),
    })
}

/// Fragments between `<tr>` and `</tr>`. Unterminated fragments are dropped.
pub fn split_rows(payload: &str) -> Vec<String> {
    payload
        .split(ROW_OPEN)
        .filter_map(|frag| frag.find(ROW_CLOSE).map(|end| frag[..end].to_string()))
        .collect()
}

/// `open` through the first `close` after it, both included.
pub fn slice_fragment<'a>(row: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = row.find(open)?;
    let end = start + row[start..].find(close)? + close.len();
    Some(&row[start..end])
}

/// Decimal coordinates from the page's geo element.
pub fn coordinates(doc: &Document) -> String {
    let Some(geo) = doc.select_last(&GEO_DECIMAL) else {
        return PLACEHOLDER.to_string();
    };
    let text = geo.text();
    let coords = match (text.find(COORD_SEPARATOR), text.rfind(COORD_SEPARATOR)) {
        // Separators that share a space do not bound a span.
        (Some(first), Some(last)) if last >= first + COORD_SEPARATOR.len() => {
            &text[first + COORD_SEPARATOR.len()..last]
        }
        (Some(first), _) => &text[first + COORD_SEPARATOR.len()..],
        _ => text.as_str(),
    };
    if coords.trim().is_empty() {
        PLACEHOLDER.to_string()
    } else {
        coords.to_string()
    }
}

/// Reduce a website value to a `www.` host name.
pub fn website_host(url: &str) -> String {
    let mut host = url.replace(' ', "%20").to_lowercase();
    if host.contains("http") {
        if let Some(idx) = host.find("://") {
            host.drain(..idx + 3);
        }
    }
    if !host.starts_with("www.") {
        host.insert_str(0, "www.");
    }

    for tld in KNOWN_TLDS {
        if let Some(end) = find_tld(&host, tld) {
            host.truncate(end);
            return host;
        }
    }

    let trimmed = trim_boundaries(&host).unwrap_or(host);
    format!("{}{}", trimmed, DEFAULT_TLD)
}

/// End offset of `tld` where it closes a host label, not mid-label.
///
/// A plain substring match would cut `www.usc.edu` at `.us`, so the TLD
/// must be followed by the end of the host or a URL delimiter.
fn find_tld(host: &str, tld: &str) -> Option<usize> {
    host.match_indices(tld).map(|(i, _)| i + tld.len()).find(|&end| {
        matches!(host[end..].chars().next(), None | Some('/' | ':' | '.' | '?' | '#'))
    })
}

/// Best-effort address for the record's website. Blank on any failure.
pub async fn resolve_ip(website: Option<&str>, resolver: Option<&dyn HostResolver>) -> String {
    let (Some(url), Some(resolver)) = (website, resolver) else {
        return PLACEHOLDER.to_string();
    };
    let host = website_host(url);
    match resolver.resolve(&host).await {
        Some(ip) => ip.to_string(),
        None => {
            debug!("No address for {}", host);
            PLACEHOLDER.to_string()
        }
    }
}

/// Build the record from parsed rows, applying the region check.
pub fn assemble(detail: &DetailPage, region: &Region, ip: &str) -> Record {
    let mut record = Record::new(&detail.name, &region.abbr);
    let entity_name = detail
        .rows
        .first()
        .and_then(|r| r.value.as_deref())
        .unwrap_or_default();

    for row in &detail.rows {
        let (Some(header), Some(value)) = (row.header.as_deref(), row.value.as_deref()) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        if header != LOCATIONS {
            record.insert(header, value);
            continue;
        }
        if !region.contains_location(entity_name, value) {
            debug!("{} is not in {}: {:?}", detail.name, region.abbr, value);
            record.invalidate();
            break;
        }
        if let Some(location) = trim_location(value) {
            record.insert(header, &location);
        }
    }

    if record.is_valid() {
        record.alphabetize();
        record.upsert(COORDINATES, &detail.coordinates);
        record.upsert(IP_ADDRESS, ip);
    }
    record
}

/// Boundary-trim, cutting off trailing numeric remnants such as ZIP codes.
fn trim_location(value: &str) -> Option<String> {
    let mut value = value.to_string();
    loop {
        value = trim_boundaries(&value)?;
        if !value.ends_with(|c: char| c.is_ascii_digit()) {
            return Some(value);
        }
        if value.chars().count() == 1 {
            return None;
        }
        let cut = value.rfind(' ')?;
        value.truncate(cut);
    }
}

/// Parse, resolve and assemble in one go.
pub async fn build(
    candidate: &Candidate,
    region: &Region,
    doc: Option<&Document>,
    resolver: Option<&dyn HostResolver>,
) -> Result<Record, DropReason> {
    let detail = parse_detail(candidate, doc)?;
    let ip = resolve_ip(detail.website(), resolver).await;
    Ok(assemble(&detail, region, &ip))
}
