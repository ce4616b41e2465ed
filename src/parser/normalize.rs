//! Text normalization for infobox rows.
//!
//! Every raw `<th>`/`<td>` fragment goes through the same fixed sequence:
//! tag-content extraction, markup cleanup, header or value fixes,
//! nullification of sentinel values, then boundary trimming. Each stage is a
//! separate function so callers (and tests) can observe the intermediate text.

use std::sync::LazyLock;

use regex::Regex;

static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?:[1-9]|[12][0-9]|30|citation needed|dead link|update|)\]").unwrap()
});
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Header fragments mentioning any of these are ranking tables, never columns.
const RANKING_BLACKLIST: &[&str] = &[
    "College and university rankings",
    "National",
    "Forbes",
    "U.S._News_%26_World_Report",
    "Global",
    "Washington Monthly",
    "ARWU",
    "QS",
    "Times",
    "Bloomberg",
];

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&sup2;", "2"),
    ("&deg;", "\u{b0}"),
    ("&frac12;", "\u{bd}"),
    ("&gt;", ">"),
    ("&lt;", "<"),
    ("&oacute;", "\u{f3}"),
    ("&AElig;", "\u{c6}"),
    ("&eacute;", "\u{e9}"),
    ("&reg;", "\u{ae}"),
    ("&ograve;", "\u{f2}"),
    ("&iacute;", "\u{ed}"),
];

const NULL_SENTINELS: &[&str] = &["N/A", "not available", "~"];

const BOUNDARY_CHARS: &[char] = &[',', ';', ':', '-', ' ', '\\', '/', '\u{86}', '\u{2020}'];

const TLD_URL_MARKERS: &[&str] = &["http", "www.", ".edu"];

/// Relative-date annotation Wikipedia appends to dates.
const DAYS_AGO: &str = " days ago)";

pub const STUDENT_FACULTY_RATIO: &str = "Student-Faculty Ratio";

/// Which side of a row a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Header,
    Value,
}

/// Full pipeline for one raw fragment. `None` means the field is absent.
pub fn normalize(raw: &str, branch: Branch) -> Option<String> {
    if branch == Branch::Header && is_blacklisted(raw) {
        return None;
    }
    let cleaned = clean_markup(&extract_tag_content(raw));
    if cleaned.is_empty() {
        return None;
    }
    let fixed = match branch {
        Branch::Header => canonicalize_header(&cleaned),
        Branch::Value => fix_value(&cleaned),
    };
    if is_null_sentinel(&fixed) {
        return None;
    }
    trim_boundaries(&fixed)
}

pub fn is_blacklisted(raw_header: &str) -> bool {
    RANKING_BLACKLIST.iter().any(|b| raw_header.contains(b))
}

/// Keep only the text found between a `>` and the following `<`.
pub fn extract_tag_content(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut copying = false;
    for ch in fragment.chars() {
        match ch {
            '>' => copying = true,
            '<' => copying = false,
            c if copying => out.push(c),
            _ => {}
        }
    }
    out
}

/// Line breaks, entities, stray glyphs and citation brackets.
pub fn clean_markup(text: &str) -> String {
    let mut s: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();

    if s.contains('&') {
        for (entity, literal) in ENTITIES {
            s = s.replace(entity, literal);
        }
    }

    s = s
        .replace('?', "'")
        .replace(['\u{fffd}', '\u{2588}', '\u{2022}', '>'], "")
        .replace('\u{2014}', "-");

    if s.contains('[') {
        s = CITATION_RE.replace_all(&s, "").into_owned();
    }

    s.trim().to_string()
}

/// Uppercase the first character and every character after a space or hyphen.
pub fn capitalize_words(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut cap_next = true;
    for ch in line.chars() {
        if cap_next {
            out.extend(ch.to_uppercase());
            cap_next = false;
        } else {
            if ch == ' ' || ch == '-' {
                cap_next = true;
            }
            out.push(ch);
        }
    }
    out
}

/// Fold the many spellings of a header into one column name.
///
/// Rules run in sequence and later rules see the output of earlier ones, so
/// "Campus Type" ends up as "Type" and "Religious Affiliation" as
/// "Religious Affiliations".
pub fn canonicalize_header(header: &str) -> String {
    let mut line = if header.contains(' ') || header.contains('-') {
        capitalize_words(header)
    } else {
        header.to_string()
    };

    let set = |line: &mut String, to: &str| *line = to.to_string();

    if matches!(line.as_str(), "Formation" | "Founded" | "Opened") {
        set(&mut line, "Established");
    }
    if line == "Area" {
        set(&mut line, "Coordinates");
    }
    if line == "Budget" {
        set(&mut line, "Endowment");
    }
    if line == "Slogan" || (line.contains("Motto") && !line.contains("English")) {
        set(&mut line, "Motto");
    }
    if line == "Parent School" {
        set(&mut line, "Parent Institution");
    }
    if line == "Town Or City" || line.contains("Location") {
        set(&mut line, "Locations");
    }
    if line.contains("Color") || line.contains("Colour") {
        set(&mut line, "Colors");
    }
    if line.contains("Type") {
        set(&mut line, "Type");
    }
    if line.contains("Faculty Ratio") {
        set(&mut line, STUDENT_FACULTY_RATIO);
    }
    if line.contains("Mascot") {
        set(&mut line, "Mascot");
    }
    if line.contains("Website") {
        set(&mut line, "Website");
    }
    if line.contains("Affiliation") {
        let religious = line.contains("Religious");
        set(
            &mut line,
            if religious {
                "Religious Affiliations"
            } else {
                "Affiliations"
            },
        );
    }
    if line.contains("Vice") && line.contains("President") {
        set(&mut line, "Vice President");
    }
    if line.contains("Former Name") {
        set(&mut line, "Former Names");
    }
    if line.contains("Founder") {
        set(&mut line, "Founders");
    }
    line
}

/// Value-side cleanup: units, currency, coordinates, punctuation, dates.
pub fn fix_value(value: &str) -> String {
    let mut line = WS_RE.replace_all(value, " ").into_owned();

    if line.contains("m2") {
        line = line.replace("m2", "m\u{b2}");
    }
    if line.contains('$') {
        line = line.replace("US$", "US $").replace("$ ", "$");
    }
    if let Some(idx) = line.find("Coordinates:") {
        line.truncate(idx);
    }
    if let Some(idx) = line.find('\u{b0}') {
        line.truncate(idx);
    }
    if line.contains(' ') {
        line = line
            .replace(" +", "+")
            .replace("( ", "(")
            .replace(" )", ")")
            .replace(" ,", ",");
        if let Some(marker) = line.find(DAYS_AGO) {
            let cut = line[..marker].rfind('(').unwrap_or(marker);
            line.truncate(cut);
        }
    }
    if !TLD_URL_MARKERS.iter().any(|m| line.contains(m)) {
        line = line.replace('_', " ");
    }
    line
}

pub fn is_null_sentinel(text: &str) -> bool {
    text.is_empty() || NULL_SENTINELS.contains(&text)
}

/// Strip boundary punctuation from the end, then from the start, until
/// neither end matches. Returns `None` once nothing is left.
pub fn trim_boundaries(text: &str) -> Option<String> {
    let trimmed = text
        .trim_end_matches(BOUNDARY_CHARS)
        .trim_start_matches(BOUNDARY_CHARS);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALIAS_INPUTS: &[&str] = &[
        "Formation",
        "Founded",
        "Opened",
        "Area",
        "Budget",
        "Slogan",
        "Motto",
        "Motto in English",
        "Latin motto",
        "Parent school",
        "Town or city",
        "Campus location",
        "Location",
        "School colors",
        "Colour",
        "Campus type",
        "Type",
        "Student-faculty ratio",
        "Student/faculty ratio",
        "Sports mascot",
        "Mascot",
        "Official website",
        "Website",
        "Affiliation",
        "Religious affiliation",
        "Academic affiliations",
        "Vice-president",
        "Vice President",
        "Former names",
        "Former name",
        "Founder",
        "Founders",
        "Endowment",
        "President",
    ];

    #[test]
    fn canonicalize_is_idempotent() {
        for input in ALIAS_INPUTS {
            let once = canonicalize_header(input);
            assert_eq!(canonicalize_header(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn alias_table() {
        assert_eq!(canonicalize_header("Founded"), "Established");
        assert_eq!(canonicalize_header("Formation"), "Established");
        assert_eq!(canonicalize_header("Area"), "Coordinates");
        assert_eq!(canonicalize_header("Budget"), "Endowment");
        assert_eq!(canonicalize_header("Slogan"), "Motto");
        assert_eq!(canonicalize_header("Latin motto"), "Motto");
        assert_eq!(canonicalize_header("Motto in English"), "Motto In English");
        assert_eq!(canonicalize_header("Parent school"), "Parent Institution");
        assert_eq!(canonicalize_header("Town or city"), "Locations");
        assert_eq!(canonicalize_header("Campus location"), "Locations");
        assert_eq!(canonicalize_header("School colours"), "Colors");
        assert_eq!(canonicalize_header("Campus type"), "Type");
        assert_eq!(canonicalize_header("Student-faculty ratio"), STUDENT_FACULTY_RATIO);
        assert_eq!(canonicalize_header("Official website"), "Website");
        assert_eq!(canonicalize_header("Religious affiliation"), "Religious Affiliations");
        assert_eq!(canonicalize_header("Affiliations"), "Affiliations");
        assert_eq!(canonicalize_header("Vice-president"), "Vice President");
        assert_eq!(canonicalize_header("Former names"), "Former Names");
        assert_eq!(canonicalize_header("Founder"), "Founders");
        assert_eq!(canonicalize_header("President"), "President");
    }

    #[test]
    fn capitalize_after_space_and_hyphen() {
        assert_eq!(capitalize_words("student-faculty ratio"), "Student-Faculty Ratio");
        assert_eq!(capitalize_words("town or city"), "Town Or City");
    }

    #[test]
    fn town_or_city_and_religious_affiliation_stay_distinct() {
        let a = normalize("<th>Town or city</th>", Branch::Header);
        let b = normalize("<th><a href=\"/wiki/Religion\">Religious affiliation</a></th>", Branch::Header);
        assert_eq!(a.as_deref(), Some("Locations"));
        assert_eq!(b.as_deref(), Some("Religious Affiliations"));
        assert_ne!(a, b);
    }

    #[test]
    fn ranking_headers_are_dropped() {
        assert_eq!(normalize("<th><a href=\"/wiki/Forbes\">Forbes</a></th>", Branch::Header), None);
        assert_eq!(normalize("<th>National</th>", Branch::Header), None);
        // values are never blacklisted
        assert_eq!(normalize("<td>National</td>", Branch::Value).as_deref(), Some("National"));
    }

    #[test]
    fn tag_content_extraction() {
        assert_eq!(
            extract_tag_content("<td class=\"x\"><a href=\"/wiki/Durham\">Durham</a>, <b>NC</b></td>"),
            "Durham, NC"
        );
        assert_eq!(extract_tag_content("no tags at all"), "");
    }

    #[test]
    fn markup_cleanup() {
        assert_eq!(clean_markup("A&amp;M&nbsp;College[1][23]\n"), "A&M College");
        assert_eq!(clean_markup("Caf&eacute; &frac12;"), "Caf\u{e9} \u{bd}");
        assert_eq!(clean_markup("1838[citation needed][]"), "1838");
        assert_eq!(clean_markup("Duke\u{2014}Durham"), "Duke-Durham");
        assert_eq!(clean_markup("it?s"), "it's");
        assert_eq!(clean_markup("x &gt; y"), "x  y");
        // 31 is not a citation marker
        assert_eq!(clean_markup("a[31]"), "a[31]");
    }

    #[test]
    fn value_fixes() {
        assert_eq!(fix_value("530  acres (2.1 km2)"), "530 acres (2.1 km\u{b2})");
        assert_eq!(fix_value("US$ 8.6 billion"), "US $8.6 billion");
        assert_eq!(fix_value("Urban Coordinates: 35\u{b0}N"), "Urban ");
        assert_eq!(fix_value("36.0\u{b0}N 78.9\u{b0}W"), "36.0");
        assert_eq!(fix_value("Blue ( royal ) , white"), "Blue (royal), white");
        assert_eq!(fix_value("Go_Blue"), "Go Blue");
        assert_eq!(fix_value("www.duke.edu/a_b"), "www.duke.edu/a_b");
    }

    #[test]
    fn days_ago_annotation_is_dropped() {
        let fixed = fix_value("March 5, 2010 (13 years, 45 days ago)");
        assert_eq!(trim_boundaries(&fixed).as_deref(), Some("March 5, 2010"));
        assert_eq!(fix_value("1994 days ago) founded"), "1994");
        assert_eq!(fix_value("1851 (170 years, 3 days ago) (public)"), "1851 ");
    }

    #[test]
    fn boundary_trim() {
        assert_eq!(trim_boundaries("- Example; ").as_deref(), Some("Example"));
        assert_eq!(trim_boundaries("/\\Durham, NC:").as_deref(), Some("Durham, NC"));
        assert_eq!(trim_boundaries("\u{2020}x\u{86}").as_deref(), Some("x"));
        assert_eq!(trim_boundaries(" ;- "), None);
    }

    #[test]
    fn sentinels_become_absent() {
        assert_eq!(normalize("<td>N/A</td>", Branch::Value), None);
        assert_eq!(normalize("<td>not available</td>", Branch::Value), None);
        assert_eq!(normalize("<td>~</td>", Branch::Value), None);
        assert_eq!(normalize("<td></td>", Branch::Value), None);
        assert_eq!(normalize("<td>[1]</td>", Branch::Value), None);
    }
}
