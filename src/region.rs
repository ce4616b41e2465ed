use serde::Serialize;

const LISTING_URL_PREFIX: &str =
    "https://en.wikipedia.org/wiki/List_of_colleges_and_universities_in_";

const STATES: &[(&str, &str)] = &[
    ("AK", "Alaska"),
    ("AL", "Alabama"),
    ("AR", "Arkansas"),
    ("AZ", "Arizona"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("IA", "Iowa"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("MA", "Massachusetts"),
    ("MD", "Maryland"),
    ("ME", "Maine"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MO", "Missouri"),
    ("MS", "Mississippi"),
    ("MT", "Montana"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("NE", "Nebraska"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NV", "Nevada"),
    ("NY", "New York"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VA", "Virginia"),
    ("VT", "Vermont"),
    ("WA", "Washington"),
    ("WI", "Wisconsin"),
    ("WV", "West Virginia"),
    ("WY", "Wyoming"),
];

/// A scraped partition, e.g. one US state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Region {
    pub abbr: String,
    pub name: String,
}

impl Region {
    pub fn new(abbr: &str, name: &str) -> Self {
        Self {
            abbr: abbr.to_string(),
            name: name.replace('_', " "),
        }
    }

    /// Case-insensitive lookup in the built-in state table.
    pub fn lookup(abbr: &str) -> Option<Self> {
        STATES
            .iter()
            .find(|(a, _)| a.eq_ignore_ascii_case(abbr.trim()))
            .map(|(a, n)| Self::new(a, n))
    }

    pub fn all() -> Vec<Self> {
        STATES.iter().map(|(a, n)| Self::new(a, n)).collect()
    }

    pub fn listing_url(&self) -> String {
        format!("{}{}", LISTING_URL_PREFIX, self.name.replace(' ', "_"))
    }

    /// Whether a location value places the entity inside this region.
    ///
    /// The entity's own name may carry the full region name; the location
    /// value may carry either the full name or the abbreviation.
    pub fn contains_location(&self, entity_name: &str, location: &str) -> bool {
        entity_name.contains(&self.name)
            || location.contains(&self.name)
            || location.contains(&self.abbr)
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.abbr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_listing_url() {
        let nc = Region::lookup("nc").unwrap();
        assert_eq!(nc.name, "North Carolina");
        assert_eq!(
            nc.listing_url(),
            "https://en.wikipedia.org/wiki/List_of_colleges_and_universities_in_North_Carolina"
        );
        assert!(Region::lookup("XX").is_none());
        assert_eq!(Region::all().len(), 50);
    }

    #[test]
    fn underscored_names_are_spaced() {
        assert_eq!(Region::new("NC", "North_Carolina").name, "North Carolina");
    }

    #[test]
    fn location_membership() {
        let nc = Region::new("NC", "North Carolina");
        assert!(nc.contains_location("Duke University", "Durham, NC"));
        assert!(nc.contains_location("Duke University", "Durham, North Carolina, U.S."));
        assert!(nc.contains_location("University of North Carolina at Asheville", "Asheville"));
        assert!(!nc.contains_location("Ohio State University", "Ohio"));
        // the entity name only counts with the full region name
        assert!(!nc.contains_location("NC State", "Raleigh"));
    }
}
