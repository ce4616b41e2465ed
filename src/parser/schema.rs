use std::collections::HashSet;

use serde::Serialize;

use super::record::{name_first, Record, INVALID_SENTINEL, PLACEHOLDER};

/// A region's unified column list and the rows projected onto it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub schema: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Union of headers over every record, valid or not. `Name` first, the rest sorted.
pub fn schema_of(records: &[Record]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut schema: Vec<String> = records
        .iter()
        .flat_map(|r| r.headers())
        .filter(|h| seen.insert(*h))
        .map(str::to_string)
        .collect();
    schema.sort_by(|a, b| name_first(a, b));
    schema
}

/// Project a record onto `schema`. `None` when the record must not be emitted.
pub fn project(record: &Record, schema: &[String]) -> Option<Vec<String>> {
    if !record.is_valid() {
        return None;
    }
    let mut row = Vec::with_capacity(schema.len());
    for column in schema {
        match record.get(column) {
            Some(INVALID_SENTINEL) => return None,
            Some(value) => row.push(value.to_string()),
            None => row.push(PLACEHOLDER.to_string()),
        }
    }
    Some(row)
}

pub fn unify(records: &[Record]) -> Table {
    let schema = schema_of(records);
    let rows = records.iter().filter_map(|r| project(r, &schema)).collect();
    Table { schema, rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, &str)]) -> Record {
        let mut r = Record::new(fields[0].1, "NC");
        for (h, v) in fields {
            r.insert(h, v);
        }
        r
    }

    #[test]
    fn name_leads_then_alphabetical() {
        let records = vec![
            record(&[("Name", "Duke University"), ("Type", "Private"), ("Motto", "Eruditio et Religio")]),
            record(&[("Name", "Meredith College"), ("Colors", "Maroon and white"), ("Type", "Private")]),
        ];
        let table = unify(&records);
        assert_eq!(table.schema, vec!["Name", "Colors", "Motto", "Type"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["Duke University", " ", "Eruditio et Religio", "Private"],
                vec!["Meredith College", "Maroon and white", " ", "Private"],
            ]
        );
    }

    #[test]
    fn invalid_records_leak_headers_but_not_rows() {
        let mut ohio = record(&[("Name", "Ohio State University"), ("Established", "1870")]);
        ohio.invalidate();
        let records = vec![record(&[("Name", "Duke University"), ("Type", "Private")]), ohio];
        let table = unify(&records);
        assert_eq!(table.schema, vec!["Name", "Established", "Type"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0], vec!["Duke University", " ", "Private"]);
    }

    #[test]
    fn sentinel_value_excludes_row() {
        let records = vec![record(&[("Name", "Odd College"), ("Motto", INVALID_SENTINEL)])];
        let table = unify(&records);
        assert_eq!(table.schema, vec!["Name", "Motto"]);
        assert!(table.rows.is_empty());
    }

    #[test]
    fn every_row_matches_schema_width() {
        let records = vec![
            record(&[("Name", "A College"), ("Zeta", "z")]),
            record(&[("Name", "B College"), ("Alpha", "a")]),
            record(&[("Name", "C College")]),
        ];
        let table = unify(&records);
        assert!(table.rows.iter().all(|r| r.len() == table.schema.len()));
    }

    #[test]
    fn empty_region() {
        let table = unify(&[]);
        assert!(table.schema.is_empty());
        assert!(table.rows.is_empty());
    }
}
