use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::ValueEnum;
use csv::{QuoteStyle, WriterBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::region::Region;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const SUMMARY_FILE: &str = "summary.json";
const COMBINED_NAME: &str = "(ALL)";

/// Hands a region's finished table to its destination.
pub trait TabularSink: Send + Sync {
    fn write(&self, region: &Region, schema: &[String], rows: &[Vec<String>]) -> Result<PathBuf>;
}

/// `<out>/<ABBR>/csv/<timestamp>.csv`, every cell quoted.
pub struct CsvSink {
    root: PathBuf,
}

impl CsvSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TabularSink for CsvSink {
    fn write(&self, region: &Region, schema: &[String], rows: &[Vec<String>]) -> Result<PathBuf> {
        let dir = self.root.join(&region.abbr).join("csv");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(format!("{}.csv", Local::now().format(TIMESTAMP_FORMAT)));

        let mut wtr = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        if !schema.is_empty() {
            wtr.write_record(schema.iter().map(|c| escape_cell(c)))?;
        }
        for row in rows {
            wtr.write_record(row.iter().map(|c| escape_cell(c)))?;
        }
        wtr.flush()?;

        info!("{}: wrote {} rows to {}", region.abbr, rows.len(), path.display());
        Ok(path)
    }
}

/// Double quotes inside a cell become two single quotes.
fn escape_cell(cell: &str) -> String {
    cell.replace('"', "''")
}

/// Intermediate products that can be dumped for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Artifact {
    Candidates,
    Rows,
    Headers,
    Values,
    Coordinates,
    Ip,
    Description,
    /// Outer HTML of the info panel.
    Element,
    /// The panel's payload node, before row splitting.
    Node,
}

impl Artifact {
    fn dir(self) -> &'static str {
        match self {
            Artifact::Candidates => "candidates",
            Artifact::Rows => "rows",
            Artifact::Headers => "headers",
            Artifact::Values => "values",
            Artifact::Coordinates => "coordinates",
            Artifact::Ip => "ip",
            Artifact::Description => "description",
            Artifact::Element => "elem",
            Artifact::Node => "node",
        }
    }

    /// Kinds merged into one `(ALL).txt` per region when combining.
    fn combinable(self) -> bool {
        matches!(
            self,
            Artifact::Rows | Artifact::Headers | Artifact::Values | Artifact::Coordinates | Artifact::Ip
        )
    }
}

/// Writes enabled artifacts to `<out>/<ABBR>/<kind>/<name>.txt`. Never fails the run.
pub struct ArtifactWriter {
    root: PathBuf,
    enabled: BTreeSet<Artifact>,
    combine: bool,
}

impl ArtifactWriter {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            root: config.output_dir.clone(),
            enabled: config.dump.clone(),
            combine: config.combine_dumps,
        }
    }

    pub fn enabled(&self, kind: Artifact) -> bool {
        self.enabled.contains(&kind)
    }

    pub fn path(&self, region: &Region, kind: Artifact, name: &str) -> PathBuf {
        self.root
            .join(&region.abbr)
            .join(kind.dir())
            .join(format!("{}.txt", name))
    }

    pub fn write(&self, region: &Region, kind: Artifact, name: &str, contents: &str) {
        if !self.enabled(kind) {
            return;
        }
        let path = self.path(region, kind, name);
        if let Err(e) = write_text(&path, contents) {
            warn!("Could not write {}: {:#}", path.display(), e);
        }
    }

    /// Same as `write` with one entry per line.
    pub fn write_lines<I, S>(&self, region: &Region, kind: Artifact, name: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.enabled(kind) {
            return;
        }
        let text: Vec<String> = lines.into_iter().map(|l| l.as_ref().to_string()).collect();
        self.write(region, kind, name, &text.join("\n"));
    }

    /// Concatenate each enabled per-entity folder into its `(ALL).txt`, in file name order.
    pub fn combine(&self, region: &Region) {
        if !self.combine {
            return;
        }
        for kind in self.enabled.iter().filter(|k| k.combinable()) {
            let dir = self.root.join(&region.abbr).join(kind.dir());
            if let Err(e) = combine_dir(&dir) {
                warn!("Could not combine {}: {:#}", dir.display(), e);
            }
        }
    }
}

fn combine_dir(dir: &Path) -> Result<()> {
    let combined = dir.join(format!("{}.txt", COMBINED_NAME));
    let mut parts: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && *p != combined)
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    parts.sort();

    let mut out = String::new();
    for part in &parts {
        let text = std::fs::read_to_string(part)
            .with_context(|| format!("Failed to read {}", part.display()))?;
        for line in text.lines() {
            out.push_str(line);
            out.push('\n');
        }
    }
    write_text(&combined, &out)?;
    debug!("Combined {} files into {}", parts.len(), combined.display());
    Ok(())
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Pretty JSON at `<out>/summary.json`.
pub fn write_summary<T: Serialize>(root: &Path, summary: &T) -> Result<PathBuf> {
    let path = root.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(summary)?;
    write_text(&path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Run summary written to {}", path.display());
    Ok(path)
}
