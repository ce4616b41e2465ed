use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::dom::Document;
use crate::error::{DropReason, RegionError};
use crate::fetch::{detail_url, DocumentSource, LISTING_KEY};
use crate::output::{Artifact, ArtifactWriter, TabularSink};
use crate::parser::candidates::{self, Candidate};
use crate::parser::record::{self, display_name, DetailPage, Record};
use crate::parser::schema::{self, Table};
use crate::parser::parse_details;
use crate::region::Region;
use crate::resolve::HostResolver;

/// External collaborators shared by every region task.
#[derive(Clone)]
pub struct Services {
    pub source: Arc<dyn DocumentSource>,
    /// `None` disables address lookups.
    pub resolver: Option<Arc<dyn HostResolver>>,
    pub sink: Arc<dyn TabularSink>,
}

/// Per-region counts of processed and dropped entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionStats {
    pub candidates: usize,
    pub missing_documents: usize,
    pub malformed: usize,
    pub records: usize,
    pub invalid: usize,
    pub rows: usize,
}

impl RegionStats {
    pub fn dropped(&self) -> usize {
        self.missing_documents + self.malformed + (self.records - self.rows)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionReport {
    pub region: Region,
    pub stats: RegionStats,
    pub table: Table,
    pub output: PathBuf,
}

/// Listing page to written table, for one region.
pub async fn run_region(
    region: &Region,
    config: &RunConfig,
    services: &Services,
) -> Result<RegionReport, RegionError> {
    let artifacts = ArtifactWriter::new(config);

    let listing = services
        .source
        .fetch(region, LISTING_KEY, &region.listing_url())
        .await
        .ok_or_else(|| RegionError::ListingUnavailable(region.abbr.clone()))?;
    let candidates = candidates::extract(&listing);
    info!("{}: {} candidates", region.abbr, candidates.len());
    artifacts.write_lines(
        region,
        Artifact::Candidates,
        LISTING_KEY,
        candidates.iter().map(|c| format!("{}\t{}", c.name, c.link)),
    );

    let mut stats = RegionStats {
        candidates: candidates.len(),
        ..Default::default()
    };

    let docs = fetch_details(region, &candidates, services.source.as_ref()).await;
    let parsed = tokio::task::spawn_blocking(move || parse_details(&candidates, &docs)).await?;

    let mut records = Vec::with_capacity(parsed.len());
    for detail in parsed {
        let detail = match detail {
            Ok(detail) => detail,
            Err(DropReason::DocumentUnavailable) => {
                stats.missing_documents += 1;
                continue;
            }
            Err(DropReason::Malformed(why)) => {
                debug!("{}: dropped candidate, {}", region.abbr, why);
                stats.malformed += 1;
                continue;
            }
        };
        dump_detail(&artifacts, region, &detail);

        let ip = record::resolve_ip(detail.website(), services.resolver.as_deref()).await;
        let record = record::assemble(&detail, region, &ip);
        dump_record(&artifacts, region, &record, &ip);
        if !record.is_valid() {
            stats.invalid += 1;
        }
        records.push(record);
    }
    stats.records = records.len();
    artifacts.combine(region);

    let table = schema::unify(&records);
    stats.rows = table.rows.len();

    let output = services
        .sink
        .write(region, &table.schema, &table.rows)
        .map_err(|e| RegionError::Output(format!("{:#}", e)))?;

    info!(
        "{}: {} rows, {} columns ({} dropped)",
        region.abbr,
        stats.rows,
        table.schema.len(),
        stats.dropped()
    );
    Ok(RegionReport {
        region: region.clone(),
        stats,
        table,
        output,
    })
}

/// Detail documents in candidate order. A candidate without a link has none.
async fn fetch_details(
    region: &Region,
    candidates: &[Candidate],
    source: &dyn DocumentSource,
) -> Vec<Option<Document>> {
    let mut docs = Vec::with_capacity(candidates.len());
    for c in candidates {
        let doc = if c.link.is_empty() {
            None
        } else {
            source
                .fetch(region, &display_name(&c.name), &detail_url(&c.link))
                .await
        };
        docs.push(doc);
    }
    docs
}

fn dump_detail(artifacts: &ArtifactWriter, region: &Region, detail: &DetailPage) {
    let name = detail.name.as_str();
    artifacts.write(region, Artifact::Element, name, &detail.panel_html);
    artifacts.write(region, Artifact::Node, name, &detail.payload_html);
    artifacts.write_lines(region, Artifact::Rows, name, &detail.raw_rows);
    artifacts.write_lines(
        region,
        Artifact::Headers,
        name,
        detail.rows.iter().map(|r| r.header.as_deref().unwrap_or_default()),
    );
    artifacts.write_lines(
        region,
        Artifact::Values,
        name,
        detail.rows.iter().map(|r| r.value.as_deref().unwrap_or_default()),
    );
    artifacts.write(region, Artifact::Coordinates, name, &detail.coordinates);
}

fn dump_record(artifacts: &ArtifactWriter, region: &Region, record: &Record, ip: &str) {
    artifacts.write(region, Artifact::Ip, &record.name, ip);
    let description = record.describe();
    debug!("{}", description);
    artifacts.write(region, Artifact::Description, &record.name, &description);
}
