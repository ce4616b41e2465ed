use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::error::{RegionError, RunError};
use crate::pipeline::{self, RegionReport, RegionStats, Services};
use crate::region::Region;

/// How one region's task ended.
#[derive(Debug)]
pub enum RegionOutcome {
    Completed(RegionReport),
    Failed { region: Region, error: String },
}

impl RegionOutcome {
    pub fn region(&self) -> &Region {
        match self {
            RegionOutcome::Completed(report) => &report.region,
            RegionOutcome::Failed { region, .. } => region,
        }
    }
}

/// Run every region on a bounded pool and wait for all of them, up to the deadline.
///
/// Outcomes come back in the order the regions were given. Exceeding the
/// deadline aborts whatever is still running and fails the whole run.
pub async fn run_extraction(
    regions: Vec<Region>,
    config: Arc<RunConfig>,
    services: Services,
) -> Result<Vec<RegionOutcome>, RunError> {
    let total = regions.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    let workers = config.workers_for(total);
    let deadline = config.deadline_for(total);
    info!(
        "Extracting {} region(s) with {} worker(s), deadline {}s",
        total,
        workers,
        deadline.as_secs()
    );

    let semaphore = Arc::new(Semaphore::new(workers));
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut handles: Vec<(Region, JoinHandle<RegionOutcome>)> = Vec::with_capacity(total);
    for region in regions {
        let sem = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        let services = services.clone();
        let pb = pb.clone();
        let task_region = region.clone();

        let handle = tokio::spawn(async move {
            let _permit = sem.acquire_owned().await;
            let outcome = match pipeline::run_region(&task_region, &config, &services).await {
                Ok(report) => RegionOutcome::Completed(report),
                Err(e) => {
                    warn!("Region {} failed: {}", task_region, e);
                    RegionOutcome::Failed {
                        region: task_region,
                        error: e.to_string(),
                    }
                }
            };
            pb.set_message(outcome.region().abbr.clone());
            pb.inc(1);
            outcome
        });
        handles.push((region, handle));
    }

    let collect = async {
        let mut outcomes = Vec::with_capacity(handles.len());
        for (region, handle) in handles.iter_mut() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let e = RegionError::from_task(e);
                    error!("Region {} task died: {}", region, e);
                    RegionOutcome::Failed {
                        region: region.clone(),
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    };

    let result = tokio::time::timeout(deadline, collect).await;
    pb.finish_and_clear();
    match result {
        Ok(outcomes) => Ok(outcomes),
        Err(_) => {
            for (_, handle) in &handles {
                handle.abort();
            }
            Err(RunError::DeadlineExceeded {
                regions: total,
                secs: deadline.as_secs(),
            })
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegionSummary {
    pub abbr: String,
    pub name: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RegionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What `summary.json` holds.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub started: DateTime<Local>,
    pub elapsed_secs: f64,
    pub regions: Vec<RegionSummary>,
}

impl RunSummary {
    pub fn new(started: DateTime<Local>, clock: Instant, outcomes: &[RegionOutcome]) -> Self {
        let regions = outcomes
            .iter()
            .map(|o| match o {
                RegionOutcome::Completed(report) => RegionSummary {
                    abbr: report.region.abbr.clone(),
                    name: report.region.name.clone(),
                    completed: true,
                    stats: Some(report.stats.clone()),
                    output: Some(report.output.display().to_string()),
                    error: None,
                },
                RegionOutcome::Failed { region, error } => RegionSummary {
                    abbr: region.abbr.clone(),
                    name: region.name.clone(),
                    completed: false,
                    stats: None,
                    output: None,
                    error: Some(error.clone()),
                },
            })
            .collect();
        Self {
            started,
            elapsed_secs: clock.elapsed().as_secs_f64(),
            regions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::fetch::{DocumentSource, MemorySource};
    use crate::output::CsvSink;
    use async_trait::async_trait;
    use std::time::Duration;

    fn listing_only(regions: &[Region]) -> MemorySource {
        let html = std::fs::read_to_string("tests/fixtures/listing_nc.html").unwrap();
        let urls: Vec<String> = regions.iter().map(|r| r.listing_url()).collect();
        let pages: Vec<(&str, &str)> = urls.iter().map(|u| (u.as_str(), html.as_str())).collect();
        MemorySource::new(&pages)
    }

    /// Never answers.
    struct Stalled;

    #[async_trait]
    impl DocumentSource for Stalled {
        async fn fetch(&self, _: &Region, _: &str, _: &str) -> Option<Document> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            None
        }
    }

    #[tokio::test]
    async fn outcomes_follow_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let nc = Region::new("NC", "North Carolina");
        let va = Region::new("VA", "Virginia");
        let sc = Region::new("SC", "South Carolina");
        let services = Services {
            source: Arc::new(listing_only(&[nc.clone(), va.clone()])),
            resolver: None,
            sink: Arc::new(CsvSink::new(dir.path())),
        };
        let config = Arc::new(RunConfig {
            output_dir: dir.path().to_path_buf(),
            max_workers: 2,
            ..Default::default()
        });

        let outcomes = run_extraction(vec![nc, sc, va], config, services).await.unwrap();
        let abbrs: Vec<&str> = outcomes.iter().map(|o| o.region().abbr.as_str()).collect();
        assert_eq!(abbrs, vec!["NC", "SC", "VA"]);
        assert!(matches!(outcomes[0], RegionOutcome::Completed(_)));
        assert!(matches!(outcomes[1], RegionOutcome::Failed { .. }));
        assert!(matches!(outcomes[2], RegionOutcome::Completed(_)));

        let summary = RunSummary::new(Local::now(), Instant::now(), &outcomes);
        assert_eq!(summary.regions.len(), 3);
        assert!(!summary.regions[1].completed);
    }

    /// Panics on every fetch.
    struct Exploding;

    #[async_trait]
    impl DocumentSource for Exploding {
        async fn fetch(&self, region: &Region, _: &str, _: &str) -> Option<Document> {
            panic!("source blew up for {}", region.abbr);
        }
    }

    #[tokio::test]
    async fn panicking_region_fails_alone() {
        let dir = tempfile::tempdir().unwrap();
        let services = Services {
            source: Arc::new(Exploding),
            resolver: None,
            sink: Arc::new(CsvSink::new(dir.path())),
        };
        let outcomes = run_extraction(
            vec![Region::new("NC", "North Carolina")],
            Arc::new(RunConfig::default()),
            services,
        )
        .await
        .unwrap();
        match &outcomes[0] {
            RegionOutcome::Failed { region, error } => {
                assert_eq!(region.abbr, "NC");
                assert_eq!(error, "region task panicked: source blew up for NC");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn deadline_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let services = Services {
            source: Arc::new(Stalled),
            resolver: None,
            sink: Arc::new(CsvSink::new(dir.path())),
        };
        let config = Arc::new(RunConfig {
            seconds_per_region: 1,
            ..Default::default()
        });
        let err = run_extraction(vec![Region::new("NC", "North Carolina")], config, services)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::DeadlineExceeded { regions: 1, secs: 1 }));
    }

    #[tokio::test]
    async fn no_regions_is_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let services = Services {
            source: Arc::new(Stalled),
            resolver: None,
            sink: Arc::new(CsvSink::new(dir.path())),
        };
        let outcomes = run_extraction(Vec::new(), Arc::new(RunConfig::default()), services)
            .await
            .unwrap();
        assert!(outcomes.is_empty());
    }
}
