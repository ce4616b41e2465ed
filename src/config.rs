use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;

use crate::output::Artifact;

pub const MAX_WORKERS: usize = 8;
pub const SECONDS_PER_REGION: u64 = 120;
pub const DNS_TIMEOUT_SECS: u64 = 5;

/// Where documents come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Use the cached copy when present, otherwise fetch it.
    #[default]
    PreferCache,
    /// Always fetch, ignoring any cached copy.
    RemoteOnly,
    /// Never touch the network; cache only.
    Never,
}

/// Immutable settings for one run, shared by every region task.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub cache_policy: CachePolicy,
    /// Store fetched documents in the cache directory.
    pub write_docs: bool,
    pub resolve_ips: bool,
    pub dump: BTreeSet<Artifact>,
    /// Merge each per-entity dump folder into one `(ALL).txt`.
    pub combine_dumps: bool,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_workers: usize,
    pub seconds_per_region: u64,
    pub dns_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cache_policy: CachePolicy::default(),
            write_docs: true,
            resolve_ips: true,
            dump: BTreeSet::new(),
            combine_dumps: false,
            cache_dir: PathBuf::from("data/cache"),
            output_dir: PathBuf::from("data/out"),
            max_workers: MAX_WORKERS,
            seconds_per_region: SECONDS_PER_REGION,
            dns_timeout: Duration::from_secs(DNS_TIMEOUT_SECS),
        }
    }
}

impl RunConfig {
    /// Pool size for `regions` tasks.
    pub fn workers_for(&self, regions: usize) -> usize {
        regions.min(self.max_workers).max(1)
    }

    /// Overall wait budget for `regions` tasks.
    pub fn deadline_for(&self, regions: usize) -> Duration {
        Duration::from_secs(self.seconds_per_region * regions as u64)
    }
}
