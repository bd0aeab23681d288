//! Scheduled (recurring) job definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recurring job kinds that can be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledJobType {
    PlexLibraryScan,
    PlexRecentlyAddedCheck,
    AudibleRefresh,
    RetryMissingTorrents,
    RetryFailedImports,
    CleanupSeededTorrents,
    MonitorRssFeeds,
    SyncGoodreadsShelves,
}

impl ScheduledJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledJobType::PlexLibraryScan => "plex_library_scan",
            ScheduledJobType::PlexRecentlyAddedCheck => "plex_recently_added_check",
            ScheduledJobType::AudibleRefresh => "audible_refresh",
            ScheduledJobType::RetryMissingTorrents => "retry_missing_torrents",
            ScheduledJobType::RetryFailedImports => "retry_failed_imports",
            ScheduledJobType::CleanupSeededTorrents => "cleanup_seeded_torrents",
            ScheduledJobType::MonitorRssFeeds => "monitor_rss_feeds",
            ScheduledJobType::SyncGoodreadsShelves => "sync_goodreads_shelves",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plex_library_scan" => Some(ScheduledJobType::PlexLibraryScan),
            "plex_recently_added_check" => Some(ScheduledJobType::PlexRecentlyAddedCheck),
            "audible_refresh" => Some(ScheduledJobType::AudibleRefresh),
            "retry_missing_torrents" => Some(ScheduledJobType::RetryMissingTorrents),
            "retry_failed_imports" => Some(ScheduledJobType::RetryFailedImports),
            "cleanup_seeded_torrents" => Some(ScheduledJobType::CleanupSeededTorrents),
            "monitor_rss_feeds" => Some(ScheduledJobType::MonitorRssFeeds),
            "sync_goodreads_shelves" => Some(ScheduledJobType::SyncGoodreadsShelves),
            _ => None,
        }
    }
}

/// One recurring job definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledJob {
    pub id: i64,
    pub name: String,
    pub job_type: ScheduledJobType,
    /// Cron expression (5 or 6 fields).
    pub schedule: String,
    pub enabled: bool,
    pub payload: serde_json::Value,
    pub last_run: Option<DateTime<Utc>>,
    pub last_run_job_id: Option<String>,
    pub next_run: Option<DateTime<Utc>>,
}

impl ScheduledJob {
    /// Repeatable broker key for this definition.
    pub fn repeatable_key(&self) -> String {
        format!("scheduled-{}", self.id)
    }
}

/// Fields for seeding a scheduled job definition.
#[derive(Debug, Clone)]
pub struct SeedJob {
    pub name: &'static str,
    pub job_type: ScheduledJobType,
    pub schedule: &'static str,
    pub enabled: bool,
}

/// The default recurring jobs seeded at startup.
pub fn default_jobs() -> Vec<SeedJob> {
    vec![
        SeedJob {
            name: "Library Scan",
            job_type: ScheduledJobType::PlexLibraryScan,
            schedule: "0 */6 * * *",
            enabled: false,
        },
        SeedJob {
            name: "Recently Added Check",
            job_type: ScheduledJobType::PlexRecentlyAddedCheck,
            schedule: "*/5 * * * *",
            enabled: true,
        },
        SeedJob {
            name: "Metadata Refresh",
            job_type: ScheduledJobType::AudibleRefresh,
            schedule: "0 0 * * *",
            enabled: false,
        },
        SeedJob {
            name: "Retry Missing Search",
            job_type: ScheduledJobType::RetryMissingTorrents,
            schedule: "0 0 * * *",
            enabled: true,
        },
        SeedJob {
            name: "Retry Failed Imports",
            job_type: ScheduledJobType::RetryFailedImports,
            schedule: "0 */6 * * *",
            enabled: true,
        },
        SeedJob {
            name: "Cleanup Seeded",
            job_type: ScheduledJobType::CleanupSeededTorrents,
            schedule: "*/30 * * * *",
            enabled: true,
        },
        SeedJob {
            name: "RSS Monitor",
            job_type: ScheduledJobType::MonitorRssFeeds,
            schedule: "*/15 * * * *",
            enabled: true,
        },
        SeedJob {
            name: "Shelves Sync",
            job_type: ScheduledJobType::SyncGoodreadsShelves,
            schedule: "0 */6 * * *",
            enabled: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_seed_set() {
        let jobs = default_jobs();
        assert_eq!(jobs.len(), 8);

        let scan = jobs.iter().find(|j| j.name == "Library Scan").unwrap();
        assert!(!scan.enabled);
        assert_eq!(scan.schedule, "0 */6 * * *");

        let rss = jobs.iter().find(|j| j.name == "RSS Monitor").unwrap();
        assert!(rss.enabled);
        assert_eq!(rss.job_type, ScheduledJobType::MonitorRssFeeds);

        // Every schedule in the seed set parses.
        for job in &jobs {
            assert!(super::super::cron::validate(job.schedule).is_ok());
        }
    }

    #[test]
    fn test_type_round_trip() {
        for t in [
            ScheduledJobType::PlexLibraryScan,
            ScheduledJobType::PlexRecentlyAddedCheck,
            ScheduledJobType::AudibleRefresh,
            ScheduledJobType::RetryMissingTorrents,
            ScheduledJobType::RetryFailedImports,
            ScheduledJobType::CleanupSeededTorrents,
            ScheduledJobType::MonitorRssFeeds,
            ScheduledJobType::SyncGoodreadsShelves,
        ] {
            assert_eq!(ScheduledJobType::parse(t.as_str()), Some(t));
        }
    }
}
