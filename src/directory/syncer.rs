use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::cache::{DirectoryCache, TeamMembers};
use super::readiness::ReadinessLatch;
use crate::metrics;

/// Errors raised by a directory service backend
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Directory request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Directory returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to decode directory response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// A rebuild that was abandoned. The cache keeps its previous contents.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to list teams of {organization} (page {page}): {source}")]
    Teams {
        organization: String,
        page: u32,
        #[source]
        source: DirectoryError,
    },

    #[error("Failed to list members of team {team} (page {page}): {source}")]
    Members {
        team: String,
        page: u32,
        #[source]
        source: DirectoryError,
    },
}

/// A team as listed by the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: u64,
    pub name: String,
}

/// Cursor for one page of a paginated listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number
    pub page: u32,
    pub per_page: u32,
}

/// One page of results plus the cursor of the next page, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

/// Upstream source of team membership
#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn list_teams(&self, organization: &str, page: PageRequest) -> Result<Page<Team>, DirectoryError>;

    async fn list_team_members(&self, team: &Team, page: PageRequest) -> Result<Page<String>, DirectoryError>;
}

/// What a single `maybe_sync` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The cache was younger than its TTL
    Fresh,
    /// Another sync was still running
    InFlight,
    /// A full rebuild was swapped in
    Synced { teams: usize, memberships: usize },
}

/// Settings for the directory syncer
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub organization: String,
    pub page_size: u32,
    pub ttl: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            organization: String::new(),
            page_size: 500,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Rebuilds the directory cache from the upstream service once it goes stale
pub struct DirectorySyncer {
    service: Arc<dyn DirectoryService>,
    cache: Arc<DirectoryCache>,
    settings: SyncSettings,
    readiness: ReadinessLatch,
    // Held for the whole rebuild so overlapping ticks are skipped
    in_flight: Mutex<()>,
}

impl DirectorySyncer {
    pub fn new(
        service: Arc<dyn DirectoryService>,
        cache: Arc<DirectoryCache>,
        settings: SyncSettings,
        readiness: ReadinessLatch,
    ) -> Self {
        Self {
            service,
            cache,
            settings,
            readiness,
            in_flight: Mutex::new(()),
        }
    }

    /// Runs a full rebuild if the cache is stale; the unit of work of each tick.
    ///
    /// `now` is the tick time; the cache is stamped with `now` plus the time
    /// the rebuild took.
    ///
    /// On error nothing is replaced: the previous mapping and timestamp stay.
    pub async fn maybe_sync(&self, now: i64) -> Result<SyncOutcome, SyncError> {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Directory sync already in flight, skipping tick");
                return Ok(SyncOutcome::InFlight);
            }
        };

        if !self.cache.is_stale(now, self.settings.ttl) {
            return Ok(SyncOutcome::Fresh);
        }

        info!("Directory cache is stale, syncing teams of {}", self.settings.organization);
        let started = Instant::now();

        let members = match self.rebuild().await {
            Ok(members) => members,
            Err(e) => {
                metrics::record_sync_failure(started.elapsed());
                return Err(e);
            }
        };

        let teams = members.len();
        let memberships = members.values().map(Vec::len).sum();

        // Stamped with the completion time, not the tick time
        let elapsed = started.elapsed();
        self.cache.replace(members, now + elapsed.as_secs() as i64);
        self.readiness.mark_ready();
        metrics::record_sync_success(elapsed, teams);

        info!(
            "Directory sync complete: {} teams, {} memberships in {:?}",
            teams, memberships, elapsed
        );

        Ok(SyncOutcome::Synced { teams, memberships })
    }

    /// Walks every page of teams and members into a fresh mapping.
    /// No lock on the cache is held while this runs.
    async fn rebuild(&self) -> Result<TeamMembers, SyncError> {
        let organization = self.settings.organization.as_str();
        let mut members = TeamMembers::new();
        let mut page = 1;

        loop {
            let request = PageRequest { page, per_page: self.settings.page_size };
            let teams = self.service
                .list_teams(organization, request)
                .await
                .map_err(|source| SyncError::Teams {
                    organization: organization.to_string(),
                    page,
                    source,
                })?;

            for team in &teams.items {
                let logins = self.team_members(team).await?;
                members.insert(team.name.clone(), logins);
            }

            match teams.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(members)
    }

    async fn team_members(&self, team: &Team) -> Result<Vec<String>, SyncError> {
        let mut logins = Vec::new();
        let mut page = 1;

        loop {
            let request = PageRequest { page, per_page: self.settings.page_size };
            let users = self.service
                .list_team_members(team, request)
                .await
                .map_err(|source| SyncError::Members {
                    team: team.name.clone(),
                    page,
                    source,
                })?;

            logins.extend(users.items);

            match users.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        debug!("Team {} has {} members", team.name, logins.len());
        Ok(logins)
    }
}

/// Start the background task that calls `maybe_sync` on every tick.
///
/// Each tick awaits the previous sync, so runs never overlap; ticks missed
/// during a slow sync are dropped rather than replayed.
pub fn start_sync_task(
    syncer: Arc<DirectorySyncer>,
    tick_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let now = chrono::Utc::now().timestamp();
            if let Err(e) = syncer.maybe_sync(now).await {
                warn!("Directory sync failed, keeping last known teams: {}", e);
            }
        }
    })
}
