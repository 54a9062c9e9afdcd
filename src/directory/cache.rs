use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, trace};

/// Team name -> member logins, exactly as observed during one full sync
pub type TeamMembers = HashMap<String, Vec<String>>;

/// Seconds the initial timestamp is backdated so the first tick always syncs
const INITIAL_BACKDATE_SECS: i64 = 24 * 3600;

/// One complete generation of the cache. Replaced wholesale, never patched.
#[derive(Debug)]
struct Snapshot {
    /// The mapping built by the last successful rebuild
    members: Arc<TeamMembers>,
    /// Unix seconds of the last successful rebuild
    updated_at: i64,
    /// Whether any rebuild has ever completed
    populated: bool,
}

/// Team membership cache shared between the sync loop and request handlers.
///
/// Readers clone the current mapping handle under a read lock and scan it
/// after the lock is released, so a rebuild only excludes them for the
/// instant of the pointer swap.
#[derive(Debug)]
pub struct DirectoryCache {
    current: RwLock<Snapshot>,
}

impl DirectoryCache {
    /// Creates an empty cache whose timestamp is backdated by one day
    pub fn new(now: i64) -> Self {
        Self {
            current: RwLock::new(Snapshot {
                members: Arc::new(TeamMembers::new()),
                updated_at: now - INITIAL_BACKDATE_SECS,
                populated: false,
            }),
        }
    }

    /// Returns every team whose member list contains `login`
    pub fn membership_of(&self, login: &str) -> BTreeSet<String> {
        let members = self.members();

        let teams: BTreeSet<String> = members
            .iter()
            .filter(|(_, users)| users.iter().any(|user| user == login))
            .map(|(team, _)| team.clone())
            .collect();

        trace!("Resolved {} teams for {}", teams.len(), login);
        teams
    }

    /// True once more than `ttl` has passed since the last rebuild
    pub fn is_stale(&self, now: i64, ttl: Duration) -> bool {
        let updated_at = self.read_snapshot(|snapshot| snapshot.updated_at);
        now.saturating_sub(updated_at) > ttl.as_secs() as i64
    }

    /// Swaps in a fully built mapping and stamps the rebuild time.
    ///
    /// The timestamp never moves backwards, even if `now` does.
    pub fn replace(&self, members: TeamMembers, now: i64) {
        let members = Arc::new(members);
        let team_count = members.len();

        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        guard.members = members;
        guard.updated_at = guard.updated_at.max(now);
        guard.populated = true;
        let updated_at = guard.updated_at;
        drop(guard);

        debug!("Directory cache replaced with {} teams (updated_at: {})", team_count, updated_at);
    }

    /// The mapping as of the last completed rebuild
    pub fn members(&self) -> Arc<TeamMembers> {
        self.read_snapshot(|snapshot| Arc::clone(&snapshot.members))
    }

    pub fn updated_at(&self) -> i64 {
        self.read_snapshot(|snapshot| snapshot.updated_at)
    }

    /// False until the first rebuild has been swapped in
    pub fn is_populated(&self) -> bool {
        self.read_snapshot(|snapshot| snapshot.populated)
    }

    pub fn team_count(&self) -> usize {
        self.read_snapshot(|snapshot| snapshot.members.len())
    }

    fn read_snapshot<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> T {
        // A poisoned lock still holds a complete snapshot: writers only swap fields
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }
}
