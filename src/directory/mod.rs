// Directory module for Nerf
//
// Team membership synced from the code-hosting provider, and the read side
// the Connect handler uses to scope certificates.

pub mod cache;
pub mod github;
pub mod readiness;
pub mod syncer;

pub use cache::{DirectoryCache, TeamMembers};
pub use github::GitHubDirectory;
pub use readiness::ReadinessLatch;
pub use syncer::{
    start_sync_task, DirectoryError, DirectoryService, DirectorySyncer, Page, PageRequest,
    SyncError, SyncOutcome, SyncSettings, Team,
};

use std::collections::BTreeSet;
use std::sync::Arc;
use async_trait::async_trait;

/// Resolves an OAuth token to the login it was issued for
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, DirectoryError>;
}

/// Read-only view of the directory cache for the request path.
///
/// Lookups never trigger a sync; freshness is the sync loop's job alone.
#[derive(Debug, Clone)]
pub struct MembershipResolver {
    cache: Arc<DirectoryCache>,
}

impl MembershipResolver {
    pub fn new(cache: Arc<DirectoryCache>) -> Self {
        Self { cache }
    }

    /// Teams `login` belongs to, sorted by name
    pub fn membership_of(&self, login: &str) -> BTreeSet<String> {
        self.cache.membership_of(login)
    }
}
