//! Persistence boundary.
//!
//! The rest of the application talks to these traits, never to a pool
//! directly: `PgStore` is the production implementation, `MemoryStore`
//! backs the test suite. Both are constructed once at startup and injected
//! through `AppState`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::billing::catalog::Tier;
use crate::errors::AppError;
use crate::models::document::{
    DocumentKind, DocumentPage, DocumentRecord, FavoriteDocumentRow, ListQuery, RecentDocumentRow,
};
use crate::models::user::{SubscriptionStatus, UserRow};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Parameters for creating a user record.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub external_auth_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Target state for a tier-changing write. Applied as a full overwrite:
/// tier, denormalized limit, both provider refs, status active and a fresh
/// subscription start — never a merge, which is what makes re-application
/// idempotent.
#[derive(Debug, Clone)]
pub struct SubscriptionChange {
    pub tier: Tier,
    pub payment_customer_ref: Option<String>,
    pub payment_subscription_ref: Option<String>,
}

/// Result of the guarded usage increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageIncrement {
    /// Guard passed; counters after the increment.
    Granted { used: i32, limit: i32 },
    /// Guard failed; no mutation happened.
    Denied { current_tier: Tier },
}

/// Counters after a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageCounters {
    pub used: i32,
    pub limit: i32,
}

/// Outcome of promoting a recent document into favorites.
#[derive(Debug, Clone)]
pub struct PromoteOutcome {
    pub document: FavoriteDocumentRow,
    pub already_favorited: bool,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a FREEMIUM user. Fails with `DuplicateUser` on an existing
    /// `external_auth_id` or email.
    async fn create_user(&self, new_user: NewUser) -> Result<UserRow, AppError>;

    async fn find_by_auth_id(&self, auth_id: &str) -> Result<Option<UserRow>, AppError>;

    async fn find_by_customer_ref(&self, customer_ref: &str)
        -> Result<Option<UserRow>, AppError>;

    /// Atomically re-checks the quota guard and increments `usage_used`.
    /// The check and the increment are a single store-level operation, so
    /// two racing calls for the same user cannot both pass the limit.
    /// Fails with `UserNotFound` if the id does not resolve.
    async fn increment_usage(&self, auth_id: &str) -> Result<UsageIncrement, AppError>;

    /// Unconditionally sets `usage_used = 0`.
    async fn reset_usage(&self, auth_id: &str) -> Result<UsageCounters, AppError>;

    /// Full overwrite of subscription state for an existing user. Leaves
    /// `usage_used` untouched. Fails with `UserNotFound` if absent.
    async fn apply_subscription(
        &self,
        auth_id: &str,
        change: &SubscriptionChange,
    ) -> Result<UserRow, AppError>;

    /// Creates a user with the target subscription already applied — the
    /// lazy-provisioning path for a customer who paid before registering.
    async fn provision_subscriber(
        &self,
        new_user: NewUser,
        change: &SubscriptionChange,
    ) -> Result<UserRow, AppError>;

    /// FREEMIUM tier and quota, status cancelled, both provider refs
    /// cleared to NULL.
    async fn downgrade_to_freemium(&self, auth_id: &str) -> Result<UserRow, AppError>;

    async fn set_subscription_status(
        &self,
        auth_id: &str,
        status: SubscriptionStatus,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a recent entry and prunes beyond the retention cap, as one
    /// atomic unit — a reader never observes more than the cap.
    async fn append_recent(
        &self,
        owner_id: &str,
        kind: DocumentKind,
        content: &str,
    ) -> Result<RecentDocumentRow, AppError>;

    /// Copies a recent document into favorites. Idempotent on
    /// `(owner, kind, content)`: an existing structurally-identical
    /// favorite is returned with `already_favorited = true` and nothing is
    /// inserted. Fails with `DocumentNotFound` when the recent entry is
    /// absent or owned by someone else.
    async fn promote(&self, document_id: Uuid, owner_id: &str)
        -> Result<PromoteOutcome, AppError>;

    /// Delete-if-exists from favorites; `false` means it was already gone.
    async fn demote(&self, document_id: Uuid, owner_id: &str) -> Result<bool, AppError>;

    /// Owner-scoped delete from the recent log; `false` when absent or not
    /// owned.
    async fn delete_recent(&self, document_id: Uuid, owner_id: &str) -> Result<bool, AppError>;

    async fn list_recent(
        &self,
        owner_id: &str,
        query: &ListQuery,
    ) -> Result<DocumentPage<RecentDocumentRow>, AppError>;

    async fn list_favorites(
        &self,
        owner_id: &str,
        query: &ListQuery,
    ) -> Result<DocumentPage<FavoriteDocumentRow>, AppError>;

    /// Looks the id up in the recent store first, then favorites. When
    /// `owner_id` is supplied and does not match, fails with
    /// `AccessDenied` rather than `DocumentNotFound`.
    async fn get_document(
        &self,
        document_id: Uuid,
        owner_id: Option<&str>,
    ) -> Result<DocumentRecord, AppError>;
}
