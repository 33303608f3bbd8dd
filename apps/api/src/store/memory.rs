#![allow(dead_code)]

//! In-memory store with the same semantics as the Postgres implementation.
//!
//! Backs the test suite and local smoke runs. A single mutex stands in for
//! row-level serialization: every operation locks, mutates, and releases,
//! so the guarded increment and the append-then-prune unit are atomic here
//! exactly as they are in SQL.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::billing::catalog::{Tier, RECENT_RETENTION_CAP};
use crate::errors::AppError;
use crate::models::document::{
    DocumentKind, DocumentPage, DocumentRecord, DocumentSource, FavoriteDocumentRow, ListQuery,
    RecentDocumentRow,
};
use crate::models::user::{SubscriptionStatus, UserRow};
use crate::store::{
    DocumentStore, NewUser, PromoteOutcome, SubscriptionChange, UsageCounters, UsageIncrement,
    UserStore,
};

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserRow>,
    /// Push order is insertion order; newest entries are at the back.
    recent: Vec<RecentDocumentRow>,
    favorites: Vec<FavoriteDocumentRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page_of<T: Clone>(
    newest_first: Vec<T>,
    query: &ListQuery,
) -> DocumentPage<T> {
    let total_count = newest_first.len() as i64;
    let documents = newest_first
        .into_iter()
        .skip(query.offset.max(0) as usize)
        .take(query.limit.max(0) as usize)
        .collect();
    DocumentPage::new(documents, total_count, query)
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<UserRow, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.contains_key(&new_user.external_auth_id)
            || inner.users.values().any(|u| u.email == new_user.email)
        {
            return Err(AppError::DuplicateUser);
        }

        let now = Utc::now();
        let tier = Tier::Freemium;
        let user = UserRow {
            id: Uuid::new_v4(),
            external_auth_id: new_user.external_auth_id.clone(),
            email: new_user.email,
            display_name: new_user.display_name,
            tier: tier.as_str().to_string(),
            usage_used: 0,
            usage_limit: tier.quota(),
            subscription_status: SubscriptionStatus::Active.as_str().to_string(),
            payment_customer_ref: None,
            payment_subscription_ref: None,
            subscription_started_at: None,
            created_at: now,
            updated_at: now,
        };
        inner
            .users
            .insert(new_user.external_auth_id, user.clone());
        Ok(user)
    }

    async fn find_by_auth_id(&self, auth_id: &str) -> Result<Option<UserRow>, AppError> {
        Ok(self.inner.lock().unwrap().users.get(auth_id).cloned())
    }

    async fn find_by_customer_ref(
        &self,
        customer_ref: &str,
    ) -> Result<Option<UserRow>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .users
            .values()
            .find(|u| u.payment_customer_ref.as_deref() == Some(customer_ref))
            .cloned())
    }

    async fn increment_usage(&self, auth_id: &str) -> Result<UsageIncrement, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner.users.get_mut(auth_id).ok_or(AppError::UserNotFound)?;

        if !user.can_generate() {
            return Ok(UsageIncrement::Denied {
                current_tier: user.tier(),
            });
        }

        user.usage_used += 1;
        user.updated_at = Utc::now();
        Ok(UsageIncrement::Granted {
            used: user.usage_used,
            limit: user.usage_limit,
        })
    }

    async fn reset_usage(&self, auth_id: &str) -> Result<UsageCounters, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner.users.get_mut(auth_id).ok_or(AppError::UserNotFound)?;
        user.usage_used = 0;
        user.updated_at = Utc::now();
        Ok(UsageCounters {
            used: user.usage_used,
            limit: user.usage_limit,
        })
    }

    async fn apply_subscription(
        &self,
        auth_id: &str,
        change: &SubscriptionChange,
    ) -> Result<UserRow, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner.users.get_mut(auth_id).ok_or(AppError::UserNotFound)?;

        let now = Utc::now();
        user.tier = change.tier.as_str().to_string();
        user.usage_limit = change.tier.quota();
        user.payment_customer_ref = change.payment_customer_ref.clone();
        user.payment_subscription_ref = change.payment_subscription_ref.clone();
        user.subscription_status = SubscriptionStatus::Active.as_str().to_string();
        user.subscription_started_at = Some(now);
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn provision_subscriber(
        &self,
        new_user: NewUser,
        change: &SubscriptionChange,
    ) -> Result<UserRow, AppError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.contains_key(&new_user.external_auth_id) {
            return Err(AppError::DuplicateUser);
        }

        let now = Utc::now();
        let user = UserRow {
            id: Uuid::new_v4(),
            external_auth_id: new_user.external_auth_id.clone(),
            email: new_user.email,
            display_name: new_user.display_name,
            tier: change.tier.as_str().to_string(),
            usage_used: 0,
            usage_limit: change.tier.quota(),
            subscription_status: SubscriptionStatus::Active.as_str().to_string(),
            payment_customer_ref: change.payment_customer_ref.clone(),
            payment_subscription_ref: change.payment_subscription_ref.clone(),
            subscription_started_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        inner
            .users
            .insert(new_user.external_auth_id, user.clone());
        Ok(user)
    }

    async fn downgrade_to_freemium(&self, auth_id: &str) -> Result<UserRow, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner.users.get_mut(auth_id).ok_or(AppError::UserNotFound)?;

        let tier = Tier::Freemium;
        user.tier = tier.as_str().to_string();
        user.usage_limit = tier.quota();
        user.subscription_status = SubscriptionStatus::Cancelled.as_str().to_string();
        user.payment_customer_ref = None;
        user.payment_subscription_ref = None;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_subscription_status(
        &self,
        auth_id: &str,
        status: SubscriptionStatus,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.get_mut(auth_id) {
            user.subscription_status = status.as_str().to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn append_recent(
        &self,
        owner_id: &str,
        kind: DocumentKind,
        content: &str,
    ) -> Result<RecentDocumentRow, AppError> {
        let mut inner = self.inner.lock().unwrap();

        let document = RecentDocumentRow {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            document_kind: kind.as_str().to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        inner.recent.push(document.clone());

        // Prune beyond the cap, oldest first (push order is insertion order).
        let owned: Vec<Uuid> = inner
            .recent
            .iter()
            .filter(|d| d.owner_id == owner_id)
            .map(|d| d.id)
            .collect();
        if owned.len() as i64 > RECENT_RETENTION_CAP {
            let evict_count = owned.len() - RECENT_RETENTION_CAP as usize;
            let evicted: Vec<Uuid> = owned.into_iter().take(evict_count).collect();
            inner.recent.retain(|d| !evicted.contains(&d.id));
        }

        Ok(document)
    }

    async fn promote(
        &self,
        document_id: Uuid,
        owner_id: &str,
    ) -> Result<PromoteOutcome, AppError> {
        let mut inner = self.inner.lock().unwrap();

        let document = inner
            .recent
            .iter()
            .find(|d| d.id == document_id && d.owner_id == owner_id)
            .cloned()
            .ok_or(AppError::DocumentNotFound)?;

        if let Some(existing) = inner.favorites.iter().find(|f| {
            f.owner_id == owner_id
                && f.document_kind == document.document_kind
                && f.content == document.content
        }) {
            return Ok(PromoteOutcome {
                document: existing.clone(),
                already_favorited: true,
            });
        }

        let favorite = FavoriteDocumentRow {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            document_kind: document.document_kind,
            content: document.content,
            favorited_at: Utc::now(),
        };
        inner.favorites.push(favorite.clone());
        Ok(PromoteOutcome {
            document: favorite,
            already_favorited: false,
        })
    }

    async fn demote(&self, document_id: Uuid, owner_id: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.favorites.len();
        inner
            .favorites
            .retain(|f| !(f.id == document_id && f.owner_id == owner_id));
        Ok(inner.favorites.len() < before)
    }

    async fn delete_recent(&self, document_id: Uuid, owner_id: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.recent.len();
        inner
            .recent
            .retain(|d| !(d.id == document_id && d.owner_id == owner_id));
        Ok(inner.recent.len() < before)
    }

    async fn list_recent(
        &self,
        owner_id: &str,
        query: &ListQuery,
    ) -> Result<DocumentPage<RecentDocumentRow>, AppError> {
        let inner = self.inner.lock().unwrap();
        let newest_first: Vec<RecentDocumentRow> = inner
            .recent
            .iter()
            .rev()
            .filter(|d| {
                d.owner_id == owner_id
                    && query.kind.map_or(true, |k| d.document_kind == k.as_str())
            })
            .cloned()
            .collect();
        Ok(page_of(newest_first, query))
    }

    async fn list_favorites(
        &self,
        owner_id: &str,
        query: &ListQuery,
    ) -> Result<DocumentPage<FavoriteDocumentRow>, AppError> {
        let inner = self.inner.lock().unwrap();
        let newest_first: Vec<FavoriteDocumentRow> = inner
            .favorites
            .iter()
            .rev()
            .filter(|f| {
                f.owner_id == owner_id
                    && query.kind.map_or(true, |k| f.document_kind == k.as_str())
            })
            .cloned()
            .collect();
        Ok(page_of(newest_first, query))
    }

    async fn get_document(
        &self,
        document_id: Uuid,
        owner_id: Option<&str>,
    ) -> Result<DocumentRecord, AppError> {
        let inner = self.inner.lock().unwrap();

        let record = if let Some(row) = inner.recent.iter().find(|d| d.id == document_id) {
            DocumentRecord {
                source: DocumentSource::Recent,
                id: row.id,
                owner_id: row.owner_id.clone(),
                document_kind: row.document_kind.clone(),
                content: row.content.clone(),
                timestamp: row.created_at,
            }
        } else if let Some(row) = inner.favorites.iter().find(|f| f.id == document_id) {
            DocumentRecord {
                source: DocumentSource::Favorited,
                id: row.id,
                owner_id: row.owner_id.clone(),
                document_kind: row.document_kind.clone(),
                content: row.content.clone(),
                timestamp: row.favorited_at,
            }
        } else {
            return Err(AppError::DocumentNotFound);
        };

        if let Some(owner) = owner_id {
            if record.owner_id != owner {
                return Err(AppError::AccessDenied);
            }
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> ListQuery {
        ListQuery {
            limit: 100,
            offset: 0,
            kind: None,
        }
    }

    #[tokio::test]
    async fn test_retention_cap_evicts_oldest() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for i in 0..25 {
            let doc = store
                .append_recent("owner", DocumentKind::Resume, &format!("<html>{i}</html>"))
                .await
                .unwrap();
            ids.push(doc.id);
        }

        let page = store.list_recent("owner", &all()).await.unwrap();
        assert_eq!(page.total_count, RECENT_RETENTION_CAP);
        assert_eq!(page.documents.len(), RECENT_RETENTION_CAP as usize);
        // Newest first.
        assert_eq!(page.documents[0].content, "<html>24</html>");
        assert_eq!(page.documents[19].content, "<html>5</html>");

        // The oldest five are no longer retrievable by id.
        for id in &ids[..5] {
            match store.get_document(*id, None).await {
                Err(AppError::DocumentNotFound) => {}
                other => panic!("expected DocumentNotFound for evicted doc, got {other:?}"),
            }
        }
        // The survivors are.
        for id in &ids[5..] {
            store.get_document(*id, None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_retention_cap_is_per_owner() {
        let store = MemoryStore::new();
        for i in 0..22 {
            store
                .append_recent("a", DocumentKind::Resume, &format!("a{i}"))
                .await
                .unwrap();
        }
        store
            .append_recent("b", DocumentKind::Resume, "b0")
            .await
            .unwrap();

        let page_a = store.list_recent("a", &all()).await.unwrap();
        let page_b = store.list_recent("b", &all()).await.unwrap();
        assert_eq!(page_a.total_count, 20);
        assert_eq!(page_b.total_count, 1);
    }

    #[tokio::test]
    async fn test_promote_is_idempotent_on_content() {
        let store = MemoryStore::new();
        let doc = store
            .append_recent("owner", DocumentKind::Resume, "<html>r</html>")
            .await
            .unwrap();

        let first = store.promote(doc.id, "owner").await.unwrap();
        assert!(!first.already_favorited);
        let second = store.promote(doc.id, "owner").await.unwrap();
        assert!(second.already_favorited);
        assert_eq!(first.document.id, second.document.id);

        // Identical content under a fresh recent id is still the same favorite.
        let twin = store
            .append_recent("owner", DocumentKind::Resume, "<html>r</html>")
            .await
            .unwrap();
        let third = store.promote(twin.id, "owner").await.unwrap();
        assert!(third.already_favorited);

        let favorites = store.list_favorites("owner", &all()).await.unwrap();
        assert_eq!(favorites.total_count, 1);
    }

    #[tokio::test]
    async fn test_same_content_different_kind_is_distinct_favorite() {
        let store = MemoryStore::new();
        let resume = store
            .append_recent("owner", DocumentKind::Resume, "<html>x</html>")
            .await
            .unwrap();
        let letter = store
            .append_recent("owner", DocumentKind::CoverLetter, "<html>x</html>")
            .await
            .unwrap();

        assert!(!store.promote(resume.id, "owner").await.unwrap().already_favorited);
        assert!(!store.promote(letter.id, "owner").await.unwrap().already_favorited);
        let favorites = store.list_favorites("owner", &all()).await.unwrap();
        assert_eq!(favorites.total_count, 2);
    }

    #[tokio::test]
    async fn test_favorite_survives_eviction() {
        let store = MemoryStore::new();
        let doc = store
            .append_recent("owner", DocumentKind::Resume, "<html>keep</html>")
            .await
            .unwrap();
        let outcome = store.promote(doc.id, "owner").await.unwrap();
        let favorite_id = outcome.document.id;

        // Push the original out of the recent log.
        for i in 0..RECENT_RETENTION_CAP + 1 {
            store
                .append_recent("owner", DocumentKind::Resume, &format!("filler{i}"))
                .await
                .unwrap();
        }
        assert!(matches!(
            store.get_document(doc.id, None).await,
            Err(AppError::DocumentNotFound)
        ));

        let favorites = store.list_favorites("owner", &all()).await.unwrap();
        assert_eq!(favorites.total_count, 1);
        assert_eq!(favorites.documents[0].content, "<html>keep</html>");

        let record = store.get_document(favorite_id, None).await.unwrap();
        assert_eq!(record.source, DocumentSource::Favorited);
        assert_eq!(record.content, "<html>keep</html>");
    }

    #[tokio::test]
    async fn test_promote_requires_ownership() {
        let store = MemoryStore::new();
        let doc = store
            .append_recent("alice", DocumentKind::Resume, "<html>a</html>")
            .await
            .unwrap();
        match store.promote(doc.id, "mallory").await {
            Err(AppError::DocumentNotFound) => {}
            other => panic!("expected DocumentNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_document_owner_mismatch_is_access_denied() {
        let store = MemoryStore::new();
        let doc = store
            .append_recent("alice", DocumentKind::Resume, "<html>a</html>")
            .await
            .unwrap();

        match store.get_document(doc.id, Some("bob")).await {
            Err(AppError::AccessDenied) => {}
            other => panic!("expected AccessDenied, got {other:?}"),
        }
        // The right owner, and no owner at all, both succeed.
        store.get_document(doc.id, Some("alice")).await.unwrap();
        store.get_document(doc.id, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_demote_missing_favorite_is_not_an_error() {
        let store = MemoryStore::new();
        let removed = store.demote(Uuid::new_v4(), "owner").await.unwrap();
        assert!(!removed);

        let doc = store
            .append_recent("owner", DocumentKind::Resume, "<html>x</html>")
            .await
            .unwrap();
        let favorite = store.promote(doc.id, "owner").await.unwrap().document;
        assert!(store.demote(favorite.id, "owner").await.unwrap());
        assert!(!store.demote(favorite.id, "owner").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_recent_is_owner_scoped() {
        let store = MemoryStore::new();
        let doc = store
            .append_recent("alice", DocumentKind::Resume, "<html>a</html>")
            .await
            .unwrap();

        assert!(!store.delete_recent(doc.id, "bob").await.unwrap());
        assert!(store.delete_recent(doc.id, "alice").await.unwrap());
        assert!(!store.delete_recent(doc.id, "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_by_kind_and_paginates() {
        let store = MemoryStore::new();
        for i in 0..6 {
            let kind = if i % 2 == 0 {
                DocumentKind::Resume
            } else {
                DocumentKind::CoverLetter
            };
            store
                .append_recent("owner", kind, &format!("doc{i}"))
                .await
                .unwrap();
        }

        let resumes = store
            .list_recent(
                "owner",
                &ListQuery {
                    limit: 2,
                    offset: 0,
                    kind: Some(DocumentKind::Resume),
                },
            )
            .await
            .unwrap();
        assert_eq!(resumes.total_count, 3);
        assert_eq!(resumes.documents.len(), 2);
        assert!(resumes.has_more);
        assert_eq!(resumes.pagination.next_offset, Some(2));
        assert_eq!(resumes.documents[0].content, "doc4");

        let tail = store
            .list_recent(
                "owner",
                &ListQuery {
                    limit: 2,
                    offset: 2,
                    kind: Some(DocumentKind::Resume),
                },
            )
            .await
            .unwrap();
        assert_eq!(tail.documents.len(), 1);
        assert!(!tail.has_more);
        assert_eq!(tail.documents[0].content, "doc0");
    }
}
