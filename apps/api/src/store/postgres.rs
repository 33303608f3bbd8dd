//! PostgreSQL store implementation.
//!
//! All access is parameterized SQL. The two multi-statement units
//! (append-then-prune, lookup-then-conditional-insert) run inside explicit
//! transactions; the usage increment folds its guard into a single
//! conditional UPDATE so the check-then-write cannot be interleaved.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
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

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Closes the underlying pool. Call once at shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

fn classify_insert_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::DuplicateUser,
        _ => AppError::Database(e),
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, new_user: NewUser) -> Result<UserRow, AppError> {
        let tier = Tier::Freemium;
        let user: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users
                (id, external_auth_id, email, display_name, tier, usage_used, usage_limit,
                 subscription_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, 'active', NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.external_auth_id)
        .bind(&new_user.email)
        .bind(&new_user.display_name)
        .bind(tier.as_str())
        .bind(tier.quota())
        .fetch_one(&self.pool)
        .await
        .map_err(classify_insert_error)?;

        info!("Created user {} ({})", user.external_auth_id, user.email);
        Ok(user)
    }

    async fn find_by_auth_id(&self, auth_id: &str) -> Result<Option<UserRow>, AppError> {
        Ok(
            sqlx::query_as("SELECT * FROM users WHERE external_auth_id = $1")
                .bind(auth_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_by_customer_ref(
        &self,
        customer_ref: &str,
    ) -> Result<Option<UserRow>, AppError> {
        Ok(
            sqlx::query_as("SELECT * FROM users WHERE payment_customer_ref = $1")
                .bind(customer_ref)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn increment_usage(&self, auth_id: &str) -> Result<UsageIncrement, AppError> {
        // Guard and increment in one statement: no row comes back unless
        // the guard passed, and concurrent callers serialize on the row.
        let updated: Option<(i32, i32)> = sqlx::query_as(
            r#"
            UPDATE users
            SET usage_used = usage_used + 1, updated_at = NOW()
            WHERE external_auth_id = $1
              AND (usage_limit = -1 OR usage_used < usage_limit)
            RETURNING usage_used, usage_limit
            "#,
        )
        .bind(auth_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((used, limit)) = updated {
            return Ok(UsageIncrement::Granted { used, limit });
        }

        // Guard miss: distinguish a missing user from an exhausted quota.
        let tier: Option<(String,)> =
            sqlx::query_as("SELECT tier FROM users WHERE external_auth_id = $1")
                .bind(auth_id)
                .fetch_optional(&self.pool)
                .await?;

        match tier {
            Some((tier,)) => Ok(UsageIncrement::Denied {
                current_tier: Tier::parse_or_freemium(&tier),
            }),
            None => Err(AppError::UserNotFound),
        }
    }

    async fn reset_usage(&self, auth_id: &str) -> Result<UsageCounters, AppError> {
        let counters: Option<(i32, i32)> = sqlx::query_as(
            r#"
            UPDATE users
            SET usage_used = 0, updated_at = NOW()
            WHERE external_auth_id = $1
            RETURNING usage_used, usage_limit
            "#,
        )
        .bind(auth_id)
        .fetch_optional(&self.pool)
        .await?;

        counters
            .map(|(used, limit)| UsageCounters { used, limit })
            .ok_or(AppError::UserNotFound)
    }

    async fn apply_subscription(
        &self,
        auth_id: &str,
        change: &SubscriptionChange,
    ) -> Result<UserRow, AppError> {
        let user: Option<UserRow> = sqlx::query_as(
            r#"
            UPDATE users
            SET tier = $2,
                usage_limit = $3,
                payment_customer_ref = $4,
                payment_subscription_ref = $5,
                subscription_status = 'active',
                subscription_started_at = NOW(),
                updated_at = NOW()
            WHERE external_auth_id = $1
            RETURNING *
            "#,
        )
        .bind(auth_id)
        .bind(change.tier.as_str())
        .bind(change.tier.quota())
        .bind(&change.payment_customer_ref)
        .bind(&change.payment_subscription_ref)
        .fetch_optional(&self.pool)
        .await?;

        let user = user.ok_or(AppError::UserNotFound)?;
        info!("Subscription updated: {} -> {}", auth_id, user.tier);
        Ok(user)
    }

    async fn provision_subscriber(
        &self,
        new_user: NewUser,
        change: &SubscriptionChange,
    ) -> Result<UserRow, AppError> {
        let user: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users
                (id, external_auth_id, email, display_name, tier, usage_used, usage_limit,
                 payment_customer_ref, payment_subscription_ref, subscription_status,
                 subscription_started_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, 'active', NOW(), NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.external_auth_id)
        .bind(&new_user.email)
        .bind(&new_user.display_name)
        .bind(change.tier.as_str())
        .bind(change.tier.quota())
        .bind(&change.payment_customer_ref)
        .bind(&change.payment_subscription_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_insert_error)?;

        info!(
            "Provisioned paying user {} on {}",
            user.external_auth_id, user.tier
        );
        Ok(user)
    }

    async fn downgrade_to_freemium(&self, auth_id: &str) -> Result<UserRow, AppError> {
        let tier = Tier::Freemium;
        let user: Option<UserRow> = sqlx::query_as(
            r#"
            UPDATE users
            SET tier = $2,
                usage_limit = $3,
                subscription_status = 'cancelled',
                payment_customer_ref = NULL,
                payment_subscription_ref = NULL,
                updated_at = NOW()
            WHERE external_auth_id = $1
            RETURNING *
            "#,
        )
        .bind(auth_id)
        .bind(tier.as_str())
        .bind(tier.quota())
        .fetch_optional(&self.pool)
        .await?;

        let user = user.ok_or(AppError::UserNotFound)?;
        info!("Downgraded user {auth_id} to freemium");
        Ok(user)
    }

    async fn set_subscription_status(
        &self,
        auth_id: &str,
        status: SubscriptionStatus,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET subscription_status = $2, updated_at = NOW() WHERE external_auth_id = $1",
        )
        .bind(auth_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn append_recent(
        &self,
        owner_id: &str,
        kind: DocumentKind,
        content: &str,
    ) -> Result<RecentDocumentRow, AppError> {
        let mut tx = self.pool.begin().await?;

        let document: RecentDocumentRow = sqlx::query_as(
            r#"
            INSERT INTO recent_documents (id, owner_id, document_kind, content, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(kind.as_str())
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        // Prune everything beyond the newest RECENT_RETENTION_CAP entries.
        // Same transaction as the insert: a reader never sees cap + 1.
        let pruned = sqlx::query(
            r#"
            DELETE FROM recent_documents
            WHERE owner_id = $1
              AND id NOT IN (
                  SELECT id FROM recent_documents
                  WHERE owner_id = $1
                  ORDER BY created_at DESC, id DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(owner_id)
        .bind(RECENT_RETENTION_CAP)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Saved document {} for {owner_id}, pruned {} old entries",
            document.id,
            pruned.rows_affected()
        );
        Ok(document)
    }

    async fn promote(
        &self,
        document_id: Uuid,
        owner_id: &str,
    ) -> Result<PromoteOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let document: Option<RecentDocumentRow> =
            sqlx::query_as("SELECT * FROM recent_documents WHERE id = $1 AND owner_id = $2")
                .bind(document_id)
                .bind(owner_id)
                .fetch_optional(&mut *tx)
                .await?;
        let document = document.ok_or(AppError::DocumentNotFound)?;

        // Duplicate detection is by content equality, not id: the same
        // markup favorited twice is the same favorite.
        let existing: Option<FavoriteDocumentRow> = sqlx::query_as(
            r#"
            SELECT * FROM favorited_documents
            WHERE owner_id = $1 AND document_kind = $2 AND content = $3
            "#,
        )
        .bind(owner_id)
        .bind(&document.document_kind)
        .bind(&document.content)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(favorite) = existing {
            tx.commit().await?;
            return Ok(PromoteOutcome {
                document: favorite,
                already_favorited: true,
            });
        }

        let favorite: FavoriteDocumentRow = sqlx::query_as(
            r#"
            INSERT INTO favorited_documents (id, owner_id, document_kind, content, favorited_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(&document.document_kind)
        .bind(&document.content)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Favorited document {document_id} for {owner_id}");
        Ok(PromoteOutcome {
            document: favorite,
            already_favorited: false,
        })
    }

    async fn demote(&self, document_id: Uuid, owner_id: &str) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM favorited_documents WHERE id = $1 AND owner_id = $2")
                .bind(document_id)
                .bind(owner_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_recent(&self, document_id: Uuid, owner_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM recent_documents WHERE id = $1 AND owner_id = $2")
            .bind(document_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_recent(
        &self,
        owner_id: &str,
        query: &ListQuery,
    ) -> Result<DocumentPage<RecentDocumentRow>, AppError> {
        let (total_count, documents) = match query.kind {
            Some(kind) => {
                let (total,): (i64,) = sqlx::query_as(
                    "SELECT COUNT(*) FROM recent_documents WHERE owner_id = $1 AND document_kind = $2",
                )
                .bind(owner_id)
                .bind(kind.as_str())
                .fetch_one(&self.pool)
                .await?;
                let rows: Vec<RecentDocumentRow> = sqlx::query_as(
                    r#"
                    SELECT * FROM recent_documents
                    WHERE owner_id = $1 AND document_kind = $2
                    ORDER BY created_at DESC, id DESC
                    LIMIT $3 OFFSET $4
                    "#,
                )
                .bind(owner_id)
                .bind(kind.as_str())
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(&self.pool)
                .await?;
                (total, rows)
            }
            None => {
                let (total,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM recent_documents WHERE owner_id = $1")
                        .bind(owner_id)
                        .fetch_one(&self.pool)
                        .await?;
                let rows: Vec<RecentDocumentRow> = sqlx::query_as(
                    r#"
                    SELECT * FROM recent_documents
                    WHERE owner_id = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(owner_id)
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(&self.pool)
                .await?;
                (total, rows)
            }
        };

        Ok(DocumentPage::new(documents, total_count, query))
    }

    async fn list_favorites(
        &self,
        owner_id: &str,
        query: &ListQuery,
    ) -> Result<DocumentPage<FavoriteDocumentRow>, AppError> {
        let (total_count, documents) = match query.kind {
            Some(kind) => {
                let (total,): (i64,) = sqlx::query_as(
                    "SELECT COUNT(*) FROM favorited_documents WHERE owner_id = $1 AND document_kind = $2",
                )
                .bind(owner_id)
                .bind(kind.as_str())
                .fetch_one(&self.pool)
                .await?;
                let rows: Vec<FavoriteDocumentRow> = sqlx::query_as(
                    r#"
                    SELECT * FROM favorited_documents
                    WHERE owner_id = $1 AND document_kind = $2
                    ORDER BY favorited_at DESC, id DESC
                    LIMIT $3 OFFSET $4
                    "#,
                )
                .bind(owner_id)
                .bind(kind.as_str())
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(&self.pool)
                .await?;
                (total, rows)
            }
            None => {
                let (total,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM favorited_documents WHERE owner_id = $1")
                        .bind(owner_id)
                        .fetch_one(&self.pool)
                        .await?;
                let rows: Vec<FavoriteDocumentRow> = sqlx::query_as(
                    r#"
                    SELECT * FROM favorited_documents
                    WHERE owner_id = $1
                    ORDER BY favorited_at DESC, id DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(owner_id)
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(&self.pool)
                .await?;
                (total, rows)
            }
        };

        Ok(DocumentPage::new(documents, total_count, query))
    }

    async fn get_document(
        &self,
        document_id: Uuid,
        owner_id: Option<&str>,
    ) -> Result<DocumentRecord, AppError> {
        // Recent wins deterministically if an id ever existed in both.
        let recent: Option<RecentDocumentRow> =
            sqlx::query_as("SELECT * FROM recent_documents WHERE id = $1")
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await?;

        let record = if let Some(row) = recent {
            DocumentRecord {
                source: DocumentSource::Recent,
                id: row.id,
                owner_id: row.owner_id,
                document_kind: row.document_kind,
                content: row.content,
                timestamp: row.created_at,
            }
        } else {
            let favorite: Option<FavoriteDocumentRow> =
                sqlx::query_as("SELECT * FROM favorited_documents WHERE id = $1")
                    .bind(document_id)
                    .fetch_optional(&self.pool)
                    .await?;
            let row = favorite.ok_or(AppError::DocumentNotFound)?;
            DocumentRecord {
                source: DocumentSource::Favorited,
                id: row.id,
                owner_id: row.owner_id,
                document_kind: row.document_kind,
                content: row.content,
                timestamp: row.favorited_at,
            }
        };

        if let Some(owner) = owner_id {
            if record.owner_id != owner {
                return Err(AppError::AccessDenied);
            }
        }

        Ok(record)
    }
}
