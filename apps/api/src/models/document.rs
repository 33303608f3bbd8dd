use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of generated artifact a document holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    CoverLetter,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Resume => "resume",
            DocumentKind::CoverLetter => "cover_letter",
        }
    }

    pub fn parse(s: &str) -> Option<DocumentKind> {
        match s {
            "resume" => Some(DocumentKind::Resume),
            "cover_letter" => Some(DocumentKind::CoverLetter),
            _ => None,
        }
    }
}

/// Entry in the bounded, recency-ordered per-owner log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecentDocumentRow {
    pub id: Uuid,
    pub owner_id: String,
    pub document_kind: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Entry in the unbounded, user-curated favorites set. Favorites hold a
/// copy of the content, so they survive eviction of the recent entry they
/// were promoted from.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FavoriteDocumentRow {
    pub id: Uuid,
    pub owner_id: String,
    pub document_kind: String,
    pub content: String,
    pub favorited_at: DateTime<Utc>,
}

/// Which store a cross-store lookup found the document in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    Recent,
    Favorited,
}

/// Unified view of a document found by id in either store.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub source: DocumentSource,
    pub id: Uuid,
    pub owner_id: String,
    pub document_kind: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Offset-paginated listing parameters.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub limit: i64,
    pub offset: i64,
    pub kind: Option<DocumentKind>,
}

/// Pagination cursor block mirrored into every list response.
#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
    #[serde(rename = "nextOffset")]
    pub next_offset: Option<i64>,
}

/// A page of documents plus the pagination envelope the frontend expects.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentPage<T> {
    pub documents: Vec<T>,
    #[serde(rename = "totalCount")]
    pub total_count: i64,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    pub pagination: Pagination,
}

impl<T> DocumentPage<T> {
    pub fn new(documents: Vec<T>, total_count: i64, query: &ListQuery) -> Self {
        let has_more = query.offset + query.limit < total_count;
        DocumentPage {
            documents,
            total_count,
            has_more,
            pagination: Pagination {
                limit: query.limit,
                offset: query.offset,
                next_offset: has_more.then_some(query.offset + query.limit),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_kind_round_trip() {
        assert_eq!(DocumentKind::parse("resume"), Some(DocumentKind::Resume));
        assert_eq!(
            DocumentKind::parse("cover_letter"),
            Some(DocumentKind::CoverLetter)
        );
        assert_eq!(DocumentKind::parse("memo"), None);
    }

    #[test]
    fn test_page_has_more_window() {
        let query = ListQuery {
            limit: 20,
            offset: 0,
            kind: None,
        };
        let page: DocumentPage<()> = DocumentPage::new(vec![], 45, &query);
        assert!(page.has_more);
        assert_eq!(page.pagination.next_offset, Some(20));

        let query = ListQuery {
            limit: 20,
            offset: 40,
            kind: None,
        };
        let page: DocumentPage<()> = DocumentPage::new(vec![], 45, &query);
        assert!(!page.has_more);
        assert_eq!(page.pagination.next_offset, None);
    }
}
