//! Document and extracted text database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;

/// Uploaded document record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub filename: Option<String>,
    pub file_type: Option<String>,
    pub created_at: String,
}

/// Extracted text record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExtractedText {
    pub id: String,
    pub document_id: String,
    pub content: Option<String>,
    pub created_at: String,
}

/// Fields for a new document row
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub file_type: String,
}

/// Fields for a new extracted text row
#[derive(Debug, Clone)]
pub struct NewExtractedText {
    pub id: String,
    pub document_id: String,
    pub content: String,
}

/// Document repository
pub struct DocumentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DocumentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a document and return the stored row
    pub async fn create(&self, new: &NewDocument) -> Result<Document> {
        let now = Utc::now().to_rfc3339();

        let document = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (id, user_id, filename, file_type, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, user_id, filename, file_type, created_at
            "#,
        )
        .bind(&new.id)
        .bind(&new.user_id)
        .bind(&new.filename)
        .bind(&new.file_type)
        .bind(&now)
        .fetch_one(self.pool)
        .await?;

        Ok(document)
    }

    /// Get a document by id
    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, user_id, filename, file_type, created_at
            FROM documents
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(document)
    }
}

/// Extracted text repository
pub struct ExtractedTextRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ExtractedTextRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert extracted text for a document
    pub async fn create(&self, new: &NewExtractedText) -> Result<ExtractedText> {
        let now = Utc::now().to_rfc3339();

        let text = sqlx::query_as::<_, ExtractedText>(
            r#"
            INSERT INTO extracted_text (id, document_id, content, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, document_id, content, created_at
            "#,
        )
        .bind(&new.id)
        .bind(&new.document_id)
        .bind(&new.content)
        .bind(&now)
        .fetch_one(self.pool)
        .await?;

        Ok(text)
    }

    /// All extracted text rows for a document, oldest first
    pub async fn list_for_document(&self, document_id: &str) -> Result<Vec<ExtractedText>> {
        let texts = sqlx::query_as::<_, ExtractedText>(
            r#"
            SELECT id, document_id, content, created_at
            FROM extracted_text
            WHERE document_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(self.pool)
        .await?;

        Ok(texts)
    }
}
