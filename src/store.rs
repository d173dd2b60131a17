//! Almacén de envíos: el colaborador externo que guarda los registros
//! terminados y los devuelve para la analítica.
//!
//! API pública:
//!   - `SubmissionStore::create(record)` / `SubmissionStore::list(limit)`;
//!   - `InMemoryStore` (por defecto y para tests) y `Neo4jStore`;
//!   - `connect_store(&AppConfig)`.
//!
//! No hay reintentos: los fallos se devuelven tal cual a quien llama.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::{AppConfig, StorageBackend},
    error::SurveyError,
    models::{Answers, StoredSubmission, SubmissionRecord},
    neo4j_client,
    questions::{Category, DEFAULT_CATEGORY},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Error de Neo4j: {0}")]
    Neo4j(#[from] neo4rs::Error),

    #[error("Error de serialización: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Dato no válido en el almacén: {0}")]
    Corrupt(String),
}

impl From<StoreError> for SurveyError {
    fn from(err: StoreError) -> Self {
        SurveyError::Storage(err.to_string())
    }
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Nombre corto del backend, para logs y `/api/status`.
    fn backend(&self) -> &'static str;

    async fn create(&self, record: SubmissionRecord) -> Result<StoredSubmission, StoreError>;

    /// Envíos más recientes primero, como mucho `limit`.
    async fn list(&self, limit: usize) -> Result<Vec<StoredSubmission>, StoreError>;
}

// --- Memoria ---

#[derive(Clone, Default)]
pub struct InMemoryStore {
    submissions: Arc<Mutex<Vec<StoredSubmission>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserta un envío ya formado (id y fecha incluidos).
    pub fn insert(&self, submission: StoredSubmission) {
        self.submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(submission);
    }
}

#[async_trait]
impl SubmissionStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        StorageBackend::Memory.as_str()
    }

    async fn create(&self, record: SubmissionRecord) -> Result<StoredSubmission, StoreError> {
        let stored = StoredSubmission {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            record,
        };
        self.insert(stored.clone());
        Ok(stored)
    }

    async fn list(&self, limit: usize) -> Result<Vec<StoredSubmission>, StoreError> {
        let mut all: Vec<_> = self
            .submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .cloned()
            .collect();
        // Orden estable: a igual fecha, el último insertado va primero.
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }
}

// --- Neo4j ---

/// Un nodo `:Submission` por envío. Las respuestas se guardan como JSON
/// para conservar el orden de visita.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Arc<Graph>,
}

impl Neo4jStore {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl SubmissionStore for Neo4jStore {
    fn backend(&self) -> &'static str {
        StorageBackend::Neo4j.as_str()
    }

    async fn create(&self, record: SubmissionRecord) -> Result<StoredSubmission, StoreError> {
        let stored = StoredSubmission {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            record,
        };
        let answers_json = serde_json::to_string(&stored.record.answers)?;

        self.graph
            .run(
                query(
                    "CREATE (s:Submission {id: $id})
                     SET s.category = $category, s.answers = $answers,
                         s.completed = $completed, s.elapsed_seconds = $elapsed_seconds,
                         s.created_at = datetime($created_at)",
                )
                .param("id", stored.id.clone())
                .param("category", stored.record.category.as_str().to_string())
                .param("answers", answers_json)
                .param("completed", stored.record.completed)
                .param("elapsed_seconds", stored.record.elapsed_seconds as i64)
                .param("created_at", stored.created_at.to_rfc3339()),
            )
            .await?;

        Ok(stored)
    }

    async fn list(&self, limit: usize) -> Result<Vec<StoredSubmission>, StoreError> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (s:Submission)
                     RETURN s.id AS id, s.category AS category, s.answers AS answers,
                            s.completed AS completed, s.elapsed_seconds AS elapsed_seconds,
                            toString(s.created_at) AS created_at
                     ORDER BY s.created_at DESC
                     LIMIT $limit",
                )
                .param("limit", limit as i64),
            )
            .await?;

        let mut output = Vec::new();
        while let Some(row) = cursor.next().await? {
            output.push(stored_from_row(SubmissionRow {
                id: row.get("id"),
                category: row.get("category"),
                answers: row.get("answers"),
                completed: row.get("completed"),
                elapsed_seconds: row.get("elapsed_seconds"),
                created_at: row.get("created_at"),
            })?);
        }

        Ok(output)
    }
}

/// Columnas de un nodo `:Submission`, tal como las devuelve Neo4j.
#[derive(Debug, Default)]
struct SubmissionRow {
    id: Option<String>,
    category: Option<String>,
    answers: Option<String>,
    completed: Option<bool>,
    elapsed_seconds: Option<i64>,
    created_at: Option<String>,
}

/// Reconstruye un envío a partir de una fila.
///
/// `id` y `created_at` identifican y ordenan el envío: sin ellos la fila es
/// corrupta. El resto describe el contenido y tiene un valor neutro: una
/// categoría ausente o desconocida es la categoría por defecto, sin respuestas,
/// sin completar y sin tiempo medido.
fn stored_from_row(row: SubmissionRow) -> Result<StoredSubmission, StoreError> {
    let id = row
        .id
        .ok_or_else(|| StoreError::Corrupt("falta el campo 'id'".to_string()))?;
    let created_at = row
        .created_at
        .ok_or_else(|| StoreError::Corrupt(format!("envío {id} sin 'created_at'")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| StoreError::Corrupt(format!("fecha no válida en {id}: {e}")))?
        .with_timezone(&Utc);

    let category = row
        .category
        .as_deref()
        .map_or(DEFAULT_CATEGORY, Category::from_str_or_default);
    let answers: Answers = match row.answers {
        Some(json) => serde_json::from_str(&json)?,
        None => Answers::new(),
    };
    let completed = row.completed.unwrap_or(false);
    let elapsed_seconds = row.elapsed_seconds.unwrap_or(0);

    Ok(StoredSubmission {
        id,
        created_at,
        record: SubmissionRecord {
            category,
            answers,
            completed,
            elapsed_seconds: elapsed_seconds.max(0) as u64,
        },
    })
}

/// Elige y prepara el backend configurado.
pub async fn connect_store(cfg: &AppConfig) -> Result<Arc<dyn SubmissionStore>> {
    match cfg.storage {
        StorageBackend::Memory => {
            info!("Usando almacén de envíos en memoria (los datos se pierden al cerrar).");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StorageBackend::Neo4j => {
            let graph = neo4j_client::connect_from_config(cfg).await?;
            neo4j_client::ensure_schema(&graph).await?;
            Ok(Arc::new(Neo4jStore::new(Arc::new(graph))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(category: Category, completed: bool) -> SubmissionRecord {
        let mut answers = Answers::new();
        answers.insert("q1".to_string(), "8".to_string());
        SubmissionRecord {
            category,
            answers,
            completed,
            elapsed_seconds: 120,
        }
    }

    fn row(category: &str, answers: &str, created_at: &str) -> SubmissionRow {
        SubmissionRow {
            id: Some("abc".to_string()),
            category: Some(category.to_string()),
            answers: Some(answers.to_string()),
            completed: Some(true),
            elapsed_seconds: Some(75),
            created_at: Some(created_at.to_string()),
        }
    }

    #[test]
    fn memory_store_assigns_ids_and_lists_newest_first() {
        let store = InMemoryStore::new();
        let first = tokio_test::block_on(store.create(record(Category::Employee, true))).unwrap();
        let second = tokio_test::block_on(store.create(record(Category::Customer, false))).unwrap();
        assert_ne!(first.id, second.id);

        let listed = tokio_test::block_on(store.list(10)).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(listed[1].record, record(Category::Employee, true));
    }

    #[test]
    fn memory_store_orders_by_creation_date_and_honours_limit() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        for (i, days_ago) in [3, 1, 2].into_iter().enumerate() {
            store.insert(StoredSubmission {
                id: format!("s{i}"),
                created_at: now - Duration::days(days_ago),
                record: record(Category::Stakeholder, true),
            });
        }

        let listed = tokio_test::block_on(store.list(2)).unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);

        assert!(tokio_test::block_on(store.list(0)).unwrap().is_empty());
    }

    #[test]
    fn rows_are_rebuilt_in_answer_order() {
        let stored = stored_from_row(row(
            "customer",
            r#"{"q1":"3","q2_negative":"Late","q3":"9"}"#,
            "2024-05-01T10:00:00.123Z",
        ))
        .unwrap();
        assert!(stored.record.completed);

        assert_eq!(stored.record.category, Category::Customer);
        let keys: Vec<_> = stored.record.answers.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["q1", "q2_negative", "q3"]);
        assert_eq!(stored.record.elapsed_seconds, 75);
        assert_eq!(stored.created_at.to_rfc3339(), "2024-05-01T10:00:00.123+00:00");
    }

    #[test]
    fn corrupt_rows_are_reported() {
        let bad_json = stored_from_row(row("employee", "not json", "2024-05-01T10:00:00Z"));
        assert!(matches!(bad_json, Err(StoreError::Serialization(_))));

        let bad_date = stored_from_row(row("employee", "{}", "yesterday"));
        assert!(matches!(bad_date, Err(StoreError::Corrupt(_))));

        let no_id = stored_from_row(SubmissionRow {
            id: None,
            ..row("employee", "{}", "2024-05-01T10:00:00Z")
        });
        assert!(matches!(no_id, Err(StoreError::Corrupt(_))));

        let no_date = stored_from_row(SubmissionRow {
            created_at: None,
            ..row("employee", "{}", "2024-05-01T10:00:00Z")
        });
        assert!(matches!(no_date, Err(StoreError::Corrupt(_))));

        let unknown = stored_from_row(SubmissionRow {
            elapsed_seconds: Some(-5),
            ..row("partner", "{}", "2024-05-01T10:00:00Z")
        })
        .unwrap();
        assert_eq!(unknown.record.category, Category::Employee);
        assert_eq!(unknown.record.elapsed_seconds, 0);
    }

    #[test]
    fn missing_content_columns_take_neutral_values() {
        let stored = stored_from_row(SubmissionRow {
            id: Some("old".to_string()),
            created_at: Some("2023-11-02T08:30:00Z".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(stored.id, "old");
        assert_eq!(stored.record.category, DEFAULT_CATEGORY);
        assert!(stored.record.answers.is_empty());
        assert!(!stored.record.completed);
        assert_eq!(stored.record.elapsed_seconds, 0);
    }

    #[test]
    fn store_errors_become_storage_errors() {
        let err: SurveyError = StoreError::Corrupt("sin id".to_string()).into();
        assert_eq!(
            err,
            SurveyError::Storage("Dato no válido en el almacén: sin id".to_string())
        );
    }
}
