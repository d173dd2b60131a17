//! Modelos persistidos: el envío de una encuesta y su forma almacenada.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::questions::Category;

/// Respuestas por id de nodo, en orden de visita.
pub type Answers = IndexMap<String, String>;

/// Registro que se entrega al almacén al cerrar una sesión.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    pub category: Category,
    pub answers: Answers,
    pub completed: bool,
    pub elapsed_seconds: u64,
}

impl SubmissionRecord {
    /// Respuestas con texto no vacío (tras quitar espacios).
    pub fn non_empty_answers(&self) -> impl Iterator<Item = (&String, &String)> {
        self.answers.iter().filter(|(_, text)| !text.trim().is_empty())
    }
}

/// Un envío tal y como lo devuelve el almacén, con id y fecha asignados.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSubmission {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: SubmissionRecord,
}
