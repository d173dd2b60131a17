//! Errores del dominio de la encuesta y su traducción a respuestas HTTP.

use axum::{http::StatusCode, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurveyError {
    /// Respuesta vacía o sólo con espacios. La sesión no cambia.
    #[error("Respuesta no válida: {0}")]
    Validation(String),

    /// Violación del contrato de la sesión (p.ej. finalizar antes de terminar).
    #[error("Estado no válido: {0}")]
    InvalidState(String),

    #[error("No encontrado: {0}")]
    NotFound(String),

    /// Fallo del almacén de envíos, se propaga tal cual.
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
}

impl SurveyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SurveyError::Validation(_) => StatusCode::BAD_REQUEST,
            SurveyError::InvalidState(_) => StatusCode::CONFLICT,
            SurveyError::NotFound(_) => StatusCode::NOT_FOUND,
            SurveyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Forma de error que devuelven todos los handlers de la API.
    pub fn into_response_parts(self) -> (StatusCode, Json<serde_json::Value>) {
        (self.status_code(), Json(json!({ "error": self.to_string() })))
    }
}
