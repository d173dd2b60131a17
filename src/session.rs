//! Motor de sesiones: recorre el grafo de una categoría desde `q1` hasta el
//! final, guardando una respuesta por nodo visitado.
//!
//! Una sesión la maneja un único encuestado; no hay concurrencia interna.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::SurveyError,
    models::{Answers, SubmissionRecord},
    questions::{build_graph, Category, QuestionGraph, QuestionNode, SURVEY_LENGTH},
};

/// Avance de la encuesta. El total es fijo: todas las ramas tienen diez preguntas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

impl Progress {
    /// Número de la pregunta en pantalla ("Pregunta N de 10").
    pub fn current_number(&self) -> usize {
        (self.answered + 1).min(self.total)
    }

    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.answered as f32 / self.total as f32 * 100.0
    }
}

/// Resultado de registrar una respuesta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    Next(QuestionNode),
    Complete,
}

#[derive(Debug, Clone)]
pub struct SurveySession {
    pub id: Uuid,
    category: Category,
    graph: QuestionGraph,
    current: Option<&'static str>,
    answers: Answers,
    started_at: DateTime<Utc>,
    /// Momento de la última respuesta; fija el tiempo empleado aunque el guardado se reintente.
    completed_at: Option<DateTime<Utc>>,
}

impl SurveySession {
    pub fn start(category: Category) -> Self {
        Self::start_at(category, Utc::now())
    }

    pub fn start_at(category: Category, now: DateTime<Utc>) -> Self {
        let graph = build_graph(category);
        Self {
            id: Uuid::new_v4(),
            category,
            current: Some(graph.start),
            graph,
            answers: Answers::new(),
            started_at: now,
            completed_at: None,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    /// `None` una vez alcanzado el final.
    pub fn current_node_id(&self) -> Option<&'static str> {
        self.current
    }

    pub fn is_complete(&self) -> bool {
        self.current.is_none()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            answered: self.answers.len(),
            total: SURVEY_LENGTH,
        }
    }

    pub fn current_prompt(&self) -> Result<&QuestionNode, SurveyError> {
        let id = self.current.ok_or_else(|| {
            SurveyError::InvalidState("la encuesta ya ha terminado".to_string())
        })?;
        self.graph
            .node(id)
            .ok_or_else(|| SurveyError::NotFound(format!("pregunta '{}'", id)))
    }

    /// Registra la respuesta a la pregunta actual y avanza.
    ///
    /// Una respuesta vacía se rechaza sin tocar la sesión. Si el mismo nodo se
    /// responde dos veces, el texto se sustituye pero conserva su posición.
    pub fn submit_answer(&mut self, text: &str) -> Result<AnswerOutcome, SurveyError> {
        self.submit_answer_at(text, Utc::now())
    }

    pub fn submit_answer_at(
        &mut self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, SurveyError> {
        let node = self.current_prompt()?;

        if text.trim().is_empty() {
            return Err(SurveyError::Validation(
                "la respuesta está vacía".to_string(),
            ));
        }

        let node_id = node.id;
        let next = match node.transition.resolve(text) {
            Some(next_id) => {
                let next_node = self.graph.node(next_id).ok_or_else(|| {
                    SurveyError::NotFound(format!(
                        "pregunta '{}' (destino de '{}')",
                        next_id, node_id
                    ))
                })?;
                Some(next_node.clone())
            }
            None => None,
        };

        self.answers.insert(node_id.to_string(), text.to_string());
        self.current = next.as_ref().map(|n| n.id);

        Ok(match next {
            Some(node) => AnswerOutcome::Next(node),
            None => {
                self.completed_at = Some(now);
                AnswerOutcome::Complete
            }
        })
    }

    /// Registro completo, medido hasta la última respuesta.
    pub fn finalize(&self) -> Result<SubmissionRecord, SurveyError> {
        self.finalize_at(self.completed_at.unwrap_or_else(Utc::now))
    }

    /// Registro completo de la sesión. Sólo es válido tras la última pregunta.
    pub fn finalize_at(&self, now: DateTime<Utc>) -> Result<SubmissionRecord, SurveyError> {
        if !self.is_complete() {
            return Err(SurveyError::InvalidState(format!(
                "no se puede finalizar: quedan preguntas ({} de {} respondidas)",
                self.answers.len(),
                SURVEY_LENGTH
            )));
        }
        Ok(self.record_at(now))
    }

    pub fn abandon(&self) -> SubmissionRecord {
        self.abandon_at(Utc::now())
    }

    /// Registro de una sesión que se deja a medias.
    pub fn abandon_at(&self, now: DateTime<Utc>) -> SubmissionRecord {
        self.record_at(now)
    }

    fn record_at(&self, now: DateTime<Utc>) -> SubmissionRecord {
        SubmissionRecord {
            category: self.category,
            answers: self.answers.clone(),
            completed: self.is_complete(),
            elapsed_seconds: (now - self.started_at).num_seconds().max(0) as u64,
        }
    }
}
