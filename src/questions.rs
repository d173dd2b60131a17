//! Grafos de preguntas ramificadas por tipo de encuestado.
//!
//! Cada categoría define una escalera fija de diez pasos. Los pasos de
//! valoración (q1, q3, q5, q7) se bifurcan en `qN_positive` / `qN_negative`
//! según el clasificador; los pasos de seguimiento convergen en el siguiente
//! paso de valoración. q9 lleva a q10 y q10 termina.
//!
//! Los ids de nodo son claves del mapa de respuestas almacenado, así que no
//! deben cambiar sin migrar los envíos históricos.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::classifier::{classify, Polarity};
use crate::error::SurveyError;

/// Número fijo de preguntas respondidas en cualquier recorrido.
pub const SURVEY_LENGTH: usize = 10;

pub const START_NODE: &str = "q1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Employee,
    Stakeholder,
    Customer,
}

/// Categoría usada cuando llega un nombre desconocido.
// TODO: decidir con producto si un tipo desconocido debe rechazarse en vez de caer aquí.
pub const DEFAULT_CATEGORY: Category = Category::Employee;

impl Category {
    /// Orden fijo de enumeración; también resuelve empates en la analítica.
    pub const ALL: [Category; 3] = [Category::Employee, Category::Stakeholder, Category::Customer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Employee => "employee",
            Category::Stakeholder => "stakeholder",
            Category::Customer => "customer",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Employee => "Employee",
            Category::Stakeholder => "Stakeholder",
            Category::Customer => "Customer",
        }
    }

    pub fn plural_label(&self) -> &'static str {
        match self {
            Category::Employee => "Employees",
            Category::Stakeholder => "Stakeholders",
            Category::Customer => "Customers",
        }
    }

    /// Conversión estricta, sin valor por defecto.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "employee" => Some(Self::Employee),
            "stakeholder" => Some(Self::Stakeholder),
            "customer" => Some(Self::Customer),
            _ => None,
        }
    }

    /// Conversión que nunca falla: un nombre desconocido cae en `DEFAULT_CATEGORY`
    /// y se deja constancia en el log.
    pub fn from_str_or_default(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| {
            warn!(
                "Categoría desconocida '{}', se usa '{}' por defecto.",
                s,
                DEFAULT_CATEGORY.as_str()
            );
            DEFAULT_CATEGORY
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tipo de entrada sugerido a la interfaz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerKind {
    /// Valoración o respuesta de una línea.
    Short,
    /// Texto libre.
    Long,
}

/// Regla de transición declarativa de un nodo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Next { to: &'static str },
    Branch {
        on_positive: &'static str,
        on_negative: &'static str,
    },
    End,
}

impl Transition {
    /// Id del siguiente nodo para la respuesta dada, o `None` si la encuesta termina.
    pub fn resolve(&self, answer: &str) -> Option<&'static str> {
        match *self {
            Transition::Next { to } => Some(to),
            Transition::Branch {
                on_positive,
                on_negative,
            } => match classify(answer) {
                Polarity::Positive => Some(on_positive),
                Polarity::Negative => Some(on_negative),
            },
            Transition::End => None,
        }
    }

    /// Todos los destinos posibles, sin consultar ninguna respuesta.
    pub fn targets(&self) -> Vec<&'static str> {
        match *self {
            Transition::Next { to } => vec![to],
            Transition::Branch {
                on_positive,
                on_negative,
            } => vec![on_positive, on_negative],
            Transition::End => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionNode {
    pub id: &'static str,
    pub prompt: &'static str,
    pub answer_kind: AnswerKind,
    pub transition: Transition,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionGraph {
    pub category: Category,
    pub start: &'static str,
    pub nodes: HashMap<&'static str, QuestionNode>,
}

impl QuestionGraph {
    fn from_nodes(category: Category, nodes: Vec<QuestionNode>) -> Self {
        Self {
            category,
            start: START_NODE,
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&QuestionNode> {
        self.nodes.get(id)
    }

    pub fn start_node(&self) -> Option<&QuestionNode> {
        self.node(self.start)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids ordenados, para salidas deterministas.
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Nodos en orden de escalera: q1, q2_negative, q2_positive, q3, ... q10.
    pub fn ordered_nodes(&self) -> Vec<&QuestionNode> {
        let mut nodes: Vec<_> = self.nodes.values().collect();
        nodes.sort_by_key(|n| (step_of(n.id), n.id));
        nodes
    }

    /// Comprueba las invariantes del grafo:
    ///   - el nodo inicial existe y todos los destinos existen;
    ///   - todo nodo es alcanzable desde el inicial;
    ///   - todo recorrido termina tras exactamente `SURVEY_LENGTH` respuestas.
    pub fn validate(&self) -> Result<(), SurveyError> {
        if self.start_node().is_none() {
            return Err(SurveyError::NotFound(format!(
                "nodo inicial '{}' en el grafo '{}'",
                self.start, self.category
            )));
        }

        for node in self.nodes.values() {
            for target in node.transition.targets() {
                if !self.nodes.contains_key(target) {
                    return Err(SurveyError::NotFound(format!(
                        "destino '{}' del nodo '{}' ({})",
                        target, node.id, self.category
                    )));
                }
            }
        }

        // Recorrido en profundidad de todos los caminos. Como la escalera es
        // convergente y corta, enumerar caminos es barato; el límite de
        // profundidad corta cualquier ciclo.
        let mut reached = HashSet::new();
        let mut stack = vec![(self.start, 1usize)];
        while let Some((id, depth)) = stack.pop() {
            reached.insert(id);
            let node = &self.nodes[id];
            let targets = node.transition.targets();
            if targets.is_empty() {
                if depth != SURVEY_LENGTH {
                    return Err(SurveyError::InvalidState(format!(
                        "el grafo '{}' termina en '{}' tras {} preguntas (se esperaban {})",
                        self.category, id, depth, SURVEY_LENGTH
                    )));
                }
                continue;
            }
            if depth >= SURVEY_LENGTH {
                return Err(SurveyError::InvalidState(format!(
                    "el grafo '{}' no termina en '{}' tras {} preguntas",
                    self.category, id, depth
                )));
            }
            for target in targets {
                stack.push((target, depth + 1));
            }
        }

        if reached.len() != self.nodes.len() {
            let mut orphans: Vec<_> = self
                .nodes
                .keys()
                .filter(|id| !reached.contains(*id))
                .copied()
                .collect();
            orphans.sort();
            return Err(SurveyError::InvalidState(format!(
                "nodos inalcanzables en '{}': {}",
                self.category,
                orphans.join(", ")
            )));
        }

        Ok(())
    }
}

/// Paso de la escalera codificado en el id ("q6_positive" -> 6).
fn step_of(id: &str) -> usize {
    id.trim_start_matches('q')
        .split('_')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX)
}

// --- Construcción de los grafos ---

const fn rating(id: &'static str, prompt: &'static str, transition: Transition) -> QuestionNode {
    QuestionNode {
        id,
        prompt,
        answer_kind: AnswerKind::Short,
        transition,
    }
}

const fn free_text(id: &'static str, prompt: &'static str, transition: Transition) -> QuestionNode {
    QuestionNode {
        id,
        prompt,
        answer_kind: AnswerKind::Long,
        transition,
    }
}

const fn branch(on_positive: &'static str, on_negative: &'static str) -> Transition {
    Transition::Branch {
        on_positive,
        on_negative,
    }
}

const fn next(to: &'static str) -> Transition {
    Transition::Next { to }
}

pub fn build_graph(category: Category) -> QuestionGraph {
    let nodes = match category {
        Category::Employee => employee_nodes(),
        Category::Stakeholder => stakeholder_nodes(),
        Category::Customer => customer_nodes(),
    };
    QuestionGraph::from_nodes(category, nodes)
}

/// Igual que `build_graph`, pero a partir de un nombre; los desconocidos usan
/// `DEFAULT_CATEGORY`.
pub fn build_graph_for(name: &str) -> QuestionGraph {
    build_graph(Category::from_str_or_default(name))
}

fn employee_nodes() -> Vec<QuestionNode> {
    vec![
        rating(
            "q1",
            "How would you rate your overall experience with our products? (1-10)",
            branch("q2_positive", "q2_negative"),
        ),
        free_text(
            "q2_positive",
            "That's great! Which features do you find most valuable in your daily work?",
            next("q3"),
        ),
        free_text(
            "q2_negative",
            "We understand. What are the main challenges you face with our products?",
            next("q3"),
        ),
        rating(
            "q3",
            "How effective is our product training and documentation? (1-10)",
            branch("q4_positive", "q4_negative"),
        ),
        free_text(
            "q4_positive",
            "Excellent! How do you typically use the training resources?",
            next("q5"),
        ),
        free_text(
            "q4_negative",
            "What improvements would make the training more helpful for you?",
            next("q5"),
        ),
        // Una respuesta afirmativa significa que hubo incidencias: la rama se invierte.
        free_text(
            "q5",
            "Have you encountered any technical issues recently?",
            branch("q6_negative", "q6_positive"),
        ),
        rating(
            "q6_positive",
            "Great! How well does the product integrate with your existing workflow? (1-10)",
            next("q7"),
        ),
        free_text(
            "q6_negative",
            "Please describe the technical issues so we can address them.",
            next("q7"),
        ),
        rating(
            "q7",
            "Would you recommend our products to colleagues? (1-10)",
            branch("q8_positive", "q8_negative"),
        ),
        free_text(
            "q8_positive",
            "Thank you! What specific aspects would you highlight in your recommendation?",
            next("q9"),
        ),
        free_text(
            "q8_negative",
            "What improvements would make you more likely to recommend us?",
            next("q9"),
        ),
        rating(
            "q9",
            "How long have you been working with our products?",
            next("q10"),
        ),
        free_text(
            "q10",
            "Any final suggestions or feedback for our product team?",
            Transition::End,
        ),
    ]
}

fn stakeholder_nodes() -> Vec<QuestionNode> {
    vec![
        rating(
            "q1",
            "How aligned are our products with current market demands? (1-10)",
            branch("q2_positive", "q2_negative"),
        ),
        free_text(
            "q2_positive",
            "Excellent! Which product lines show the strongest market position?",
            next("q3"),
        ),
        free_text(
            "q2_negative",
            "What market gaps should we prioritize addressing?",
            next("q3"),
        ),
        rating(
            "q3",
            "How effective is our product innovation strategy? (1-10)",
            branch("q4_positive", "q4_negative"),
        ),
        free_text(
            "q4_positive",
            "Great! What innovation areas should we expand further?",
            next("q5"),
        ),
        free_text(
            "q4_negative",
            "What changes would strengthen our innovation approach?",
            next("q5"),
        ),
        free_text(
            "q5",
            "Do you see competitive advantages in our current product portfolio?",
            branch("q6_positive", "q6_negative"),
        ),
        free_text(
            "q6_positive",
            "Which competitive advantages should we emphasize most?",
            next("q7"),
        ),
        free_text(
            "q6_negative",
            "How can we better differentiate from competitors?",
            next("q7"),
        ),
        rating(
            "q7",
            "How sustainable is our product roadmap for long-term growth? (1-10)",
            branch("q8_positive", "q8_negative"),
        ),
        free_text(
            "q8_positive",
            "Which aspects of the roadmap are most promising?",
            next("q9"),
        ),
        free_text(
            "q8_negative",
            "What strategic pivots should we consider?",
            next("q9"),
        ),
        free_text(
            "q9",
            "What emerging market trends should influence our product development?",
            next("q10"),
        ),
        free_text(
            "q10",
            "Any strategic recommendations for our product portfolio?",
            Transition::End,
        ),
    ]
}

fn customer_nodes() -> Vec<QuestionNode> {
    vec![
        rating(
            "q1",
            "How satisfied are you with your purchase? (1-10)",
            branch("q2_positive", "q2_negative"),
        ),
        free_text(
            "q2_positive",
            "Wonderful! What do you love most about the product?",
            next("q3"),
        ),
        free_text(
            "q2_negative",
            "We apologize for your experience. What disappointed you?",
            next("q3"),
        ),
        rating(
            "q3",
            "How easy was the product to use? (1-10)",
            branch("q4_positive", "q4_negative"),
        ),
        free_text(
            "q4_positive",
            "Great! Which features did you find most intuitive?",
            next("q5"),
        ),
        free_text(
            "q4_negative",
            "What aspects were confusing or difficult?",
            next("q5"),
        ),
        free_text(
            "q5",
            "Did the product meet your expectations?",
            branch("q6_positive", "q6_negative"),
        ),
        free_text(
            "q6_positive",
            "Excellent! How does it compare to similar products you've tried?",
            next("q7"),
        ),
        free_text(
            "q6_negative",
            "What features or improvements would have met your expectations?",
            next("q7"),
        ),
        rating(
            "q7",
            "How likely are you to recommend our product? (1-10)",
            branch("q8_positive", "q8_negative"),
        ),
        free_text(
            "q8_positive",
            "Thank you! Who would you recommend this product to?",
            next("q9"),
        ),
        free_text(
            "q8_negative",
            "What would make you more likely to recommend us?",
            next("q9"),
        ),
        rating(
            "q9",
            "How was your experience with our customer support? (1-10)",
            next("q10"),
        ),
        free_text(
            "q10",
            "Any final thoughts or suggestions for improvement?",
            Transition::End,
        ),
    ]
}
