//! Clasificador heurístico de positividad de respuestas libres.
//!
//! Se usa en dos sitios:
//!   - el motor de sesiones, para decidir la rama siguiente (`classify`, dos valores);
//!   - la analítica, para contar sentimiento por respuesta (`sentiment`, tres valores).
//!
//! Ambas variantes comparten la misma extracción de señal: primero una
//! valoración numérica 1-10, luego palabras clave y por último la longitud.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

const POSITIVE_KEYWORDS: [&str; 11] = [
    "yes", "good", "great", "excellent", "satisfied", "happy", "love", "effective", "well",
    "recommend", "positive",
];

const NEGATIVE_KEYWORDS: [&str; 11] = [
    "no", "bad", "poor", "unsatisfied", "unhappy", "hate", "ineffective", "difficult", "not",
    "don't", "negative",
];

/// Por encima de esta longitud (normalizada) una respuesta sin otra señal cuenta como positiva.
pub const LENGTH_THRESHOLD: usize = 20;

/// Respuestas sin señal y más cortas que esto son neutrales para `sentiment`.
pub const NEUTRAL_MAX_CHARS: usize = 3;

// Sólo dígitos ASCII: "٣" no es una valoración.
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl From<Polarity> for Sentiment {
    fn from(p: Polarity) -> Self {
        match p {
            Polarity::Positive => Sentiment::Positive,
            Polarity::Negative => Sentiment::Negative,
        }
    }
}

/// Señal decisiva encontrada en una respuesta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Rating(u32),
    Keyword(Polarity),
    /// Sin valoración ni palabra clave decisiva: sólo queda la longitud normalizada.
    Length(usize),
}

impl Signal {
    pub fn polarity(self) -> Polarity {
        match self {
            Signal::Rating(r) if r >= 6 => Polarity::Positive,
            Signal::Rating(_) => Polarity::Negative,
            Signal::Keyword(p) => p,
            Signal::Length(n) if n > LENGTH_THRESHOLD => Polarity::Positive,
            Signal::Length(_) => Polarity::Negative,
        }
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase().trim().to_string()
}

/// Primera secuencia de dígitos del texto original, si vale entre 1 y 10.
///
/// Sólo se mira la primera secuencia: "0 de 10" no es una valoración.
pub fn extract_rating(text: &str) -> Option<u32> {
    let run = DIGIT_RUN.find(text)?;
    run.as_str()
        .parse::<u64>()
        .ok()
        .filter(|n| (1..=10).contains(n))
        .map(|n| n as u32)
}

pub fn extract_signal(text: &str) -> Signal {
    if let Some(rating) = extract_rating(text) {
        return Signal::Rating(rating);
    }

    let normalized = normalize(text);
    let has_positive = POSITIVE_KEYWORDS.iter().any(|w| normalized.contains(w));
    let has_negative = NEGATIVE_KEYWORDS.iter().any(|w| normalized.contains(w));

    match (has_positive, has_negative) {
        (true, false) => Signal::Keyword(Polarity::Positive),
        (false, true) => Signal::Keyword(Polarity::Negative),
        // Ambas o ninguna: decide la longitud.
        _ => Signal::Length(normalized.chars().count()),
    }
}

/// Clasificación de dos valores usada por las transiciones del grafo.
pub fn classify(text: &str) -> Polarity {
    extract_signal(text).polarity()
}

/// Sentimiento de tres valores usado por la analítica.
///
/// Neutral sólo para respuestas vacías o casi vacías sin otra señal
/// (menos de `NEUTRAL_MAX_CHARS` caracteres normalizados).
pub fn sentiment(text: &str) -> Sentiment {
    match extract_signal(text) {
        Signal::Length(n) if n < NEUTRAL_MAX_CHARS => Sentiment::Neutral,
        signal => signal.polarity().into(),
    }
}
