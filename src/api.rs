use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    analytics::{self, AggregateStats, AnalyticsFilter, RatingPoint, RecentResponse},
    app_state::{AppState, Sessions, Status},
    classifier::{self, Polarity, Sentiment},
    error::SurveyError,
    models::{StoredSubmission, SubmissionRecord},
    questions::{build_graph_for, Category, QuestionNode},
    session::{AnswerOutcome, Progress, SurveySession},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

/// Filas que muestra la tabla de respuestas recientes.
const RECENT_ROWS: usize = 10;

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct StartSessionPayload {
    category: String,
}

#[derive(Deserialize)]
pub struct AnswerPayload {
    answer: String,
}

#[derive(Deserialize)]
pub struct ClassifyPayload {
    text: String,
}

#[derive(Deserialize)]
pub struct ResponsesQuery {
    limit: Option<usize>,
}

#[derive(Deserialize, Default)]
pub struct AnalyticsQuery {
    category: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct CategoryInfo {
    id: Category,
    label: &'static str,
    plural_label: &'static str,
}

#[derive(Serialize)]
pub struct GraphView {
    category: Category,
    start: &'static str,
    nodes: Vec<QuestionNode>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    session_id: Uuid,
    category: Category,
    category_label: &'static str,
    /// `None` cuando ya no quedan preguntas.
    question: Option<QuestionNode>,
    progress: Progress,
    question_number: usize,
    complete: bool,
}

impl From<&SurveySession> for SessionView {
    fn from(session: &SurveySession) -> Self {
        let progress = session.progress();
        Self {
            session_id: session.id,
            category: session.category(),
            category_label: session.category().label(),
            question: session.current_prompt().ok().cloned(),
            progress,
            question_number: progress.current_number(),
            complete: session.is_complete(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerResponse {
    Next { session: SessionView },
    Completed { submission: StoredSubmission },
}

#[derive(Serialize)]
pub struct ClassifyResponse {
    polarity: Polarity,
    sentiment: Sentiment,
    rating: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    stats: AggregateStats,
    recent: Vec<RecentResponse>,
    rating_points: Vec<RatingPoint>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/categories", get(categories_handler))
        .route("/api/graphs/:category", get(graph_handler))
        .route("/api/sessions", post(start_session_handler))
        .route(
            "/api/sessions/:id",
            get(session_handler).delete(abandon_session_handler),
        )
        .route("/api/sessions/:id/answers", post(answer_handler))
        .route("/api/sessions/:id/submit", post(submit_handler))
        .route("/api/classify", post(classify_handler))
        .route("/api/responses", get(responses_handler))
        .route("/api/analytics", get(analytics_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers de la encuesta ---

#[axum::debug_handler]
async fn categories_handler() -> Json<Vec<CategoryInfo>> {
    Json(
        Category::ALL
            .iter()
            .map(|c| CategoryInfo {
                id: *c,
                label: c.label(),
                plural_label: c.plural_label(),
            })
            .collect(),
    )
}

#[axum::debug_handler]
async fn graph_handler(Path(category): Path<String>) -> Json<GraphView> {
    let graph = build_graph_for(&category);
    Json(GraphView {
        category: graph.category,
        start: graph.start,
        nodes: graph.ordered_nodes().into_iter().cloned().collect(),
    })
}

#[axum::debug_handler]
async fn start_session_handler(
    State(state): State<AppState>,
    Json(payload): Json<StartSessionPayload>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let category = Category::from_str_or_default(&payload.category);
    let session = SurveySession::start(category);
    let view = SessionView::from(&session);

    info!("Nueva sesión {} ({})", session.id, category);
    state.sessions().insert(session.id, session);

    Ok((StatusCode::CREATED, Json(view)))
}

#[axum::debug_handler]
async fn session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let sessions = state.sessions();
    let session = sessions
        .get(&id)
        .ok_or_else(|| session_not_found(id).into_response_parts())?;
    Ok(Json(SessionView::from(session)))
}

#[axum::debug_handler]
async fn answer_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnswerPayload>,
) -> Result<Json<AnswerResponse>, ApiError> {
    // La parte síncrona se hace con el mapa bloqueado; el guardado, sin él.
    let (session, record) = {
        let mut sessions = state.sessions();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| session_not_found(id).into_response_parts())?;

        if let AnswerOutcome::Next(_) = session
            .submit_answer(&payload.answer)
            .map_err(SurveyError::into_response_parts)?
        {
            return Ok(Json(AnswerResponse::Next {
                session: SessionView::from(&*session),
            }));
        }
        take_finished(&mut sessions, id).map_err(SurveyError::into_response_parts)?
    };

    let submission = persist_completed(&state, session, record).await?;
    Ok(Json(AnswerResponse::Completed { submission }))
}

/// Reintenta el guardado de una sesión terminada cuyo envío falló.
#[axum::debug_handler]
async fn submit_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let (session, record) = take_finished(&mut state.sessions(), id)
        .map_err(SurveyError::into_response_parts)?;

    let submission = persist_completed(&state, session, record).await?;
    Ok(Json(AnswerResponse::Completed { submission }))
}

/// Saca del mapa una sesión terminada junto con su registro. Mientras se
/// guarda nadie más la encuentra; una sesión a medias se queda donde estaba.
fn take_finished(
    sessions: &mut Sessions,
    id: Uuid,
) -> Result<(SurveySession, SubmissionRecord), SurveyError> {
    let record = sessions
        .get(&id)
        .ok_or_else(|| session_not_found(id))?
        .finalize()?;
    let session = sessions.remove(&id).ok_or_else(|| session_not_found(id))?;
    Ok((session, record))
}

/// Guarda el envío; si el almacén falla, la sesión vuelve al mapa para reintentar.
async fn persist_completed(
    state: &AppState,
    session: SurveySession,
    record: SubmissionRecord,
) -> Result<StoredSubmission, ApiError> {
    let id = session.id;
    match state.store.create(record).await {
        Ok(stored) => {
            info!(
                "Sesión {} completada y guardada como {} ({} s)",
                id, stored.id, stored.record.elapsed_seconds
            );
            Ok(stored)
        }
        Err(e) => {
            error!("No se pudo guardar la sesión {}: {}", id, e);
            state.sessions().insert(id, session);
            Err(SurveyError::from(e).into_response_parts())
        }
    }
}

#[axum::debug_handler]
async fn abandon_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StoredSubmission>, ApiError> {
    let session = state
        .sessions()
        .remove(&id)
        .ok_or_else(|| session_not_found(id).into_response_parts())?;

    match state.store.create(session.abandon()).await {
        Ok(stored) => {
            info!("Sesión {} abandonada tras {} respuestas", id, session.answers().len());
            Ok(Json(stored))
        }
        Err(e) => {
            error!("No se pudo guardar la sesión abandonada {}: {}", id, e);
            state.sessions().insert(id, session);
            Err(SurveyError::from(e).into_response_parts())
        }
    }
}

#[axum::debug_handler]
async fn classify_handler(Json(payload): Json<ClassifyPayload>) -> Json<ClassifyResponse> {
    Json(ClassifyResponse {
        polarity: classifier::classify(&payload.text),
        sentiment: classifier::sentiment(&payload.text),
        rating: classifier::extract_rating(&payload.text),
    })
}

// --- Handlers de analítica ---

#[axum::debug_handler]
async fn responses_handler(
    State(state): State<AppState>,
    Query(params): Query<ResponsesQuery>,
) -> Result<Json<Vec<StoredSubmission>>, ApiError> {
    let limit = params.limit.unwrap_or(state.config.responses_limit);
    state.store.list(limit).await.map(Json).map_err(|e| {
        error!("Error listando envíos: {}", e);
        SurveyError::from(e).into_response_parts()
    })
}

#[axum::debug_handler]
async fn analytics_handler(
    State(state): State<AppState>,
    Query(params): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let filter = analytics_filter(params).map_err(SurveyError::into_response_parts)?;

    let submissions = state
        .store
        .list(state.config.responses_limit)
        .await
        .map_err(|e| {
            error!("Error listando envíos para la analítica: {}", e);
            SurveyError::from(e).into_response_parts()
        })?;

    let submissions = filter.apply(&submissions);
    let records: Vec<_> = submissions.iter().map(|s| s.record.clone()).collect();

    Ok(Json(AnalyticsResponse {
        stats: analytics::aggregate(&records),
        recent: analytics::recent_responses(&submissions, RECENT_ROWS),
        rating_points: analytics::customer_rating_points(&records),
    }))
}

/// "all" o vacío significa sin filtro de categoría; un nombre desconocido es un error.
fn analytics_filter(params: AnalyticsQuery) -> Result<AnalyticsFilter, SurveyError> {
    let category = match params.category.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(name) => Some(Category::parse(name).ok_or_else(|| {
            SurveyError::Validation(format!("categoría desconocida: {name}"))
        })?),
    };
    Ok(AnalyticsFilter {
        category,
        start_date: params.start_date,
        end_date: params.end_date,
    })
}

// --- Estado, apagado y utilidades ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    let open_sessions = state.sessions().len();
    Json(Status {
        backend: state.store.backend().to_string(),
        open_sessions,
        message: "Servidor listo.".to_string(),
    })
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    let sender = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
    StatusCode::OK
}

fn session_not_found(id: Uuid) -> SurveyError {
    SurveyError::NotFound(format!("sesión {id}"))
}
