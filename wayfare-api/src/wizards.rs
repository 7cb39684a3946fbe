use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, patch, post},
    Json, Router,
};
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;
use crate::error::AppError;
use crate::state::AppState;
use wayfare_catalog::PriceQuote;
use wayfare_core::{FormFields, SubscriptionId, ValidationResult};
use wayfare_order::{SessionSnapshot, SubmissionResult, WizardSession};
use wayfare_shared::WizardEvent;

#[derive(Debug, Deserialize)]
pub struct StartWizardRequest {
    pub flow: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFieldsRequest {
    pub fields: FormFields,
}

#[derive(Debug, Serialize)]
pub struct UpdateFieldsResponse {
    pub changed: Vec<String>,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct NextStepResponse {
    pub validation: ValidationResult,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct GoToStepRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub days: Option<u32>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/wizards", post(start_wizard))
        .route("/v1/wizards/{id}", get(get_wizard).delete(cancel_wizard))
        .route("/v1/wizards/{id}/fields", patch(update_fields))
        .route("/v1/wizards/{id}/next", post(next_step))
        .route("/v1/wizards/{id}/back", post(previous_step))
        .route("/v1/wizards/{id}/goto", post(go_to_step))
        .route("/v1/wizards/{id}/quote", get(quote))
        .route("/v1/wizards/{id}/submit", post(submit))
        .route("/v1/wizards/{id}/events", get(events))
}

async fn session(state: &AppState, id: Uuid) -> Result<Arc<WizardSession>, AppError> {
    state.sessions.get(id).await.map_err(AppError::session)
}

/// POST /v1/wizards
async fn start_wizard(
    State(state): State<AppState>,
    Json(req): Json<StartWizardRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let session = state.sessions.start(&req.flow).await.map_err(AppError::session)?;
    Ok((StatusCode::CREATED, Json(session.snapshot().await)))
}

/// GET /v1/wizards/{id}
async fn get_wizard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = session(&state, id).await?;
    Ok(Json(session.snapshot().await))
}

/// PATCH /v1/wizards/{id}/fields
/// Merge edits into the draft; `null` clears a field
async fn update_fields(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFieldsRequest>,
) -> Result<Json<UpdateFieldsResponse>, AppError> {
    let session = session(&state, id).await?;
    let changed = session
        .merge_fields(req.fields)
        .await
        .map_err(AppError::navigation)?;

    Ok(Json(UpdateFieldsResponse {
        changed,
        snapshot: session.snapshot().await,
    }))
}

/// POST /v1/wizards/{id}/next
/// A failed validation is a normal answer, not an error status
async fn next_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NextStepResponse>, AppError> {
    let session = session(&state, id).await?;
    let validation = session.go_next().await.map_err(AppError::navigation)?;

    Ok(Json(NextStepResponse {
        validation,
        snapshot: session.snapshot().await,
    }))
}

/// POST /v1/wizards/{id}/back
async fn previous_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = session(&state, id).await?;
    session.go_back().await.map_err(AppError::navigation)?;
    Ok(Json(session.snapshot().await))
}

/// POST /v1/wizards/{id}/goto
async fn go_to_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<GoToStepRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = session(&state, id).await?;
    session.go_to_step(req.index).await.map_err(AppError::navigation)?;
    Ok(Json(session.snapshot().await))
}

/// GET /v1/wizards/{id}/quote?days=N
async fn quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<PriceQuote>, AppError> {
    if params.days == Some(0) {
        return Err(AppError::ValidationError("days must be at least 1".to_string()));
    }

    let session = session(&state, id).await?;
    session.quote(params.days).await.map(Json).ok_or_else(|| {
        AppError::NotFoundError(format!("Flow '{}' has no pricing", session.flow().id))
    })
}

/// POST /v1/wizards/{id}/submit
/// A confirmed booking ends the session; a failed one leaves it open for a retry
async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SubmissionResult>), AppError> {
    let session = session(&state, id).await?;
    let result = session.submit().await.map_err(AppError::submit)?;

    if result.is_success() {
        state.sessions.finish(id).await;
        info!(draft_id = %id, confirmation_id = ?result.confirmation_id, "Wizard completed");
        Ok((StatusCode::OK, Json(result)))
    } else {
        Ok((StatusCode::BAD_GATEWAY, Json(result)))
    }
}

/// DELETE /v1/wizards/{id}
async fn cancel_wizard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.cancel(id).await.map_err(AppError::session)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/wizards/{id}/events
/// Server-Sent Events feed of every change to the session. The stream ends
/// after the `submitted` or `closed` event.
async fn events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = session(&state, id).await?;
    let stream = subscribe(&session, state.event_buffer)
        .await
        .map_err(AppError::navigation)?;

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Bridge the session's synchronous listeners onto a broadcast channel.
///
/// The stream stops after forwarding a terminal event, or earlier if the
/// session drops its listeners (the listener owns the only sender). It holds
/// only a weak reference back to the session so an open connection does not
/// keep a finished session alive.
async fn subscribe(
    session: &Arc<WizardSession>,
    buffer: usize,
) -> Result<impl Stream<Item = Result<Event, axum::Error>>, wayfare_core::NavigationError> {
    let (tx, rx) = broadcast::channel::<WizardEvent>(buffer);
    let subscription = session
        .subscribe(Arc::new(move |event: &WizardEvent| {
            // No receiver just means the client went away
            let _ = tx.send(event.clone());
        }))
        .await?;
    debug!(draft_id = %session.id(), "Event stream opened");

    let guard = Unsubscribe {
        session: Arc::downgrade(session),
        subscription,
    };

    let events = tokio_stream::wrappers::BroadcastStream::new(rx);
    // Ends right after a terminal event without waiting for another one
    let feed = stream::unfold(Some(events), |events| async move {
        let mut events = events?;
        let result = events.next().await?;
        let terminal = matches!(&result, Ok(event) if event.is_terminal());
        Some((result, (!terminal).then_some(events)))
    })
    .filter_map(move |result| {
        let _ = &guard;
        async move {
            match result {
                Ok(event) => Some(Event::default().event(event.name()).json_data(&event)),
                // Lagged: the client missed events, the next snapshot catches it up
                Err(_) => None,
            }
        }
    });
    Ok(feed)
}

/// Detaches the SSE listener when the client disconnects
struct Unsubscribe {
    session: Weak<WizardSession>,
    subscription: SubscriptionId,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        let subscription = self.subscription;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                session.unsubscribe(subscription).await;
            });
        }
    }
}
