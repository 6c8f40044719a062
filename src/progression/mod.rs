//! # Progression Module - Lesson Access & Completion Engine
//!
//! Decides, per parent and lesson, whether a lesson may be opened, whether
//! it may be marked complete, and what the completion triggers:
//! - Access evaluation (payment, prerequisite chain, schedule locks)
//! - Daily/weekly pacing caps with transactional reservation
//! - Video watch-percentage and resume-position tracking
//! - Completion cascade: badges, certificates, course completion
//!
//! ## Architecture
//!
//! The module follows the same patterns as the rest of the server:
//! - Diesel ORM over Postgres for durable state
//! - Axum handlers for HTTP routes
//! - Serde for JSON serialization
//! - Typed denial enum so clients branch on kind, never on message text

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::shared::state::AppState;

pub mod access;
pub mod badges;
pub mod engine;
pub mod error;
pub mod pacing;
pub mod store;
#[cfg(test)]
pub mod testing;
pub mod types;
pub mod video;

use engine::ProgressionEngine;
use error::ProgressionError;
use store::DieselStore;
use types::{
    CompletionResponse, LessonView, SchedulingResponse, UnlockStatus, VideoPositionRequest,
    VideoProgressRequest, VideoProgressResponse,
};

/// Configure progression routes
pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/lessons/{id}", get(get_lesson))
        .route("/lessons/{id}/unlock-status", get(get_unlock_status))
        .route("/lessons/{id}/video-progress", post(post_video_progress))
        .route("/lessons/{id}/video-position", post(post_video_position))
        .route("/lessons/{id}/complete", post(post_complete))
        .route("/courses/{slug}/scheduling", get(get_scheduling))
}

fn engine(state: &AppState) -> ProgressionEngine<DieselStore> {
    ProgressionEngine::new(DieselStore::new(state.conn.clone()))
}

/// Fetch a lesson after running every access policy.
async fn get_lesson(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(lesson_id): Path<Uuid>,
) -> Result<Json<LessonView>, ProgressionError> {
    engine(&state).lesson_view(&auth, lesson_id).await.map(Json)
}

/// Non-blocking unlock check for UI countdowns.
async fn get_unlock_status(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<Uuid>,
) -> Json<UnlockStatus> {
    Json(engine(&state).unlock_status(lesson_id).await)
}

/// Report watched percentage; a no-op when not increasing.
async fn post_video_progress(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(lesson_id): Path<Uuid>,
    Json(req): Json<VideoProgressRequest>,
) -> Result<Json<VideoProgressResponse>, ProgressionError> {
    engine(&state)
        .record_video_progress(&auth, lesson_id, req)
        .await
        .map(Json)
}

/// Report resume position.
async fn post_video_position(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(lesson_id): Path<Uuid>,
    Json(req): Json<VideoPositionRequest>,
) -> Result<impl IntoResponse, ProgressionError> {
    engine(&state)
        .record_video_position(&auth, lesson_id, req.position)
        .await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "success": true })),
    ))
}

/// Attempt completion and run the completion cascade.
async fn post_complete(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(lesson_id): Path<Uuid>,
) -> Result<Json<CompletionResponse>, ProgressionError> {
    engine(&state).complete(&auth, lesson_id).await.map(Json)
}

/// Current pacing counters for the course scheduling view.
async fn get_scheduling(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<Json<SchedulingResponse>, ProgressionError> {
    engine(&state).scheduling(&auth, &slug).await.map(Json)
}
