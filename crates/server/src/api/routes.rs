use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use transcoder_core::PublishMode;

use super::{handlers, jobs, media, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and stats
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/stats", get(handlers::get_stats))
        // Jobs
        .route(
            "/jobs",
            post(jobs::create_job)
                .get(jobs::list_jobs)
                .layer(DefaultBodyLimit::disable()),
        )
        .route("/jobs/{id}", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/{id}/complete", post(jobs::complete_job))
        .route("/jobs/{id}/adaptive.m3u8", get(jobs::get_playlist))
        // Media tool
        .route("/media/{kind}", get(media::get_listing));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .with_state(Arc::clone(&state));

    // Local mode serves results straight out of the working directory
    if state.config().storage.mode == PublishMode::Local {
        let working_dir = state.working_dir().to_path_buf();
        router = router
            .nest_service("/videos", ServeDir::new(&working_dir))
            .nest_service("/thumbs", ServeDir::new(&working_dir));
    }

    router
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
