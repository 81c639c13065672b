//! API routes for the docsift server

pub mod events;
pub mod queue;
pub mod results;
pub mod reviews;
pub mod run;

use axum::{
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Queue management
        .route(
            "/queue",
            get(queue::list_queue)
                .post(queue::add_files)
                .delete(queue::remove_files),
        )
        .route("/queue/scan", post(queue::scan_directories))
        .route("/queue/clear", post(queue::clear_queue))
        .route("/queue/reorder", post(queue::reorder_item))
        .route("/queue/move-up", post(queue::move_up))
        .route("/queue/move-down", post(queue::move_down))
        .route("/queue/priority", post(queue::set_priority))
        // Run control
        .route("/run", get(run::run_status))
        .route("/run/:action", post(run::control))
        // Review queue
        .route("/reviews", get(reviews::list_reviews))
        .route("/reviews/approve", post(reviews::approve))
        .route("/reviews/reject", post(reviews::reject))
        // Stored results
        .route("/stats", get(results::stats))
        .route("/search", get(results::search))
        // Live progress
        .route("/events", get(events::stream_events))
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "docsift",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "File analysis pipeline with a pausable priority queue",
        "endpoints": {
            "GET /api/queue": "List queue items and counts",
            "POST /api/queue": "Enqueue files",
            "DELETE /api/queue": "Remove files from the queue",
            "POST /api/queue/scan": "Discover and enqueue files under directories",
            "POST /api/queue/clear": "Clear the queue, optionally by status",
            "POST /api/queue/reorder": "Move an item to an index",
            "POST /api/queue/move-up": "Move an item one place up",
            "POST /api/queue/move-down": "Move an item one place down",
            "POST /api/queue/priority": "Change priority of several items",
            "GET /api/run": "Run state, counters and allowed actions",
            "POST /api/run/:action": "start | pause | resume | stop | retry",
            "GET /api/reviews": "Outcomes awaiting review",
            "POST /api/reviews/approve": "Approve an outcome, optionally with edits",
            "POST /api/reviews/reject": "Discard an outcome",
            "GET /api/stats": "Stored result counts",
            "GET /api/search?q=": "Search stored tags, descriptions and paths",
            "GET /api/events": "Server-sent processing and queue events"
        }
    }))
}
