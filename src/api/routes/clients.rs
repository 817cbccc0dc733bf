//! Client Routes
//!
//! - GET /api/v1/clients - Currently connected clients

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::ClientsResponse;
use crate::api::state::AppState;

/// GET /api/v1/clients
pub async fn list_clients(State(state): State<Arc<AppState>>) -> Json<ClientsResponse> {
    let clients = state.registry.clients().await;

    Json(ClientsResponse {
        count: clients.len(),
        max_clients: state.registry.max_clients(),
        clients,
    })
}
