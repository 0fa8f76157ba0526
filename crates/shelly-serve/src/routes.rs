use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers as h, state::AppState};

pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(h::healthz))
        .route("/discover", post(h::discover))
        .route("/devices", get(h::list_devices))
        .route("/devices/{id}", get(h::get_device).delete(h::delete_device))
        .route("/devices/{id}/supported", get(h::supported))
        .route(
            "/devices/{id}/parameters/{name}",
            get(h::get_parameter).post(h::set_parameter),
        )
        .route("/groups", get(h::list_groups).post(h::create_group))
        .route("/groups/{name}", get(h::get_group).delete(h::delete_group))
        .route("/groups/{name}/operate", post(h::operate_group))
        .route("/capabilities", get(h::list_capabilities))
        .route("/capabilities/{device_type}", get(h::get_capability))
        .with_state(state)
}
