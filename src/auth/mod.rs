use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod session;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::otp_routes())
        .merge(handlers::session_routes())
}
