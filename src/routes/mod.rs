pub mod detect;

use axum::Router;
use crate::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new().merge(detect::router())
}
