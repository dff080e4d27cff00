use crate::{config::Config, websocket::SessionRegistry};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub registry: SessionRegistry,
    pub config: Arc<Config>,
}
