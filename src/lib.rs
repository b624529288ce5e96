pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {services::order_actions::OrderActionService, std::sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub actions: Arc<OrderActionService>,
    pub admin_token: Arc<str>,
}
