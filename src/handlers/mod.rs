pub mod auth_handlers;
pub mod health_handlers;
pub mod history_handlers;
pub mod upload_handlers;
