pub mod app_handler;
pub mod static_handlers;
