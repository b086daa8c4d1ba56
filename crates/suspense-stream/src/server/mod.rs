pub mod config;
pub mod core;
pub mod handlers;
pub mod rendering;
pub mod request_middleware;
pub mod routing;
pub mod types;

pub use core::Server;
pub use types::*;
