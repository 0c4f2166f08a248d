pub mod admin;
pub mod dto;
pub mod handlers;
pub mod params;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_api_router;
