pub mod backends;
pub mod batches;
pub mod capabilities;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod settings;
pub mod ws;

pub use routes::create_router;
