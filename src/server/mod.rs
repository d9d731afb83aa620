//! HTTP server: Actix-web wiring over the core pipeline.

pub mod middleware;
pub mod routes;
mod server;
mod state;

pub use server::{run_server, run_server_with_config_file, GatewayServer};
pub use state::AppState;
