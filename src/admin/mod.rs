//! Admin front door
//!
//! HTTP surface for operators:
//! - `GET /health`, `GET /destinations`, `GET /destinations/:destination`,
//!   `GET /monitors`
//! - `POST /destinations/:destination/{start,stop,reload,release,demand}`

mod routes;
mod server;

pub use routes::{admin_routes, ActionResponse, DestinationsResponse, ErrorResponse, HealthResponse};
pub use server::AdminServer;
