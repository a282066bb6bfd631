#![doc = "The `taskboard` library crate."]
#![doc = ""]
#![doc = "Server side: domain models, storage backends, token and session authentication,"]
#![doc = "routing and error handling for the taskboard HTTP API. Client side: the `client`"]
#![doc = "module, a request gateway that refreshes bearer tokens transparently."]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod security;
pub mod state;
pub mod store;
pub mod suggestions;

pub use crate::config::Config;
pub use crate::error::AppError;
pub use crate::state::AppState;
