//! pushgate gateway library.
//!
//! Serves `POST /v1/webhook/{name}` by running the named Lua plugin, plus
//! the user binding routes and the reserved `/__pushgate/*` endpoints.

pub mod accounts;
pub mod config;
pub mod gateway;
pub mod problem;

pub use accounts::{AccountError, AccountReply, AccountService, Accounts, SignatureVerifier, User};
pub use config::{ConfigError, GatewayConfig};
pub use gateway::Gateway;
pub use problem::ProblemDetails;
