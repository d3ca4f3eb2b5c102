//! Sandboxed Lua webhook plugin runtime for the pushgate gateway.
//!
//! A webhook plugin is a Lua chunk bound to `POST /v1/webhook/{name}`. The
//! chunk runs once per request with a single global, `ctx`, and returns up
//! to three values: status code, content type and body.
//!
//! ```lua
//! local req = ctx:request()
//! if req:query("secret") ~= ctx:env("secret") then
//!     return 401
//! end
//! return 200, "application/json", req:body()
//! ```

mod bridge;
mod context;
mod engine;
mod error;
mod executor;
mod instance;
mod registry;
mod result;

pub use bridge::{ContextBridge, RequestBridge};
pub use context::RequestContext;
pub use engine::{ScriptEngine, SANDBOX_GLOBALS};
pub use error::{RecordError, RegistryError, ScriptError};
pub use executor::PluginExecutor;
pub use instance::{PluginInstance, CONTEXT_GLOBAL};
pub use registry::{
    EnvValue, PluginDescriptor, PluginEnv, PluginPermit, PluginRegistry, ScriptSource,
    WebhookRecord,
};
pub use result::{ExecutionResult, DEFAULT_CONTENT_TYPE, DEFAULT_STATUS};
