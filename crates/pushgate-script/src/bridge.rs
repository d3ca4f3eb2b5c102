//! The `ctx` capability object handed to webhook scripts.
//!
//! Scripts only ever see two userdata types:
//!
//! ```text
//! ctx:request()        -> request handle
//! ctx:env(name)        -> plugin env value or nil
//!
//! req:token()          -> bearer token or nil
//! req:body()           -> raw body (string, possibly empty)
//! req:header(name)     -> header value or nil
//! req:url()            -> path and query as received
//! req:query(name)      -> first value of a query parameter or nil
//! ```
//!
//! Both handles share one binding to the live call. The executor detaches
//! it when the invocation returns, after which every method raises an error.

use std::sync::Arc;

use mlua::{UserData, UserDataMethods};
use parking_lot::Mutex;

use crate::context::RequestContext;
use crate::registry::PluginEnv;

const DETACHED: &str = "ctx is not bound to a live request";

struct LiveCall {
    request: RequestContext,
    env: Arc<PluginEnv>,
}

#[derive(Clone, Default)]
struct Binding(Arc<Mutex<Option<Arc<LiveCall>>>>);

impl Binding {
    fn live(&self) -> mlua::Result<Arc<LiveCall>> {
        self.0
            .lock()
            .clone()
            .ok_or_else(|| mlua::Error::RuntimeError(DETACHED.to_string()))
    }
}

/// Script-facing handle over one request and one plugin's env.
#[derive(Clone, Default)]
pub struct ContextBridge {
    binding: Binding,
}

impl ContextBridge {
    /// Bind a fresh bridge to a request and the invoking plugin's env.
    pub fn bind(request: RequestContext, env: Arc<PluginEnv>) -> Self {
        let call = LiveCall { request, env };
        Self {
            binding: Binding(Arc::new(Mutex::new(Some(Arc::new(call))))),
        }
    }

    /// A bridge with no live call behind it.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Drop the request. Handles the script kept around stop working.
    pub fn detach(&self) {
        self.binding.0.lock().take();
    }

    pub fn is_live(&self) -> bool {
        self.binding.0.lock().is_some()
    }
}

impl UserData for ContextBridge {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("request", |_, this, ()| {
            this.binding.live()?;
            Ok(RequestBridge {
                binding: this.binding.clone(),
            })
        });

        methods.add_method("env", |_, this, name: Option<String>| {
            let call = this.binding.live()?;
            Ok(name.and_then(|name| call.env.get(&name).cloned()))
        });
    }
}

/// Script-facing view of the triggering request.
pub struct RequestBridge {
    binding: Binding,
}

impl UserData for RequestBridge {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("token", |_, this, ()| {
            let call = this.binding.live()?;
            Ok(call.request.bearer_token().map(str::to_string))
        });

        methods.add_method("body", |lua, this, ()| {
            let call = this.binding.live()?;
            lua.create_string(call.request.body())
        });

        methods.add_method("header", |_, this, name: Option<String>| {
            let call = this.binding.live()?;
            Ok(name.and_then(|name| call.request.header(&name).map(str::to_string)))
        });

        methods.add_method("url", |_, this, ()| {
            let call = this.binding.live()?;
            Ok(call.request.url().to_string())
        });

        methods.add_method("query", |_, this, name: Option<String>| {
            let call = this.binding.live()?;
            Ok(name.and_then(|name| call.request.query(&name).map(str::to_string)))
        });
    }
}
