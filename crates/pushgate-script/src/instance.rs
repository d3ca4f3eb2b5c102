//! A compiled plugin bound to its own Lua state.

use mlua::{Function, Lua, MultiValue, Table, Value};

use crate::bridge::ContextBridge;
use crate::error::ScriptError;
use crate::result::ExecutionResult;

/// Name of the global the bridge is injected under.
pub const CONTEXT_GLOBAL: &str = "ctx";

/// A plugin script compiled into a dedicated Lua state.
///
/// Not safe for concurrent entry; the owning descriptor's lock ensures one
/// invocation at a time.
pub struct PluginInstance {
    name: String,
    lua: Lua,
    chunk: Function,
    sandbox: Table,
}

impl PluginInstance {
    pub(crate) fn new(name: String, lua: Lua, chunk: Function, sandbox: Table) -> Self {
        Self {
            name,
            lua,
            chunk,
            sandbox,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the script's top level once with `ctx` bound to `bridge`.
    pub fn invoke(&mut self, bridge: ContextBridge) -> Result<ExecutionResult, ScriptError> {
        let env = self
            .call_environment(bridge)
            .map_err(|e| ScriptError::Runtime(e.to_string()))?;

        self.chunk
            .set_environment(env)
            .map_err(|e| ScriptError::Runtime(e.to_string()))?;

        let values: MultiValue = self
            .chunk
            .call(())
            .map_err(|e| ScriptError::Runtime(e.to_string()))?;

        let values: Vec<Value> = values.into_iter().collect();
        Ok(ExecutionResult::from_returns(&values))
    }

    /// Fresh globals for one call: `ctx` plus read-through to the sandbox.
    /// Assignments land in this table and vanish with it.
    fn call_environment(&self, bridge: ContextBridge) -> mlua::Result<Table> {
        let env = self.lua.create_table()?;
        env.set(CONTEXT_GLOBAL, bridge)?;

        let meta = self.lua.create_table()?;
        meta.set("__index", self.sandbox.clone())?;
        meta.set("__metatable", false)?;
        env.set_metatable(Some(meta));

        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::engine::ScriptEngine;
    use crate::registry::PluginEnv;
    use bytes::Bytes;
    use http::HeaderMap;
    use std::sync::Arc;

    fn compile(source: &str) -> PluginInstance {
        ScriptEngine::new().compile("test", source).unwrap()
    }

    fn live(url: &str) -> ContextBridge {
        ContextBridge::bind(
            RequestContext::new(url, HeaderMap::new(), Bytes::new()),
            Arc::new(PluginEnv::default()),
        )
    }

    #[test]
    fn invoke_collects_returns() {
        let mut instance = compile("return 201, 'created'");
        let result = instance.invoke(live("/")).unwrap();
        assert_eq!(result.status_code, 201);
        assert_eq!(result.body, "created");
    }

    #[test]
    fn undefined_function_is_runtime_error() {
        let mut instance = compile("a()");
        let result = instance.invoke(live("/"));
        assert!(matches!(result, Err(ScriptError::Runtime(_))));
    }

    #[test]
    fn ambient_globals_are_hidden() {
        let mut instance = compile(
            r#"
            assert(io == nil and os == nil and require == nil)
            assert(load == nil and dofile == nil and print == nil)
            assert(string.format("%d", 7) == "7")
            return 200
            "#,
        );
        assert_eq!(instance.invoke(live("/")).unwrap().status_code, 200);
    }

    #[test]
    fn globals_do_not_survive_between_calls() {
        let mut instance = compile(
            r#"
            local seen = counter
            counter = 1
            if seen == nil then return 200 end
            return 500
            "#,
        );
        assert_eq!(instance.invoke(live("/")).unwrap().status_code, 200);
        assert_eq!(instance.invoke(live("/")).unwrap().status_code, 200);
    }

    #[test]
    fn environment_metatable_is_locked() {
        let mut instance = compile("return 200, tostring(getmetatable(_ENV))");
        assert_eq!(instance.invoke(live("/")).unwrap().body, "false");
    }

    #[test]
    fn each_call_sees_its_own_request() {
        let mut instance = compile("return 200, ctx:request():url()");
        assert_eq!(instance.invoke(live("/a")).unwrap().body, "/a");
        assert_eq!(instance.invoke(live("/b")).unwrap().body, "/b");
    }
}
