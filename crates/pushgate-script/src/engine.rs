//! Sandboxed Lua engine setup and compilation.
//!
//! Every plugin gets its own Lua state with only the pure standard
//! libraries loaded. Scripts never see the state's real globals: each call
//! runs against a fresh environment table backed by a fixed allow-list.

use mlua::{ChunkMode, Lua, LuaOptions, StdLib, Table, Value};

use crate::error::ScriptError;
use crate::instance::PluginInstance;

/// Globals a script may read. Everything else (io, os, package, require,
/// load, dofile, print, debug, collectgarbage) is absent.
pub const SANDBOX_GLOBALS: &[&str] = &[
    "_VERSION",
    "assert",
    "error",
    "getmetatable",
    "ipairs",
    "next",
    "pairs",
    "pcall",
    "rawequal",
    "rawget",
    "rawlen",
    "rawset",
    "select",
    "setmetatable",
    "tonumber",
    "tostring",
    "type",
    "xpcall",
    "math",
    "string",
    "table",
    "utf8",
];

/// Creates sandboxed Lua states and compiles plugin scripts into them.
#[derive(Debug, Clone)]
pub struct ScriptEngine {
    libs: StdLib,
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self {
            libs: StdLib::STRING | StdLib::TABLE | StdLib::MATH | StdLib::UTF8,
        }
    }

    /// Compile a plugin script into a ready-to-invoke instance.
    ///
    /// Only parses; no top-level code runs. Error messages reference the
    /// plugin name, never the script's location on disk.
    pub fn compile(&self, name: &str, source: &str) -> Result<PluginInstance, ScriptError> {
        let lua = Lua::new_with(self.libs, LuaOptions::default())
            .map_err(|e| ScriptError::RuntimeCreation(e.to_string()))?;

        let sandbox = sandbox_table(&lua).map_err(|e| ScriptError::RuntimeCreation(e.to_string()))?;

        let chunk = lua
            .load(source)
            .set_name(format!("={name}"))
            .set_mode(ChunkMode::Text)
            .into_function()
            .map_err(|e| ScriptError::Compilation(compile_message(&e)))?;

        Ok(PluginInstance::new(name.to_string(), lua, chunk, sandbox))
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn sandbox_table(lua: &Lua) -> mlua::Result<Table> {
    let globals = lua.globals();
    let sandbox = lua.create_table()?;
    for name in SANDBOX_GLOBALS {
        let value: Value = globals.get(*name)?;
        if !value.is_nil() {
            sandbox.set(*name, value)?;
        }
    }
    Ok(sandbox)
}

fn compile_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
