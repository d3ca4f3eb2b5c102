//! Webhook plugin registry.
//!
//! Maps a webhook path segment to its [`PluginDescriptor`]. Descriptors are
//! created from configuration records and are immutable afterwards, apart
//! from the lazily compiled runtime slot the executor fills in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use mlua::{IntoLua, Lua, Value};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::OwnedMutexGuard;

use crate::error::{RecordError, RegistryError, ScriptError};
use crate::instance::PluginInstance;

/// A scalar value in a plugin's static environment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl IntoLua for EnvValue {
    fn into_lua(self, lua: &Lua) -> mlua::Result<Value> {
        match self {
            EnvValue::Bool(b) => Ok(Value::Boolean(b)),
            EnvValue::Integer(i) => Ok(Value::Integer(i)),
            EnvValue::Float(f) => Ok(Value::Number(f)),
            EnvValue::String(s) => s.into_lua(lua),
        }
    }
}

impl From<&str> for EnvValue {
    fn from(s: &str) -> Self {
        EnvValue::String(s.to_string())
    }
}

impl From<i64> for EnvValue {
    fn from(i: i64) -> Self {
        EnvValue::Integer(i)
    }
}

impl From<bool> for EnvValue {
    fn from(b: bool) -> Self {
        EnvValue::Bool(b)
    }
}

/// Read-only environment of a single plugin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginEnv(HashMap<String, EnvValue>);

impl PluginEnv {
    /// Wrap the `env` mapping of a webhook record.
    pub fn new(values: HashMap<String, EnvValue>) -> Self {
        Self(values)
    }

    /// Value for `name`; `ctx:env(name)` sees `nil` when this is `None`.
    pub fn get(&self, name: &str) -> Option<&EnvValue> {
        self.0.get(name)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the plugin has no environment at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<EnvValue>> FromIterator<(K, V)> for PluginEnv {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Where a plugin's Lua source comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Read from disk on first use.
    File(PathBuf),
    /// Source embedded in the configuration.
    Inline(String),
}

impl ScriptSource {
    /// Read the script text.
    pub fn load(&self) -> Result<String, ScriptError> {
        match self {
            ScriptSource::Inline(source) => Ok(source.clone()),
            ScriptSource::File(path) if path.as_os_str().is_empty() => {
                Err(ScriptError::MissingSource)
            }
            ScriptSource::File(path) => {
                std::fs::read_to_string(path).map_err(|source| ScriptError::SourceRead {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

/// Exclusive turn at running one plugin, obtained with
/// [`PluginDescriptor::admit`]. Released on drop.
#[derive(Debug)]
pub struct PluginPermit {
    _guard: OwnedMutexGuard<()>,
}

/// A registered webhook plugin.
pub struct PluginDescriptor {
    name: String,
    source: ScriptSource,
    env: Arc<PluginEnv>,
    /// Compiled runtime, filled on first successful compile. The lock also
    /// serializes invocations of this plugin.
    pub(crate) runtime: Mutex<Option<PluginInstance>>,
    /// Async queue in front of `runtime`, so waiting callers park as tasks.
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, source: ScriptSource, env: PluginEnv) -> Self {
        Self {
            name: name.into(),
            source,
            env: Arc::new(env),
            runtime: Mutex::new(None),
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// The webhook path segment this plugin serves.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    /// Static environment exposed through `ctx:env`.
    pub fn env(&self) -> &Arc<PluginEnv> {
        &self.env
    }

    /// Wait for this plugin's turn without occupying a worker thread.
    ///
    /// Hold the permit across the blocking [`PluginExecutor::execute`] call
    /// so only one caller per plugin ever waits on the runtime lock.
    ///
    /// [`PluginExecutor::execute`]: crate::PluginExecutor::execute
    pub async fn admit(&self) -> PluginPermit {
        PluginPermit {
            _guard: Arc::clone(&self.gate).lock_owned().await,
        }
    }

    /// Whether a compiled form is cached.
    pub fn is_compiled(&self) -> bool {
        self.runtime.lock().is_some()
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("env_keys", &self.env.len())
            .finish()
    }
}

/// One `webhooks` entry from the gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, EnvValue>,
}

/// Registry of webhook plugins keyed by name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: DashMap<String, Arc<PluginDescriptor>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from raw configuration records.
    ///
    /// Every record is validated on its own; rejected records are returned
    /// alongside the registry and do not prevent the others from loading.
    /// Relative `file` paths resolve against `base_dir` when given.
    pub fn from_records(
        records: &[serde_yaml::Value],
        base_dir: Option<&Path>,
    ) -> (Self, Vec<RecordError>) {
        let registry = Self::new();
        let mut errors = Vec::new();

        for (index, raw) in records.iter().enumerate() {
            let record: WebhookRecord = match serde_yaml::from_value(raw.clone()) {
                Ok(record) => record,
                Err(e) => {
                    errors.push(RecordError::Malformed {
                        index,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if let Err(e) = registry.register_record(index, record, base_dir) {
                errors.push(e);
            }
        }

        (registry, errors)
    }

    fn register_record(
        &self,
        index: usize,
        record: WebhookRecord,
        base_dir: Option<&Path>,
    ) -> Result<(), RecordError> {
        let name = match record.name {
            Some(name) if !name.is_empty() => name,
            _ => return Err(RecordError::MissingName { index }),
        };

        let source = match (record.file, record.script) {
            (Some(_), Some(_)) => return Err(RecordError::AmbiguousSource { name }),
            (None, Some(script)) => ScriptSource::Inline(script),
            (file, None) => ScriptSource::File(resolve_path(file.unwrap_or_default(), base_dir)),
        };

        self.register(name, source, PluginEnv::new(record.env));
        Ok(())
    }

    /// Add a plugin, replacing any earlier registration with the same name.
    pub fn register(&self, name: impl Into<String>, source: ScriptSource, env: PluginEnv) {
        let name = name.into();
        pushgate_telemetry::log_plugin_registered!(plugin = %name, env_keys = env.len());
        let descriptor = Arc::new(PluginDescriptor::new(name.clone(), source, env));
        self.plugins.insert(name, descriptor);
    }

    /// Exact, case-sensitive lookup.
    pub fn resolve(&self, name: &str) -> Result<Arc<PluginDescriptor>, RegistryError> {
        self.plugins
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

fn resolve_path(file: String, base_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(file);
    match base_dir {
        Some(base) if !path.as_os_str().is_empty() && path.is_relative() => base.join(path),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(yaml: &str) -> Vec<serde_yaml::Value> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn last_registration_wins() {
        let registry = PluginRegistry::new();
        registry.register("github", ScriptSource::Inline("return 200".into()), PluginEnv::default());
        registry.register("github", ScriptSource::Inline("return 201".into()), PluginEnv::default());

        let plugin = registry.resolve("github").unwrap();
        assert_eq!(plugin.source(), &ScriptSource::Inline("return 201".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolve_is_case_sensitive() {
        let registry = PluginRegistry::new();
        registry.register("github", ScriptSource::Inline(String::new()), PluginEnv::default());

        assert!(registry.resolve("github").is_ok());
        assert!(matches!(
            registry.resolve("GitHub"),
            Err(RegistryError::NotFound(name)) if name == "GitHub"
        ));
    }

    #[test]
    fn records_with_scalar_env() {
        let (registry, errors) = PluginRegistry::from_records(
            &records(
                r#"
- name: github
  file: hooks/github.lua
  env:
    x: "123"
    y: 456
    z: 1.5
    debug: true
"#,
            ),
            Some(Path::new("/etc/pushgate")),
        );
        assert!(errors.is_empty());

        let plugin = registry.resolve("github").unwrap();
        assert_eq!(
            plugin.source(),
            &ScriptSource::File(PathBuf::from("/etc/pushgate/hooks/github.lua"))
        );
        assert_eq!(plugin.env().get("x"), Some(&EnvValue::String("123".into())));
        assert_eq!(plugin.env().get("y"), Some(&EnvValue::Integer(456)));
        assert_eq!(plugin.env().get("z"), Some(&EnvValue::Float(1.5)));
        assert_eq!(plugin.env().get("debug"), Some(&EnvValue::Bool(true)));
        assert_eq!(plugin.env().get("missing"), None);
    }

    #[test]
    fn bad_records_are_skipped_individually() {
        let (registry, errors) = PluginRegistry::from_records(
            &records(
                r#"
- file: orphan.lua
- name: both
  file: a.lua
  script: "return 200"
- name: nested
  env:
    x: [1, 2]
- name: inline
  script: "return 202"
"#,
            ),
            None,
        );

        assert_eq!(registry.names(), vec!["inline".to_string()]);
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], RecordError::MissingName { index: 0 }));
        assert!(matches!(errors[1], RecordError::AmbiguousSource { .. }));
        assert!(matches!(errors[2], RecordError::Malformed { index: 2, .. }));
    }

    #[test]
    fn empty_or_missing_file_is_deferred() {
        let (registry, errors) = PluginRegistry::from_records(
            &records(
                r#"
- name: empty
  file: ""
- name: nofile
- name: gone
  file: /nonexistent/x.lua
"#,
            ),
            Some(Path::new("/etc/pushgate")),
        );
        assert!(errors.is_empty());
        assert_eq!(registry.len(), 3);

        let empty = registry.resolve("empty").unwrap();
        assert!(matches!(empty.source().load(), Err(ScriptError::MissingSource)));
        let nofile = registry.resolve("nofile").unwrap();
        assert!(matches!(nofile.source().load(), Err(ScriptError::MissingSource)));
        let gone = registry.resolve("gone").unwrap();
        assert!(matches!(gone.source().load(), Err(ScriptError::SourceRead { .. })));
    }

    #[tokio::test]
    async fn admission_is_exclusive_per_plugin() {
        use std::time::Duration;

        let slow = PluginDescriptor::new("slow", ScriptSource::Inline(String::new()), PluginEnv::default());
        let fast = PluginDescriptor::new("fast", ScriptSource::Inline(String::new()), PluginEnv::default());

        let held = slow.admit().await;
        assert!(tokio::time::timeout(Duration::from_millis(20), slow.admit())
            .await
            .is_err());

        // Another plugin is admitted while the first is busy.
        let _fast = fast.admit().await;

        drop(held);
        let _again = tokio::time::timeout(Duration::from_secs(1), slow.admit())
            .await
            .unwrap();
    }

    #[test]
    fn file_source_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hook.lua");
        std::fs::write(&path, "return 204").unwrap();

        let source = ScriptSource::File(path);
        assert_eq!(source.load().unwrap(), "return 204");
    }
}
