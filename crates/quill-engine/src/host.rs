//! Host namespace registry: dotted names → native values and functions.
//!
//! The registration table is explicit, owned state with a clear lifecycle
//! — a struct the engine owns and passes alongside the evaluator, never a
//! process global. Scripts see each root name through the accessor
//! protocol: namespaces become member-resolvable objects, values and
//! functions come back as themselves.

use quill_eval::{HostLookup, HostObject, NativeFn, RuntimeError, Value};
use std::collections::BTreeMap;
use std::rc::Rc;
use thiserror::Error;

/// Why a registration was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// The full path is already taken (by a value or a namespace).
    #[error("'{0}' is already registered")]
    AlreadyRegistered(String),
    /// An intermediate segment is a value, so nothing can be registered
    /// under it.
    #[error("'{0}' is registered as a value, not a namespace")]
    NotANamespace(String),
    /// Empty path or empty segment.
    #[error("invalid registration path '{0}'")]
    InvalidPath(String),
}

enum HostEntry {
    Namespace(BTreeMap<String, HostEntry>),
    Value(Value),
}

/// The host registration table.
#[derive(Default)]
pub struct HostRegistry {
    root: BTreeMap<String, HostEntry>,
}

impl HostRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value under a dotted path, creating intermediate
    /// namespaces as needed. Registering over any existing entry, or under
    /// an existing value, is rejected.
    pub fn register(&mut self, path: &str, value: Value) -> Result<(), HostError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(HostError::InvalidPath(path.to_string()));
        }
        let (last, prefix) = segments.split_last().expect("split checked non-empty");

        let mut map = &mut self.root;
        let mut walked = String::new();
        for seg in prefix {
            if !walked.is_empty() {
                walked.push('.');
            }
            walked.push_str(seg);
            map = match map
                .entry(seg.to_string())
                .or_insert_with(|| HostEntry::Namespace(BTreeMap::new()))
            {
                HostEntry::Namespace(inner) => inner,
                HostEntry::Value(_) => return Err(HostError::NotANamespace(walked)),
            };
        }
        if map.contains_key(*last) {
            return Err(HostError::AlreadyRegistered(path.to_string()));
        }
        map.insert(last.to_string(), HostEntry::Value(value));
        Ok(())
    }

    /// Register a native function; its display name is the last path
    /// segment.
    pub fn register_fn(
        &mut self,
        path: &str,
        func: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Result<(), HostError> {
        let name = path.rsplit('.').next().unwrap_or(path).to_string();
        self.register(path, Value::Native(Rc::new(NativeFn::new(name, func))))
    }

    /// Is a root-level name registered? Used by the pre-execution
    /// diagnostics collector.
    pub fn has_root(&self, name: &str) -> bool {
        self.root.contains_key(name)
    }

    /// Take an immutable snapshot for a session. Later registry mutations
    /// do not affect sessions already running.
    pub fn snapshot(&self) -> HostView {
        HostView {
            root: Rc::new(snapshot_map(&self.root)),
        }
    }
}

fn snapshot_map(map: &BTreeMap<String, HostEntry>) -> BTreeMap<String, Value> {
    map.iter()
        .map(|(name, entry)| {
            let value = match entry {
                HostEntry::Value(v) => v.clone(),
                HostEntry::Namespace(inner) => Value::Object(Rc::new(NamespaceObject {
                    name: name.clone(),
                    entries: snapshot_map(inner),
                })),
            };
            (name.clone(), value)
        })
        .collect()
}

/// Root-name resolution for one session, frozen at execution start.
pub struct HostView {
    root: Rc<BTreeMap<String, Value>>,
}

impl HostLookup for HostView {
    fn global(&self, name: &str) -> Option<Value> {
        self.root.get(name).cloned()
    }
}

/// A namespace surfaced through the accessor protocol.
struct NamespaceObject {
    name: String,
    entries: BTreeMap<String, Value>,
}

impl HostObject for NamespaceObject {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn member(&self, name: &str) -> Option<Value> {
        self.entries.get(name).cloned()
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
