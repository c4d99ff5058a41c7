//! The accessor resolution protocol.
//!
//! Member/index/call chains (`a.b`, `a[i]`, `a(args)`) are walked left to
//! right and handed to the runtime value at each step. Host values take
//! part by implementing [`HostObject`]; root identifiers with no lexical
//! binding resolve through [`HostLookup`]. How a host binds properties or
//! selects overloads is its own business — only the resolve contract is
//! fixed here, and every "not found" becomes a catchable runtime error in
//! the evaluator.

use crate::error::RuntimeError;
use crate::value::Value;

/// A host value the evaluator can reach into.
///
/// All methods default to "not supported". A member may be returned as a
/// [`Value::Cell`] to make it assignable from scripts.
pub trait HostObject {
    /// Short type name, for error messages and display.
    fn type_name(&self) -> &str {
        "object"
    }

    /// Resolve a named member: `obj.name`.
    fn member(&self, name: &str) -> Option<Value>;

    /// Resolve an index access: `obj[key]`.
    fn index(&self, key: &Value) -> Option<Value> {
        let _ = key;
        None
    }

    /// Invoke the object itself: `obj(args…)`. `None` means the object is
    /// not callable.
    fn call(&self, args: &[Value]) -> Option<Result<Value, RuntimeError>> {
        let _ = args;
        None
    }

    /// Items for `for (x in obj)`. `None` means not enumerable.
    fn enumerate(&self) -> Option<Vec<Value>> {
        None
    }
}

/// Root-name resolution against the host namespace.
pub trait HostLookup {
    /// Resolve a global name the script has no lexical binding for.
    fn global(&self, name: &str) -> Option<Value>;
}

/// A host with no registrations.
pub struct EmptyHost;

impl HostLookup for EmptyHost {
    fn global(&self, _name: &str) -> Option<Value> {
        None
    }
}
