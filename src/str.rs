//! String helpers.

use std::sync::Arc;

/// `ArcStr` is a string that can be cloned cheaply.
///
/// Feature and treatment names are shared between rule snapshots, accessors and callers, so they
/// are reference-counted instead of copied on every resolution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArcStr(Arc<str>);

impl ArcStr {
    /// Returns `true` if both values point to the same allocation.
    pub fn ptr_eq(this: &ArcStr, other: &ArcStr) -> bool {
        Arc::ptr_eq(&this.0, &other.0)
    }
}

impl std::fmt::Display for ArcStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<T: Into<Arc<str>>> From<T> for ArcStr {
    fn from(value: T) -> ArcStr {
        ArcStr(value.into())
    }
}

impl AsRef<str> for ArcStr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for ArcStr {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl std::borrow::Borrow<str> for ArcStr {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ArcStr {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for ArcStr {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl log::kv::ToValue for ArcStr {
    fn to_value(&self) -> log::kv::Value {
        log::kv::Value::from_display(self)
    }
}
