use crate::value::Value;

use std::collections::BTreeMap;
use std::rc::Rc;

/// The mutable state programs reach through `globalStore`. Clones share
/// structure until one of them is written to, so snapshotting a branch point
/// is O(1) and no two snapshots ever observe each other's writes.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Store(Rc<BTreeMap<String, Value>>);

impl Store {
  pub fn get(&self, key: &str) -> Value {
    self.0.get(key).cloned().unwrap_or(Value::Undefined)
  }

  pub fn set(&mut self, key: impl Into<String>, value: Value) {
    Rc::make_mut(&mut self.0).insert(key.into(), value);
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// The store as a (shared, read-only) object value.
  pub fn to_value(&self) -> Value {
    Value::Object(self.0.clone())
  }
}
