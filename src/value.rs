use crate::dist::Distribution;
use crate::error::Error;
use crate::lang::{Func, Var};
use crate::runtime::Runtime;
use crate::trampoline::Step;

use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub type PrimFn = fn(&[Value]) -> Result<Value>;
pub type CpsFn = dyn Fn(&mut Runtime, Vec<Value>) -> Result<Step>;
pub type ContFn = dyn Fn(&mut Runtime, Value) -> Result<Step>;

/// Functions implemented in Rust.
#[derive(Clone)]
pub enum Native {
  /// A direct function of its arguments. Called as a method or as a
  /// primitive it returns its result; called in CPS position it receives
  /// `(k, address, ...)` and passes the result on to `k`.
  Prim(&'static str, PrimFn),
  /// Receives `(k, address, ...)` and decides how to continue.
  Cps(&'static str, Rc<CpsFn>),
  /// A continuation created by the runtime.
  Cont(&'static str, Rc<ContFn>),
}

impl Native {
  pub fn name(&self) -> &'static str {
    match self {
      Native::Prim(name, _) | Native::Cps(name, _) | Native::Cont(name, _) => name,
    }
  }

  fn ptr(&self) -> *const () {
    match self {
      Native::Prim(_, f) => *f as *const (),
      Native::Cps(_, f) => Rc::as_ptr(f) as *const (),
      Native::Cont(_, f) => Rc::as_ptr(f) as *const (),
    }
  }
}

pub struct Closure {
  pub func: Rc<Func>,
  pub env: Rc<Env>,
}

#[derive(Clone)]
pub enum Value {
  Undefined,
  Null,
  Bool(bool),
  Num(f64),
  Str(Rc<str>),
  Array(Rc<Vec<Value>>),
  Object(Rc<BTreeMap<String, Value>>),
  Func(Rc<Closure>),
  Native(Native),
  Dist(Rc<dyn Distribution>),
}

impl Value {
  pub fn str(s: impl AsRef<str>) -> Value {
    Value::Str(Rc::from(s.as_ref()))
  }

  pub fn array(vs: Vec<Value>) -> Value {
    Value::Array(Rc::new(vs))
  }

  pub fn object(map: BTreeMap<String, Value>) -> Value {
    Value::Object(Rc::new(map))
  }

  pub fn prim(name: &'static str, f: PrimFn) -> Value {
    Value::Native(Native::Prim(name, f))
  }

  pub fn cps(name: &'static str, f: impl Fn(&mut Runtime, Vec<Value>) -> Result<Step> + 'static) -> Value {
    Value::Native(Native::Cps(name, Rc::new(f)))
  }

  pub fn cont(name: &'static str, f: impl Fn(&mut Runtime, Value) -> Result<Step> + 'static) -> Value {
    Value::Native(Native::Cont(name, Rc::new(f)))
  }

  pub fn dist(d: impl Distribution + 'static) -> Value {
    Value::Dist(Rc::new(d))
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Undefined => "undefined",
      Value::Null => "null",
      Value::Bool(_) => "boolean",
      Value::Num(_) => "number",
      Value::Str(_) => "string",
      Value::Array(_) => "array",
      Value::Object(_) => "object",
      Value::Func(_) | Value::Native(_) => "function",
      Value::Dist(_) => "distribution",
    }
  }

  pub fn truthy(&self) -> bool {
    match self {
      Value::Undefined | Value::Null => false,
      Value::Bool(b) => *b,
      Value::Num(n) => *n != 0. && !n.is_nan(),
      Value::Str(s) => !s.is_empty(),
      _ => true,
    }
  }

  pub fn is_callable(&self) -> bool {
    matches!(self, Value::Func(_) | Value::Native(_))
  }

  pub fn as_num(&self) -> Result<f64> {
    match self {
      Value::Num(n) => Ok(*n),
      Value::Bool(b) => Ok(if *b { 1. } else { 0. }),
      Value::Null => Ok(0.),
      Value::Undefined => Ok(f64::NAN),
      v => Err(Error::ty(format!("expected a number, got {} {}", v.type_name(), v)).into()),
    }
  }

  pub fn as_str(&self) -> Result<Rc<str>> {
    match self {
      Value::Str(s) => Ok(s.clone()),
      v => Err(Error::ty(format!("expected a string, got {} {}", v.type_name(), v)).into()),
    }
  }

  pub fn as_array(&self) -> Result<Rc<Vec<Value>>> {
    match self {
      Value::Array(vs) => Ok(vs.clone()),
      v => Err(Error::ty(format!("expected an array, got {} {}", v.type_name(), v)).into()),
    }
  }

  pub fn as_dist(&self) -> Result<Rc<dyn Distribution>> {
    match self {
      Value::Dist(d) => Ok(d.clone()),
      v => Err(Error::ty(format!("expected a distribution, got {} {}", v.type_name(), v)).into()),
    }
  }

  /// Looks up a property of an object value; missing keys read as undefined.
  pub fn get(&self, key: &str) -> Value {
    match self {
      Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Undefined),
      _ => Value::Undefined,
    }
  }

  /// The string a value stands for when used as a property name.
  pub fn key(&self) -> String {
    match self {
      Value::Str(s) => s.to_string(),
      v => v.to_string(),
    }
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    use Value::*;
    match (self, other) {
      (Undefined, Undefined) | (Null, Null) => true,
      (Bool(a), Bool(b)) => a == b,
      (Num(a), Num(b)) => a == b,
      (Str(a), Str(b)) => a == b,
      (Array(a), Array(b)) => a == b,
      (Object(a), Object(b)) => a == b,
      (Func(a), Func(b)) => Rc::ptr_eq(a, b),
      (Native(a), Native(b)) => a.ptr() == b.ptr(),
      (Dist(a), Dist(b)) => Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const (),
      _ => false,
    }
  }
}

fn fmt_num(n: f64, f: &mut fmt::Formatter) -> fmt::Result {
  if n.is_nan() {
    write!(f, "NaN")
  } else if n.is_infinite() {
    write!(f, "{}Infinity", if n < 0. { "-" } else { "" })
  } else if n == 0. {
    write!(f, "0")
  } else {
    write!(f, "{}", n)
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Value::Undefined => write!(f, "undefined"),
      Value::Null => write!(f, "null"),
      Value::Bool(b) => write!(f, "{}", b),
      Value::Num(n) => fmt_num(*n, f),
      Value::Str(s) => write!(f, "{:?}", s),
      Value::Array(vs) => {
        write!(f, "[")?;
        for (i, v) in vs.iter().enumerate() {
          if i > 0 {
            write!(f, ",")?;
          }
          write!(f, "{}", v)?;
        }
        write!(f, "]")
      }
      Value::Object(map) => {
        write!(f, "{{")?;
        for (i, (k, v)) in map.iter().enumerate() {
          if i > 0 {
            write!(f, ",")?;
          }
          write!(f, "{:?}:{}", k, v)?;
        }
        write!(f, "}}")
      }
      Value::Func(c) => match c.func.name {
        Some(name) => write!(f, "[function {}]", name),
        None => write!(f, "[function]"),
      },
      Value::Native(n) => write!(f, "[native {}]", n.name()),
      Value::Dist(d) => write!(f, "[distribution {}]", d.name()),
    }
  }
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Value::Dist(d) => write!(f, "{:?}", d),
      v => write!(f, "{}", v),
    }
  }
}

/// An immutable scope frame. Extending never mutates the parent, so saved
/// continuations keep seeing exactly the bindings they closed over.
#[derive(Default)]
pub struct Env {
  frame: Vec<(Var, Value)>,
  parent: Option<Rc<Env>>,
}

impl Env {
  pub fn root(frame: Vec<(Var, Value)>) -> Rc<Env> {
    Rc::new(Env { frame, parent: None })
  }

  pub fn extend(parent: &Rc<Env>, frame: Vec<(Var, Value)>) -> Rc<Env> {
    Rc::new(Env {
      frame,
      parent: Some(parent.clone()),
    })
  }

  pub fn lookup(&self, x: Var) -> Option<&Value> {
    let mut env = self;
    loop {
      if let Some((_, v)) = env.frame.iter().rev().find(|(y, _)| *y == x) {
        return Some(v);
      }
      env = env.parent.as_deref()?;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lang::v;
  use maplit::btreemap;

  #[test]
  fn display_is_json_like() {
    let v = Value::array(vec![
      Value::Num(3.),
      Value::Num(0.5),
      Value::str("a"),
      Value::Bool(true),
      Value::Undefined,
      Value::Num(f64::NEG_INFINITY),
    ]);
    assert_eq!(v.to_string(), r#"[3,0.5,"a",true,undefined,-Infinity]"#);
    let o = Value::object(btreemap! { "b".to_string() => Value::Null, "a".to_string() => Value::Num(-0.) });
    assert_eq!(o.to_string(), r#"{"a":0,"b":null}"#);
  }

  #[test]
  fn equality_is_structural_for_data() {
    let a = Value::array(vec![Value::Num(1.), Value::str("x")]);
    let b = Value::array(vec![Value::Num(1.), Value::str("x")]);
    assert_eq!(a, b);
    assert_ne!(a, Value::array(vec![Value::Num(1.)]));
    assert_ne!(Value::Num(0.), Value::Bool(false));

    let k = Value::cont("k", |_, v| Ok(Step::Done(v)));
    assert_eq!(k, k.clone());
    assert_ne!(k, Value::cont("k", |_, v| Ok(Step::Done(v))));
  }

  #[test]
  fn truthiness() {
    assert!(!Value::Num(0.).truthy());
    assert!(!Value::Num(f64::NAN).truthy());
    assert!(!Value::str("").truthy());
    assert!(Value::array(vec![]).truthy());
    assert!(!Value::Undefined.truthy());
  }

  #[test]
  fn env_lookup_shadows() {
    let root = Env::root(vec![(v("x"), Value::Num(1.)), (v("y"), Value::Num(2.))]);
    let inner = Env::extend(&root, vec![(v("x"), Value::Num(3.))]);
    assert_eq!(inner.lookup(v("x")), Some(&Value::Num(3.)));
    assert_eq!(inner.lookup(v("y")), Some(&Value::Num(2.)));
    assert_eq!(root.lookup(v("x")), Some(&Value::Num(1.)));
    assert!(inner.lookup(v("z")).is_none());
  }
}
