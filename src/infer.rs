use crate::coroutine::Address;
use crate::enumerate::Enumerate;
use crate::error::Error;
use crate::queue::Strategy;
use crate::runtime::Runtime;
use crate::trampoline::Step;
use crate::value::Value;

use anyhow::Result;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerateOptions {
  /// `None` explores every path.
  pub max_executions: Option<usize>,
  pub strategy: Strategy,
}

impl Default for EnumerateOptions {
  fn default() -> Self {
    EnumerateOptions {
      max_executions: None,
      strategy: Strategy::default_for(None),
    }
  }
}

impl EnumerateOptions {
  /// Reads `{maxExecutions, strategy}`. An absent object means the defaults.
  pub fn from_value(who: &'static str, options: &Value) -> Result<Self> {
    let map = match options {
      Value::Undefined => return Ok(EnumerateOptions::default()),
      Value::Object(map) => map,
      v => return Err(Error::options(who, format!("expected an options object, got {}", v)).into()),
    };
    if let Some(key) = map.keys().find(|k| !["maxExecutions", "strategy"].contains(&k.as_str())) {
      return Err(Error::options(who, format!("unknown option {}", key)).into());
    }
    let max_executions = match map.get("maxExecutions") {
      None | Some(Value::Undefined) => None,
      Some(Value::Num(n)) if *n == f64::INFINITY => None,
      Some(Value::Num(n)) if *n >= 1. && n.fract() == 0. => Some(*n as usize),
      Some(v) => {
        return Err(Error::options(who, format!("maxExecutions must be a positive integer, got {}", v)).into());
      }
    };
    let strategy = match map.get("strategy") {
      None | Some(Value::Undefined) => Strategy::default_for(max_executions),
      Some(Value::Str(s)) => s.parse::<Strategy>().map_err(|_| Error::options(who, format!("unknown strategy {}", s)))?,
      Some(v) => return Err(Error::options(who, format!("strategy must be a string, got {}", v)).into()),
    };
    Ok(EnumerateOptions {
      max_executions,
      strategy,
    })
  }
}

fn address(v: &Value) -> Result<Address> {
  match v {
    Value::Str(a) => Ok(a.clone()),
    v => Err(Error::ty(format!("expected an address, got {}", v)).into()),
  }
}

fn arg(args: &[Value], i: usize) -> Value {
  args.get(i).cloned().unwrap_or(Value::Undefined)
}

/// `Enumerate(thunk, options?)`
pub fn enumerate(rt: &mut Runtime, args: Vec<Value>) -> Result<Step> {
  let (k, a) = (arg(&args, 0), address(&arg(&args, 1))?);
  let thunk = arg(&args, 2);
  if !thunk.is_callable() {
    return Err(Error::ty(format!("Enumerate expects a function, got {}", thunk)).into());
  }
  let options = EnumerateOptions::from_value("Enumerate", &arg(&args, 3))?;
  Enumerate::start(rt, k, a, thunk, options)
}

/// `Infer(options, thunk)`. Only `method: "enumerate"` is available; the
/// remaining keys configure it.
pub fn infer(rt: &mut Runtime, args: Vec<Value>) -> Result<Step> {
  let (k, a) = (arg(&args, 0), address(&arg(&args, 1))?);
  let (options, thunk) = (arg(&args, 2), arg(&args, 3));
  let map = match &options {
    Value::Object(map) => map,
    v => return Err(Error::options("Infer", format!("expected an options object, got {}", v)).into()),
  };
  match map.get("method") {
    Some(Value::Str(m)) if &**m == "enumerate" => {}
    Some(m) => return Err(Error::options("Infer", format!("inference method {} is not available", m)).into()),
    None => return Err(Error::options("Infer", "no method given").into()),
  }
  if !thunk.is_callable() {
    return Err(Error::ty(format!("Infer expects a function, got {}", thunk)).into());
  }
  let rest: BTreeMap<String, Value> = map
    .iter()
    .filter(|(key, _)| key.as_str() != "method")
    .map(|(key, v)| (key.clone(), v.clone()))
    .collect();
  let options = EnumerateOptions::from_value("Infer", &Value::Object(Rc::new(rest)))?;
  Enumerate::start(rt, k, a, thunk, options)
}
