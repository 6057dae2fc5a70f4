use crate::coroutine::{extend, Address};
use crate::dist::{Bernoulli, Binomial, Categorical, Delta, Discrete, Gaussian, RandomInteger, Uniform};
use crate::error::Error;
use crate::eval::{apply, resume};
use crate::infer;
use crate::lang::v;
use crate::runtime::Runtime;
use crate::trampoline::Step;
use crate::util::{cps_fold, FoldBody, FoldDone};
use crate::value::{Env, Value};

use anyhow::Result;
use log::debug;
use maplit::btreemap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

fn arg(args: &[Value], i: usize) -> Value {
  args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn num(args: &[Value], i: usize) -> Result<f64> {
  arg(args, i).as_num()
}

fn address(args: &[Value], i: usize) -> Result<Address> {
  match arg(args, i) {
    Value::Str(a) => Ok(a),
    v => Err(Error::ty(format!("expected an address, got {}", v)).into()),
  }
}

fn push(acc: &Value, v: Value) -> Value {
  let mut vs = match acc {
    Value::Array(vs) => (**vs).clone(),
    _ => Vec::new(),
  };
  vs.push(v);
  Value::array(vs)
}

fn math() -> Value {
  Value::object(btreemap! {
    "log".to_string() => Value::prim("log", |args| Ok(Value::Num(num(args, 0)?.ln()))),
    "exp".to_string() => Value::prim("exp", |args| Ok(Value::Num(num(args, 0)?.exp()))),
    "sqrt".to_string() => Value::prim("sqrt", |args| Ok(Value::Num(num(args, 0)?.sqrt()))),
    "pow".to_string() => Value::prim("pow", |args| Ok(Value::Num(num(args, 0)?.powf(num(args, 1)?)))),
    "abs".to_string() => Value::prim("abs", |args| Ok(Value::Num(num(args, 0)?.abs()))),
    "floor".to_string() => Value::prim("floor", |args| Ok(Value::Num(num(args, 0)?.floor()))),
    "ceil".to_string() => Value::prim("ceil", |args| Ok(Value::Num(num(args, 0)?.ceil()))),
    // Halves round up, as in JavaScript.
    "round".to_string() => Value::prim("round", |args| Ok(Value::Num((num(args, 0)? + 0.5).floor()))),
    "min".to_string() => Value::prim("min", |args| {
      args.iter().try_fold(f64::INFINITY, |m, a| Ok(m.min(a.as_num()?))).map(Value::Num)
    }),
    "max".to_string() => Value::prim("max", |args| {
      args.iter().try_fold(f64::NEG_INFINITY, |m, a| Ok(m.max(a.as_num()?))).map(Value::Num)
    }),
    "PI".to_string() => Value::Num(std::f64::consts::PI),
    "E".to_string() => Value::Num(std::f64::consts::E),
  })
}

fn display(args: &[Value]) -> Result<Value> {
  let line = args.iter().map(Value::key).collect::<Vec<_>>().join(" ");
  println!("{}", line);
  Ok(Value::Undefined)
}

fn expectation(args: &[Value]) -> Result<Value> {
  let d = arg(args, 0).as_dist()?;
  let support = d
    .support()
    .ok_or_else(|| Error::ty(format!("expectation needs a finite support, got {:?}", d)))?;
  let mut total = 0.;
  for v in support {
    total += d.score(&v).exp() * v.as_num()?;
  }
  Ok(Value::Num(total))
}

fn sample(rt: &mut Runtime, args: Vec<Value>) -> Result<Step> {
  let (k, a) = (arg(&args, 0), address(&args, 1)?);
  let dist = arg(&args, 2).as_dist()?;
  rt.coroutine().sample(rt, k, a, dist, &arg(&args, 3))
}

fn factor(rt: &mut Runtime, args: Vec<Value>) -> Result<Step> {
  let (k, a) = (arg(&args, 0), address(&args, 1)?);
  let score = num(&args, 2)?;
  rt.coroutine().factor(rt, k, a, score)
}

fn sample_with_factor(rt: &mut Runtime, args: Vec<Value>) -> Result<Step> {
  let (k, a) = (arg(&args, 0), address(&args, 1)?);
  let dist = arg(&args, 2).as_dist()?;
  let score_fn = arg(&args, 3);
  rt.coroutine().sample_with_factor(rt, k, a, dist, score_fn)
}

fn incrementalize(rt: &mut Runtime, args: Vec<Value>) -> Result<Step> {
  let (k, a) = (arg(&args, 0), address(&args, 1)?);
  let f = arg(&args, 2);
  let f_args = match arg(&args, 3) {
    Value::Undefined => Vec::new(),
    v => (*v.as_array()?).clone(),
  };
  rt.coroutine().incrementalize(rt, k, a, f, f_args)
}

/// Calls `f` on every element in order, at address `a_i`, and hands each
/// result to `step` to build the next accumulator.
fn fold_calls(
  rt: &mut Runtime,
  args: Vec<Value>,
  init: Value,
  step: fn(&Value, Value, Value) -> Value,
) -> Result<Step> {
  let (k, a) = (arg(&args, 0), address(&args, 1)?);
  let f = arg(&args, 2);
  let xs = arg(&args, 3).as_array()?;
  let body: FoldBody = Rc::new(move |rt: &mut Runtime, acc: Value, item: Value, i: usize, next: Value| {
    let then = {
      let item = item.clone();
      Value::cont("fold", move |_, result| Ok(resume(next.clone(), step(&acc, item.clone(), result))))
    };
    apply(rt, &f, vec![then, Value::Str(extend(&a, i)), item])
  });
  let done: FoldDone = Rc::new(move |_: &mut Runtime, acc: Value| Ok(resume(k.clone(), acc)));
  cps_fold(rt, xs, init, body, done)
}

fn map(rt: &mut Runtime, args: Vec<Value>) -> Result<Step> {
  fold_calls(rt, args, Value::array(vec![]), |acc, _, result| push(acc, result))
}

fn filter(rt: &mut Runtime, args: Vec<Value>) -> Result<Step> {
  fold_calls(rt, args, Value::array(vec![]), |acc, item, keep| {
    if keep.truthy() {
      push(acc, item)
    } else {
      acc.clone()
    }
  })
}

fn for_each(rt: &mut Runtime, args: Vec<Value>) -> Result<Step> {
  fold_calls(rt, args, Value::Undefined, |_, _, _| Value::Undefined)
}

fn repeat(rt: &mut Runtime, args: Vec<Value>) -> Result<Step> {
  let (k, a) = (arg(&args, 0), address(&args, 1)?);
  let n = num(&args, 2)?;
  if n < 0. || n.fract() != 0. {
    return Err(Error::ty(format!("repeat expects a non-negative integer, got {}", n)).into());
  }
  let f = arg(&args, 3);
  let indices = Rc::new((0..n as usize).map(|i| Value::Num(i as f64)).collect::<Vec<_>>());
  let body: FoldBody = Rc::new(move |rt: &mut Runtime, acc: Value, _: Value, i: usize, next: Value| {
    let then = Value::cont("repeat", move |_, result| Ok(resume(next.clone(), push(&acc, result))));
    apply(rt, &f, vec![then, Value::Str(extend(&a, i))])
  });
  let done: FoldDone = Rc::new(move |_: &mut Runtime, acc: Value| Ok(resume(k.clone(), acc)));
  cps_fold(rt, indices, Value::array(vec![]), body, done)
}

/// Wraps `f` so that its results are remembered by printed arguments. The
/// table is shared by every execution path, so `f` should be deterministic.
fn cache(_rt: &mut Runtime, args: Vec<Value>) -> Result<Step> {
  let k = arg(&args, 0);
  let f = arg(&args, 2);
  if !f.is_callable() {
    return Err(Error::ty(format!("cache expects a function, got {}", f)).into());
  }
  let table: Rc<RefCell<HashMap<String, Value>>> = Rc::default();
  let cached = Value::cps("cached", move |rt, args| {
    let mut args = args.into_iter();
    let k = args.next().unwrap_or(Value::Undefined);
    let a = args.next().unwrap_or(Value::Undefined);
    let rest: Vec<Value> = args.collect();
    let key = Value::array(rest.clone()).to_string();
    if let Some(hit) = table.borrow().get(&key).cloned() {
      return Ok(resume(k, hit));
    }
    let remember = {
      let table = table.clone();
      Value::cont("cache", move |_, result| {
        // Recursive callers can finish the same key twice; the last result wins.
        if table.borrow_mut().insert(key.clone(), result.clone()).is_some() {
          debug!("cache: {} was already cached", key);
        }
        Ok(resume(k.clone(), result))
      })
    };
    let mut all = vec![remember, a];
    all.extend(rest);
    apply(rt, &f, all)
  });
  Ok(resume(k, cached))
}

/// The global environment every program runs in.
pub fn globals() -> Rc<Env> {
  let bindings = vec![
    ("Math", math()),
    ("Infinity", Value::Num(f64::INFINITY)),
    ("NaN", Value::Num(f64::NAN)),
    ("display", Value::prim("display", display)),
    ("expectation", Value::prim("expectation", expectation)),
    ("Bernoulli", Value::prim("Bernoulli", |args| Ok(Value::dist(Bernoulli::from_params(&arg(args, 0))?)))),
    (
      "RandomInteger",
      Value::prim("RandomInteger", |args| Ok(Value::dist(RandomInteger::from_params(&arg(args, 0))?))),
    ),
    (
      "Categorical",
      Value::prim("Categorical", |args| Ok(Value::dist(Categorical::from_params(&arg(args, 0))?))),
    ),
    ("Discrete", Value::prim("Discrete", |args| Ok(Value::dist(Discrete::from_params(&arg(args, 0))?)))),
    ("Binomial", Value::prim("Binomial", |args| Ok(Value::dist(Binomial::from_params(&arg(args, 0))?)))),
    ("Delta", Value::prim("Delta", |args| Ok(Value::dist(Delta { v: arg(args, 0).get("v") })))),
    ("Uniform", Value::prim("Uniform", |args| Ok(Value::dist(Uniform::from_params(&arg(args, 0))?)))),
    ("Gaussian", Value::prim("Gaussian", |args| Ok(Value::dist(Gaussian::from_params(&arg(args, 0))?)))),
    ("map", Value::cps("map", map)),
    ("filter", Value::cps("filter", filter)),
    ("forEach", Value::cps("forEach", for_each)),
    ("repeat", Value::cps("repeat", repeat)),
    ("cache", Value::cps("cache", cache)),
    ("sample", Value::cps("sample", sample)),
    ("factor", Value::cps("factor", factor)),
    ("sampleWithFactor", Value::cps("sampleWithFactor", sample_with_factor)),
    ("incrementalize", Value::cps("incrementalize", incrementalize)),
    ("Enumerate", Value::cps("Enumerate", infer::enumerate)),
    ("Infer", Value::cps("Infer", infer::infer)),
  ];
  Env::root(bindings.into_iter().map(|(name, value)| (v(name), value)).collect())
}
