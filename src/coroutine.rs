use crate::dist::Distribution;
use crate::error::Error;
use crate::eval::{apply, resume};
use crate::runtime::Runtime;
use crate::trampoline::Step;
use crate::value::Value;

use anyhow::Result;
use std::rc::Rc;

/// Position of a call in the dynamic call tree, e.g. `_3_17_2`.
pub type Address = Rc<str>;

pub fn extend(a: &str, fragment: impl std::fmt::Display) -> Address {
  Rc::from(format!("{}_{}", a, fragment))
}

/// An inference algorithm, seen from the program it runs: every random choice
/// and every conditioning statement is handed to the installed coroutine,
/// which decides how execution continues.
pub trait Coroutine {
  fn name(&self) -> &'static str;

  fn sample(
    &self,
    rt: &mut Runtime,
    k: Value,
    a: Address,
    dist: Rc<dyn Distribution>,
    options: &Value,
  ) -> Result<Step>;

  fn factor(&self, rt: &mut Runtime, k: Value, a: Address, score: f64) -> Result<Step>;

  /// Samples from `dist` and factors by `score_fn(value)` before continuing.
  fn sample_with_factor(
    &self,
    rt: &mut Runtime,
    k: Value,
    a: Address,
    dist: Rc<dyn Distribution>,
    score_fn: Value,
  ) -> Result<Step> {
    let then = {
      let a = a.clone();
      Value::cont("sampleWithFactor", move |rt, value| {
        let (k, a) = (k.clone(), a.clone());
        let score_address = Value::Str(extend(&a, "sf"));
        let sampled = value.clone();
        let scored = Value::cont("sampleWithFactor", move |rt, extra| {
          let (k, sampled) = (k.clone(), sampled.clone());
          let after = Value::cont("sampleWithFactor", move |_, _| Ok(resume(k.clone(), sampled.clone())));
          rt.coroutine().factor(rt, after, a.clone(), extra.as_num()?)
        });
        apply(rt, &score_fn, vec![scored, score_address, value])
      })
    };
    self.sample(rt, then, a, dist, &Value::Undefined)
  }

  /// Hook for engines that re-execute incrementally; others just call `f`.
  fn incrementalize(&self, rt: &mut Runtime, k: Value, a: Address, f: Value, args: Vec<Value>) -> Result<Step> {
    let mut all = vec![k, Value::Str(a)];
    all.extend(args);
    apply(rt, &f, all)
  }
}

/// The coroutine at the bottom of every stack: forward sampling, and no
/// conditioning.
pub struct TopLevel;

impl Coroutine for TopLevel {
  fn name(&self) -> &'static str {
    "top-level"
  }

  fn sample(
    &self,
    rt: &mut Runtime,
    k: Value,
    _a: Address,
    dist: Rc<dyn Distribution>,
    _options: &Value,
  ) -> Result<Step> {
    let value = dist.sample(&mut rt.rng);
    Ok(resume(k, value))
  }

  fn factor(&self, _rt: &mut Runtime, _k: Value, _a: Address, _score: f64) -> Result<Step> {
    Err(Error::FactorOutsideInference.into())
  }
}
