use crate::runtime::Runtime;
use crate::trampoline::Step;
use crate::value::Value;

use anyhow::Result;
use std::rc::Rc;

/// `ln(exp(a) + exp(b))` without leaving log space.
pub fn logaddexp(a: f64, b: f64) -> f64 {
  if a == f64::NEG_INFINITY {
    return b;
  }
  if b == f64::NEG_INFINITY {
    return a;
  }
  let m = a.max(b);
  m + ((a - m).exp() + (b - m).exp()).ln()
}

/// Loop body: `(rt, acc, item, index, next)`. Continue by applying `next` to
/// the new accumulator.
pub type FoldBody = Rc<dyn Fn(&mut Runtime, Value, Value, usize, Value) -> Result<Step>>;
pub type FoldDone = Rc<dyn Fn(&mut Runtime, Value) -> Result<Step>>;

/// Folds over `items` in CPS. The body decides when to move on, so it can
/// call compiled functions (and be suspended by inference) between items.
/// Accumulators are values, never mutated in place, so a continuation that
/// runs twice sees the same state both times.
pub fn cps_fold(rt: &mut Runtime, items: Rc<Vec<Value>>, acc: Value, body: FoldBody, done: FoldDone) -> Result<Step> {
  fold_from(rt, items, 0, acc, body, done)
}

fn fold_from(
  rt: &mut Runtime,
  items: Rc<Vec<Value>>,
  i: usize,
  acc: Value,
  body: FoldBody,
  done: FoldDone,
) -> Result<Step> {
  let item = match items.get(i) {
    Some(item) => item.clone(),
    None => return done(rt, acc),
  };
  let next = {
    let (items, body, done) = (items.clone(), body.clone(), done.clone());
    Value::cont("fold", move |_, acc| {
      let (items, body, done) = (items.clone(), body.clone(), done.clone());
      Ok(Step::bounce(move |rt| fold_from(rt, items, i + 1, acc, body, done)))
    })
  };
  body(rt, acc, item, i, next)
}

/// `cps_fold` without an accumulator.
pub fn cps_for_each(
  rt: &mut Runtime,
  items: Rc<Vec<Value>>,
  body: Rc<dyn Fn(&mut Runtime, Value, usize, Value) -> Result<Step>>,
  done: Rc<dyn Fn(&mut Runtime) -> Result<Step>>,
) -> Result<Step> {
  cps_fold(
    rt,
    items,
    Value::Undefined,
    Rc::new(move |rt: &mut Runtime, _: Value, item: Value, i: usize, next: Value| body(rt, item, i, next)),
    Rc::new(move |rt: &mut Runtime, _: Value| done(rt)),
  )
}
