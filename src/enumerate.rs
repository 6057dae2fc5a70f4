use crate::aggregate::ScoreAggregator;
use crate::coroutine::{extend, Address, Coroutine};
use crate::dist::Distribution;
use crate::error::Error;
use crate::eval::{apply, resume};
use crate::infer::EnumerateOptions;
use crate::queue::{Entry, Frontier};
use crate::runtime::Runtime;
use crate::store::Store;
use crate::trampoline::Step;
use crate::util::cps_for_each;
use crate::value::Value;

use anyhow::Result;
use log::{debug, trace};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Exact inference by exploring every path through the program. Each `sample`
/// forks one saved choice point per support value; the frontier decides which
/// one runs next.
pub struct Enumerate {
  me: Weak<Enumerate>,
  score: Cell<f64>,
  frontier: RefCell<Frontier>,
  marginal: RefCell<ScoreAggregator>,
  completed: Cell<usize>,
  done: Cell<bool>,
  max_executions: Option<usize>,
  k: Value,
  a: Address,
  store: Store,
}

fn support_of(dist: &dyn Distribution) -> Result<Vec<Value>> {
  if dist.is_continuous() {
    return Err(Error::NoSupport(format!("{:?}", dist)).into());
  }
  match dist.support() {
    None => Err(Error::NoSupport(format!("{:?}", dist)).into()),
    Some(support) if support.is_empty() => Err(Error::EmptySupport(format!("{:?}", dist)).into()),
    Some(support) => Ok(support),
  }
}

impl Enumerate {
  /// Returns a step that installs a fresh engine and runs `thunk` under it.
  /// The marginal is eventually passed to `k`.
  pub fn start(rt: &mut Runtime, k: Value, a: Address, thunk: Value, options: EnumerateOptions) -> Result<Step> {
    debug!(
      "Enumerate at {:?}: strategy {:?}, max executions {:?}",
      a, options.strategy, options.max_executions
    );
    let engine = Rc::new_cyclic(|me| Enumerate {
      me: me.clone(),
      score: Cell::new(0.),
      frontier: RefCell::new(Frontier::new(options.strategy)),
      marginal: RefCell::new(ScoreAggregator::default()),
      completed: Cell::new(0),
      done: Cell::new(false),
      max_executions: options.max_executions,
      k,
      a: a.clone(),
      store: rt.store.clone(),
    });
    let exit = engine.exit_continuation();
    // Installed from inside the trampoline, so a failed run unwinds it.
    Ok(Step::bounce(move |rt| {
      rt.install(engine);
      apply(rt, &thunk, vec![exit, Value::Str(a)])
    }))
  }

  fn exit_continuation(&self) -> Value {
    let me = self.me.clone();
    Value::cont("Enumerate", move |rt, value| live(&me)?.exit(rt, value))
  }

  fn enqueue(&self, entry: Entry) {
    self.frontier.borrow_mut().push(entry);
  }

  fn next_in_queue(&self, rt: &mut Runtime) -> Result<Step> {
    let next = self.frontier.borrow_mut().pop();
    match next {
      Some(entry) => {
        self.score.set(entry.score);
        rt.store = entry.store;
        Ok(resume(entry.k, entry.value))
      }
      None => self.finish(rt),
    }
  }

  fn exit(&self, rt: &mut Runtime, value: Value) -> Result<Step> {
    trace!("Enumerate at {:?}: path returned {} with score {}", self.a, value, self.score.get());
    self.marginal.borrow_mut().add(value, self.score.get());
    let completed = self.completed.get() + 1;
    self.completed.set(completed);
    let within_budget = self.max_executions.map_or(true, |max| completed < max);
    if within_budget && !self.frontier.borrow().is_empty() {
      self.next_in_queue(rt)
    } else {
      self.finish(rt)
    }
  }

  fn finish(&self, rt: &mut Runtime) -> Result<Step> {
    let marginal = self.marginal.borrow().to_marginal()?;
    debug!(
      "Enumerate at {:?}: {} executions, {} left unexplored, {} distinct values",
      self.a,
      self.completed.get(),
      self.frontier.borrow().len(),
      marginal.len()
    );
    self.done.set(true);
    self.frontier.borrow_mut().clear();
    rt.uninstall();
    rt.store = self.store.clone();
    Ok(resume(self.k.clone(), Value::Dist(Rc::new(marginal))))
  }
}

fn live(me: &Weak<Enumerate>) -> Result<Rc<Enumerate>> {
  match me.upgrade() {
    Some(engine) if !engine.done.get() => Ok(engine),
    _ => Err(Error::StaleContinuation("Enumerate").into()),
  }
}

impl Coroutine for Enumerate {
  fn name(&self) -> &'static str {
    "Enumerate"
  }

  fn sample(
    &self,
    rt: &mut Runtime,
    k: Value,
    _a: Address,
    dist: Rc<dyn Distribution>,
    _options: &Value,
  ) -> Result<Step> {
    for value in support_of(&*dist)? {
      let score = self.score.get() + dist.score(&value);
      self.enqueue(Entry {
        k: k.clone(),
        value,
        score,
        store: rt.store.clone(),
      });
    }
    self.next_in_queue(rt)
  }

  fn factor(&self, rt: &mut Runtime, k: Value, _a: Address, score: f64) -> Result<Step> {
    let score = self.score.get() + score;
    self.score.set(score);
    if score == f64::NEG_INFINITY {
      return self.exit(rt, Value::Undefined);
    }
    Ok(resume(k, Value::Undefined))
  }

  /// Scores every support value eagerly, so the extra factor ranks the
  /// branch before it is queued.
  fn sample_with_factor(
    &self,
    rt: &mut Runtime,
    k: Value,
    a: Address,
    dist: Rc<dyn Distribution>,
    score_fn: Value,
  ) -> Result<Step> {
    let support = support_of(&*dist)?;
    let snapshot = rt.store.clone();
    let base = self.score.get();
    let me = self.me.clone();
    let body = Rc::new(move |rt: &mut Runtime, value: Value, _i: usize, next: Value| {
      rt.store = snapshot.clone();
      let scored = {
        let (me, k, dist, value) = (me.clone(), k.clone(), dist.clone(), value.clone());
        Value::cont("sampleWithFactor", move |rt, extra| {
          let score = base + dist.score(&value) + extra.as_num()?;
          live(&me)?.enqueue(Entry {
            k: k.clone(),
            value: value.clone(),
            score,
            store: rt.store.clone(),
          });
          Ok(resume(next.clone(), Value::Undefined))
        })
      };
      apply(rt, &score_fn, vec![scored, Value::Str(extend(&a, "sf")), value])
    });
    let me = self.me.clone();
    let done = Rc::new(move |rt: &mut Runtime| live(&me)?.next_in_queue(rt));
    cps_for_each(rt, Rc::new(support), body, done)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::aggregate::Marginal;
  use crate::config::Config;
  use crate::dist::{Bernoulli, Discrete, Gaussian, RandomInteger};
  use crate::queue::Strategy;

  fn marginal(v: Value) -> Marginal {
    let d = v.as_dist().unwrap();
    let support = d.support().unwrap();
    let mut agg = ScoreAggregator::default();
    for s in support {
      agg.add(s.clone(), d.score(&s));
    }
    agg.to_marginal().unwrap()
  }

  fn done() -> Value {
    Value::cont("done", |_, v| Ok(Step::Done(v)))
  }

  fn options(strategy: Strategy, max_executions: Option<usize>) -> EnumerateOptions {
    EnumerateOptions {
      max_executions,
      strategy,
    }
  }

  /// `(k, a) => sample(Bernoulli(.5), x => sample(Bernoulli(.5), y => k(x + y)))`
  fn two_flips() -> Value {
    Value::cps("twoFlips", |rt, args| {
      let k = args[0].clone();
      let first = Value::cont("first", move |rt, x| {
        let k = k.clone();
        let second = Value::cont("second", move |_, y| {
          Ok(resume(k.clone(), Value::Num(x.as_num()? + y.as_num()?)))
        });
        rt.coroutine().sample(rt, second, Rc::from("_2"), Rc::new(Bernoulli { p: 0.5 }), &Value::Undefined)
      });
      rt.coroutine().sample(rt, first, Rc::from("_1"), Rc::new(Bernoulli { p: 0.5 }), &Value::Undefined)
    })
  }

  fn enumerate(rt: &mut Runtime, thunk: Value, opts: EnumerateOptions) -> Result<Value> {
    let step = Enumerate::start(rt, done(), Rc::from(""), thunk, opts)?;
    rt.run(step)
  }

  #[test]
  fn sums_two_flips_under_every_strategy() {
    for strategy in [Strategy::LikelyFirst, Strategy::DepthFirst, Strategy::BreadthFirst] {
      let mut rt = Runtime::new(&Config::default());
      let m = marginal(enumerate(&mut rt, two_flips(), options(strategy, None)).unwrap());
      assert!((m.prob(&Value::Num(0.)) - 0.25).abs() < 1e-12);
      assert!((m.prob(&Value::Num(1.)) - 0.5).abs() < 1e-12);
      assert!((m.prob(&Value::Num(2.)) - 0.25).abs() < 1e-12);
      assert!((m.total() - 1.).abs() < 1e-12);
      assert_eq!(rt.depth(), 0);
    }
  }

  #[test]
  fn budget_truncates_the_search() {
    let mut rt = Runtime::new(&Config::default());
    let m = marginal(enumerate(&mut rt, two_flips(), options(Strategy::BreadthFirst, Some(1))).unwrap());
    assert_eq!(m.len(), 1);
    assert_eq!(rt.depth(), 0);
  }

  #[test]
  fn factors_weight_paths() {
    let thunk = Value::cps("weighted", |rt, args| {
      let k = args[0].clone();
      let then = Value::cont("then", move |rt, x| {
        let score = if x.truthy() { 0. } else { f64::NEG_INFINITY };
        let k = k.clone();
        let after = Value::cont("after", move |_, _| Ok(resume(k.clone(), x.clone())));
        rt.coroutine().factor(rt, after, Rc::from("_2"), score)
      });
      rt.coroutine().sample(rt, then, Rc::from("_1"), Rc::new(RandomInteger { n: 3 }), &Value::Undefined)
    });
    let mut rt = Runtime::new(&Config::default());
    let m = marginal(enumerate(&mut rt, thunk, options(Strategy::LikelyFirst, None)).unwrap());
    assert_eq!(m.len(), 2);
    assert!((m.prob(&Value::Num(1.)) - 0.5).abs() < 1e-12);
    assert_eq!(m.prob(&Value::Num(0.)), 0.);
  }

  #[test]
  fn continuous_distributions_are_refused() {
    let thunk = Value::cps("gaussian", |rt, args| {
      let k = args[0].clone();
      let dist = Rc::new(Gaussian { mu: 0., sigma: 1. });
      rt.coroutine().sample(rt, k, Rc::from("_1"), dist, &Value::Undefined)
    });
    let mut rt = Runtime::new(&Config::default());
    let err = enumerate(&mut rt, thunk, options(Strategy::DepthFirst, None)).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoSupport(_))));
    assert_eq!(rt.depth(), 0);
  }

  #[test]
  fn failed_runs_leave_the_runtime_reusable() {
    let failing = Value::cps("failing", |_, _| Err(Error::Type("boom".into()).into()));
    let mut rt = Runtime::new(&Config::default());
    let step = Enumerate::start(&mut rt, done(), Rc::from(""), failing, options(Strategy::DepthFirst, None)).unwrap();
    assert_eq!(rt.depth(), 0);
    assert!(rt.run(step).is_err());
    assert_eq!(rt.depth(), 0);
    assert_eq!(rt.coroutine().name(), "top-level");

    let m = marginal(enumerate(&mut rt, two_flips(), options(Strategy::DepthFirst, None)).unwrap());
    assert!((m.prob(&Value::Num(1.)) - 0.5).abs() < 1e-12);
    assert_eq!(rt.depth(), 0);
  }

  #[test]
  fn all_paths_impossible() {
    let thunk = Value::cps("impossible", |rt, args| {
      let k = args[0].clone();
      rt.coroutine().factor(rt, k, Rc::from("_1"), f64::NEG_INFINITY)
    });
    let mut rt = Runtime::new(&Config::default());
    let err = enumerate(&mut rt, thunk, options(Strategy::DepthFirst, None)).unwrap_err();
    assert_eq!(err.downcast_ref::<Error>(), Some(&Error::ZeroProbability));
  }

  #[test]
  fn store_is_restored_and_branches_are_isolated() {
    let thunk = Value::cps("store", |rt, args| {
      let k = args[0].clone();
      let then = Value::cont("then", move |rt, x| {
        let before = rt.store.get("x");
        rt.store.set("x", x.clone());
        Ok(resume(k.clone(), Value::array(vec![before, x])))
      });
      rt.coroutine().sample(rt, then, Rc::from("_1"), Rc::new(Bernoulli { p: 0.5 }), &Value::Undefined)
    });
    let mut rt = Runtime::new(&Config::default());
    rt.store.set("x", Value::str("outer"));
    let m = marginal(enumerate(&mut rt, thunk, options(Strategy::DepthFirst, None)).unwrap());
    for (v, _) in m.iter() {
      assert_eq!(v.as_array().unwrap()[0], Value::str("outer"));
    }
    assert_eq!(m.len(), 2);
    assert_eq!(rt.store.get("x"), Value::str("outer"));
  }

  #[test]
  fn sample_with_factor_folds_in_the_extra_score() {
    let thunk = Value::cps("swf", |rt, args| {
      let k = args[0].clone();
      let score_fn = Value::cps("score", |rt, args| {
        let v = args[2].clone();
        rt.store.set("scored", v.clone());
        let extra = if v.as_num()? == 2. { 0. } else { f64::NEG_INFINITY };
        Ok(resume(args[0].clone(), Value::Num(extra)))
      });
      let then = Value::cont("then", move |rt, v| {
        Ok(resume(k.clone(), Value::array(vec![v, rt.store.get("scored")])))
      });
      let dist = Rc::new(Discrete { ps: vec![0.2, 0.3, 0.5] });
      rt.coroutine().sample_with_factor(rt, then, Rc::from("_1"), dist, score_fn)
    });
    let mut rt = Runtime::new(&Config::default());
    let m = marginal(enumerate(&mut rt, thunk, options(Strategy::LikelyFirst, None)).unwrap());
    assert_eq!(m.len(), 1);
    let only = Value::array(vec![Value::Num(2.), Value::Num(2.)]);
    assert!((m.prob(&only) - 1.).abs() < 1e-12);
    assert_eq!(rt.store.get("scored"), Value::Undefined);
  }

  #[test]
  fn finished_engines_refuse_their_continuations() {
    let mut rt = Runtime::new(&Config::default());
    let captured: Rc<RefCell<Option<Value>>> = Rc::default();
    let thunk = {
      let captured = captured.clone();
      Value::cont("capture", move |_, exit| {
        *captured.borrow_mut() = Some(exit.clone());
        Ok(resume(exit, Value::Num(1.)))
      })
    };
    let step = Enumerate::start(&mut rt, done(), Rc::from(""), thunk, options(Strategy::DepthFirst, None)).unwrap();
    let m = marginal(rt.run(step).unwrap());
    assert_eq!(m.prob(&Value::Num(1.)), 1.);

    let exit = captured.borrow_mut().take().unwrap();
    let err = rt.run(resume(exit, Value::Num(2.))).unwrap_err();
    assert_eq!(err.downcast_ref::<Error>(), Some(&Error::StaleContinuation("Enumerate")));
  }
}
