use crate::config::Config;
use crate::cps::{self, Cps};
use crate::error::Error;
use crate::eval::{apply, eval};
use crate::lang::{Expr, Program, Stmt};
use crate::naming::Naming;
use crate::parse::Parse;
use crate::runtime::Runtime;
use crate::syntax::thunkify;
use crate::trampoline::Step;
use crate::value::Value;

use anyhow::Result;
use log::{debug, trace};

const PRELUDE: &str = include_str!("prelude.wppl");

type Pass = fn(&Program) -> Result<Program>;

/// A program in CPS form: a single function expression taking a
/// continuation and an address.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
  pub program: Program,
}

fn thunkify_pass(program: &Program) -> Result<Program> {
  Ok(thunkify(program))
}

/// Runs the compiler passes over a parsed program.
pub fn compile_program(program: &Program) -> Result<Compiled> {
  let passes: Vec<(&'static str, Pass)> = vec![
    ("thunkify", thunkify_pass),
    ("naming", Naming::run),
    ("cps", Cps::run),
    ("check", cps::check),
  ];
  let program = passes.into_iter().try_fold(program.clone(), |p, (name, pass)| {
    debug!("running pass {}", name);
    let p = pass(&p)?;
    trace!("after {}:\n{}", name, p.to_pretty(100));
    Ok::<_, anyhow::Error>(p)
  })?;
  Ok(Compiled { program })
}

/// Parses and compiles `src`, with the prelude in front unless `config`
/// turns it off.
pub fn compile_with(src: &str, config: &Config) -> Result<Compiled> {
  let user = Program::parse(src)?;
  let mut body = if config.prelude {
    Program::parse(PRELUDE)?.body
  } else {
    Vec::new()
  };
  body.extend(user.body);
  compile_program(&Program::new(body))
}

impl Compiled {
  /// The first step of running the program; `k` receives its value.
  pub fn start(&self, rt: &mut Runtime, k: Value) -> Result<Step> {
    let f = match self.program.body.as_slice() {
      [Stmt::Expr(f @ Expr::Func(_))] => {
        let globals = rt.globals().clone();
        eval(rt, f, &globals)?
      }
      _ => return Err(Error::compile("start", "not a compiled program", format!("{:?}", self.program.body)).into()),
    };
    apply(rt, &f, vec![k, Value::str("")])
  }

  /// Runs the program to completion under the runtime's current coroutine.
  pub fn run(&self, rt: &mut Runtime) -> Result<Value> {
    let k = Value::cont("exit", |_, v| Ok(Step::Done(v)));
    let step = self.start(rt, k)?;
    rt.run(step)
  }

  pub fn to_pretty(&self, width: usize) -> String {
    self.program.to_pretty(width)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::coroutine::{Address, Coroutine};
  use crate::dist::Distribution;
  use crate::enumerate::Enumerate;
  use crate::eval::resume;
  use crate::infer::EnumerateOptions;
  use std::rc::Rc;

  fn run(src: &str) -> Result<Value> {
    let mut rt = Runtime::new(&Config { seed: Some(0), ..Config::default() });
    compile_with(src, &Config::default())?.run(&mut rt)
  }

  fn run_bare(src: &str) -> Result<Value> {
    let config = Config {
      seed: Some(0),
      prelude: false,
    };
    let mut rt = Runtime::new(&config);
    compile_with(src, &config)?.run(&mut rt)
  }

  fn probs(v: &Value) -> Vec<(String, f64)> {
    let d = v.as_dist().unwrap();
    let mut out: Vec<(String, f64)> = d
      .support()
      .unwrap()
      .into_iter()
      .map(|x| (x.to_string(), d.score(&x).exp()))
      .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
  }

  fn assert_probs(v: &Value, expected: &[(&str, f64)]) {
    let actual = probs(v);
    assert_eq!(actual.len(), expected.len(), "{:?}", actual);
    for ((k, p), (ek, ep)) in actual.iter().zip(expected) {
      assert_eq!(k, ek);
      assert!((p - ep).abs() < 1e-9, "{}: {} vs {}", k, p, ep);
    }
  }

  #[test]
  fn deterministic_programs() {
    assert_eq!(run_bare("var f = function(x) { return x + 2 }; f(3)").unwrap(), Value::Num(5.));
    assert_eq!(
      run_bare("var fact = function(n) { return n <= 1 ? 1 : n * fact(n - 1) }; fact(10)").unwrap(),
      Value::Num(3628800.)
    );
    assert_eq!(
      run_bare("var f = function(x) { if (x > 0) { return 'pos' } return 'neg' }; [f(1), f(-1)]").unwrap(),
      Value::array(vec![Value::str("pos"), Value::str("neg")])
    );
    assert_eq!(run_bare("var o = {a: [1, 2, 3]}; o.a.length + o.a[0]").unwrap(), Value::Num(4.));
    assert_eq!(run_bare("Math.log(Math.exp(5))").unwrap(), Value::Num(5.));
  }

  #[test]
  fn deep_recursion_runs_in_constant_stack() {
    let src = "var count = function(n) { return n === 0 ? 'done' : count(n - 1) }; count(100000)";
    assert_eq!(run_bare(src).unwrap(), Value::str("done"));
  }

  #[test]
  fn logical_operators_short_circuit() {
    let src = "
      var f = function() { globalStore.hit = true; return true };
      var r = false && f();
      [r, globalStore.hit]";
    assert_eq!(run_bare(src).unwrap(), Value::array(vec![Value::Bool(false), Value::Undefined]));
    let src = "
      var f = function() { globalStore.hit = true; return 1 };
      var r = 0 || f();
      [r, globalStore.hit]";
    assert_eq!(run_bare(src).unwrap(), Value::array(vec![Value::Num(1.), Value::Bool(true)]));
  }

  #[test]
  fn higher_order_builtins() {
    let v = run_bare("map(function(x) { return x * 2 }, [1, 2, 3])").unwrap();
    assert_eq!(v, Value::array(vec![Value::Num(2.), Value::Num(4.), Value::Num(6.)]));
    let v = run_bare("filter(function(x) { return x % 2 === 1 }, [1, 2, 3])").unwrap();
    assert_eq!(v, Value::array(vec![Value::Num(1.), Value::Num(3.)]));
    let v = run_bare("repeat(3, function() { return 'x' }).length").unwrap();
    assert_eq!(v, Value::Num(3.));
    let v = run_bare("forEach(function(x) { globalStore.last = x }, [1, 2]); globalStore.last").unwrap();
    assert_eq!(v, Value::Num(2.));
  }

  #[test]
  fn enumerates_flips() {
    let v = run("Enumerate(function() { return flip(0.5) + flip(0.5) })").unwrap();
    assert_probs(&v, &[("0", 0.25), ("1", 0.5), ("2", 0.25)]);
  }

  #[test]
  fn conditioning() {
    let v = run(
      "Infer({method: 'enumerate'}, function() {
        var a = flip(0.5);
        var b = flip(0.5);
        condition(a || b);
        return a;
      })",
    )
    .unwrap();
    assert_probs(&v, &[("false", 1. / 3.), ("true", 2. / 3.)]);
  }

  #[test]
  fn observe_and_categorical() {
    let v = run(
      "Enumerate(function() {
        var coin = categorical([0.5, 0.5], ['fair', 'biased']);
        observe(Bernoulli({p: coin === 'fair' ? 0.5 : 0.9}), true);
        return coin;
      })",
    )
    .unwrap();
    let fair = 0.5 * 0.5 / (0.5 * 0.5 + 0.5 * 0.9);
    assert_probs(&v, &[("\"biased\"", 1. - fair), ("\"fair\"", fair)]);
  }

  #[test]
  fn truncated_geometric() {
    let v = run(
      "var geom = function() { return flip(0.5) ? 0 : geom() + 1 };
      Enumerate(function() {
        var x = geom();
        factor(x > 2 ? 0 : -Infinity);
        return x;
      }, {maxExecutions: 10})",
    )
    .unwrap();
    let d = v.as_dist().unwrap();
    let mut support: Vec<f64> = d.support().unwrap().iter().map(|x| x.as_num().unwrap()).collect();
    support.sort_by(|a, b| a.total_cmp(b));
    assert!(support.len() >= 2, "{:?}", support);
    assert!(support.iter().all(|x| *x > 2.));
    for pair in support.windows(2) {
      assert_eq!(pair[1], pair[0] + 1.);
      let ratio = d.score(&Value::Num(pair[1])).exp() / d.score(&Value::Num(pair[0])).exp();
      assert!((ratio - 0.5).abs() < 1e-9);
    }
  }

  #[test]
  fn store_branches_do_not_leak() {
    let v = run(
      "globalStore.seen = 'outer';
      var d = Enumerate(function() {
        var before = globalStore.seen;
        globalStore.seen = flip(0.5);
        return [before, globalStore.seen];
      });
      [d.support().length, globalStore.seen]",
    )
    .unwrap();
    assert_eq!(v, Value::array(vec![Value::Num(2.), Value::str("outer")]));
  }

  #[test]
  fn nested_enumeration() {
    let v = run(
      "Enumerate(function() {
        var inner = Enumerate(function() { return flip(0.5) });
        var x = sample(inner);
        return x && flip(0.5);
      })",
    )
    .unwrap();
    assert_probs(&v, &[("false", 0.75), ("true", 0.25)]);
  }

  #[test]
  fn enumeration_errors() {
    let err = run("Enumerate(function() { return gaussian(0, 1) })").unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoSupport(_))));
    let err = run("Enumerate(function() { condition(false); return 1 })").unwrap_err();
    assert_eq!(err.downcast_ref::<Error>(), Some(&Error::ZeroProbability));
    let err = run("Infer({method: 'MCMC'}, function() { return flip(0.5) })").unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Options { who: "Infer", .. })));
    let err = run("Enumerate(function() { return 1 }, {samples: 3})").unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Options { who: "Enumerate", .. })));
    let err = run("factor(-1)").unwrap_err();
    assert_eq!(err.downcast_ref::<Error>(), Some(&Error::FactorOutsideInference));
  }

  #[test]
  fn sample_with_factor_from_programs() {
    let v = run(
      "Enumerate(function() {
        return sampleWithFactor(RandomInteger({n: 3}), function(x) { return x === 1 ? 0 : -Infinity });
      })",
    )
    .unwrap();
    assert_probs(&v, &[("1", 1.)]);
  }

  #[test]
  fn cached_functions_run_once_per_argument() {
    let src = "
      globalStore.calls = 0;
      var double = cache(function(x) {
        globalStore.calls = globalStore.calls + 1;
        return x * 2;
      });
      var ys = [double(1), double(2), double(1), double(2), double(1)];
      [ys, globalStore.calls]";
    let v = run_bare(src).unwrap();
    let ys = Value::array([2., 4., 2., 4., 2.].iter().map(|&y| Value::Num(y)).collect());
    assert_eq!(v, Value::array(vec![ys, Value::Num(2.)]));
  }

  #[test]
  fn cache_memoizes_nested_enumeration() {
    let src = "
      globalStore.runs = 0;
      var posterior = cache(function(p) {
        globalStore.runs = globalStore.runs + 1;
        return Enumerate(function() { return flip(p) });
      });
      var first = posterior(0.3);
      var d = Enumerate(function() {
        var a = flip(0.5);
        return sample(posterior(0.3)) && a;
      });
      var again = posterior(0.3);
      [globalStore.runs, Math.exp(again.score(true)), Math.exp(d.score(true))]";
    let v = run(src).unwrap();
    let vs = v.as_array().unwrap();
    assert_eq!(vs[0], Value::Num(1.));
    assert!((vs[1].as_num().unwrap() - 0.3).abs() < 1e-9);
    assert!((vs[2].as_num().unwrap() - 0.15).abs() < 1e-9);
  }

  #[test]
  fn forward_sampling_outside_inference() {
    let v = run("flip(1)").unwrap();
    assert_eq!(v, Value::Bool(true));
    let v = run("var xs = repeat(10, function() { return randomInteger(3) }); filter(function(x) { return x > 2 }, xs)")
      .unwrap();
    assert_eq!(v, Value::array(vec![]));
  }

  /// Hands every choice to a nested enumeration over the same distribution,
  /// then continues with its most likely value.
  struct NestingChooser;

  impl Coroutine for NestingChooser {
    fn name(&self) -> &'static str {
      "nesting-chooser"
    }

    fn sample(
      &self,
      rt: &mut Runtime,
      k: Value,
      a: Address,
      dist: Rc<dyn Distribution>,
      _options: &Value,
    ) -> Result<Step> {
      let choose = Value::cont("choose", move |rt, marginal| {
        let m = marginal.as_dist()?;
        let best = m
          .support()
          .unwrap_or_default()
          .into_iter()
          .max_by(|x, y| m.score(x).total_cmp(&m.score(y)))
          .unwrap_or(Value::Undefined);
        assert_eq!(rt.coroutine().name(), "nesting-chooser");
        Ok(resume(k.clone(), best))
      });
      let d = Value::Dist(dist);
      let thunk = Value::cont("thunk", move |rt, exit| {
        rt.coroutine().sample(rt, exit, Rc::from("_inner"), d.as_dist()?, &Value::Undefined)
      });
      Enumerate::start(rt, choose, a, thunk, EnumerateOptions::default())
    }

    fn factor(&self, _rt: &mut Runtime, k: Value, _a: Address, _score: f64) -> Result<Step> {
      Ok(resume(k, Value::Undefined))
    }
  }

  #[test]
  fn nested_coroutines_restore_the_outer_one() {
    let mut rt = Runtime::new(&Config::default());
    rt.install(Rc::new(NestingChooser));
    let compiled = compile_with("[categorical([0.1, 0.9], ['a', 'b']), flip(0.8)]", &Config::default()).unwrap();
    let v = compiled.run(&mut rt).unwrap();
    assert_eq!(v, Value::array(vec![Value::str("b"), Value::Bool(true)]));
    assert_eq!(rt.coroutine().name(), "nesting-chooser");
    assert_eq!(rt.depth(), 1);
  }

  #[test]
  fn compiled_output_reparses() {
    let compiled = compile_with("var x = flip(0.5); x ? 1 : 2", &Config::default()).unwrap();
    let printed = compiled.to_pretty(80);
    assert_eq!(Program::parse(&printed).unwrap(), compiled.program);
  }

  #[test]
  fn compile_errors_carry_positions() {
    let err = compile_with("var x = ;", &Config::default()).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Parse { line: 1, .. })));
  }
}
