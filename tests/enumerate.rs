// Property tests for exact enumeration: every strategy visits every path,
// so marginals are normalized and agree with hand-computed posteriors.

use cpsppl::{run_with, Config, Distribution, Error, Value};
use proptest::prelude::*;

const STRATEGIES: [&str; 3] = ["likelyFirst", "depthFirst", "breadthFirst"];

fn run(src: &str) -> Result<Value, String> {
  let config = Config {
    seed: Some(7),
    ..Config::default()
  };
  run_with(src, &config).map_err(|e| e.to_string())
}

/// `(value, probability)` pairs of a marginal, sorted by printed value.
fn marginal(v: &Value) -> Vec<(String, f64)> {
  let d = v.as_dist().expect("a distribution");
  let mut out: Vec<(String, f64)> = d
    .support()
    .expect("a finite support")
    .iter()
    .map(|x| (x.to_string(), d.score(x).exp()))
    .collect();
  out.sort_by(|a, b| a.0.cmp(&b.0));
  out
}

fn total(m: &[(String, f64)]) -> f64 {
  m.iter().map(|(_, p)| p).sum()
}

fn prob(m: &[(String, f64)], key: &str) -> f64 {
  m.iter().find(|(k, _)| k == key).map(|(_, p)| *p).unwrap_or(0.)
}

// ============================================================================
// Property: marginals sum to one under every strategy
// ============================================================================

proptest! {
  #![proptest_config(ProptestConfig::with_cases(32))]

  #[test]
  fn marginals_are_normalized(
    ps in prop::collection::vec(0.05f64..0.95, 1..=4),
    strategy in 0usize..3,
  ) {
    let flips: Vec<String> = ps.iter().map(|p| format!("(flip({}) ? 1 : 0)", p)).collect();
    let src = format!(
      "Enumerate(function() {{ return {}; }}, {{strategy: '{}'}})",
      flips.join(" + "),
      STRATEGIES[strategy],
    );
    let m = marginal(&run(&src).unwrap());
    prop_assert!((total(&m) - 1.).abs() < 1e-8, "{:?}", m);
    prop_assert!(m.len() <= ps.len() + 1);
  }

  #[test]
  fn strategies_agree(
    weights in prop::collection::vec(0.1f64..5., 2..=5),
    threshold in 0usize..3,
  ) {
    let ws: Vec<String> = weights.iter().map(|w| w.to_string()).collect();
    let model = |strategy: &str| format!(
      "Enumerate(function() {{
        var i = discrete([{}]);
        var j = discrete([{}]);
        condition(i + j >= {});
        return i;
      }}, {{strategy: '{}'}})",
      ws.join(", "),
      ws.join(", "),
      threshold,
      strategy,
    );
    let results: Vec<_> = STRATEGIES.iter().map(|s| marginal(&run(&model(s)).unwrap())).collect();
    for r in &results[1..] {
      prop_assert_eq!(r.len(), results[0].len());
      for ((k, p), (k0, p0)) in r.iter().zip(&results[0]) {
        prop_assert_eq!(k, k0);
        prop_assert!((p - p0).abs() < 1e-9);
      }
    }
  }

  #[test]
  fn conditioned_flip_matches_bayes(p in 0.05f64..0.95, q in 0.05f64..0.95) {
    let src = format!(
      "Enumerate(function() {{
        var x = flip({});
        observe(Bernoulli({{p: x ? {} : 0.5}}), true);
        return x;
      }})",
      p, q,
    );
    let m = marginal(&run(&src).unwrap());
    let expected = p * q / (p * q + (1. - p) * 0.5);
    prop_assert!((prob(&m, "true") - expected).abs() < 1e-9);
  }

  #[test]
  fn budget_bounds_the_support(n in 2usize..8, max in 1usize..6) {
    let src = format!(
      "Enumerate(function() {{ return randomInteger({}); }}, {{maxExecutions: {}, strategy: 'breadthFirst'}})",
      n, max,
    );
    let m = marginal(&run(&src).unwrap());
    prop_assert_eq!(m.len(), n.min(max));
    prop_assert!((total(&m) - 1.).abs() < 1e-8);
  }
}

#[test]
fn truncated_geometric_under_likely_first() {
  let src = "
    Enumerate(function() {
      var x = flip(0.5) ? 0 : geometric() + 1;
      factor(x > 2 ? 0 : -Infinity);
      return x;
    }, {maxExecutions: 10})";
  let m = marginal(&run(src).unwrap());
  let mut values: Vec<(f64, f64)> = m.iter().map(|(k, p)| (k.parse::<f64>().unwrap(), *p)).collect();
  values.sort_by(|a, b| a.0.total_cmp(&b.0));
  assert!(values.len() >= 2, "{:?}", values);
  assert!(values.iter().all(|(x, _)| *x > 2.));
  for pair in values.windows(2) {
    assert_eq!(pair[1].0, pair[0].0 + 1.);
    assert!((pair[1].1 / pair[0].1 - 0.5).abs() < 1e-9);
  }
}

#[test]
fn errors_surface_with_their_kind() {
  let config = Config::default();
  let err = run_with("Enumerate(function() { return uniform(0, 1) })", &config).unwrap_err();
  assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoSupport(_))));
  let err = run_with("Enumerate(function() { condition(false) })", &config).unwrap_err();
  assert_eq!(err.downcast_ref::<Error>(), Some(&Error::ZeroProbability));
  let err = run_with("Enumerate(function() { return 1 }, {strategy: 'random'})", &config).unwrap_err();
  assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Options { .. })));
}
