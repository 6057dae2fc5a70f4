use crate::dist::Distribution;
use crate::error::Error;
use crate::util::logaddexp;
use crate::value::Value;

use indexmap::IndexMap;
use rand::{Rng, RngCore};

/// Accumulates log-mass per distinct return value.
#[derive(Debug, Default)]
pub struct ScoreAggregator {
  dist: IndexMap<String, (Value, f64)>,
}

impl ScoreAggregator {
  /// Zero-probability exits contribute nothing.
  pub fn add(&mut self, value: Value, score: f64) {
    if score == f64::NEG_INFINITY || score.is_nan() {
      return;
    }
    let entry = self.dist.entry(value.to_string()).or_insert((value, f64::NEG_INFINITY));
    entry.1 = logaddexp(entry.1, score);
  }

  pub fn len(&self) -> usize {
    self.dist.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dist.is_empty()
  }

  pub fn to_marginal(&self) -> Result<Marginal, Error> {
    if self.dist.is_empty() {
      return Err(Error::ZeroProbability);
    }
    let norm = self.dist.values().fold(f64::NEG_INFINITY, |acc, (_, s)| logaddexp(acc, *s));
    let entries = self
      .dist
      .iter()
      .map(|(k, (v, s))| (k.clone(), (v.clone(), (s - norm).exp())))
      .collect();
    Ok(Marginal { entries })
  }
}

/// A normalized distribution over the values inference observed, in the
/// order they were first seen.
#[derive(Debug, Clone)]
pub struct Marginal {
  entries: IndexMap<String, (Value, f64)>,
}

impl Marginal {
  pub fn prob(&self, v: &Value) -> f64 {
    self.entries.get(&v.to_string()).map(|(_, p)| *p).unwrap_or(0.)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Value, f64)> {
    self.entries.values().map(|(v, p)| (v, *p))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn total(&self) -> f64 {
    self.entries.values().map(|(_, p)| p).sum()
  }
}

impl Distribution for Marginal {
  fn name(&self) -> &'static str {
    "Marginal"
  }

  fn sample(&self, rng: &mut dyn RngCore) -> Value {
    let u: f64 = rng.gen();
    let mut acc = 0.;
    for (v, p) in self.iter() {
      acc += p;
      if u < acc {
        return v.clone();
      }
    }
    self.entries.values().last().map(|(v, _)| v.clone()).unwrap_or(Value::Undefined)
  }

  fn score(&self, v: &Value) -> f64 {
    self.prob(v).ln()
  }

  fn support(&self) -> Option<Vec<Value>> {
    Some(self.iter().map(|(v, _)| v.clone()).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn merges_duplicates_and_normalizes() {
    let mut agg = ScoreAggregator::default();
    agg.add(Value::Num(1.), 0.25f64.ln());
    agg.add(Value::Num(2.), 0.25f64.ln());
    agg.add(Value::Num(1.), 0.5f64.ln());
    agg.add(Value::Num(3.), f64::NEG_INFINITY);
    assert_eq!(agg.len(), 2);
    let m = agg.to_marginal().unwrap();
    assert!((m.prob(&Value::Num(1.)) - 0.75).abs() < 1e-12);
    assert!((m.prob(&Value::Num(2.)) - 0.25).abs() < 1e-12);
    assert_eq!(m.prob(&Value::Num(3.)), 0.);
    assert!((m.total() - 1.).abs() < 1e-12);
    assert_eq!(m.support().unwrap(), vec![Value::Num(1.), Value::Num(2.)]);
  }

  #[test]
  fn unnormalized_scores() {
    let mut agg = ScoreAggregator::default();
    agg.add(Value::str("a"), -1000.);
    agg.add(Value::str("b"), -1000.);
    let m = agg.to_marginal().unwrap();
    assert!((m.prob(&Value::str("a")) - 0.5).abs() < 1e-12);
  }

  #[test]
  fn empty_is_zero_probability() {
    let agg = ScoreAggregator::default();
    assert_eq!(agg.to_marginal().unwrap_err(), Error::ZeroProbability);
  }

  #[test]
  fn keys_distinguish_types() {
    let mut agg = ScoreAggregator::default();
    agg.add(Value::Num(1.), 0.);
    agg.add(Value::str("1"), 0.);
    assert_eq!(agg.len(), 2);
  }
}
