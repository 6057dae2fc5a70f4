use crate::error::Error;
use crate::value::Value;

use anyhow::Result;
use rand::{Rng, RngCore};
use rand_distr::{Distribution as Sampler, Normal};
use std::f64::consts::PI;
use std::fmt;

/// The capability inference engines consume. `support` is required for
/// enumeration; continuous distributions have none.
pub trait Distribution: fmt::Debug {
  fn name(&self) -> &'static str;

  fn sample(&self, rng: &mut dyn RngCore) -> Value;

  /// Log-probability (or log-density) of `v`; `-Infinity` outside the support.
  fn score(&self, v: &Value) -> f64;

  fn support(&self) -> Option<Vec<Value>> {
    None
  }

  fn is_continuous(&self) -> bool {
    false
  }
}

fn param(params: &Value, who: &str, key: &str) -> Result<f64> {
  match params.get(key) {
    Value::Num(n) => Ok(n),
    v => Err(Error::ty(format!("{}: parameter {} must be a number, got {}", who, key, v)).into()),
  }
}

fn probability(params: &Value, who: &str, key: &str) -> Result<f64> {
  let p = param(params, who, key)?;
  if (0. ..=1.).contains(&p) {
    Ok(p)
  } else {
    Err(Error::ty(format!("{}: {} must lie in [0, 1], got {}", who, key, p)).into())
  }
}

fn count(params: &Value, who: &str, key: &str) -> Result<usize> {
  let n = param(params, who, key)?;
  if n >= 0. && n.fract() == 0. && n.is_finite() {
    Ok(n as usize)
  } else {
    Err(Error::ty(format!("{}: {} must be a non-negative integer, got {}", who, key, n)).into())
  }
}

fn weights(params: &Value, who: &str) -> Result<Vec<f64>> {
  let ps = params
    .get("ps")
    .as_array()?
    .iter()
    .map(|p| p.as_num())
    .collect::<Result<Vec<_>>>()?;
  let total: f64 = ps.iter().sum();
  if ps.iter().any(|p| *p < 0. || !p.is_finite()) || total <= 0. {
    return Err(Error::ty(format!("{}: ps must be non-negative with a positive sum", who)).into());
  }
  Ok(ps.into_iter().map(|p| p / total).collect())
}

fn index(v: &Value, n: usize) -> Option<usize> {
  match v {
    Value::Num(k) if *k >= 0. && k.fract() == 0. && (*k as usize) < n => Some(*k as usize),
    _ => None,
  }
}

/// Draws an index from normalized weights.
fn draw(ps: &[f64], rng: &mut dyn RngCore) -> usize {
  let u: f64 = rng.gen();
  let mut acc = 0.;
  for (i, p) in ps.iter().enumerate() {
    acc += p;
    if u < acc {
      return i;
    }
  }
  ps.len().saturating_sub(1)
}

fn ln_factorial(n: usize) -> f64 {
  (2..=n).map(|i| (i as f64).ln()).sum()
}

#[derive(Debug, Clone)]
pub struct Bernoulli {
  pub p: f64,
}

impl Bernoulli {
  pub fn from_params(params: &Value) -> Result<Self> {
    Ok(Bernoulli {
      p: probability(params, "Bernoulli", "p")?,
    })
  }
}

impl Distribution for Bernoulli {
  fn name(&self) -> &'static str {
    "Bernoulli"
  }

  fn sample(&self, rng: &mut dyn RngCore) -> Value {
    Value::Bool(rng.gen::<f64>() < self.p)
  }

  fn score(&self, v: &Value) -> f64 {
    match v {
      Value::Bool(true) => self.p.ln(),
      Value::Bool(false) => (1. - self.p).ln(),
      _ => f64::NEG_INFINITY,
    }
  }

  fn support(&self) -> Option<Vec<Value>> {
    Some(vec![Value::Bool(true), Value::Bool(false)])
  }
}

#[derive(Debug, Clone)]
pub struct RandomInteger {
  pub n: usize,
}

impl RandomInteger {
  pub fn from_params(params: &Value) -> Result<Self> {
    Ok(RandomInteger {
      n: count(params, "RandomInteger", "n")?,
    })
  }
}

impl Distribution for RandomInteger {
  fn name(&self) -> &'static str {
    "RandomInteger"
  }

  fn sample(&self, rng: &mut dyn RngCore) -> Value {
    Value::Num(rng.gen_range(0..self.n.max(1)) as f64)
  }

  fn score(&self, v: &Value) -> f64 {
    match index(v, self.n) {
      Some(_) => -(self.n as f64).ln(),
      None => f64::NEG_INFINITY,
    }
  }

  fn support(&self) -> Option<Vec<Value>> {
    Some((0..self.n).map(|i| Value::Num(i as f64)).collect())
  }
}

/// Weighted choice among arbitrary values. Repeated values pool their mass.
#[derive(Debug, Clone)]
pub struct Categorical {
  pub ps: Vec<f64>,
  pub vs: Vec<Value>,
}

impl Categorical {
  pub fn from_params(params: &Value) -> Result<Self> {
    let ps = weights(params, "Categorical")?;
    let vs = params.get("vs").as_array()?.to_vec();
    if ps.len() != vs.len() {
      return Err(Error::ty("Categorical: ps and vs must have the same length").into());
    }
    Ok(Categorical { ps, vs })
  }
}

impl Distribution for Categorical {
  fn name(&self) -> &'static str {
    "Categorical"
  }

  fn sample(&self, rng: &mut dyn RngCore) -> Value {
    self.vs[draw(&self.ps, rng)].clone()
  }

  fn score(&self, v: &Value) -> f64 {
    let p: f64 = self
      .vs
      .iter()
      .zip(&self.ps)
      .filter(|(w, _)| *w == v)
      .map(|(_, p)| p)
      .sum();
    p.ln()
  }

  fn support(&self) -> Option<Vec<Value>> {
    let mut support: Vec<Value> = Vec::new();
    for (v, p) in self.vs.iter().zip(&self.ps) {
      if *p > 0. && !support.contains(v) {
        support.push(v.clone());
      }
    }
    Some(support)
  }
}

/// Weighted choice among the indices `0..ps.len()`.
#[derive(Debug, Clone)]
pub struct Discrete {
  pub ps: Vec<f64>,
}

impl Discrete {
  pub fn from_params(params: &Value) -> Result<Self> {
    Ok(Discrete {
      ps: weights(params, "Discrete")?,
    })
  }
}

impl Distribution for Discrete {
  fn name(&self) -> &'static str {
    "Discrete"
  }

  fn sample(&self, rng: &mut dyn RngCore) -> Value {
    Value::Num(draw(&self.ps, rng) as f64)
  }

  fn score(&self, v: &Value) -> f64 {
    match index(v, self.ps.len()) {
      Some(i) => self.ps[i].ln(),
      None => f64::NEG_INFINITY,
    }
  }

  fn support(&self) -> Option<Vec<Value>> {
    Some(
      self
        .ps
        .iter()
        .enumerate()
        .filter(|(_, p)| **p > 0.)
        .map(|(i, _)| Value::Num(i as f64))
        .collect(),
    )
  }
}

#[derive(Debug, Clone)]
pub struct Binomial {
  pub p: f64,
  pub n: usize,
}

impl Binomial {
  pub fn from_params(params: &Value) -> Result<Self> {
    Ok(Binomial {
      p: probability(params, "Binomial", "p")?,
      n: count(params, "Binomial", "n")?,
    })
  }
}

impl Distribution for Binomial {
  fn name(&self) -> &'static str {
    "Binomial"
  }

  fn sample(&self, rng: &mut dyn RngCore) -> Value {
    let k = (0..self.n).filter(|_| rng.gen::<f64>() < self.p).count();
    Value::Num(k as f64)
  }

  fn score(&self, v: &Value) -> f64 {
    let k = match index(v, self.n + 1) {
      Some(k) => k,
      None => return f64::NEG_INFINITY,
    };
    let choose = ln_factorial(self.n) - ln_factorial(k) - ln_factorial(self.n - k);
    // 0 * ln(0) counts as 0 at the edges of the support.
    let term = |count: usize, p: f64| if count == 0 { 0. } else { count as f64 * p.ln() };
    choose + term(k, self.p) + term(self.n - k, 1. - self.p)
  }

  fn support(&self) -> Option<Vec<Value>> {
    Some((0..=self.n).map(|k| Value::Num(k as f64)).collect())
  }
}

/// All mass on a single value.
#[derive(Debug, Clone)]
pub struct Delta {
  pub v: Value,
}

impl Distribution for Delta {
  fn name(&self) -> &'static str {
    "Delta"
  }

  fn sample(&self, _rng: &mut dyn RngCore) -> Value {
    self.v.clone()
  }

  fn score(&self, v: &Value) -> f64 {
    if *v == self.v {
      0.
    } else {
      f64::NEG_INFINITY
    }
  }

  fn support(&self) -> Option<Vec<Value>> {
    Some(vec![self.v.clone()])
  }
}

#[derive(Debug, Clone)]
pub struct Uniform {
  pub a: f64,
  pub b: f64,
}

impl Uniform {
  pub fn from_params(params: &Value) -> Result<Self> {
    let (a, b) = (param(params, "Uniform", "a")?, param(params, "Uniform", "b")?);
    if a < b {
      Ok(Uniform { a, b })
    } else {
      Err(Error::ty(format!("Uniform: expected a < b, got a = {}, b = {}", a, b)).into())
    }
  }
}

impl Distribution for Uniform {
  fn name(&self) -> &'static str {
    "Uniform"
  }

  fn sample(&self, rng: &mut dyn RngCore) -> Value {
    Value::Num(self.a + (self.b - self.a) * rng.gen::<f64>())
  }

  fn score(&self, v: &Value) -> f64 {
    match v {
      Value::Num(x) if *x >= self.a && *x <= self.b => -(self.b - self.a).ln(),
      _ => f64::NEG_INFINITY,
    }
  }

  fn is_continuous(&self) -> bool {
    true
  }
}

#[derive(Debug, Clone)]
pub struct Gaussian {
  pub mu: f64,
  pub sigma: f64,
}

impl Gaussian {
  pub fn from_params(params: &Value) -> Result<Self> {
    let (mu, sigma) = (param(params, "Gaussian", "mu")?, param(params, "Gaussian", "sigma")?);
    if sigma > 0. {
      Ok(Gaussian { mu, sigma })
    } else {
      Err(Error::ty(format!("Gaussian: sigma must be positive, got {}", sigma)).into())
    }
  }
}

impl Distribution for Gaussian {
  fn name(&self) -> &'static str {
    "Gaussian"
  }

  fn sample(&self, rng: &mut dyn RngCore) -> Value {
    match Normal::new(self.mu, self.sigma) {
      Ok(normal) => Value::Num(normal.sample(rng)),
      Err(_) => Value::Num(f64::NAN),
    }
  }

  fn score(&self, v: &Value) -> f64 {
    match v {
      Value::Num(x) => {
        let z = (x - self.mu) / self.sigma;
        -0.5 * z * z - self.sigma.ln() - 0.5 * (2. * PI).ln()
      }
      _ => f64::NEG_INFINITY,
    }
  }

  fn is_continuous(&self) -> bool {
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use maplit::btreemap;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn params(kvs: Vec<(&str, Value)>) -> Value {
    Value::object(kvs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
  }

  fn total(d: &dyn Distribution) -> f64 {
    d.support().unwrap().iter().map(|v| d.score(v).exp()).sum()
  }

  #[test]
  fn discrete_supports_sum_to_one() {
    let ds: Vec<Box<dyn Distribution>> = vec![
      Box::new(Bernoulli { p: 0.3 }),
      Box::new(RandomInteger { n: 7 }),
      Box::new(Discrete { ps: vec![0.2, 0.0, 0.8] }),
      Box::new(Binomial { p: 0.25, n: 6 }),
      Box::new(Categorical {
        ps: vec![0.5, 0.25, 0.25],
        vs: vec![Value::str("a"), Value::str("b"), Value::str("a")],
      }),
    ];
    for d in ds {
      assert!((total(&*d) - 1.).abs() < 1e-12, "{:?}", d);
    }
  }

  #[test]
  fn categorical_pools_repeated_values() {
    let d = Categorical {
      ps: vec![0.5, 0.25, 0.25],
      vs: vec![Value::str("a"), Value::str("b"), Value::str("a")],
    };
    assert_eq!(d.support().unwrap(), vec![Value::str("a"), Value::str("b")]);
    assert!((d.score(&Value::str("a")) - 0.75f64.ln()).abs() < 1e-12);
    assert_eq!(d.score(&Value::str("c")), f64::NEG_INFINITY);
  }

  #[test]
  fn binomial_edges() {
    let d = Binomial { p: 1., n: 3 };
    assert_eq!(d.score(&Value::Num(3.)), 0.);
    assert_eq!(d.score(&Value::Num(2.)), f64::NEG_INFINITY);
    assert_eq!(d.score(&Value::Num(4.)), f64::NEG_INFINITY);
  }

  #[test]
  fn continuous_distributions_have_no_support() {
    let g = Gaussian { mu: 0., sigma: 1. };
    assert!(g.is_continuous() && g.support().is_none());
    assert!((g.score(&Value::Num(0.)) + 0.5 * (2. * PI).ln()).abs() < 1e-12);
    let u = Uniform { a: 0., b: 4. };
    assert!(u.is_continuous());
    assert!((u.score(&Value::Num(1.)) + 4f64.ln()).abs() < 1e-12);
    assert_eq!(u.score(&Value::Num(5.)), f64::NEG_INFINITY);
  }

  #[test]
  fn constructors_validate() {
    assert!(Bernoulli::from_params(&params(vec![("p", Value::Num(0.5))])).is_ok());
    assert!(Bernoulli::from_params(&params(vec![("p", Value::Num(1.5))])).is_err());
    assert!(Bernoulli::from_params(&params(vec![])).is_err());
    assert!(RandomInteger::from_params(&params(vec![("n", Value::Num(2.5))])).is_err());
    assert!(Gaussian::from_params(&params(vec![("mu", Value::Num(0.)), ("sigma", Value::Num(0.))])).is_err());
    let ps = Value::array(vec![Value::Num(1.), Value::Num(3.)]);
    let d = Discrete::from_params(&Value::object(btreemap! { "ps".to_string() => ps })).unwrap();
    assert_eq!(d.ps, vec![0.25, 0.75]);
  }

  #[test]
  fn samples_lie_in_support() {
    let mut rng = StdRng::seed_from_u64(7);
    let d = Binomial { p: 0.5, n: 4 };
    let support = d.support().unwrap();
    for _ in 0..100 {
      assert!(support.contains(&d.sample(&mut rng)));
    }
    let u = Uniform { a: 2., b: 3. };
    for _ in 0..100 {
      assert!(u.score(&u.sample(&mut rng)).is_finite());
    }
  }
}
