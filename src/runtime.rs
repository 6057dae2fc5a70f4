use crate::builtins;
use crate::config::Config;
use crate::coroutine::{Coroutine, TopLevel};
use crate::store::Store;
use crate::trampoline::{self, Step};
use crate::value::{Env, Value};

use anyhow::Result;
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::rc::Rc;

/// Everything a running program can reach besides its own bindings: the
/// coroutine stack, the store and the random source.
pub struct Runtime {
  top: Rc<dyn Coroutine>,
  installed: Vec<Rc<dyn Coroutine>>,
  pub store: Store,
  pub rng: StdRng,
  globals: Rc<Env>,
}

impl Runtime {
  pub fn new(config: &Config) -> Self {
    let rng = match config.seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };
    Runtime {
      top: Rc::new(TopLevel),
      installed: Vec::new(),
      store: Store::default(),
      rng,
      globals: builtins::globals(),
    }
  }

  pub fn globals(&self) -> &Rc<Env> {
    &self.globals
  }

  /// The coroutine that currently intercepts `sample` and `factor`.
  pub fn coroutine(&self) -> Rc<dyn Coroutine> {
    self.installed.last().cloned().unwrap_or_else(|| self.top.clone())
  }

  pub fn install(&mut self, c: Rc<dyn Coroutine>) {
    debug!("install {} at depth {}", c.name(), self.installed.len() + 1);
    self.installed.push(c);
  }

  /// Removes the innermost installed coroutine. The top-level one stays.
  pub fn uninstall(&mut self) -> Option<Rc<dyn Coroutine>> {
    let c = self.installed.pop();
    if let Some(c) = &c {
      debug!("uninstall {} at depth {}", c.name(), self.installed.len() + 1);
    }
    c
  }

  /// Number of coroutines installed above the top-level one.
  pub fn depth(&self) -> usize {
    self.installed.len()
  }

  /// Trampolines `step` to completion. On failure, coroutines installed
  /// during the run are dropped so the runtime can be reused.
  pub fn run(&mut self, step: Step) -> Result<Value> {
    let depth = self.depth();
    let result = trampoline::run(self, step);
    if result.is_err() {
      self.installed.truncate(depth);
    }
    result
  }
}
