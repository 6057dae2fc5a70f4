use crate::error::Error;
use crate::runtime::Runtime;
use crate::value::Value;

use anyhow::Result;
use log::trace;
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub type Thunk = Box<dyn FnOnce(&mut Runtime) -> Result<Step>>;

/// One unit of CPS work: either more work, or the final value.
pub enum Step {
  Bounce(Thunk),
  Done(Value),
}

impl Step {
  pub fn bounce(f: impl FnOnce(&mut Runtime) -> Result<Step> + 'static) -> Step {
    Step::Bounce(Box::new(f))
  }
}

/// Runs steps until one is `Done`. The native stack stays flat however long
/// the chain of tail calls is.
pub fn run(rt: &mut Runtime, mut step: Step) -> Result<Value> {
  loop {
    match step {
      Step::Done(v) => return Ok(v),
      Step::Bounce(thunk) => step = thunk(rt)?,
    }
  }
}

/// A shared flag that abandons a sliced run at its next slice boundary.
#[derive(Clone, Default)]
pub struct Cancel(Rc<Cell<bool>>);

impl Cancel {
  pub fn cancel(&self) {
    self.0.set(true);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.get()
  }
}

pub enum Slice {
  Yield,
  Done(Value),
  Cancelled,
}

/// How many steps run between two clock reads.
const STEPS_PER_CHECK: usize = 256;

/// A resumable run that gives control back every `budget`.
pub struct Trampoline {
  step: Option<Step>,
  cancel: Cancel,
  steps: usize,
}

impl Trampoline {
  pub fn new(step: Step) -> Self {
    Trampoline {
      step: Some(step),
      cancel: Cancel::default(),
      steps: 0,
    }
  }

  pub fn cancel_handle(&self) -> Cancel {
    self.cancel.clone()
  }

  pub fn steps(&self) -> usize {
    self.steps
  }

  /// Runs until the program finishes or the budget elapses. A cancelled or
  /// already finished trampoline reports `Cancelled`.
  pub fn run_slice(&mut self, rt: &mut Runtime, budget: Duration) -> Result<Slice> {
    if self.cancel.is_cancelled() {
      self.step = None;
      return Ok(Slice::Cancelled);
    }
    let mut step = match self.step.take() {
      Some(step) => step,
      None => return Ok(Slice::Cancelled),
    };
    let deadline = Instant::now() + budget;
    let mut n = 0;
    loop {
      match step {
        Step::Done(v) => return Ok(Slice::Done(v)),
        Step::Bounce(thunk) => step = thunk(rt)?,
      }
      n += 1;
      self.steps += 1;
      if n % STEPS_PER_CHECK == 0 && Instant::now() >= deadline {
        trace!("yielding after {} steps", n);
        self.step = Some(step);
        return Ok(Slice::Yield);
      }
    }
  }
}

/// Drives `trampoline` slice by slice, calling `on_yield` between slices. The
/// hook stands in for the host event loop and may cancel the run.
pub fn run_sliced(
  rt: &mut Runtime,
  mut trampoline: Trampoline,
  budget: Duration,
  mut on_yield: impl FnMut(&Cancel),
) -> Result<Value> {
  let cancel = trampoline.cancel_handle();
  loop {
    match trampoline.run_slice(rt, budget)? {
      Slice::Done(v) => return Ok(v),
      Slice::Cancelled => return Err(Error::Cancelled.into()),
      Slice::Yield => on_yield(&cancel),
    }
  }
}
