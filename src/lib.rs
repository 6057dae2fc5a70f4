mod aggregate;
mod builtins;
mod compile;
mod config;
mod coroutine;
mod cps;
mod dist;
mod enumerate;
mod error;
mod eval;
mod infer;
mod lang;
mod linearize;
mod naming;
mod parse;
mod print;
mod queue;
mod runtime;
mod store;
mod syntax;
mod trampoline;
mod util;
mod value;
mod visit;

pub use aggregate::{Marginal, ScoreAggregator};
pub use compile::{compile_program, compile_with, Compiled};
pub use config::Config;
pub use coroutine::{extend, Address, Coroutine, TopLevel};
pub use cps::{is_atomic, Cps};
pub use dist::{Bernoulli, Binomial, Categorical, Delta, Discrete, Distribution, Gaussian, RandomInteger, Uniform};
pub use enumerate::Enumerate;
pub use error::Error;
pub use eval::{apply, resume};
pub use infer::EnumerateOptions;
pub use lang::{BinOp, Expr, Func, LogicalOp, Program, Stmt, UnOp, Var};
pub use linearize::linearize;
pub use naming::Naming;
pub use parse::Parse;
pub use queue::{Entry, Frontier, Strategy};
pub use runtime::Runtime;
pub use store::Store;
pub use trampoline::{run_sliced, Cancel, Slice, Step, Trampoline};
pub use value::{Env, Native, Value};

use anyhow::Result;

/// Compiles `src` with the prelude.
pub fn compile(src: &str) -> Result<Compiled> {
  compile_with(src, &Config::default())
}

/// Compiles and runs `src` to completion.
pub fn run(src: &str) -> Result<Value> {
  run_with(src, &Config::default())
}

pub fn run_with(src: &str, config: &Config) -> Result<Value> {
  let compiled = compile_with(src, config)?;
  let mut rt = Runtime::new(config);
  compiled.run(&mut rt)
}
