use crate::error::Error;
use crate::lang::{v, Expr, Func, Program, Stmt, Var};

use anyhow::Result;
use std::rc::Rc;

/// Fresh names for one compilation pass: `_k0`, `_result1`, ...
#[derive(Default)]
pub struct Genvar {
  seq: usize,
}

impl Genvar {
  pub fn fresh(&mut self, prefix: &str) -> Var {
    let name = format!("_{}{}", prefix, self.seq);
    self.seq += 1;
    v(name)
  }

  /// A fresh string literal, used as an address fragment.
  pub fn literal(&mut self) -> Expr {
    let lit = format!("_{}", self.seq);
    self.seq += 1;
    Expr::str(lit)
  }
}

/// Calls through a member expression on an identifier (`Math.log(x)`) or with
/// a static property name (`xs.concat(ys)`) are primitive: they run directly
/// and never see a continuation or an address.
pub fn is_primitive(callee: &Expr) -> bool {
  match callee {
    Expr::Member(object, property) => {
      matches!(**object, Expr::EVar(_)) || matches!(**property, Expr::Str(_))
    }
    _ => false,
  }
}

/// Runs `f` on the single function expression a thunkified program consists of.
pub fn in_program(
  pass: &'static str,
  program: &Program,
  f: impl FnOnce(&Rc<Func>) -> Result<Expr>,
) -> Result<Program> {
  match program.body.as_slice() {
    [Stmt::Expr(Expr::Func(func))] => Ok(Program::new(vec![Stmt::Expr(f(func)?)])),
    _ => Err(
      Error::compile(
        pass,
        "expected a program holding one function expression",
        format!("{:?}", program.body.first()),
      )
      .into(),
    ),
  }
}

/// Turns the last expression statement of every path into a return.
pub fn returnify(mut stmts: Vec<Stmt>) -> Vec<Stmt> {
  if let Some(last) = stmts.pop() {
    let last = match last {
      Stmt::Block(body) => Stmt::Block(returnify(body)),
      Stmt::Expr(e) => Stmt::Return(e),
      Stmt::If(test, consequent, alternate) => {
        Stmt::If(test, returnify(consequent), returnify(alternate))
      }
      s @ (Stmt::Empty | Stmt::Return(_) | Stmt::Var(_)) => s,
    };
    stmts.push(last);
  }
  stmts
}

/// Wraps a whole program into a zero-argument function whose value is the
/// program's last expression.
pub fn thunkify(program: &Program) -> Program {
  let body = returnify(program.body.clone());
  Program::new(vec![Stmt::Expr(Expr::func(None, vec![], body))])
}
