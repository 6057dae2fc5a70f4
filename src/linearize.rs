use crate::lang::Stmt;

pub fn has_return(s: &Stmt) -> bool {
  match s {
    Stmt::Return(_) => true,
    Stmt::Block(body) => body.iter().any(has_return),
    Stmt::If(_, consequent, alternate) => {
      consequent.iter().any(has_return) || alternate.iter().any(has_return)
    }
    Stmt::Empty | Stmt::Expr(_) | Stmt::Var(_) => false,
  }
}

/// Flattens blocks and pushes the statements following a returning `if` into
/// both of its arms, so that every path through the result ends exactly once.
/// A `return e` becomes the expression statement `e`; whatever follows it on
/// the same path is dropped.
pub fn linearize(stmts: Vec<Stmt>) -> Vec<Stmt> {
  linearize_onto(stmts, Vec::new())
}

fn linearize_onto(stmts: Vec<Stmt>, ks: Vec<Stmt>) -> Vec<Stmt> {
  stmts.into_iter().rev().fold(ks, |mut ks, s| match s {
    Stmt::Block(body) => linearize_onto(body, ks),
    Stmt::If(test, consequent, alternate)
      if consequent.iter().any(has_return) || alternate.iter().any(has_return) =>
    {
      let consequent = linearize_onto(consequent, ks.clone());
      let alternate = linearize_onto(alternate, ks);
      vec![Stmt::If(test, consequent, alternate)]
    }
    Stmt::Return(e) => vec![Stmt::Expr(e)],
    s @ (Stmt::Empty | Stmt::Expr(_) | Stmt::Var(_) | Stmt::If(..)) => {
      ks.insert(0, s);
      ks
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lang::{Expr, Program};
  use crate::parse::Parse;

  fn body(src: &str) -> Vec<Stmt> {
    Program::parse(src).unwrap().body
  }

  #[test]
  fn flat_input_is_unchanged() {
    let stmts = body("var x = f(1); g(x); ; if (x) { h() } else { k() } x");
    assert_eq!(linearize(stmts.clone()), stmts);
    assert_eq!(linearize(linearize(stmts.clone())), stmts);
  }

  #[test]
  fn blocks_are_inlined() {
    assert_eq!(linearize(body("{ a(); { b() } } c()")), body("a(); b(); c()"));
  }

  #[test]
  fn returning_branches_absorb_the_rest() {
    let out = linearize(body("if (c) { return 1; } else { return 2; } x();"));
    assert_eq!(
      out,
      vec![Stmt::If(
        Box::new(Expr::var("c")),
        vec![Stmt::Expr(Expr::Num(1.))],
        vec![Stmt::Expr(Expr::Num(2.))]
      )]
    );

    let out = linearize(body("if (c) { return 1 } x(); y()"));
    assert_eq!(
      out,
      vec![Stmt::If(
        Box::new(Expr::var("c")),
        vec![Stmt::Expr(Expr::Num(1.))],
        body("x(); y()")
      )]
    );
  }

  #[test]
  fn statements_after_return_are_dropped() {
    assert_eq!(linearize(body("a(); return b(); c()")), body("a(); b()"));
  }

  #[test]
  fn nested_returns() {
    let out = linearize(body("if (a) { if (b) { return 1 } 2 } 3"));
    let expected = body("if (a) { if (b) { 1 } else { 2; 3 } } else { 3 }");
    assert_eq!(out, expected);
  }
}
