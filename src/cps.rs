use crate::error::Error;
use crate::lang::{Expr, Func, LogicalOp, Program, Stmt};
use crate::linearize::linearize;
use crate::syntax::{in_program, is_primitive, Genvar};
use crate::visit::{Folder, Visitor};

use anyhow::Result;
use std::fmt;
use std::iter;

/// A meta-level continuation: builds the rest of the output once the atomic
/// form of an expression (or list of expressions) is known.
type MetaK<T> = Box<dyn FnOnce(&mut Cps, T) -> Expr>;

fn meta<T>(f: impl FnOnce(&mut Cps, T) -> Expr + 'static) -> MetaK<T> {
  Box::new(f)
}

fn call_k(k: Expr, value: Expr) -> Expr {
  Expr::call(k, vec![value])
}

/// Atomic expressions contain no suspension point and can be evaluated in
/// place, without handing control to a continuation.
pub fn is_atomic(e: &Expr) -> bool {
  match e {
    Expr::Num(_)
    | Expr::Str(_)
    | Expr::Bool(_)
    | Expr::Null
    | Expr::Undefined
    | Expr::EVar(_)
    | Expr::Func(_) => true,
    Expr::Array(es) => es.iter().all(is_atomic),
    Expr::Object(props) => props.iter().all(|(_, e)| is_atomic(e)),
    Expr::Unary(_, e) => is_atomic(e),
    Expr::Bin(e1, e2, _) | Expr::Logical(e1, e2, _) | Expr::Member(e1, e2) | Expr::Assign(e1, e2) => {
      is_atomic(e1) && is_atomic(e2)
    }
    Expr::Cond(t, c, a) => is_atomic(t) && is_atomic(c) && is_atomic(a),
    Expr::App(callee, args) => is_primitive(callee) && is_atomic(callee) && args.iter().all(is_atomic),
  }
}

/// The continuation-passing transform. Runs after naming, so functions
/// already carry their address parameter; this pass prepends the
/// continuation parameter in front of it.
#[derive(Default)]
pub struct Cps {
  gen: Genvar,
}

impl Cps {
  pub fn run(program: &Program) -> Result<Program> {
    in_program("cps", program, |f| Ok(Cps::default().cps_function(f)))
  }

  pub fn cps_function(&mut self, f: &Func) -> Expr {
    let k = self.gen.fresh("k");
    let body = self.cps_sequence(linearize(f.body.clone()), Expr::EVar(k));
    let params = iter::once(k).chain(f.params.iter().copied()).collect();
    Expr::func(f.name, params, vec![Stmt::Expr(body)])
  }

  /// Names `k` when it is not already a variable, so that duplicating it into
  /// both arms of a conditional does not duplicate code.
  fn bind_continuation(&mut self, k: Expr, meta_k: MetaK<Expr>) -> Expr {
    match k {
      Expr::EVar(_) => meta_k(self, k),
      k => {
        let k0 = self.gen.fresh("k");
        let body = meta_k(self, Expr::EVar(k0));
        Expr::call(Expr::lambda(vec![k0], body), vec![k])
      }
    }
  }

  /// Function literals can hide inside atomic expressions; convert them too.
  fn atomic(&mut self, e: &Expr) -> Expr {
    self.fold(e)
  }

  fn atomize(&mut self, e: Expr, meta_k: MetaK<Expr>) -> Expr {
    if is_atomic(&e) {
      let e = self.atomic(&e);
      return meta_k(self, e);
    }
    match e {
      Expr::Array(es) => self.atomize_star(es, meta(move |c, es| meta_k(c, Expr::Array(es)))),
      Expr::Object(props) => {
        let (keys, values): (Vec<_>, Vec<_>) = props.into_iter().unzip();
        self.atomize_star(
          values,
          meta(move |c, values: Vec<Expr>| meta_k(c, Expr::Object(keys.into_iter().zip(values).collect()))),
        )
      }
      Expr::Unary(op, e) => self.atomize(*e, meta(move |c, e| meta_k(c, Expr::Unary(op, Box::new(e))))),
      Expr::Member(object, property) => self.atomize(
        *object,
        meta(move |c, object| {
          c.atomize(
            *property,
            meta(move |c, property| meta_k(c, Expr::Member(Box::new(object), Box::new(property)))),
          )
        }),
      ),
      e => {
        let x = self.gen.fresh("result");
        let body = meta_k(self, Expr::EVar(x));
        self.cps(e, Expr::lambda(vec![x], body))
      }
    }
  }

  fn atomize_star(&mut self, es: Vec<Expr>, meta_k: MetaK<Vec<Expr>>) -> Expr {
    self.atomize_from(Vec::with_capacity(es.len()), es.into_iter(), meta_k)
  }

  fn atomize_from(
    &mut self,
    mut done: Vec<Expr>,
    mut rest: std::vec::IntoIter<Expr>,
    meta_k: MetaK<Vec<Expr>>,
  ) -> Expr {
    match rest.next() {
      None => meta_k(self, done),
      Some(e) => self.atomize(
        e,
        meta(move |c, e| {
          done.push(e);
          c.atomize_from(done, rest, meta_k)
        }),
      ),
    }
  }

  /// Translates `e` so that its value is passed to the atomic continuation `k`.
  pub fn cps(&mut self, e: Expr, k: Expr) -> Expr {
    match e {
      e @ (Expr::Num(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null | Expr::Undefined | Expr::EVar(_)) => {
        call_k(k, e)
      }
      Expr::Func(f) => {
        let f = self.cps_function(&f);
        call_k(k, f)
      }
      Expr::Array(es) => self.atomize_star(es, meta(move |_, es| call_k(k, Expr::Array(es)))),
      Expr::Object(props) => {
        let (keys, values): (Vec<_>, Vec<_>) = props.into_iter().unzip();
        self.atomize_star(
          values,
          meta(move |_, values: Vec<Expr>| call_k(k, Expr::Object(keys.into_iter().zip(values).collect()))),
        )
      }
      Expr::Unary(op, e) => self.atomize(*e, meta(move |_, e| call_k(k, Expr::Unary(op, Box::new(e))))),
      Expr::Bin(left, right, op) => self.atomize(
        *left,
        meta(move |c, left| {
          c.atomize(
            *right,
            meta(move |_, right| call_k(k, Expr::Bin(Box::new(left), Box::new(right), op))),
          )
        }),
      ),
      Expr::Assign(target, value) => self.atomize(
        *target,
        meta(move |c, target| {
          c.atomize(
            *value,
            meta(move |_, value| call_k(k, Expr::Assign(Box::new(target), Box::new(value)))),
          )
        }),
      ),
      Expr::Member(object, property) => self.atomize(
        *object,
        meta(move |c, object| {
          c.atomize(
            *property,
            meta(move |_, property| call_k(k, Expr::Member(Box::new(object), Box::new(property)))),
          )
        }),
      ),
      Expr::App(callee, args) if is_primitive(&callee) => self.atomize(
        *callee,
        meta(move |c, callee| {
          c.atomize_star(args, meta(move |_, args| call_k(k, Expr::call(callee, args))))
        }),
      ),
      Expr::App(callee, args) => self.atomize(
        *callee,
        meta(move |c, callee| {
          c.atomize_star(
            args,
            meta(move |_, args: Vec<Expr>| {
              Expr::call(callee, iter::once(k).chain(args).collect())
            }),
          )
        }),
      ),
      Expr::Cond(test, consequent, alternate) => self.bind_continuation(
        k,
        meta(move |c, k: Expr| {
          c.atomize(
            *test,
            meta(move |c, test| {
              let consequent = c.cps(*consequent, k.clone());
              let alternate = c.cps(*alternate, k);
              Expr::cond(test, consequent, alternate)
            }),
          )
        }),
      ),
      Expr::Logical(left, right, op) => self.bind_continuation(
        k,
        meta(move |c, k: Expr| {
          c.atomize(
            *left,
            meta(move |c, left: Expr| match op {
              LogicalOp::Or => {
                let short = call_k(k.clone(), left.clone());
                let long = c.cps(*right, k);
                Expr::cond(left, short, long)
              }
              LogicalOp::And => {
                let long = c.cps(*right, k.clone());
                let short = call_k(k, left.clone());
                Expr::cond(left, long, short)
              }
            }),
          )
        }),
      ),
    }
  }

  /// A continuation that ignores its argument and runs `rest`.
  fn rest_continuation(&mut self, rest: Vec<Stmt>, k: Expr) -> Expr {
    let dummy = self.gen.fresh("dummy");
    let body = self.cps_sequence(rest, k);
    Expr::lambda(vec![dummy], body)
  }

  pub fn cps_sequence(&mut self, stmts: Vec<Stmt>, k: Expr) -> Expr {
    let mut stmts = stmts.into_iter();
    let first = match stmts.next() {
      Some(s) => s,
      None => return call_k(k, Expr::Undefined),
    };
    let rest: Vec<Stmt> = stmts.collect();

    match first {
      Stmt::Empty => self.cps_sequence(rest, k),
      Stmt::Return(e) => self.cps(e, k),
      Stmt::Var(decls) => self.cps_declarations(decls, rest, k),
      Stmt::Expr(e) if rest.is_empty() => self.cps(e, k),
      Stmt::Expr(e) => {
        let after = self.rest_continuation(rest, k);
        self.cps(e, after)
      }
      Stmt::Block(body) if rest.is_empty() => self.cps_sequence(body, k),
      Stmt::Block(body) => {
        let after = self.rest_continuation(rest, k);
        self.cps_sequence(body, after)
      }
      Stmt::If(test, consequent, alternate) => {
        let k = if rest.is_empty() { k } else { self.rest_continuation(rest, k) };
        self.bind_continuation(
          k,
          meta(move |c, k: Expr| {
            c.atomize(
              *test,
              meta(move |c, test| {
                let consequent = c.cps_sequence(consequent, k.clone());
                let alternate = c.cps_sequence(alternate, k);
                Expr::cond(test, consequent, alternate)
              }),
            )
          }),
        )
      }
    }
  }

  fn cps_declarations(&mut self, decls: Vec<(crate::lang::Var, Expr)>, rest: Vec<Stmt>, k: Expr) -> Expr {
    let mut tail = self.cps_sequence(rest, k);
    for (x, init) in decls.into_iter().rev() {
      let init = match init {
        Expr::Func(f) if f.name.is_none() => Expr::func(Some(x), f.params.clone(), f.body.clone()),
        init => init,
      };
      tail = self.cps(init, Expr::lambda(vec![x], tail));
    }
    tail
  }
}

impl Folder for Cps {
  fn fold_func(&mut self, f: &Func) -> Expr {
    self.cps_function(f)
  }
}

/// Verifies the output of the transform: every function body is a single
/// expression that ends in a call or a conditional choosing between calls,
/// and non-primitive calls occur nowhere else.
#[derive(Default)]
struct CpsForm {
  error: Option<Error>,
}

impl CpsForm {
  fn fail(&mut self, message: &str, node: impl fmt::Debug) {
    if self.error.is_none() {
      self.error = Some(Error::compile("cps-check", message, format!("{:?}", node)));
    }
  }

  fn tail(&mut self, e: &Expr) {
    match e {
      Expr::Cond(test, consequent, alternate) => {
        self.visit(test);
        self.tail(consequent);
        self.tail(alternate);
      }
      Expr::App(callee, args) if !is_primitive(callee) => {
        self.visit(callee);
        for a in args {
          self.visit(a);
        }
      }
      e => self.fail("expected a call in tail position", e),
    }
  }
}

impl Visitor for CpsForm {
  fn visit_func(&mut self, f: &Func) {
    match f.body.as_slice() {
      [Stmt::Expr(e)] => self.tail(e),
      body => self.fail("function body is not a single tail expression", body),
    }
  }

  fn visit_app(&mut self, callee: &Expr, args: &[Expr]) {
    if !is_primitive(callee) {
      self.fail("non-primitive call outside tail position", callee);
    }
    self.super_visit_app(callee, args)
  }
}

pub fn check(program: &Program) -> Result<Program> {
  in_program("cps-check", program, |f| {
    let mut form = CpsForm::default();
    form.visit_func(f);
    match form.error {
      Some(e) => Err(e.into()),
      None => Ok(Expr::Func(f.clone())),
    }
  })
}
