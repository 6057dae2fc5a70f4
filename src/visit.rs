use crate::lang::{Expr, Func, Stmt, Var};
use std::rc::Rc;

pub trait Visitor {
  fn visit_evar(&mut self, x: Var) {
    self.super_visit_evar(x)
  }

  fn super_visit_evar(&mut self, _x: Var) {}

  fn visit_func(&mut self, f: &Func) {
    self.super_visit_func(f)
  }

  fn super_visit_func(&mut self, f: &Func) {
    for s in &f.body {
      self.visit_stmt(s);
    }
  }

  fn visit_app(&mut self, callee: &Expr, args: &[Expr]) {
    self.super_visit_app(callee, args)
  }

  fn super_visit_app(&mut self, callee: &Expr, args: &[Expr]) {
    self.visit(callee);
    for a in args {
      self.visit(a);
    }
  }

  fn visit_stmt(&mut self, s: &Stmt) {
    self.super_visit_stmt(s)
  }

  fn super_visit_stmt(&mut self, s: &Stmt) {
    match s {
      Stmt::Empty => {}
      Stmt::Expr(e) | Stmt::Return(e) => self.visit(e),
      Stmt::Var(decls) => {
        for (_, e) in decls {
          self.visit(e);
        }
      }
      Stmt::If(test, consequent, alternate) => {
        self.visit(test);
        for s in consequent.iter().chain(alternate.iter()) {
          self.visit_stmt(s);
        }
      }
      Stmt::Block(body) => {
        for s in body {
          self.visit_stmt(s);
        }
      }
    }
  }

  fn visit(&mut self, e: &Expr) {
    match e {
      Expr::EVar(x) => self.visit_evar(*x),
      Expr::Func(f) => self.visit_func(f),
      Expr::App(callee, args) => self.visit_app(callee, args),
      _ => self.super_visit(e),
    }
  }

  /// Visits the children of expressions without a dedicated hook.
  fn super_visit(&mut self, e: &Expr) {
    match e {
      Expr::Num(_)
      | Expr::Str(_)
      | Expr::Bool(_)
      | Expr::Null
      | Expr::Undefined
      | Expr::EVar(_)
      | Expr::Func(_)
      | Expr::App(..) => {}
      Expr::Array(es) => {
        for e in es {
          self.visit(e);
        }
      }
      Expr::Object(props) => {
        for (_, e) in props {
          self.visit(e);
        }
      }
      Expr::Unary(_, e) => self.visit(e),
      Expr::Bin(e1, e2, _) | Expr::Logical(e1, e2, _) | Expr::Member(e1, e2) | Expr::Assign(e1, e2) => {
        self.visit(e1);
        self.visit(e2);
      }
      Expr::Cond(t, c, a) => {
        self.visit(t);
        self.visit(c);
        self.visit(a);
      }
    }
  }
}

pub trait Folder {
  fn fold_evar(&mut self, x: Var) -> Expr {
    self.super_fold_evar(x)
  }

  fn super_fold_evar(&mut self, x: Var) -> Expr {
    Expr::EVar(x)
  }

  fn fold_func(&mut self, f: &Func) -> Expr {
    self.super_fold_func(f)
  }

  fn super_fold_func(&mut self, f: &Func) -> Expr {
    Expr::Func(Rc::new(Func {
      name: f.name,
      params: f.params.clone(),
      body: self.fold_stmts(&f.body),
    }))
  }

  fn fold_app(&mut self, callee: &Expr, args: &[Expr]) -> Expr {
    self.super_fold_app(callee, args)
  }

  fn super_fold_app(&mut self, callee: &Expr, args: &[Expr]) -> Expr {
    Expr::App(
      Box::new(self.fold(callee)),
      args.iter().map(|a| self.fold(a)).collect(),
    )
  }

  fn fold_stmts(&mut self, stmts: &[Stmt]) -> Vec<Stmt> {
    stmts.iter().map(|s| self.fold_stmt(s)).collect()
  }

  fn fold_stmt(&mut self, s: &Stmt) -> Stmt {
    self.super_fold_stmt(s)
  }

  fn super_fold_stmt(&mut self, s: &Stmt) -> Stmt {
    match s {
      Stmt::Empty => Stmt::Empty,
      Stmt::Expr(e) => Stmt::Expr(self.fold(e)),
      Stmt::Return(e) => Stmt::Return(self.fold(e)),
      Stmt::Var(decls) => Stmt::Var(decls.iter().map(|(x, e)| (*x, self.fold(e))).collect()),
      Stmt::If(test, consequent, alternate) => Stmt::If(
        Box::new(self.fold(test)),
        self.fold_stmts(consequent),
        self.fold_stmts(alternate),
      ),
      Stmt::Block(body) => Stmt::Block(self.fold_stmts(body)),
    }
  }

  fn fold(&mut self, e: &Expr) -> Expr {
    match e {
      Expr::EVar(x) => self.fold_evar(*x),
      Expr::Func(f) => self.fold_func(f),
      Expr::App(callee, args) => self.fold_app(callee, args),
      _ => self.super_fold(e),
    }
  }

  /// Rebuilds expressions without a dedicated hook from folded children.
  fn super_fold(&mut self, e: &Expr) -> Expr {
    let mut fold = |e: &Expr| Box::new(self.fold(e));
    match e {
      Expr::Num(_)
      | Expr::Str(_)
      | Expr::Bool(_)
      | Expr::Null
      | Expr::Undefined
      | Expr::EVar(_)
      | Expr::Func(_)
      | Expr::App(..) => e.clone(),
      Expr::Array(es) => Expr::Array(es.iter().map(|e| *fold(e)).collect()),
      Expr::Object(props) => Expr::Object(props.iter().map(|(k, e)| (k.clone(), *fold(e))).collect()),
      Expr::Unary(op, e) => Expr::Unary(*op, fold(e)),
      Expr::Bin(e1, e2, op) => Expr::Bin(fold(e1), fold(e2), *op),
      Expr::Logical(e1, e2, op) => Expr::Logical(fold(e1), fold(e2), *op),
      Expr::Member(e1, e2) => Expr::Member(fold(e1), fold(e2)),
      Expr::Assign(e1, e2) => Expr::Assign(fold(e1), fold(e2)),
      Expr::Cond(t, c, a) => Expr::Cond(fold(t), fold(c), fold(a)),
    }
  }
}
