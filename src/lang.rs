use string_interner::{DefaultSymbol as Symbol, StringInterner};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

thread_local! {
  pub static INTERNER: RefCell<StringInterner> = RefCell::new(StringInterner::default());
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(Symbol);

impl Var {
  pub fn new(t: impl AsRef<str>) -> Self {
    INTERNER.with(|interner| {
      let symbol = interner.borrow_mut().get_or_intern(t.as_ref());
      Var(symbol)
    })
  }

  pub fn name(&self) -> String {
    INTERNER.with(|interner| {
      let interner = interner.borrow();
      interner.resolve(self.0).unwrap_or("?").to_string()
    })
  }
}

pub fn v(t: impl AsRef<str>) -> Var {
  Var::new(t)
}

/// The identifier programs use to read and write the threaded store.
pub fn global_store() -> Var {
  v("globalStore")
}

impl fmt::Debug for Var {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

impl fmt::Display for Var {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Lt,
  Leq,
  Gt,
  Geq,
  Eq,
  Neq,
  StrictEq,
  StrictNeq,
}

impl BinOp {
  pub fn symbol(&self) -> &'static str {
    use BinOp::*;
    match self {
      Add => "+",
      Sub => "-",
      Mul => "*",
      Div => "/",
      Mod => "%",
      Lt => "<",
      Leq => "<=",
      Gt => ">",
      Geq => ">=",
      Eq => "==",
      Neq => "!=",
      StrictEq => "===",
      StrictNeq => "!==",
    }
  }
}

impl fmt::Debug for BinOp {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.symbol())
  }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
  Neg,
  Plus,
  Not,
}

impl UnOp {
  pub fn symbol(&self) -> &'static str {
    match self {
      UnOp::Neg => "-",
      UnOp::Plus => "+",
      UnOp::Not => "!",
    }
  }
}

impl fmt::Debug for UnOp {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.symbol())
  }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
  And,
  Or,
}

impl LogicalOp {
  pub fn symbol(&self) -> &'static str {
    match self {
      LogicalOp::And => "&&",
      LogicalOp::Or => "||",
    }
  }
}

impl fmt::Debug for LogicalOp {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.symbol())
  }
}

/// Expressions. Static member names (`a.b`) are stored as string literal
/// properties, computed ones (`a[e]`) as the expression itself.
#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
  Num(f64),
  Str(Rc<str>),
  Bool(bool),
  Null,
  Undefined,
  EVar(Var),
  Array(Vec<Expr>),
  Object(Vec<(Rc<str>, Expr)>),
  Unary(UnOp, Box<Expr>),
  Bin(Box<Expr>, Box<Expr>, BinOp),
  Logical(Box<Expr>, Box<Expr>, LogicalOp),
  Cond(Box<Expr>, Box<Expr>, Box<Expr>),
  Member(Box<Expr>, Box<Expr>),
  App(Box<Expr>, Vec<Expr>),
  Func(Rc<Func>),
  Assign(Box<Expr>, Box<Expr>),
}

#[derive(Clone, PartialEq, Debug)]
pub struct Func {
  pub name: Option<Var>,
  pub params: Vec<Var>,
  pub body: Vec<Stmt>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Stmt {
  Empty,
  Expr(Expr),
  Var(Vec<(Var, Expr)>),
  If(Box<Expr>, Vec<Stmt>, Vec<Stmt>),
  Return(Expr),
  Block(Vec<Stmt>),
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct Program {
  pub body: Vec<Stmt>,
}

impl Expr {
  pub fn var(name: impl AsRef<str>) -> Expr {
    Expr::EVar(v(name))
  }

  pub fn str(s: impl AsRef<str>) -> Expr {
    Expr::Str(Rc::from(s.as_ref()))
  }

  pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::App(Box::new(callee), args)
  }

  pub fn member(object: Expr, name: impl AsRef<str>) -> Expr {
    Expr::Member(Box::new(object), Box::new(Expr::str(name)))
  }

  pub fn cond(test: Expr, consequent: Expr, alternate: Expr) -> Expr {
    Expr::Cond(Box::new(test), Box::new(consequent), Box::new(alternate))
  }

  pub fn func(name: Option<Var>, params: Vec<Var>, body: Vec<Stmt>) -> Expr {
    Expr::Func(Rc::new(Func { name, params, body }))
  }

  /// A function whose body is the single expression statement `body`.
  pub fn lambda(params: Vec<Var>, body: Expr) -> Expr {
    Expr::func(None, params, vec![Stmt::Expr(body)])
  }
}

impl Program {
  pub fn new(body: Vec<Stmt>) -> Self {
    Program { body }
  }
}
