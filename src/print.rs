use crate::lang::{Expr, Func, Program, Stmt};

use lazy_static::lazy_static;
use pretty::RcDoc;
use regex::Regex;

lazy_static! {
  static ref IDENT: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

const KEYWORDS: &[&str] = &[
  "var", "let", "const", "function", "return", "if", "else", "true", "false", "null", "undefined",
];

fn is_name(s: &str) -> bool {
  IDENT.is_match(s) && !KEYWORDS.contains(&s)
}

fn quote(s: &str) -> String {
  let mut out = String::with_capacity(s.len() + 2);
  out.push('"');
  for c in s.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\t' => out.push_str("\\t"),
      '\r' => out.push_str("\\r"),
      '\0' => out.push_str("\\0"),
      c => out.push(c),
    }
  }
  out.push('"');
  out
}

fn num(n: f64) -> String {
  if n.is_nan() {
    "NaN".into()
  } else if n.is_infinite() {
    if n > 0. { "Infinity".into() } else { "-Infinity".into() }
  } else {
    format!("{}", n)
  }
}

fn comma_list(docs: impl Iterator<Item = RcDoc<'static>>) -> RcDoc<'static> {
  RcDoc::intersperse(docs, RcDoc::text(",").append(RcDoc::line()))
}

fn bracketed(open: &'static str, inner: RcDoc<'static>, close: &'static str) -> RcDoc<'static> {
  RcDoc::text(open)
    .append(RcDoc::line_().append(inner).nest(2))
    .append(RcDoc::line_())
    .append(RcDoc::text(close))
    .group()
}

fn simple(e: &Expr) -> bool {
  match e {
    Expr::Num(n) => *n >= 0. && n.is_finite(),
    Expr::Str(_)
    | Expr::Bool(_)
    | Expr::Null
    | Expr::Undefined
    | Expr::EVar(_)
    | Expr::Array(_)
    | Expr::Object(_)
    | Expr::Member(..)
    | Expr::App(..) => true,
    Expr::Unary(..)
    | Expr::Bin(..)
    | Expr::Logical(..)
    | Expr::Cond(..)
    | Expr::Func(_)
    | Expr::Assign(..) => false,
  }
}

fn operand(e: &Expr) -> RcDoc<'static> {
  if simple(e) {
    expr(e)
  } else {
    RcDoc::text("(").append(expr(e)).append(RcDoc::text(")"))
  }
}

/// An expression statement may not open with `{` or `function`.
fn needs_parens_as_stmt(e: &Expr) -> bool {
  match e {
    Expr::Object(_) | Expr::Func(_) => true,
    Expr::Member(e, _)
    | Expr::App(e, _)
    | Expr::Bin(e, _, _)
    | Expr::Logical(e, _, _)
    | Expr::Cond(e, _, _)
    | Expr::Assign(e, _) => simple(e) && needs_parens_as_stmt(e),
    _ => false,
  }
}

fn key(k: &str) -> RcDoc<'static> {
  if is_name(k) {
    RcDoc::text(k.to_string())
  } else {
    RcDoc::text(quote(k))
  }
}

fn func(f: &Func) -> RcDoc<'static> {
  let name = match f.name {
    Some(x) => RcDoc::text(" ").append(RcDoc::as_string(x)),
    None => RcDoc::nil(),
  };
  let params = RcDoc::intersperse(f.params.iter().map(|x| RcDoc::as_string(x)), RcDoc::text(", "));
  RcDoc::text("function")
    .append(name)
    .append(RcDoc::text("("))
    .append(params)
    .append(RcDoc::text(") "))
    .append(block(&f.body))
}

fn block(body: &[Stmt]) -> RcDoc<'static> {
  if body.is_empty() {
    return RcDoc::text("{}");
  }
  RcDoc::text("{")
    .append(RcDoc::line().append(stmts(body)).nest(2))
    .append(RcDoc::line())
    .append(RcDoc::text("}"))
    .group()
}

fn stmts(body: &[Stmt]) -> RcDoc<'static> {
  RcDoc::intersperse(body.iter().map(stmt), RcDoc::line())
}

pub fn stmt(s: &Stmt) -> RcDoc<'static> {
  match s {
    Stmt::Empty => RcDoc::text(";"),
    Stmt::Expr(e) if needs_parens_as_stmt(e) => RcDoc::text("(")
      .append(expr(e))
      .append(RcDoc::text(");")),
    Stmt::Expr(e) => expr(e).append(RcDoc::text(";")),
    Stmt::Var(decls) => {
      let decls = decls
        .iter()
        .map(|(x, e)| RcDoc::as_string(x).append(RcDoc::text(" = ")).append(expr(e)));
      RcDoc::text("var ").append(comma_list(decls).nest(4)).append(RcDoc::text(";"))
    }
    Stmt::If(test, consequent, alternate) => {
      let head = RcDoc::text("if (")
        .append(expr(test))
        .append(RcDoc::text(") "))
        .append(block(consequent));
      if alternate.is_empty() {
        head
      } else {
        head.append(RcDoc::text(" else ")).append(block(alternate))
      }
    }
    Stmt::Return(e) => RcDoc::text("return ").append(expr(e)).append(RcDoc::text(";")),
    Stmt::Block(body) => block(body),
  }
}

pub fn expr(e: &Expr) -> RcDoc<'static> {
  match e {
    Expr::Num(n) => RcDoc::text(num(*n)),
    Expr::Str(s) => RcDoc::text(quote(s)),
    Expr::Bool(b) => RcDoc::as_string(b),
    Expr::Null => RcDoc::text("null"),
    Expr::Undefined => RcDoc::text("undefined"),
    Expr::EVar(x) => RcDoc::as_string(x),
    Expr::Array(es) => bracketed("[", comma_list(es.iter().map(expr)), "]"),
    Expr::Object(props) => {
      let props = props
        .iter()
        .map(|(k, e)| key(k).append(RcDoc::text(": ")).append(expr(e)));
      bracketed("{", comma_list(props), "}")
    }
    Expr::Unary(op, e) => RcDoc::text(op.symbol()).append(operand(e)),
    Expr::Bin(e1, e2, op) => operand(e1)
      .append(RcDoc::text(format!(" {}", op.symbol())))
      .append(RcDoc::line().append(operand(e2)).nest(2))
      .group(),
    Expr::Logical(e1, e2, op) => operand(e1)
      .append(RcDoc::text(format!(" {}", op.symbol())))
      .append(RcDoc::line().append(operand(e2)).nest(2))
      .group(),
    Expr::Cond(t, c, a) => operand(t)
      .append(
        RcDoc::line()
          .append(RcDoc::text("? "))
          .append(expr(c))
          .append(RcDoc::line())
          .append(RcDoc::text(": "))
          .append(expr(a))
          .nest(2),
      )
      .group(),
    Expr::Member(object, property) => {
      let object = operand(object);
      match &**property {
        Expr::Str(name) if is_name(name) => object.append(RcDoc::text(format!(".{}", name))),
        p => object
          .append(RcDoc::text("["))
          .append(expr(p))
          .append(RcDoc::text("]")),
      }
    }
    Expr::App(callee, args) => operand(callee).append(bracketed("(", comma_list(args.iter().map(expr)), ")")),
    Expr::Func(f) => func(f),
    Expr::Assign(target, value) => expr(target).append(RcDoc::text(" = ")).append(expr(value)),
  }
}

fn render(doc: RcDoc<'static>, width: usize) -> String {
  let mut out = String::new();
  // Writing into a String cannot fail.
  let _ = doc.render_fmt(width, &mut out);
  out
}

impl Program {
  pub fn to_pretty(&self, width: usize) -> String {
    render(stmts(&self.body), width)
  }
}

impl Expr {
  pub fn to_pretty(&self, width: usize) -> String {
    render(expr(self), width)
  }
}
