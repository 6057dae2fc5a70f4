use crate::error::Error;
use crate::lang::{global_store, v, BinOp, Expr, Func, LogicalOp, Program, Stmt, UnOp, Var};

use anyhow::Result;
use logos::{FilterResult, Logos};
use std::ops::Range;
use std::rc::Rc;

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
pub enum Token<'a> {
  #[token("var")]
  Var,
  #[token("let")]
  Let,
  #[token("const")]
  Const,
  #[token("function")]
  Function,
  #[token("return")]
  Return,
  #[token("if")]
  If,
  #[token("else")]
  Else,
  #[token("true")]
  True,
  #[token("false")]
  False,
  #[token("null")]
  Null,
  #[token("undefined")]
  Undefined,

  #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice())]
  Ident(&'a str),
  #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
  #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
  Num(f64),
  #[regex(r#""([^"\\\n]|\\.)*""#, |lex| lex.slice())]
  #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| lex.slice())]
  Str(&'a str),

  #[token("===")]
  EqEqEq,
  #[token("!==")]
  NotEqEq,
  #[token("==")]
  EqEq,
  #[token("!=")]
  NotEq,
  #[token("<=")]
  Leq,
  #[token(">=")]
  Geq,
  #[token("<")]
  Lt,
  #[token(">")]
  Gt,
  #[token("&&")]
  AndAnd,
  #[token("||")]
  OrOr,
  #[token("!")]
  Bang,
  #[token("=")]
  Assign,
  #[token("+")]
  Plus,
  #[token("-")]
  Minus,
  #[token("*")]
  Star,
  #[token("/")]
  Slash,
  #[token("%")]
  Percent,
  #[token("?")]
  Question,
  #[token(":")]
  Colon,
  #[token(".")]
  Dot,
  #[token(",")]
  Comma,
  #[token(";")]
  Semi,
  #[token("(")]
  LParen,
  #[token(")")]
  RParen,
  #[token("[")]
  LBracket,
  #[token("]")]
  RBracket,
  #[token("{")]
  LBrace,
  #[token("}")]
  RBrace,

  #[error]
  #[regex(r"[ \t\r\n\f]+", logos::skip)]
  #[regex(r"//[^\n]*", logos::skip)]
  #[token("/*", block_comment)]
  Error,
}

fn block_comment<'a>(lex: &mut logos::Lexer<'a, Token<'a>>) -> FilterResult<()> {
  match lex.remainder().find("*/") {
    Some(end) => {
      lex.bump(end + 2);
      FilterResult::Skip
    }
    None => {
      lex.bump(lex.remainder().len());
      FilterResult::Error
    }
  }
}

enum PostOp {
  Call(Vec<Expr>),
  Field(Rc<str>),
  Index(Expr),
}

impl PostOp {
  fn apply(self, e: Expr) -> Expr {
    match self {
      PostOp::Call(args) => Expr::App(Box::new(e), args),
      PostOp::Field(name) => Expr::Member(Box::new(e), Box::new(Expr::Str(name))),
      PostOp::Index(i) => Expr::Member(Box::new(e), Box::new(i)),
    }
  }
}

fn bin(x: Expr, y: Expr, op: BinOp) -> Expr {
  Expr::Bin(Box::new(x), Box::new(y), op)
}

fn logical(x: Expr, y: Expr, op: LogicalOp) -> Expr {
  Expr::Logical(Box::new(x), Box::new(y), op)
}

fn unary(op: UnOp, x: Expr) -> Expr {
  Expr::Unary(op, Box::new(x))
}

fn func(name: Option<Var>, (params, body): (Vec<Var>, Vec<Stmt>)) -> Expr {
  Expr::Func(Rc::new(Func { name, params, body }))
}

// Mutation is only meaningful on the threaded store; anything else would be
// shared between branches that inference explores independently.
fn assignment(target: Expr, value: Expr) -> std::result::Result<Expr, &'static str> {
  match &target {
    Expr::Member(object, _) if **object == Expr::EVar(global_store()) => {
      Ok(Expr::Assign(Box::new(target), Box::new(value)))
    }
    _ => Err("assignment target to be a globalStore property"),
  }
}

fn unescape(quoted: &str) -> String {
  let inner = &quoted[1..quoted.len() - 1];
  let mut out = String::with_capacity(inner.len());
  let mut chars = inner.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('n') => out.push('\n'),
      Some('t') => out.push('\t'),
      Some('r') => out.push('\r'),
      Some('0') => out.push('\0'),
      Some(other) => out.push(other),
      None => {}
    }
  }
  out
}

peg::parser! {
  grammar js<'a>() for [Token<'a>] {
    pub rule program() -> Vec<Stmt> = s:stmt()* { s }

    pub rule expression() -> Expr = e:expr() { e }

    rule semi() = [Token::Semi]

    rule stmt() -> Stmt
      = [Token::LBrace] body:stmt()* [Token::RBrace] { Stmt::Block(body) }
      / [Token::Var | Token::Let | Token::Const] ds:(declarator() ++ [Token::Comma]) semi()? {
          Stmt::Var(ds)
        }
      / [Token::Function] [Token::Ident(name)] f:function_rest() semi()? {
          Stmt::Var(vec![(v(name), func(Some(v(name)), f))])
        }
      / [Token::If] [Token::LParen] t:expr() [Token::RParen] c:branch()
          a:([Token::Else] a:branch() { a })? {
          Stmt::If(Box::new(t), c, a.unwrap_or_default())
        }
      / [Token::Return] e:expr()? semi()? { Stmt::Return(e.unwrap_or(Expr::Undefined)) }
      / semi() { Stmt::Empty }
      / e:expr() semi()? { Stmt::Expr(e) }

    rule declarator() -> (Var, Expr)
      = [Token::Ident(x)] init:([Token::Assign] e:expr() { e })? {
          (v(x), init.unwrap_or(Expr::Undefined))
        }

    rule branch() -> Vec<Stmt>
      = [Token::LBrace] b:stmt()* [Token::RBrace] { b }
      / s:stmt() { vec![s] }

    rule param() -> Var = [Token::Ident(p)] { v(p) }

    rule function_rest() -> (Vec<Var>, Vec<Stmt>)
      = [Token::LParen] params:(param() ** [Token::Comma]) [Token::RParen]
        [Token::LBrace] body:stmt()* [Token::RBrace] { (params, body) }

    rule expr() -> Expr = assign()

    // Targets are parsed as ordinary expressions and checked afterwards.
    rule assign() -> Expr
      = t:conditional() e:([Token::Assign] e:assign() { e })? {?
          match e {
            Some(e) => assignment(t, e),
            None => Ok(t),
          }
        }

    rule conditional() -> Expr
      = t:binary() rest:([Token::Question] c:assign() [Token::Colon] a:assign() { (c, a) })? {
          match rest {
            Some((c, a)) => Expr::cond(t, c, a),
            None => t,
          }
        }

    rule binary() -> Expr = precedence! {
      x:(@) [Token::OrOr] y:@ { logical(x, y, LogicalOp::Or) }
      --
      x:(@) [Token::AndAnd] y:@ { logical(x, y, LogicalOp::And) }
      --
      x:(@) [Token::EqEq] y:@ { bin(x, y, BinOp::Eq) }
      x:(@) [Token::NotEq] y:@ { bin(x, y, BinOp::Neq) }
      x:(@) [Token::EqEqEq] y:@ { bin(x, y, BinOp::StrictEq) }
      x:(@) [Token::NotEqEq] y:@ { bin(x, y, BinOp::StrictNeq) }
      --
      x:(@) [Token::Lt] y:@ { bin(x, y, BinOp::Lt) }
      x:(@) [Token::Leq] y:@ { bin(x, y, BinOp::Leq) }
      x:(@) [Token::Gt] y:@ { bin(x, y, BinOp::Gt) }
      x:(@) [Token::Geq] y:@ { bin(x, y, BinOp::Geq) }
      --
      x:(@) [Token::Plus] y:@ { bin(x, y, BinOp::Add) }
      x:(@) [Token::Minus] y:@ { bin(x, y, BinOp::Sub) }
      --
      x:(@) [Token::Star] y:@ { bin(x, y, BinOp::Mul) }
      x:(@) [Token::Slash] y:@ { bin(x, y, BinOp::Div) }
      x:(@) [Token::Percent] y:@ { bin(x, y, BinOp::Mod) }
      --
      [Token::Minus] x:@ { unary(UnOp::Neg, x) }
      [Token::Plus] x:@ { unary(UnOp::Plus, x) }
      [Token::Bang] x:@ { unary(UnOp::Not, x) }
      --
      p:postfix() { p }
    }

    rule postfix() -> Expr
      = e:primary() ops:postop()* { ops.into_iter().fold(e, |acc, op| op.apply(acc)) }

    rule postop() -> PostOp
      = [Token::LParen] args:(expr() ** [Token::Comma]) [Token::RParen] { PostOp::Call(args) }
      / [Token::Dot] [Token::Ident(name)] { PostOp::Field(Rc::from(name)) }
      / [Token::LBracket] i:expr() [Token::RBracket] { PostOp::Index(i) }

    rule primary() -> Expr
      = [Token::Num(n)] { Expr::Num(n) }
      / [Token::Str(s)] { Expr::Str(Rc::from(unescape(s))) }
      / [Token::True] { Expr::Bool(true) }
      / [Token::False] { Expr::Bool(false) }
      / [Token::Null] { Expr::Null }
      / [Token::Undefined] { Expr::Undefined }
      / [Token::Function] name:([Token::Ident(n)] { v(n) })? f:function_rest() { func(name, f) }
      / [Token::Ident(x)] { Expr::EVar(v(x)) }
      / [Token::LParen] e:expr() [Token::RParen] { e }
      / [Token::LBracket] es:(expr() ** [Token::Comma]) [Token::Comma]? [Token::RBracket] {
          Expr::Array(es)
        }
      / [Token::LBrace] ps:(property() ** [Token::Comma]) [Token::Comma]? [Token::RBrace] {
          Expr::Object(ps)
        }

    rule property() -> (Rc<str>, Expr)
      = k:property_key() [Token::Colon] e:expr() { (k, e) }

    rule property_key() -> Rc<str>
      = [Token::Ident(n)] { Rc::from(n) }
      / [Token::Str(s)] { Rc::from(unescape(s)) }
  }
}

fn line_col(src: &str, offset: usize) -> (usize, usize) {
  let before = &src[..offset.min(src.len())];
  let line = before.matches('\n').count() + 1;
  let col = before.len() - before.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
  (line, col)
}

fn lex(src: &str) -> Result<(Vec<Token>, Vec<Range<usize>>)> {
  let mut tokens = Vec::new();
  let mut spans = Vec::new();
  for (token, span) in Token::lexer(src).spanned() {
    if token == Token::Error {
      let (line, col) = line_col(src, span.start);
      return Err(
        Error::Lex {
          line,
          col,
          text: src[span].to_string(),
        }
        .into(),
      );
    }
    tokens.push(token);
    spans.push(span);
  }
  Ok((tokens, spans))
}

fn parse_error(src: &str, spans: &[Range<usize>], e: peg::error::ParseError<usize>) -> anyhow::Error {
  let offset = spans.get(e.location).map(|s| s.start).unwrap_or(src.len());
  let (line, col) = line_col(src, offset);
  Error::Parse {
    line,
    col,
    expected: e.expected.to_string(),
  }
  .into()
}

pub trait Parse: Sized {
  fn parse(s: impl AsRef<str>) -> Result<Self>;
}

impl Parse for Program {
  fn parse(s: impl AsRef<str>) -> Result<Self> {
    let src = s.as_ref();
    let (tokens, spans) = lex(src)?;
    let body = js::program(&tokens).map_err(|e| parse_error(src, &spans, e))?;
    Ok(Program { body })
  }
}

impl Parse for Expr {
  fn parse(s: impl AsRef<str>) -> Result<Self> {
    let src = s.as_ref();
    let (tokens, spans) = lex(src)?;
    js::expression(&tokens).map_err(|e| parse_error(src, &spans, e))
  }
}
