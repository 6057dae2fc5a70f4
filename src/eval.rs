use crate::error::Error;
use crate::lang::{global_store, BinOp, Expr, LogicalOp, Stmt, UnOp};
use crate::runtime::Runtime;
use crate::syntax::is_primitive;
use crate::trampoline::Step;
use crate::value::{Closure, Env, Native, Value};

use anyhow::Result;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Continues `k` with `v` on the next trampoline step.
pub fn resume(k: Value, v: Value) -> Step {
  Step::bounce(move |rt| apply(rt, &k, vec![v]))
}

/// Calls a function value in CPS position. Compiled functions and CPS
/// natives expect `(k, address, ...)`, continuations a single value.
pub fn apply(rt: &mut Runtime, f: &Value, args: Vec<Value>) -> Result<Step> {
  match f {
    Value::Func(closure) => {
      let body = match closure.func.body.as_slice() {
        [Stmt::Expr(body)] => body,
        _ => {
          return Err(Error::compile("apply", "function body is not in CPS form", f).into());
        }
      };
      let mut frame = Vec::with_capacity(closure.func.params.len() + 1);
      if let Some(name) = closure.func.name {
        frame.push((name, f.clone()));
      }
      let mut args = args.into_iter();
      for param in &closure.func.params {
        frame.push((*param, args.next().unwrap_or(Value::Undefined)));
      }
      let env = Env::extend(&closure.env, frame);
      eval_tail(rt, body, &env)
    }
    Value::Native(Native::Cps(_, f)) => f(rt, args),
    Value::Native(Native::Cont(_, f)) => f(rt, args.into_iter().next().unwrap_or(Value::Undefined)),
    Value::Native(Native::Prim(name, f)) => {
      let mut args = args.into_iter();
      match (args.next(), args.next()) {
        (Some(k), Some(_address)) => {
          let rest: Vec<Value> = args.collect();
          let v = f(&rest)?;
          Ok(resume(k, v))
        }
        _ => Err(Error::ty(format!("{} called without a continuation", name)).into()),
      }
    }
    v => Err(Error::ty(format!("{} is not a function", v)).into()),
  }
}

/// Evaluates a compiled function body: conditionals choose a branch, and the
/// call in tail position becomes the next trampoline step.
pub fn eval_tail(rt: &mut Runtime, e: &Expr, env: &Rc<Env>) -> Result<Step> {
  match e {
    Expr::Cond(test, consequent, alternate) => {
      if eval(rt, test, env)?.truthy() {
        eval_tail(rt, consequent, env)
      } else {
        eval_tail(rt, alternate, env)
      }
    }
    Expr::App(callee, args) if !is_primitive(callee) => {
      let f = eval(rt, callee, env)?;
      let args = args.iter().map(|a| eval(rt, a, env)).collect::<Result<Vec<_>>>()?;
      Ok(Step::bounce(move |rt| apply(rt, &f, args)))
    }
    e => Ok(Step::Done(eval(rt, e, env)?)),
  }
}

/// Evaluates an atomic expression.
pub fn eval(rt: &mut Runtime, e: &Expr, env: &Rc<Env>) -> Result<Value> {
  Ok(match e {
    Expr::Num(n) => Value::Num(*n),
    Expr::Str(s) => Value::Str(s.clone()),
    Expr::Bool(b) => Value::Bool(*b),
    Expr::Null => Value::Null,
    Expr::Undefined => Value::Undefined,
    Expr::EVar(x) if *x == global_store() => rt.store.to_value(),
    Expr::EVar(x) => match env.lookup(*x) {
      Some(v) => v.clone(),
      None => return Err(Error::Unbound(x.name()).into()),
    },
    Expr::Array(es) => Value::array(es.iter().map(|e| eval(rt, e, env)).collect::<Result<_>>()?),
    Expr::Object(props) => {
      let mut map = BTreeMap::new();
      for (k, e) in props {
        map.insert(k.to_string(), eval(rt, e, env)?);
      }
      Value::object(map)
    }
    Expr::Unary(op, e) => {
      let v = eval(rt, e, env)?;
      match op {
        UnOp::Neg => Value::Num(-v.as_num()?),
        UnOp::Plus => Value::Num(v.as_num()?),
        UnOp::Not => Value::Bool(!v.truthy()),
      }
    }
    Expr::Bin(e1, e2, op) => {
      let v1 = eval(rt, e1, env)?;
      let v2 = eval(rt, e2, env)?;
      binop(*op, &v1, &v2)?
    }
    Expr::Logical(e1, e2, op) => {
      let v1 = eval(rt, e1, env)?;
      match (op, v1.truthy()) {
        (LogicalOp::And, true) | (LogicalOp::Or, false) => eval(rt, e2, env)?,
        _ => v1,
      }
    }
    Expr::Cond(test, consequent, alternate) => {
      if eval(rt, test, env)?.truthy() {
        eval(rt, consequent, env)?
      } else {
        eval(rt, alternate, env)?
      }
    }
    Expr::Member(object, property) => {
      let object = eval(rt, object, env)?;
      let property = eval(rt, property, env)?;
      member(&object, &property)?
    }
    Expr::App(callee, args) => match &**callee {
      Expr::Member(object, property) if is_primitive(callee) => {
        let object = eval(rt, object, env)?;
        let name = eval(rt, property, env)?.key();
        let args = args.iter().map(|a| eval(rt, a, env)).collect::<Result<Vec<_>>>()?;
        method(&object, &name, &args)?
      }
      _ => {
        return Err(Error::compile("eval", "non-primitive call outside tail position", format!("{:?}", e)).into());
      }
    },
    Expr::Func(f) => Value::Func(Rc::new(Closure {
      func: f.clone(),
      env: env.clone(),
    })),
    Expr::Assign(target, value) => match &**target {
      Expr::Member(object, property) if **object == Expr::EVar(global_store()) => {
        let key = eval(rt, property, env)?.key();
        let v = eval(rt, value, env)?;
        rt.store.set(key, v.clone());
        v
      }
      _ => return Err(Error::ty("only globalStore properties can be assigned").into()),
    },
  })
}

fn compare(v1: &Value, v2: &Value) -> Result<Option<Ordering>> {
  match (v1, v2) {
    (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
    _ => Ok(v1.as_num()?.partial_cmp(&v2.as_num()?)),
  }
}

pub fn binop(op: BinOp, v1: &Value, v2: &Value) -> Result<Value> {
  use BinOp::*;
  let num = |f: fn(f64, f64) -> f64| -> Result<Value> { Ok(Value::Num(f(v1.as_num()?, v2.as_num()?))) };
  Ok(match op {
    Add => match (v1, v2) {
      (Value::Str(_), _) | (_, Value::Str(_)) => Value::str(format!("{}{}", v1.key(), v2.key())),
      _ => num(|a, b| a + b)?,
    },
    Sub => num(|a, b| a - b)?,
    Mul => num(|a, b| a * b)?,
    Div => num(|a, b| a / b)?,
    Mod => num(|a, b| a % b)?,
    Lt => Value::Bool(compare(v1, v2)? == Some(Ordering::Less)),
    Leq => Value::Bool(matches!(compare(v1, v2)?, Some(Ordering::Less | Ordering::Equal))),
    Gt => Value::Bool(compare(v1, v2)? == Some(Ordering::Greater)),
    Geq => Value::Bool(matches!(compare(v1, v2)?, Some(Ordering::Greater | Ordering::Equal))),
    Eq => Value::Bool(loose_eq(v1, v2)),
    Neq => Value::Bool(!loose_eq(v1, v2)),
    StrictEq => Value::Bool(v1 == v2),
    StrictNeq => Value::Bool(v1 != v2),
  })
}

fn to_number(v: &Value) -> f64 {
  match v {
    Value::Num(n) => *n,
    Value::Bool(b) => f64::from(u8::from(*b)),
    Value::Str(s) if s.trim().is_empty() => 0.,
    Value::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
    _ => f64::NAN,
  }
}

/// `==`: `undefined` and `null` only equal each other, and mixed numbers,
/// strings and booleans compare as numbers. Everything else is strict.
fn loose_eq(v1: &Value, v2: &Value) -> bool {
  let nullish = |v: &Value| matches!(v, Value::Undefined | Value::Null);
  let scalar = |v: &Value| matches!(v, Value::Num(_) | Value::Str(_) | Value::Bool(_));
  if nullish(v1) || nullish(v2) {
    return nullish(v1) && nullish(v2);
  }
  if scalar(v1) && scalar(v2) && std::mem::discriminant(v1) != std::mem::discriminant(v2) {
    return to_number(v1) == to_number(v2);
  }
  v1 == v2
}

fn member(object: &Value, property: &Value) -> Result<Value> {
  Ok(match (object, property) {
    (Value::Undefined | Value::Null, p) => {
      return Err(Error::ty(format!("cannot read property {} of {}", p, object)).into());
    }
    (Value::Array(vs), Value::Num(i)) => {
      if *i >= 0. && i.fract() == 0. {
        vs.get(*i as usize).cloned().unwrap_or(Value::Undefined)
      } else {
        Value::Undefined
      }
    }
    (Value::Array(vs), Value::Str(s)) if &**s == "length" => Value::Num(vs.len() as f64),
    (Value::Str(s), Value::Str(p)) if &**p == "length" => Value::Num(s.chars().count() as f64),
    (Value::Str(s), Value::Num(i)) if *i >= 0. && i.fract() == 0. => s
      .chars()
      .nth(*i as usize)
      .map(|c| Value::str(c.to_string()))
      .unwrap_or(Value::Undefined),
    (Value::Dist(d), Value::Str(p)) if &**p == "name" => Value::str(d.name()),
    (Value::Object(_), p) => object.get(&p.key()),
    _ => Value::Undefined,
  })
}

fn arg(args: &[Value], i: usize) -> Value {
  args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn slice_bounds(len: usize, args: &[Value]) -> Result<(usize, usize)> {
  let clamp = |v: Value, default: usize| -> Result<usize> {
    match v {
      Value::Undefined => Ok(default),
      v => {
        let n = v.as_num()?;
        let n = if n < 0. { len as f64 + n } else { n };
        Ok(n.max(0.).min(len as f64) as usize)
      }
    }
  };
  let start = clamp(arg(args, 0), 0)?;
  let end = clamp(arg(args, 1), len)?;
  Ok((start, end.max(start)))
}

/// Primitive method calls: `xs.concat(ys)`, `d.score(v)`, `Math.log(x)`.
fn method(object: &Value, name: &str, args: &[Value]) -> Result<Value> {
  Ok(match (object, name) {
    (Value::Array(vs), "concat") => {
      let mut out = (**vs).clone();
      for a in args {
        match a {
          Value::Array(more) => out.extend(more.iter().cloned()),
          v => out.push(v.clone()),
        }
      }
      Value::array(out)
    }
    (Value::Array(vs), "slice") => {
      let (start, end) = slice_bounds(vs.len(), args)?;
      Value::array(vs[start..end].to_vec())
    }
    (Value::Array(vs), "indexOf") => {
      let needle = arg(args, 0);
      Value::Num(vs.iter().position(|v| *v == needle).map(|i| i as f64).unwrap_or(-1.))
    }
    (Value::Str(s), "concat") => {
      let mut out = s.to_string();
      for a in args {
        out.push_str(&a.key());
      }
      Value::str(out)
    }
    (Value::Str(s), "slice") => {
      let chars: Vec<char> = s.chars().collect();
      let (start, end) = slice_bounds(chars.len(), args)?;
      Value::str(chars[start..end].iter().collect::<String>())
    }
    (Value::Str(s), "indexOf") => {
      let needle = arg(args, 0).key();
      match s.find(needle.as_str()) {
        Some(byte) => Value::Num(s[..byte].chars().count() as f64),
        None => Value::Num(-1.),
      }
    }
    (Value::Dist(d), "score") => Value::Num(d.score(&arg(args, 0))),
    (Value::Dist(d), "support") => match d.support() {
      Some(vs) => Value::array(vs),
      None => Value::Undefined,
    },
    (Value::Object(_), name) => match object.get(name) {
      Value::Native(Native::Prim(_, f)) => f(args)?,
      Value::Undefined => return Err(Error::ty(format!("{} has no method {}", object, name)).into()),
      f if f.is_callable() => {
        return Err(Error::ty(format!("{} is not a primitive function and cannot be called as a method", name)).into());
      }
      v => return Err(Error::ty(format!("{} is not a function", v)).into()),
    },
    (v, name) => return Err(Error::ty(format!("{} {} has no method {}", v.type_name(), v, name)).into()),
  })
}
