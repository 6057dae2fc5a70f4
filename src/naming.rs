use crate::lang::{Expr, Func, Program, Var};
use crate::syntax::{in_program, is_primitive, Genvar};
use crate::visit::Folder;

use anyhow::Result;

/// Threads call-site addresses through a thunkified program. Every function
/// gets a leading `_addressN` parameter; every non-primitive call passes the
/// innermost enclosing address extended with a fresh fragment.
#[derive(Default)]
pub struct Naming {
  gen: Genvar,
  addresses: Vec<Var>,
}

impl Naming {
  pub fn run(program: &Program) -> Result<Program> {
    in_program("naming", program, |f| Ok(Naming::default().fold_func(f)))
  }
}

impl Folder for Naming {
  fn fold_func(&mut self, f: &Func) -> Expr {
    let address = self.gen.fresh("address");
    self.addresses.push(address);
    let body = self.fold_stmts(&f.body);
    self.addresses.pop();

    let params = std::iter::once(address).chain(f.params.iter().copied()).collect();
    Expr::func(f.name, params, body)
  }

  fn fold_app(&mut self, callee: &Expr, args: &[Expr]) -> Expr {
    let app = self.super_fold_app(callee, args);
    match (app, self.addresses.last().copied()) {
      (Expr::App(callee, mut args), Some(address)) if !is_primitive(&callee) => {
        let extension = Expr::call(Expr::member(Expr::EVar(address), "concat"), vec![self.gen.literal()]);
        args.insert(0, extension);
        Expr::App(callee, args)
      }
      (app, _) => app,
    }
  }
}
