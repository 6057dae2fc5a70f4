use cpsppl::{compile_with, run_sliced, Config, Distribution, Runtime, Step, Trampoline, Value};

use anyhow::{anyhow, Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

struct Options {
  config: Config,
  print_cps: bool,
  slice: Option<Duration>,
  timeout: Option<Duration>,
  filename: PathBuf,
}

fn parse() -> Result<Options> {
  let mut args = pico_args::Arguments::from_env();

  if args.contains(["-h", "--help"]) {
    println!("Usage: cpsppl [options] <input file>");
    println!("Options:");
    println!("  -h, --help: Print this help message");
    println!("  --print-cps: Print the compiled program before running it");
    println!("  --no-prelude: Do not compile the standard library in front of the program");
    println!("  --seed <n>: Seed the random number generator");
    println!("  --slice-ms <n>: Run in time slices of n milliseconds");
    println!("  --timeout-ms <n>: Cancel a sliced run after n milliseconds");
    std::process::exit(0);
  }

  let print_cps = args.contains("--print-cps");
  let prelude = !args.contains("--no-prelude");
  let seed = args.opt_value_from_str::<_, u64>("--seed")?;
  let slice = args.opt_value_from_str::<_, u64>("--slice-ms")?.map(Duration::from_millis);
  let timeout = args.opt_value_from_str::<_, u64>("--timeout-ms")?.map(Duration::from_millis);
  let filename = args.free_from_str::<PathBuf>()?;

  Ok(Options {
    config: Config { seed, prelude },
    print_cps,
    slice: slice.or_else(|| timeout.map(|_| Duration::from_millis(10))),
    timeout,
    filename,
  })
}

fn show(v: &Value) -> String {
  match v {
    Value::Dist(d) => match d.support() {
      Some(support) => support
        .iter()
        .map(|x| format!("{}: {}", x, d.score(x).exp()))
        .collect::<Vec<_>>()
        .join("\n"),
      None => format!("{:?}", d),
    },
    v => v.to_string(),
  }
}

fn main() -> Result<()> {
  env_logger::init();
  let options = parse()?;

  let src = fs::read_to_string(&options.filename)
    .with_context(|| format!("cannot read {}", options.filename.display()))?;
  let compiled = compile_with(&src, &options.config)?;
  if options.print_cps {
    println!("{}", compiled.to_pretty(100));
  }

  let mut rt = Runtime::new(&options.config);
  let started = Instant::now();
  let value = match options.slice {
    None => compiled.run(&mut rt)?,
    Some(budget) => {
      let exit = Value::cont("exit", |_, v| Ok(Step::Done(v)));
      let trampoline = Trampoline::new(compiled.start(&mut rt, exit)?);
      let timeout = options.timeout;
      run_sliced(&mut rt, trampoline, budget, |cancel| {
        if timeout.map_or(false, |t| started.elapsed() >= t) {
          cancel.cancel();
        }
      })
      .map_err(|e| anyhow!("{} after {:?}", e, started.elapsed()))?
    }
  };
  info!("finished in {:?}", started.elapsed());
  println!("{}", show(&value));
  Ok(())
}
