/// Settings for compiling and running a program.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
  /// Seed for forward sampling; `None` draws one from the OS.
  pub seed: Option<u64>,
  /// Compile the standard library (`flip`, `condition`, ...) in front of
  /// every program.
  pub prelude: bool,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      seed: None,
      prelude: true,
    }
  }
}
