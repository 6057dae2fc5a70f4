use crate::error::Error;
use crate::store::Store;
use crate::value::Value;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::str::FromStr;

/// Order in which enumeration explores pending choice points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Highest path score first.
  LikelyFirst,
  DepthFirst,
  BreadthFirst,
}

impl Strategy {
  /// Likely-first pays off only when the budget truncates the search.
  pub fn default_for(max_executions: Option<usize>) -> Self {
    match max_executions {
      Some(_) => Strategy::LikelyFirst,
      None => Strategy::DepthFirst,
    }
  }
}

impl FromStr for Strategy {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Error> {
    match s {
      "likelyFirst" | "likely-first" => Ok(Strategy::LikelyFirst),
      "depthFirst" | "depth-first" => Ok(Strategy::DepthFirst),
      "breadthFirst" | "breadth-first" => Ok(Strategy::BreadthFirst),
      _ => Err(Error::options("Enumerate", format!("unknown strategy {:?}", s))),
    }
  }
}

/// A saved choice point: resume `k` with `value`, with the path score and
/// store it had.
#[derive(Clone)]
pub struct Entry {
  pub k: Value,
  pub value: Value,
  pub score: f64,
  pub store: Store,
}

pub struct Ranked {
  entry: Entry,
  seq: u64,
}

impl PartialEq for Ranked {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

// Max-heap on score; among equal scores the earlier entry wins.
impl Ord for Ranked {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .entry
      .score
      .total_cmp(&other.entry.score)
      .then_with(|| other.seq.cmp(&self.seq))
  }
}

pub enum Frontier {
  Heap { heap: BinaryHeap<Ranked>, seq: u64 },
  Stack(Vec<Entry>),
  Queue(VecDeque<Entry>),
}

impl Frontier {
  pub fn new(strategy: Strategy) -> Self {
    match strategy {
      Strategy::LikelyFirst => Frontier::Heap {
        heap: BinaryHeap::new(),
        seq: 0,
      },
      Strategy::DepthFirst => Frontier::Stack(Vec::new()),
      Strategy::BreadthFirst => Frontier::Queue(VecDeque::new()),
    }
  }

  pub fn push(&mut self, entry: Entry) {
    match self {
      Frontier::Heap { heap, seq } => {
        heap.push(Ranked { entry, seq: *seq });
        *seq += 1;
      }
      Frontier::Stack(stack) => stack.push(entry),
      Frontier::Queue(queue) => queue.push_back(entry),
    }
  }

  pub fn pop(&mut self) -> Option<Entry> {
    match self {
      Frontier::Heap { heap, .. } => heap.pop().map(|r| r.entry),
      Frontier::Stack(stack) => stack.pop(),
      Frontier::Queue(queue) => queue.pop_front(),
    }
  }

  pub fn len(&self) -> usize {
    match self {
      Frontier::Heap { heap, .. } => heap.len(),
      Frontier::Stack(stack) => stack.len(),
      Frontier::Queue(queue) => queue.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&mut self) {
    match self {
      Frontier::Heap { heap, .. } => heap.clear(),
      Frontier::Stack(stack) => stack.clear(),
      Frontier::Queue(queue) => queue.clear(),
    }
  }
}
