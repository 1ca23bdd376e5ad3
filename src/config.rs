use crate::{arena::page_size, strategy::Strategy};

/// Settings applied once by [`FreeListAllocator::init_with`].
///
/// [`FreeListAllocator::init_with`]: crate::FreeListAllocator::init_with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  /// Minimum arena size in bytes, rounded up to a page by the provider.
  pub capacity: usize,
  pub strategy: Strategy,
  /// Stamp allocated headers with a canary and verify it on release.
  pub hardened: bool,
}

impl Config {
  pub fn new(
    capacity: usize,
    strategy: Strategy,
  ) -> Self {
    Self {
      capacity,
      strategy,
      hardened: false,
    }
  }

  pub fn hardened(
    mut self,
    hardened: bool,
  ) -> Self {
    self.hardened = hardened;
    self
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new(page_size(), Strategy::default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.capacity, page_size());
    assert_eq!(config.strategy, Strategy::FirstFit);
    assert!(!config.hardened);
  }

  #[test]
  fn test_builder() {
    let config = Config::new(8192, Strategy::WorstFit).hardened(true);

    assert_eq!(config.capacity, 8192);
    assert_eq!(config.strategy, Strategy::WorstFit);
    assert!(config.hardened);
  }
}
