/// Alignment unit for every block payload, in bytes.
pub const ALIGNMENT: usize = 8;

/// Rounds `value` up to the next multiple of `unit`, or `None` on overflow.
///
/// `unit` must be a power of two.
pub const fn align_up(
  value: usize,
  unit: usize,
) -> Option<usize> {
  match value.checked_add(unit - 1) {
    Some(bumped) => Some(bumped & !(unit - 1)),
    None => None,
  }
}

/// Rounds a payload size up to the allocator's alignment unit.
///
/// # Examples
///
/// ```rust
/// use rarena::align;
///
/// assert_eq!(align!(13), Some(16));
/// assert_eq!(align!(16), Some(16));
/// assert_eq!(align!(usize::MAX), None);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align::align_up($value, $crate::align::ALIGNMENT)
  };
}

/// Rounds `value` up to an arbitrary power-of-two unit, such as a page.
///
/// ```rust
/// use rarena::align_to;
///
/// assert_eq!(align_to!(1, 4096), Some(4096));
/// assert_eq!(align_to!(8192, 4096), Some(8192));
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $unit:expr) => {
    $crate::align::align_up($value, $unit)
  };
}
