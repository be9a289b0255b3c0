/// Calculates the machine word alignment for the given size.
///
/// # Examples
///
/// ```rust
/// use rfreelist::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, ::core::mem::size_of::<usize>())
  };
}

/// Rounds `value` up to the next multiple of `alignment`, which must be a
/// power of two.
///
/// # Examples
///
/// ```rust
/// use rfreelist::align_to;
///
/// assert_eq!(align_to!(17, 16), 32);
/// assert_eq!(align_to!(64, 32), 64);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Returns the number of bytes between `address` and the first address that
/// both leaves room for a `header_size` record in front of it and is a
/// multiple of `alignment`.
///
/// ```text
///   address                         address + padding
///      │                                   │
///      ▼                                   ▼
///      ┌───────────────┬───────────────────┬──────────────
///      │ align padding │      header       │  payload ...
///      └───────────────┴───────────────────┴──────────────
///      ◄──────────────── padding ─────────►
/// ```
///
/// Returns `None` if the computation overflows the address space.
pub fn padding_with_header(
  address: usize,
  alignment: usize,
  header_size: usize,
) -> Option<usize> {
  debug_assert!(alignment.is_power_of_two());

  let earliest = address.checked_add(header_size)?;
  let aligned = earliest.checked_add(alignment - 1)? & !(alignment - 1);

  Some(aligned - address)
}
