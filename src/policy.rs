use std::{fmt, str::FromStr};

use crate::{
  align::padding_with_header,
  arena::Arena,
  block::HEADER_SIZE,
  error::AllocError,
  free_list::{Cursor, FreeList},
};

/// Strategy used to pick the free region that serves a request.
///
/// ```text
///   request: 40 bytes
///
///   free list:  [ 64 ] ──► [ 48 ] ──► [ 256 ]
///                  ▲          ▲
///                  │          └── BestFit  (smallest leftover)
///                  └───────────── FirstFit (lowest address)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Policy {
  /// Take the first region, in address order, that fits.
  #[default]
  FirstFit,
  /// Scan every region and take the one leaving the fewest spare bytes.
  /// Ties go to the lowest address.
  BestFit,
}

/// A free region selected for an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fit {
  pub cursor: Cursor,
  /// Bytes from the region start to the payload, header included.
  pub padding: usize,
}

impl Fit {
  /// Bytes of the region the request consumes before any remainder.
  pub fn required(
    &self,
    size: usize,
  ) -> usize {
    size + self.padding
  }

  pub fn leftover(
    &self,
    size: usize,
  ) -> usize {
    self.cursor.region.size - self.required(size)
  }
}

impl Policy {
  /// Searches `list` for a region able to hold a header followed by `size`
  /// bytes aligned to `alignment`.
  pub(crate) fn find(
    self,
    list: &FreeList,
    arena: &Arena,
    size: usize,
    alignment: usize,
  ) -> Option<Fit> {
    let mut candidates = list
      .iter(arena)
      .filter_map(|cursor| fit(arena.base(), cursor, size, alignment));

    match self {
      Policy::FirstFit => candidates.next(),
      Policy::BestFit => {
        let mut best: Option<Fit> = None;
        let mut smallest = usize::MAX;

        for candidate in candidates {
          let leftover = candidate.leftover(size);

          if leftover < smallest {
            smallest = leftover;
            best = Some(candidate);

            if leftover == 0 {
              break;
            }
          }
        }

        best
      }
    }
  }
}

fn fit(
  base: usize,
  cursor: Cursor,
  size: usize,
  alignment: usize,
) -> Option<Fit> {
  let padding = padding_with_header(base + cursor.offset, alignment, HEADER_SIZE)?;
  let required = size.checked_add(padding)?;

  (cursor.region.size >= required).then_some(Fit { cursor, padding })
}

impl fmt::Display for Policy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Policy::FirstFit => f.write_str("first-fit"),
      Policy::BestFit => f.write_str("best-fit"),
    }
  }
}

impl FromStr for Policy {
  type Err = AllocError;

  fn from_str(
    s: &str,
  ) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "first-fit" | "first_fit" | "first" => Ok(Policy::FirstFit),
      "best-fit" | "best_fit" | "best" => Ok(Policy::BestFit),
      other => Err(AllocError::invalid_argument(format!(
        "unknown placement policy {other:?}"
      ))),
    }
  }
}
