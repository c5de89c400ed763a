// Partial-sum read-modify-write merge

use super::{AccVec, ARRAY_DIM};

/// Merge a freshly computed partial-sum vector into the stored one.
///
/// Each lane is independent: `clear` overwrites, otherwise the lanes are added
/// with two's-complement wrap-around like the 32-bit hardware adders.
pub fn accumulate(clear: bool, new_psum: &AccVec, stored: &AccVec) -> AccVec {
  let mut out = [0; ARRAY_DIM];
  for i in 0..ARRAY_DIM {
    out[i] = if clear {
      new_psum[i]
    } else {
      stored[i].wrapping_add(new_psum[i])
    };
  }
  out
}

/// Zero every lane at or above `lanes`.
pub fn mask_lanes(mut v: AccVec, lanes: usize) -> AccVec {
  v.iter_mut().skip(lanes).for_each(|lane| *lane = 0);
  v
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_clear_overwrites() {
    let new = [3; ARRAY_DIM];
    let stored = [100; ARRAY_DIM];
    assert_eq!(accumulate(true, &new, &stored), new);
  }

  #[test]
  fn test_accumulate_per_lane() {
    let mut new = [0; ARRAY_DIM];
    let mut stored = [0; ARRAY_DIM];
    for i in 0..ARRAY_DIM {
      new[i] = i as i32;
      stored[i] = -2 * i as i32;
    }
    let out = accumulate(false, &new, &stored);
    for i in 0..ARRAY_DIM {
      assert_eq!(out[i], -(i as i32));
    }
  }

  #[test]
  fn test_accumulate_wraps() {
    let new = [1; ARRAY_DIM];
    let stored = [i32::MAX; ARRAY_DIM];
    assert_eq!(accumulate(false, &new, &stored), [i32::MIN; ARRAY_DIM]);
  }

  #[test]
  fn test_mask_lanes() {
    let v = mask_lanes([9; ARRAY_DIM], 3);
    assert_eq!(&v[..3], &[9, 9, 9]);
    assert!(v[3..].iter().all(|lane| *lane == 0));
    assert_eq!(mask_lanes([9; ARRAY_DIM], ARRAY_DIM), [9; ARRAY_DIM]);
  }
}
