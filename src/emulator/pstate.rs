/*!
  The four condition flags and how branch conditions read them.
*/

use std::fmt::{Display, Formatter};

use crate::isa::Condition;

/// Processor state. Flag-setting arithmetic writes all four; flag-setting
/// logic writes N and Z and clears C and V.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PState {
  pub negative : bool,
  pub zero     : bool,
  pub carry    : bool,
  pub overflow : bool,
}

impl PState {

  pub fn new() -> PState {
    PState::default()
  }

  /// Whether a conditional branch with `cond` is taken in this state.
  pub fn satisfies(&self, cond: Condition) -> bool {
    match cond {
      Condition::Eq => self.zero,
      Condition::Ne => !self.zero,
      Condition::Ge => self.negative == self.overflow,
      Condition::Lt => self.negative != self.overflow,
      Condition::Gt => !self.zero && self.negative == self.overflow,
      Condition::Le => !(!self.zero && self.negative == self.overflow),
      Condition::Al => true,
    }
  }
}

/// Fixed-order `NZCV`, with `-` for a clear flag; `----` when nothing is set.
impl Display for PState {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}{}{}{}",
      if self.negative { "N" } else { "-" },
      if self.zero     { "Z" } else { "-" },
      if self.carry    { "C" } else { "-" },
      if self.overflow { "V" } else { "-" },
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_order_is_nzcv() {
    assert_eq!(PState::new().to_string(), "----");
    let state = PState { negative: false, zero: true, carry: true, overflow: false };
    assert_eq!(state.to_string(), "-ZC-");
    let state = PState { negative: true, zero: true, carry: true, overflow: true };
    assert_eq!(state.to_string(), "NZCV");
  }

  #[test]
  fn signed_comparisons_use_n_and_v() {
    // After `cmp a, b` with a < b (no overflow): N set, V clear.
    let less = PState { negative: true, zero: false, carry: false, overflow: false };
    assert!(less.satisfies(Condition::Lt));
    assert!(less.satisfies(Condition::Le));
    assert!(less.satisfies(Condition::Ne));
    assert!(!less.satisfies(Condition::Ge));
    assert!(!less.satisfies(Condition::Gt));

    // Equal: Z set, N = V.
    let equal = PState { negative: false, zero: true, carry: true, overflow: false };
    assert!(equal.satisfies(Condition::Eq));
    assert!(equal.satisfies(Condition::Ge));
    assert!(equal.satisfies(Condition::Le));
    assert!(!equal.satisfies(Condition::Gt));
    assert!(!equal.satisfies(Condition::Lt));

    // `al` ignores the flags entirely.
    assert!(PState::new().satisfies(Condition::Al));
  }
}
