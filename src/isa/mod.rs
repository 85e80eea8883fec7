/*!

  The instruction set uses a 32 bit little-endian word size. Every instruction
  is exactly one word, and memory addresses are byte addresses. The same word
  can be viewed through different variant lenses depending on a handful of
  selector bits; rather than overlapping packed bit-fields, each variant here
  is a plain struct-like enum case carrying only the fields it gives meaning
  to, and `binary` holds the one table of masks and shifts that maps between
  the two representations.

  Signed fields (`simm9`, `simm19`, `simm26`) are stored sign-extended in the
  decoded representation and re-narrowed on encode. All sign extension flows
  through `sign_extend` so that no variant re-implements it.

*/

pub(crate) mod binary;
mod instruction;

pub use binary::try_decode;
pub use instruction::{
  Condition, Instruction, LogicOp, ShiftKind, WideOp, Word,
};

/// Size of one instruction in bytes.
pub const INSTRUCTION_SIZE: Word = 4;

/// The halt sentinel. Bit-identical to `and x0, x0, x0`; fetching this word
/// terminates execution.
pub const HALT: Word = 0x8A00_0000;

/// Interprets the low `bit_length` bits of `bits` as a two's complement
/// number and widens it to an `i64`.
pub fn sign_extend(bits: u64, bit_length: u32) -> i64 {
  let shift = 64 - bit_length;
  ((bits << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sign_extend_widths() {
    assert_eq!(sign_extend(0b1_1111_1111, 9), -1);
    assert_eq!(sign_extend(0b0_1111_1111, 9), 255);
    assert_eq!(sign_extend(0x7FFFF, 19), -1);
    assert_eq!(sign_extend(0x3FFFF, 19), 0x3FFFF);
    assert_eq!(sign_extend(0x200_0000, 26), -(1 << 25));
    assert_eq!(sign_extend(0, 26), 0);
  }
}
