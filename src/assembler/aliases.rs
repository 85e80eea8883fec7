/*!
  The alias table. Every alias mnemonic rewrites, exactly once and in one
  place, into its canonical counterpart by renaming and splicing the zero
  register into the operand list; the per-group encoders never see an alias.

  | alias               | canonical                |
  |---------------------|--------------------------|
  | `neg rd, op2`       | `sub  rd, rzr, op2`      |
  | `negs rd, op2`      | `subs rd, rzr, op2`      |
  | `cmp rn, op2`       | `subs rzr, rn, op2`      |
  | `cmn rn, op2`       | `adds rzr, rn, op2`      |
  | `tst rn, op2`       | `ands rzr, rn, op2`      |
  | `mvn rd, op2`       | `orn  rd, rzr, op2`      |
  | `mov rd, rm`        | `orr  rd, rzr, rm`       |
  | `mul rd, rn, rm`    | `madd rd, rn, rm, rzr`   |
  | `mneg rd, rn, rm`   | `msub rd, rn, rm, rzr`   |

  A trailing shift suffix rides along untouched: `Vec::insert` slides it
  right past the spliced register.
*/

use super::parser::{Operand, Register};
use super::Mnemonic;

/// Rewrites `mnemonic` in place if it is an alias, splicing the zero
/// register into `operands` as the table above requires. Canonical
/// mnemonics pass through unchanged.
pub(super) fn expand(mnemonic: Mnemonic, operands: &mut Vec<Operand>) -> Mnemonic {
  use Mnemonic::*;

  match mnemonic {
    Neg  => { splice_zero(operands, 1); Sub  }
    Negs => { splice_zero(operands, 1); Subs }
    Cmp  => { splice_zero(operands, 0); Subs }
    Cmn  => { splice_zero(operands, 0); Adds }
    Tst  => { splice_zero(operands, 0); Ands }
    Mvn  => { splice_zero(operands, 1); Orn  }
    Mov  => { splice_zero(operands, 1); Orr  }
    Mul  => { operands.push(Operand::Register(Register::ZERO)); Madd }
    Mneg => { operands.push(Operand::Register(Register::ZERO)); Msub }
    other => other,
  }
}

// A short operand list is left alone here; the encoder's own arity check
// produces the diagnostic.
fn splice_zero(operands: &mut Vec<Operand>, index: usize) {
  let index = index.min(operands.len());
  operands.insert(index, Operand::Register(Register::ZERO));
}
