/*!

  An assembler and an emulator for a subset of the AArch64 (ARMv8-A, 64-bit)
  instruction set, sharing one description of the binary instruction formats.

  The assembler turns textual assembly into a sequence of little-endian 32-bit
  machine words, resolving label references (including forward references) with
  in-place back-patching. The emulator loads such a sequence at address zero
  and runs a fetch/decode/execute loop over a register file, four condition
  flags, and a flat byte-addressable memory until it fetches the halt word.

  A debugger front-end can compose the two: `Assembler::assemble_line`
  additionally records an address ↔ source-line map, and
  `Emulator::step_instruction` runs exactly one cycle.

*/

#[macro_use]
extern crate prettytable;
#[macro_use]
extern crate lazy_static;

pub mod assembler;
pub mod emulator;
pub mod error;
pub mod isa;
pub mod symboltable;

pub use crate::assembler::Assembler;
pub use crate::emulator::Emulator;
pub use crate::error::{Error, Result};
