/*!
  The error taxonomy for both engines. Every error is fatal: the assembler and
  the emulator are deterministic offline translators, so nothing here is ever
  recovered from, only reported and propagated to the binary's exit status.
*/

use std::path::PathBuf;

use thiserror::Error;

use crate::isa::Word;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{}: {source}", path.display())]
  Io {
    path   : PathBuf,
    #[source]
    source : std::io::Error,
  },

  #[error("line {line}: unknown mnemonic `{token}`")]
  UnknownMnemonic { line: u32, token: String },

  #[error("line {line}: unknown directive `{token}`")]
  UnknownDirective { line: u32, token: String },

  #[error("line {line}: `{mnemonic}` requires {required} operands but was given {found}")]
  WrongOperandCount {
    line     : u32,
    mnemonic : String,
    required : usize,
    found    : usize,
  },

  #[error("line {line}: cannot parse `{text}`")]
  MalformedLine { line: u32, text: String },

  #[error("line {line}: `{token}` is not valid here")]
  BadOperand { line: u32, token: String },

  #[error("label `{label}` defined at both 0x{first:x} and 0x{second:x}")]
  DuplicateLabel { label: String, first: Word, second: Word },

  #[error("unresolved labels at end of input: {}", labels.join(", "))]
  UnresolvedLabels { labels: Vec<String> },

  // Internal: a pending reference pointed at a word with no displacement field.
  #[error("word 0x{word:08x} at 0x{address:x} has no label displacement field")]
  BadPatchSite { word: Word, address: Word },

  #[error("unknown instruction 0x{word:08x} at PC 0x{pc:x}")]
  UnknownInstruction { word: Word, pc: u64 },

  #[error("out of bounds access of {size} bytes at memory address 0x{address:x}")]
  OutOfBounds { address: Word, size: u32 },

  #[error("binary image of {size} bytes does not fit in memory")]
  ImageTooLarge { size: usize },

  #[error("register {index} does not exist")]
  InvalidRegister { index: u32 },

  #[error("cannot write to the stack pointer")]
  StackPointerWrite,
}
