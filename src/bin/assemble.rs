/*!
  The assembler executable: reads an assembly source file and writes the
  machine words as a headerless little-endian binary.
*/

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use armlet::{Assembler, Error, Result};

#[derive(Parser)]
#[command(name = "assemble", about = "Assemble AArch64-subset source into a flat binary.")]
struct Args {
  /// Assembly source file (`\n`-terminated UTF-8 lines).
  input: PathBuf,

  /// Output binary of little-endian 32-bit words.
  output: PathBuf,
}

fn main() -> ExitCode {
  let args = Args::parse();
  match run(&args) {
    Ok(()) => ExitCode::SUCCESS,
    Err(error) => {
      eprintln!("assemble: {}", error);
      ExitCode::FAILURE
    }
  }
}

fn run(args: &Args) -> Result<()> {
  let source = fs::read_to_string(&args.input).map_err(|source| Error::Io {
    path: args.input.clone(),
    source,
  })?;

  let words = Assembler::assemble_source(&source)?;

  let mut bytes = Vec::with_capacity(words.len() * 4);
  for word in &words {
    bytes.extend_from_slice(&word.to_le_bytes());
  }

  fs::write(&args.output, bytes).map_err(|source| Error::Io {
    path: args.output.clone(),
    source,
  })
}
