/*!
  The emulator executable: loads a flat binary at address 0, runs it to the
  halt word, and dumps the final registers, PSTATE and non-zero memory to the
  given file or to stdout.
*/

use std::fs;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use armlet::{Emulator, Error, Result};

#[derive(Parser)]
#[command(name = "emulate", about = "Run an AArch64-subset binary and dump the final state.")]
struct Args {
  /// Binary image of little-endian 32-bit words, loaded at address 0.
  input: PathBuf,

  /// Where to write the final state; stdout when omitted.
  output: Option<PathBuf>,
}

fn main() -> ExitCode {
  let args = Args::parse();
  match run(&args) {
    Ok(()) => ExitCode::SUCCESS,
    Err(error) => {
      eprintln!("emulate: {}", error);
      ExitCode::FAILURE
    }
  }
}

fn run(args: &Args) -> Result<()> {
  let image = fs::read(&args.input).map_err(|source| Error::Io {
    path: args.input.clone(),
    source,
  })?;

  let mut emulator = Emulator::new();
  emulator.load_image(&image)?;
  emulator.run()?;

  match &args.output {
    Some(path) => {
      let file = fs::File::create(path).map_err(|source| Error::Io {
        path: path.clone(),
        source,
      })?;
      let mut out = BufWriter::new(file);
      emulator.write_state(&mut out).map_err(|source| Error::Io {
        path: path.clone(),
        source,
      })
    }
    None => {
      let stdout = io::stdout();
      emulator.write_state(&mut stdout.lock()).map_err(|source| Error::Io {
        path: PathBuf::from("<stdout>"),
        source,
      })
    }
  }
}
