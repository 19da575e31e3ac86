//! # notesync CLI
//!
//! The binary is intentionally thin: the CLI lives in `src/cli/`, while this
//! file only invokes `cli::run()` and handles process termination.
//!
//! Each invocation is one short session against the local store: the store
//! snapshot and the stored credential are loaded from the data directory,
//! the command runs to completion on the event loop, and the snapshot is
//! written back.

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
