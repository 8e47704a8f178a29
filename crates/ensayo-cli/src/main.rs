//! Ensayo CLI: end-to-end browser test sessions
//!
//! ## Usage
//!
//! ```bash
//! ensayo                                  # install, build, serve, run all tests
//! ensayo --nobuild --files='**/login.*'   # one file against the last build
//! ensayo --watch --testnames              # re-run files as they change
//! ```

use clap::Parser;
use console::style;
use ensayo_cli::{exit_status, logging, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.debug, cli.log_format);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} cannot start runtime: {e}", style("Error:").red().bold());
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(ensayo_cli::run(cli)) {
        Ok(code) => exit_status(code),
        Err(e) => {
            eprintln!("{} {e}", style("Error:").red().bold());
            exit_status(e.exit_code())
        }
    }
}
