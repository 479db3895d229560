//! dupesift - duplicate file detection
//!
//! Entry point for the dupesift CLI application.

use clap::Parser;
use dupesift::{
    cli::Cli,
    error::{DetectError, ExitCode, StructuredError},
    logging::init_logging,
};

fn main() {
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    init_logging(cli.verbose, cli.quiet);

    match dupesift::run_app(cli) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            let exit_code = if err
                .downcast_ref::<DetectError>()
                .is_some_and(|e| matches!(e, DetectError::Interrupted))
            {
                ExitCode::Interrupted
            } else {
                ExitCode::GeneralError
            };

            if json_errors {
                let structured = StructuredError::new(&err, exit_code);
                match serde_json::to_string_pretty(&structured) {
                    Ok(json) => eprintln!("{json}"),
                    Err(_) => eprintln!("[{}] Error: {err:#}", exit_code.code_prefix()),
                }
            } else {
                eprintln!("[{}] Error: {err:#}", exit_code.code_prefix());
            }

            std::process::exit(exit_code.as_i32());
        }
    }
}
