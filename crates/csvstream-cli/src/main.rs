//! csvstream CLI.

use std::io;

use clap::Parser;

use csvstream_cli::cli::{Cli, Command};
use csvstream_cli::commands::{run_schema, run_show, run_stats};
use csvstream_cli::logging::{LogConfig, init_logging};
use csvstream_cli::render::{print_schema, print_show, print_stats, write_json_lines};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    if let Err(error) = init_logging(&LogConfig::from_cli(&cli)) {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
    let outcome = match &cli.command {
        Command::Show(args) => run_show(args).and_then(|output| {
            if args.json {
                write_json_lines(&output, &mut io::stdout().lock())?;
            } else {
                print_show(&output);
            }
            Ok(())
        }),
        Command::Stats(args) => run_stats(args).map(|stats| print_stats(&stats)),
        Command::Schema(args) => run_schema(args).map(|schema| print_schema(&schema)),
    };
    let exit_code = match outcome {
        Ok(()) => 0,
        Err(error) => {
            tracing::error!("{error:#}");
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}
