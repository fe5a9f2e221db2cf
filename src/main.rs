// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::process::ExitCode;

use clap::Parser;

use video_annotate::cli::args::{Cli, Commands};
use video_annotate::cli::logging::{init_tracing, set_verbose};
use video_annotate::cli::predict::run_prediction;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Predict(args) => {
            set_verbose(args.verbose);
            init_tracing(args.verbose);
            run_prediction(&args)
        }
    }
}
