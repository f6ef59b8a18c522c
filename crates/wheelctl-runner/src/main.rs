use clap::Parser;
use tracing::error;

use wheelctl_runner::{init_logging, run, Args};

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_level.as_deref()) {
        eprintln!("wheelctl: {}", e);
        std::process::exit(2);
    }

    if let Err(e) = run(args) {
        error!("wheelctl: {}", e);
        std::process::exit(1);
    }
}
