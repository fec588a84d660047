use clap::Parser;
use fmc_client::app::{init_tracing, Cli};

fn main() {
    let cli = Cli::parse();
    init_tracing();
    if let Err(err) = fmc_client::run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
