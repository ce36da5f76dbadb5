mod cli;
mod config;
mod runner;

use clap::Parser;

fn main() {
    let cli = cli::Cli::parse();
    if let Err(error) = runner::run(cli) {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}
