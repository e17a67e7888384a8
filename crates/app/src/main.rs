use ais_app::config::Cli;
use clap::Parser;

fn main() {
    let cli = Cli::parse();
    std::process::exit(ais_app::lifecycle::run(&cli));
}
