use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod baseline;
mod cli;
mod contract;
mod facts;
mod policy;
mod probe;
mod process;
mod report;
mod sandbox;
mod snapshot;
mod supervise;
mod surface;
mod util;
mod workflow;

fn main() {
    // Artifacts and "wrote ..." lines go to stdout; diagnostics stay on
    // stderr so piped output remains machine-readable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let args = cli::RootArgs::parse();
    match workflow::run(args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
