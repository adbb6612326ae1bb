use std::{error::Error, sync::atomic::Ordering};

use clap::Parser;
use log::info;
use mywire::server::{Credentials, EmptyHandler, Server};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for new connections at address
    address: String,
    /// Account clients must authenticate as
    #[arg(long, default_value = "root")]
    user: String,
    /// Password for the account
    #[arg(long, default_value = "")]
    password: String,
    /// Number of connections served at once
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u16).range(1..))]
    workers: u16,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let credentials = Credentials::new(cli.user, cli.password);
    let workers = usize::from(cli.workers);
    let server = Server::bind(cli.address.as_str(), credentials, workers, || EmptyHandler)?;

    let running = server.running();
    ctrlc::set_handler(move || {
        info!("shutting down");
        running.store(false, Ordering::SeqCst);
    })?;

    server.listen()?;
    Ok(())
}
