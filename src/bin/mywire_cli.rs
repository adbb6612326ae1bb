use std::io::{self, Read, Write};

use clap::Parser;
use mywire::{Command, Conn, Error, format_result, prompt};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address, host:port or the path of a unix socket
    address: String,
    #[arg(long, default_value = "root")]
    user: String,
    #[arg(long, default_value = "")]
    password: String,
    /// Database to select after connecting
    #[arg(long, default_value = "")]
    db: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    if cli.address.contains('/') {
        #[cfg(unix)]
        return repl(Conn::connect_unix(&cli.address, &cli.user, &cli.password, &cli.db)?);
        #[cfg(not(unix))]
        return Err("unix sockets are not supported on this platform".into());
    }
    repl(Conn::connect(&cli.address, &cli.user, &cli.password, &cli.db)?)
}

fn repl<S: Read + Write>(mut conn: Conn<S>) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Connected to {} (connection id {})",
        conn.server_version(),
        conn.connection_id()
    );

    let stdin = io::stdin();
    let stdout = io::stdout();

    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let res = match cmd {
            Command::Exit => break,
            Command::Ping => conn.ping().map(|_| "pong".to_string()),
            Command::Use(db) => conn.use_db(&db).map(|_| "Database changed".to_string()),
            Command::Statement(sql) if sql.is_empty() => continue,
            Command::Statement(sql) => conn
                .execute(&sql)
                .and_then(|mut result| format_result(&mut result).map_err(|e| Error::Application(e.into()))),
        };

        match res {
            Ok(out) => println!("{out}"),
            Err(e) if e.is_fatal() => {
                eprintln!("connection lost: {e}");
                break;
            }
            Err(e) => eprintln!("{e}"),
        }
    }

    conn.close();
    Ok(())
}
