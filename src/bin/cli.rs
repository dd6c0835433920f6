//! RespKV CLI Client
//!
//! Command-line interface for interacting with RespKV.

use clap::{Parser, Subcommand};
use respkv::{Client, Config};
use tracing_subscriber::{fmt, EnvFilter};

/// RespKV CLI
#[derive(Parser, Debug)]
#[command(name = "respkv-cli")]
#[command(about = "CLI for the RespKV key-value store")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    server: String,

    /// Give up after this many milliseconds without a reply
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ping the server
    Ping {
        /// Optional message to echo instead of PONG
        message: Option<String>,
    },

    /// Echo a message
    Echo {
        /// The message to echo
        message: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },
}

fn main() {
    // Logs go to stderr so they never mix with command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();

    let config = Config::builder()
        .addr(&args.server)
        .idle_timeout_ms(args.timeout_ms)
        .build();

    let client = match Client::connect_with(&args.server, &config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("(error) {}", e);
            std::process::exit(1);
        }
    };

    match run(&client, args.command) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("(error) {}", e);
            std::process::exit(1);
        }
    }
}

/// Execute one command and format its result
fn run(client: &Client, command: Commands) -> respkv::Result<String> {
    let output = match command {
        Commands::Ping { message } => client.ping(message.as_deref())?,
        Commands::Echo { message } => client.echo(&message)?,
        Commands::Set { key, value } => {
            client.set(&key, &value)?;
            "OK".to_string()
        }
        Commands::Get { key } => match client.get(&key)? {
            Some(value) => format!("\"{}\"", value),
            None => "(nil)".to_string(),
        },
        Commands::Del { key } => format!("(integer) {}", client.del(&key)?),
    };
    Ok(output)
}
