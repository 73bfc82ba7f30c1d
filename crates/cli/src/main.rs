mod error;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use policy::CapabilityPolicy;
use sandbox::{MemoryLimit, Session, SessionConfig};
use tracing_subscriber::EnvFilter;

use error::Result;

const POLICY_FILE: &str = "brig.toml";

#[derive(Parser)]
#[command(name = "brig")]
#[command(about = "Isolated evaluation sessions for untrusted code", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Memory ceiling for the session, in MiB
    #[arg(short, long, default_value = "16")]
    memory_mib: u64,

    /// Path to a TOML capability policy
    #[arg(short, long)]
    policy: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive evaluation session
    Repl,
    /// Evaluate expressions in a fresh session and exit
    Eval {
        /// Expressions to evaluate, in order
        exprs: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = session_config(&cli)?;

    match cli.command {
        Some(Commands::Eval { exprs }) => cmd_eval(config, exprs).await,
        Some(Commands::Repl) | None => cmd_repl(config).await,
    }
}

fn session_config(cli: &Cli) -> Result<SessionConfig> {
    let policy = match &cli.policy {
        Some(path) => CapabilityPolicy::load(path)?,
        None if Path::new(POLICY_FILE).exists() => CapabilityPolicy::load(POLICY_FILE)?,
        None => CapabilityPolicy::restrictive(),
    };

    Ok(SessionConfig::new()
        .with_memory_limit(MemoryLimit::from_mib(cli.memory_mib))
        .with_policy(policy))
}

async fn cmd_eval(config: SessionConfig, exprs: Vec<String>) -> Result<()> {
    let session = Session::create(config).await?;

    for expr in exprs {
        match session.evaluate(expr).await {
            Ok(value) => println!("{value}"),
            Err(e) => eprintln!("Error: {e}"),
        }
        dump_streams(&session)?;
    }

    session.kill();
    Ok(())
}

async fn cmd_repl(config: SessionConfig) -> Result<()> {
    println!("brig v{}", env!("CARGO_PKG_VERSION"));

    let memory_mib = config.memory_limit.bytes() / (1024 * 1024);
    let session = Session::create(config).await?;
    println!("Session ID: {}", session.id);
    println!("Memory ceiling: {memory_mib} MiB");
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        match session.evaluate(input).await {
            Ok(value) => println!("=> {value}"),
            Err(e) => eprintln!("Error: {e}"),
        }
        dump_streams(&session)?;

        if !session.is_alive() {
            println!("Session is dead; only drains remain. Exiting.");
            break;
        }
    }

    session.kill();
    println!("\nSession ended.");
    Ok(())
}

/// Print everything the session wrote since the last drain.
fn dump_streams(session: &Session) -> Result<()> {
    let out = session.drain_stdout();
    if !out.is_empty() {
        io::stdout().write_all(&out)?;
        println!();
    }
    let err = session.drain_stderr();
    if !err.is_empty() {
        io::stderr().write_all(&err)?;
        eprintln!();
    }
    Ok(())
}
