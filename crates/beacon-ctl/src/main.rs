//! beacon-ctl: command-line interface for the Beacon daemon.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 53318;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Status,
    Peers,
    Help,
}

fn print_usage() {
    println!("Usage: beacon-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status   Show local identity, group, and announce state");
    println!("  peers    List discovered peers, most recently seen first");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

/// Split `--port` from the command words.
fn parse_args(args: &[String]) -> Result<(u16, Option<Command>)> {
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    let command = match remaining.as_slice() {
        ["status"] | [] => Some(Command::Status),
        ["peers"] => Some(Command::Peers),
        ["help"] | ["--help"] | ["-h"] => Some(Command::Help),
        _ => None,
    };
    Ok((port, command))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (port, command) = parse_args(&args)?;

    match command {
        Some(Command::Status) => cmd::status::cmd_status(port).await,
        Some(Command::Peers) => cmd::peers::cmd_peers(port).await,
        Some(Command::Help) => {
            print_usage();
            Ok(())
        }
        None => {
            eprintln!("Unknown command: {}", args.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
