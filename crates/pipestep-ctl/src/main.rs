//! pipestep-ctl — command-line client for the pipestep service.

mod cmd;

use anyhow::{Context, Result};

use cmd::{graph, run, status, step, vars};

const DEFAULT_PORT: u16 = 8787;

fn print_usage() {
    println!("Usage: pipestep-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                 Show service version and task types");
    println!("  graph <spec-file>      Show the dependency graph of a job spec");
    println!("  vars <json-file>       Convert typed variables into an environment");
    println!("  step <json-file>       Execute one step request");
    println!("  run <spec-file>        Simulate a whole job spec step by step");
    println!("      [--vars <json-file>]        typed variables for the first environment");
    println!("      [--mock <node>=<json>]...   use a value instead of running a node");
    println!();
    println!("Options:");
    println!("  --port <port>   Service port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
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

    match remaining.as_slice() {
        ["status"] | [] => status::cmd_status(port).await,
        ["graph", file] => graph::cmd_graph(port, file).await,
        ["vars", file] => vars::cmd_vars(port, file).await,
        ["step", file] => step::cmd_step(port, file).await,
        ["run", file, rest @ ..] => run::cmd_run(port, file, rest).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
