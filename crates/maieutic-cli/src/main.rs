//! Local console front-end for the maieutic kernel. Config-driven via
//! KernelConfig; reads turns from stdin and prints the kernel's questions.
//!
//! `--verify` runs a pre-flight check (config + store open) and exits.

use std::io::{BufRead, Write};

use maieutic_core::{Kernel, KernelConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pre-flight: config loads and the graph store opens at its configured path.
fn run_verify() -> Result<(), String> {
    let config = KernelConfig::load().map_err(|e| format!("Config load failed: {}", e))?;
    print!("Checking graph store at {}... ", config.storage_path);
    let kernel = Kernel::new(config).map_err(|e| format!("Store open failed: {}", e))?;
    kernel.init().map_err(|e| format!("Store probe failed: {}", e))?;
    println!("OK");
    println!("\nAll systems go. Ready to tutor.");
    Ok(())
}

fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[maieutic] .env not loaded: {} (using system environment)", e);
    }

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("Pre-flight failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = KernelConfig::load().expect("load KernelConfig");
    let debug_trace = config.debug_trace;
    let storage = config.storage_path.clone();
    let kernel = Kernel::new(config).expect("construct kernel");
    kernel.init().expect("initialize graph store");
    tracing::info!(storage = %storage, "kernel ready");

    println!("maieutic - a Socratic tutor that only asks questions");
    println!("Commands: /stats, /demons, /quit\n");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("you> ");
        stdout.flush().ok();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("stdin error: {}", e);
                break;
            }
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "/quit" | "/exit" => break,
            "/stats" => {
                match kernel.stats() {
                    Ok(stats) => println!(
                        "{}",
                        serde_json::to_string_pretty(&stats).unwrap_or_default()
                    ),
                    Err(e) => eprintln!("stats failed: {}", e),
                }
                continue;
            }
            "/demons" => {
                for demon in kernel.list_demons() {
                    println!("  {:10} {}", demon.name, demon.description);
                }
                continue;
            }
            _ => {}
        }

        let result = if debug_trace {
            kernel.process_with_trace(line)
        } else {
            kernel.process(line)
        };
        match result {
            Ok(turn) => {
                println!("tutor> {}\n", turn.text);
                if let Some(trace) = turn.trace {
                    for tick in trace {
                        println!(
                            "  [tick {}] fired={:?} wrote={} evicted={} ({}ms)",
                            tick.tick,
                            tick.demons_fired,
                            tick.slots_written,
                            tick.slots_evicted,
                            tick.duration_ms
                        );
                    }
                }
            }
            Err(e) => eprintln!("tutor> (error) {}", e),
        }
    }
}
