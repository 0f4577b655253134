//! Virtual Memory Simulator CLI.
//!
//! Loads a configuration, builds the translation hierarchy, replays an
//! access trace (from a file or generated) and prints the statistics.

use clap::Parser;
use std::{fs, process};
use tracing_subscriber::EnvFilter;

use vmem_sim::common::Result;
use vmem_sim::config::Config;
use vmem_sim::sim::{load_trace, Simulation, SyntheticWorkload};
use vmem_sim::stats::SimStats;

/// Command-line arguments for the virtual memory simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "Virtual Memory Subsystem Simulator")]
struct Args {
    #[arg(short, long, default_value = "configs/default.toml")]
    config: String,

    /// Trace file of `<core> <R|W|F> <hex address>` lines.
    #[arg(short, long)]
    trace: Option<String>,

    /// Synthetic workload: total accesses.
    #[arg(long, default_value_t = 100_000)]
    accesses: usize,

    /// Synthetic workload: bytes between accesses of one core.
    #[arg(long, default_value_t = 4096)]
    stride: u64,

    /// Synthetic workload: bytes swept before wrapping.
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    footprint: u64,

    /// Write the statistics as JSON to this path.
    #[arg(long)]
    stats_json: Option<String>,

    /// Log walk, fault and rehash activity.
    #[arg(short, long)]
    verbose: bool,
}

/// Main entry point.
///
/// # Behavior
///
/// 1. **Configuration**: Parses arguments and loads the TOML configuration.
/// 2. **Initialization**: Builds the page table, walker and per-core TLBs.
/// 3. **Workload**: Loads `--trace` or generates a strided sweep.
/// 4. **Replay**: Runs every core on its own thread.
/// 5. **Teardown**: Prints statistics; any fatal error exits with status 1.
fn main() {
    let args = Args::parse();

    let default_level = if args.verbose || cfg!(feature = "always-trace") {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match run(&args) {
        Ok(stats) => stats.print(),
        Err(e) => {
            eprintln!("\n[!] FATAL: {}", e);
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<SimStats> {
    let config = Config::from_file(&args.config)?;
    print_config(&config);

    let trace = match &args.trace {
        Some(path) => {
            println!("[*] Trace Mode: {}", path);
            load_trace(path)?
        }
        None => {
            println!(
                "[*] Synthetic Mode: {} accesses, stride {:#x}, footprint {:#x}",
                args.accesses, args.stride, args.footprint
            );
            SyntheticWorkload {
                accesses: args.accesses,
                stride: args.stride,
                footprint: args.footprint,
                base: 0x4000_0000,
                write_every: 4,
            }
            .generate(config.general.cores)
        }
    };

    let sim = Simulation::new(config)?;
    let stats = sim.run(&trace)?;

    if let Some(path) = &args.stats_json {
        fs::write(path, stats.to_json()?)?;
        println!("[*] Statistics written to {}", path);
    }
    Ok(stats)
}

fn print_config(config: &Config) {
    println!("Global Configuration");
    println!("--------------------");
    println!("General:");
    println!("  Cores:              {}", config.general.cores);
    println!("  Timing Mode:        {}", config.general.timing_mode);
    println!("  Send PTW:           {}", config.general.send_ptw);
    println!("Paging:");
    println!("  Style:              {:?}", config.paging.style);
    println!("  Line Size:          {} B", config.paging.line_size);
    println!("  Mem Access Time:    {} cycles", config.paging.mem_access_time);
    println!("TLBs:");
    println!("  L1:                 {} entries", config.tlb.l1.entries);
    println!("  L2:                 {} entries", config.tlb.l2.entries);
    println!(
        "  Cluster:            {} ({} entries, {} pages/block)",
        if config.tlb.cluster.enabled {
            "Enabled"
        } else {
            "Disabled"
        },
        config.tlb.cluster.entries,
        1u32 << config.tlb.cluster.cluster_bits.min(31)
    );
    println!(
        "  PWC:                {} ({} lines, {} ways)",
        if config.pwc.enabled { "Enabled" } else { "Disabled" },
        config.pwc.lines,
        config.pwc.assoc
    );
    println!("Memory:");
    println!("  Controller:         {:?}", config.memory.controller);
    println!("  Parents:            {}", config.memory.parents);
    println!("  Frames:             {}", config.memory.frames);
    println!("--------------------");
}
