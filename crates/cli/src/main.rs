//! Co-simulation harness CLI.
//!
//! This binary exposes the harness without a hardware model attached. It performs:
//! 1. **Host run:** Load a program and service HTIF until the target exits or the step
//!    budget runs out, then print memory and the exit code.
//! 2. **Inspect:** Load a raw image into sparse memory, print its non-zero lines, and
//!    optionally dump a range back to a file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cosim_harness::config::Config;
use cosim_harness::mem::SparseMemory;
use cosim_harness::sim::{SimState, Simulator};

#[derive(Parser, Debug)]
#[command(
    name = "cosim",
    author,
    version,
    about = "Co-simulation harness: sparse memory, HTIF, and store buffer",
    long_about = "Load target programs into a sparse 4 GiB memory and service the HTIF \
                  tohost/fromhost protocol.\n\nExamples:\n  cosim run build/hello.elf\n  \
                  cosim run --config sim.json --signature out.sig\n  \
                  cosim inspect image.bin --base 0x80000000 --dump out.bin --addr 0x80000000 --len 256"
)]
struct Cli {
    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a program and service HTIF until it exits.
    Run {
        /// Target program (ELF); overrides `htif.program` from the config file.
        program: Option<PathBuf>,

        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Additional ELF payload (repeatable).
        #[arg(long)]
        payload: Vec<PathBuf>,

        /// Raw binary copied into memory before the program.
        #[arg(long)]
        image: Option<PathBuf>,

        /// Load address of `--image`.
        #[arg(long, value_parser = parse_addr)]
        image_base: Option<u32>,

        /// Write the signature region to this file at the end of the run.
        #[arg(long)]
        signature: Option<PathBuf>,

        /// Bytes per signature line.
        #[arg(long)]
        signature_granularity: Option<usize>,

        /// Step budget.
        #[arg(long)]
        max_steps: Option<u64>,

        /// Print non-zero memory when the run ends.
        #[arg(long)]
        print_memory: bool,
    },

    /// Load a raw image and show what it puts in memory.
    Inspect {
        /// Raw image file.
        image: PathBuf,

        /// Load address.
        #[arg(long, value_parser = parse_addr, default_value = "0")]
        base: u32,

        /// Dump `--len` bytes from `--addr` to this file.
        #[arg(long, requires = "len")]
        dump: Option<PathBuf>,

        /// First address to dump (defaults to `--base`).
        #[arg(long, value_parser = parse_addr)]
        addr: Option<u32>,

        /// Bytes to dump.
        #[arg(long)]
        len: Option<usize>,
    },
}

/// Parses a decimal or `0x`-prefixed hexadecimal 32-bit address.
fn parse_addr(s: &str) -> Result<u32, String> {
    let parsed = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .map_or_else(|| s.parse(), |hex| u32::from_str_radix(&hex.replace('_', ""), 16));
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}

fn setup_logger(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("[!] a global log subscriber is already installed");
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logger(&cli.log_level);

    let code = match cli.command {
        Commands::Run {
            program,
            config,
            payload,
            image,
            image_base,
            signature,
            signature_granularity,
            max_steps,
            print_memory,
        } => {
            let overrides = RunOverrides {
                program,
                payload,
                image,
                image_base,
                signature,
                signature_granularity,
                max_steps,
                print_memory,
            };
            cmd_run(config, overrides)
        }
        Commands::Inspect {
            image,
            base,
            dump,
            addr,
            len,
        } => cmd_inspect(&image, base, dump, addr, len),
    };
    process::exit(code);
}

/// Command-line values that take precedence over the configuration file.
struct RunOverrides {
    program: Option<PathBuf>,
    payload: Vec<PathBuf>,
    image: Option<PathBuf>,
    image_base: Option<u32>,
    signature: Option<PathBuf>,
    signature_granularity: Option<usize>,
    max_steps: Option<u64>,
    print_memory: bool,
}

impl RunOverrides {
    fn apply(self, config: &mut Config) {
        if self.program.is_some() {
            config.htif.program = self.program;
        }
        config.htif.payloads.extend(self.payload);
        if self.image.is_some() {
            config.memory.image = self.image;
        }
        if let Some(base) = self.image_base {
            config.memory.image_base = base;
        }
        if self.signature.is_some() {
            config.htif.signature_file = self.signature;
        }
        if let Some(n) = self.signature_granularity {
            config.htif.signature_granularity = n;
        }
        if let Some(n) = self.max_steps {
            config.general.max_steps = n;
        }
        config.general.print_memory_on_exit |= self.print_memory;
    }
}

/// Runs the host-only service loop and returns the process exit code.
///
/// The target's exit code is passed through; a timeout exits with 2 and any
/// fatal harness error with 1.
fn cmd_run(config_path: Option<PathBuf>, overrides: RunOverrides) -> i32 {
    let mut config = match config_path {
        Some(path) => match Config::from_json_file(&path) {
            Ok(c) => c,
            Err(e) => {
                error!("{e}");
                return 1;
            }
        },
        None => Config::default(),
    };
    overrides.apply(&mut config);

    let mut sim = match Simulator::from_config(&config) {
        Ok(sim) => sim,
        Err(e) => {
            error!("{e}");
            return 1;
        }
    };

    let state = match sim.run_host_only() {
        Ok(state) => state,
        Err(e) => {
            error!("{e}");
            return 1;
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if config.general.print_memory_on_exit {
        if let Err(e) = sim.memory().print_non_zero(&mut out) {
            error!("printing memory failed: {e}");
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "===================================  [SIMULATION ENDS] ==============================="
    );
    let _ = writeln!(out, "exit code: {}", sim.htif().exit_code());
    let _ = out.flush();

    if let Err(e) = sim.finish() {
        error!("{e}");
        return 1;
    }

    match state {
        SimState::Exited(code) => i32::try_from(code).unwrap_or(1),
        SimState::Timeout => 2,
        SimState::Running | SimState::Halted | SimState::Finished => 0,
    }
}

/// Loads `image` at `base`, prints its non-zero lines, and optionally dumps a range.
fn cmd_inspect(
    image: &Path,
    base: u32,
    dump: Option<PathBuf>,
    addr: Option<u32>,
    len: Option<usize>,
) -> i32 {
    let mut mem = SparseMemory::new();
    if let Err(e) = mem.load_image(image, base) {
        error!("{e}");
        return 1;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = mem.print_non_zero(&mut out) {
        error!("printing memory failed: {e}");
        return 1;
    }
    let _ = writeln!(out, "{} buckets allocated", mem.allocated_buckets());

    if let (Some(path), Some(len)) = (dump, len) {
        if let Err(e) = mem.dump(&path, addr.unwrap_or(base), len) {
            error!("{e}");
            return 1;
        }
    }
    0
}
