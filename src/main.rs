//! Demo driver for the ghostmem engine.
//!
//! `demo` churns a large buffer through a tiny resident budget to show the
//! freeze/thaw cycle; `secure` rounds sensitive strings through an encrypted
//! swap file and proves they come back intact.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use ghostmem::{GhostBuf, GhostConfig, PAGE_SIZE};

#[derive(Parser)]
#[command(name = "ghostmem", version, about = "Virtual RAM through transparent compression")]
struct Cli {
    /// Read settings from a config file before applying flags
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log every fault, freeze and thaw
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Churn a large buffer through a tiny resident budget
    Demo {
        /// Resident-set limit in pages
        #[arg(long, default_value_t = 5)]
        pages: usize,

        /// Buffer size in bytes
        #[arg(long, default_value_t = 256 * 1024)]
        size: usize,
    },
    /// Round sensitive data through an encrypted swap file
    Secure {
        /// Swap file location
        #[arg(long, default_value = "secure.swap")]
        swap_path: PathBuf,

        /// Resident-set limit in pages
        #[arg(long, default_value_t = 3)]
        pages: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = match &cli.config {
        Some(path) => GhostConfig::load_from_file(path)?,
        None => GhostConfig::load()?,
    };
    config.verbose_logging |= cli.verbose;

    match cli.command {
        Commands::Demo { pages, size } => run_demo(config, pages, size),
        Commands::Secure { swap_path, pages } => run_secure(config, swap_path, pages),
    }
}

fn run_demo(mut config: GhostConfig, pages: usize, size: usize) -> Result<()> {
    config.use_disk_backing = false;
    config.max_resident_pages = pages;
    ghostmem::init(config)?;

    println!("ghostmem v{}", ghostmem::VERSION);
    println!(
        "budget: {} resident pages ({} KB) for a {} KB buffer",
        pages,
        pages * PAGE_SIZE / 1024,
        size / 1024
    );

    let mut buf = GhostBuf::new(size)?;

    // First sweep writes through every page; with size >> budget this swaps
    // constantly in the background.
    for (i, b) in buf.iter_mut().enumerate() {
        *b = (i & 0xff) as u8;
    }

    // Second sweep thaws everything the first one froze.
    let mut mismatches = 0usize;
    for (i, b) in buf.iter().enumerate() {
        if *b != (i & 0xff) as u8 {
            mismatches += 1;
        }
    }

    println!("verified {} bytes, {} mismatches", buf.len(), mismatches);
    println!("{}", ghostmem::stats());

    drop(buf);
    ghostmem::teardown();
    Ok(())
}

fn run_secure(mut config: GhostConfig, swap_path: PathBuf, pages: usize) -> Result<()> {
    config.use_disk_backing = true;
    config.encrypt_disk_pages = true;
    config.compress_before_disk = true;
    config.disk_file_path = swap_path.clone();
    config.max_resident_pages = pages;
    ghostmem::init(config)?;

    println!("ghostmem v{} — encrypted swap at {}", ghostmem::VERSION, swap_path.display());

    let secrets: &[&str] = &[
        "card 4532-1234-5678-9012",
        "pin 1234",
        "api key sk_live_51H4abc123xyz",
    ];

    let mut vault = GhostBuf::new(PAGE_SIZE)?;
    let mut cursor = 0;
    for secret in secrets {
        vault[cursor..cursor + secret.len()].copy_from_slice(secret.as_bytes());
        cursor += secret.len() + 1;
    }
    println!("stored {} secrets ({} bytes)", secrets.len(), cursor);

    // Enough filler traffic to push the vault page out to disk.
    let mut filler = Vec::new();
    for i in 0..pages + 2 {
        let mut page = GhostBuf::new(PAGE_SIZE)?;
        page[0] = i as u8;
        filler.push(page);
    }

    // Reading the vault thaws (and decrypts) it again.
    let mut cursor = 0;
    let mut intact = true;
    for secret in secrets {
        if &vault[cursor..cursor + secret.len()] != secret.as_bytes() {
            intact = false;
        }
        cursor += secret.len() + 1;
    }
    println!(
        "secrets {} after the round-trip",
        if intact { "intact" } else { "CORRUPTED" }
    );
    println!("{}", ghostmem::stats());
    println!("the swap file held only ciphertext; it is deleted on teardown");

    drop(vault);
    drop(filler);
    ghostmem::teardown();
    Ok(())
}
