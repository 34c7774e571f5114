use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tanglepack::manifest::Manifest;
use tanglepack::package::ChunkOptions;
use tanglepack::{chunker, unchunker, CancelToken};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tangle", version, about = "Entangled file packager")]
struct Cli {
    /// Show per-block detail while working
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a file into encrypted blocks plus a manifest
    Chunk {
        input: PathBuf,
        /// Directory that receives the block files and the manifest
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Overwrite existing artifacts
        #[arg(short, long)]
        force: bool,
        /// Reconstruct in memory afterwards and compare digests
        #[arg(long)]
        verify: bool,
        /// Fixed block size in bytes instead of randomized sizing
        #[arg(long)]
        block_size: Option<u64>,
    },
    /// Reassemble the original file from a manifest and its blocks
    Unchunk {
        manifest: PathBuf,
        /// Output path (default: the original name from the manifest, in
        /// the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Directory holding the block files (default: next to the manifest)
        #[arg(short = 'B', long)]
        block_dir: Option<PathBuf>,
        /// Overwrite an existing output file
        #[arg(short, long)]
        force: bool,
    },
    /// Check a package without writing the reconstructed file
    Verify {
        manifest: PathBuf,
        #[arg(short = 'B', long)]
        block_dir: Option<PathBuf>,
    },
    /// Show manifest metadata
    Info {
        manifest: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancelToken::new();

    match cli.command {
        // ── Chunk ────────────────────────────────────────────────────────────
        Commands::Chunk { input, output_dir, force, verify, block_size } => {
            let opts = ChunkOptions {
                force,
                verbose: cli.verbose,
                verify,
                override_block_size: block_size,
            };
            let packaged = chunker::chunk(&input, &output_dir, &opts, &cancel)?;
            for index in 0..packaged.manifest.block_count() {
                let path = packaged.layout.block_path(index);
                println!("  block    {}", path.display());
            }
            println!("  manifest {}", packaged.layout.manifest_path().display());
            println!(
                "Packaged: {} ({} block(s){})",
                packaged.manifest.name,
                packaged.manifest.block_count(),
                if verify { ", verified" } else { "" },
            );
        }

        // ── Unchunk ──────────────────────────────────────────────────────────
        Commands::Unchunk { manifest, output, block_dir, force } => {
            let block_dir = block_dir.unwrap_or_else(|| parent_dir(&manifest));
            let output = match output {
                Some(p) => p,
                None => PathBuf::from(read_manifest(&manifest)?.name),
            };
            unchunker::unchunk(&manifest, &block_dir, &output, force, &cancel)?;
            println!("Reconstructed: {}", output.display());
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { manifest, block_dir } => {
            let block_dir = block_dir.unwrap_or_else(|| parent_dir(&manifest));
            let digest = unchunker::verify_package(&manifest, &block_dir, &cancel)?;
            println!("Package OK");
            println!("  SHA-512 {}", hex::encode(digest));
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { manifest: path } => {
            let m = read_manifest(&path)?;
            println!("── Manifest ─────────────────────────────────────────────");
            println!("  Path           {}", path.display());
            println!("  Name           {}", m.name);
            println!("  Created (UTC)  {}", m.created_utc);
            println!("  Modified (UTC) {}", m.modified_utc);
            println!("  Blocks         {}", m.block_count());
            for (i, h) in m.block_hashes.iter().enumerate() {
                println!("    [{i:4}] {}…  (blinded)", h.short_hex());
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn read_manifest(path: &PathBuf) -> Result<Manifest, Box<dyn std::error::Error>> {
    Ok(Manifest::from_json(&std::fs::read(path)?)?)
}

fn parent_dir(path: &PathBuf) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "tanglepack=debug" } else { "tanglepack=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
