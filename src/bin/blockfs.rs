//! blockfs shell
//!
//! Interactive shell over an in-memory block filesystem

use anyhow::Context;
use blockfs::{FileSystemBuilder, Flow, Shell, StrategyKind};
use clap::Parser;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "blockfs")]
#[command(about = "Shell over an in-memory filesystem on a simulated block device")]
struct Args {
    /// TOML configuration file (command-line options override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Allocation strategy (chain, inode)
    #[arg(short = 's', long)]
    strategy: Option<String>,

    /// Number of blocks on the device
    #[arg(short = 'b', long)]
    blocks: Option<usize>,

    /// Block size in bytes
    #[arg(long)]
    block_size: Option<usize>,

    /// Direct block pointers per inode
    #[arg(short = 'k', long)]
    direct_blocks: Option<usize>,

    /// Disable ANSI colours in `ls`
    #[arg(long)]
    no_color: bool,

    /// Run these commands (separated by ';') instead of reading stdin
    #[arg(short = 'c', long = "command")]
    command: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let mut builder = match &args.config {
        Some(path) => FileSystemBuilder::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FileSystemBuilder::new(),
    };

    if let Some(strategy) = &args.strategy {
        builder = builder.strategy(strategy.parse::<StrategyKind>()?);
    }
    if let Some(blocks) = args.blocks {
        builder = builder.num_blocks(blocks);
    }
    if let Some(block_size) = args.block_size {
        builder = builder.block_size(block_size);
    }
    if let Some(direct_blocks) = args.direct_blocks {
        builder = builder.direct_blocks(direct_blocks);
    }

    let fs = builder.build().context("creating filesystem")?;
    info!("Filesystem ready: {:?}", fs.config());

    let stdout = io::stdout();
    let color = !args.no_color && stdout.is_terminal();
    let mut shell = Shell::new(fs, stdout.lock()).with_color(color);

    match &args.command {
        Some(script) => {
            for line in script.split(';') {
                if shell.execute(line)? == Flow::Exit {
                    break;
                }
            }
        }
        None => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                shell = shell.with_prompt("> ");
            }
            shell.run(stdin.lock())?;
        }
    }

    Ok(())
}
