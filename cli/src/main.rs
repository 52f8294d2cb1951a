//! A command line front end for the pcsym library.

mod args;

use std::env::temp_dir;

use anyhow::Context as _;
use anyhow::Result;

use clap::Parser as _;

use pcsym::Symbolizer;

use tracing::subscriber::set_global_default as set_global_subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::FmtSubscriber;


const ADDR_WIDTH: usize = 16;


/// The handler for the 'symbolize' command.
fn symbolize(symbolize: args::Symbolize) -> Result<()> {
    let args::Symbolize {
        symbolizer,
        scratch_dir,
        dsos,
        addrs_file,
        addrs,
    } = symbolize;

    let addrs = match addrs_file {
        Some(path) => args::read_addrs_file(&path)?,
        None => addrs,
    };

    let declared = dsos
        .iter()
        .map(|dso| dso.num_instrumented_pcs)
        .sum::<usize>();
    anyhow::ensure!(
        declared == addrs.len(),
        "DSO table declares {declared} instrumented PCs but {} addresses were supplied",
        addrs.len()
    );

    let scratch_dir = scratch_dir.unwrap_or_else(temp_dir);
    let symbolizer = Symbolizer::new(symbolizer, scratch_dir);
    let symbols = symbolizer.symbolize(&addrs, &dsos);

    for (idx, addr) in addrs.iter().enumerate() {
        println!(
            "{addr:#0width$x}: {}",
            symbols.full_description(idx),
            width = ADDR_WIDTH
        );
    }
    Ok(())
}


fn main() -> Result<()> {
    let args = args::Args::parse();
    let level = match args.verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_timer(SystemTime)
        .finish();

    let () =
        set_global_subscriber(subscriber).with_context(|| "failed to set tracing subscriber")?;

    match args.command {
        args::Command::Symbolize(symbolize) => self::symbolize(symbolize),
    }
}
