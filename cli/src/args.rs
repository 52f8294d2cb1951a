use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context as _;
use anyhow::Result;

use clap::ArgAction;
use clap::Args as Arguments;
use clap::Parser;
use clap::Subcommand;

use pcsym::Addr;
use pcsym::DsoInfo;


/// Parse an address from a string.
fn parse_addr(s: &str) -> Result<Addr> {
    // In our world addresses are always represented in hex, with or without 0x
    // prefix.
    Addr::from_str_radix(s.trim_start_matches("0x"), 16)
        .with_context(|| format!("failed to parse address: {s}"))
}

/// Parse a `<path>=<count>` DSO specification.
fn parse_dso(s: &str) -> Result<DsoInfo> {
    let (path, count) = s
        .rsplit_once('=')
        .with_context(|| format!("DSO specification is missing a `=<count>` suffix: {s}"))?;
    let num_instrumented_pcs = count
        .parse()
        .with_context(|| format!("failed to parse instrumented PC count: {count}"))?;

    Ok(DsoInfo {
        path: PathBuf::from(path),
        num_instrumented_pcs,
    })
}

/// Read addresses from a file, one per line; blank lines are ignored.
pub fn read_addrs_file(path: &Path) -> Result<Vec<Addr>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read addresses from {}", path.display()))?;

    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_addr)
        .collect()
}


/// A command line interface for pcsym.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
    /// Increase verbosity (can be supplied multiple times).
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbosity: u8,
}


#[derive(Debug, Subcommand)]
pub enum Command {
    /// Symbolize the PC table of an instrumented binary.
    Symbolize(Symbolize),
}


#[derive(Debug, Arguments)]
pub struct Symbolize {
    /// The path to the llvm-symbolizer style tool to drive.
    #[clap(short, long)]
    pub symbolizer: PathBuf,
    /// The directory in which to stage temporary address and symbol
    /// files; defaults to the system temporary directory.
    #[clap(long)]
    pub scratch_dir: Option<PathBuf>,
    /// An instrumented DSO as `<path>=<instrumented-pc-count>`; can be
    /// supplied multiple times, in PC table order.
    #[clap(short, long = "dso", value_parser = parse_dso)]
    pub dsos: Vec<DsoInfo>,
    /// A file to read the PC table addresses from, one per line, as an
    /// alternative to supplying them on the command line.
    #[clap(long, conflicts_with = "addrs")]
    pub addrs_file: Option<PathBuf>,
    /// The addresses of the PC table, contiguous per DSO.
    #[arg(value_parser = parse_addr)]
    pub addrs: Vec<Addr>,
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write as _;


    /// Check that DSO specifications parse into path and count.
    #[test]
    fn dso_spec_parsing() {
        let dso = parse_dso("/lib/libfoo.so=42").unwrap();
        assert_eq!(dso.path, Path::new("/lib/libfoo.so"));
        assert_eq!(dso.num_instrumented_pcs, 42);

        let err = parse_dso("/lib/libfoo.so").unwrap_err();
        assert!(err.to_string().contains("missing a `=<count>` suffix"));
    }

    /// Check that an address file parses one address per line, with
    /// and without a 0x prefix.
    #[test]
    fn addrs_file_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let () = write!(file, "0x401000\n  0x401020\n\n7f1230001000\n").unwrap();

        let addrs = read_addrs_file(file.path()).unwrap();
        assert_eq!(addrs, vec![0x401000, 0x401020, 0x7f1230001000]);
    }

    /// Positional addresses and `--addrs-file` are mutually exclusive.
    #[test]
    fn addrs_file_conflicts_with_positional_addrs() {
        let result = Args::try_parse_from([
            "pcsym",
            "symbolize",
            "--symbolizer",
            "/usr/bin/llvm-symbolizer",
            "--dso",
            "/bin/target=1",
            "--addrs-file",
            "/tmp/addrs.txt",
            "0x401000",
        ]);
        let _err = result.unwrap_err();
    }
}
