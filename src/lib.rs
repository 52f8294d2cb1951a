//! pcsym is a library resolving instrumented program counter addresses
//! to source locations by driving an external symbolizer tool.
#![doc = include_str!("../README.md")]

use std::io;
use std::process::ExitStatus;

use thiserror::Error as ThisError;

mod intern;
mod symbolize;
mod table;

pub use symbolize::DsoInfo;
pub use symbolize::Symbolizer;
pub use table::Entry;
pub use table::SymbolTable;


/// A type representing an instrumented program counter address.
pub type Addr = u64;


/// The error type used by this crate.
///
/// Note that the top level symbolization entry point,
/// [`Symbolizer::symbolize`], never surfaces errors: it degrades to
/// unknown placeholder entries instead. Errors of this type show up
/// when staging symbolizer input/output or when reading or writing the
/// symbolizer text format directly.
#[derive(Debug, ThisError)]
pub enum Error {
    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The external symbolizer tool exited unsuccessfully.
    #[error("symbolizer invocation {cmd} failed: {status}")]
    Symbolizer {
        /// The invocation that failed.
        cmd: String,
        /// The tool's exit status.
        status: ExitStatus,
    },
}


/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;
