use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rayon::ThreadPoolBuilder;

use tempfile::Builder as TempFileBuilder;

use tracing::error;
use tracing::info;
use tracing::warn;

use crate::Addr;
use crate::Error;
use crate::Result;
use crate::SymbolTable;


/// The ceiling on concurrently running symbolization jobs.
///
/// The workload is IO bound (dominated by external process latency),
/// so running more jobs than CPUs is fine; the ceiling only guards
/// against resource exhaustion on binaries with very many DSOs.
const MAX_JOBS: usize = 30;

/// A counter disambiguating temporary file names across concurrently
/// running jobs, including jobs for DSOs sharing a basename.
static NEXT_JOB_ID: AtomicUsize = AtomicUsize::new(0);


/// One dynamically shared object of an instrumented binary, as
/// reported by the instrumentation run time.
#[derive(Clone, Debug)]
pub struct DsoInfo {
    /// The path to the DSO.
    pub path: PathBuf,
    /// The number of PC table entries attributed to this DSO. PC table
    /// entries are laid out contiguously per DSO, in DSO table order.
    pub num_instrumented_pcs: usize,
}


/// A resolver of instrumented PC addresses to source locations,
/// driving an external `llvm-symbolizer` style tool.
#[derive(Clone, Debug)]
pub struct Symbolizer {
    /// The path to the symbolizer tool to invoke.
    tool: PathBuf,
    /// The directory in which to stage per-job address and symbol
    /// files.
    scratch_dir: PathBuf,
}

impl Symbolizer {
    /// Create a new `Symbolizer` invoking `tool` and staging its
    /// input/output files in `scratch_dir`.
    ///
    /// An empty `tool` path (or `/dev/null`, a somewhat expected
    /// alternative users may pass) disables resolution: every address
    /// then maps to the unknown placeholder.
    pub fn new<P, S>(tool: P, scratch_dir: S) -> Self
    where
        P: Into<PathBuf>,
        S: Into<PathBuf>,
    {
        Self {
            tool: tool.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    fn disabled(&self) -> bool {
        self.tool.as_os_str().is_empty() || self.tool == Path::new("/dev/null")
    }

    /// Resolve every address of `pc_table` to a [`SymbolTable`] entry.
    ///
    /// `dso_table` describes how `pc_table` partitions into contiguous
    /// per-DSO slices; each slice is symbolized by its own job on a
    /// bounded worker pool and the per-DSO results are merged back in
    /// DSO table order.
    ///
    /// This call never fails: the returned table always has exactly
    /// `pc_table.len()` entries. If the tool is disabled, cannot be
    /// run, or its output does not reconcile with the PC table, all
    /// entries degrade to the unknown placeholder; a silently
    /// misaligned subset is more dangerous than a uniformly unresolved
    /// table.
    ///
    /// # Panics
    /// Panics if `dso_table` declares more instrumented PCs than
    /// `pc_table` holds.
    pub fn symbolize(&self, pc_table: &[Addr], dso_table: &[DsoInfo]) -> SymbolTable {
        let mut table = SymbolTable::new();
        if self.disabled() {
            warn!("symbolizer unspecified: debug symbols will not be used");
            let () = table.set_all_to_unknown(pc_table.len());
            return table
        }

        info!("symbolizing {} instrumented DSOs", dso_table.len());

        // Partition the PC table into one contiguous slice per DSO,
        // trusting the declared per-DSO counts.
        let mut jobs = Vec::with_capacity(dso_table.len());
        let mut pc_idx_begin = 0;
        for dso in dso_table {
            let pc_idx_end = pc_idx_begin + dso.num_instrumented_pcs;
            assert!(
                pc_idx_end <= pc_table.len(),
                "DSO table declares more instrumented PCs than the PC table holds: \
                 {} attributes PCs [{pc_idx_begin}, {pc_idx_end}) of {}",
                dso.path.display(),
                pc_table.len()
            );
            let () = jobs.push((dso, &pc_table[pc_idx_begin..pc_idx_end]));
            pc_idx_begin = pc_idx_end;
        }

        // Symbolizing can take a while, so the jobs run in parallel
        // into separate tables that get merged afterwards.
        let mut dso_tables = Vec::new();
        let () = dso_tables.resize_with(dso_table.len(), SymbolTable::new);

        let pool = ThreadPoolBuilder::new()
            .thread_name(|idx| format!("symbolize-{idx}"))
            .num_threads(dso_table.len().clamp(1, MAX_JOBS))
            .build();
        let pool = match pool {
            Ok(pool) => pool,
            Err(err) => {
                error!("failed to create symbolization thread pool: {err}");
                let () = table.set_all_to_unknown(pc_table.len());
                return table
            }
        };

        let () = pool.scope(|scope| {
            for ((dso, pcs), dso_symbols) in jobs.into_iter().zip(dso_tables.iter_mut()) {
                let () = scope.spawn(move |_scope| {
                    match self.symbolize_dso(pcs, &dso.path) {
                        Ok(symbols) => *dso_symbols = symbols,
                        Err(err) => {
                            error!("failed to symbolize {}: {err}", dso.path.display())
                        }
                    }
                });
            }
        });

        // All jobs have joined; merge strictly in DSO table order to
        // preserve positional alignment with the PC table.
        for dso_symbols in &dso_tables {
            let () = table.add_entries(dso_symbols);
        }

        if table.len() != pc_table.len() {
            error!(
                "symbolization failed: {} symbols for {} PCs; debug symbols will not be used",
                table.len(),
                pc_table.len()
            );
            let () = table.set_all_to_unknown(pc_table.len());
        }
        table
    }

    /// Symbolize the contiguous PC slice belonging to one DSO.
    ///
    /// On success the resulting table is returned as-is, even if the
    /// tool produced a different number of entries than addresses were
    /// fed in; the caller's merge validation handles the mismatch.
    fn symbolize_dso(&self, pcs: &[Addr], dso_path: &Path) -> Result<SymbolTable> {
        let job_id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let basename = dso_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dso".to_string());

        // Both files are removed when they go out of scope, on every
        // path out of this function.
        let pcs_file = TempFileBuilder::new()
            .prefix(&format!("{basename}.pcs.{job_id}."))
            .tempfile_in(&self.scratch_dir)?;
        let symbols_file = TempFileBuilder::new()
            .prefix(&format!("{basename}.symbols.{job_id}."))
            .tempfile_in(&self.scratch_dir)?;

        // Create the input file (one PC per line).
        let mut writer = BufWriter::new(pcs_file.as_file());
        for pc in pcs {
            let () = writeln!(writer, "{pc:#x}")?;
        }
        let () = writer.flush()?;
        drop(writer);

        info!("symbolizing {} PCs from {basename}", pcs.len());

        let mut cmd = Command::new(&self.tool);
        let _cmd = cmd
            .arg("--no-inlines")
            .arg("-e")
            .arg(dso_path)
            .stdin(File::open(pcs_file.path())?)
            .stdout(symbols_file.reopen()?);
        let status = cmd.status()?;
        if !status.success() {
            return Err(Error::Symbolizer {
                cmd: format!("{cmd:?}"),
                status,
            })
        }

        let mut symbols = SymbolTable::new();
        let reader = BufReader::new(File::open(symbols_file.path())?);
        let () = symbols.read_from_llvm_symbolizer(reader)?;
        if symbols.len() != pcs.len() {
            error!(
                "symbolization failed for {basename}: {} symbols for {} PCs; \
                 debug symbols will not be used",
                symbols.len(),
                pcs.len()
            );
        }
        Ok(symbols)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::env::temp_dir;


    /// An unset symbolizer path degrades every PC to the unknown
    /// placeholder.
    #[test]
    fn unset_symbolizer_resolves_all_to_unknown() {
        for tool in ["", "/dev/null"] {
            let symbolizer = Symbolizer::new(tool, temp_dir());
            let dsos = [DsoInfo {
                path: PathBuf::from("/bin/target"),
                num_instrumented_pcs: 3,
            }];
            let symbols = symbolizer.symbolize(&[0x10, 0x20, 0x30], &dsos);

            assert_eq!(symbols.len(), 3);
            for entry in symbols.entries() {
                assert_eq!(entry.func(), "?");
                assert_eq!(entry.file(), "?");
                assert_eq!(entry.line(), None);
            }
        }
    }

    /// A tool that cannot be executed degrades to the total unknown
    /// fallback, never a partial result.
    #[test]
    fn unrunnable_symbolizer_resolves_all_to_unknown() {
        let symbolizer = Symbolizer::new("/nonexistent/llvm-symbolizer", temp_dir());
        let dsos = [
            DsoInfo {
                path: PathBuf::from("/bin/target"),
                num_instrumented_pcs: 2,
            },
            DsoInfo {
                path: PathBuf::from("/lib/libfoo.so"),
                num_instrumented_pcs: 1,
            },
        ];
        let symbols = symbolizer.symbolize(&[0x10, 0x20, 0x30], &dsos);

        assert_eq!(symbols.len(), 3);
        for entry in symbols.entries() {
            assert_eq!(entry.func(), "?");
            assert_eq!(entry.file(), "?");
        }
    }

    /// DSO metadata overrunning the PC table is a contract violation.
    #[test]
    #[should_panic = "more instrumented PCs than the PC table holds"]
    fn overcommitted_dso_table_panics() {
        let symbolizer = Symbolizer::new("/usr/bin/llvm-symbolizer", temp_dir());
        let dsos = [DsoInfo {
            path: PathBuf::from("/bin/target"),
            num_instrumented_pcs: 4,
        }];
        let _symbols = symbolizer.symbolize(&[0x10, 0x20], &dsos);
    }
}
