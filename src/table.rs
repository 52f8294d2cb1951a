use std::io::BufRead;
use std::io::Write;
use std::sync::Arc;

use crate::intern::Interner;
use crate::Result;


/// File prefixes stripped from symbolizer reported source locations,
/// purely for readability.
const NOISE_PREFIXES: [&str; 2] = ["/proc/self/cwd/", "./"];

/// The placeholder used when resolution is unavailable or unreliable.
const UNKNOWN: &str = "?";


/// Remove a single trailing newline, as left in place by
/// [`BufRead::read_line`].
fn chomp(line: &mut String) {
    if line.ends_with('\n') {
        let _newline = line.pop();
    }
}


/// One resolved (or unresolved) symbol for one instrumented address.
///
/// The function and file text are views into storage owned by the
/// [`SymbolTable`] the entry belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    func: Arc<str>,
    file: Arc<str>,
    line: Option<u32>,
    col: Option<u32>,
}

impl Entry {
    /// The function name, `?` if unknown.
    pub fn func(&self) -> &str {
        &self.func
    }

    /// The source file path, `?` if unknown.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The source line, if known.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// The source column, if known.
    pub fn column(&self) -> Option<u32> {
        self.col
    }

    /// Format the source location as `file`, `file:line`, or
    /// `file:line:col`, depending on which parts are known.
    pub fn file_line_col(&self) -> String {
        match (self.line, self.col) {
            (Some(line), Some(col)) => format!("{}:{line}:{col}", self.file),
            (Some(line), None) => format!("{}:{line}", self.file),
            (None, _) => self.file.to_string(),
        }
    }
}


/// An ordered sequence of [`Entry`] objects, positionally aligned 1:1
/// with the PC table it was resolved from.
///
/// Tables compare equal based on their entry sequences alone; interner
/// internals and storage identity never participate.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<Entry>,
    strings: Interner,
}

impl SymbolTable {
    /// Create a new, empty `SymbolTable`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retrieve the entry at PC table position `idx`.
    ///
    /// # Panics
    /// Panics if `idx` is out of bounds.
    pub fn entry(&self, idx: usize) -> &Entry {
        &self.entries[idx]
    }

    /// Iterate over all entries in PC table order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Retrieve the function name at PC table position `idx`.
    pub fn func(&self, idx: usize) -> &str {
        self.entries[idx].func()
    }

    /// Retrieve the formatted source location at PC table position
    /// `idx`.
    pub fn location(&self, idx: usize) -> String {
        self.entries[idx].file_line_col()
    }

    /// Retrieve `"<func> <location>"` for PC table position `idx`.
    pub fn full_description(&self, idx: usize) -> String {
        let entry = &self.entries[idx];
        format!("{} {}", entry.func(), entry.file_line_col())
    }

    /// Append one entry, parsing `file_line_col` as reported by
    /// `llvm-symbolizer`: `?`, `file`, `file:line`, or `file:line:col`.
    ///
    /// A location containing `?` is recorded verbatim as the file, with
    /// line and column unknown. A line or column of `0` also counts as
    /// unknown.
    ///
    /// # Panics
    /// Panics if the location has more than three `:` separated fields
    /// or if a line/column field is not an integer. Such input means
    /// the symbolizer violated its documented output contract, and
    /// guessing would silently misalign the table against the PC table.
    pub fn add_entry(&mut self, func: &str, file_line_col: &str) {
        if file_line_col.contains('?') {
            let () = self.add_entry_impl(func, file_line_col, None, None);
            return
        }

        let fields = file_line_col.split(':').collect::<Vec<_>>();
        assert!(
            fields.len() <= 3,
            "unexpected symbolizer source location format: `{file_line_col}`"
        );
        let line = fields.get(1).and_then(|text| parse_field(text, "line"));
        let col = fields.get(2).and_then(|text| parse_field(text, "column"));
        self.add_entry_impl(func, fields[0], line, col)
    }

    fn add_entry_impl(&mut self, func: &str, file: &str, line: Option<u32>, col: Option<u32>) {
        let entry = Entry {
            func: self.strings.get_or_insert(func),
            file: self.strings.get_or_insert(file),
            line,
            col,
        };
        self.entries.push(entry)
    }

    /// Append every entry of `other`, re-interning its function and
    /// file text into this table's own storage. Source order is
    /// preserved and `other` is left untouched.
    pub fn add_entries(&mut self, other: &SymbolTable) {
        for entry in &other.entries {
            let () = self.add_entry_impl(&entry.func, &entry.file, entry.line, entry.col);
        }
    }

    /// Replace the table's contents with `size` unknown placeholder
    /// entries.
    pub fn set_all_to_unknown(&mut self, size: usize) {
        let unknown = Arc::<str>::from(UNKNOWN);
        let entry = Entry {
            func: Arc::clone(&unknown),
            file: unknown,
            line: None,
            col: None,
        };
        self.entries.clear();
        self.entries.resize(size, entry);

        // The placeholders do not go through the interner, so its
        // storage no longer backs anything.
        self.strings.clear()
    }

    /// Append entries parsed from `llvm-symbolizer` output: repeating
    /// records of a function name line, a source location line, and a
    /// blank separator line.
    ///
    /// A record cut short by the end of the stream is silently dropped.
    ///
    /// # Panics
    /// Panics if a separator line is present but not blank, or if a
    /// source location is malformed (see [`SymbolTable::add_entry`]).
    pub fn read_from_llvm_symbolizer<R>(&mut self, mut reader: R) -> Result<()>
    where
        R: BufRead,
    {
        let mut func = String::new();
        let mut file = String::new();
        let mut sep = String::new();

        loop {
            func.clear();
            file.clear();
            sep.clear();

            if reader.read_line(&mut func)? == 0 {
                break
            }
            if reader.read_line(&mut file)? == 0 {
                break
            }
            let sep_bytes = reader.read_line(&mut sep)?;
            let () = chomp(&mut func);
            let () = chomp(&mut file);
            let () = chomp(&mut sep);
            assert!(
                sep.is_empty(),
                "unexpected symbolizer output format: func=`{func}` file=`{file}` sep=`{sep}`"
            );
            if sep_bytes == 0 {
                // The stream ended mid-record.
                break
            }

            let mut location = file.as_str();
            for prefix in NOISE_PREFIXES {
                location = location.strip_prefix(prefix).unwrap_or(location);
            }
            let () = self.add_entry(&func, location);
        }
        Ok(())
    }

    /// Write all entries in `llvm-symbolizer` output format, the
    /// inverse of [`SymbolTable::read_from_llvm_symbolizer`].
    pub fn write_to_llvm_symbolizer<W>(&self, mut writer: W) -> Result<()>
    where
        W: Write,
    {
        for entry in &self.entries {
            let () = writeln!(writer, "{}", entry.func)?;
            let () = writeln!(writer, "{}", entry.file_line_col())?;
            let () = writeln!(writer)?;
        }
        Ok(())
    }
}

impl PartialEq for SymbolTable {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for SymbolTable {}


/// Parse a line/column field, normalizing the `0` sentinel to unknown.
fn parse_field(text: &str, what: &str) -> Option<u32> {
    let value = text
        .parse::<u32>()
        .unwrap_or_else(|_err| panic!("unable to convert {what} number to an int: `{text}`"));
    (value != 0).then_some(value)
}
