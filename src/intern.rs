use std::collections::HashSet;
use std::sync::Arc;


/// Deduplicated owned-string storage.
///
/// The interner exclusively owns the backing storage of every string
/// handed out; [`Interner::get_or_insert`] returns cheap shared views
/// into it. Insertion order is irrelevant, the interner exists purely
/// to avoid storing equal function and file names more than once.
#[derive(Debug, Default)]
pub(crate) struct Interner {
    strs: HashSet<Arc<str>>,
}

impl Interner {
    /// Retrieve a view of `text` backed by interned storage.
    ///
    /// If an equal string is already present the existing storage is
    /// returned; otherwise an owned copy is stored first.
    pub(crate) fn get_or_insert(&mut self, text: &str) -> Arc<str> {
        if let Some(interned) = self.strs.get(text) {
            Arc::clone(interned)
        } else {
            let interned = Arc::<str>::from(text);
            let _new = self.strs.insert(Arc::clone(&interned));
            interned
        }
    }

    /// Retrieve the number of distinct interned strings.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.strs.len()
    }

    /// Drop all interned storage.
    pub(crate) fn clear(&mut self) {
        self.strs.clear()
    }
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Check that repeated insertion of equal text does not allocate a
    /// second copy.
    #[test]
    fn duplicate_insertion_dedups() {
        let mut interner = Interner::default();

        let first = interner.get_or_insert("fuzzer::Mutate");
        let second = interner.get_or_insert("fuzzer::Mutate");
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(interner.len(), 1);

        let other = interner.get_or_insert("fuzzer::Execute");
        assert_ne!(first, other);
        assert_eq!(interner.len(), 2);
    }

    /// Check that clearing drops all distinct strings.
    #[test]
    fn clearing_empties_storage() {
        let mut interner = Interner::default();
        let _str = interner.get_or_insert("fuzz.cc");
        let _str = interner.get_or_insert("mutate.cc");
        assert_eq!(interner.len(), 2);

        let () = interner.clear();
        assert_eq!(interner.len(), 0);
    }
}
