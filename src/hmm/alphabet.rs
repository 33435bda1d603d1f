//! Ordered sets of state or emission symbols.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Bound shared by state and emission symbols.
pub trait Symbol: Clone + Eq + Hash + Debug {}

impl<T: Clone + Eq + Hash + Debug> Symbol for T {}

/// An immutable, ordered set of distinct symbols.
///
/// Each symbol gets a dense code equal to its position, and every table in
/// the crate is indexed by these codes.
#[derive(Debug, Clone)]
pub struct Alphabet<T> {
    symbols: Vec<T>,
    codes: HashMap<T, usize>,
}

impl<T: Symbol> Alphabet<T> {
    /// Creates an alphabet from symbols in the order given.
    ///
    /// # Errors
    /// * `InvalidAlphabet` if `symbols` is empty or contains a duplicate
    pub fn new<I>(symbols: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
    {
        let symbols: Vec<T> = symbols.into_iter().collect();
        if symbols.is_empty() {
            return Err(Error::InvalidAlphabet(
                "an alphabet needs at least one symbol".to_string(),
            ));
        }

        let mut codes = HashMap::with_capacity(symbols.len());
        for (code, symbol) in symbols.iter().enumerate() {
            if codes.insert(symbol.clone(), code).is_some() {
                return Err(Error::InvalidAlphabet(format!(
                    "duplicate symbol {:?}",
                    symbol
                )));
            }
        }

        Ok(Self { symbols, codes })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Dense code of `symbol`, or `None` when it is not in the alphabet.
    pub fn code_of(&self, symbol: &T) -> Option<usize> {
        self.codes.get(symbol).copied()
    }

    /// Symbol stored under `code`.
    pub fn symbol(&self, code: usize) -> Option<&T> {
        self.symbols.get(code)
    }

    pub fn contains(&self, symbol: &T) -> bool {
        self.codes.contains_key(symbol)
    }

    pub fn symbols(&self) -> &[T] {
        &self.symbols
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.symbols.iter()
    }

    /// Encodes a whole sequence, failing on the first symbol outside the
    /// alphabet.
    pub(crate) fn encode<'a, I>(
        &self,
        sequence: I,
        on_missing: fn(&T) -> Error,
    ) -> Result<Vec<usize>>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        sequence
            .into_iter()
            .map(|symbol| self.code_of(symbol).ok_or_else(|| on_missing(symbol)))
            .collect()
    }
}

impl<'a, T> IntoIterator for &'a Alphabet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.symbols.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_declaration_order() {
        let alphabet = Alphabet::new(["1", "2", "3"]).unwrap();
        assert_eq!(alphabet.len(), 3);
        assert_eq!(alphabet.code_of(&"1"), Some(0));
        assert_eq!(alphabet.code_of(&"3"), Some(2));
        assert_eq!(alphabet.symbol(1), Some(&"2"));
        assert_eq!(alphabet.code_of(&"Fake"), None);
        assert_eq!(alphabet.symbol(3), None);
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        let empty: Vec<char> = Vec::new();
        assert!(matches!(
            Alphabet::new(empty),
            Err(Error::InvalidAlphabet(_))
        ));
        assert!(matches!(
            Alphabet::new(['A', 'B', 'A']),
            Err(Error::InvalidAlphabet(_))
        ));
    }

    #[test]
    fn test_encode_reports_first_unknown_symbol() {
        let alphabet = Alphabet::new(['A', 'B']).unwrap();
        let on_missing = |s: &char| Error::invalid_symbol(s, "encode");
        assert_eq!(alphabet.encode(&['A', 'B', 'B'], on_missing).unwrap(), vec![0, 1, 1]);

        let err = alphabet.encode(&['A', 'X'], on_missing).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidSymbol {
                symbol: "'X'".to_string(),
                operation: "encode"
            }
        );
    }
}
