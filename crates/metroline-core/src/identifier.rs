//! Identifier management using string interning for efficient string storage and comparison
//!
//! This module provides the [`Id`] type used for stations, lines and sections.
//! Synthesized stations (ports and junctions) get their identifiers from the
//! dedicated constructors so their naming stays in one place.

use std::{
    fmt,
    sync::{Mutex, OnceLock},
};

use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Global string interner for efficient identifier storage.
///
/// # Thread Safety
///
/// This uses `Mutex` for thread-safe access to the string interner.
static INTERNER: OnceLock<Mutex<DefaultStringInterner>> = OnceLock::new();

fn with_interner<R>(f: impl FnOnce(&mut DefaultStringInterner) -> R) -> R {
    let mut interner = INTERNER
        .get_or_init(|| Mutex::new(DefaultStringInterner::new()))
        .lock()
        .expect("Failed to acquire interner lock");
    f(&mut interner)
}

/// Efficient identifier type using string interning
///
/// Interned symbols are assigned in first-use order, which is not stable
/// across runs. Anything that needs a deterministic order sorts by the
/// string value or by declaration order, never by the symbol.
///
/// # Examples
///
/// ```
/// use metroline_core::identifier::Id;
///
/// let station = Id::new("fastqc");
/// let port = Id::exit_port(Id::new("qc"), "right", 0);
/// assert_eq!(station, "fastqc");
/// assert_eq!(port, "qc__exit_right_0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(DefaultSymbol);

impl Id {
    /// Creates an `Id` from &str.
    ///
    /// # Arguments
    ///
    /// * `name` - The string representation of the identifier
    pub fn new(name: &str) -> Self {
        Self(with_interner(|interner| interner.get_or_intern(name)))
    }

    /// Creates the identifier of a synthesized exit port.
    ///
    /// # Arguments
    ///
    /// * `section` - The section owning the port.
    /// * `side` - Lowercase side name (`left`, `right`, `top`, `bottom`).
    /// * `counter` - Running counter shared by all synthesized stations.
    pub fn exit_port(section: Id, side: &str, counter: usize) -> Self {
        Self::new(&format!("{section}__exit_{side}_{counter}"))
    }

    /// Creates the identifier of a synthesized entry port.
    pub fn entry_port(section: Id, side: &str, counter: usize) -> Self {
        Self::new(&format!("{section}__entry_{side}_{counter}"))
    }

    /// Creates the identifier of a synthesized junction.
    ///
    /// ```
    /// use metroline_core::identifier::Id;
    ///
    /// assert_eq!(Id::junction(7), "__junction_7");
    /// ```
    pub fn junction(counter: usize) -> Self {
        Self::new(&format!("__junction_{counter}"))
    }

    /// Returns the string value behind this identifier.
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = with_interner(|interner| {
            interner
                .resolve(self.0)
                .map(str::to_owned)
                .expect("Symbol should exist in interner")
        });
        write!(f, "{value}")
    }
}

impl std::str::FromStr for Id {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Id {
    /// Creates an `Id` from a string slice
    ///
    /// This is a convenience implementation that calls `Id::new`.
    ///
    /// # Examples
    ///
    /// ```
    /// use metroline_core::identifier::Id;
    ///
    /// let id: Id = "trimming".into();
    /// assert_eq!(id, "trimming");
    /// ```
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl PartialEq<str> for Id {
    /// Allows direct comparison with string slices: `id == "string"`
    fn eq(&self, other: &str) -> bool {
        with_interner(|interner| {
            interner
                .resolve(self.0)
                .expect("Symbol should exist in interner")
                == other
        })
    }
}

impl PartialEq<&str> for Id {
    /// Allows direct comparison with string references: `id == &string`
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let id1 = Id::new("salmon");
        let id2 = Id::new("salmon");
        let id3 = Id::new("kallisto");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
        assert_eq!(id1, "salmon");
    }

    #[test]
    fn test_port_ids() {
        let section = Id::new("preprocessing");

        assert_eq!(
            Id::exit_port(section, "right", 0),
            "preprocessing__exit_right_0"
        );
        assert_eq!(
            Id::entry_port(section, "top", 3),
            "preprocessing__entry_top_3"
        );
        assert_ne!(
            Id::exit_port(section, "right", 0),
            Id::exit_port(section, "right", 1)
        );
    }

    #[test]
    fn test_junction_ids() {
        assert_eq!(Id::junction(0), Id::junction(0));
        assert_ne!(Id::junction(0), Id::junction(1));
        assert_eq!(Id::junction(12), "__junction_12");
    }

    #[test]
    fn test_display_trait() {
        let id = Id::new("display_test");
        assert_eq!(format!("{}", id), "display_test");
        assert_eq!(id.as_string(), "display_test");
    }

    #[test]
    fn test_from_trait() {
        let id1: Id = "test_string".into();
        let id2 = Id::new("test_string");

        assert_eq!(id1, id2);
        assert_eq!(id1, "test_string");
    }

    #[test]
    fn test_from_str() {
        let id: Id = "parsed".parse().unwrap();
        assert_eq!(id, "parsed");
    }

    #[test]
    fn test_hash_and_eq() {
        use std::collections::HashMap;

        let id1 = Id::new("key1");
        let id2 = Id::new("key1");
        let id3 = Id::new("key2");

        let mut map = HashMap::new();
        map.insert(id1, "value1");
        map.insert(id3, "value2");

        assert_eq!(map.get(&id2), Some(&"value1"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_partial_eq_str() {
        let id = Id::new("multiqc");

        assert!(id == "multiqc");
        assert!(id != "fastqc");

        let empty = Id::new("");
        assert!(empty == "");
        assert!(empty != "non-empty");
    }

    #[test]
    fn test_partial_eq_str_ref() {
        let id = Id::new("star_align");
        let name1 = String::from("star_align");
        let name2 = String::from("hisat2_align");

        assert!(id == name1.as_str());
        assert!(id != name2.as_str());
    }
}
