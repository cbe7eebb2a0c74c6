/// A set of empty-width assertions.
///
/// An empty-width assertion is a predicate on a position in the input
/// rather than on a byte: the beginning or end of the text, the beginning
/// or end of a line, or a word boundary. The program's conditional epsilon
/// transitions carry one of these sets; a simulation may only follow such a
/// transition when every assertion in the set holds at the current
/// position.
///
/// The representation is a bitset in a `u8` so that it packs into the low
/// byte of a DFA state's flag word.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct EmptyFlags(u8);

impl EmptyFlags {
    /// The position is preceded by `\n` or is the beginning of the text.
    pub const BEGIN_LINE: EmptyFlags = EmptyFlags(1 << 0);
    /// The position is followed by `\n` or is the end of the text.
    pub const END_LINE: EmptyFlags = EmptyFlags(1 << 1);
    /// The position is the beginning of the text.
    pub const BEGIN_TEXT: EmptyFlags = EmptyFlags(1 << 2);
    /// The position is the end of the text.
    pub const END_TEXT: EmptyFlags = EmptyFlags(1 << 3);
    /// Exactly one of the surrounding bytes is a word byte.
    pub const WORD_BOUNDARY: EmptyFlags = EmptyFlags(1 << 4);
    /// The surrounding bytes are both word bytes or both non-word bytes.
    pub const NON_WORD_BOUNDARY: EmptyFlags = EmptyFlags(1 << 5);

    /// Create an empty set.
    #[inline]
    pub fn empty() -> EmptyFlags {
        EmptyFlags(0)
    }

    /// Create a set from its bit representation.
    #[inline]
    pub fn from_repr(bits: u8) -> EmptyFlags {
        EmptyFlags(bits)
    }

    /// Return the bit representation of this set.
    #[inline]
    pub fn as_repr(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if and only if every assertion in `other` is also in
    /// this set.
    #[inline]
    pub fn contains(self, other: EmptyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: EmptyFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn union(self, other: EmptyFlags) -> EmptyFlags {
        EmptyFlags(self.0 | other.0)
    }

    #[inline]
    pub fn intersect(self, other: EmptyFlags) -> EmptyFlags {
        EmptyFlags(self.0 & other.0)
    }

    #[inline]
    pub fn difference(self, other: EmptyFlags) -> EmptyFlags {
        EmptyFlags(self.0 & !other.0)
    }

    /// Flip each assertion to its equivalent for reversed execution:
    /// begin-text becomes end-text, begin-line becomes end-line and vice
    /// versa. Word boundaries are symmetric and unchanged.
    pub fn reversed(self) -> EmptyFlags {
        let mut rev = EmptyFlags::empty();
        if self.contains(EmptyFlags::BEGIN_TEXT) {
            rev.insert(EmptyFlags::END_TEXT);
        }
        if self.contains(EmptyFlags::END_TEXT) {
            rev.insert(EmptyFlags::BEGIN_TEXT);
        }
        if self.contains(EmptyFlags::BEGIN_LINE) {
            rev.insert(EmptyFlags::END_LINE);
        }
        if self.contains(EmptyFlags::END_LINE) {
            rev.insert(EmptyFlags::BEGIN_LINE);
        }
        rev.insert(self.intersect(
            EmptyFlags::WORD_BOUNDARY.union(EmptyFlags::NON_WORD_BOUNDARY),
        ));
        rev
    }

    /// Compute the set of assertions that hold at position `at` in
    /// `haystack`. `at` may be equal to `haystack.len()`, which corresponds
    /// to the position past the final byte.
    pub fn at(haystack: &[u8], at: usize) -> EmptyFlags {
        assert!(at <= haystack.len());
        let mut flags = EmptyFlags::empty();
        if at == 0 {
            flags.insert(EmptyFlags::BEGIN_TEXT);
            flags.insert(EmptyFlags::BEGIN_LINE);
        } else if haystack[at - 1] == b'\n' {
            flags.insert(EmptyFlags::BEGIN_LINE);
        }
        if at == haystack.len() {
            flags.insert(EmptyFlags::END_TEXT);
            flags.insert(EmptyFlags::END_LINE);
        } else if haystack[at] == b'\n' {
            flags.insert(EmptyFlags::END_LINE);
        }
        let word_before = at > 0 && is_word_byte(haystack[at - 1]);
        let word_after = at < haystack.len() && is_word_byte(haystack[at]);
        if word_before == word_after {
            flags.insert(EmptyFlags::NON_WORD_BOUNDARY);
        } else {
            flags.insert(EmptyFlags::WORD_BOUNDARY);
        }
        flags
    }
}

impl core::fmt::Debug for EmptyFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "EmptyFlags(")?;
        let mut sep = "";
        for (flag, name) in [
            (EmptyFlags::BEGIN_LINE, "^"),
            (EmptyFlags::END_LINE, "$"),
            (EmptyFlags::BEGIN_TEXT, r"\A"),
            (EmptyFlags::END_TEXT, r"\z"),
            (EmptyFlags::WORD_BOUNDARY, r"\b"),
            (EmptyFlags::NON_WORD_BOUNDARY, r"\B"),
        ] {
            if self.contains(flag) {
                write!(f, "{}{}", sep, name)?;
                sep = "|";
            }
        }
        write!(f, ")")
    }
}

/// Returns true if and only if the given byte is a word byte, i.e., one of
/// `[0-9A-Za-z_]`.
#[inline]
pub fn is_word_byte(b: u8) -> bool {
    matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'_')
}
