/// A single unit of input to the DFA.
///
/// Matches are delayed by one byte in order to handle look-ahead assertions
/// (`\b`, `$`, `\z`), so once the text has been consumed a search must run
/// the DFA through one additional transition using an input that indicates
/// the text has ended. Since all 256 byte values are valid inputs, this type
/// adds explicit room for that sentinel.
///
/// The end-of-text sentinel is always its own equivalence class, represented
/// by adding 1 to the maximum byte equivalence class value.
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum Unit {
    U8(u8),
    EOT(u16),
}

impl Unit {
    /// Create a new input unit from a byte value.
    pub fn u8(byte: u8) -> Unit {
        Unit::U8(byte)
    }

    /// Create the end-of-text input unit for an alphabet with the given
    /// number of byte equivalence classes.
    pub fn eot(num_byte_classes: usize) -> Unit {
        assert!(
            num_byte_classes <= 256,
            "max number of byte equivalence classes is 256, but got {}",
            num_byte_classes,
        );
        Unit::EOT(num_byte_classes as u16)
    }

    pub fn as_u8(self) -> Option<u8> {
        match self {
            Unit::U8(b) => Some(b),
            Unit::EOT(_) => None,
        }
    }

    pub fn is_eot(self) -> bool {
        matches!(self, Unit::EOT(_))
    }

    pub fn is_byte(self, byte: u8) -> bool {
        self.as_u8().map_or(false, |b| b == byte)
    }

    pub fn is_word_byte(self) -> bool {
        self.as_u8().map_or(false, crate::look::is_word_byte)
    }
}

impl core::fmt::Debug for Unit {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            Unit::U8(b) => write!(f, "{:?}", b as char),
            Unit::EOT(_) => write!(f, "EOT"),
        }
    }
}

/// A representation of byte oriented equivalence classes.
///
/// This is used by the DFA to fold the 256 possible byte values (plus the
/// imaginary end-of-text byte) down into a small dense range, which shrinks
/// each state's transition array considerably. Two bytes belong to the same
/// class if and only if the program cannot distinguish between them.
#[derive(Clone, Copy)]
pub struct ByteClasses([u8; 256]);

impl ByteClasses {
    /// Creates a new set of equivalence classes where all bytes are mapped
    /// to the same class.
    pub fn empty() -> ByteClasses {
        ByteClasses([0; 256])
    }

    /// Creates a new set of equivalence classes where each byte belongs to
    /// its own equivalence class.
    pub fn singletons() -> ByteClasses {
        let mut classes = ByteClasses::empty();
        for b in 0..=255 {
            classes.set(b, b);
        }
        classes
    }

    /// Set the equivalence class for the given byte.
    #[inline]
    pub fn set(&mut self, byte: u8, class: u8) {
        self.0[byte as usize] = class;
    }

    /// Get the equivalence class for the given byte.
    #[inline]
    pub fn get(&self, byte: u8) -> u8 {
        self.0[byte as usize]
    }

    /// Get the equivalence class for the given input unit as a `usize`
    /// index into a state's transition array.
    #[inline]
    pub fn get_by_unit(&self, unit: Unit) -> usize {
        match unit {
            Unit::U8(b) => self.get(b) as usize,
            Unit::EOT(b) => b as usize,
        }
    }

    /// The end-of-text input unit for this alphabet.
    #[inline]
    pub fn eot(&self) -> Unit {
        Unit::eot(self.alphabet_len() - 1)
    }

    /// Return the total number of elements in the alphabet represented by
    /// these equivalence classes, including the end-of-text class.
    #[inline]
    pub fn alphabet_len(&self) -> usize {
        // Add one since the number of byte classes is one bigger than the
        // last class value, and another one for the end-of-text class that
        // isn't explicitly represented.
        self.0[255] as usize + 1 + 1
    }

    /// Returns an iterator over one representative byte per equivalence
    /// class (the smallest byte in each class).
    pub fn representatives(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8).filter(move |&b| b == 0 || self.get(b) != self.get(b - 1))
    }
}

impl core::fmt::Debug for ByteClasses {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut first = true;
        write!(f, "ByteClasses(")?;
        let mut start = 0usize;
        for b in 1..=256usize {
            if b < 256 && self.0[b] == self.0[start] {
                continue;
            }
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            if start == b - 1 {
                write!(f, "{:?} => {}", start as u8 as char, self.0[start])?;
            } else {
                write!(
                    f,
                    "{:?}-{:?} => {}",
                    start as u8 as char,
                    (b - 1) as u8 as char,
                    self.0[start],
                )?;
            }
            start = b;
        }
        write!(f, ")")
    }
}

/// A partition builder for byte equivalence classes.
///
/// Ranges of bytes that the program treats identically are merged into one
/// class by recording the boundaries of every distinguishing range and then
/// sweeping the boundary set.
#[derive(Clone, Debug)]
pub struct ByteClassSet(Vec<bool>);

impl ByteClassSet {
    /// Create a new set of byte classes where all bytes are indistinct.
    pub fn new() -> ByteClassSet {
        ByteClassSet(vec![false; 256])
    }

    /// Indicate the range of bytes given can be distinguished from all
    /// other bytes.
    pub fn set_range(&mut self, start: u8, end: u8) {
        debug_assert!(start <= end);
        if start > 0 {
            self.0[start as usize - 1] = true;
        }
        self.0[end as usize] = true;
    }

    /// Convert this boundary set into equivalence classes.
    pub fn byte_classes(&self) -> ByteClasses {
        let mut classes = ByteClasses::empty();
        let mut class = 0u8;
        let mut b = 0usize;
        loop {
            classes.set(b as u8, class);
            if b >= 255 {
                break;
            }
            if self.0[b] {
                class = class.checked_add(1).unwrap();
            }
            b += 1;
        }
        classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_classes() {
        let mut set = ByteClassSet::new();
        set.set_range(b'a', b'z');
        let classes = set.byte_classes();
        assert_eq!(classes.get(0), 0);
        assert_eq!(classes.get(b'a' - 1), 0);
        assert_eq!(classes.get(b'a'), 1);
        assert_eq!(classes.get(b'z'), 1);
        assert_eq!(classes.get(b'z' + 1), 2);
        assert_eq!(classes.get(0xFF), 2);
        // Three byte classes plus the end-of-text class.
        assert_eq!(classes.alphabet_len(), 4);
    }

    #[test]
    fn full_byte_classes() {
        let mut set = ByteClassSet::new();
        for b in 0..=255u8 {
            set.set_range(b, b);
        }
        let classes = set.byte_classes();
        assert_eq!(classes.alphabet_len(), 257);
    }

    #[test]
    fn eot_has_its_own_class() {
        let mut set = ByteClassSet::new();
        set.set_range(b'0', b'9');
        let classes = set.byte_classes();
        let eot = classes.eot();
        assert!(eot.is_eot());
        assert_eq!(
            classes.get_by_unit(eot),
            classes.alphabet_len() - 1,
        );
        assert_ne!(
            classes.get_by_unit(Unit::u8(b'5')),
            classes.get_by_unit(eot),
        );
    }

    #[test]
    fn representatives() {
        let mut set = ByteClassSet::new();
        set.set_range(b'a', b'c');
        let classes = set.byte_classes();
        let reps: Vec<u8> = classes.representatives().collect();
        assert_eq!(reps, vec![0, b'a', b'd']);
    }
}
