use std::sync::{Arc, OnceLock, Weak};

use crate::{look::EmptyFlags, prog::PatternID};

/// A sentinel entry in a state's instruction list separating priority
/// cohorts. Never a valid instruction id.
pub(crate) const MARK: u32 = u32::MAX;

/// A sentinel entry in a state's instruction list; the entries following
/// it are the pattern ids matching in this state (many-match only).
pub(crate) const MATCH_SEP: u32 = u32::MAX - 1;

/// The flag word of a DFA state.
///
/// The packing is part of state identity:
///
/// * bits 0-7: the empty-width assertions that were in force on the way
///   into this state;
/// * bit 8: this is a matching state;
/// * bit 9: the byte that led into this state was a word byte;
/// * bits 16-23: the union of the assertions required by the state's
///   pending empty-width instructions. When a newly observable assertion
///   intersects this mask, the epsilon closure must be re-run before the
///   next byte is consumed.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub(crate) struct StateFlags(u32);

impl StateFlags {
    pub(crate) const MATCH: u32 = 1 << 8;
    pub(crate) const LAST_WORD: u32 = 1 << 9;
    const EMPTY_MASK: u32 = 0xFF;
    const NEED_SHIFT: u32 = 16;

    #[inline]
    pub(crate) fn from_bits(bits: u32) -> StateFlags {
        StateFlags(bits)
    }

    #[inline]
    pub(crate) fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn is_match(self) -> bool {
        self.0 & StateFlags::MATCH != 0
    }

    #[inline]
    pub(crate) fn is_last_word(self) -> bool {
        self.0 & StateFlags::LAST_WORD != 0
    }

    /// The empty-width assertions that held on entry to this state.
    #[inline]
    pub(crate) fn empty_flags(self) -> EmptyFlags {
        EmptyFlags::from_repr((self.0 & StateFlags::EMPTY_MASK) as u8)
    }

    /// The assertions required by this state's pending empty-width
    /// instructions.
    #[inline]
    pub(crate) fn need_flags(self) -> EmptyFlags {
        EmptyFlags::from_repr((self.0 >> StateFlags::NEED_SHIFT) as u8)
    }

    /// Pack entry assertions, a match bit, a last-word bit and a needed
    /// assertion mask into one flag word.
    #[inline]
    pub(crate) fn pack(
        empty: EmptyFlags,
        is_match: bool,
        last_word: bool,
        need: EmptyFlags,
    ) -> StateFlags {
        let mut bits = empty.as_repr() as u32;
        if is_match {
            bits |= StateFlags::MATCH;
        }
        if last_word {
            bits |= StateFlags::LAST_WORD;
        }
        bits |= (need.as_repr() as u32) << StateFlags::NEED_SHIFT;
        StateFlags(bits)
    }
}

impl core::fmt::Debug for StateFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "StateFlags(empty={:?}, match={}, last_word={}, need={:?})",
            self.empty_flags(),
            self.is_match(),
            self.is_last_word(),
            self.need_flags(),
        )
    }
}

/// A canonical DFA state: an ordered set of instruction ids plus the flag
/// word in force on entry.
///
/// State identity is exactly `(flags, insts)`. The intern pool guarantees
/// that two structurally equal states are the same allocation, so
/// `Arc::ptr_eq` coincides with structural equality for interned states.
///
/// A state is never mutated after publication. Its only interior
/// mutability is the transition array, whose slots advance from unset to a
/// published successor exactly once per cache epoch.
pub(crate) struct State {
    flags: StateFlags,
    insts: Arc<[u32]>,
    /// One slot per byte class, plus one for the end-of-text class.
    next: Box<[OnceLock<NextPtr>]>,
}

impl State {
    pub(crate) fn new(
        flags: StateFlags,
        insts: Arc<[u32]>,
        alphabet_len: usize,
    ) -> State {
        let next = (0..alphabet_len).map(|_| OnceLock::new()).collect();
        State { flags, insts, next }
    }

    #[inline]
    pub(crate) fn flags(&self) -> StateFlags {
        self.flags
    }

    #[inline]
    pub(crate) fn is_match(&self) -> bool {
        self.flags.is_match()
    }

    /// The instruction list, including any MARK and MATCH_SEP sentinels.
    #[inline]
    pub(crate) fn insts(&self) -> &[u32] {
        &self.insts
    }

    /// Returns true when this state has at least one live instruction.
    /// A state without any (a match-only remnant) can only die on the
    /// next input.
    #[inline]
    pub(crate) fn has_insts(&self) -> bool {
        self.insts.first().map_or(false, |&id| id != MATCH_SEP)
    }

    /// The pattern ids matching in this state, when the state was built
    /// under many-match semantics.
    pub(crate) fn match_ids(&self) -> impl Iterator<Item = PatternID> + '_ {
        let sep = self.insts.iter().position(|&id| id == MATCH_SEP);
        let ids = match sep {
            None => &[][..],
            Some(i) => &self.insts[i + 1..],
        };
        ids.iter().map(|&id| PatternID(id))
    }

    #[inline]
    pub(crate) fn next_slot(&self, class: usize) -> &OnceLock<NextPtr> {
        &self.next[class]
    }

    /// The number of budget bytes this state costs while interned.
    pub(crate) fn memory_usage(&self) -> usize {
        core::mem::size_of::<State>()
            + self.insts.len() * core::mem::size_of::<u32>()
            + self.next.len() * core::mem::size_of::<OnceLock<NextPtr>>()
    }
}

impl core::fmt::Debug for State {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "State({:?}, [", self.flags)?;
        let mut sep = "";
        for &id in self.insts.iter() {
            match id {
                MARK => write!(f, "{}|", sep)?,
                MATCH_SEP => write!(f, "{};", sep)?,
                _ => write!(f, "{}{}", sep, id)?,
            }
            sep = " ";
        }
        write!(f, "])")
    }
}

/// A published transition: either one of the two per-DFA sentinels, or a
/// weak reference to an interned successor.
///
/// Transition slots hold weak references so that the intern pool owns the
/// only strong references to states. The state graph is highly cyclic, and
/// this is what lets a cache flush reclaim the whole graph by clearing the
/// pool.
#[derive(Clone, Debug)]
pub(crate) enum NextPtr {
    /// No further input can lead to a match.
    Dead,
    /// Every further input stays in a matching state; the search can stop
    /// and report a match covering the rest of the text.
    FullMatch,
    State(Weak<State>),
}

/// A resolved reference to a DFA state, holding the successor alive for
/// the duration of a step.
#[derive(Clone, Debug)]
pub(crate) enum StatePtr {
    Dead,
    FullMatch,
    State(Arc<State>),
}

impl StatePtr {
    #[inline]
    pub(crate) fn downgrade(&self) -> NextPtr {
        match *self {
            StatePtr::Dead => NextPtr::Dead,
            StatePtr::FullMatch => NextPtr::FullMatch,
            StatePtr::State(ref s) => NextPtr::State(Arc::downgrade(s)),
        }
    }
}

impl NextPtr {
    /// Resolve this published transition to a strong reference.
    ///
    /// The upgrade cannot fail for callers that hold the cache read lock:
    /// interned states are only dropped by a cache flush, and a flush
    /// requires the write lock.
    #[inline]
    pub(crate) fn upgrade(&self) -> StatePtr {
        match *self {
            NextPtr::Dead => StatePtr::Dead,
            NextPtr::FullMatch => StatePtr::FullMatch,
            NextPtr::State(ref w) => StatePtr::State(
                w.upgrade().expect("state outlives its cache epoch"),
            ),
        }
    }
}

/// The intern pool key for a state: its flag word and instruction list.
/// The instruction list allocation is shared with the interned state.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct StateKey {
    pub(crate) flags: u32,
    pub(crate) insts: Arc<[u32]>,
}

/// A state's identity saved by value, so that it can be re-interned after
/// a cache flush invalidates every state reference.
///
/// Raw state references must never be kept across a read-to-write upgrade
/// of the cache lock. Save the identity first, flush, then restore. The
/// sentinel states need no saving: they are enum variants and survive
/// flushes by construction.
#[derive(Clone, Debug)]
pub(crate) struct StateSaver {
    pub(crate) flags: StateFlags,
    pub(crate) insts: Vec<u32>,
}

impl StateSaver {
    pub(crate) fn from_state(s: &State) -> StateSaver {
        StateSaver { flags: s.flags(), insts: s.insts().to_vec() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_packing_round_trips() {
        let empty = EmptyFlags::BEGIN_TEXT.union(EmptyFlags::BEGIN_LINE);
        let need = EmptyFlags::WORD_BOUNDARY;
        let flags = StateFlags::pack(empty, true, true, need);
        assert_eq!(flags.empty_flags(), empty);
        assert!(flags.is_match());
        assert!(flags.is_last_word());
        assert_eq!(flags.need_flags(), need);

        let flags = StateFlags::pack(
            EmptyFlags::empty(),
            false,
            false,
            EmptyFlags::empty(),
        );
        assert_eq!(flags.bits(), 0);
    }

    #[test]
    fn match_ids_follow_separator() {
        let insts: Arc<[u32]> = Arc::from(&[4u32, 9, MATCH_SEP, 0, 2][..]);
        let state = State::new(StateFlags::from_bits(0), insts, 4);
        let ids: Vec<usize> =
            state.match_ids().map(|p| p.as_usize()).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn no_separator_means_no_ids() {
        let insts: Arc<[u32]> = Arc::from(&[4u32, 9][..]);
        let state = State::new(StateFlags::from_bits(0), insts, 4);
        assert_eq!(state.match_ids().count(), 0);
    }

    #[test]
    fn key_equality_is_structural() {
        let a = StateKey { flags: 3, insts: Arc::from(&[1u32, 2][..]) };
        let b = StateKey { flags: 3, insts: Arc::from(&[1u32, 2][..]) };
        let c = StateKey { flags: 3, insts: Arc::from(&[2u32, 1][..]) };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
