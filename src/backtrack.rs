/*!
A memoized backtracking search: the reference implementation.

This engine trades a lot of memory for simplicity: it remembers every
`(instruction, position)` pair it has explored in a bitmap sized
`prog.len() * (|text| + 1)` bits, so it runs in linear time while staying
structurally close to the definition of the matching problem. It is the
only engine here that reports capture groups.

It exists so that tests can compare the DFA against ground truth whose
correctness is easy to audit. Do not reach for it in production code: it
allocates a fresh bitmap per search and recurses proportionally to the
input size.
*/

use crate::{
    look::EmptyFlags,
    prog::{Op, Prog},
};

/// A backtracking matcher over a compiled forward program.
#[derive(Clone, Debug)]
pub struct Backtracker<'p> {
    prog: &'p Prog,
}

impl<'p> Backtracker<'p> {
    /// Create a backtracker for the given program. The program must be a
    /// forward program.
    pub fn new(prog: &'p Prog) -> Backtracker<'p> {
        assert!(
            !prog.reversed(),
            "the backtracker runs forward programs only",
        );
        Backtracker { prog }
    }

    /// Search `haystack[start..end]` and return the span of the best
    /// match. `haystack` is the full context for look-around evaluation.
    ///
    /// With `longest` disabled this finds the leftmost match preferred by
    /// backtracking order; with it enabled, the leftmost-longest match.
    pub fn search(
        &self,
        haystack: &[u8],
        range: core::ops::Range<usize>,
        anchored: bool,
        longest: bool,
    ) -> Option<(usize, usize)> {
        self.search_with_captures(haystack, range, anchored, longest, 1)
            .map(|caps| caps[0].unwrap())
    }

    /// Like `search`, but also reports the spans of the first `nsub`
    /// groups (group 0 is the whole match).
    pub fn search_with_captures(
        &self,
        haystack: &[u8],
        range: core::ops::Range<usize>,
        anchored: bool,
        longest: bool,
        nsub: usize,
    ) -> Option<Vec<Option<(usize, usize)>>> {
        assert!(range.start <= range.end && range.end <= haystack.len());
        if self.prog.anchor_start() && range.start > 0 {
            return None;
        }
        if self.prog.anchor_end() && range.end < haystack.len() {
            return None;
        }
        let anchored = anchored || self.prog.anchor_start();
        let longest = longest || self.prog.anchor_end();

        let nslots =
            core::cmp::max(self.prog.capture_slots, 2 * nsub.max(1));
        let npos = range.end - range.start + 1;
        let nvisited = (self.prog.len() * npos + 31) / 32;
        let mut run = Run {
            prog: self.prog,
            hay: haystack,
            start: range.start,
            end: range.end,
            longest,
            endmatch: self.prog.anchor_end(),
            caps: vec![None; nslots],
            visited: vec![0u32; nvisited],
            best: vec![None; nsub.max(1)],
            matched: false,
        };

        if anchored {
            run.caps[0] = Some(range.start);
            run.visit(self.prog.start(), range.start);
        } else {
            // Unanchored search is repeated anchored search from each
            // position. The bitmap persists across positions, which is
            // what keeps the whole thing linear. A success is leftmost by
            // construction, so we stop at the first one.
            for p in range.start..=range.end {
                run.caps[0] = Some(p);
                if run.visit(self.prog.start(), p) {
                    break;
                }
            }
        }
        if run.matched {
            Some(run.best)
        } else {
            None
        }
    }
}

struct Run<'p, 'h> {
    prog: &'p Prog,
    hay: &'h [u8],
    start: usize,
    end: usize,
    longest: bool,
    endmatch: bool,
    caps: Vec<Option<usize>>,
    /// Bitmap over (instruction, position) pairs already explored.
    visited: Vec<u32>,
    best: Vec<Option<(usize, usize)>>,
    matched: bool,
}

impl<'p, 'h> Run<'p, 'h> {
    /// Explore from instruction `id` at position `p`. Returns true if a
    /// match was found so the caller can stop trying other possibilities.
    fn visit(&mut self, id: u32, p: usize) -> bool {
        let npos = self.end - self.start + 1;
        let n = id as usize * npos + (p - self.start);
        if self.visited[n / 32] & (1 << (n & 31)) != 0 {
            // Already explored from here: either it did not match, or it
            // did and we are hoping for a better one. Either way, not
            // worth a second walk.
            return false;
        }
        self.visited[n / 32] |= 1 << (n & 31);

        let last = self.prog.inst(id).last();
        if self.try_inst(id, p) {
            if self.longest && !last {
                // A lower-priority alternative might end later.
                self.visit(id + 1, p);
            }
            return true;
        }
        if !last {
            return self.visit(id + 1, p);
        }
        false
    }

    /// Try instruction `id` at position `p`.
    fn try_inst(&mut self, id: u32, p: usize) -> bool {
        let inst = self.prog.inst(id);
        match inst.op {
            Op::Fail => false,
            // An optimization marker for automata; the plain alternatives
            // that follow it cover the same paths here.
            Op::AltMatch => false,
            Op::ByteRange { .. } => {
                if p < self.end && inst.matches_byte(self.hay[p]) {
                    self.visit(inst.out(), p + 1)
                } else {
                    false
                }
            }
            Op::Capture { slot } => {
                let slot = slot as usize;
                if slot < self.caps.len() {
                    // Record the position, but restore the old value as we
                    // backtrack.
                    let old = self.caps[slot];
                    self.caps[slot] = Some(p);
                    let ret = self.visit(inst.out(), p);
                    self.caps[slot] = old;
                    ret
                } else {
                    self.visit(inst.out(), p)
                }
            }
            Op::EmptyWidth { look } => {
                if EmptyFlags::at(self.hay, p).contains(look) {
                    self.visit(inst.out(), p)
                } else {
                    false
                }
            }
            Op::Nop => self.visit(inst.out(), p),
            Op::Match { .. } => {
                if self.endmatch && p != self.hay.len() {
                    return false;
                }
                self.caps[1] = Some(p);
                let better = match self.best[0] {
                    None => true,
                    Some((_, e)) => self.longest && p > e,
                };
                if better {
                    for i in 0..self.best.len() {
                        self.best[i] =
                            match (self.caps[2 * i], self.caps[2 * i + 1]) {
                                (Some(s), Some(e)) => Some((s, e)),
                                _ => None,
                            };
                    }
                }
                self.matched = true;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Compiler;

    fn find(
        pattern: &str,
        hay: &[u8],
        longest: bool,
    ) -> Option<(usize, usize)> {
        let prog = Compiler::new().compile(pattern).unwrap();
        Backtracker::new(&prog).search(hay, 0..hay.len(), false, longest)
    }

    #[test]
    fn leftmost_first() {
        assert_eq!(find("a*b", b"aaab", false), Some((0, 4)));
        assert_eq!(find("a|ab", b"ab", false), Some((0, 1)));
        assert_eq!(find("foo|foobar", b"foobar", false), Some((0, 3)));
        assert_eq!(find("b", b"abc", false), Some((1, 2)));
        assert_eq!(find("x", b"abc", false), None);
    }

    #[test]
    fn leftmost_longest() {
        assert_eq!(find("foo|foobar", b"foobar", true), Some((0, 6)));
        assert_eq!(find("a|ab", b"ab", true), Some((0, 2)));
        // Leftmost still wins over longer-but-later.
        assert_eq!(find("a|bb", b"abb", true), Some((0, 1)));
    }

    #[test]
    fn empty_matches() {
        assert_eq!(find("a*", b"", false), Some((0, 0)));
        assert_eq!(find("a*", b"baa", false), Some((0, 0)));
        assert_eq!(find("a*", b"baa", true), Some((0, 0)));
    }

    #[test]
    fn word_boundaries_use_context() {
        let prog = Compiler::new().compile(r"\bword\b").unwrap();
        let bt = Backtracker::new(&prog);
        assert_eq!(bt.search(b" word ", 1..5, true, false), Some((1, 5)));
        assert_eq!(bt.search(b"xword ", 1..5, true, false), None);
    }

    #[test]
    fn captures() {
        let prog = Compiler::new().compile("(a+)(b+)").unwrap();
        let bt = Backtracker::new(&prog);
        let caps = bt
            .search_with_captures(b"xaabbb", 0..6, false, false, 3)
            .unwrap();
        assert_eq!(caps[0], Some((1, 6)));
        assert_eq!(caps[1], Some((1, 3)));
        assert_eq!(caps[2], Some((3, 6)));
    }

    #[test]
    fn pathological_repetition_terminates() {
        // Without the visited bitmap this would be exponential.
        assert_eq!(
            find("(a*)*c", b"aaaaaaaaaaaaaaaaaaaaaaaaaaaab", false),
            None,
        );
    }
}
