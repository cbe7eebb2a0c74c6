use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::iter;

use regex_syntax::hir::{self, Hir, HirKind};
use regex_syntax::utf8::Utf8Sequences;
use regex_syntax::ParserBuilder;

use crate::{
    alphabet::ByteClassSet,
    error::BuildError,
    look::EmptyFlags,
    prog::{Inst, Op, PatternID, Prefix, Prog},
};

/// The maximum number of instructions a compiled program may have.
const MAX_INSTS: usize = 1 << 24;

/// A compiler from regex patterns to byte-oriented programs.
///
/// The compiler produces the flat instruction form consumed by the DFA and
/// the backtracker. Compilation goes through an intermediate graph in which
/// alternation is explicit, and a final flattening pass lays the
/// alternatives of each group out in consecutive instruction slots.
///
/// # Example
///
/// ```
/// use lazydfa::Compiler;
///
/// let prog = Compiler::new().compile(r"a*b")?;
/// assert!(!prog.reversed());
/// # Ok::<(), lazydfa::BuildError>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct Compiler {
    reversed: bool,
}

impl Compiler {
    /// Create a new compiler with the default configuration.
    pub fn new() -> Compiler {
        Compiler { reversed: false }
    }

    /// When enabled, the program is compiled for reversed execution: it
    /// matches the reversal of the pattern's language, with look-around
    /// assertions flipped. Running such a program backward over the text
    /// finds match start positions.
    pub fn reversed(mut self, yes: bool) -> Compiler {
        self.reversed = yes;
        self
    }

    /// Compile a single pattern.
    pub fn compile(&self, pattern: &str) -> Result<Prog, BuildError> {
        self.compile_many(&[pattern])
    }

    /// Compile a union of patterns. Pattern `i` of the sequence reports
    /// matches with pattern identifier `i`. Earlier patterns have higher
    /// priority under first-match semantics.
    pub fn compile_many(
        &self,
        patterns: &[&str],
    ) -> Result<Prog, BuildError> {
        assert!(!patterns.is_empty(), "must compile at least one pattern");
        let mut hirs = Vec::with_capacity(patterns.len());
        for p in patterns {
            let mut parser = ParserBuilder::new().utf8(false).build();
            hirs.push(parser.parse(p).map_err(BuildError::syntax)?);
        }
        self.compile_hirs(&hirs)
    }

    /// Compile a sequence of already-parsed patterns.
    pub fn compile_hirs(&self, hirs: &[Hir]) -> Result<Prog, BuildError> {
        assert!(!hirs.is_empty(), "must compile at least one pattern");
        let mut anchor_start = true;
        let mut anchor_end = true;
        for hir in hirs {
            let props = hir.properties();
            anchor_start = anchor_start
                && props.look_set_prefix().contains(hir::Look::Start);
            anchor_end = anchor_end
                && props.look_set_suffix().contains(hir::Look::End);
        }
        if self.reversed {
            core::mem::swap(&mut anchor_start, &mut anchor_end);
        }

        let builder = GraphBuilder::new(self.reversed);
        let mut alts = Vec::with_capacity(hirs.len());
        for (i, hir) in hirs.iter().enumerate() {
            let frag = builder.compile(hir)?;
            let m = builder.add_match(i as u32);
            builder.patch(frag.end, m);
            alts.push(frag.start);
        }
        let main_start = if alts.len() == 1 {
            alts[0]
        } else {
            builder.add_union_of(alts)
        };

        // The unanchored entry threads a non-greedy any-byte loop in front
        // of the pattern: prefer starting a match here, otherwise consume
        // one byte and try again.
        let unanch = builder.add_union();
        let loop_bstate = builder.add_range(0x00, 0xFF);
        builder.patch(unanch, main_start);
        builder.patch(unanch, loop_bstate);
        builder.patch(loop_bstate, unanch);

        let flat = builder.flatten(main_start, unanch, loop_bstate)?;
        let classes = byte_classes(&flat.insts);
        let prefix = first_bytes(&flat.insts, flat.start);
        debug!(
            "compiled {} instructions, prefix accel bytes: {:?}",
            flat.insts.len(),
            prefix.as_ref().map(Vec::len),
        );
        Ok(Prog {
            insts: flat.insts,
            start: flat.start,
            start_unanchored: flat.start_unanchored,
            unanchored_loop: flat.unanchored_loop,
            classes,
            anchor_start,
            anchor_end,
            prefix: prefix.and_then(Prefix::new),
            reversed: self.reversed,
            pattern_len: hirs.len(),
            capture_slots: builder.capture_slots(),
        })
    }
}

/// An intermediate graph state. Alternation is explicit here; the
/// flattening pass removes `Union` nodes by laying their alternatives out
/// consecutively.
#[derive(Debug)]
enum BState {
    Empty { next: usize },
    Range { lo: u8, hi: u8, next: usize },
    Look { look: EmptyFlags, next: usize },
    Save { slot: u32, next: usize },
    Union { alts: Vec<usize>, reverse: bool },
    Match { pattern: u32 },
    Fail,
}

/// A fragment of the intermediate graph with a single entry and a single
/// exit to patch.
#[derive(Clone, Copy, Debug)]
struct Frag {
    start: usize,
    end: usize,
}

struct GraphBuilder {
    states: RefCell<Vec<BState>>,
    reversed: bool,
    max_group: Cell<u32>,
}

impl GraphBuilder {
    fn new(reversed: bool) -> GraphBuilder {
        GraphBuilder {
            states: RefCell::new(vec![]),
            reversed,
            max_group: Cell::new(0),
        }
    }

    fn capture_slots(&self) -> usize {
        2 * (self.max_group.get() as usize + 1)
    }

    fn compile(&self, expr: &Hir) -> Result<Frag, BuildError> {
        match expr.kind() {
            HirKind::Empty => Ok(self.compile_empty()),
            HirKind::Literal(hir::Literal(ref bytes)) => {
                if self.reversed {
                    let it = bytes
                        .iter()
                        .rev()
                        .map(|&b| Ok(self.compile_range(b, b)));
                    self.compile_concat(it)
                } else {
                    let it =
                        bytes.iter().map(|&b| Ok(self.compile_range(b, b)));
                    self.compile_concat(it)
                }
            }
            HirKind::Class(hir::Class::Bytes(ref cls)) => {
                if cls.iter().next().is_none() {
                    return Ok(self.compile_fail());
                }
                let it = cls
                    .iter()
                    .map(|rng| Ok(self.compile_range(rng.start(), rng.end())));
                self.compile_alternation(it)
            }
            HirKind::Class(hir::Class::Unicode(ref cls)) => {
                if cls.iter().next().is_none() {
                    return Ok(self.compile_fail());
                }
                self.compile_unicode_class(cls)
            }
            HirKind::Look(ref look) => {
                let mut flags = match *look {
                    hir::Look::Start => EmptyFlags::BEGIN_TEXT,
                    hir::Look::End => EmptyFlags::END_TEXT,
                    hir::Look::StartLF => EmptyFlags::BEGIN_LINE,
                    hir::Look::EndLF => EmptyFlags::END_LINE,
                    hir::Look::WordAscii | hir::Look::WordUnicode => {
                        EmptyFlags::WORD_BOUNDARY
                    }
                    hir::Look::WordAsciiNegate
                    | hir::Look::WordUnicodeNegate => {
                        EmptyFlags::NON_WORD_BOUNDARY
                    }
                    _ => {
                        return Err(BuildError::unsupported(
                            "look-around assertion has no byte-oriented \
                             equivalent",
                        ))
                    }
                };
                if self.reversed {
                    flags = flags.reversed();
                }
                let id = self.add_look(flags);
                Ok(Frag { start: id, end: id })
            }
            HirKind::Repetition(ref rep) => self.compile_repetition(rep),
            HirKind::Capture(ref cap) => {
                if self.reversed {
                    return self.compile(&cap.sub);
                }
                if cap.index > self.max_group.get() {
                    self.max_group.set(cap.index);
                }
                let open = self.add_save(2 * cap.index);
                let close = self.add_save(2 * cap.index + 1);
                let sub = self.compile(&cap.sub)?;
                self.patch(open, sub.start);
                self.patch(sub.end, close);
                Ok(Frag { start: open, end: close })
            }
            HirKind::Concat(ref exprs) => {
                if self.reversed {
                    self.compile_concat(
                        exprs.iter().rev().map(|e| self.compile(e)),
                    )
                } else {
                    self.compile_concat(exprs.iter().map(|e| self.compile(e)))
                }
            }
            HirKind::Alternation(ref exprs) => {
                self.compile_alternation(exprs.iter().map(|e| self.compile(e)))
            }
        }
    }

    fn compile_concat<I>(&self, mut it: I) -> Result<Frag, BuildError>
    where
        I: Iterator<Item = Result<Frag, BuildError>>,
    {
        let Frag { start, mut end } = match it.next() {
            Some(result) => result?,
            None => return Ok(self.compile_empty()),
        };
        for result in it {
            let compiled = result?;
            self.patch(end, compiled.start);
            end = compiled.end;
        }
        Ok(Frag { start, end })
    }

    fn compile_alternation<I>(&self, it: I) -> Result<Frag, BuildError>
    where
        I: Iterator<Item = Result<Frag, BuildError>>,
    {
        let union = self.add_union();
        let mut alternate_ends = vec![];
        for result in it {
            let compiled = result?;
            self.patch(union, compiled.start);
            alternate_ends.push(compiled.end);
        }
        assert!(!alternate_ends.is_empty(), "alternations must be non-empty");
        let empty = self.add_empty();
        for id in alternate_ends {
            self.patch(id, empty);
        }
        Ok(Frag { start: union, end: empty })
    }

    fn compile_repetition(
        &self,
        rep: &hir::Repetition,
    ) -> Result<Frag, BuildError> {
        match (rep.min, rep.max) {
            (0, Some(1)) => self.compile_zero_or_one(&rep.sub, rep.greedy),
            (min, None) => self.compile_at_least(&rep.sub, rep.greedy, min),
            (min, Some(max)) if min == max => {
                self.compile_exactly(&rep.sub, min)
            }
            (min, Some(max)) => {
                self.compile_bounded(&rep.sub, rep.greedy, min, max)
            }
        }
    }

    fn compile_bounded(
        &self,
        expr: &Hir,
        greedy: bool,
        min: u32,
        max: u32,
    ) -> Result<Frag, BuildError> {
        let prefix = self.compile_exactly(expr, min)?;
        let suffix = self.compile_concat(
            (min..max).map(|_| self.compile_zero_or_one(expr, greedy)),
        )?;
        self.patch(prefix.end, suffix.start);
        Ok(Frag { start: prefix.start, end: suffix.end })
    }

    fn compile_at_least(
        &self,
        expr: &Hir,
        greedy: bool,
        n: u32,
    ) -> Result<Frag, BuildError> {
        if n == 0 {
            let union = if greedy {
                self.add_union()
            } else {
                self.add_reverse_union()
            };
            let compiled = self.compile(expr)?;
            self.patch(union, compiled.start);
            self.patch(compiled.end, union);
            Ok(Frag { start: union, end: union })
        } else if n == 1 {
            let compiled = self.compile(expr)?;
            let union = if greedy {
                self.add_union()
            } else {
                self.add_reverse_union()
            };
            self.patch(compiled.end, union);
            self.patch(union, compiled.start);
            Ok(Frag { start: compiled.start, end: union })
        } else {
            let prefix = self.compile_exactly(expr, n - 1)?;
            let last = self.compile(expr)?;
            let union = if greedy {
                self.add_union()
            } else {
                self.add_reverse_union()
            };
            self.patch(prefix.end, last.start);
            self.patch(last.end, union);
            self.patch(union, last.start);
            Ok(Frag { start: prefix.start, end: union })
        }
    }

    fn compile_zero_or_one(
        &self,
        expr: &Hir,
        greedy: bool,
    ) -> Result<Frag, BuildError> {
        let union = if greedy {
            self.add_union()
        } else {
            self.add_reverse_union()
        };
        let compiled = self.compile(expr)?;
        let empty = self.add_empty();
        self.patch(union, compiled.start);
        self.patch(union, empty);
        self.patch(compiled.end, empty);
        Ok(Frag { start: union, end: empty })
    }

    fn compile_exactly(&self, expr: &Hir, n: u32) -> Result<Frag, BuildError> {
        let it = iter::repeat(()).take(n as usize).map(|_| self.compile(expr));
        self.compile_concat(it)
    }

    fn compile_unicode_class(
        &self,
        cls: &hir::ClassUnicode,
    ) -> Result<Frag, BuildError> {
        let reversed = self.reversed;
        let it = cls
            .iter()
            .flat_map(|rng| Utf8Sequences::new(rng.start(), rng.end()))
            .map(|seq| {
                let ranges = seq.as_slice();
                if reversed {
                    let it = ranges
                        .iter()
                        .rev()
                        .map(|rng| Ok(self.compile_range(rng.start, rng.end)));
                    self.compile_concat(it)
                } else {
                    let it = ranges
                        .iter()
                        .map(|rng| Ok(self.compile_range(rng.start, rng.end)));
                    self.compile_concat(it)
                }
            });
        self.compile_alternation(it)
    }

    fn compile_range(&self, lo: u8, hi: u8) -> Frag {
        let id = self.add_range(lo, hi);
        Frag { start: id, end: id }
    }

    fn compile_empty(&self) -> Frag {
        let id = self.add_empty();
        Frag { start: id, end: id }
    }

    fn compile_fail(&self) -> Frag {
        let id = self.add(BState::Fail);
        Frag { start: id, end: id }
    }

    fn patch(&self, from: usize, to: usize) {
        match self.states.borrow_mut()[from] {
            BState::Empty { ref mut next } => *next = to,
            BState::Range { ref mut next, .. } => *next = to,
            BState::Look { ref mut next, .. } => *next = to,
            BState::Save { ref mut next, .. } => *next = to,
            BState::Union { ref mut alts, reverse: false } => alts.push(to),
            BState::Union { ref mut alts, reverse: true } => {
                alts.insert(0, to)
            }
            BState::Match { .. } | BState::Fail => {}
        }
    }

    fn add(&self, state: BState) -> usize {
        let mut states = self.states.borrow_mut();
        let id = states.len();
        states.push(state);
        id
    }

    fn add_empty(&self) -> usize {
        self.add(BState::Empty { next: 0 })
    }

    fn add_range(&self, lo: u8, hi: u8) -> usize {
        self.add(BState::Range { lo, hi, next: 0 })
    }

    fn add_look(&self, look: EmptyFlags) -> usize {
        self.add(BState::Look { look, next: 0 })
    }

    fn add_save(&self, slot: u32) -> usize {
        self.add(BState::Save { slot, next: 0 })
    }

    fn add_union(&self) -> usize {
        self.add(BState::Union { alts: vec![], reverse: false })
    }

    fn add_reverse_union(&self) -> usize {
        self.add(BState::Union { alts: vec![], reverse: true })
    }

    fn add_union_of(&self, alts: Vec<usize>) -> usize {
        self.add(BState::Union { alts, reverse: false })
    }

    fn add_match(&self, pattern: u32) -> usize {
        self.add(BState::Match { pattern })
    }

    /// Remove the explicit `Union` nodes by expanding each union tree into
    /// a consecutive run of instructions. Every node that is the target of
    /// a consumed edge becomes the root of a block; a block's members are
    /// the non-union nodes of the in-order traversal of the union tree
    /// rooted there, emitted consecutively with `last` set on the final
    /// member.
    fn flatten(
        &self,
        main_start: usize,
        unanch_start: usize,
        loop_bstate: usize,
    ) -> Result<Flattened, BuildError> {
        let states = self.states.borrow();
        let mut block_of: HashMap<usize, u32> = HashMap::new();
        let mut blocks: Vec<Vec<usize>> = vec![];
        let mut queue: VecDeque<usize> = VecDeque::new();
        queue.push_back(main_start);
        queue.push_back(unanch_start);

        let mut next_inst = 0u32;
        while let Some(root) = queue.pop_front() {
            if block_of.contains_key(&root) {
                continue;
            }
            let members = expand_union_tree(&states, root);
            debug_assert!(!members.is_empty());
            block_of.insert(root, next_inst);
            next_inst += members.len() as u32;
            if next_inst as usize > MAX_INSTS {
                return Err(BuildError::too_many_instructions(
                    next_inst as usize,
                    MAX_INSTS,
                ));
            }
            for &m in &members {
                match states[m] {
                    BState::Empty { next }
                    | BState::Range { next, .. }
                    | BState::Look { next, .. }
                    | BState::Save { next, .. } => queue.push_back(next),
                    BState::Match { .. } | BState::Fail => {}
                    BState::Union { .. } => unreachable!(),
                }
            }
            blocks.push(members);
        }

        let mut insts = Vec::with_capacity(next_inst as usize);
        let mut unanchored_loop = None;
        for members in &blocks {
            for (i, &m) in members.iter().enumerate() {
                let last = i == members.len() - 1;
                if m == loop_bstate {
                    unanchored_loop = Some(insts.len() as u32);
                }
                let (op, out) = match states[m] {
                    BState::Empty { next } => (Op::Nop, block_of[&next]),
                    BState::Range { lo, hi, next } => {
                        (Op::ByteRange { lo, hi }, block_of[&next])
                    }
                    BState::Look { look, next } => {
                        (Op::EmptyWidth { look }, block_of[&next])
                    }
                    BState::Save { slot, next } => {
                        (Op::Capture { slot }, block_of[&next])
                    }
                    BState::Match { pattern } => {
                        (Op::Match { pattern: PatternID(pattern) }, 0)
                    }
                    BState::Fail => (Op::Fail, 0),
                    BState::Union { .. } => unreachable!(),
                };
                insts.push(Inst { op, out, last });
            }
        }
        Ok(Flattened {
            insts,
            start: block_of[&main_start],
            start_unanchored: block_of[&unanch_start],
            unanchored_loop,
        })
    }
}

struct Flattened {
    insts: Vec<Inst>,
    start: u32,
    start_unanchored: u32,
    unanchored_loop: Option<u32>,
}

/// In-order traversal of the union tree rooted at `root`, yielding its
/// non-union leaves. Cycles through unions (from constructs like `(a*)*`)
/// are cut by keeping a visited set; re-entering a union contributes
/// nothing new.
fn expand_union_tree(states: &[BState], root: usize) -> Vec<usize> {
    let mut members = vec![];
    let mut seen = vec![];
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if seen.contains(&id) {
            continue;
        }
        seen.push(id);
        match states[id] {
            BState::Union { ref alts, .. } => {
                for &alt in alts.iter().rev() {
                    stack.push(alt);
                }
            }
            _ => members.push(id),
        }
    }
    members
}

/// Compute byte equivalence classes for a program. Bytes are distinguished
/// when some byte range splits them, and additionally on the word/non-word
/// partition or at `\n` when the program contains assertions sensitive to
/// those distinctions. The DFA publishes one transition per class, so any
/// byte property that can influence a successor state must be uniform
/// within a class.
fn byte_classes(insts: &[Inst]) -> crate::alphabet::ByteClasses {
    let mut set = ByteClassSet::new();
    let mut uses_word = false;
    let mut uses_line = false;
    for inst in insts {
        match inst.op {
            Op::ByteRange { lo, hi } => set.set_range(lo, hi),
            Op::EmptyWidth { look } => {
                if look.contains(EmptyFlags::WORD_BOUNDARY)
                    || look.contains(EmptyFlags::NON_WORD_BOUNDARY)
                {
                    uses_word = true;
                }
                if look.contains(EmptyFlags::BEGIN_LINE)
                    || look.contains(EmptyFlags::END_LINE)
                {
                    uses_line = true;
                }
            }
            _ => {}
        }
    }
    if uses_word {
        set.set_range(b'0', b'9');
        set.set_range(b'A', b'Z');
        set.set_range(b'_', b'_');
        set.set_range(b'a', b'z');
    }
    if uses_line {
        set.set_range(b'\n', b'\n');
    }
    set.byte_classes()
}

/// Compute the set of bytes that can begin a match, if it is small enough
/// to be useful as a skip hint. Returns None when the set is empty, has
/// more than three members, or the pattern can match the empty string at
/// the search position (skipping would then jump over matches).
fn first_bytes(insts: &[Inst], start: u32) -> Option<Vec<u8>> {
    let mut bytes = BTreeSet::new();
    let mut seen = vec![false; insts.len()];
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        if seen[id as usize] {
            continue;
        }
        seen[id as usize] = true;
        let inst = &insts[id as usize];
        if !inst.last {
            stack.push(id + 1);
        }
        match inst.op {
            Op::ByteRange { lo, hi } => {
                for b in lo..=hi {
                    bytes.insert(b);
                    if bytes.len() > 3 {
                        return None;
                    }
                }
            }
            // Conservatively assume the assertion can hold.
            Op::EmptyWidth { .. }
            | Op::Nop
            | Op::Capture { .. }
            | Op::AltMatch => stack.push(inst.out),
            Op::Match { .. } => return None,
            Op::Fail => {}
        }
    }
    if bytes.is_empty() {
        None
    } else {
        Some(bytes.into_iter().collect())
    }
}
