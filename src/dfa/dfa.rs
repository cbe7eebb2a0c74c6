use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::{
    alphabet::Unit,
    dfa::{
        cache::{
            CacheInner, RwLocker, MAX_START, START_AFTER_NON_WORD_CHAR,
            START_AFTER_WORD_CHAR, START_ANCHORED, START_BEGIN_LINE,
            START_BEGIN_TEXT,
        },
        search,
        state::{
            State, StateFlags, StateKey, StatePtr, StateSaver, MARK,
            MATCH_SEP,
        },
        workq::Workq,
    },
    error::{BuildError, MatchError},
    look::{is_word_byte, EmptyFlags},
    prog::{MatchKind, Op, PatternID, Prog},
};

/// The parameters of a single search.
///
/// The haystack is the full surrounding context: assertions like `^`, `\A`
/// and `\b` are evaluated against it. The span selects the text actually
/// searched, which must lie within the haystack.
#[derive(Clone, Debug)]
pub struct Input<'h> {
    haystack: &'h [u8],
    start: usize,
    end: usize,
    anchored: bool,
    earliest: bool,
}

impl<'h> Input<'h> {
    /// Create a new input that searches all of `haystack`, unanchored.
    #[inline]
    pub fn new(haystack: &'h [u8]) -> Input<'h> {
        Input {
            haystack,
            start: 0,
            end: haystack.len(),
            anchored: false,
            earliest: false,
        }
    }

    /// Restrict the search to the given range of the haystack. Bytes
    /// outside the range still participate in look-around evaluation at
    /// the range's entry boundary.
    #[inline]
    pub fn range(mut self, range: core::ops::Range<usize>) -> Input<'h> {
        assert!(
            range.start <= range.end && range.end <= self.haystack.len(),
            "range {}..{} is not valid for haystack of length {}",
            range.start,
            range.end,
            self.haystack.len(),
        );
        self.start = range.start;
        self.end = range.end;
        self
    }

    /// When enabled, the match must begin at the start of the span.
    #[inline]
    pub fn anchored(mut self, yes: bool) -> Input<'h> {
        self.anchored = yes;
        self
    }

    /// When enabled, the search returns as soon as any match is seen
    /// rather than extending it.
    #[inline]
    pub fn earliest(mut self, yes: bool) -> Input<'h> {
        self.earliest = yes;
        self
    }

    #[inline]
    pub fn haystack(&self) -> &'h [u8] {
        self.haystack
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    #[inline]
    pub fn is_earliest(&self) -> bool {
        self.earliest
    }
}

/// A lazy DFA for searching with a compiled program.
///
/// The DFA builds its transition table on demand during searches, interning
/// each distinct state it encounters under a fixed memory budget. When the
/// budget is exhausted the whole cache is flushed and rebuilt; a search
/// that exhausts the budget twice gives up with [`MatchError::GaveUp`] so
/// that the caller can escalate to a slower engine.
///
/// A single DFA may be shared across any number of threads. Searches hold
/// a reader lock on the cache for their whole duration; transition
/// computation takes a short critical section; cache flushes briefly take
/// the writer lock.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lazydfa::{Compiler, Dfa, Input, MatchKind};
///
/// let prog = Arc::new(Compiler::new().compile(r"a*b")?);
/// let dfa = Dfa::new(prog, MatchKind::FirstMatch, 1 << 20)?;
/// let end = dfa.search_fwd(&Input::new(b"xaaab"))?;
/// assert_eq!(end, Some(5));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Dfa {
    prog: Arc<Prog>,
    kind: MatchKind,
    /// The per-epoch budget for interned states: the construction budget
    /// minus the fixed scratch costs.
    mem_budget: usize,
    /// The cache epoch lock. Read-held for the duration of every search;
    /// write-held only while flushing. State references are only valid
    /// while this lock is held in one mode continuously.
    cache_mutex: RwLock<()>,
    /// The intern pool, scratch queues and budget. Acquired only while
    /// `cache_mutex` is held, and never held across an upgrade of it.
    inner: Mutex<CacheInner>,
}

impl Dfa {
    /// Create a new lazy DFA for the given program and match semantics,
    /// with a total memory budget of `max_mem` bytes for cached states and
    /// scratch space.
    ///
    /// This fails when the budget cannot even cover the fixed scratch
    /// allocations for the given program.
    pub fn new(
        prog: Arc<Prog>,
        kind: MatchKind,
        max_mem: usize,
    ) -> Result<Dfa, BuildError> {
        let ninst = prog.len();
        // Longest-match queues interleave priority marks with instruction
        // ids, so they need room for both.
        let maxmark =
            if kind == MatchKind::LongestMatch { ninst + 1 } else { 0 };
        let mut inner = CacheInner::new(ninst, maxmark, 0);
        let scratch = inner.scratch_memory_usage();
        if max_mem <= scratch {
            return Err(BuildError::insufficient_memory(
                max_mem,
                scratch + 1,
            ));
        }
        let mem_budget = max_mem - scratch;
        inner.state_budget = mem_budget;
        Ok(Dfa {
            prog,
            kind,
            mem_budget,
            cache_mutex: RwLock::new(()),
            inner: Mutex::new(inner),
        })
    }

    /// The program this DFA runs.
    #[inline]
    pub fn prog(&self) -> &Prog {
        &self.prog
    }

    /// The match semantics of this DFA.
    #[inline]
    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    /// Search the input forward, returning the end offset of the best
    /// match per this DFA's match semantics.
    pub fn search_fwd(
        &self,
        input: &Input<'_>,
    ) -> Result<Option<usize>, MatchError> {
        self.search_imp(input, true, None)
    }

    /// Search the input forward, additionally collecting the identifiers
    /// of every matching pattern into `matches`. Only meaningful for DFAs
    /// built with [`MatchKind::ManyMatch`].
    pub fn search_fwd_with_matches(
        &self,
        input: &Input<'_>,
        matches: &mut Vec<PatternID>,
    ) -> Result<Option<usize>, MatchError> {
        self.search_imp(input, true, Some(matches))
    }

    /// Search the input backward, returning the start offset of the best
    /// match. The program must have been compiled for reversed execution;
    /// the usual protocol is to run a forward DFA to find a match end and
    /// then a reversed DFA from that end to find the match start.
    pub fn search_rev(
        &self,
        input: &Input<'_>,
    ) -> Result<Option<usize>, MatchError> {
        debug_assert!(
            self.prog.reversed(),
            "reverse searches require a program compiled in reverse",
        );
        self.search_imp(input, false, None)
    }

    fn search_imp(
        &self,
        input: &Input<'_>,
        run_forward: bool,
        matches: Option<&mut Vec<PatternID>>,
    ) -> Result<Option<usize>, MatchError> {
        let mut locker = RwLocker::read(&self.cache_mutex);
        let (start, can_accel) =
            self.analyze_search(input, run_forward, &mut locker)?;
        match start {
            StatePtr::Dead => Ok(None),
            StatePtr::FullMatch => Ok(Some(if run_forward {
                input.end()
            } else {
                input.start()
            })),
            StatePtr::State(start) => search::fast_search_loop(
                self,
                input,
                &mut locker,
                start,
                can_accel,
                run_forward,
                matches,
            ),
        }
    }

    /// Determine the start state and acceleration eligibility for a
    /// search. The context kind is read off the byte adjacent to the
    /// search span's entry boundary.
    pub(crate) fn analyze_search(
        &self,
        input: &Input<'_>,
        run_forward: bool,
        locker: &mut RwLocker<'_>,
    ) -> Result<(StatePtr, bool), MatchError> {
        let hay = input.haystack();
        let (kind_idx, flag_bits) = if run_forward {
            let at = input.start();
            if at == 0 {
                (
                    START_BEGIN_TEXT,
                    EmptyFlags::BEGIN_TEXT
                        .union(EmptyFlags::BEGIN_LINE)
                        .as_repr() as u32,
                )
            } else if hay[at - 1] == b'\n' {
                (START_BEGIN_LINE, EmptyFlags::BEGIN_LINE.as_repr() as u32)
            } else if is_word_byte(hay[at - 1]) {
                (START_AFTER_WORD_CHAR, StateFlags::LAST_WORD)
            } else {
                (START_AFTER_NON_WORD_CHAR, 0)
            }
        } else {
            let at = input.end();
            if at == hay.len() {
                (
                    START_BEGIN_TEXT,
                    EmptyFlags::BEGIN_TEXT
                        .union(EmptyFlags::BEGIN_LINE)
                        .as_repr() as u32,
                )
            } else if hay[at] == b'\n' {
                (START_BEGIN_LINE, EmptyFlags::BEGIN_LINE.as_repr() as u32)
            } else if is_word_byte(hay[at]) {
                (START_AFTER_WORD_CHAR, StateFlags::LAST_WORD)
            } else {
                (START_AFTER_NON_WORD_CHAR, 0)
            }
        };
        let idx =
            kind_idx + if input.is_anchored() { START_ANCHORED } else { 0 };

        let ptr = match self.start_state(idx, input.is_anchored(), flag_bits)
        {
            Some(ptr) => ptr,
            None => {
                // Could not intern the start state within budget. Flush
                // and retry once.
                self.reset_cache(locker);
                match self.start_state(idx, input.is_anchored(), flag_bits)
                {
                    Some(ptr) => ptr,
                    None => {
                        debug!("failed to build start state after flush");
                        let at = if run_forward {
                            input.start()
                        } else {
                            input.end()
                        };
                        return Err(MatchError::gave_up(at));
                    }
                }
            }
        };

        // Acceleration requires an unanchored search, a byte-skip hint
        // from the program, and a start state with no pending empty-width
        // work (a skip would jump over the positions where those
        // assertions must be re-evaluated).
        let can_accel = !input.is_anchored()
            && self.prog.can_prefix_accel()
            && matches!(
                ptr,
                StatePtr::State(ref s) if s.flags().need_flags().is_empty()
            );
        Ok((ptr, can_accel))
    }

    /// Fetch or lazily build the start state with the given table index.
    /// Returns None when the state cannot be interned within budget.
    fn start_state(
        &self,
        idx: usize,
        anchored: bool,
        flag_bits: u32,
    ) -> Option<StatePtr> {
        debug_assert!(idx < MAX_START);
        let mut inner = self.lock_inner();
        if let Some(ref ptr) = inner.starts[idx] {
            return Some(ptr.clone());
        }
        let CacheInner {
            ref mut starts,
            ref mut q0,
            ref mut stack,
            ref mut states,
            ref mut state_budget,
            ..
        } = *inner;
        q0.clear();
        let entry = if anchored {
            self.prog.start()
        } else {
            self.prog.start_unanchored()
        };
        let empty = EmptyFlags::from_repr((flag_bits & 0xFF) as u8);
        add_to_queue(&self.prog, q0, stack, entry, empty);
        let ptr = self.workq_to_cached_state(
            states,
            state_budget,
            q0,
            None,
            flag_bits,
        )?;
        trace!("built start state {} -> {:?}", idx, ptr);
        starts[idx] = Some(ptr.clone());
        Some(ptr)
    }

    /// Flush the state cache. Upgrades the epoch lock to write mode (where
    /// it stays), so every state reference obtained before this call is
    /// invalid after it.
    pub(crate) fn reset_cache(&self, locker: &mut RwLocker<'_>) {
        locker.lock_for_writing();
        let mut inner = self.lock_inner();
        inner.reset(self.mem_budget);
    }

    /// Re-intern a saved state identity after a flush, returning its fresh
    /// pointer. Returns None when even the restored state cannot be
    /// interned within budget.
    pub(crate) fn restore(&self, saved: &StateSaver) -> Option<Arc<State>> {
        let mut inner = self.lock_inner();
        let CacheInner { ref mut states, ref mut state_budget, .. } =
            *inner;
        self.cached_state(states, state_budget, &saved.insts, saved.flags)
    }

    /// Compute (or fetch) the successor of `s` on input `c`, publishing
    /// the result in the state's transition slot. Returns None when the
    /// successor cannot be interned within budget, in which case the
    /// caller should flush the cache and retry.
    pub(crate) fn run_state_on_byte_unlocked(
        &self,
        s: &Arc<State>,
        c: Unit,
    ) -> Option<StatePtr> {
        let mut inner = self.lock_inner();
        self.run_state_on_byte(&mut inner, s, c)
    }

    pub(crate) fn run_state_on_byte(
        &self,
        inner: &mut CacheInner,
        s: &Arc<State>,
        c: Unit,
    ) -> Option<StatePtr> {
        let class = self.prog.byte_classes().get_by_unit(c);
        // Re-check the slot now that the mutex is held: another thread may
        // have published this transition while we were waiting.
        if let Some(next) = s.next_slot(class).get() {
            return Some(next.upgrade());
        }

        let CacheInner {
            ref mut q0,
            ref mut q1,
            ref mut stack,
            ref mut states,
            ref mut state_budget,
            ..
        } = *inner;
        state_to_workq(&self.prog, s, q0, stack);

        // Flags around this input. Before the byte we have the assertions
        // recorded in the state; after it, only begin-line can hold. The
        // word boundary between the previous byte and this one is derived
        // from the state's last-word bit.
        let sflags = s.flags();
        let need = sflags.need_flags();
        let old_before = sflags.empty_flags();
        let mut before = old_before;
        let mut after = EmptyFlags::empty();
        if c.is_byte(b'\n') {
            before.insert(EmptyFlags::END_LINE);
            after.insert(EmptyFlags::BEGIN_LINE);
        }
        if c.is_eot() {
            before.insert(EmptyFlags::END_TEXT);
            before.insert(EmptyFlags::END_LINE);
        }
        let is_word = c.is_word_byte();
        if is_word == sflags.is_last_word() {
            before.insert(EmptyFlags::NON_WORD_BOUNDARY);
        } else {
            before.insert(EmptyFlags::WORD_BOUNDARY);
        }

        // Only worth re-running the epsilon closure when a newly true
        // assertion is one some pending instruction is waiting for.
        if !before.difference(old_before).intersect(need).is_empty() {
            run_workq_on_empty_string(&self.prog, q0, q1, stack, before);
            core::mem::swap(q0, q1);
        }

        let mut ismatch = false;
        run_workq_on_byte(
            &self.prog,
            self.kind,
            q0,
            q1,
            stack,
            c,
            after,
            &mut ismatch,
        );
        core::mem::swap(q0, q1);
        // q0 is now the successor queue; q1 holds the queue that was live
        // at the match point, which is where matched pattern ids live.

        let flag_bits =
            StateFlags::pack(after, ismatch, is_word, EmptyFlags::empty())
                .bits();
        let mq = if ismatch && self.kind == MatchKind::ManyMatch {
            Some(&*q1)
        } else {
            None
        };
        let ns = self.workq_to_cached_state(
            states,
            state_budget,
            q0,
            mq,
            flag_bits,
        )?;

        // Publish with release semantics. We hold the mutex, so this slot
        // is still unset and there is exactly one publisher per epoch.
        let _ = s.next_slot(class).set(ns.downgrade());
        Some(ns)
    }

    /// Transform a work queue into a canonical interned state. Returns
    /// None when the budget does not permit interning a new state.
    pub(crate) fn workq_to_cached_state(
        &self,
        states: &mut HashMap<StateKey, Arc<State>>,
        state_budget: &mut usize,
        q: &Workq,
        mq: Option<&Workq>,
        flag_bits: u32,
    ) -> Option<StatePtr> {
        // Walk the queue, keeping only instructions that carry information
        // across a byte: byte ranges, pending empty-width assertions and
        // matches. Under first-match semantics, everything after a
        // guaranteed match is dead weight; under longest-match, cohorts
        // after a matching cohort are.
        let mut insts: Vec<u32> = Vec::with_capacity(q.len());
        let mut need = EmptyFlags::empty();
        let mut sawmatch = false;
        let mut sawalt = false;
        for id in q.iter() {
            if sawmatch
                && (self.kind == MatchKind::FirstMatch || q.is_mark(id))
            {
                break;
            }
            if q.is_mark(id) {
                if !insts.is_empty() && *insts.last().unwrap() != MARK {
                    insts.push(MARK);
                }
                continue;
            }
            let inst = self.prog.inst(id);
            match inst.op {
                Op::ByteRange { .. } => insts.push(id),
                Op::EmptyWidth { look } => {
                    insts.push(id);
                    need.insert(look);
                }
                Op::Match { .. } => {
                    insts.push(id);
                    if !self.prog.anchor_end() {
                        sawmatch = true;
                    }
                }
                Op::AltMatch => sawalt = true,
                // Nop, Capture and Fail carry nothing across a byte; the
                // closure re-creates them from the kept instructions.
                Op::Nop | Op::Capture { .. } | Op::Fail => {}
            }
        }
        while insts.last() == Some(&MARK) {
            insts.pop();
        }

        // An alternation between a match and an any-byte loop stays a
        // matching state for the rest of the text, so the whole queue
        // collapses to the full-match sentinel. Many-match must keep
        // running to collect ids.
        if sawalt && self.kind != MatchKind::ManyMatch {
            return Some(StatePtr::FullMatch);
        }

        let mut flags = flag_bits;
        if need.is_empty() {
            // No pending empty-width work: the entry assertions and the
            // last-word bit can never be consulted again, so clearing them
            // lets more states unify.
            flags &= StateFlags::MATCH;
        } else {
            flags |= (need.as_repr() as u32) << 16;
        }

        let nreal = insts.iter().filter(|&&id| id != MARK).count();
        if nreal == 0 && flags == 0 {
            return Some(StatePtr::Dead);
        }

        // Priority order within a longest-match cohort is irrelevant, and
        // under many-match there is no priority at all. Sorting
        // canonicalizes, which keeps the number of distinct states down.
        match self.kind {
            MatchKind::FirstMatch => {}
            MatchKind::LongestMatch => {
                let mut i = 0;
                while i < insts.len() {
                    let mut j = i;
                    while j < insts.len() && insts[j] != MARK {
                        j += 1;
                    }
                    insts[i..j].sort_unstable();
                    i = j + 1;
                }
            }
            MatchKind::ManyMatch => insts.sort_unstable(),
        }

        if let Some(mq) = mq {
            insts.push(MATCH_SEP);
            let mut ids: Vec<u32> = mq
                .iter()
                .filter(|&id| !mq.is_mark(id))
                .filter_map(|id| match self.prog.inst(id).op {
                    Op::Match { pattern } => Some(pattern.0),
                    _ => None,
                })
                .collect();
            ids.sort_unstable();
            ids.dedup();
            insts.extend(ids);
        }

        self.cached_state(
            states,
            state_budget,
            &insts,
            StateFlags::from_bits(flags),
        )
        .map(StatePtr::State)
    }

    /// Look up or intern the state with the given identity. Returns None
    /// when a new state would overflow the budget.
    pub(crate) fn cached_state(
        &self,
        states: &mut HashMap<StateKey, Arc<State>>,
        state_budget: &mut usize,
        insts: &[u32],
        flags: StateFlags,
    ) -> Option<Arc<State>> {
        let key =
            StateKey { flags: flags.bits(), insts: Arc::from(insts) };
        if let Some(s) = states.get(&key) {
            return Some(Arc::clone(s));
        }
        let alphabet_len = self.prog.byte_classes().alphabet_len();
        let state =
            State::new(flags, Arc::clone(&key.insts), alphabet_len);
        let mem = state.memory_usage();
        if *state_budget < mem {
            trace!(
                "out of state budget: need {} bytes, {} remaining",
                mem,
                state_budget,
            );
            return None;
        }
        *state_budget -= mem;
        let s = Arc::new(state);
        states.insert(key, Arc::clone(&s));
        Some(s)
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Eagerly build every state reachable from the unanchored begin-text
    /// start state, invoking the callback once per state with its
    /// transition row and match status. Row entries are `0` for the dead
    /// state, `1` for the full-match state, and `i + 2` for the `i`th
    /// discovered state. Returns the number of states built.
    ///
    /// This is intended for tests and diagnostics. It ignores nothing: a
    /// program whose DFA exceeds the memory budget makes this fail with
    /// [`MatchError::GaveUp`].
    pub fn build_all_states<F: FnMut(&[usize], bool)>(
        &self,
        mut cb: F,
    ) -> Result<usize, MatchError> {
        let mut locker = RwLocker::read(&self.cache_mutex);
        let (start, _) =
            self.analyze_search(&Input::new(b""), true, &mut locker)?;
        let start = match start {
            StatePtr::State(s) => s,
            StatePtr::Dead | StatePtr::FullMatch => return Ok(0),
        };

        let units: Vec<Unit> = self
            .prog
            .byte_classes()
            .representatives()
            .map(Unit::u8)
            .chain(std::iter::once(self.prog.byte_classes().eot()))
            .collect();

        let mut inner = self.lock_inner();
        let mut index: HashMap<*const State, usize> = HashMap::new();
        index.insert(Arc::as_ptr(&start), 2);
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(Arc::clone(&start));
        let mut rows: Vec<(Vec<usize>, bool)> = vec![];
        while let Some(s) = queue.pop_front() {
            let mut row = Vec::with_capacity(units.len());
            for &unit in &units {
                let ns = self
                    .run_state_on_byte(&mut inner, &s, unit)
                    .ok_or(MatchError::gave_up(0))?;
                let id = match ns {
                    StatePtr::Dead => 0,
                    StatePtr::FullMatch => 1,
                    StatePtr::State(ns) => {
                        let next_id = index.len() + 2;
                        *index.entry(Arc::as_ptr(&ns)).or_insert_with(
                            || {
                                queue.push_back(Arc::clone(&ns));
                                next_id
                            },
                        )
                    }
                };
                row.push(id);
            }
            rows.push((row, s.is_match()));
        }
        for (row, is_match) in &rows {
            cb(row, *is_match);
        }
        Ok(rows.len())
    }

    /// Compute lexicographic bounds on the set of byte strings this
    /// program can match, truncated to `maxlen` bytes. Returns
    /// `Ok(Some((min, max)))` on success, and `Ok(None)` when the range is
    /// unbounded above.
    pub fn possible_match_range(
        &self,
        maxlen: usize,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, MatchError> {
        let mut locker = RwLocker::read(&self.cache_mutex);
        let (start, _) = self.analyze_search(
            &Input::new(b"").anchored(true),
            true,
            &mut locker,
        )?;
        let start = match start {
            StatePtr::Dead => return Ok(Some((vec![], vec![]))),
            StatePtr::FullMatch => return Ok(None),
            StatePtr::State(s) => s,
        };

        // Per-class representative bytes: the smallest and largest byte of
        // each class, in byte order.
        let classes = self.prog.byte_classes();
        let reps: Vec<u8> = classes.representatives().collect();
        let los = reps.clone();
        let his: Vec<u8> = reps
            .iter()
            .skip(1)
            .map(|&r| r - 1)
            .chain(std::iter::once(0xFF))
            .collect();

        let mut inner = self.lock_inner();

        // Smallest path: greedily take the smallest live byte, stopping
        // as soon as the accumulated prefix is itself accepted.
        let mut min = vec![];
        let mut s = Arc::clone(&start);
        let mut seen: HashMap<*const State, usize> = HashMap::new();
        'min: for _ in 0..maxlen {
            let visits = seen.entry(Arc::as_ptr(&s)).or_insert(0);
            if *visits > 0 {
                break;
            }
            *visits += 1;
            let eot = self
                .run_state_on_byte(&mut inner, &s, classes.eot())
                .ok_or(MatchError::gave_up(0))?;
            match eot {
                StatePtr::FullMatch => break,
                StatePtr::State(ref e) if e.is_match() => break,
                _ => {}
            }
            for &b in &los {
                match self
                    .run_state_on_byte(&mut inner, &s, Unit::u8(b))
                    .ok_or(MatchError::gave_up(0))?
                {
                    StatePtr::FullMatch => {
                        min.push(b);
                        break 'min;
                    }
                    StatePtr::State(ns) if ns.has_insts() => {
                        min.push(b);
                        s = ns;
                        continue 'min;
                    }
                    _ => continue,
                }
            }
            // No live byte: dead end.
            break;
        }

        // Largest path: greedily take the largest live byte. If the walk
        // is cut short (length cap, cycle, or reaching the full-match
        // sentinel), the result is a proper prefix of larger strings and
        // must be bumped to its prefix-successor.
        let mut max = vec![];
        let mut s = Arc::clone(&start);
        let mut seen: HashMap<*const State, usize> = HashMap::new();
        let mut exact = false;
        'max: loop {
            if max.len() >= maxlen {
                break;
            }
            let visits = seen.entry(Arc::as_ptr(&s)).or_insert(0);
            if *visits > 0 {
                break;
            }
            *visits += 1;
            for &b in his.iter().rev() {
                match self
                    .run_state_on_byte(&mut inner, &s, Unit::u8(b))
                    .ok_or(MatchError::gave_up(0))?
                {
                    StatePtr::FullMatch => {
                        max.push(b);
                        break 'max;
                    }
                    StatePtr::State(ns) if ns.has_insts() => {
                        max.push(b);
                        s = ns;
                        continue 'max;
                    }
                    _ => continue,
                }
            }
            // Dead end: nothing extends this string, so it bounds the
            // language from above exactly.
            exact = true;
            break;
        }
        if !exact {
            while max.last() == Some(&0xFF) {
                max.pop();
            }
            match max.last_mut() {
                None => return Ok(None),
                Some(last) => *last += 1,
            }
        }
        Ok(Some((min, max)))
    }
}

impl core::fmt::Debug for Dfa {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Dfa")
            .field("kind", &self.kind)
            .field("insts", &self.prog.len())
            .field("mem_budget", &self.mem_budget)
            .finish()
    }
}

/// Add the instruction to the queue, following empty-width arrows
/// according to `flag`. The pre-allocated stack makes the closure
/// iterative; the queue's sparse set ensures each instruction enters at
/// most once.
///
/// Lower-priority alternatives (`id + 1` of a non-last instruction) are
/// pushed behind the instruction's own continuation, preserving the
/// left-biased preference order.
pub(crate) fn add_to_queue(
    prog: &Prog,
    q: &mut Workq,
    stack: &mut Vec<u32>,
    id0: u32,
    flag: EmptyFlags,
) {
    stack.clear();
    stack.push(id0);
    while let Some(mut id) = stack.pop() {
        loop {
            if !q.insert(id) {
                break;
            }
            let inst = prog.inst(id);
            if !inst.last {
                stack.push(id + 1);
            }
            match inst.op {
                Op::Fail | Op::ByteRange { .. } | Op::Match { .. } => break,
                Op::Nop | Op::Capture { .. } | Op::AltMatch => {
                    id = inst.out;
                }
                Op::EmptyWidth { look } => {
                    if !flag.contains(look) {
                        break;
                    }
                    id = inst.out;
                }
            }
        }
    }
}

/// Convert a state back into a work queue: the inverse of
/// `workq_to_cached_state`, up to canonicalization. The state's entry
/// assertions drive the closure.
pub(crate) fn state_to_workq(
    prog: &Prog,
    s: &State,
    q: &mut Workq,
    stack: &mut Vec<u32>,
) {
    q.clear();
    let empty = s.flags().empty_flags();
    for &id in s.insts() {
        if id == MARK {
            q.mark();
        } else if id == MATCH_SEP {
            break;
        } else {
            add_to_queue(prog, q, stack, id, empty);
        }
    }
}

/// Re-run the epsilon closure of a queue under a new set of assertions,
/// producing the result in `nq`.
pub(crate) fn run_workq_on_empty_string(
    prog: &Prog,
    q: &Workq,
    nq: &mut Workq,
    stack: &mut Vec<u32>,
    flag: EmptyFlags,
) {
    nq.clear();
    for id in q.iter() {
        if q.is_mark(id) {
            nq.mark();
        } else {
            add_to_queue(prog, nq, stack, id, flag);
        }
    }
}

/// Run a queue over one input unit, producing the successor queue in `nq`
/// and reporting whether a match instruction was live in `q`.
///
/// Under longest-match, a mark reached after a match cuts the queue: all
/// later cohorts started to the right of an already-matched position and
/// can never produce a leftmost match. The unanchored prefix loop spawns
/// each new cohort behind a fresh mark for the same reason.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_workq_on_byte(
    prog: &Prog,
    kind: MatchKind,
    q: &Workq,
    nq: &mut Workq,
    stack: &mut Vec<u32>,
    c: Unit,
    flag: EmptyFlags,
    ismatch: &mut bool,
) {
    nq.clear();
    for id in q.iter() {
        if q.is_mark(id) {
            if *ismatch {
                return;
            }
            nq.mark();
            continue;
        }
        let inst = prog.inst(id);
        match inst.op {
            // Followed during the closure, not on byte consumption.
            Op::Fail
            | Op::Capture { .. }
            | Op::Nop
            | Op::EmptyWidth { .. }
            | Op::AltMatch => {}
            Op::ByteRange { .. } => {
                let matched =
                    c.as_u8().map_or(false, |b| inst.matches_byte(b));
                if matched {
                    if kind == MatchKind::LongestMatch
                        && Some(id) == prog.unanchored_loop
                    {
                        if *ismatch {
                            return;
                        }
                        nq.mark();
                    }
                    add_to_queue(prog, nq, stack, inst.out, flag);
                }
            }
            Op::Match { .. } => {
                if prog.anchor_end()
                    && !c.is_eot()
                    && kind != MatchKind::ManyMatch
                {
                    continue;
                }
                *ismatch = true;
                if kind == MatchKind::FirstMatch {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Compiler;

    fn dfa(pattern: &str, kind: MatchKind) -> Dfa {
        let prog = Arc::new(Compiler::new().compile(pattern).unwrap());
        Dfa::new(prog, kind, 1 << 20).unwrap()
    }

    #[test]
    fn start_states_are_interned_once() {
        let dfa = dfa("abc", MatchKind::FirstMatch);
        let mut l1 = RwLocker::read(&dfa.cache_mutex);
        let input = Input::new(b"abc");
        let (s1, _) = dfa.analyze_search(&input, true, &mut l1).unwrap();
        let (s2, _) = dfa.analyze_search(&input, true, &mut l1).unwrap();
        match (s1, s2) {
            (StatePtr::State(a), StatePtr::State(b)) => {
                assert!(Arc::ptr_eq(&a, &b));
            }
            _ => panic!("expected interned start states"),
        }
    }

    #[test]
    fn state_round_trips_through_workq() {
        let dfa = dfa("(foo|foobar)", MatchKind::LongestMatch);
        let mut inner = dfa.lock_inner();
        let CacheInner {
            ref mut q0,
            ref mut q1,
            ref mut stack,
            ref mut states,
            ref mut state_budget,
            ..
        } = *inner;

        q0.clear();
        let flags = EmptyFlags::BEGIN_TEXT.union(EmptyFlags::BEGIN_LINE);
        add_to_queue(&dfa.prog, q0, stack, dfa.prog.start(), flags);
        let s1 = dfa
            .workq_to_cached_state(
                states,
                state_budget,
                q0,
                None,
                flags.as_repr() as u32,
            )
            .unwrap();
        let s1 = match s1 {
            StatePtr::State(s) => s,
            _ => panic!("expected a real start state"),
        };

        // Reconstitute and re-intern: must land on the same allocation.
        state_to_workq(&dfa.prog, &s1, q1, stack);
        let s2 = dfa
            .workq_to_cached_state(
                states,
                state_budget,
                q1,
                None,
                s1.flags().bits() & 0x3FF,
            )
            .unwrap();
        match s2 {
            StatePtr::State(s2) => assert!(Arc::ptr_eq(&s1, &s2)),
            _ => panic!("expected a real state"),
        }
    }

    #[test]
    fn impossible_byte_leads_to_dead() {
        let dfa = dfa("abc", MatchKind::FirstMatch);
        let _locker = RwLocker::read(&dfa.cache_mutex);
        let mut inner = dfa.lock_inner();
        let start = {
            let CacheInner {
                ref mut q0,
                ref mut stack,
                ref mut states,
                ref mut state_budget,
                ..
            } = *inner;
            q0.clear();
            add_to_queue(
                &dfa.prog,
                q0,
                stack,
                dfa.prog.start(),
                EmptyFlags::BEGIN_TEXT,
            );
            match dfa
                .workq_to_cached_state(states, state_budget, q0, None, 0)
                .unwrap()
            {
                StatePtr::State(s) => s,
                _ => panic!("expected a real state"),
            }
        };
        // An anchored "abc" state dies on a byte that matches nothing.
        let ns = dfa
            .run_state_on_byte(&mut inner, &start, Unit::u8(b'z'))
            .unwrap();
        assert!(matches!(ns, StatePtr::Dead));
    }

    #[test]
    fn transitions_are_published_once() {
        let dfa = dfa("ab", MatchKind::FirstMatch);
        let _locker = RwLocker::read(&dfa.cache_mutex);
        let mut inner = dfa.lock_inner();
        let start = {
            let CacheInner {
                ref mut q0,
                ref mut stack,
                ref mut states,
                ref mut state_budget,
                ..
            } = *inner;
            q0.clear();
            add_to_queue(
                &dfa.prog,
                q0,
                stack,
                dfa.prog.start(),
                EmptyFlags::BEGIN_TEXT,
            );
            match dfa
                .workq_to_cached_state(states, state_budget, q0, None, 0)
                .unwrap()
            {
                StatePtr::State(s) => s,
                _ => panic!("expected a real state"),
            }
        };
        let n1 = dfa
            .run_state_on_byte(&mut inner, &start, Unit::u8(b'a'))
            .unwrap();
        let n2 = dfa
            .run_state_on_byte(&mut inner, &start, Unit::u8(b'a'))
            .unwrap();
        match (n1, n2) {
            (StatePtr::State(a), StatePtr::State(b)) => {
                assert!(Arc::ptr_eq(&a, &b));
            }
            _ => panic!("expected interned successors"),
        }
    }

    #[test]
    fn tiny_budget_fails_to_intern() {
        let prog = Arc::new(Compiler::new().compile("abc").unwrap());
        // Enough for scratch, far too little for any state.
        let scratch =
            CacheInner::new(prog.len(), 0, 0).scratch_memory_usage();
        let dfa =
            Dfa::new(prog, MatchKind::FirstMatch, scratch + 8).unwrap();
        let mut inner = dfa.lock_inner();
        let CacheInner {
            ref mut q0,
            ref mut stack,
            ref mut states,
            ref mut state_budget,
            ..
        } = *inner;
        q0.clear();
        add_to_queue(
            &dfa.prog,
            q0,
            stack,
            dfa.prog.start(),
            EmptyFlags::BEGIN_TEXT,
        );
        assert!(dfa
            .workq_to_cached_state(states, state_budget, q0, None, 0)
            .is_none());
    }

    #[test]
    fn construction_rejects_budget_below_scratch() {
        let prog = Arc::new(Compiler::new().compile("abc").unwrap());
        assert!(Dfa::new(prog, MatchKind::FirstMatch, 16).is_err());
    }
}
