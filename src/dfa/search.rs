use std::sync::Arc;

use crate::{
    alphabet::Unit,
    dfa::{
        cache::RwLocker,
        dfa::{Dfa, Input},
        state::{State, StatePtr, StateSaver},
    },
    error::MatchError,
    prog::PatternID,
};

/// Dispatch to the specialization of the search loop selected by the three
/// orthogonal axes: prefix acceleration, earliest-match, and direction.
pub(crate) fn fast_search_loop(
    dfa: &Dfa,
    input: &Input<'_>,
    locker: &mut RwLocker<'_>,
    start: Arc<State>,
    can_accel: bool,
    run_forward: bool,
    matches: Option<&mut Vec<PatternID>>,
) -> Result<Option<usize>, MatchError> {
    match (can_accel, input.is_earliest(), run_forward) {
        (false, false, false) => {
            search_loop::<false, false, false>(dfa, input, locker, start, matches)
        }
        (false, false, true) => {
            search_loop::<false, false, true>(dfa, input, locker, start, matches)
        }
        (false, true, false) => {
            search_loop::<false, true, false>(dfa, input, locker, start, matches)
        }
        (false, true, true) => {
            search_loop::<false, true, true>(dfa, input, locker, start, matches)
        }
        (true, false, false) => {
            search_loop::<true, false, false>(dfa, input, locker, start, matches)
        }
        (true, false, true) => {
            search_loop::<true, false, true>(dfa, input, locker, start, matches)
        }
        (true, true, false) => {
            search_loop::<true, true, false>(dfa, input, locker, start, matches)
        }
        (true, true, true) => {
            search_loop::<true, true, true>(dfa, input, locker, start, matches)
        }
    }
}

/// The generic search loop, monomorphized into its eight specializations.
///
/// Walks the span one byte at a time, threading the current state and
/// recording the position of the most recent match. Matches surface one
/// input unit late (that is how look-ahead assertions get resolved), so
/// after the span is exhausted the loop feeds one final end-of-text unit.
///
/// A forward search returns the end offset of the match; a backward search
/// over a reversed program returns its start offset.
fn search_loop<const ACCEL: bool, const EARLIEST: bool, const FWD: bool>(
    dfa: &Dfa,
    input: &Input<'_>,
    locker: &mut RwLocker<'_>,
    mut start: Arc<State>,
    mut matches: Option<&mut Vec<PatternID>>,
) -> Result<Option<usize>, MatchError> {
    let hay = input.haystack();
    let bp = input.start();
    let ep = input.end();
    let mut p = if FWD { bp } else { ep };
    let mut s = Arc::clone(&start);
    let mut lastmatch: Option<usize> = None;

    if s.is_match() {
        lastmatch = Some(p);
        collect_matches(&mut matches, &s);
        if EARLIEST {
            return Ok(lastmatch);
        }
    }

    while if FWD { p < ep } else { p > bp } {
        if ACCEL && Arc::ptr_eq(&s, &start) {
            // In the start state, skip ahead to the next byte that could
            // begin a match.
            if FWD {
                match dfa.prog().prefix_accel(&hay[p..ep]) {
                    Some(i) => p += i,
                    None => {
                        p = ep;
                        break;
                    }
                }
            } else {
                match dfa.prog().prefix_accel_rev(&hay[bp..p]) {
                    Some(i) => p = bp + i + 1,
                    None => {
                        p = bp;
                        break;
                    }
                }
            }
        }
        let (byte, at) = if FWD {
            let b = hay[p];
            p += 1;
            (b, p - 1)
        } else {
            p -= 1;
            (hay[p], p)
        };
        match next_state(dfa, locker, &mut s, &mut start, Unit::u8(byte), at)?
        {
            StatePtr::Dead => return Ok(lastmatch),
            StatePtr::FullMatch => {
                return Ok(Some(if FWD { ep } else { bp }))
            }
            StatePtr::State(next) => {
                s = next;
                if s.is_match() {
                    // The match was noticed one byte late: it ended just
                    // before the byte we consumed.
                    lastmatch = Some(if FWD { p - 1 } else { p + 1 });
                    collect_matches(&mut matches, &s);
                    if EARLIEST {
                        return Ok(lastmatch);
                    }
                }
            }
        }
    }

    // Feed the end-of-text input to resolve matches pending at the span
    // boundary.
    let at = if FWD { ep } else { bp };
    let eot = dfa.prog().byte_classes().eot();
    match next_state(dfa, locker, &mut s, &mut start, eot, at)? {
        StatePtr::Dead => Ok(lastmatch),
        StatePtr::FullMatch => Ok(Some(at)),
        StatePtr::State(next) => {
            if next.is_match() {
                lastmatch = Some(at);
                collect_matches(&mut matches, &next);
            }
            Ok(lastmatch)
        }
    }
}

/// Fetch the successor of `s` on `unit`, computing and publishing it when
/// it is not yet known. On budget exhaustion this flushes the cache and
/// retries once; the second failure inside one search surfaces as
/// [`MatchError::GaveUp`].
///
/// A flush invalidates every state reference held by this search, which is
/// why `s` and `start` are passed by mutable reference: both are saved by
/// identity and re-interned into the fresh epoch before retrying.
fn next_state(
    dfa: &Dfa,
    locker: &mut RwLocker<'_>,
    s: &mut Arc<State>,
    start: &mut Arc<State>,
    unit: Unit,
    at: usize,
) -> Result<StatePtr, MatchError> {
    let class = dfa.prog().byte_classes().get_by_unit(unit);
    // The common case: another step (possibly by another thread) has
    // already published this transition.
    if let Some(next) = s.next_slot(class).get() {
        return Ok(next.upgrade());
    }
    if let Some(ns) = dfa.run_state_on_byte_unlocked(s, unit) {
        return Ok(ns);
    }

    // The cache is out of budget. Save the identities we need, flush, and
    // re-intern them in the fresh epoch.
    let save_s = StateSaver::from_state(s);
    let save_start = StateSaver::from_state(start);
    dfa.reset_cache(locker);
    match (dfa.restore(&save_s), dfa.restore(&save_start)) {
        (Some(ns), Some(nstart)) => {
            *s = ns;
            *start = nstart;
        }
        _ => return Err(MatchError::gave_up(at)),
    }
    dfa.run_state_on_byte_unlocked(s, unit)
        .ok_or(MatchError::gave_up(at))
}

fn collect_matches(
    matches: &mut Option<&mut Vec<PatternID>>,
    s: &State,
) {
    if let Some(ref mut out) = *matches {
        for pid in s.match_ids() {
            if !out.contains(&pid) {
                out.push(pid);
            }
        }
    }
}
