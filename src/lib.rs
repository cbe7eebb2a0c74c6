/*!
A lazy, cache-bounded DFA regex engine.

This crate provides a DFA that executes regular-expression searches in
linear time and constant work per byte by building its states on demand:
each distinct combination of live program instructions becomes one interned
DFA state, and each transition is computed at most once per cache epoch.
The cache lives under a fixed memory budget; exhausting it flushes the
cache, and exhausting it twice within one search makes the search give up
so that callers can escalate to a more expressive engine. A memoized
backtracker is included as the reference implementation for tests and for
full capture semantics.

The DFA reports only match end points (or start points, when running a
reversed program backward). It never reports capture groups.

# Example

Find the end and then the start of a leftmost-first match:

```
use std::sync::Arc;
use lazydfa::{Compiler, Dfa, Input, MatchKind};

let fwd = Arc::new(Compiler::new().compile(r"[a-z]+ng")?);
let rev = Arc::new(Compiler::new().reversed(true).compile(r"[a-z]+ng")?);
let find_end = Dfa::new(fwd, MatchKind::FirstMatch, 1 << 20)?;
let find_start = Dfa::new(rev, MatchKind::LongestMatch, 1 << 20)?;

let hay = b"let us go searching";
let end = find_end.search_fwd(&Input::new(hay))?.unwrap();
let start = find_start
    .search_rev(&Input::new(hay).range(0..end))?
    .unwrap();
assert_eq!(&hay[start..end], b"searching");
# Ok::<(), Box<dyn std::error::Error>>(())
```

# Sharing across threads

A [`Dfa`] is immutable from the caller's point of view and may be shared
freely across threads; concurrent searches cooperate on filling in the
transition table. See the module docs of [`mod@dfa`] for the locking
contract.
*/

#[macro_use]
mod macros;

pub use crate::{
    backtrack::Backtracker,
    compile::Compiler,
    dfa::{Dfa, Input},
    error::{BuildError, MatchError},
    look::EmptyFlags,
    prog::{Inst, MatchKind, Op, PatternID, Prog},
};

pub mod alphabet;
mod backtrack;
mod compile;
pub mod dfa;
mod error;
mod look;
mod prog;
mod sparse_set;
