/*!
The lazy DFA.

This module is the home of [`Dfa`], a DFA that builds itself during
searches. States are computed by on-the-fly subset construction from the
program's instruction sets and memoized in a concurrent, budget-bounded
cache. When the budget runs out, the cache is flushed wholesale and the
search retries; a second failure within one search gives up so the caller
can escalate to a slower engine.
*/

pub use self::dfa::{Dfa, Input};

mod cache;
#[allow(clippy::module_inception)]
mod dfa;
mod search;
mod state;
mod workq;
