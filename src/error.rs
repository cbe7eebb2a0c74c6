/// An error that occurs when building a program or a DFA.
///
/// When the `std` feature is enabled, this implements the `Error` trait.
#[derive(Clone, Debug)]
pub struct BuildError {
    kind: BuildErrorKind,
}

#[derive(Clone, Debug)]
enum BuildErrorKind {
    Syntax(regex_syntax::Error),
    Unsupported(&'static str),
    InsufficientMemory { given: usize, minimum: usize },
    TooManyInstructions { given: usize, limit: usize },
}

impl BuildError {
    fn kind(&self) -> &BuildErrorKind {
        &self.kind
    }

    pub(crate) fn syntax(err: regex_syntax::Error) -> BuildError {
        BuildError { kind: BuildErrorKind::Syntax(err) }
    }

    pub(crate) fn unsupported(msg: &'static str) -> BuildError {
        BuildError { kind: BuildErrorKind::Unsupported(msg) }
    }

    pub(crate) fn insufficient_memory(
        given: usize,
        minimum: usize,
    ) -> BuildError {
        BuildError {
            kind: BuildErrorKind::InsufficientMemory { given, minimum },
        }
    }

    pub(crate) fn too_many_instructions(
        given: usize,
        limit: usize,
    ) -> BuildError {
        BuildError {
            kind: BuildErrorKind::TooManyInstructions { given, limit },
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind() {
            BuildErrorKind::Syntax(ref err) => Some(err),
            _ => None,
        }
    }
}

impl core::fmt::Display for BuildError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self.kind() {
            BuildErrorKind::Syntax(_) => {
                write!(f, "error parsing regex")
            }
            BuildErrorKind::Unsupported(msg) => {
                write!(f, "unsupported regex feature: {}", msg)
            }
            BuildErrorKind::InsufficientMemory { given, minimum } => {
                write!(
                    f,
                    "memory budget of {} bytes is too small \
                     (need at least {} bytes)",
                    given, minimum,
                )
            }
            BuildErrorKind::TooManyInstructions { given, limit } => {
                write!(
                    f,
                    "compiled program has {} instructions, \
                     which exceeds the limit of {}",
                    given, limit,
                )
            }
        }
    }
}

/// An error that occurs during a search.
///
/// A search returns this error when it could not run to completion. The
/// only way that can happen for a DFA search is memory pressure: the state
/// cache overflowed its budget, was flushed, and overflowed again within
/// the same search. Callers should treat this as a signal to fall back to
/// an engine that does not give up, such as the backtracker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MatchError {
    /// The search gave up before reaching the end of its input.
    ///
    /// `offset` is the position at which the search stopped making
    /// progress. Positions at or before `offset` have been fully searched.
    GaveUp { offset: usize },
}

impl MatchError {
    pub(crate) fn gave_up(offset: usize) -> MatchError {
        MatchError::GaveUp { offset }
    }

    /// Returns the offset at which the search stopped.
    pub fn offset(&self) -> usize {
        match *self {
            MatchError::GaveUp { offset } => offset,
        }
    }
}

impl std::error::Error for MatchError {}

impl core::fmt::Display for MatchError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            MatchError::GaveUp { offset } => {
                write!(f, "gave up searching at offset {}", offset)
            }
        }
    }
}
