//! Cross-checks the DFA against the backtracker, which serves as the
//! behavioral oracle: same program, same haystack, same semantics, same
//! match end point.

use lazydfa::{Backtracker, Input, MatchKind};

use crate::forward;

const PATTERNS: &[&str] = &[
    "a",
    "a*b",
    "a|ab",
    "a|bb",
    "(foo|foobar)",
    "(a|ab)(c|bcd)",
    "[a-z]+",
    "(abc)+",
    "a{2,4}",
    "x?y",
    "a*",
    r"\bword\b",
    r"\Bab",
    "^ab",
    "ab$",
    "(?m)^bar",
    "(?m)foo$",
    "",
];

const HAYSTACKS: &[&str] = &[
    "",
    "a",
    "b",
    "ab",
    "abb",
    "aab",
    "aaab",
    "abcd",
    "aaaaa",
    "foobar",
    "xfoobarx",
    "foofoobar",
    " word ",
    "xword ",
    "word",
    "sword fish",
    "abc abcabc",
    "xy",
    "xxy",
    "yy",
    "foo\nbar",
    "bar\nfoo",
    "ab\nab",
    "zzzzab",
];

#[test]
fn dfa_agrees_with_backtracker_unanchored() {
    for &pattern in PATTERNS {
        for kind in [MatchKind::FirstMatch, MatchKind::LongestMatch] {
            let dfa = forward(pattern, kind);
            let bt = Backtracker::new(dfa.prog());
            let longest = kind == MatchKind::LongestMatch;
            for &hay in HAYSTACKS {
                let hay = hay.as_bytes();
                let got =
                    dfa.search_fwd(&Input::new(hay)).unwrap();
                let want = bt
                    .search(hay, 0..hay.len(), false, longest)
                    .map(|(_, end)| end);
                assert_eq!(
                    got, want,
                    "pattern {:?} on {:?} with {:?}",
                    pattern,
                    std::str::from_utf8(hay).unwrap(),
                    kind,
                );
            }
        }
    }
}

#[test]
fn dfa_agrees_with_backtracker_anchored() {
    for &pattern in PATTERNS {
        for kind in [MatchKind::FirstMatch, MatchKind::LongestMatch] {
            let dfa = forward(pattern, kind);
            let bt = Backtracker::new(dfa.prog());
            let longest = kind == MatchKind::LongestMatch;
            for &hay in HAYSTACKS {
                let hay = hay.as_bytes();
                let got = dfa
                    .search_fwd(&Input::new(hay).anchored(true))
                    .unwrap();
                let want = bt
                    .search(hay, 0..hay.len(), true, longest)
                    .map(|(_, end)| end);
                assert_eq!(
                    got, want,
                    "anchored pattern {:?} on {:?} with {:?}",
                    pattern,
                    std::str::from_utf8(hay).unwrap(),
                    kind,
                );
            }
        }
    }
}

#[test]
fn dfa_agrees_with_backtracker_on_subspans() {
    // Sub-spans exercise the context-sensitive start states: the bytes
    // before (and after) the span shape the entry assertions.
    let cases: &[(&str, &str)] = &[
        (r"\bword\b", " word "),
        (r"\bword\b", "xword "),
        (r"\bword\b", "wordy "),
        ("a+", "aaaa"),
        ("^a", "ba"),
        ("(?m)^b", "a\nb"),
    ];
    for &(pattern, hay) in cases {
        let hay = hay.as_bytes();
        for kind in [MatchKind::FirstMatch, MatchKind::LongestMatch] {
            let dfa = forward(pattern, kind);
            let bt = Backtracker::new(dfa.prog());
            let longest = kind == MatchKind::LongestMatch;
            for start in 0..=hay.len() {
                for end in start..=hay.len() {
                    let input = Input::new(hay).range(start..end);
                    let got = dfa.search_fwd(&input).unwrap();
                    // The engines agree on the entry boundary's context;
                    // at the exit boundary both must see end-of-text, so
                    // the oracle gets the haystack clamped at the span
                    // end.
                    let want = bt
                        .search(&hay[..end], start..end, false, longest)
                        .map(|(_, e)| e);
                    assert_eq!(
                        got, want,
                        "pattern {:?} on {:?}[{}..{}] with {:?}",
                        pattern,
                        std::str::from_utf8(hay).unwrap(),
                        start,
                        end,
                        kind,
                    );
                }
            }
        }
    }
}

#[test]
fn reverse_dfa_finds_the_match_start() {
    // Protocol test: forward DFA finds the end, reverse DFA finds the
    // start, and the backtracker agrees on the whole span.
    let cases: &[(&str, &str)] = &[
        ("a*b", "aaab"),
        ("a*b", "xxaab"),
        ("(foo|foobar)", "..foobar.."),
        ("[a-z]+", "12abc34"),
        ("(abc)+", "zabcabcz"),
    ];
    for &(pattern, hay) in cases {
        let hay = hay.as_bytes();
        let fwd = forward(pattern, MatchKind::FirstMatch);
        let rev = crate::reverse(pattern, MatchKind::LongestMatch);
        let bt = Backtracker::new(fwd.prog());

        let end = fwd.search_fwd(&Input::new(hay)).unwrap();
        let want = bt.search(hay, 0..hay.len(), false, false);
        assert_eq!(end, want.map(|(_, e)| e), "pattern {:?}", pattern);
        if let Some(end) = end {
            let start = rev
                .search_rev(&Input::new(hay).range(0..end))
                .unwrap();
            assert_eq!(
                start,
                want.map(|(s, _)| s),
                "pattern {:?} start",
                pattern,
            );
        }
    }
}
