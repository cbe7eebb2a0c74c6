use std::sync::Arc;

use lazydfa::{Compiler, Dfa, Input, MatchKind, PatternID};

use crate::{compile, forward, reverse};

#[test]
fn find_end_then_start() {
    let fwd = forward("a*b", MatchKind::FirstMatch);
    let end = fwd.search_fwd(&Input::new(b"aaab")).unwrap();
    assert_eq!(end, Some(4));

    // Running the reversed program backward from the end point yields the
    // leftmost begin point.
    let rev = reverse("a*b", MatchKind::LongestMatch);
    let start = rev.search_rev(&Input::new(b"aaab").range(0..4)).unwrap();
    assert_eq!(start, Some(0));
}

#[test]
fn longest_vs_first() {
    let hay = b"foobar";
    let longest = forward("(foo|foobar)", MatchKind::LongestMatch);
    assert_eq!(longest.search_fwd(&Input::new(hay)).unwrap(), Some(6));

    let first = forward("(foo|foobar)", MatchKind::FirstMatch);
    assert_eq!(first.search_fwd(&Input::new(hay)).unwrap(), Some(3));
}

#[test]
fn word_boundaries_read_the_context() {
    let dfa = forward(r"\bword\b", MatchKind::FirstMatch);

    // The span is "word"; the surrounding bytes come from the haystack.
    let input = Input::new(b" word ").range(1..5).anchored(true);
    assert_eq!(dfa.search_fwd(&input).unwrap(), Some(5));

    let input = Input::new(b"xword ").range(1..5).anchored(true);
    assert_eq!(dfa.search_fwd(&input).unwrap(), None);
}

#[test]
fn budget_pressure_is_transparent_or_reported() {
    let pattern = "(abc|xyz)+";
    let hay: Vec<u8> = b"abcxyz".iter().copied().cycle().take(3000).collect();

    let prog = Arc::new(Compiler::new().compile(pattern).unwrap());
    let big = Dfa::new(Arc::clone(&prog), MatchKind::FirstMatch, 1 << 20)
        .unwrap();
    let expected = big.search_fwd(&Input::new(&hay)).unwrap();
    assert_eq!(expected, Some(3000));

    // A 1 KiB budget cannot hold this DFA. The search must either succeed
    // anyway (flushes are transparent to the result) or report that it
    // gave up; it must never return a different answer.
    let small =
        Dfa::new(Arc::clone(&prog), MatchKind::FirstMatch, 1 << 10).unwrap();
    match small.search_fwd(&Input::new(&hay)) {
        Ok(got) => assert_eq!(got, expected),
        Err(err) => assert!(err.offset() <= hay.len()),
    }

    // Retrying generously always succeeds.
    let retry = Dfa::new(prog, MatchKind::FirstMatch, 1 << 20).unwrap();
    assert_eq!(retry.search_fwd(&Input::new(&hay)).unwrap(), expected);
}

#[test]
fn flush_does_not_change_results() {
    // Repeat the same search on one small-budget DFA; every run must agree
    // with the first.
    let dfa = {
        let prog = Arc::new(Compiler::new().compile("[ab]{8}").unwrap());
        Dfa::new(prog, MatchKind::FirstMatch, 2 << 10).unwrap()
    };
    let hay = b"xxabababab-babababa";
    let first = dfa.search_fwd(&Input::new(hay));
    for _ in 0..10 {
        assert_eq!(dfa.search_fwd(&Input::new(hay)), first);
    }
}

#[test]
fn dot_star_matches_empty_text() {
    let dfa = forward(".*", MatchKind::LongestMatch);
    assert_eq!(dfa.search_fwd(&Input::new(b"")).unwrap(), Some(0));
}

#[test]
fn earliest_stops_at_first_match_end() {
    let dfa = forward("a+", MatchKind::FirstMatch);
    let input = Input::new(b"xxaaa").earliest(true);
    assert_eq!(dfa.search_fwd(&input).unwrap(), Some(3));
    // Without earliest, the match extends.
    assert_eq!(dfa.search_fwd(&Input::new(b"xxaaa")).unwrap(), Some(5));
}

#[test]
fn anchored_must_match_at_span_start() {
    let dfa = forward("abc", MatchKind::FirstMatch);
    assert_eq!(
        dfa.search_fwd(&Input::new(b"xabc").anchored(true)).unwrap(),
        None,
    );
    assert_eq!(
        dfa.search_fwd(&Input::new(b"abcx").anchored(true)).unwrap(),
        Some(3),
    );
}

#[test]
fn empty_span_mid_haystack() {
    // An empty span still exercises the end-of-text transition.
    let dfa = forward("a*", MatchKind::LongestMatch);
    let input = Input::new(b"aaaa").range(2..2);
    assert_eq!(dfa.search_fwd(&input).unwrap(), Some(2));
}

#[test]
fn many_match_collects_pattern_ids() {
    let prog = Arc::new(
        Compiler::new()
            .compile_many(&["[a-z]+", "[0-9]+", "foo"])
            .unwrap(),
    );
    let dfa = Dfa::new(prog, MatchKind::ManyMatch, 1 << 20).unwrap();

    let mut matches = Vec::new();
    let end = dfa
        .search_fwd_with_matches(&Input::new(b"foo12"), &mut matches)
        .unwrap();
    assert!(end.is_some());
    let mut ids: Vec<usize> =
        matches.iter().map(PatternID::as_usize).collect();
    ids.sort();
    assert_eq!(ids, vec![0, 1, 2]);

    let mut matches = Vec::new();
    let end = dfa
        .search_fwd_with_matches(&Input::new(b"12345"), &mut matches)
        .unwrap();
    assert!(end.is_some());
    let ids: Vec<usize> = matches.iter().map(PatternID::as_usize).collect();
    assert_eq!(ids, vec![1]);
}

#[test]
fn multiline_start_of_line() {
    let dfa = forward("(?m)^bar", MatchKind::FirstMatch);
    assert_eq!(dfa.search_fwd(&Input::new(b"foo\nbar")).unwrap(), Some(7));
    assert_eq!(dfa.search_fwd(&Input::new(b"foobar")).unwrap(), None);
}

#[test]
fn reverse_search_uses_flipped_assertions() {
    // "^ab" reversed becomes "ba" followed by a begin-text assertion in
    // reversed-world coordinates, i.e. the match must reach offset 0.
    let rev = reverse("^ab", MatchKind::LongestMatch);
    assert_eq!(rev.search_rev(&Input::new(b"ab").range(0..2)).unwrap(), Some(0));
    assert_eq!(
        rev.search_rev(&Input::new(b"xab").range(0..3)).unwrap(),
        None,
    );
}

#[test]
fn build_all_states_enumerates_the_dfa() {
    let dfa = forward("a*b", MatchKind::FirstMatch);
    let width = compile("a*b").byte_classes().alphabet_len();
    let mut nmatch = 0;
    let mut rows = 0;
    let count = dfa
        .build_all_states(|row, is_match| {
            assert_eq!(row.len(), width);
            rows += 1;
            if is_match {
                nmatch += 1;
            }
        })
        .unwrap();
    assert_eq!(count, rows);
    assert!(count >= 2, "expected at least two states, got {}", count);
    assert!(nmatch >= 1, "expected at least one matching state");
}

#[test]
fn possible_match_range_exact() {
    let dfa = forward("(abc|abd)", MatchKind::FirstMatch);
    let (min, max) = dfa.possible_match_range(10).unwrap().unwrap();
    assert_eq!(min, b"abc".to_vec());
    assert_eq!(max, b"abd".to_vec());
}

#[test]
fn possible_match_range_truncated() {
    let dfa = forward("a+", MatchKind::FirstMatch);
    let (min, max) = dfa.possible_match_range(10).unwrap().unwrap();
    assert_eq!(min, b"a".to_vec());
    // The upper bound is a prefix-successor of a truncated walk; it must
    // be strictly above every string of a's.
    assert!(max.as_slice() > b"a".as_slice());
    assert!(max.as_slice() >= b"aa".as_slice());
}

#[test]
fn possible_match_range_unbounded() {
    let dfa = forward(r"(?s-u:.)+", MatchKind::FirstMatch);
    assert_eq!(dfa.possible_match_range(4).unwrap(), None);
}

#[test]
fn gave_up_error_reports_an_offset() {
    let prog = Arc::new(Compiler::new().compile("[ab]{64}").unwrap());
    // Scratch fits, but states barely do; a long search thrashes. Either
    // outcome is allowed, but an error must carry a sane offset.
    let dfa = match Dfa::new(prog, MatchKind::FirstMatch, 3 << 10) {
        Ok(dfa) => dfa,
        Err(_) => return,
    };
    let hay = vec![b'a'; 4096];
    if let Err(err) = dfa.search_fwd(&Input::new(&hay)) {
        assert!(err.offset() <= hay.len());
    }
}
