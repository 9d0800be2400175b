use script::ParseErrorKind;
use script::brackets::{
    BracketPair, BracketScan, BracketSpan, check_bracket_balance, find_matching_bracket,
    is_bracket_part_of_array, remove_spaces_in_brackets, unquoted,
};

fn count_outside_literals(text: &str, open: usize, close: usize, pair: BracketPair) -> (usize, usize) {
    let mut opens = 0;
    let mut closes = 0;
    for (i, c) in unquoted(text) {
        if i < open || i > close {
            continue;
        }
        if c == pair.open() {
            opens += 1;
        } else if c == pair.close() {
            closes += 1;
        }
    }
    (opens, closes)
}

// ---------------------------------------------------------------------------
// find_matching_bracket
// ---------------------------------------------------------------------------

#[test]
fn matches_nested_parens() {
    let scan = find_matching_bracket("f(a(b)c)", BracketPair::Paren, 0);
    assert_eq!(
        scan,
        BracketScan::Matched(BracketSpan {
            open: 1,
            close: 7,
            is_outer: false
        })
    );
    assert_eq!(scan.indices(), (1, 7));
}

#[test]
fn outer_pair_spans_whole_trimmed_text() {
    let span = find_matching_bracket("  (a + b)  ", BracketPair::Paren, 0)
        .span()
        .expect("matched");
    assert!(span.is_outer);
    assert_eq!((span.open, span.close), (2, 8));

    let span = find_matching_bracket("(a)(b)", BracketPair::Paren, 0)
        .span()
        .expect("matched");
    assert!(!span.is_outer);
}

#[test]
fn scan_starts_at_start_index() {
    let scan = find_matching_bracket("(a)(b)", BracketPair::Paren, 1);
    assert_eq!(scan.indices(), (3, 5));
}

#[test]
fn unmatched_reports_minus_one() {
    let scan = find_matching_bracket("f(a", BracketPair::Paren, 0);
    assert_eq!(scan, BracketScan::Unmatched { open: 1 });
    assert_eq!(scan.indices(), (-1, -1));
    assert!(scan.span().is_none());
}

#[test]
fn missing_bracket_is_not_found() {
    let scan = find_matching_bracket("abc", BracketPair::Square, 0);
    assert_eq!(scan, BracketScan::NotFound);
    assert_eq!(scan.indices(), (-1, -1));
}

#[test]
fn brackets_inside_literals_are_skipped() {
    let text = "x = 'a(b' + (c)";
    assert_eq!(find_matching_bracket(text, BracketPair::Paren, 0).indices(), (12, 14));
}

#[test]
fn quote_after_identifier_is_transpose() {
    let text = "A' * (B)";
    assert_eq!(find_matching_bracket(text, BracketPair::Paren, 0).indices(), (5, 7));
}

#[test]
fn matched_span_is_balanced() {
    let cases = [
        ("f(a(b)c)", BracketPair::Paren),
        ("v = [1, [2, 3], 4]", BracketPair::Square),
        ("opts = {A = {B = 1}, C = '}'}", BracketPair::Brace),
        ("g('(' , (x))", BracketPair::Paren),
        ("Sat1.X(1) + (a * (b - c))", BracketPair::Paren),
    ];
    for (text, pair) in cases {
        let mut start = 0;
        while let Some(span) = find_matching_bracket(text, pair, start).span() {
            let (opens, closes) = count_outside_literals(text, span.open, span.close, pair);
            assert_eq!(opens, closes, "unbalanced match in {:?}", text);
            start = span.close + 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Balance and pair specs
// ---------------------------------------------------------------------------

#[test]
fn balance_check() {
    assert!(check_bracket_balance("f(a[1], {b})").is_ok());
    assert!(check_bracket_balance("'(' + x").is_ok());

    let err = check_bracket_balance("([)]").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnbalancedBracket);

    let err = check_bracket_balance("a)").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnbalancedBracket);

    let err = check_bracket_balance("(()").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnmatchedBracket);
    assert_eq!(err.text, "(()");
}

#[test]
fn pair_spec_parsing() {
    assert_eq!(BracketPair::parse("()").unwrap(), BracketPair::Paren);
    assert_eq!(BracketPair::parse("[]").unwrap(), BracketPair::Square);
    assert_eq!(BracketPair::parse("{}").unwrap(), BracketPair::Brace);

    for spec in ["<>", "(", "(])", ""] {
        let err = BracketPair::parse(spec).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnknownBracket);
        assert!(err.to_string().contains("unknown bracket character"));
    }
    assert_eq!(BracketPair::Square.to_string(), "[]");
}

// ---------------------------------------------------------------------------
// Array subscripts
// ---------------------------------------------------------------------------

#[test]
fn array_subscripts() {
    let paren = [BracketPair::Paren];
    assert!(is_bracket_part_of_array("v(3)", &paren, false));
    assert!(is_bracket_part_of_array("A(i,j)", &paren, false));
    assert!(is_bracket_part_of_array("Sat1.Pos(1)", &paren, false));
    assert!(is_bracket_part_of_array("A[3,3]", &[BracketPair::Square], false));

    assert!(!is_bracket_part_of_array("(a+b)", &paren, false));
    assert!(!is_bracket_part_of_array("A(1,2,3)", &paren, false));
    assert!(!is_bracket_part_of_array("f(x)+1", &paren, false));
    assert!(!is_bracket_part_of_array("f(x-1)", &paren, false));
    assert!(!is_bracket_part_of_array("A[3]", &paren, false));
}

#[test]
fn array_subscripts_with_single_char_indices() {
    let paren = [BracketPair::Paren];
    assert!(is_bracket_part_of_array("v(3)", &paren, true));
    assert!(is_bracket_part_of_array("A(i,j)", &paren, true));
    assert!(!is_bracket_part_of_array("v(10)", &paren, true));
    assert!(!is_bracket_part_of_array("A(row,1)", &paren, true));
}

#[test]
fn spaces_removed_inside_groups() {
    let pairs = [BracketPair::Paren, BracketPair::Square];
    assert_eq!(remove_spaces_in_brackets("v( 1 , 2 ) + w", &pairs), "v(1,2) + w");
    assert_eq!(remove_spaces_in_brackets("A[ 3, 3 ]", &pairs), "A[3,3]");
    assert_eq!(remove_spaces_in_brackets("f('a b')", &pairs), "f('a b')");
    assert_eq!(remove_spaces_in_brackets("{ a }", &pairs), "{ a }");
}
