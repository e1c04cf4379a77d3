use proptest::prelude::*;
use simbridge::script::block::{parse_block, source_lines};
use simbridge::script::expr::{parse_expr, parse_literal, tokenize, MAX_NESTING};
use simbridge::script::scanner::CallScanner;
use simbridge::script::stmt::parse_script;
use simbridge::script::value::Value;
use simbridge::store::decode_value;

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Argument text whose parentheses balance, possibly nested.
fn balanced() -> impl Strategy<Value = String> {
    let leaf = proptest::string::string_regex("[a-z0-9 ,+*'=.]{0,6}").unwrap();
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop::collection::vec(inner, 1..4).prop_map(|parts| {
            parts
                .into_iter()
                .map(|p| format!("({p})"))
                .collect::<Vec<_>>()
                .join(", ")
        })
    })
}

proptest! {
    /// Every reported span slices back to exactly the reported text, and
    /// calls come out in order without overlapping.
    #[test]
    fn scanner_spans_are_ordered_and_exact(
        line in r"[ a-zA-Z0-9_.,()'=+]{0,60}"
    ) {
        let scanner = CallScanner::default();
        let calls = scanner.find_calls(&line);
        let mut last_end = 0;
        for call in &calls {
            prop_assert!(call.start >= last_end);
            prop_assert!(call.start < call.end);
            prop_assert_eq!(&line[call.start..call.end], call.text);
            prop_assert!(call.text.ends_with(')'));
            last_end = call.end;
        }
    }

    #[test]
    fn scanner_finds_generated_calls(
        name in "[a-z_][a-z0-9_]{0,8}",
        args in balanced(),
        lead in "[a-z ]{0,10}",
    ) {
        let call = format!("FUN.{name}({args})");
        let line = format!("{lead}{call}");
        let calls = CallScanner::default().find_calls(&line);
        prop_assert_eq!(calls.len(), 1);
        prop_assert_eq!(calls[0].text, call.as_str());
        prop_assert_eq!(calls[0].start, lead.len());
    }

    #[test]
    fn unterminated_calls_are_not_reported(
        name in "[a-z_][a-z0-9_]{0,8}",
        args in balanced(),
    ) {
        let line = format!("x = FUN.{name}({args}");
        prop_assert!(CallScanner::default().find_calls(&line).is_empty());
    }
}

// ── Parsers never panic ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn tokenize_never_panics(src in r"\PC{0,80}") {
        let _ = tokenize(&src);
    }

    #[test]
    fn parse_expr_never_panics(src in r"[ -~]{0,60}") {
        let _ = parse_expr(&src);
    }

    #[test]
    fn deep_nesting_is_rejected_not_fatal(
        depth in 0usize..3000,
        (open, close) in prop::sample::select(vec![
            ("(", ")"),
            ("[", "]"),
            ("{1: ", "}"),
            ("-", ""),
            ("not ", ""),
        ]),
    ) {
        let src = format!("{}1{}", open.repeat(depth), close.repeat(depth));
        let result = parse_expr(&src);
        if depth >= MAX_NESTING {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn parse_script_never_panics(src in r"[ a-z0-9:=()\n+#'\t]{0,120}") {
        let _ = parse_script(&src);
    }

    #[test]
    fn decode_value_never_panics(text in r"\PC{0,60}") {
        let _ = decode_value(&text);
    }
}

// ── Literal rendering ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn int_repr_parses_back(n in -1_000_000_000_000i64..1_000_000_000_000i64) {
        prop_assert_eq!(parse_literal(&Value::Int(n).repr()), Some(Value::Int(n)));
    }

    #[test]
    fn str_repr_parses_back(s in r"[ -~]{0,20}") {
        let v = Value::Str(s);
        prop_assert_eq!(parse_literal(&v.repr()), Some(v));
    }

    #[test]
    fn list_repr_parses_back(items in prop::collection::vec(-1000i64..1000, 0..6)) {
        let v = Value::List(items.into_iter().map(Value::Int).collect());
        prop_assert_eq!(parse_literal(&v.repr()), Some(v));
    }
}

// ── Block parser ──────────────────────────────────────────────────────────────

proptest! {
    /// The body is always a contiguous run after the header, strictly deeper
    /// than it, and the returned index never runs past the input.
    #[test]
    fn block_stays_in_bounds(
        indents in prop::collection::vec(0usize..6, 1..12),
        start in 1usize..12,
    ) {
        let src: String = indents
            .iter()
            .map(|n| format!("{}x\n", " ".repeat(*n)))
            .collect();
        let lines = source_lines(&src);
        let start = start.min(lines.len());
        let (body, next) = parse_block(&lines, start);
        prop_assert!(next >= start);
        prop_assert!(next <= lines.len());
        prop_assert_eq!(body.len(), next - start);
        let base = lines[start - 1].indent();
        for line in &body {
            prop_assert!(line.indent() > base);
        }
    }
}
