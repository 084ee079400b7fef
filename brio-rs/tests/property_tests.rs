use std::io::BufReader;

use proptest::prelude::*;

use brio::context::ExecutionContext;
use brio::script::{eval_top, parse_statement, Engine, StatementReader, Value};
use brio::task::CancelToken;

proptest! {
    /// The statement parser returns Ok or Err on arbitrary input; it must
    /// never panic.
    #[test]
    fn parser_does_not_panic(s in "\\PC*") {
        let _ = parse_statement(&s);
    }
}

proptest! {
    /// The chunker consumes arbitrary byte streams without panicking and
    /// without losing the terminating EOF.
    #[test]
    fn chunker_terminates_on_arbitrary_input(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut reader = StatementReader::new(BufReader::new(bytes.as_slice()));
        // Every yielded chunk consumed at least its terminator byte, so
        // the number of chunks is bounded by the input length.
        let mut chunks = 0usize;
        loop {
            match reader.next_statement() {
                Ok(Some(_)) => {
                    chunks += 1;
                    prop_assert!(chunks <= bytes.len());
                }
                Ok(None) | Err(_) => break,
            }
        }
    }
}

proptest! {
    /// Integer literals survive a parse-and-evaluate round through the
    /// engine.
    #[test]
    fn integer_literals_evaluate_to_themselves(n in -1_000_000i64..1_000_000) {
        let engine = Engine::new();
        let stmt = parse_statement(&n.to_string());
        prop_assert!(stmt.is_ok());
        let mut ctx = ExecutionContext::new();
        let v = eval_top(&engine, &stmt.unwrap(), &mut ctx, &CancelToken::new());
        prop_assert!(v.is_ok());
        prop_assert_eq!(v.unwrap().into_value(), Value::Int(n));
    }
}

proptest! {
    /// Every top-level evaluation leaves the call stack at the root frame,
    /// whatever the statement was.
    #[test]
    fn depth_invariant_holds_for_arbitrary_statements(s in "\\PC{0,64}") {
        let engine = Engine::new();
        if let Ok(stmt) = parse_statement(&s) {
            let mut ctx = ExecutionContext::new();
            let _ = eval_top(&engine, &stmt, &mut ctx, &CancelToken::new());
            prop_assert_eq!(ctx.depth(), 1);
        }
    }
}

proptest! {
    /// String literals round-trip through the lexer's escape handling.
    #[test]
    fn string_literals_evaluate_to_their_content(s in "[a-zA-Z0-9 ]{0,32}") {
        let engine = Engine::new();
        let src = format!("\"{s}\"");
        let stmt = parse_statement(&src);
        prop_assert!(stmt.is_ok());
        let mut ctx = ExecutionContext::new();
        let v = eval_top(&engine, &stmt.unwrap(), &mut ctx, &CancelToken::new());
        prop_assert!(v.is_ok());
        prop_assert_eq!(v.unwrap().into_value(), Value::Str(s));
    }
}
