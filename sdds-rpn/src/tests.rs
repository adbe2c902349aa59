use proptest::prelude::*;
use rstest::rstest;
use sdds_error::ErrorKind;

use crate::{MemoryValue, RpnContext, infix_to_postfix, postfix_to_infix};

#[test]
fn fit_residuals_sum_of_squares() {
    let samples = [(0.0, 1.2), (1.0, 2.9), (2.0, 5.1), (3.0, 7.2)];
    let mut ctx = RpnContext::new();
    ctx.store("a0", 1.0).unwrap();
    ctx.store("a1", 2.0).unwrap();
    let x = ctx.create_memory("x", MemoryValue::Number(0.0)).unwrap();
    let y = ctx.create_memory("y", MemoryValue::Number(0.0)).unwrap();
    let program = ctx.compile("a0 a1 x * + y -").unwrap();

    let mut sum = 0.0;
    for (xi, yi) in samples {
        ctx.store_slot(x, MemoryValue::Number(xi));
        ctx.store_slot(y, MemoryValue::Number(yi));
        let r = ctx.evaluate_program(&program).unwrap();
        assert!(!ctx.check_error());
        sum += r * r;
    }
    // Residuals are -0.2, 0.1, -0.1 and -0.2.
    assert!((sum - 0.1).abs() < 1e-12, "sum of squares {sum}");
}

#[test]
fn redefinition_reaches_existing_callers() {
    let mut ctx = RpnContext::new();
    let first = ctx.create_udf("f", "1").unwrap();
    ctx.create_udf("g", "f 10 *").unwrap();
    assert_eq!(ctx.evaluate("g").unwrap(), 10.0);

    let second = ctx.create_udf("f", "2").unwrap();
    assert_eq!(first, second);
    assert_eq!(ctx.evaluate("g").unwrap(), 20.0);
    assert_eq!(ctx.udfs().get(first).map(|u| u.source()), Some("2"));
}

#[test]
fn redefining_repeatedly_does_not_grow_code() {
    let mut ctx = RpnContext::new();
    ctx.create_udf("f", "1 2 +").unwrap();
    ctx.create_udf("g", "f 10 *").unwrap();
    let size = ctx.udfs().code().len();
    for _ in 0..100 {
        ctx.create_udf("f", "1 2 +").unwrap();
    }
    assert_eq!(ctx.udfs().code().len(), size);
    assert_eq!(ctx.evaluate("g").unwrap(), 30.0);
}

#[test]
fn function_redefining_itself_finishes_its_old_body() {
    let mut ctx = RpnContext::new();
    ctx.create_udf("f", "\"f\" \"7\" mudf 1 2 +").unwrap();
    assert_eq!(ctx.evaluate("f").unwrap(), 3.0);
    assert_eq!(ctx.udfs().stale(), 6);
    assert_eq!(ctx.evaluate("f").unwrap(), 7.0);
    assert_eq!(ctx.udfs().stale(), 0);
    assert_eq!(ctx.udfs().code().len(), 1);
}

#[test]
fn forward_references_link_later() {
    let mut ctx = RpnContext::new();
    ctx.create_udf("outer", "inner 1 +").unwrap();
    assert_eq!(ctx.evaluate("outer").unwrap_err().kind(), ErrorKind::UnknownToken);
    ctx.take_error();
    ctx.clear();
    ctx.create_udf("inner", "41").unwrap();
    assert_eq!(ctx.evaluate("outer").unwrap(), 42.0);
    assert_eq!(ctx.udfs().unresolved().count(), 0);
}

#[test]
fn memories_created_after_a_function_are_linked() {
    let mut ctx = RpnContext::new();
    ctx.create_udf("scaled", "k 2 *").unwrap();
    ctx.execute("4 sto k").unwrap();
    ctx.clear();
    assert_eq!(ctx.evaluate("scaled").unwrap(), 8.0);
}

#[rstest]
#[case("1 + 2 * 3", "1 2 3 * +")]
#[case("(1 + 2) * 3", "1 2 + 3 *")]
#[case("-x^2", "x 2 pow chs")]
#[case("2^3^2", "2 3 2 pow pow")]
#[case("atan2(y, x) / pi", "y x atan2 pi /")]
#[case("a - -b", "a b chs -")]
fn infix_conversion(#[case] infix: &str, #[case] postfix: &str) {
    assert_eq!(infix_to_postfix(infix).unwrap(), postfix);
}

#[rstest]
#[case("1 2 3 * +", "1.0 + 2.0 * 3.0")]
#[case("1 2 + 3 *", "(1.0 + 2.0) * 3.0")]
#[case("1 2 3 - -", "1.0 - (2.0 - 3.0)")]
#[case("x 2 pow chs", "-x^2.0")]
#[case("x chs 2 pow", "(-x)^2.0")]
#[case("y x atan2", "atan2(y, x)")]
fn postfix_conversion(#[case] postfix: &str, #[case] infix: &str) {
    assert_eq!(postfix_to_infix(postfix).unwrap(), infix);
}

#[rstest]
#[case("1 +")]
#[case("1 2")]
#[case("\"s\" strlen")]
#[case("1 2 <")]
fn postfix_without_infix_form(#[case] postfix: &str) {
    assert!(postfix_to_infix(postfix).is_err());
}

type Outcome = Result<f64, ErrorKind>;

fn same_outcome(a: &Outcome, b: &Outcome) -> bool {
    match (a, b) {
        (Ok(x), Ok(y)) => x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan()),
        (Err(x), Err(y)) => x == y,
        _ => false,
    }
}

fn evaluate(text: &str) -> Outcome {
    RpnContext::new().evaluate(text).map_err(|e| e.kind())
}

fn arithmetic() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (-1000.0f64..1000.0).prop_map(|x| format!("{x:?}")),
        (0i32..20).prop_map(|n| n.to_string()),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (
                inner.clone(),
                inner.clone(),
                prop::sample::select(vec!["+", "-", "*", "/", "pow", "atan2"])
            )
                .prop_map(|(a, b, op)| format!("{a} {b} {op}")),
            (inner, prop::sample::select(vec!["chs", "abs", "sqr", "sin", "exp"]))
                .prop_map(|(a, op)| format!("{a} {op}")),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn infix_round_trip_preserves_value(postfix in arithmetic()) {
        let infix = postfix_to_infix(&postfix).unwrap();
        let again = infix_to_postfix(&infix).unwrap();
        let (before, after) = (evaluate(&postfix), evaluate(&again));
        prop_assert!(
            same_outcome(&before, &after),
            "{} -> {} -> {}: {:?} vs {:?}", postfix, infix, again, before, after
        );
    }
}
