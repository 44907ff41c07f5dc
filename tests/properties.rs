//! Language-level properties checked through the public API.
#![cfg(feature = "reader")]
#![expect(clippy::unwrap_used)] // test code OK

use crono::ast::{sym, val};
use crono::{Error, EvalOptions, Evaluator, ScopingMode, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn run(ev: &mut Evaluator, source: &str) -> Value {
    ev.eval_str(source)
        .unwrap_or_else(|err| panic!("'{source}' failed: {err}"))
}

#[test]
fn closure_definition_call_and_zero_argument_call() {
    let mut ev = Evaluator::new();
    run(&mut ev, "(define add1 (\\ (n) (+ n 1)))");
    assert_eq!(run(&mut ev, "(add1 5)"), val(6));
    assert_eq!(run(&mut ev, "((add1))").to_string(), "(\\ (n) (+ n 1))");

    let plus_one = run(&mut ev, "(+ 1)");
    let Value::Closure(closure) = &plus_one else {
        panic!("expected a closure, got {plus_one}");
    };
    assert_eq!(closure.arity(), 1);
    assert_eq!(ev.apply(&plus_one, vec![val(2)]), Ok(val(3)));
}

#[test]
fn type_mismatch_reports_first_position() {
    let mut ev = Evaluator::new();
    run(&mut ev, "(define add (\\ (a b) (+ a b)))");
    match ev.eval_str("(add \"a\" 2)") {
        Err(Error::TypeMismatch { function, position, expected, actual }) => {
            assert_eq!(function, "+");
            assert_eq!(position, 0);
            assert_eq!(expected, vec![":number", ":number"]);
            assert_eq!(actual, vec![":string", ":int"]);
        }
        other => panic!("expected a type mismatch, got {other:?}"),
    }
    assert_eq!(ev.scope_depth(), 0);
}

#[test]
fn arity_boundaries() {
    let mut ev = Evaluator::new();
    run(&mut ev, "(define pair-up (\\ (a b) (cons a b)))");

    // Exactly arity: applied
    assert_eq!(run(&mut ev, "(pair-up 1 2)"), Value::cons(val(1), val(2)));
    // Fewer: curried, one parameter left
    let curried = run(&mut ev, "(pair-up 1)");
    assert_eq!(curried.to_string(), "(\\ (b) (cons 1 b))");
    // More, non-variadic: error
    assert_eq!(
        ev.eval_str("(pair-up 1 2 3)"),
        Err(Error::arity_error("lambda", 2, 3))
    );
    // More, variadic: fine
    assert_eq!(run(&mut ev, "(list 1 2 3 4)"), val([1, 2, 3, 4]));
}

#[test]
fn struct_inheritance_overrides_parent_fields() {
    let mut ev = Evaluator::new();
    run(&mut ev, "(defstruct animal ((legs :int 4) (sound \"...\")))");
    run(&mut ev, "(substruct bird animal ((legs :int 2) (wings :int 2)))");
    run(&mut ev, "(define tweety (new bird (sound \"tweet\")))");

    assert_eq!(run(&mut ev, "(tweety legs)"), val(2));
    assert_eq!(run(&mut ev, "(tweety wings)"), val(2));
    assert_eq!(run(&mut ev, "(tweety sound)"), val("tweet"));
    assert_eq!(run(&mut ev, "(is? :animal tweety)"), Value::True);

    // Instances never share state with the template or each other
    run(&mut ev, "(define other (new bird))");
    run(&mut ev, "(tweety legs 1)");
    assert_eq!(run(&mut ev, "(other legs)"), val(2));
}

#[test]
fn scoping_modes_diverge_on_free_names() {
    let program = "(define y 1) (define f (\\ (x) (+ x y))) (let ((y 2)) (f 10))";

    let mut lexical = Evaluator::new();
    assert_eq!(run(&mut lexical, program), val(11));

    let mut dynamic =
        Evaluator::with_options(EvalOptions::default().with_scoping(ScopingMode::Dynamic));
    assert_eq!(run(&mut dynamic, program), val(12));
}

#[test]
fn dynamic_currying_sees_the_final_callers_bindings() {
    let mut dynamic =
        Evaluator::with_options(EvalOptions::default().with_scoping(ScopingMode::Dynamic));
    run(&mut dynamic, "(define g (\\ (x) (+ x b)))");
    run(&mut dynamic, "(define f (\\ (a b) (g a)))");

    assert_eq!(run(&mut dynamic, "(f 1 2)"), val(3));
    assert_eq!(run(&mut dynamic, "((f 1) 2)"), val(3));
}

#[test]
fn quoting_symbols_and_code() {
    let mut ev = Evaluator::new();
    assert_eq!(run(&mut ev, "'undefined-anywhere"), sym("undefined-anywhere"));
    assert_eq!(
        run(&mut ev, "'(if x (car y) z)").to_string(),
        "(if x (car y) z)"
    );
}

#[test]
fn failed_statement_leaves_later_statements_unaffected() {
    let mut ev = Evaluator::new();
    let program = crono::reader::read_all("(define n 2) (undefined-fn n) (* n 21)").unwrap();
    let results = ev.evaluate_all(&program);
    assert!(matches!(results[1], Err(Error::UnboundSymbol(_))));
    assert_eq!(results[2], Ok(val(42)));
}

/// Arbitrary data: atoms and nested lists of them
fn datum() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Value::Integer),
        "[a-z][a-z0-9?!-]{0,6}".prop_map(|name| Value::symbol(&name)),
        "[a-zA-Z ]{0,8}".prop_map(Value::string),
        any::<char>().prop_map(Value::Char),
        Just(Value::Nil),
        Just(Value::True),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(Value::list)
    })
}

proptest! {
    #[test]
    fn quoting_returns_the_datum_unchanged(datum in datum()) {
        let mut ev = Evaluator::new();
        let result = ev.evaluate(&Value::quoted(datum.clone())).unwrap();
        prop_assert_eq!(result, datum);
    }

    #[test]
    fn curried_and_direct_calls_agree(a in -10_000i64..10_000, b in -10_000i64..10_000) {
        for scoping in [ScopingMode::Lexical, ScopingMode::Dynamic] {
            let mut ev = Evaluator::with_options(EvalOptions::default().with_scoping(scoping));
            run(&mut ev, "(define k 2)");
            run(&mut ev, "(define scale (\\ (x) (* x k)))");
            run(&mut ev, "(define f (\\ (x y) (- (scale x) y)))");

            let direct = run(&mut ev, &format!("(f {a} {b})"));
            prop_assert_eq!(&direct, &val(2 * a - b));
            prop_assert_eq!(&run(&mut ev, &format!("((f {a}) {b})")), &direct);
            prop_assert_eq!(&run(&mut ev, &format!("(((f) {a}) {b})")), &direct);
            prop_assert_eq!(&run(&mut ev, &format!("((- (* {a} 2)) {b})")), &direct);
        }
    }
}
