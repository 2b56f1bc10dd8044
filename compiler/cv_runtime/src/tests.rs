#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use cv_diagnostic::{Cursor, Diagnostic, ErrorKind};
use cv_ir::quant_to_text;

use crate::Runtime;

fn eval_text(source: &str) -> String {
    let rt = Runtime::new();
    let cursor = Cursor::new();
    let value = rt.eval(source, &cursor);
    assert!(
        !cursor.error(),
        "unexpected diagnostic: {:?}",
        cursor.raised()
    );
    quant_to_text(&value.expect("evaluation produced no value"))
}

fn eval_err(source: &str) -> Diagnostic {
    let rt = Runtime::new();
    let cursor = Cursor::new();
    let value = rt.eval(source, &cursor);
    assert!(value.is_none(), "expected a failure, got a value");
    cursor.raised().expect("expected a diagnostic")
}

mod literals {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_round_trip() {
        assert_eq!(eval_text("42"), "42");
        assert_eq!(eval_text("-3.5"), "-3.5");
        assert_eq!(eval_text("0.125"), "0.125");
    }

    #[test]
    fn strings_round_trip_with_escapes() {
        assert_eq!(eval_text("'hi'"), "'hi'");
        assert_eq!(eval_text(r"'it\'s'"), "'it's'");
        assert_eq!(eval_text(r"'a\nb'"), "'a\nb'");
    }

    #[test]
    fn nil_is_nil() {
        assert_eq!(eval_text("nil"), "nil");
    }

    #[test]
    fn lists_build_in_order() {
        assert_eq!(eval_text("[1 2 3]"), "[1 2 3]");
        assert_eq!(eval_text("[[1 2] [3 4]]"), "[[1 2] [3 4]]");
    }
}

mod arithmetic {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn operators_fold_left_to_right() {
        assert_eq!(eval_text("[+ 1 2 3]"), "6");
        assert_eq!(eval_text("[- 10 2 3]"), "5");
        assert_eq!(eval_text("[* 2 3 4]"), "24");
        assert_eq!(eval_text("[/ 8 2 2]"), "2");
    }

    #[test]
    fn too_few_operands_is_an_arity_error() {
        assert_eq!(eval_err("[+ 1]").kind, ErrorKind::Arity);
    }

    #[test]
    fn non_numeric_operand_is_a_type_error() {
        assert_eq!(eval_err("[+ 1 'two']").kind, ErrorKind::Type);
    }
}

mod bindings {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn let_binds_and_name_resolves() {
        assert_eq!(eval_text("[let x 5] [x]"), "5");
    }

    #[test]
    fn undefined_name_is_a_name_error() {
        let raised = eval_err("[boom 1]");
        assert_eq!(raised.kind, ErrorKind::Name);
        assert!(raised.message.contains("boom"));
    }

    #[test]
    fn reserved_word_cannot_be_bound() {
        assert_eq!(eval_err("[let fn 5]").kind, ErrorKind::Name);
    }

    #[test]
    fn let_replay_returns_the_cached_value() {
        let rt = Runtime::new();
        let cursor = Cursor::new();
        let root = cv_lexer::lex("[let x [+ 2 3]]", &cursor).unwrap();
        let entry = rt.compile(&root, rt.root(), &cursor).unwrap();
        let first = rt.execute(entry, &cursor).unwrap();
        let second = rt.execute(entry, &cursor).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(quant_to_text(&first), "5");
    }

    #[test]
    fn namer_replay_is_idempotent() {
        let rt = Runtime::new();
        let cursor = Cursor::new();
        let root = cv_lexer::lex("~x[+ 2 3]", &cursor).unwrap();
        let entry = rt.compile(&root, rt.root(), &cursor).unwrap();
        let first = rt.execute(entry, &cursor).unwrap();
        let second = rt.execute(entry, &cursor).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn namer_binds_for_later_siblings() {
        assert_eq!(eval_text("[+ ~x[7] x]"), "14");
    }
}

mod mutation {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mut_overwrites_in_place_preserving_identity() {
        let rt = Runtime::new();
        let cursor = Cursor::new();
        rt.eval("[let x 5]", &cursor).unwrap();
        let (ctx, slot) = rt.program().lookup_name(rt.root(), "x").unwrap();
        let before = rt.program().fetch(ctx, slot).unwrap();
        rt.eval("[mut x 9]", &cursor).unwrap();
        let after = rt.program().fetch(ctx, slot).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(quant_to_text(&after), "9");
    }

    #[test]
    fn mut_type_mismatch_fails_and_leaves_the_slot() {
        let rt = Runtime::new();
        let cursor = Cursor::new();
        rt.eval("[let x 5]", &cursor).unwrap();
        assert!(rt.eval("[mut x 'nope']", &cursor).is_none());
        assert_eq!(cursor.raised().unwrap().kind, ErrorKind::Type);
        cursor.clear();
        assert_eq!(quant_to_text(&rt.eval("[x]", &cursor).unwrap()), "5");
    }

    #[test]
    fn mut_of_an_undefined_name_is_a_name_error() {
        assert_eq!(eval_err("[mut ghost 1]").kind, ErrorKind::Name);
    }

    #[test]
    fn step_mutators_work_in_place() {
        assert_eq!(eval_text("[let x 5] [++ x] [x]"), "6");
        assert_eq!(eval_text("[-- 2]"), "1");
        assert_eq!(eval_text("[// 8]"), "4");
        assert_eq!(eval_text("[** 3]"), "9");
        assert_eq!(eval_text("[++ 1 2]"), "[2 3]");
    }
}

mod functions {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn invocation_binds_parameters_positionally() {
        assert_eq!(
            eval_text("[let add [fn [a b] [return [+ a b]]]] [add 2 3]"),
            "5"
        );
    }

    #[test]
    fn body_without_return_yields_its_last_value() {
        assert_eq!(eval_text("[let add [fn [a b] [+ a b]]] [add 2 3]"), "5");
    }

    #[test]
    fn outer_bindings_are_visible_inside_a_body() {
        assert_eq!(
            eval_text("[let base 10] [let f [fn [a] [+ a base]]] [f 5]"),
            "15"
        );
    }

    #[test]
    fn parameters_shadow_outer_bindings() {
        assert_eq!(
            eval_text("[let x 1] [let f [fn [x] [+ x 10]]] [f 5] [x]"),
            "1"
        );
        assert_eq!(
            eval_text("[let x 1] [let f [fn [x] [+ x 10]]] [f 5]"),
            "15"
        );
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        assert_eq!(
            eval_err("[let add [fn [a b] [+ a b]]] [add 1 2 3]").kind,
            ErrorKind::Arity
        );
        assert_eq!(
            eval_err("[let add [fn [a b] [+ a b]]] [add 1]").kind,
            ErrorKind::Arity
        );
    }

    #[test]
    fn expander_argument_splices_across_parameters() {
        assert_eq!(
            eval_text("[let add [fn [a b] [+ a b]]] [let l [2 3]] [add ^l]"),
            "5"
        );
    }

    #[test]
    fn return_unwinds_nested_blocks() {
        assert_eq!(
            eval_text("[let f [fn [a] [[if 1 [return 9]] [+ a 1]]]] [f 1]"),
            "9"
        );
    }

    #[test]
    fn bare_return_yields_nil() {
        assert_eq!(eval_text("[let f [fn [a] [[return] [+ a 1]]]] [f 1]"), "nil");
    }

    #[test]
    fn return_stops_the_remaining_body_chain() {
        // The mutation after the return must never run.
        assert_eq!(
            eval_text(
                "[let n 0] [let f [fn [a] [[return a] [mut n 99]]]] [f 3] [n]"
            ),
            "0"
        );
    }

    #[test]
    fn body_locals_survive_recursive_calls() {
        assert_eq!(
            eval_text(
                "[let f [fn [n] [[let m n] [if [> n 1] [f [- n 1]] [0]] [return m]]]] [f 2]"
            ),
            "2"
        );
    }

    #[test]
    fn recursion_terminates_with_parameters_intact() {
        assert_eq!(
            eval_text("[let f [fn [n] [if [> n 0] [f [- n 1]] [n]]]] [f 5]"),
            "0"
        );
    }

    #[test]
    fn top_level_interrupt_resolves_to_its_payload() {
        assert_eq!(eval_text("[return 5]"), "5");
    }
}

mod blocks {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn a_group_of_forms_runs_sequentially() {
        assert_eq!(eval_text("[[let a 2] [+ a 3]]"), "5");
    }

    #[test]
    fn empty_source_is_a_syntax_error() {
        assert_eq!(eval_err("# nothing here #").kind, ErrorKind::Syntax);
    }

    #[test]
    fn mismatched_brackets_are_a_syntax_error() {
        assert_eq!(eval_err("[+ 1 2").kind, ErrorKind::Syntax);
    }
}

mod stores {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn all_namer_groups_construct_stores() {
        assert_eq!(eval_text("[~b[2] ~a[1]]"), "[~a[1] ~b[2]]");
    }

    #[test]
    fn member_access_yields_one_value_or_a_list() {
        assert_eq!(eval_text("[let s [~a[1] ~b[2]]] [s ~a]"), "1");
        assert_eq!(eval_text("[let s [~a[1] ~b[2]]] [s ~a ~b]"), "[1 2]");
    }

    #[test]
    fn missing_member_is_a_name_error() {
        assert_eq!(
            eval_err("[let s [~a[1] ~b[2]]] [s ~zz]").kind,
            ErrorKind::Name
        );
    }

    #[test]
    fn expander_splices_a_store_into_a_store() {
        assert_eq!(
            eval_text("[let s1 [~a[1] ~c[3]]] [~b[2] ^s1]"),
            "[~a[1] ~b[2] ~c[3]]"
        );
    }

    #[test]
    fn non_namer_member_is_a_constructor_error() {
        assert_eq!(eval_err("[~a[1] 5]").kind, ErrorKind::Constructor);
    }
}

mod aliasing {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bindings_share_list_members() {
        assert_eq!(
            eval_text("[let a [1 2]] [let b a] [++ [nth 0 a]] [nth 0 b]"),
            "2"
        );
    }

    #[test]
    fn carbon_copy_severs_sharing_both_ways() {
        assert_eq!(
            eval_text("[let a [1 2]] [let b [cc a]] [++ [nth 0 a]] [b]"),
            "[1 2]"
        );
        assert_eq!(
            eval_text("[let a [1 2]] [let b [cc a]] [++ [nth 0 b]] [a]"),
            "[1 2]"
        );
    }
}

mod list_tools {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn expander_splices_into_lists_and_calls() {
        assert_eq!(eval_text("[let l [2 3]] [+ 1 ^l]"), "6");
        assert_eq!(eval_text("[let l [2 3]] [1 ^l 4]"), "[1 2 3 4]");
    }

    #[test]
    fn nth_indexes_from_zero() {
        assert_eq!(eval_text("[nth 1 [4 5 6]]"), "5");
        assert_eq!(eval_err("[nth 5 [1 2]]").kind, ErrorKind::Type);
    }

    #[test]
    fn len_counts_lists_strings_and_stores() {
        assert_eq!(eval_text("[len [1 2 3]]"), "3");
        assert_eq!(eval_text("[len 'hello']"), "5");
        assert_eq!(eval_text("[len [~a[1] ~b[2]]]"), "2");
    }

    #[test]
    fn push_operators_mutate_the_list() {
        assert_eq!(eval_text("[<< 3 [1 2]]"), "[1 2 3]");
        assert_eq!(eval_text("[>> 0 [1 2]]"), "[0 1 2]");
        assert_eq!(eval_text("[let l [1 2]] [<< 3 l] [l]"), "[1 2 3]");
    }

    #[test]
    fn splice_joins_and_l_rev_reverses() {
        assert_eq!(eval_text("[splice [1 2] [3 4]]"), "[1 2 3 4]");
        assert_eq!(eval_text("[l-rev [1 2 3]]"), "[3 2 1]");
    }

    // A single-member bracket group is the member itself, not a list.
    #[test]
    fn single_child_groups_unwrap_to_their_member() {
        assert_eq!(eval_text("[5]"), "5");
        assert_eq!(eval_text("[[5 6]]"), "[5 6]");
    }
}

mod conditions {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn comparisons_yield_one_or_zero() {
        assert_eq!(eval_text("[= 2 2]"), "1");
        assert_eq!(eval_text("[!= 2 2]"), "0");
        assert_eq!(eval_text("[>= 2 2]"), "1");
        assert_eq!(eval_text("[< 1 2]"), "1");
    }

    #[test]
    fn comparison_branches_are_lazy_values() {
        assert_eq!(eval_text("[> 5 3 'yes' 'no']"), "'yes'");
        assert_eq!(eval_text("[< 5 3 'yes' 'no']"), "'no'");
    }

    #[test]
    fn if_takes_the_matching_branch() {
        assert_eq!(eval_text("[if 1 'then' 'else']"), "'then'");
        assert_eq!(eval_text("[if 0 'then' 'else']"), "'else'");
        assert_eq!(eval_text("[if 0 'then']"), "nil");
    }

    #[test]
    fn if_never_touches_the_untaken_branch() {
        assert_eq!(eval_text("[let n 0] [if 1 5 [mut n 9]] [n]"), "0");
    }

    #[test]
    fn boolean_operators_short_circuit() {
        assert_eq!(eval_text("[let n 0] [& 0 [mut n 99]] [n]"), "0");
        assert_eq!(eval_text("[let n 0] [| 1 [mut n 99]] [n]"), "0");
        assert_eq!(eval_text("[& 1 2]"), "1");
        assert_eq!(eval_text("[! 0]"), "1");
    }
}

mod loops {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn while_runs_until_the_condition_fails() {
        assert_eq!(
            eval_text(
                "[let n 3] [let acc 0] \
                 [while [> n 0] [[mut acc [+ acc n]] [mut n [- n 1]]]] [acc]"
            ),
            "6"
        );
    }

    #[test]
    fn yield_stops_the_loop_and_becomes_its_value() {
        assert_eq!(
            eval_text("[let n 5] [while [> n 0] [[mut n [- n 1]] [yield 42]]]"),
            "42"
        );
    }

    #[test]
    fn skip_abandons_the_rest_of_the_iteration() {
        assert_eq!(
            eval_text(
                "[let n 3] [let acc 0] \
                 [while [> n 0] [[mut n [- n 1]] [skip] [mut acc [+ acc 100]]]] [acc]"
            ),
            "0"
        );
    }

    #[test]
    fn a_false_condition_never_runs_the_body() {
        assert_eq!(eval_text("[let n 0] [while 0 [[mut n 9]]] [n]"), "0");
    }
}

mod imports {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bring_imports_bindings_from_a_file() {
        let path = std::env::temp_dir().join(format!("cv_bring_{}.cv", std::process::id()));
        std::fs::write(&path, "[let imported 41]").unwrap();
        let rt = Runtime::new();
        let cursor = Cursor::new();
        let program = format!("[bring '{}'] [+ imported 1]", path.display());
        let value = rt.eval(&program, &cursor);
        std::fs::remove_file(&path).ok();
        assert_eq!(quant_to_text(&value.expect("import failed")), "42");
    }

    #[test]
    fn bring_of_a_missing_file_raises_import_without_exiting() {
        let rt = Runtime::new();
        let cursor = Cursor::new();
        assert!(rt.eval("[bring 'missing.cv']", &cursor).is_none());
        let raised = cursor.raised().unwrap();
        assert_eq!(raised.kind, ErrorKind::Import);
        assert!(raised.message.contains("missing.cv"));
        assert!(!cursor.should_exit());
    }

    #[test]
    fn unknown_dynamic_library_is_fatal() {
        let rt = Runtime::new();
        let cursor = Cursor::new();
        assert!(rt.eval("[bring:dynamic-library 'nope']", &cursor).is_none());
        assert_eq!(cursor.raised().unwrap().kind, ErrorKind::Import);
        assert!(cursor.should_exit());
    }

    #[test]
    fn registered_extensions_resolve_and_bind_natives() {
        let rt = Runtime::new();
        rt.register_extension("std", crate::stdlib::install);
        let cursor = Cursor::new();
        let value = rt
            .eval("[bring:dynamic-library 'std'] [let p out]", &cursor)
            .expect("extension load failed");
        assert!(quant_to_text(&value).contains("BINARY"));
    }
}
