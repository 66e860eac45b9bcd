mod chunk;
mod compiler;
mod lexer;
mod natives;
mod reporter;
mod table;
mod token;
mod value;
mod vm;

pub use reporter::{Phase, Report, Reporter, StderrReporter};
pub use value::Value;
pub use vm::Vm;

use std::rc::Rc;
use value::Closure;

/// Compiles and runs `source` against `vm`, reusing `vm` across calls so
/// a REPL session keeps its globals (spec §10.4). Grounded on the
/// teacher's `qatam::run`/`run_line` pipeline function. The `Err` carries
/// which phase failed, so callers (the CLI's exit code) can tell a
/// compile error from a runtime one.
pub fn run(source: &str, vm: &mut Vm, reporter: &mut dyn Reporter) -> Result<(), Phase> {
    let function = compiler::Compiler::new(source)
        .compile()
        .map_err(|reports| {
            for report in reports {
                reporter.error(report);
            }
            Phase::Compile
        })?;
    let closure = Rc::new(Closure::new(Rc::new(function), Vec::new()));
    vm.interpret(closure, reporter).map_err(|()| Phase::Runtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ErrorsTracker {
        errors: Vec<Report>,
        warnings: Vec<Report>,
    }

    impl Reporter for ErrorsTracker {
        fn warning(&mut self, report: Report) {
            self.warnings.push(report);
        }

        fn error(&mut self, report: Report) {
            self.errors.push(report);
        }
    }

    fn run_source(source: &str) -> ErrorsTracker {
        let mut vm = Vm::new();
        let mut tracker = ErrorsTracker::default();
        let _ = run(source, &mut vm, &mut tracker);
        tracker
    }

    #[test]
    fn runs_a_complete_program_without_errors() {
        let tracker = run_source(
            "var total = 0;\n\
             var i = 0;\n\
             while (i < 5) {\n\
               total = total + i;\n\
               i = i + 1;\n\
             }\n\
             print(total);",
        );
        assert!(tracker.errors.is_empty());
    }

    #[test]
    fn reports_a_compile_error_without_running() {
        let tracker = run_source("var x = ;");
        assert_eq!(tracker.errors.len(), 1);
        assert_eq!(tracker.errors[0].phase, Phase::Compile);
    }

    #[test]
    fn reports_a_runtime_error() {
        let tracker = run_source("print(undefined_name);");
        assert_eq!(tracker.errors.len(), 1);
        assert_eq!(tracker.errors[0].phase, Phase::Runtime);
    }

    #[test]
    fn reuses_globals_across_calls_like_a_repl() {
        let mut vm = Vm::new();
        let mut tracker = ErrorsTracker::default();
        run("var counter = 1;", &mut vm, &mut tracker).unwrap();
        run("counter = counter + 1;", &mut vm, &mut tracker).unwrap();
        assert!(tracker.errors.is_empty());
    }
}
