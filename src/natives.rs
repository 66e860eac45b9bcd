use super::table::Table;
use super::value::{InternedStr, Value};
use super::vm::Vm;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Native functions available to every script without an explicit
/// import. Grounded on the teacher's `pub const NATIVES: [(&str,
/// Native); N]` registration array (`natives.rs`); trimmed to the two
/// the spec names (§10.6) — no `io`/`fs`/`string` natives, those belong
/// to a broader stdlib the spec places out of scope.
pub const NATIVES: &[(&str, super::value::NativeFn)] = &[("print", print), ("clock", clock)];

pub fn install_natives(globals: &mut Table) {
    for (name, native) in NATIVES {
        globals.insert(
            Rc::new(InternedStr::new((*name).to_string())),
            Value::NativeFn(*native),
        );
    }
}

fn print(vm: &Vm, argc: usize, argv: &[Value]) -> Result<Value, String> {
    if argc != 1 {
        return Err(format!("print expects 1 argument but got {argc}"));
    }
    let line = argv[0].to_string();
    println!("{line}");
    vm.record_output(line);
    Ok(Value::Int(0))
}

fn clock(_vm: &Vm, argc: usize, _argv: &[Value]) -> Result<Value, String> {
    if argc != 0 {
        return Err(format!("clock expects 0 arguments but got {argc}"));
    }
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| "system clock is before the Unix epoch".to_string())?;
    Ok(Value::Double(elapsed.as_secs_f64()))
}
