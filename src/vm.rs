use super::chunk::Instruction;
use super::natives::install_natives;
use super::reporter::{Phase, Report, Reporter};
use super::table::Table;
use super::value::{Closure, Object, Upvalue, Value};
use std::cell::RefCell;
use std::convert::TryFrom;
use std::rc::Rc;

/// `FRAMES_MAX * 256` stack slots, matching `STACK_MAX` in
/// `original_source/src/tr_vm.h` (`FRAMES_MAX * (UINT8_MAX + 1)`).
pub const FRAMES_MAX: usize = 256;
pub const STACK_MAX: usize = FRAMES_MAX * 256;

struct Frame {
    closure: Rc<Closure>,
    ip: usize,
    slots_base: usize,
}

/// The bytecode interpreter: a fixed-size value stack, a bounded call
/// stack of `Frame`s, and a globals table. Grounded on the teacher's
/// `قتام/src/vm.rs` for the frame/call-stack shape, and on
/// `original_source/src/tr_vm.c`'s dispatch loop (particularly its
/// `IBINARY_OP`/`FBINARY_OP` pop order) for opcode semantics. Globals use
/// the custom open-addressing `Table` (spec §4.5) rather than the
/// teacher's `std::collections::HashMap`.
pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    globals: Table,
    open_upvalues: Vec<(usize, Rc<RefCell<Upvalue>>)>,
    output: RefCell<Vec<String>>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        let mut globals = Table::new();
        install_natives(&mut globals);
        Self {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(64),
            globals,
            open_upvalues: Vec::new(),
            output: RefCell::new(Vec::new()),
        }
    }

    /// Records a line printed by the `print` native so callers (tests, an
    /// embedding host) can inspect it after the fact. Takes `&self` since
    /// natives only ever see an immutable `Vm`.
    pub fn record_output(&self, line: String) {
        self.output.borrow_mut().push(line);
    }

    /// Every line recorded by `print` so far, oldest first.
    pub fn output(&self) -> Vec<String> {
        self.output.borrow().clone()
    }

    fn push(&mut self, value: Value) -> Result<(), String> {
        if self.stack.len() >= STACK_MAX {
            return Err("Stack Overflow".to_string());
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow: compiler bug")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    fn frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    fn capture_upvalue(&mut self, slot: usize) -> Rc<RefCell<Upvalue>> {
        if let Some((_, cell)) = self.open_upvalues.iter().find(|(s, _)| *s == slot) {
            return cell.clone();
        }
        let cell = Rc::new(RefCell::new(Upvalue::Open(slot)));
        self.open_upvalues.push((slot, cell.clone()));
        cell
    }

    fn close_upvalues_from(&mut self, boundary: usize) {
        let stack = &self.stack;
        self.open_upvalues.retain(|(slot, cell)| {
            if *slot >= boundary {
                cell.borrow_mut().close(stack[*slot].clone());
                false
            } else {
                true
            }
        });
    }

    fn call_value(&mut self, callee: Value, argc: usize) -> Result<(), String> {
        match callee {
            Value::NativeFn(native) => {
                let base = self.stack.len() - argc;
                let result = native(self, argc, &self.stack[base..])?;
                self.stack.truncate(base - 1);
                self.push(result)
            }
            Value::Obj(Object::Closure(closure)) => {
                if argc != closure.function.arity as usize {
                    return Err(format!(
                        "Expected {} arguments but got {argc}",
                        closure.function.arity
                    ));
                }
                if self.frames.len() >= FRAMES_MAX {
                    return Err("Stack Overflow".to_string());
                }
                let slots_base = self.stack.len() - argc - 1;
                self.frames.push(Frame {
                    closure,
                    ip: 0,
                    slots_base,
                });
                Ok(())
            }
            other => Err(format!("Can only call functions, found {}", other.type_name())),
        }
    }

    /// Runs `closure` (the top-level script, arity 0, no captured
    /// upvalues) to completion, reporting diagnostics to `reporter`.
    pub fn interpret(
        &mut self,
        closure: Rc<Closure>,
        reporter: &mut dyn Reporter,
    ) -> Result<(), ()> {
        self.stack.push(Value::Obj(Object::Closure(closure.clone())));
        self.frames.push(Frame {
            closure,
            ip: 0,
            slots_base: 0,
        });

        match self.run() {
            Ok(()) => Ok(()),
            Err(message) => {
                reporter.error(Report::new(Phase::Runtime, message, None));
                self.stack.clear();
                self.frames.clear();
                self.open_upvalues.clear();
                Err(())
            }
        }
    }

    fn run(&mut self) -> Result<(), String> {
        loop {
            let instr = {
                let frame = self.frame();
                let byte = frame.closure.function.chunk.byte(frame.ip);
                Instruction::try_from(byte).expect("compiler emitted an invalid opcode")
            };
            self.frame_mut().ip += 1;

            match instr {
                Instruction::Nil => self.push(Value::Nil)?,
                Instruction::True => self.push(Value::Bool(true))?,
                Instruction::False => self.push(Value::Bool(false))?,
                Instruction::Constant => {
                    let index = self.read_byte() as usize;
                    let value = self.frame().closure.function.chunk.constant(index).clone();
                    self.push(value)?;
                }
                Instruction::Pop => {
                    self.pop();
                }
                Instruction::Negate => {
                    let value = self.pop();
                    let negated = match value {
                        Value::Int(n) => Value::Int(-n),
                        Value::Double(n) => Value::Double(-n),
                        other => return Err(format!("Cannot negate a {}", other.type_name())),
                    };
                    self.push(negated)?;
                }
                Instruction::Not => {
                    let value = self.pop();
                    if !matches!(value, Value::Bool(_) | Value::Int(_)) {
                        return Err(format!("Cannot apply 'not' to a {}", value.type_name()));
                    }
                    self.push(Value::Bool(value.is_falsey()))?;
                }
                Instruction::IAdd | Instruction::ISub | Instruction::IMul | Instruction::IDiv => {
                    self.int_binary_op(instr)?;
                }
                Instruction::FAdd | Instruction::FSub | Instruction::FMul | Instruction::FDiv => {
                    self.float_binary_op(instr)?;
                }
                Instruction::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b))?;
                }
                Instruction::NotEqual => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a != b))?;
                }
                Instruction::Greater
                | Instruction::GreaterEqual
                | Instruction::Less
                | Instruction::LessEqual => {
                    self.comparison_op(instr)?;
                }
                Instruction::DefineGlobal => {
                    let name = self.read_string_constant();
                    let value = self.pop();
                    self.globals.insert(name, value);
                }
                Instruction::GetGlobal => {
                    let name = self.read_string_constant();
                    match self.globals.get(&name) {
                        Some(value) => {
                            let value = value.clone();
                            self.push(value)?;
                        }
                        None => return Err(format!("Undefined variable '{}'", name.text)),
                    }
                }
                Instruction::SetGlobal => {
                    let name = self.read_string_constant();
                    if self.globals.get(&name).is_none() {
                        return Err(format!("Undefined variable '{}'", name.text));
                    }
                    let value = self.peek(0).clone();
                    self.globals.insert(name, value);
                }
                Instruction::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots_base;
                    let value = self.stack[base + slot].clone();
                    self.push(value)?;
                }
                Instruction::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slots_base;
                    self.stack[base + slot] = self.peek(0).clone();
                }
                Instruction::GetUpvalue => {
                    let index = self.read_byte() as usize;
                    let cell = self.frame().closure.upvalues[index].clone();
                    let value = match &*cell.borrow() {
                        Upvalue::Open(slot) => self.stack[*slot].clone(),
                        Upvalue::Closed(value) => value.clone(),
                    };
                    self.push(value)?;
                }
                Instruction::SetUpvalue => {
                    let index = self.read_byte() as usize;
                    let value = self.peek(0).clone();
                    let cell = self.frame().closure.upvalues[index].clone();
                    let slot = cell.borrow().open_slot();
                    match slot {
                        Some(slot) => self.stack[slot] = value,
                        None => *cell.borrow_mut() = Upvalue::Closed(value),
                    }
                }
                Instruction::CloseUpvalue => {
                    let boundary = self.stack.len() - 1;
                    self.close_upvalues_from(boundary);
                    self.pop();
                }
                Instruction::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip += offset;
                }
                Instruction::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                Instruction::Loop => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip -= offset;
                }
                Instruction::Call => {
                    let argc = self.read_byte() as usize;
                    let callee = self.peek(argc).clone();
                    self.call_value(callee, argc)?;
                }
                Instruction::Closure => {
                    let index = self.read_byte() as usize;
                    let function = match self.frame().closure.function.chunk.constant(index) {
                        Value::Obj(Object::Function(f)) => f.clone(),
                        _ => unreachable!("CLOSURE operand must index a Function constant"),
                    };
                    let mut upvalues = Vec::with_capacity(function.upvalue_count);
                    for _ in 0..function.upvalue_count {
                        let is_local = self.read_byte() != 0;
                        let index = self.read_byte() as usize;
                        let cell = if is_local {
                            let slot = self.frame().slots_base + index;
                            self.capture_upvalue(slot)
                        } else {
                            self.frame().closure.upvalues[index].clone()
                        };
                        upvalues.push(cell);
                    }
                    self.push(Value::new_closure(function, upvalues))?;
                }
                Instruction::Return => {
                    let result = self.pop();
                    let boundary = self.frame().slots_base;
                    self.close_upvalues_from(boundary);
                    self.stack.truncate(boundary);
                    self.frames.pop();
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                    self.push(result)?;
                }
            }
        }
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frame_mut();
        let byte = frame.closure.function.chunk.byte(frame.ip);
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let frame = self.frame_mut();
        let value = frame.closure.function.chunk.read_u16(frame.ip);
        frame.ip += 2;
        value
    }

    fn read_string_constant(&mut self) -> Rc<super::value::InternedStr> {
        let index = self.read_byte() as usize;
        match self.frame().closure.function.chunk.constant(index) {
            Value::Str(s) => s.clone(),
            _ => unreachable!("global name operand must index a Str constant"),
        }
    }

    fn int_binary_op(&mut self, instr: Instruction) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        let (a, b) = match (a, b) {
            (Value::Int(a), Value::Int(b)) => (a, b),
            (a, b) => {
                return Err(format!(
                    "Operands must be integers, found {} and {}",
                    a.type_name(),
                    b.type_name()
                ))
            }
        };
        let result = match instr {
            Instruction::IAdd => a.wrapping_add(b),
            Instruction::ISub => a.wrapping_sub(b),
            Instruction::IMul => a.wrapping_mul(b),
            Instruction::IDiv => {
                if b == 0 {
                    return Err("Division by zero".to_string());
                }
                a.wrapping_div(b)
            }
            _ => unreachable!(),
        };
        self.push(Value::Int(result))
    }

    fn float_binary_op(&mut self, instr: Instruction) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        let (a, b) = match (a, b) {
            (Value::Double(a), Value::Double(b)) => (a, b),
            (a, b) => {
                return Err(format!(
                    "Operands must be doubles, found {} and {}",
                    a.type_name(),
                    b.type_name()
                ))
            }
        };
        let result = match instr {
            Instruction::FAdd => a + b,
            Instruction::FSub => a - b,
            Instruction::FMul => a * b,
            Instruction::FDiv => a / b,
            _ => unreachable!(),
        };
        self.push(Value::Double(result))
    }

    fn comparison_op(&mut self, instr: Instruction) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        let ordering = match (&a, &b) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            _ => {
                return Err(format!(
                    "Cannot compare {} and {}",
                    a.type_name(),
                    b.type_name()
                ))
            }
        };
        let ordering = ordering.ok_or("Cannot compare NaN")?;
        let result = match instr {
            Instruction::Greater => ordering.is_gt(),
            Instruction::GreaterEqual => ordering.is_ge(),
            Instruction::Less => ordering.is_lt(),
            Instruction::LessEqual => ordering.is_le(),
            _ => unreachable!(),
        };
        self.push(Value::Bool(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Instruction as I;
    use crate::reporter::StderrReporter;
    use crate::value::Function;

    fn script(build: impl FnOnce(&mut crate::chunk::Chunk)) -> Rc<Closure> {
        let mut function = Function::new(None, 0);
        build(&mut function.chunk);
        Rc::new(Closure::new(Rc::new(function), Vec::new()))
    }

    #[test]
    fn arithmetic_pops_right_operand_first() {
        // 10 - 3 must yield 7, not -7; this only holds if the second
        // pop is treated as the right-hand operand.
        let closure = script(|chunk| {
            let a = chunk.add_constant(Value::Int(10));
            let b = chunk.add_constant(Value::Int(3));
            chunk.emit_instr(I::Constant);
            chunk.emit_byte(a as u8);
            chunk.emit_instr(I::Constant);
            chunk.emit_byte(b as u8);
            chunk.emit_instr(I::ISub);
            chunk.emit_instr(I::Return);
        });
        let mut vm = Vm::new();
        let mut reporter = StderrReporter;
        vm.interpret(closure, &mut reporter).unwrap();
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        let closure = script(|chunk| {
            let a = chunk.add_constant(Value::Int(1));
            let b = chunk.add_constant(Value::Int(0));
            chunk.emit_instr(I::Constant);
            chunk.emit_byte(a as u8);
            chunk.emit_instr(I::Constant);
            chunk.emit_byte(b as u8);
            chunk.emit_instr(I::IDiv);
            chunk.emit_instr(I::Return);
        });
        let mut vm = Vm::new();
        let mut reporter = StderrReporter;
        assert!(vm.interpret(closure, &mut reporter).is_err());
    }

    #[test]
    fn undefined_global_read_is_runtime_error() {
        let closure = script(|chunk| {
            let name = chunk.add_constant(Value::new_string("missing".to_string()));
            chunk.emit_instr(I::GetGlobal);
            chunk.emit_byte(name as u8);
            chunk.emit_instr(I::Return);
        });
        let mut vm = Vm::new();
        let mut reporter = StderrReporter;
        assert!(vm.interpret(closure, &mut reporter).is_err());
    }
}
