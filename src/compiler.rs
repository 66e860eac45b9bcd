use super::chunk::{Chunk, Instruction, MAX_CONSTANTS};
use super::lexer::Lexer;
use super::reporter::{Phase, Report};
use super::token::{Token, TokenType, BOUNDARIES};
use super::value::{Function, Value};

/// clox reserves local slot 0 for the running closure itself; the spec
/// carries this forward (§4.2) since `Call` leaves the callee under its
/// arguments on the stack.
const MAX_LOCALS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assign,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assign,
            Assign => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

type ParseFn = fn(&mut Compiler, bool);

struct Rule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

/// The table a single-pass Pratt parser dispatches through. Grounded on
/// `original_source/src/tr_parser.c`'s `rules[]` array and on
/// `other_examples/.../rlox-compiler.rs`'s `get_rule()`/`rule!{}` macro —
/// the idiomatic Rust rendition of the same table-driven design.
fn get_rule(typ: TokenType) -> Rule {
    use Precedence::*;
    use TokenType::*;
    let (prefix, infix, precedence): (Option<ParseFn>, Option<ParseFn>, Precedence) = match typ {
        OParen => (Some(grouping), Some(call), Call),
        Minus => (Some(unary), Some(binary), Term),
        Plus => (None, Some(binary), Term),
        Slash => (None, Some(binary), Factor),
        Star => (None, Some(binary), Factor),
        Bang => (Some(unary), None, None),
        BangEqual => (None, Some(binary), Equality),
        EqualEqual => (None, Some(binary), Equality),
        Greater => (None, Some(binary), Comparison),
        GreaterEqual => (None, Some(binary), Comparison),
        Less => (None, Some(binary), Comparison),
        LessEqual => (None, Some(binary), Comparison),
        AmpAmp => (None, Some(and_), And),
        PipePipe => (None, Some(or_), Or),
        And => (None, Some(and_), And),
        Or => (None, Some(or_), Or),
        Identifier => (Some(variable), None, None),
        String => (Some(string), None, None),
        Int | Number => (Some(number), None, None),
        Nil | True | False => (Some(literal), None, None),
        _ => (None, None, None),
    };
    Rule {
        prefix,
        infix,
        precedence,
    }
}

struct Local {
    name: String,
    depth: Option<usize>,
    is_captured: bool,
}

struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

#[derive(PartialEq)]
enum FunctionType {
    Script,
    Function,
}

struct LoopContext {
    start: usize,
    break_jumps: Vec<usize>,
}

/// One nested function's compile-time bookkeeping: its own locals,
/// scope depth, and upvalue descriptor list. `Compiler` keeps a stack of
/// these so a function declaration can be compiled without ever
/// building an AST node to recurse into — the stack itself plays the
/// role a tree frame would. Grounded on the teacher's `CompilerState`,
/// adapted to the no-AST shape of `tr_parser.c`.
struct FunctionState {
    function: Function,
    function_type: FunctionType,
    locals: Vec<Local>,
    scope_depth: usize,
    upvalues: Vec<UpvalueDesc>,
    loops: Vec<LoopContext>,
}

impl FunctionState {
    fn new(name: Option<String>, function_type: FunctionType) -> Self {
        Self {
            function: Function::new(name, 0),
            function_type,
            locals: vec![Local {
                name: String::new(),
                depth: Some(0),
                is_captured: false,
            }],
            scope_depth: 0,
            upvalues: Vec::new(),
            loops: Vec::new(),
        }
    }
}

/// The single-pass compiler: lexing, parsing and bytecode emission all
/// happen in the same walk, with no intermediate syntax tree (spec
/// §4.2/§9). Grounded primarily on `original_source/src/tr_parser.c`
/// (the spec's true origin) for the overall shape, and on
/// `other_examples/.../rlox-compiler.rs` for idiomatic Rust structure
/// (`Parser`/`advance`/`consume`/`synchronize`, `parse_precedence`).
pub struct Compiler {
    lexer: Lexer,
    pre_previous: Token,
    previous: Token,
    current: Token,
    had_error: bool,
    panic_mode: bool,
    reports: Vec<Report>,
    states: Vec<FunctionState>,
}

impl Compiler {
    pub fn new(source: &str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            pre_previous: current.clone(),
            previous: current.clone(),
            current,
            had_error: false,
            panic_mode: false,
            reports: Vec::new(),
            states: vec![FunctionState::new(None, FunctionType::Script)],
        }
    }

    /// Compiles the whole program, returning the top-level script
    /// function on success, or the collected diagnostics on failure.
    pub fn compile(mut self) -> Result<Function, Vec<Report>> {
        self.advance();
        while !self.match_token(TokenType::Eof) {
            self.declaration();
        }
        self.emit_instr(Instruction::Nil);
        self.emit_instr(Instruction::Return);

        if self.had_error {
            Err(self.reports)
        } else {
            Ok(self.states.pop().unwrap().function)
        }
    }

    // -- token stream -----------------------------------------------------

    fn advance(&mut self) {
        self.pre_previous = self.previous.clone();
        self.previous = std::mem::replace(&mut self.current, self.lexer.next_token());
        while self.current.typ == TokenType::Error {
            let message = self.current.lexeme.clone();
            self.error_at_current(&message);
            self.current = self.lexer.next_token();
        }
    }

    fn check(&self, typ: TokenType) -> bool {
        self.current.typ == typ
    }

    fn match_token(&mut self, typ: TokenType) -> bool {
        if !self.check(typ) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, typ: TokenType, message: &str) {
        if self.check(typ) {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current.clone();
        self.error_at(&token, message);
    }

    fn error(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let detail = if token.typ == TokenType::Eof {
            format!("{message} at end")
        } else {
            format!("{message} at {token}")
        };
        self.reports
            .push(Report::new(Phase::Compile, detail, Some(token.line)));
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.typ != TokenType::Eof {
            if self.previous.typ == TokenType::Semicolon {
                return;
            }
            if BOUNDARIES.contains(&self.current.typ) {
                return;
            }
            self.advance();
        }
    }

    // -- chunk emission -----------------------------------------------------

    fn state(&self) -> &FunctionState {
        self.states.last().unwrap()
    }

    fn state_mut(&mut self) -> &mut FunctionState {
        self.states.last_mut().unwrap()
    }

    fn chunk_mut(&mut self) -> &mut Chunk {
        &mut self.state_mut().function.chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        self.chunk_mut().emit_byte(byte);
    }

    fn emit_instr(&mut self, instr: Instruction) {
        self.chunk_mut().emit_instr(instr);
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.add_constant(value);
        self.emit_instr(Instruction::Constant);
        self.emit_byte(index);
    }

    fn add_constant(&mut self, value: Value) -> u8 {
        let index = self.chunk_mut().add_constant(value);
        if index >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk");
            return 0;
        }
        index as u8
    }

    fn emit_jump(&mut self, instr: Instruction) -> usize {
        self.chunk_mut().emit_jump(instr)
    }

    fn patch_jump(&mut self, offset: usize) {
        if self.chunk_mut().patch_jump(offset).is_err() {
            self.error("Too much code to jump over");
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        if self.chunk_mut().emit_loop(loop_start).is_err() {
            self.error("Loop body too large");
        }
    }

    // -- expressions -----------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assign);
    }

    fn parse_precedence(&mut self, min_prec: Precedence) {
        self.advance();
        let prefix = get_rule(self.previous.typ).prefix;
        let prefix = match prefix {
            Some(rule) => rule,
            None => {
                self.error("Expected expression");
                return;
            }
        };
        let can_assign = min_prec <= Precedence::Assign;
        prefix(self, can_assign);

        while min_prec <= get_rule(self.current.typ).precedence {
            self.advance();
            let infix = get_rule(self.previous.typ).infix.unwrap();
            infix(self, can_assign);
        }

        if can_assign && self.match_token(TokenType::Equal) {
            self.error("Invalid assignment target");
        }
    }

    fn identifier_constant(&mut self, name: &Token) -> u8 {
        self.add_constant(Value::new_string(name.lexeme.clone()))
    }

    fn resolve_local(&mut self, depth: usize, name: &str) -> Option<usize> {
        let mut found = None;
        let mut uninitialized = false;
        for (i, local) in self.states[depth].locals.iter().enumerate().rev() {
            if local.name == name {
                uninitialized = local.depth.is_none();
                found = Some(i);
                break;
            }
        }
        if uninitialized {
            self.error("Can't read local variable in its own initializer");
        }
        found
    }

    fn resolve_upvalue(&mut self, depth: usize, name: &str) -> Option<usize> {
        if depth == 0 {
            return None;
        }
        let enclosing = depth - 1;
        if let Some(local) = self.resolve_local(enclosing, name) {
            self.states[enclosing].locals[local].is_captured = true;
            return Some(self.add_upvalue(depth, local as u8, true));
        }
        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(depth, upvalue as u8, false));
        }
        None
    }

    fn add_upvalue(&mut self, depth: usize, index: u8, is_local: bool) -> usize {
        for (i, up) in self.states[depth].upvalues.iter().enumerate() {
            if up.index == index && up.is_local == is_local {
                return i;
            }
        }
        if self.states[depth].upvalues.len() >= 256 {
            self.error("Too many closure variables in one function");
            return 0;
        }
        let state = &mut self.states[depth];
        state.upvalues.push(UpvalueDesc { index, is_local });
        state.function.upvalue_count = state.upvalues.len();
        state.upvalues.len() - 1
    }

    fn named_variable(&mut self, name: Token, can_assign: bool) {
        let depth = self.states.len() - 1;
        let (get_op, set_op, operand) = if let Some(slot) = self.resolve_local(depth, &name.lexeme)
        {
            (Instruction::GetLocal, Instruction::SetLocal, slot as u8)
        } else if let Some(slot) = self.resolve_upvalue(depth, &name.lexeme) {
            (
                Instruction::GetUpvalue,
                Instruction::SetUpvalue,
                slot as u8,
            )
        } else {
            let slot = self.identifier_constant(&name);
            (Instruction::GetGlobal, Instruction::SetGlobal, slot)
        };

        if can_assign && self.match_token(TokenType::Equal) {
            self.expression();
            self.emit_instr(set_op);
        } else {
            self.emit_instr(get_op);
        }
        self.emit_byte(operand);
    }

    fn arg_list(&mut self) -> u8 {
        let mut count: usize = 0;
        if !self.check(TokenType::CParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments");
                }
                count += 1;
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::CParen, "Expected ')' after arguments");
        count as u8
    }

    // -- declarations and statements -----------------------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenType::Var) {
            self.var_declaration();
        } else if self.match_token(TokenType::Function) {
            self.function_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenType::Identifier, message);
        self.declare_variable();
        if self.state().scope_depth > 0 {
            return 0;
        }
        let name = self.previous.clone();
        self.identifier_constant(&name)
    }

    fn declare_variable(&mut self) {
        if self.state().scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme.clone();
        let scope_depth = self.state().scope_depth;
        let mut duplicate = false;
        for local in self.state().locals.iter().rev() {
            if local.depth.is_some() && local.depth.unwrap() < scope_depth {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope");
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: String) {
        if self.state().locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function");
            return;
        }
        self.state_mut().locals.push(Local {
            name,
            depth: None,
            is_captured: false,
        });
    }

    fn mark_initialized(&mut self) {
        if self.state().scope_depth == 0 {
            return;
        }
        let depth = self.state().scope_depth;
        let locals = &mut self.state_mut().locals;
        let last = locals.len() - 1;
        locals[last].depth = Some(depth);
    }

    fn define_variable(&mut self, global: u8) {
        if self.state().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_instr(Instruction::DefineGlobal);
        self.emit_byte(global);
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expected variable name");
        if self.match_token(TokenType::Equal) {
            self.expression();
        } else {
            self.emit_instr(Instruction::Nil);
        }
        self.consume(
            TokenType::Semicolon,
            "Expected ';' after variable declaration",
        );
        self.define_variable(global);
    }

    fn function_declaration(&mut self) {
        let global = self.parse_variable("Expected function name");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn function(&mut self, function_type: FunctionType) {
        let name = self.previous.lexeme.clone();
        self.states
            .push(FunctionState::new(Some(name), function_type));
        self.begin_scope();

        self.consume(TokenType::OParen, "Expected '(' after function name");
        if !self.check(TokenType::CParen) {
            loop {
                let arity = self.state().function.arity;
                if arity == 255 {
                    self.error_at_current("Can't have more than 255 parameters");
                }
                self.state_mut().function.arity = arity + 1;
                let param = self.parse_variable("Expected parameter name");
                self.define_variable(param);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::CParen, "Expected ')' after parameters");
        self.consume(TokenType::OBrace, "Expected '{' before function body");
        self.block();

        self.emit_instr(Instruction::Nil);
        self.emit_instr(Instruction::Return);

        let finished = self.states.pop().unwrap();
        let const_index = self.add_constant(Value::new_function(finished.function));
        self.emit_instr(Instruction::Closure);
        self.emit_byte(const_index);
        for upvalue in finished.upvalues {
            self.emit_byte(upvalue.is_local as u8);
            self.emit_byte(upvalue.index);
        }
    }

    fn begin_scope(&mut self) {
        self.state_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.state_mut().scope_depth -= 1;
        let depth = self.state().scope_depth;
        loop {
            let should_pop = match self.state().locals.last() {
                Some(local) => local.depth.map(|d| d > depth).unwrap_or(false),
                None => false,
            };
            if !should_pop {
                break;
            }
            let is_captured = self.state().locals.last().unwrap().is_captured;
            if is_captured {
                self.emit_instr(Instruction::CloseUpvalue);
            } else {
                self.emit_instr(Instruction::Pop);
            }
            self.state_mut().locals.pop();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenType::CBrace) && !self.check(TokenType::Eof) {
            self.declaration();
        }
        self.consume(TokenType::CBrace, "Expected '}' after block");
    }

    fn statement(&mut self) {
        if self.match_token(TokenType::If) {
            self.if_statement();
        } else if self.match_token(TokenType::While) {
            self.while_statement();
        } else if self.match_token(TokenType::For) {
            self.for_statement();
        } else if self.match_token(TokenType::OBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else if self.match_token(TokenType::Return) {
            self.return_statement();
        } else if self.match_token(TokenType::Break) {
            self.break_statement();
        } else {
            self.expression_statement();
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::OParen, "Expected '(' after 'if'");
        self.expression();
        self.consume(TokenType::CParen, "Expected ')' after condition");

        let then_jump = self.emit_jump(Instruction::JumpIfFalse);
        self.emit_instr(Instruction::Pop);
        self.statement();
        let else_jump = self.emit_jump(Instruction::Jump);

        self.patch_jump(then_jump);
        self.emit_instr(Instruction::Pop);
        if self.match_token(TokenType::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk_mut().len();
        self.consume(TokenType::OParen, "Expected '(' after 'while'");
        self.expression();
        self.consume(TokenType::CParen, "Expected ')' after condition");

        let exit_jump = self.emit_jump(Instruction::JumpIfFalse);
        self.emit_instr(Instruction::Pop);

        self.state_mut().loops.push(LoopContext {
            start: loop_start,
            break_jumps: Vec::new(),
        });
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_instr(Instruction::Pop);
        self.end_loop();
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::OParen, "Expected '(' after 'for'");
        if self.match_token(TokenType::Semicolon) {
            // no initializer
        } else if self.match_token(TokenType::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk_mut().len();
        let mut exit_jump = None;
        if !self.match_token(TokenType::Semicolon) {
            self.expression();
            self.consume(TokenType::Semicolon, "Expected ';' after loop condition");
            exit_jump = Some(self.emit_jump(Instruction::JumpIfFalse));
            self.emit_instr(Instruction::Pop);
        }

        if !self.check(TokenType::CParen) {
            let body_jump = self.emit_jump(Instruction::Jump);
            let increment_start = self.chunk_mut().len();
            self.expression();
            self.emit_instr(Instruction::Pop);
            self.consume(TokenType::CParen, "Expected ')' after for clauses");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        } else {
            self.consume(TokenType::CParen, "Expected ')' after for clauses");
        }

        self.state_mut().loops.push(LoopContext {
            start: loop_start,
            break_jumps: Vec::new(),
        });
        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_instr(Instruction::Pop);
        }
        self.end_loop();
        self.end_scope();
    }

    fn end_loop(&mut self) {
        let loop_ctx = self.state_mut().loops.pop().unwrap();
        for jump in loop_ctx.break_jumps {
            self.patch_jump(jump);
        }
    }

    fn return_statement(&mut self) {
        if self.state().function_type == FunctionType::Script {
            self.error("Can't return from top-level code");
        }
        if self.match_token(TokenType::Semicolon) {
            self.emit_instr(Instruction::Nil);
            self.emit_instr(Instruction::Return);
        } else {
            self.expression();
            self.consume(TokenType::Semicolon, "Expected ';' after return value");
            self.emit_instr(Instruction::Return);
        }
    }

    fn break_statement(&mut self) {
        self.consume(TokenType::Semicolon, "Expected ';' after 'break'");
        if self.state().loops.is_empty() {
            self.error("Can't use 'break' outside of a loop");
            return;
        }
        let jump = self.emit_jump(Instruction::Jump);
        self.state_mut().loops.last_mut().unwrap().break_jumps.push(jump);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semicolon, "Expected ';' after expression");
        self.emit_instr(Instruction::Pop);
    }
}

// -- prefix/infix parse handlers -----------------------------------------------------
//
// Dispatch between integer and floating-point arithmetic opcodes is
// decided here, syntactically, the same way `tr_parser.c`'s `binary()`
// does it (`tr_parser.c:121,125`): `floating = previous == TOKEN_NUMBER
// || left_hand == TOKEN_NUMBER`, defaulting to integer otherwise.
// `left_hand` is the token ending the LHS (our `pre_previous`, captured
// before the RHS parse); `previous` is the token ending the RHS. Neither
// is real type inference — a decimal literal on either side floats the
// op, everything else (identifiers, calls) stays integer.

fn number(compiler: &mut Compiler, _can_assign: bool) {
    let token = compiler.previous.clone();
    if token.typ == TokenType::Int {
        match token.lexeme.parse::<i64>() {
            Ok(n) => compiler.emit_constant(Value::Int(n)),
            Err(_) => compiler.error("Integer literal out of range"),
        }
    } else {
        match token.lexeme.parse::<f64>() {
            Ok(n) => compiler.emit_constant(Value::Double(n)),
            Err(_) => compiler.error("Invalid number literal"),
        }
    }
}

fn string(compiler: &mut Compiler, _can_assign: bool) {
    let lexeme = &compiler.previous.lexeme;
    let inner = &lexeme[1..lexeme.len() - 1];
    let mut text = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('"') => text.push('"'),
                Some('\\') => text.push('\\'),
                Some(other) => text.push(other),
                None => {}
            }
        } else {
            text.push(c);
        }
    }
    compiler.emit_constant(Value::new_string(text));
}

fn literal(compiler: &mut Compiler, _can_assign: bool) {
    match compiler.previous.typ {
        TokenType::Nil => compiler.emit_instr(Instruction::Nil),
        TokenType::True => compiler.emit_instr(Instruction::True),
        TokenType::False => compiler.emit_instr(Instruction::False),
        _ => unreachable!(),
    }
}

fn grouping(compiler: &mut Compiler, _can_assign: bool) {
    compiler.expression();
    compiler.consume(TokenType::CParen, "Expected ')' after expression");
}

fn unary(compiler: &mut Compiler, _can_assign: bool) {
    let operator = compiler.previous.typ;
    compiler.parse_precedence(Precedence::Unary);
    match operator {
        TokenType::Minus => compiler.emit_instr(Instruction::Negate),
        TokenType::Bang => compiler.emit_instr(Instruction::Not),
        _ => unreachable!(),
    }
}

fn binary(compiler: &mut Compiler, _can_assign: bool) {
    let operator = compiler.previous.typ;
    // `left_hand` is the token that ended the LHS, captured before the RHS
    // parse below overwrites `pre_previous`/`previous` again.
    let left_hand = compiler.pre_previous.typ;
    let rule_precedence = get_rule(operator).precedence;
    compiler.parse_precedence(rule_precedence.next());

    // Mirrors `tr_parser.c`'s `floating = previous == TOKEN_NUMBER ||
    // left_hand == TOKEN_NUMBER`, default integer: either operand's
    // nearest token being a decimal literal is enough to float the op.
    let floating = compiler.previous.typ == TokenType::Number || left_hand == TokenType::Number;
    let is_int = !floating;
    let instr = match operator {
        TokenType::Plus => {
            if is_int {
                Instruction::IAdd
            } else {
                Instruction::FAdd
            }
        }
        TokenType::Minus => {
            if is_int {
                Instruction::ISub
            } else {
                Instruction::FSub
            }
        }
        TokenType::Star => {
            if is_int {
                Instruction::IMul
            } else {
                Instruction::FMul
            }
        }
        TokenType::Slash => {
            if is_int {
                Instruction::IDiv
            } else {
                Instruction::FDiv
            }
        }
        TokenType::EqualEqual => Instruction::Equal,
        TokenType::BangEqual => Instruction::NotEqual,
        TokenType::Greater => Instruction::Greater,
        TokenType::GreaterEqual => Instruction::GreaterEqual,
        TokenType::Less => Instruction::Less,
        TokenType::LessEqual => Instruction::LessEqual,
        _ => unreachable!(),
    };
    compiler.emit_instr(instr);
}

fn and_(compiler: &mut Compiler, _can_assign: bool) {
    let end_jump = compiler.emit_jump(Instruction::JumpIfFalse);
    compiler.emit_instr(Instruction::Pop);
    compiler.parse_precedence(Precedence::And);
    compiler.patch_jump(end_jump);
}

fn or_(compiler: &mut Compiler, _can_assign: bool) {
    let else_jump = compiler.emit_jump(Instruction::JumpIfFalse);
    let end_jump = compiler.emit_jump(Instruction::Jump);
    compiler.patch_jump(else_jump);
    compiler.emit_instr(Instruction::Pop);
    compiler.parse_precedence(Precedence::Or);
    compiler.patch_jump(end_jump);
}

fn variable(compiler: &mut Compiler, can_assign: bool) {
    let name = compiler.previous.clone();
    compiler.named_variable(name, can_assign);
}

fn call(compiler: &mut Compiler, _can_assign: bool) {
    let argc = compiler.arg_list();
    compiler.emit_instr(Instruction::Call);
    compiler.emit_byte(argc);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> Function {
        Compiler::new(source).compile().expect("expected compile to succeed")
    }

    fn compile_err(source: &str) -> Vec<Report> {
        Compiler::new(source)
            .compile()
            .expect_err("expected compile to fail")
    }

    #[test]
    fn compiles_arithmetic_precedence() {
        compile_ok("var x = 1 + 2 * 3;");
    }

    #[test]
    fn rejects_assignment_to_non_lvalue() {
        let reports = compile_err("1 + 2 = 3;");
        assert!(!reports.is_empty());
    }

    #[test]
    fn rejects_return_outside_function() {
        let reports = compile_err("return 1;");
        assert!(reports.iter().any(|r| r.message.contains("top-level")));
    }

    #[test]
    fn rejects_break_outside_loop() {
        let reports = compile_err("break;");
        assert!(reports.iter().any(|r| r.message.contains("break")));
    }

    #[test]
    fn accepts_255_parameters_rejects_256() {
        let params: Vec<String> = (0..255).map(|i| format!("p{i}")).collect();
        let source = format!("fn f({}) {{ return 0; }}", params.join(", "));
        compile_ok(&source);

        let params: Vec<String> = (0..256).map(|i| format!("p{i}")).collect();
        let source = format!("fn f({}) {{ return 0; }}", params.join(", "));
        let reports = compile_err(&source);
        assert!(reports.iter().any(|r| r.message.contains("255 parameters")));
    }

    #[test]
    fn compiles_closures_over_locals() {
        compile_ok(
            "fn make_counter() {\n\
               var count = 0;\n\
               fn increment() {\n\
                 count = count + 1;\n\
                 return count;\n\
               }\n\
               return increment;\n\
             }",
        );
    }
}
