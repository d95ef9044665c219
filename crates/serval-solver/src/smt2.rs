//! SMT-LIB 2 conversion.
//!
//! Renders a trace equation over `QF_AUFBV` (or `QF_AUFBVFP` with fpa):
//! a preamble comment, the logic, one `declare-fun` per SSA symbol, one
//! `assert` per assignment and assumption, then one `(push 1)`-scoped
//! `check-sat` per negated assertion. The result goes to a file, stdout, or
//! a spawned solver process that is queried interactively.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use indexmap::IndexMap;
use serval_ir::expr::{BinaryOp, Expr, ExprKind, QuantifierKind, UnaryOp, WithDesignator};
use serval_ir::types::{Type, POINTER_WIDTH};
use serval_symex::{Equation, StepKind};
use tracing::debug;

use crate::config::SmtSolverFamily;
use crate::procedure::{DecisionProcedure, DecisionResult, SolveError};

pub fn logic_name(fpa: bool) -> &'static str {
    if fpa {
        "QF_AUFBVFP"
    } else {
        "QF_AUFBV"
    }
}

/// SMT-LIB sort of a type. Aggregates other than top-level arrays flatten
/// to bit-vectors.
pub fn sort_to_smt2(typ: &Type) -> String {
    match typ {
        Type::Bool => "Bool".to_string(),
        Type::Signed(w) | Type::Unsigned(w) => format!("(_ BitVec {w})"),
        Type::Pointer(_) => format!("(_ BitVec {POINTER_WIDTH})"),
        Type::Array { element, .. } => format!(
            "(Array (_ BitVec {POINTER_WIDTH}) (_ BitVec {}))",
            element.flattened_width()
        ),
        Type::Struct { .. } => format!("(_ BitVec {})", typ.flattened_width()),
        Type::Unit => "(_ BitVec 1)".to_string(),
    }
}

fn bv_literal(value: i128, width: u64) -> String {
    let mask = if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    };
    format!("(_ bv{} {width})", (value as u128) & mask)
}

fn quoted(name: &str) -> String {
    format!("|{name}|")
}

/// Cast an index expression to the array index width.
fn index_to_smt2(index: &Expr) -> Result<String, SolveError> {
    let printed = expr_to_smt2(index)?;
    let width = index.typ.flattened_width();
    let pointer_width = u64::from(POINTER_WIDTH);
    if width == pointer_width {
        Ok(printed)
    } else if width < pointer_width {
        Ok(format!(
            "((_ zero_extend {}) {printed})",
            pointer_width - width
        ))
    } else {
        Ok(format!(
            "((_ extract {} 0) {printed})",
            pointer_width - 1
        ))
    }
}

/// Splice `value` into `base` at bit `offset`, concat-style.
fn splice(
    base: &str,
    base_width: u64,
    offset: u64,
    value: &str,
    value_width: u64,
) -> Result<String, SolveError> {
    if offset + value_width > base_width {
        return Err(SolveError::Unsupported(
            "update past the end of the object".to_string(),
        ));
    }
    let mut parts = Vec::new();
    if offset + value_width < base_width {
        parts.push(format!(
            "((_ extract {} {}) {base})",
            base_width - 1,
            offset + value_width
        ));
    }
    parts.push(value.to_string());
    if offset > 0 {
        parts.push(format!("((_ extract {} 0) {base})", offset - 1));
    }
    if parts.len() == 1 {
        Ok(parts.pop().expect("one part"))
    } else {
        Ok(format!("(concat {})", parts.join(" ")))
    }
}

pub fn expr_to_smt2(expr: &Expr) -> Result<String, SolveError> {
    match &expr.kind {
        ExprKind::Symbol(symbol) => Ok(quoted(&symbol.full_name())),

        ExprKind::BoolConstant(b) => Ok(if *b { "true" } else { "false" }.to_string()),

        ExprKind::IntConstant(value) => Ok(bv_literal(*value, expr.typ.flattened_width())),

        ExprKind::Unary { op, operand } => {
            let operand = expr_to_smt2(operand)?;
            Ok(match op {
                UnaryOp::Not => format!("(not {operand})"),
                UnaryOp::Neg => format!("(bvneg {operand})"),
                UnaryOp::BitNot => format!("(bvnot {operand})"),
            })
        }

        ExprKind::Binary { op, lhs, rhs } => {
            let signed = lhs.typ.is_signed();
            let l = expr_to_smt2(lhs)?;
            let r = expr_to_smt2(rhs)?;
            let operator = match op {
                BinaryOp::And => "and",
                BinaryOp::Or => "or",
                BinaryOp::Implies => "=>",
                BinaryOp::Eq => "=",
                BinaryOp::NotEq => return Ok(format!("(not (= {l} {r}))")),
                BinaryOp::Lt => {
                    if signed {
                        "bvslt"
                    } else {
                        "bvult"
                    }
                }
                BinaryOp::Le => {
                    if signed {
                        "bvsle"
                    } else {
                        "bvule"
                    }
                }
                BinaryOp::Gt => {
                    if signed {
                        "bvsgt"
                    } else {
                        "bvugt"
                    }
                }
                BinaryOp::Ge => {
                    if signed {
                        "bvsge"
                    } else {
                        "bvuge"
                    }
                }
                BinaryOp::Add => "bvadd",
                BinaryOp::Sub => "bvsub",
                BinaryOp::Mul => "bvmul",
                BinaryOp::Div => {
                    if signed {
                        "bvsdiv"
                    } else {
                        "bvudiv"
                    }
                }
                BinaryOp::Rem => {
                    if signed {
                        "bvsrem"
                    } else {
                        "bvurem"
                    }
                }
                BinaryOp::BitAnd => "bvand",
                BinaryOp::BitOr => "bvor",
                BinaryOp::BitXor => "bvxor",
                BinaryOp::Shl => "bvshl",
                BinaryOp::LShr => "bvlshr",
                BinaryOp::AShr => "bvashr",
            };
            Ok(format!("({operator} {l} {r})"))
        }

        ExprKind::If {
            cond,
            then_value,
            else_value,
        } => Ok(format!(
            "(ite {} {} {})",
            expr_to_smt2(cond)?,
            expr_to_smt2(then_value)?,
            expr_to_smt2(else_value)?
        )),

        ExprKind::Index { array, index } => Ok(format!(
            "(select {} {})",
            expr_to_smt2(array)?,
            index_to_smt2(index)?
        )),

        ExprKind::Member { compound, field } => {
            let (offset, width) = compound
                .typ
                .field_range(field)
                .ok_or_else(|| SolveError::Unsupported(format!("unknown field `{field}`")))?;
            Ok(format!(
                "((_ extract {} {}) {})",
                offset + width - 1,
                offset,
                expr_to_smt2(compound)?
            ))
        }

        ExprKind::With {
            base,
            designator,
            value,
        } => {
            let base_printed = expr_to_smt2(base)?;
            let value_printed = expr_to_smt2(value)?;
            match designator {
                WithDesignator::Index(index) => Ok(format!(
                    "(store {base_printed} {} {value_printed})",
                    index_to_smt2(index)?
                )),
                WithDesignator::Member(field) => {
                    let (offset, width) = base.typ.field_range(field).ok_or_else(|| {
                        SolveError::Unsupported(format!("unknown field `{field}`"))
                    })?;
                    debug_assert_eq!(width, value.typ.flattened_width());
                    splice(
                        &base_printed,
                        base.typ.flattened_width(),
                        offset,
                        &value_printed,
                        width,
                    )
                }
                WithDesignator::Byte(offset) => {
                    let Some(offset) = offset.as_int_constant() else {
                        return Err(SolveError::Unsupported(
                            "byte update with symbolic offset".to_string(),
                        ));
                    };
                    splice(
                        &base_printed,
                        base.typ.flattened_width(),
                        offset as u64 * 8,
                        &value_printed,
                        value.typ.flattened_width(),
                    )
                }
            }
        }

        ExprKind::ByteExtract { base, offset } => {
            let Some(offset) = offset.as_int_constant() else {
                return Err(SolveError::Unsupported(
                    "byte extract with symbolic offset".to_string(),
                ));
            };
            let start = offset as u64 * 8;
            let width = expr.typ.flattened_width();
            Ok(format!(
                "((_ extract {} {start}) {})",
                start + width - 1,
                expr_to_smt2(base)?
            ))
        }

        ExprKind::Typecast(inner) => {
            let printed = expr_to_smt2(inner)?;
            if inner.typ == expr.typ {
                return Ok(printed);
            }
            let target_width = expr.typ.flattened_width();
            if expr.typ.is_bool() {
                let zero = bv_literal(0, inner.typ.flattened_width());
                return Ok(format!("(not (= {printed} {zero}))"));
            }
            if inner.typ.is_bool() {
                let one = bv_literal(1, target_width);
                let zero = bv_literal(0, target_width);
                return Ok(format!("(ite {printed} {one} {zero})"));
            }
            let source_width = inner.typ.flattened_width();
            if source_width == target_width {
                Ok(printed)
            } else if source_width < target_width {
                let extension = if inner.typ.is_signed() {
                    "sign_extend"
                } else {
                    "zero_extend"
                };
                Ok(format!(
                    "((_ {extension} {}) {printed})",
                    target_width - source_width
                ))
            } else {
                Ok(format!("((_ extract {} 0) {printed})", target_width - 1))
            }
        }

        ExprKind::Quantifier {
            kind,
            variable,
            variable_type,
            body,
        } => {
            let binder = match kind {
                QuantifierKind::Forall => "forall",
                QuantifierKind::Exists => "exists",
            };
            Ok(format!(
                "({binder} (({} {})) {})",
                quoted(&variable.level1_name()),
                sort_to_smt2(variable_type),
                expr_to_smt2(body)?
            ))
        }

        ExprKind::Nondet | ExprKind::AddressOf(_) | ExprKind::Dereference(_) => Err(
            SolveError::Unsupported(format!("{:?} reached the SMT-LIB printer", expr.kind)),
        ),
    }
}

fn collect_symbols(expr: &Expr, out: &mut IndexMap<String, Type>) {
    match &expr.kind {
        ExprKind::Symbol(symbol) => {
            // Quantifier-bound names stay at level 1 and are not declared.
            if symbol.is_versioned() {
                out.entry(symbol.full_name()).or_insert(expr.typ.clone());
            }
        }
        ExprKind::IntConstant(_) | ExprKind::BoolConstant(_) | ExprKind::Nondet => {}
        ExprKind::Unary { operand, .. } => collect_symbols(operand, out),
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_symbols(lhs, out);
            collect_symbols(rhs, out);
        }
        ExprKind::If {
            cond,
            then_value,
            else_value,
        } => {
            collect_symbols(cond, out);
            collect_symbols(then_value, out);
            collect_symbols(else_value, out);
        }
        ExprKind::Index { array, index } => {
            collect_symbols(array, out);
            collect_symbols(index, out);
        }
        ExprKind::Member { compound, .. } => collect_symbols(compound, out),
        ExprKind::With {
            base,
            designator,
            value,
        } => {
            collect_symbols(base, out);
            if let WithDesignator::Index(i) | WithDesignator::Byte(i) = designator {
                collect_symbols(i, out);
            }
            collect_symbols(value, out);
        }
        ExprKind::ByteExtract { base, offset } => {
            collect_symbols(base, out);
            collect_symbols(offset, out);
        }
        ExprKind::AddressOf(inner)
        | ExprKind::Dereference(inner)
        | ExprKind::Typecast(inner) => collect_symbols(inner, out),
        ExprKind::Quantifier { body, .. } => collect_symbols(body, out),
    }
}

/// The script's shared part (preamble, declarations, constraints) and the
/// per-assertion obligations.
pub(crate) fn render_base(
    equation: &Equation,
    logic: &str,
) -> Result<(String, Vec<String>), SolveError> {
    let mut symbols = IndexMap::new();
    for step in equation.steps() {
        collect_symbols(&step.guard, &mut symbols);
        match &step.kind {
            StepKind::Assignment { lhs, rhs, .. } => {
                collect_symbols(lhs, &mut symbols);
                collect_symbols(rhs, &mut symbols);
            }
            StepKind::Assumption { cond } | StepKind::Assertion { cond, .. } => {
                collect_symbols(cond, &mut symbols);
            }
            StepKind::Decl { symbol } => collect_symbols(symbol, &mut symbols),
            StepKind::Input { value, .. } => collect_symbols(value, &mut symbols),
            StepKind::Output { values, .. } => {
                for value in values {
                    collect_symbols(value, &mut symbols);
                }
            }
            _ => {}
        }
    }

    let mut base = String::new();
    base.push_str(&format!(
        "; Generated by serval {}\n",
        env!("CARGO_PKG_VERSION")
    ));
    base.push_str("(set-option :produce-models true)\n");
    base.push_str(&format!("(set-logic {logic})\n"));
    for (name, typ) in &symbols {
        base.push_str(&format!(
            "(declare-fun {} () {})\n",
            quoted(name),
            sort_to_smt2(typ)
        ));
    }

    let mut assertions = Vec::new();
    for step in equation.steps() {
        match &step.kind {
            StepKind::Assignment { lhs, rhs, .. } => {
                base.push_str(&format!(
                    "(assert (= {} {}))\n",
                    expr_to_smt2(lhs)?,
                    expr_to_smt2(rhs)?
                ));
            }
            StepKind::Assumption { cond } => {
                base.push_str(&format!(
                    "(assert (=> {} {}))\n",
                    expr_to_smt2(&step.guard)?,
                    expr_to_smt2(cond)?
                ));
            }
            StepKind::Assertion { cond, .. } => {
                assertions.push(expr_to_smt2(cond)?);
            }
            _ => {}
        }
    }
    Ok((base, assertions))
}

fn render_script(equation: &Equation, logic: &str) -> Result<String, SolveError> {
    let (mut script, assertions) = render_base(equation, logic)?;
    for (index, assertion) in assertions.iter().enumerate() {
        script.push_str(&format!("; assertion {index}\n"));
        script.push_str("(push 1)\n");
        script.push_str(&format!("(assert (not {assertion}))\n"));
        script.push_str("(check-sat)\n");
        script.push_str("(pop 1)\n");
    }
    script.push_str("(exit)\n");
    Ok(script)
}

pub enum Smt2Out {
    Stdout,
    File(File),
}

/// One-shot SMT-LIB dump to a file or stdout.
pub struct Smt2Dump {
    out: Option<Smt2Out>,
    logic: &'static str,
    script: Option<String>,
}

impl Smt2Dump {
    pub fn new(out: Smt2Out, fpa: bool) -> Self {
        Smt2Dump {
            out: Some(out),
            logic: logic_name(fpa),
            script: None,
        }
    }
}

impl DecisionProcedure for Smt2Dump {
    fn convert(&mut self, equation: &Equation) -> Result<(), SolveError> {
        self.script = Some(render_script(equation, self.logic)?);
        Ok(())
    }

    fn solve(&mut self) -> Result<DecisionResult, SolveError> {
        let script = self
            .script
            .take()
            .ok_or_else(|| SolveError::Process("solve before convert".to_string()))?;
        match self.out.take() {
            Some(Smt2Out::File(mut file)) => {
                file.write_all(script.as_bytes())?;
                file.flush()?;
            }
            Some(Smt2Out::Stdout) => {
                let stdout = std::io::stdout();
                let mut lock = stdout.lock();
                lock.write_all(script.as_bytes())?;
            }
            None => {
                return Err(SolveError::Process(
                    "SMT-LIB output already written".to_string(),
                ))
            }
        }
        Ok(DecisionResult::Unknown("SMT-LIB formula written".to_string()))
    }

    fn name(&self) -> &'static str {
        "SMT-LIB dump"
    }
}

/// In-process decision procedure over a spawned SMT-LIB solver.
pub struct Smt2Process {
    family: SmtSolverFamily,
    logic: &'static str,
    time_limit: Option<u64>,
    session: Option<Session>,
    verdicts: Vec<DecisionResult>,
    models: Vec<String>,
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Smt2Process {
    pub fn new(family: SmtSolverFamily, fpa: bool) -> Self {
        Smt2Process {
            family,
            logic: logic_name(fpa),
            time_limit: None,
            session: None,
            verdicts: Vec::new(),
            models: Vec::new(),
        }
    }

    /// Raw `(get-model)` answers collected for satisfiable checks, in
    /// assertion order.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    fn command(&self) -> (&'static str, Vec<String>) {
        let mut args: Vec<String> = Vec::new();
        let program = match self.family {
            SmtSolverFamily::Boolector => {
                args.push("--smt2".into());
                "boolector"
            }
            SmtSolverFamily::Cvc3 => {
                args.extend(["-lang".into(), "smt2".into()]);
                "cvc3"
            }
            SmtSolverFamily::Cvc4 => {
                args.extend(["--lang".into(), "smt2".into(), "--incremental".into()]);
                if let Some(seconds) = self.time_limit {
                    args.push(format!("--tlimit={}", seconds.saturating_mul(1000)));
                }
                "cvc4"
            }
            SmtSolverFamily::Mathsat => "mathsat",
            SmtSolverFamily::Yices => {
                args.push("--incremental".into());
                if let Some(seconds) = self.time_limit {
                    args.push(format!("--timeout={seconds}"));
                }
                "yices-smt2"
            }
            SmtSolverFamily::Z3 => {
                args.extend(["-smt2".into(), "-in".into()]);
                if let Some(seconds) = self.time_limit {
                    args.push(format!("-T:{seconds}"));
                }
                "z3"
            }
            SmtSolverFamily::CproverSmt2 => "smt2_solver",
            // The façade rejects Generic without an outfile before we get
            // here.
            SmtSolverFamily::Generic => "smt2_solver",
        };
        (program, args)
    }

    fn spawn(&mut self) -> Result<(), SolveError> {
        let (program, args) = self.command();
        debug!(program, "spawning SMT-LIB solver");
        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SolveError::Process(format!("failed to start {program}: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SolveError::Process("failed to capture solver stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SolveError::Process("failed to capture solver stdout".to_string()))?;
        self.session = Some(Session {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        });
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<(), SolveError> {
        let session = self
            .session
            .as_mut()
            .expect("session is live while converting");
        writeln!(session.stdin, "{text}")?;
        session.stdin.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String, SolveError> {
        let session = self
            .session
            .as_mut()
            .expect("session is live while converting");
        let mut line = String::new();
        session.stdout.read_line(&mut line)?;
        if line.is_empty() {
            return Err(SolveError::Process(
                "solver closed the stream unexpectedly".to_string(),
            ));
        }
        Ok(line.trim().to_string())
    }

    /// Read a full s-expression, however many lines it spans.
    fn read_sexpr(&mut self) -> Result<String, SolveError> {
        let mut text = String::new();
        let mut depth: i64 = 0;
        loop {
            let line = self.read_line()?;
            for ch in line.chars() {
                match ch {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
            }
            text.push_str(&line);
            text.push('\n');
            if depth <= 0 {
                return Ok(text);
            }
        }
    }
}

impl Drop for Smt2Process {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = writeln!(session.stdin, "(exit)");
            let _ = session.stdin.flush();
            let _ = session.child.wait();
        }
    }
}

impl DecisionProcedure for Smt2Process {
    fn convert(&mut self, equation: &Equation) -> Result<(), SolveError> {
        let (base, assertions) = render_base(equation, self.logic)?;
        self.spawn()?;
        for line in base.lines() {
            self.send(line)?;
        }
        for assertion in &assertions {
            self.send("(push 1)")?;
            self.send(&format!("(assert (not {assertion}))"))?;
            self.send("(check-sat)")?;
            let answer = self.read_line()?;
            let verdict = match answer.as_str() {
                "sat" => {
                    self.send("(get-model)")?;
                    let model = self.read_sexpr()?;
                    self.models.push(model);
                    DecisionResult::Satisfiable
                }
                "unsat" => DecisionResult::Unsatisfiable,
                other => DecisionResult::Unknown(other.to_string()),
            };
            self.verdicts.push(verdict);
            self.send("(pop 1)")?;
        }
        Ok(())
    }

    fn solve(&mut self) -> Result<DecisionResult, SolveError> {
        if self.verdicts.is_empty() {
            return Ok(DecisionResult::Unsatisfiable);
        }
        if self
            .verdicts
            .iter()
            .any(|v| *v == DecisionResult::Satisfiable)
        {
            return Ok(DecisionResult::Satisfiable);
        }
        if let Some(DecisionResult::Unknown(reason)) = self
            .verdicts
            .iter()
            .find(|v| matches!(v, DecisionResult::Unknown(_)))
        {
            return Ok(DecisionResult::Unknown(reason.clone()));
        }
        Ok(DecisionResult::Unsatisfiable)
    }

    fn set_time_limit_seconds(&mut self, seconds: u64) {
        self.time_limit = Some(seconds);
    }

    fn supports_incremental(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "SMT-LIB process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serval_ir::expr::SsaSymbol;
    use serval_symex::{AssignmentKind, SourcePoint};

    fn sym(name: &str, version: u64, typ: Type) -> Expr {
        Expr::ssa(SsaSymbol::new(name).with_version(version), typ)
    }

    #[test]
    fn sorts_render_bitvectors_and_arrays() {
        assert_eq!(sort_to_smt2(&Type::Bool), "Bool");
        assert_eq!(sort_to_smt2(&Type::signed(32)), "(_ BitVec 32)");
        assert_eq!(
            sort_to_smt2(&Type::array(Type::unsigned(8), 4)),
            "(Array (_ BitVec 64) (_ BitVec 8))"
        );
    }

    #[test]
    fn expressions_render_in_prefix_form() {
        let t = Type::signed(32);
        let e = sym("x", 2, t.clone()).add(Expr::int(1, t.clone()));
        assert_eq!(expr_to_smt2(&e).unwrap(), "(bvadd |x#2| (_ bv1 32))");

        let cmp = sym("x", 2, t.clone()).lt(Expr::int(0, t));
        assert_eq!(expr_to_smt2(&cmp).unwrap(), "(bvslt |x#2| (_ bv0 32))");

        let u = Type::unsigned(8);
        let ucmp = sym("y", 1, u.clone()).ge(Expr::int(3, u));
        assert_eq!(expr_to_smt2(&ucmp).unwrap(), "(bvuge |y#1| (_ bv3 8))");
    }

    #[test]
    fn negative_constants_use_twos_complement() {
        let e = Expr::int(-1, Type::signed(8));
        assert_eq!(expr_to_smt2(&e).unwrap(), "(_ bv255 8)");
    }

    #[test]
    fn select_and_store_carry_extended_indices() {
        let arr = sym("a", 1, Type::array(Type::unsigned(8), 4));
        let idx = Expr::int(1, Type::unsigned(32));
        let select = arr.clone().index(idx.clone());
        assert_eq!(
            expr_to_smt2(&select).unwrap(),
            "(select |a#1| ((_ zero_extend 32) (_ bv1 32)))"
        );
        let store = arr.with_index(idx, Expr::int(7, Type::unsigned(8)));
        assert_eq!(
            expr_to_smt2(&store).unwrap(),
            "(store |a#1| ((_ zero_extend 32) (_ bv1 32)) (_ bv7 8))"
        );
    }

    #[test]
    fn script_declares_symbols_and_checks_each_assertion() {
        let t = Type::signed(32);
        let mut eq = Equation::new();
        eq.assignment(
            Expr::true_expr(),
            SourcePoint::new(0, "main", 0),
            sym("x", 1, t.clone()),
            sym("x", 1, t.clone()),
            Expr::int(1, t.clone()),
            AssignmentKind::State,
        );
        eq.assertion(
            Expr::true_expr(),
            SourcePoint::new(0, "main", 1),
            sym("x", 1, t.clone()).eq(Expr::int(1, t)),
            "assertion",
        );

        let script = render_script(&eq, "QF_AUFBV").unwrap();
        assert!(script.starts_with("; Generated by serval"));
        assert!(script.contains("(set-logic QF_AUFBV)"));
        assert!(script.contains("(declare-fun |x#1| () (_ BitVec 32))"));
        assert!(script.contains("(assert (= |x#1| (_ bv1 32)))"));
        assert!(script.contains("(push 1)\n(assert (not (= |x#1| (_ bv1 32))))\n(check-sat)\n(pop 1)"));
        assert!(script.trim_end().ends_with("(exit)"));
        // Exactly one check per assertion.
        assert_eq!(script.matches("(check-sat)").count(), 1);
    }

    #[test]
    fn member_updates_splice_with_concat() {
        let st = Type::Struct {
            fields: vec![
                ("a".into(), Type::unsigned(8)),
                ("b".into(), Type::unsigned(8)),
            ],
        };
        let s = sym("s", 1, st);
        let updated = s.clone().with_member("a", Expr::int(1, Type::unsigned(8)));
        assert_eq!(
            expr_to_smt2(&updated).unwrap(),
            "(concat ((_ extract 15 8) |s#1|) (_ bv1 8))"
        );
        let member = s.member("b");
        assert_eq!(expr_to_smt2(&member).unwrap(), "((_ extract 15 8) |s#1|)");
    }
}
