//! Label-based construction of goto functions.
//!
//! Targets are referred to by label; `finish` resolves them to instruction
//! indices, appends the end-of-function marker and recomputes incoming edges.
//! Used by the test suites and the fuzz target; unknown labels panic.

use indexmap::IndexMap;

use crate::expr::Expr;
use crate::program::{
    GotoFunction, Instruction, InstructionKind, OtherInstruction, SourceLocation,
};
use crate::types::Type;

pub struct FunctionBuilder {
    name: String,
    parameters: Vec<(String, Type)>,
    return_type: Type,
    hidden: bool,
    instructions: Vec<Instruction>,
    labels: IndexMap<String, usize>,
    goto_fixups: Vec<(usize, String)>,
    catch_fixups: Vec<(usize, Vec<(String, String)>)>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionBuilder {
            name: name.into(),
            parameters: Vec::new(),
            return_type: Type::Unit,
            hidden: false,
            instructions: Vec::new(),
            labels: IndexMap::new(),
            goto_fixups: Vec::new(),
            catch_fixups: Vec::new(),
        }
    }

    pub fn parameter(mut self, name: impl Into<String>, typ: Type) -> Self {
        self.parameters.push((name.into(), typ));
        self
    }

    pub fn returns(mut self, typ: Type) -> Self {
        self.return_type = typ;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Attach a label to the next instruction.
    pub fn label(mut self, name: impl Into<String>) -> Self {
        self.labels.insert(name.into(), self.instructions.len());
        self
    }

    fn push(mut self, kind: InstructionKind) -> Self {
        self.instructions.push(Instruction::new(kind));
        self
    }

    pub fn skip(self) -> Self {
        self.push(InstructionKind::Skip)
    }

    pub fn location(self) -> Self {
        self.push(InstructionKind::Location)
    }

    pub fn decl(self, name: impl Into<String>, typ: Type) -> Self {
        self.push(InstructionKind::Decl {
            name: name.into(),
            typ,
        })
    }

    pub fn dead(self, name: impl Into<String>) -> Self {
        self.push(InstructionKind::Dead { name: name.into() })
    }

    pub fn assign(self, lhs: Expr, rhs: Expr) -> Self {
        self.push(InstructionKind::Assign { lhs, rhs })
    }

    pub fn assume(self, cond: Expr) -> Self {
        self.push(InstructionKind::Assume(cond))
    }

    pub fn assert_expr(self, cond: Expr) -> Self {
        self.push(InstructionKind::Assert(cond))
    }

    pub fn assert_named(mut self, cond: Expr, message: impl Into<String>) -> Self {
        self.instructions.push(Instruction::with_source(
            InstructionKind::Assert(cond),
            SourceLocation::with_comment(message),
        ));
        self
    }

    pub fn goto(self, target: impl Into<String>) -> Self {
        self.goto_if(Expr::true_expr(), target)
    }

    pub fn goto_if(mut self, condition: Expr, target: impl Into<String>) -> Self {
        let index = self.instructions.len();
        self.goto_fixups.push((index, target.into()));
        self.instructions.push(Instruction::new(InstructionKind::Goto {
            condition,
            target: usize::MAX,
        }));
        self
    }

    pub fn ret(self, value: Option<Expr>) -> Self {
        self.push(InstructionKind::Return(value))
    }

    pub fn call(
        self,
        lhs: Option<Expr>,
        function: impl Into<String>,
        arguments: Vec<Expr>,
    ) -> Self {
        self.push(InstructionKind::FunctionCall {
            lhs,
            function: function.into(),
            arguments,
        })
    }

    pub fn other(self, other: OtherInstruction) -> Self {
        self.push(InstructionKind::Other(other))
    }

    pub fn start_thread(mut self, target: impl Into<String>) -> Self {
        let index = self.instructions.len();
        self.goto_fixups.push((index, target.into()));
        self.instructions
            .push(Instruction::new(InstructionKind::StartThread {
                target: usize::MAX,
            }));
        self
    }

    pub fn end_thread(self) -> Self {
        self.push(InstructionKind::EndThread)
    }

    pub fn atomic_begin(self) -> Self {
        self.push(InstructionKind::AtomicBegin)
    }

    pub fn atomic_end(self) -> Self {
        self.push(InstructionKind::AtomicEnd)
    }

    pub fn catch_push<T, L>(mut self, handlers: Vec<(T, L)>) -> Self
    where
        T: Into<String>,
        L: Into<String>,
    {
        let index = self.instructions.len();
        let handlers: Vec<(String, String)> = handlers
            .into_iter()
            .map(|(tag, label)| (tag.into(), label.into()))
            .collect();
        self.catch_fixups.push((index, handlers));
        self.instructions
            .push(Instruction::new(InstructionKind::Catch {
                handlers: Vec::new(),
            }));
        self
    }

    pub fn catch_pop(self) -> Self {
        self.push(InstructionKind::Catch {
            handlers: Vec::new(),
        })
    }

    pub fn throw(self, tag: impl Into<String>) -> Self {
        self.push(InstructionKind::Throw { tag: tag.into() })
    }

    pub fn finish(mut self) -> GotoFunction {
        if !matches!(
            self.instructions.last().map(|i| &i.kind),
            Some(InstructionKind::EndFunction)
        ) {
            self.instructions
                .push(Instruction::new(InstructionKind::EndFunction));
        }

        let resolve = |labels: &IndexMap<String, usize>, label: &str| -> usize {
            *labels
                .get(label)
                .unwrap_or_else(|| panic!("undefined label `{label}` in `{}`", self.name))
        };

        for (index, label) in &self.goto_fixups {
            let target = resolve(&self.labels, label);
            match &mut self.instructions[*index].kind {
                InstructionKind::Goto { target: t, .. }
                | InstructionKind::StartThread { target: t } => *t = target,
                _ => unreachable!("fixup points at a non-branch instruction"),
            }
        }
        for (index, handlers) in &self.catch_fixups {
            let resolved: Vec<(String, usize)> = handlers
                .iter()
                .map(|(tag, label)| (tag.clone(), resolve(&self.labels, label)))
                .collect();
            match &mut self.instructions[*index].kind {
                InstructionKind::Catch { handlers: h } => *h = resolved,
                _ => unreachable!("fixup points at a non-catch instruction"),
            }
        }

        let mut function = GotoFunction {
            name: self.name,
            parameters: self.parameters,
            return_type: self.return_type,
            body: self.instructions,
            hidden: self.hidden,
        };
        function.compute_incoming_edges();
        function
    }
}
