use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::expr::Expr;
use crate::types::Type;

pub type FunctionId = String;

/// Default entry-point function name.
pub const ENTRY_POINT: &str = "main";

/// Position in the source text an instruction came from. The comment doubles
/// as the assertion message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: Option<u64>,
    pub comment: Option<String>,
}

impl SourceLocation {
    pub fn with_comment(comment: impl Into<String>) -> Self {
        SourceLocation {
            file: None,
            line: None,
            comment: Some(comment.into()),
        }
    }
}

/// Payloads of the catch-all `Other` instruction kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OtherInstruction {
    Printf { format: String, arguments: Vec<Expr> },
    /// Reads a value from the environment into `target`.
    Input { id: String, target: Expr },
    Output { id: String, value: Expr },
    /// Heap allocation; binds `lhs` to the address of a fresh object.
    Allocate { lhs: Expr, size: Expr },
    New { lhs: Expr },
    Delete { pointer: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionKind {
    Skip,
    EndFunction,
    Location,
    Goto { condition: Expr, target: usize },
    Assume(Expr),
    Assert(Expr),
    Return(Option<Expr>),
    Assign { lhs: Expr, rhs: Expr },
    FunctionCall {
        lhs: Option<Expr>,
        function: FunctionId,
        arguments: Vec<Expr>,
    },
    Other(OtherInstruction),
    Decl { name: String, typ: Type },
    Dead { name: String },
    StartThread { target: usize },
    EndThread,
    AtomicBegin,
    AtomicEnd,
    /// Non-empty handler list pushes onto the frame's handler stack; an empty
    /// list pops.
    Catch { handlers: Vec<(String, usize)> },
    Throw { tag: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub source: SourceLocation,
    /// Indices of instructions that may transfer control here; used for
    /// loop-head detection.
    #[serde(default)]
    pub incoming_edges: Vec<usize>,
}

impl Instruction {
    pub fn new(kind: InstructionKind) -> Self {
        Instruction {
            kind,
            source: SourceLocation::default(),
            incoming_edges: Vec::new(),
        }
    }

    pub fn with_source(kind: InstructionKind, source: SourceLocation) -> Self {
        Instruction {
            kind,
            source,
            incoming_edges: Vec::new(),
        }
    }

    pub fn is_goto(&self) -> bool {
        matches!(self.kind, InstructionKind::Goto { .. })
    }

    pub fn goto_target(&self) -> Option<usize> {
        match &self.kind {
            InstructionKind::Goto { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// A goto whose target does not lie after its own position.
    pub fn is_backwards_goto(&self, own_index: usize) -> bool {
        matches!(&self.kind, InstructionKind::Goto { target, .. } if *target <= own_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GotoFunction {
    pub name: FunctionId,
    pub parameters: Vec<(String, Type)>,
    pub return_type: Type,
    pub body: Vec<Instruction>,
    /// Auxiliary library code; assertions inside are not reported.
    #[serde(default)]
    pub hidden: bool,
}

impl GotoFunction {
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Index of the function's `EndFunction` marker.
    pub fn end_of_function(&self) -> Option<usize> {
        self.body
            .iter()
            .rposition(|i| matches!(i.kind, InstructionKind::EndFunction))
    }

    /// Names and types declared in the body, in order of declaration.
    pub fn local_declarations(&self) -> Vec<(String, Type)> {
        self.body
            .iter()
            .filter_map(|i| match &i.kind {
                InstructionKind::Decl { name, typ } => Some((name.clone(), typ.clone())),
                _ => None,
            })
            .collect()
    }

    /// Recompute `incoming_edges` for every instruction from scratch.
    pub fn compute_incoming_edges(&mut self) {
        for instruction in &mut self.body {
            instruction.incoming_edges.clear();
        }
        let len = self.body.len();
        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (index, instruction) in self.body.iter().enumerate() {
            match &instruction.kind {
                InstructionKind::Goto { condition, target } => {
                    edges.push((index, *target));
                    // Conditional gotos also fall through.
                    if !condition.is_true() && index + 1 < len {
                        edges.push((index, index + 1));
                    }
                }
                InstructionKind::StartThread { target } => {
                    edges.push((index, *target));
                    if index + 1 < len {
                        edges.push((index, index + 1));
                    }
                }
                InstructionKind::EndFunction => {}
                _ => {
                    if index + 1 < len {
                        edges.push((index, index + 1));
                    }
                }
            }
        }
        for (from, to) in edges {
            if to < len {
                self.body[to].incoming_edges.push(from);
            }
        }
    }
}

/// Identifies a loop by the function and the index of its back-edge goto.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoopId {
    pub function: FunctionId,
    pub back_edge: usize,
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.function, self.back_edge)
    }
}

/// A goto-program: functions keyed by identifier plus the entry point name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GotoProgram {
    pub functions: IndexMap<FunctionId, GotoFunction>,
    pub entry_point: FunctionId,
}

impl GotoProgram {
    pub fn new() -> Self {
        GotoProgram {
            functions: IndexMap::new(),
            entry_point: ENTRY_POINT.to_string(),
        }
    }

    pub fn add_function(&mut self, function: GotoFunction) {
        self.functions.insert(function.name.clone(), function);
    }
}

impl Default for GotoProgram {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer of function bodies, the driver's only view of the program.
pub trait FunctionSource {
    fn get_function(&self, id: &str) -> Option<&GotoFunction>;
}

impl FunctionSource for GotoProgram {
    fn get_function(&self, id: &str) -> Option<&GotoFunction> {
        self.functions.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skip() -> Instruction {
        Instruction::new(InstructionKind::Skip)
    }

    #[test]
    fn end_of_function_finds_the_marker() {
        let f = GotoFunction {
            name: "f".into(),
            parameters: vec![],
            return_type: Type::Unit,
            body: vec![skip(), Instruction::new(InstructionKind::EndFunction)],
            hidden: false,
        };
        assert_eq!(f.end_of_function(), Some(1));
    }

    #[test]
    fn incoming_edges_cover_gotos_and_fallthrough() {
        let mut f = GotoFunction {
            name: "f".into(),
            parameters: vec![],
            return_type: Type::Unit,
            body: vec![
                skip(),
                Instruction::new(InstructionKind::Goto {
                    condition: Expr::symbol("c", Type::Bool),
                    target: 0,
                }),
                Instruction::new(InstructionKind::EndFunction),
            ],
            hidden: false,
        };
        f.compute_incoming_edges();
        // Instruction 0 receives the back edge from 1 and nothing else.
        assert_eq!(f.body[0].incoming_edges, vec![1]);
        // The conditional goto falls through to 2.
        assert!(f.body[2].incoming_edges.contains(&1));
        assert!(f.body[1].is_backwards_goto(1));
    }

    #[test]
    fn unconditional_goto_has_no_fallthrough_edge() {
        let mut f = GotoFunction {
            name: "f".into(),
            parameters: vec![],
            return_type: Type::Unit,
            body: vec![
                Instruction::new(InstructionKind::Goto {
                    condition: Expr::true_expr(),
                    target: 2,
                }),
                skip(),
                Instruction::new(InstructionKind::EndFunction),
            ],
            hidden: false,
        };
        f.compute_incoming_edges();
        assert!(f.body[1].incoming_edges.is_empty());
        assert_eq!(f.body[2].incoming_edges, vec![0]);
    }

    #[test]
    fn programs_round_trip_through_json() {
        let mut f = GotoFunction {
            name: "main".into(),
            parameters: vec![("n".into(), Type::signed(32))],
            return_type: Type::Unit,
            body: vec![
                Instruction::new(InstructionKind::Assert(
                    Expr::symbol("n", Type::signed(32)).ge(Expr::int(0, Type::signed(32))),
                )),
                Instruction::new(InstructionKind::Goto {
                    condition: Expr::true_expr(),
                    target: 2,
                }),
                Instruction::new(InstructionKind::EndFunction),
            ],
            hidden: false,
        };
        f.compute_incoming_edges();
        let mut program = GotoProgram::new();
        program.add_function(f);

        let json = serde_json::to_string(&program).expect("serializes");
        let back: GotoProgram = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, program);
    }

    #[test]
    fn local_declarations_in_order() {
        let f = GotoFunction {
            name: "f".into(),
            parameters: vec![],
            return_type: Type::Unit,
            body: vec![
                Instruction::new(InstructionKind::Decl {
                    name: "x".into(),
                    typ: Type::signed(32),
                }),
                Instruction::new(InstructionKind::Decl {
                    name: "y".into(),
                    typ: Type::Bool,
                }),
                Instruction::new(InstructionKind::EndFunction),
            ],
            hidden: false,
        };
        let decls = f.local_declarations();
        assert_eq!(decls[0].0, "x");
        assert_eq!(decls[1].0, "y");
    }
}
