//! Expression validation and compilation
//!
//! Turns a flat token array into a boolean AST of binary AND/OR nodes over
//! condition leaves, reporting the first structural violation. Parentheses
//! are the only grouping mechanism; AND and OR have no implicit precedence,
//! so mixing them at one nesting level without parentheses is rejected.
//!
//! Compilation is pure and deterministic. Device lookups happen separately,
//! in [`check_references`].

use thiserror::Error;

use routine_core::{DeviceCatalog, ReferenceError};

use crate::token::{ExprToken, Subexpr};

/// Structural violation in a trigger expression
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("expression is empty")]
    Empty,

    #[error("unbalanced parentheses")]
    UnbalancedParens,

    #[error("empty parenthesized group at token {0}")]
    EmptyGroup(usize),

    #[error("operator at token {0} is not between two subexpressions")]
    DanglingOperator(usize),

    #[error("adjacent operators at token {0}")]
    AdjacentOperators(usize),

    #[error("adjacent subexpressions at token {0}; an operator is required between them")]
    AdjacentSubexpressions(usize),

    #[error("AND and OR mixed without parentheses at token {0}; group explicitly")]
    MixedOperators(usize),
}

/// A compiled condition leaf
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    /// Position of this subexpression among the expression's subexpressions
    pub index: usize,

    /// The condition itself
    pub expr: Subexpr,
}

/// Compiled boolean expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Leaf(Leaf),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
}

impl Ast {
    /// All leaves, left to right
    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Leaf>) {
        match self {
            Ast::Leaf(leaf) => out.push(leaf),
            Ast::And(l, r) | Ast::Or(l, r) => {
                l.collect_leaves(out);
                r.collect_leaves(out);
            }
        }
    }

    /// Serialize back into a fully parenthesized token array
    ///
    /// Compiling the result reproduces an equivalent tree (grouping is made
    /// explicit; the original parenthesization is not preserved).
    pub fn to_tokens(&self) -> Vec<ExprToken> {
        let mut tokens = Vec::new();
        self.write_tokens(&mut tokens);
        tokens
    }

    fn write_tokens(&self, out: &mut Vec<ExprToken>) {
        match self {
            Ast::Leaf(leaf) => out.push(leaf.expr.clone().into_token()),
            Ast::And(l, r) | Ast::Or(l, r) => {
                let op = if matches!(self, Ast::And(..)) {
                    ExprToken::And
                } else {
                    ExprToken::Or
                };
                Self::write_operand(l, out);
                out.push(op);
                Self::write_operand(r, out);
            }
        }
    }

    fn write_operand(ast: &Ast, out: &mut Vec<ExprToken>) {
        if matches!(ast, Ast::Leaf(_)) {
            ast.write_tokens(out);
        } else {
            out.push(ExprToken::Lparen);
            ast.write_tokens(out);
            out.push(ExprToken::Rparen);
        }
    }
}

/// Compile a flat token array into a boolean AST
pub fn compile(tokens: &[ExprToken]) -> Result<Ast, CompileError> {
    if tokens.is_empty() {
        return Err(CompileError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        next_leaf: 0,
    };
    let ast = parser.parse_group(false)?;
    debug_assert_eq!(parser.pos, tokens.len());
    Ok(ast)
}

struct Parser<'a> {
    tokens: &'a [ExprToken],
    pos: usize,
    next_leaf: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.pos)
    }

    /// Parse a sequence of operands joined by one operator kind, up to the
    /// closing parenthesis (`inner`) or the end of input
    fn parse_group(&mut self, inner: bool) -> Result<Ast, CompileError> {
        let mut acc = self.parse_operand()?;
        let mut group_op: Option<bool> = None; // true = AND

        loop {
            match self.peek() {
                Some(ExprToken::And) | Some(ExprToken::Or) => {
                    let is_and = matches!(self.peek(), Some(ExprToken::And));
                    let op_pos = self.pos;
                    if *group_op.get_or_insert(is_and) != is_and {
                        return Err(CompileError::MixedOperators(op_pos));
                    }
                    self.pos += 1;
                    match self.peek() {
                        Some(t) if t.is_operator() => {
                            return Err(CompileError::AdjacentOperators(self.pos))
                        }
                        Some(ExprToken::Rparen) | None => {
                            return Err(CompileError::DanglingOperator(op_pos))
                        }
                        _ => {}
                    }
                    let rhs = self.parse_operand()?;
                    acc = if is_and {
                        Ast::And(Box::new(acc), Box::new(rhs))
                    } else {
                        Ast::Or(Box::new(acc), Box::new(rhs))
                    };
                }
                Some(ExprToken::Rparen) => {
                    if !inner {
                        return Err(CompileError::UnbalancedParens);
                    }
                    return Ok(acc);
                }
                Some(t) if t.is_subexpr() => {
                    return Err(CompileError::AdjacentSubexpressions(self.pos));
                }
                Some(ExprToken::Lparen) => {
                    // A group butting against the previous operand
                    return Err(CompileError::AdjacentSubexpressions(self.pos));
                }
                None => {
                    if inner {
                        return Err(CompileError::UnbalancedParens);
                    }
                    return Ok(acc);
                }
                Some(_) => unreachable!("token kinds are exhaustive"),
            }
        }
    }

    /// Parse one operand: a subexpression or a parenthesized group
    fn parse_operand(&mut self) -> Result<Ast, CompileError> {
        match self.peek().cloned() {
            Some(token) if token.is_subexpr() => {
                self.pos += 1;
                let expr = Subexpr::try_from(token).expect("checked is_subexpr");
                let leaf = Leaf {
                    index: self.next_leaf,
                    expr,
                };
                self.next_leaf += 1;
                Ok(Ast::Leaf(leaf))
            }
            Some(ExprToken::Lparen) => {
                self.pos += 1;
                if matches!(self.peek(), Some(ExprToken::Rparen)) {
                    return Err(CompileError::EmptyGroup(self.pos));
                }
                let inner = self.parse_group(true)?;
                // parse_group only returns on Rparen when inner
                debug_assert!(matches!(self.peek(), Some(ExprToken::Rparen)));
                self.pos += 1;
                Ok(inner)
            }
            Some(ExprToken::And) | Some(ExprToken::Or) => {
                Err(CompileError::DanglingOperator(self.pos))
            }
            Some(ExprToken::Rparen) => Err(CompileError::UnbalancedParens),
            None => Err(CompileError::UnbalancedParens),
            Some(_) => unreachable!("token kinds are exhaustive"),
        }
    }
}

/// Validate every device/property/command/parameter reference in an
/// expression against the catalog
///
/// Run at compile time, after structural validation; a routine with an
/// unresolvable reference is rejected before it is ever scheduled.
pub fn check_references(
    tokens: &[ExprToken],
    catalog: &dyn DeviceCatalog,
) -> Result<(), ReferenceError> {
    for token in tokens {
        match token {
            ExprToken::State(s) => {
                if !catalog.has_device(&s.device) {
                    return Err(ReferenceError::UnknownDevice(s.device.clone()));
                }
                if catalog.property(&s.device, &s.property).is_none() {
                    return Err(ReferenceError::UnknownProperty {
                        device: s.device.clone(),
                        property: s.property.clone(),
                    });
                }
            }
            ExprToken::Control(c) => {
                if !catalog.has_device(&c.device) {
                    return Err(ReferenceError::UnknownDevice(c.device.clone()));
                }
                let Some(def) = catalog.command(&c.device, &c.command) else {
                    return Err(ReferenceError::UnknownCommand {
                        device: c.device.clone(),
                        command: c.command.clone(),
                    });
                };
                for param in &c.parameters {
                    if def.param(&param.id).is_none() {
                        return Err(ReferenceError::UnknownParameter {
                            device: c.device.clone(),
                            command: c.command.clone(),
                            param: param.id.clone(),
                        });
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{ControlMatch, Equality, StateCompare};
    use routine_core::{CommandDef, CompareOp, MemoryCatalog, NumericLiteral, PropertyDef};

    fn state(device: &str, value: f64) -> ExprToken {
        ExprToken::State(StateCompare {
            device: device.into(),
            property: "ST".into(),
            op: CompareOp::Gt,
            literal: NumericLiteral::new(value, 17),
        })
    }

    fn control(device: &str) -> ExprToken {
        ExprToken::Control(ControlMatch {
            device: device.into(),
            equality: Equality::Is,
            command: "DON".into(),
            parameters: vec![],
        })
    }

    #[test]
    fn test_single_subexpression() {
        let ast = compile(&[state("a", 1.0)]).unwrap();
        assert!(matches!(ast, Ast::Leaf(_)));
        assert_eq!(ast.leaves().len(), 1);
    }

    #[test]
    fn test_left_fold_same_operator() {
        let ast = compile(&[
            state("a", 1.0),
            ExprToken::And,
            state("b", 2.0),
            ExprToken::And,
            state("c", 3.0),
        ])
        .unwrap();

        // ((a AND b) AND c)
        if let Ast::And(l, r) = &ast {
            assert!(matches!(**l, Ast::And(..)));
            assert!(matches!(**r, Ast::Leaf(_)));
        } else {
            panic!("Expected And at root");
        }
        let indices: Vec<usize> = ast.leaves().iter().map(|l| l.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_parentheses_group() {
        // a AND (b OR c)
        let ast = compile(&[
            state("a", 1.0),
            ExprToken::And,
            ExprToken::Lparen,
            state("b", 2.0),
            ExprToken::Or,
            state("c", 3.0),
            ExprToken::Rparen,
        ])
        .unwrap();

        if let Ast::And(_, r) = &ast {
            assert!(matches!(**r, Ast::Or(..)));
        } else {
            panic!("Expected And at root");
        }
    }

    #[test]
    fn test_mixed_operators_rejected() {
        let err = compile(&[
            state("a", 1.0),
            ExprToken::And,
            state("b", 2.0),
            ExprToken::Or,
            state("c", 3.0),
        ])
        .unwrap_err();
        assert_eq!(err, CompileError::MixedOperators(3));
    }

    #[test]
    fn test_mixed_operators_allowed_with_parens() {
        assert!(compile(&[
            ExprToken::Lparen,
            state("a", 1.0),
            ExprToken::And,
            state("b", 2.0),
            ExprToken::Rparen,
            ExprToken::Or,
            state("c", 3.0),
        ])
        .is_ok());
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(compile(&[]).unwrap_err(), CompileError::Empty);
        assert_eq!(
            compile(&[ExprToken::And, state("a", 1.0)]).unwrap_err(),
            CompileError::DanglingOperator(0)
        );
        assert_eq!(
            compile(&[state("a", 1.0), ExprToken::And]).unwrap_err(),
            CompileError::DanglingOperator(1)
        );
        assert_eq!(
            compile(&[state("a", 1.0), ExprToken::And, ExprToken::And, state("b", 2.0)])
                .unwrap_err(),
            CompileError::AdjacentOperators(2)
        );
        assert_eq!(
            compile(&[state("a", 1.0), state("b", 2.0)]).unwrap_err(),
            CompileError::AdjacentSubexpressions(1)
        );
        assert_eq!(
            compile(&[ExprToken::Lparen, state("a", 1.0)]).unwrap_err(),
            CompileError::UnbalancedParens
        );
        assert_eq!(
            compile(&[state("a", 1.0), ExprToken::Rparen]).unwrap_err(),
            CompileError::UnbalancedParens
        );
        assert_eq!(
            compile(&[ExprToken::Lparen, ExprToken::Rparen]).unwrap_err(),
            CompileError::EmptyGroup(1)
        );
    }

    #[test]
    fn test_operator_count_invariant() {
        // N subexpressions require exactly N-1 operators
        let missing = compile(&[state("a", 1.0), ExprToken::And, state("b", 2.0), state("c", 3.0)]);
        assert!(matches!(
            missing.unwrap_err(),
            CompileError::AdjacentSubexpressions(_)
        ));

        let extra = compile(&[
            state("a", 1.0),
            ExprToken::And,
            state("b", 2.0),
            ExprToken::And,
        ]);
        assert!(matches!(extra.unwrap_err(), CompileError::DanglingOperator(_)));
    }

    #[test]
    fn test_to_tokens_roundtrip() {
        let tokens = vec![
            ExprToken::Lparen,
            state("a", 1.0),
            ExprToken::Or,
            state("b", 2.0),
            ExprToken::Rparen,
            ExprToken::And,
            state("c", 3.0),
        ];
        let ast = compile(&tokens).unwrap();
        let reparsed = compile(&ast.to_tokens()).unwrap();
        assert_eq!(reparsed, ast);
    }

    #[test]
    fn test_check_references() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .add_property("therm", "ST", PropertyDef::numeric(17, 1))
            .add_command("keypad", "DON", CommandDef::bare().with_param("level", 51));

        let good = [
            ExprToken::State(StateCompare {
                device: "therm".into(),
                property: "ST".into(),
                op: CompareOp::Gt,
                literal: NumericLiteral::new(75.0, 17),
            }),
            ExprToken::And,
            control("keypad"),
        ];
        assert!(check_references(&good, &catalog).is_ok());

        let bad_device = [state("ghost", 1.0)];
        assert_eq!(
            check_references(&bad_device, &catalog).unwrap_err(),
            ReferenceError::UnknownDevice("ghost".into())
        );

        let bad_property = [ExprToken::State(StateCompare {
            device: "therm".into(),
            property: "OL".into(),
            op: CompareOp::Eq,
            literal: NumericLiteral::new(0.0, 17),
        })];
        assert!(matches!(
            check_references(&bad_property, &catalog).unwrap_err(),
            ReferenceError::UnknownProperty { .. }
        ));

        let bad_param = [ExprToken::Control(ControlMatch {
            device: "keypad".into(),
            equality: Equality::Is,
            command: "DON".into(),
            parameters: vec![routine_core::Parameter {
                id: "ramp".into(),
                value: NumericLiteral::new(1.0, 51),
            }],
        })];
        assert!(matches!(
            check_references(&bad_param, &catalog).unwrap_err(),
            ReferenceError::UnknownParameter { .. }
        ));
    }
}
