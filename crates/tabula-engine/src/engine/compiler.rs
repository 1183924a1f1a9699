//! Compile formula ASTs into stack programs and run them.
//!
//! A compiled [`Formula`] keeps its source text, the parsed tree, a flat
//! program of [`Op`]s and every reference the formula reads (in order of
//! appearance, both branches of every `IF` included). The program is run
//! against a [`Resolver`], which supplies cell values and drives
//! asynchronous function calls.

use std::cmp::Ordering;
use std::rc::Rc;

use super::error::EngineError;
use super::functions::{ArgType, Compute, FunctionDescriptor, FunctionRegistry};
use super::parser::{Ast, BinaryOp, UnaryOp, parse};
use super::reference::Reference;
use super::value::{CellError, Value};

#[derive(Clone, Debug)]
pub enum Op {
    Push(Value),
    /// Push the value of `references[index]` (a single cell).
    Load(usize),
    /// Push the values of `references[index]` (a range).
    LoadRange(usize),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Call {
        descriptor: Rc<FunctionDescriptor>,
        argc: usize,
        /// Position of the call among the formula's calls, used to memoize
        /// asynchronous results.
        site: usize,
    },
}

/// A compiled formula.
#[derive(Clone, Debug)]
pub struct Formula {
    pub text: String,
    pub ast: Ast,
    pub program: Vec<Op>,
    pub references: Vec<Reference>,
}

/// Returned by [`Formula::execute`] when an asynchronous call has no
/// result yet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Suspended;

/// Supplies data to a running program.
pub trait Resolver {
    fn resolve_cell(&mut self, reference: &Reference) -> Value;

    /// Values of the range's cells, row-major. Empty cells may be left out.
    fn resolve_range(&mut self, reference: &Reference) -> Vec<Value>;

    /// Result of an asynchronous call, or `None` while it is outstanding.
    fn call_async(
        &mut self,
        site: usize,
        descriptor: &Rc<FunctionDescriptor>,
        args: &[Value],
    ) -> Option<Value>;
}

/// The value shown by a cell whose formula does not compile.
pub fn compile_error_value(error: &EngineError) -> Value {
    match error {
        EngineError::UnknownFunction(_) => Value::Error(CellError::Name),
        _ => Value::Error(CellError::Error),
    }
}

/// Parse and compile formula text.
pub fn compile(text: &str, registry: &FunctionRegistry) -> Result<Formula, EngineError> {
    let ast = parse(text, registry)?;
    let mut compiler = Compiler {
        registry,
        program: Vec::new(),
        references: Vec::new(),
        sites: 0,
    };
    compiler.emit(&ast)?;
    Ok(Formula {
        text: text.to_string(),
        ast,
        program: compiler.program,
        references: compiler.references,
    })
}

struct Compiler<'a> {
    registry: &'a FunctionRegistry,
    program: Vec<Op>,
    references: Vec<Reference>,
    sites: usize,
}

impl Compiler<'_> {
    fn emit(&mut self, ast: &Ast) -> Result<(), EngineError> {
        match ast {
            Ast::Number(n) => self.program.push(Op::Push(Value::Number(*n))),
            Ast::Text(s) => self.program.push(Op::Push(Value::Text(s.clone()))),
            Ast::Boolean(b) => self.program.push(Op::Push(Value::Boolean(*b))),
            Ast::Error(e) => self.program.push(Op::Push(Value::Error(*e))),
            Ast::Name(_) => self.program.push(Op::Push(Value::Error(CellError::Name))),
            Ast::Reference(reference) => {
                let index = self.references.len();
                self.references.push(reference.clone());
                self.program.push(if reference.is_range() {
                    Op::LoadRange(index)
                } else {
                    Op::Load(index)
                });
            }
            Ast::Unary { op, operand } => {
                self.emit(operand)?;
                self.program.push(Op::Unary(*op));
            }
            Ast::Binary { op, left, right } => {
                self.emit(left)?;
                self.emit(right)?;
                self.program.push(Op::Binary(*op));
            }
            Ast::Call { name, args } => {
                let descriptor = self
                    .registry
                    .get(name)
                    .ok_or_else(|| EngineError::UnknownFunction(name.clone()))?;
                for arg in args {
                    self.emit(arg)?;
                }
                let site = self.sites;
                self.sites += 1;
                self.program.push(Op::Call {
                    descriptor,
                    argc: args.len(),
                    site,
                });
            }
        }
        Ok(())
    }
}

enum Operand {
    Value(Value),
    Range { values: Vec<Value>, single: bool },
}

impl Operand {
    /// Scalar view; a multi-cell range is not a scalar.
    fn into_value(self) -> Value {
        match self {
            Operand::Value(v) => v,
            Operand::Range { values, single: true } => {
                values.into_iter().next().unwrap_or_default()
            }
            Operand::Range { single: false, .. } => Value::Error(CellError::Value),
        }
    }
}

impl Formula {
    /// Run the program. An empty result reads as `0`.
    pub fn execute(&self, resolver: &mut dyn Resolver) -> Result<Value, Suspended> {
        let mut stack: Vec<Operand> = Vec::new();
        for op in &self.program {
            match op {
                Op::Push(v) => stack.push(Operand::Value(v.clone())),
                Op::Load(i) => stack.push(Operand::Value(
                    resolver.resolve_cell(&self.references[*i]),
                )),
                Op::LoadRange(i) => {
                    let reference = &self.references[*i];
                    stack.push(Operand::Range {
                        values: resolver.resolve_range(reference),
                        single: reference.zone().is_single_cell(),
                    });
                }
                Op::Unary(op) => {
                    let operand = pop(&mut stack).into_value();
                    stack.push(Operand::Value(apply_unary(*op, &operand)));
                }
                Op::Binary(op) => {
                    let right = pop(&mut stack).into_value();
                    let left = pop(&mut stack).into_value();
                    stack.push(Operand::Value(apply_binary(*op, &left, &right)));
                }
                Op::Call {
                    descriptor,
                    argc,
                    site,
                } => {
                    let split = stack.len().saturating_sub(*argc);
                    let operands: Vec<Operand> = stack.split_off(split);
                    let value = match coerce_args(descriptor, operands) {
                        Err(e) => Value::Error(e),
                        Ok(args) => match &descriptor.compute {
                            Compute::Sync(body) => body(&args),
                            Compute::Async(_) => {
                                resolver.call_async(*site, descriptor, &args).ok_or(Suspended)?
                            }
                        },
                    };
                    stack.push(Operand::Value(value));
                }
            }
        }
        Ok(match pop(&mut stack).into_value() {
            Value::Empty => Value::Number(0.0),
            other => other,
        })
    }
}

fn pop(stack: &mut Vec<Operand>) -> Operand {
    stack
        .pop()
        .unwrap_or(Operand::Value(Value::Error(CellError::Error)))
}

/// Coerce call operands to the declared argument types. Ranges only
/// flatten into repeating arguments; empty cells and values of the wrong
/// type inside a range are skipped.
fn coerce_args(
    descriptor: &FunctionDescriptor,
    operands: Vec<Operand>,
) -> Result<Vec<Value>, CellError> {
    let mut args = Vec::with_capacity(operands.len());
    for (i, operand) in operands.into_iter().enumerate() {
        let Some(spec) = descriptor.spec_for(i) else {
            return Err(CellError::Error);
        };
        match operand {
            Operand::Range { values, .. } if spec.repeating => {
                for value in values {
                    if spec.ty == ArgType::Any {
                        if value != Value::Empty {
                            args.push(value);
                        }
                        continue;
                    }
                    if let Value::Error(e) = value {
                        return Err(e);
                    }
                    if let Some(v) = coerce_range_item(spec.ty, value) {
                        args.push(v);
                    }
                }
            }
            operand => {
                let value = operand.into_value();
                args.push(coerce_scalar(spec.ty, value)?);
            }
        }
    }
    Ok(args)
}

fn coerce_scalar(ty: ArgType, value: Value) -> Result<Value, CellError> {
    match ty {
        ArgType::Any => Ok(value),
        ArgType::Number => value.to_number().map(Value::Number),
        ArgType::Boolean => value.to_boolean().map(Value::Boolean),
        ArgType::String => value.to_text().map(Value::Text),
    }
}

fn coerce_range_item(ty: ArgType, value: Value) -> Option<Value> {
    match (ty, value) {
        (_, Value::Empty) => None,
        (ArgType::Number, v @ Value::Number(_)) => Some(v),
        (ArgType::Number, _) => None,
        (ArgType::Boolean, v @ Value::Boolean(_)) => Some(v),
        (ArgType::Boolean, Value::Number(n)) => Some(Value::Boolean(n != 0.0)),
        (ArgType::Boolean, _) => None,
        (_, v) => Some(v),
    }
}

fn apply_unary(op: UnaryOp, operand: &Value) -> Value {
    let n = match operand.to_number() {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    match op {
        UnaryOp::Neg => Value::Number(-n),
        UnaryOp::Plus => Value::Number(n),
        UnaryOp::Percent => Value::Number(n / 100.0),
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Concat => match (left.to_text(), right.to_text()) {
            (Ok(a), Ok(b)) => Value::Text(a + &b),
            (Err(e), _) | (_, Err(e)) => Value::Error(e),
        },
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Gt
        | BinaryOp::Le
        | BinaryOp::Ge => {
            if let Some(e) = left.error().or(right.error()) {
                return Value::Error(e);
            }
            let ordering = compare(left, right);
            Value::Boolean(match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Ne => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Le => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        _ => {
            let (a, b) = match (left.to_number(), right.to_number()) {
                (Ok(a), Ok(b)) => (a, b),
                (Err(e), _) | (_, Err(e)) => return Value::Error(e),
            };
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div if b == 0.0 => return Value::Error(CellError::Error),
                BinaryOp::Div => a / b,
                _ => a.powf(b),
            };
            if result.is_finite() {
                Value::Number(result)
            } else {
                Value::Error(CellError::Error)
            }
        }
    }
}

/// Total order used by comparison operators: numbers < text < booleans,
/// text compared case-insensitively. Empty takes the type of the other side.
fn compare(left: &Value, right: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) | Value::Empty => 0,
            Value::Text(_) => 1,
            _ => 2,
        }
    }
    let left = empty_as(left, right);
    let right = empty_as(right, &left);
    match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Value::Text(a), Value::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        _ => rank(&left).cmp(&rank(&right)),
    }
}

fn empty_as(value: &Value, other: &Value) -> Value {
    match (value, other) {
        (Value::Empty, Value::Text(_)) => Value::Text(String::new()),
        (Value::Empty, Value::Boolean(_)) => Value::Boolean(false),
        (Value::Empty, _) => Value::Number(0.0),
        (v, _) => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Zone;
    use std::collections::HashMap;

    /// Resolver over a fixed map of A1-style cells on a single sheet.
    struct MapResolver {
        cells: HashMap<(usize, usize), Value>,
        pending: bool,
    }

    impl MapResolver {
        fn new(cells: &[(&str, Value)]) -> Self {
            let cells = cells
                .iter()
                .map(|(xc, v)| {
                    let zone = Zone::parse(xc).unwrap();
                    ((zone.left, zone.top), v.clone())
                })
                .collect();
            MapResolver {
                cells,
                pending: false,
            }
        }
    }

    impl Resolver for MapResolver {
        fn resolve_cell(&mut self, reference: &Reference) -> Value {
            let z = reference.zone();
            self.cells.get(&(z.left, z.top)).cloned().unwrap_or_default()
        }

        fn resolve_range(&mut self, reference: &Reference) -> Vec<Value> {
            reference
                .zone()
                .positions()
                .map(|p| self.cells.get(&(p.col, p.row)).cloned().unwrap_or_default())
                .collect()
        }

        fn call_async(
            &mut self,
            _site: usize,
            _descriptor: &Rc<FunctionDescriptor>,
            args: &[Value],
        ) -> Option<Value> {
            if self.pending {
                None
            } else {
                args.first().cloned()
            }
        }
    }

    fn eval_with(formula: &str, resolver: &mut MapResolver) -> Value {
        let registry = FunctionRegistry::with_builtins();
        compile(formula, &registry).unwrap().execute(resolver).unwrap()
    }

    fn eval(formula: &str) -> Value {
        eval_with(formula, &mut MapResolver::new(&[]))
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("=1+2*3"), Value::Number(7.0));
        assert_eq!(eval("=-2^2"), Value::Number(-4.0));
        assert_eq!(eval("=2^3^2"), Value::Number(512.0));
        assert_eq!(eval("=50%"), Value::Number(0.5));
        assert_eq!(eval("=1/0"), Value::Error(CellError::Error));
        assert_eq!(eval("=\"a\"+1"), Value::Error(CellError::Value));
        assert_eq!(eval("=\"2\"*3"), Value::Number(6.0));
    }

    #[test]
    fn test_concat_and_compare() {
        assert_eq!(eval("=1&\"x\""), Value::Text("1x".into()));
        assert_eq!(eval("=\"abc\"=\"ABC\""), Value::Boolean(true));
        assert_eq!(eval("=1<\"a\""), Value::Boolean(true));
        assert_eq!(eval("=TRUE>\"z\""), Value::Boolean(true));
        assert_eq!(eval("=2>=2"), Value::Boolean(true));
        assert_eq!(eval("=1<>1"), Value::Boolean(false));
    }

    #[test]
    fn test_references_and_ranges() {
        let mut resolver = MapResolver::new(&[
            ("A1", Value::Number(1.0)),
            ("A2", Value::Number(2.0)),
            ("A3", Value::Text("x".into())),
        ]);
        assert_eq!(eval_with("=A1+A2", &mut resolver), Value::Number(3.0));
        assert_eq!(eval_with("=SUM(A1:A4)", &mut resolver), Value::Number(3.0));
        assert_eq!(eval_with("=COUNT(A1:A4)", &mut resolver), Value::Number(2.0));
        assert_eq!(
            eval_with("=A1:A2+1", &mut resolver),
            Value::Error(CellError::Value)
        );
        assert_eq!(eval_with("=B9", &mut resolver), Value::Number(0.0));
    }

    #[test]
    fn test_error_propagation() {
        let mut resolver = MapResolver::new(&[("A1", Value::Error(CellError::Cycle))]);
        assert_eq!(
            eval_with("=A1+1", &mut resolver),
            Value::Error(CellError::Cycle)
        );
        assert_eq!(
            eval_with("=SUM(A1:A2)", &mut resolver),
            Value::Error(CellError::Cycle)
        );
        assert_eq!(eval("=foo"), Value::Error(CellError::Name));
        assert_eq!(eval("=#REF+1"), Value::Error(CellError::Ref));
    }

    #[test]
    fn test_references_are_extracted_from_every_branch() {
        let registry = FunctionRegistry::with_builtins();
        let formula = compile("=IF(A1, Sheet2!B1, SUM(C1:C3))", &registry).unwrap();
        let refs: Vec<String> = formula.references.iter().map(|r| r.to_string()).collect();
        assert_eq!(refs, vec!["A1", "Sheet2!B1", "C1:C3"]);
    }

    #[test]
    fn test_async_call_suspends() {
        let registry = FunctionRegistry::with_builtins();
        let formula = compile("=WAIT(10)+1", &registry).unwrap();
        let mut resolver = MapResolver::new(&[]);
        resolver.pending = true;
        assert_eq!(formula.execute(&mut resolver), Err(Suspended));
        resolver.pending = false;
        assert_eq!(formula.execute(&mut resolver), Ok(Value::Number(11.0)));
    }

    #[test]
    fn test_compile_error_values() {
        let registry = FunctionRegistry::with_builtins();
        let unknown = compile("=NOPE()", &registry).unwrap_err();
        assert_eq!(compile_error_value(&unknown), Value::Error(CellError::Name));
        let syntax = compile("=1+", &registry).unwrap_err();
        assert_eq!(compile_error_value(&syntax), Value::Error(CellError::Error));
    }
}
