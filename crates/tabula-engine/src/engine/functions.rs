//! Function registry: metadata and compute bodies for formula functions.
//!
//! Argument lists are declared with a compact line-based syntax, one
//! argument per line:
//!
//! ```text
//! condition (boolean) logical part
//! valueFalse (any, optional) value when the condition is false
//! logicalPart (boolean, repeating) logical part
//! ```

use futures::future::LocalBoxFuture;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;

use super::error::EngineError;
use super::value::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArgType {
    Number,
    Boolean,
    String,
    Any,
}

impl ArgType {
    fn parse(text: &str) -> Option<ArgType> {
        match text.to_ascii_lowercase().as_str() {
            "number" => Some(ArgType::Number),
            "boolean" => Some(ArgType::Boolean),
            "string" => Some(ArgType::String),
            "any" => Some(ArgType::Any),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub ty: ArgType,
    pub optional: bool,
    pub repeating: bool,
    pub description: String,
}

fn arg_line_re() -> &'static Regex {
    static ARG_RE: OnceLock<Regex> = OnceLock::new();
    ARG_RE.get_or_init(|| {
        Regex::new(r"^(?<name>[A-Za-z_][A-Za-z0-9_]*)\s*\((?<flags>[^)]*)\)\s*(?<desc>.*)$")
            .expect("argument declaration regex must compile")
    })
}

/// Parse an argument declaration block (see module docs).
pub fn parse_args(decl: &str) -> Result<Vec<ArgSpec>, EngineError> {
    let mut specs = Vec::new();
    for line in decl.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let caps = arg_line_re()
            .captures(line)
            .ok_or_else(|| EngineError::InvalidArgumentSpec(line.to_string()))?;
        let mut ty = None;
        let mut optional = false;
        let mut repeating = false;
        for flag in caps["flags"].split(',').map(str::trim) {
            match flag.to_ascii_lowercase().as_str() {
                "optional" => optional = true,
                "repeating" => repeating = true,
                other => {
                    ty = Some(
                        ArgType::parse(other)
                            .ok_or_else(|| EngineError::InvalidArgumentSpec(line.to_string()))?,
                    )
                }
            }
        }
        specs.push(ArgSpec {
            name: caps["name"].to_string(),
            ty: ty.unwrap_or(ArgType::Any),
            optional,
            repeating,
            description: caps["desc"].trim().to_string(),
        });
    }
    Ok(specs)
}

pub type SyncCompute = Rc<dyn Fn(&[Value]) -> Value>;
pub type AsyncCompute = Rc<dyn Fn(&[Value]) -> LocalBoxFuture<'static, Value>>;

#[derive(Clone)]
pub enum Compute {
    Sync(SyncCompute),
    /// Returns a deferred value; the evaluator drives it on its local executor.
    Async(AsyncCompute),
}

#[derive(Clone)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    pub args: Vec<ArgSpec>,
    pub returns: ArgType,
    pub compute: Compute,
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("returns", &self.returns)
            .field("async", &self.is_async())
            .finish()
    }
}

impl FunctionDescriptor {
    pub fn new_sync(
        name: &str,
        description: &str,
        args: &str,
        returns: ArgType,
        body: impl Fn(&[Value]) -> Value + 'static,
    ) -> Result<Self, EngineError> {
        Ok(FunctionDescriptor {
            name: name.to_ascii_uppercase(),
            description: description.to_string(),
            args: parse_args(args)?,
            returns,
            compute: Compute::Sync(Rc::new(body)),
        })
    }

    pub fn new_async(
        name: &str,
        description: &str,
        args: &str,
        returns: ArgType,
        body: impl Fn(&[Value]) -> LocalBoxFuture<'static, Value> + 'static,
    ) -> Result<Self, EngineError> {
        Ok(FunctionDescriptor {
            name: name.to_ascii_uppercase(),
            description: description.to_string(),
            args: parse_args(args)?,
            returns,
            compute: Compute::Async(Rc::new(body)),
        })
    }

    pub fn is_async(&self) -> bool {
        matches!(self.compute, Compute::Async(_))
    }

    pub fn min_args(&self) -> usize {
        self.args
            .iter()
            .filter(|a| !a.optional && !a.repeating)
            .count()
    }

    /// `None` when the last argument repeats.
    pub fn max_args(&self) -> Option<usize> {
        if self.args.iter().any(|a| a.repeating) {
            None
        } else {
            Some(self.args.len())
        }
    }

    /// Declared spec for the argument at `index`; trailing repeating
    /// arguments absorb every extra index.
    pub fn spec_for(&self, index: usize) -> Option<&ArgSpec> {
        self.args
            .get(index)
            .or_else(|| self.args.last().filter(|a| a.repeating))
    }

    pub fn check_arity(&self, got: usize) -> Result<(), EngineError> {
        let min = self.min_args();
        let max = self.max_args();
        if got < min || max.is_some_and(|m| got > m) {
            let expected = match max {
                Some(m) if m == min => min.to_string(),
                Some(m) => format!("{}..{}", min, m),
                None => format!("at least {}", min),
            };
            return Err(EngineError::ArgumentCountMismatch {
                name: self.name.clone(),
                expected,
                got,
            });
        }
        Ok(())
    }
}

/// Uppercase name -> descriptor.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Rc<FunctionDescriptor>>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register_builtins(&mut registry);
        registry
    }

    /// Register (or replace) a function.
    pub fn register(&mut self, descriptor: FunctionDescriptor) {
        self.functions
            .insert(descriptor.name.clone(), Rc::new(descriptor));
    }

    pub fn get(&self, name: &str) -> Option<Rc<FunctionDescriptor>> {
        self.functions.get(&name.to_ascii_uppercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_ascii_uppercase())
    }

    /// Sorted function names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}
