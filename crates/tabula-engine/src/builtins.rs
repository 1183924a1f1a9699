//! Built-in spreadsheet functions and their metadata.
//!
//! Conventions:
//! - Names are ALL CAPS (`SUM`, `IF`); lookups are case-insensitive.
//! - Arguments arrive already coerced to their declared type, with error
//!   arguments short-circuited (except for `any` arguments).
//! - A new built-in needs one entry in `register_builtins`.

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use futures_timer::Delay;
use std::time::Duration;

use crate::engine::{ArgType, CellError, FunctionDescriptor, FunctionRegistry, Value};

/// Register every built-in into `registry`.
pub fn register_builtins(registry: &mut FunctionRegistry) {
    let sync: [(&str, &str, &str, ArgType, fn(&[Value]) -> Value); 11] = [
        (
            "AND",
            "Whether all values are true.",
            "logicalExpression (boolean, repeating) An expression or reference to a cell containing an expression that represents some logical value.",
            ArgType::Boolean,
            and,
        ),
        (
            "OR",
            "Whether any values are true.",
            "logicalExpression (boolean, repeating) An expression or reference to a cell containing an expression that represents some logical value.",
            ArgType::Boolean,
            or,
        ),
        (
            "XOR",
            "Whether an odd number of values are true.",
            "logicalExpression (boolean, repeating) An expression or reference to a cell containing an expression that represents some logical value.",
            ArgType::Boolean,
            xor,
        ),
        (
            "NOT",
            "Returns opposite of provided logical value.",
            "logicalExpression (boolean) An expression or reference to a cell holding an expression that represents some logical value.",
            ArgType::Boolean,
            not,
        ),
        (
            "IF",
            "Returns value depending on logical expression.",
            "logicalExpression (boolean) An expression or reference to a cell containing an expression that represents some logical value, i.e. TRUE or FALSE.
             valueIfTrue (any) The value the function returns if logical_expression is TRUE.
             valueIfFalse (any, optional) The value the function returns if logical_expression is FALSE.",
            ArgType::Any,
            if_,
        ),
        (
            "SUM",
            "Sum of a series of numbers and/or cells.",
            "value (number, repeating) A number or range to add together.",
            ArgType::Number,
            sum,
        ),
        (
            "AVERAGE",
            "Numerical average value in a dataset.",
            "value (number, repeating) A value or range to consider when calculating the average value.",
            ArgType::Number,
            average,
        ),
        (
            "MIN",
            "Minimum value in a numeric dataset.",
            "value (number, repeating) A value or range to consider when calculating the minimum value.",
            ArgType::Number,
            min,
        ),
        (
            "MAX",
            "Maximum value in a numeric dataset.",
            "value (number, repeating) A value or range to consider when calculating the maximum value.",
            ArgType::Number,
            max,
        ),
        (
            "COUNT",
            "The number of numeric values in a dataset.",
            "value (any, repeating) A value or range to consider when counting.",
            ArgType::Number,
            count,
        ),
        (
            "ABS",
            "Absolute value of a number.",
            "value (number) The number of which to return the absolute value.",
            ArgType::Number,
            abs,
        ),
    ];

    for (name, description, args, returns, body) in sync {
        match FunctionDescriptor::new_sync(name, description, args, returns, body) {
            Ok(descriptor) => registry.register(descriptor),
            Err(e) => tracing::warn!("skipping built-in {}: {}", name, e),
        }
    }

    match FunctionDescriptor::new_async(
        "WAIT",
        "Wait before returning the given number.",
        "ms (number) wait time in milliseconds",
        ArgType::Number,
        wait,
    ) {
        Ok(descriptor) => registry.register(descriptor),
        Err(e) => tracing::warn!("skipping built-in WAIT: {}", e),
    }
}

fn booleans(args: &[Value]) -> impl Iterator<Item = bool> + '_ {
    args.iter().map(|v| matches!(v, Value::Boolean(true)))
}

fn numbers(args: &[Value]) -> impl Iterator<Item = f64> + '_ {
    args.iter().filter_map(|v| match v {
        Value::Number(n) => Some(*n),
        _ => None,
    })
}

fn and(args: &[Value]) -> Value {
    Value::Boolean(booleans(args).all(|b| b))
}

fn or(args: &[Value]) -> Value {
    Value::Boolean(booleans(args).any(|b| b))
}

fn xor(args: &[Value]) -> Value {
    Value::Boolean(booleans(args).filter(|b| *b).count() % 2 == 1)
}

fn not(args: &[Value]) -> Value {
    Value::Boolean(!booleans(args).next().unwrap_or(false))
}

fn if_(args: &[Value]) -> Value {
    if matches!(args.first(), Some(Value::Boolean(true))) {
        args.get(1).cloned().unwrap_or_default()
    } else {
        args.get(2).cloned().unwrap_or(Value::Boolean(false))
    }
}

fn sum(args: &[Value]) -> Value {
    Value::Number(numbers(args).sum())
}

fn average(args: &[Value]) -> Value {
    let (total, count) = numbers(args).fold((0.0, 0usize), |(t, c), n| (t + n, c + 1));
    if count == 0 {
        return Value::Error(CellError::Error);
    }
    Value::Number(total / count as f64)
}

fn min(args: &[Value]) -> Value {
    Value::Number(numbers(args).reduce(f64::min).unwrap_or(0.0))
}

fn max(args: &[Value]) -> Value {
    Value::Number(numbers(args).reduce(f64::max).unwrap_or(0.0))
}

fn count(args: &[Value]) -> Value {
    Value::Number(numbers(args).count() as f64)
}

fn abs(args: &[Value]) -> Value {
    Value::Number(numbers(args).next().unwrap_or(0.0).abs())
}

/// Longest delay `WAIT` honours; longer ones are clamped.
const MAX_WAIT_MILLIS: f64 = i32::MAX as f64;

/// Resolves to its argument once the delay has elapsed.
fn wait(args: &[Value]) -> LocalBoxFuture<'static, Value> {
    let delay = numbers(args).next().unwrap_or(0.0);
    if !delay.is_finite() {
        return future::ready(Value::Error(CellError::Error)).boxed_local();
    }
    let millis = delay.clamp(0.0, MAX_WAIT_MILLIS) as u64;
    async move {
        Delay::new(Duration::from_millis(millis)).await;
        Value::Number(delay)
    }
    .boxed_local()
}
