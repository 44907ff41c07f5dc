//! Extension packages.
//!
//! A [`Package`] bundles native functions, type tags and constant bindings under one
//! name. [`Evaluator::load_package`](crate::evaluator::Evaluator::load_package) installs
//! everything a package provides into the active environment; names that are already
//! bound are replaced, so a package can override a builtin.

use crate::Error;
use crate::ast::{Symbol, Value};
use crate::evaluator::Evaluator;
use crate::function::NativeFunction;
use crate::types::{BaseType, TypeTag};
use std::rc::Rc;

pub trait Package {
    fn name(&self) -> &str;

    fn functions(&self) -> Vec<NativeFunction>;

    fn types(&self) -> Vec<TypeTag> {
        Vec::new()
    }

    fn symbols(&self) -> Vec<(Symbol, Value)> {
        Vec::new()
    }
}

/// Floating point functions over `:number` and the constants `pi` and `e`
#[derive(Debug, Clone, Copy, Default)]
pub struct MathPackage;

/// Name and implementation of each one-argument math function
const UNARY: [(&str, fn(f64) -> f64); 12] = [
    ("abs", f64::abs),
    ("sqrt", f64::sqrt),
    ("sin", f64::sin),
    ("cos", f64::cos),
    ("tan", f64::tan),
    ("asin", f64::asin),
    ("acos", f64::acos),
    ("atan", f64::atan),
    ("exp", f64::exp),
    ("log", f64::ln),
    ("floor", f64::floor),
    ("ceil", f64::ceil),
];

fn unary(name: &'static str, f: fn(f64) -> f64) -> NativeFunction {
    NativeFunction::new(name, 1, move |_: &mut Evaluator, args: Vec<Value>| {
        match args.as_slice() {
            // abs keeps integers integral
            [Value::Integer(n)] if name == "abs" => n
                .checked_abs()
                .map(Value::Integer)
                .ok_or_else(|| Error::EvalError("integer overflow in abs".into())),
            [Value::Integer(n)] => Ok(Value::Float(f(*n as f64))),
            [Value::Float(x)] => Ok(Value::Float(f(*x))),
            _ => Err(Error::EvalError(format!("{name}: expected a number"))),
        }
    })
    .with_types([BaseType::Number.tag()])
}

impl Package for MathPackage {
    fn name(&self) -> &str {
        "math"
    }

    fn functions(&self) -> Vec<NativeFunction> {
        UNARY.iter().map(|&(name, f)| unary(name, f)).collect()
    }

    fn symbols(&self) -> Vec<(Symbol, Value)> {
        vec![
            (Rc::from("pi"), Value::Float(std::f64::consts::PI)),
            (Rc::from("e"), Value::Float(std::f64::consts::E)),
        ]
    }
}
