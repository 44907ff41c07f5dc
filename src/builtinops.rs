//! Built-in operations registry.
//!
//! Every native function and special form the default environment starts with is one
//! [`BuiltinOp`] row in a single static table. A row carries everything the evaluator
//! needs to call the operation: its arity, whether it takes extra arguments, the
//! declared type of each leading argument, and the level its operands are evaluated at.
//!
//! ## Functions vs Special Forms
//!
//! - **Functions** ([`EvalLevel::Full`]) receive evaluated arguments (`+`, `car`, `list`)
//! - **Special forms** ([`EvalLevel::None`]) receive their operands as written and decide
//!   themselves what to evaluate (`if`, `let`, `define`, `\`)
//!
//! Special forms are bound like any other value, so they can be passed around and
//! shadowed by a `define`. They do not curry: too few operands is an arity error.
//!
//! Rows marked impure (output, mutation, fresh mutable values, `eval` and `apply`) are
//! never run while a curried body is reduced ahead of time; their calls wait for the
//! full call.
//!
//! ## Error Handling
//!
//! - **Type Safety**: declared argument types are checked before the operation runs, so
//!   `(+ "a" 2)` fails with a type mismatch at position 0
//! - **Overflow Detection**: integer arithmetic is checked and reports overflow
//! - **Shape Checking**: special forms reject malformed operands with
//!   [`Error::MalformedForm`]
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the signature
//!    `fn(&mut Evaluator, Vec<Value>) -> Result<Value, Error>`
//! 2. **Add a row to BUILTIN_OPS** with its identifier, arity, types and level
//! 3. **Add tests** covering edge cases and error conditions

use crate::Error;
use crate::ast::{Symbol, Value};
use crate::evaluator::Evaluator;
use crate::function::{Closure, EvalLevel, NativeFunction};
use crate::structs::{FieldSpec, StructRef};
use crate::types::BaseType;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;

/// Erased signature shared by every builtin
pub(crate) type OperationFn = fn(&mut Evaluator, Vec<Value>) -> Result<Value, Error>;

/// Definition of a built-in operation
#[derive(Debug, Clone, Copy)]
pub struct BuiltinOp {
    /// Identifier the operation is bound to in the default environment
    pub id: &'static str,
    /// Number of arguments needed before the operation runs; fewer curries it
    pub arity: usize,
    /// Whether arguments beyond `arity` are accepted
    pub variadic: bool,
    /// Declared types of the leading arguments; later positions are unchecked
    pub argument_types: &'static [BaseType],
    pub eval_level: EvalLevel,
    /// Whether the operation may run during partial evaluation
    pub pure: bool,
    pub op: OperationFn,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Identifiers are unique within the registry
        self.id == other.id
    }
}

impl BuiltinOp {
    /// Wrap this row as a callable value for an environment
    pub fn to_native(&self) -> NativeFunction {
        let native = NativeFunction::new(self.id, self.arity, self.op)
            .with_types(self.argument_types.iter().map(|base| base.tag()))
            .with_level(self.eval_level);
        let native = if self.variadic { native.variadic() } else { native };
        if self.pure { native } else { native.impure() }
    }
}

//
// Special Forms
//

/// `(\ (params...) body...)`
fn special_lambda(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let mut args = args.into_iter();
    let params = args.next().unwrap_or(Value::Nil);
    let mut names: Vec<Symbol> = Vec::new();
    for param in params.to_vec().map_err(|_| lambda_params_error(&params))? {
        let Value::Symbol(name) = param else {
            return Err(lambda_params_error(&params));
        };
        if names.contains(&name) {
            return Err(Error::malformed(
                "\\",
                format!("parameter {name} appears more than once"),
            ));
        }
        names.push(name);
    }
    let body: Vec<Value> = args.collect();
    let closure = Closure::new(names, body, ev.env().clone());
    Ok(Value::Closure(Rc::new(closure)))
}

fn lambda_params_error(params: &Value) -> Error {
    Error::malformed("\\", format!("expected a list of parameter symbols, got {params}"))
}

/// `(define name expr)`
fn special_define(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [name, expr] = fixed_operands::<2>("define", args)?;
    let name = operand_symbol("define", &name)?;
    let value = ev.eval_full(&expr)?;
    ev.env_mut().put(name, value.clone());
    Ok(value)
}

/// `(undefine name...)`
fn special_undefine(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    for name in &args {
        let name = operand_symbol("undefine", name)?;
        ev.env_mut().remove(&name);
    }
    Ok(Value::Nil)
}

/// `(let ((name expr)...) body...)`
fn special_let(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let mut args = args.into_iter();
    let entries = args.next().unwrap_or(Value::Nil);
    let entries = entries
        .to_vec()
        .map_err(|_| Error::malformed("let", format!("expected a list of bindings, got {entries}")))?;

    // Inits see the enclosing environment, not each other
    let mut bindings = Vec::with_capacity(entries.len());
    for entry in entries {
        let shape_error =
            || Error::malformed("let", format!("binding {entry} should be (name expr)"));
        let pair = entry.to_vec().map_err(|_| shape_error())?;
        let [Value::Symbol(name), expr] = pair.as_slice() else {
            return Err(shape_error());
        };
        bindings.push((Rc::clone(name), ev.eval_full(expr)?));
    }

    let mut frame = ev.env().clone();
    for (name, value) in bindings {
        frame.put(name, value);
    }
    let body: Vec<Value> = args.collect();
    ev.with_scope(frame, |ev| ev.eval_body(&body))
}

/// `(if cond then else)`
fn special_if(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [cond, then, otherwise] = fixed_operands::<3>("if", args)?;
    if ev.eval_full(&cond)?.is_truthy() {
        ev.eval_full(&then)
    } else {
        ev.eval_full(&otherwise)
    }
}

/// `(and expr...)`: first false value, or the last value
fn special_and(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let mut result = Value::True;
    for expr in &args {
        result = ev.eval_full(expr)?;
        if !result.is_truthy() {
            break;
        }
    }
    Ok(result)
}

/// `(or expr...)`: first true value, or `nil`
fn special_or(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    for expr in &args {
        let value = ev.eval_full(expr)?;
        if value.is_truthy() {
            return Ok(value);
        }
    }
    Ok(Value::Nil)
}

fn special_quote(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [quoted] = fixed_operands::<1>("quote", args)?;
    Ok(quoted)
}

/// `(defstruct name (field...))`
fn special_defstruct(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [name, fields] = fixed_operands::<2>("defstruct", args)?;
    let name = operand_symbol("defstruct", &name)?;
    let fields = field_specs(ev, "defstruct", &fields)?;
    ev.define_struct(&name, fields)
}

/// `(substruct name parent (field...))`
fn special_substruct(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [name, parent, fields] = fixed_operands::<3>("substruct", args)?;
    let name = operand_symbol("substruct", &name)?;
    let parent = operand_symbol("substruct", &parent)?;
    let fields = field_specs(ev, "substruct", &fields)?;
    ev.derive_struct(&name, &parent, fields)
}

/// Parse `(name)`, `(name default)`, `(name :type)` or `(name :type default)` entries
fn field_specs(ev: &mut Evaluator, form: &str, fields: &Value) -> Result<Vec<FieldSpec>, Error> {
    let entries = fields
        .to_vec()
        .map_err(|_| Error::malformed(form, format!("expected a list of fields, got {fields}")))?;
    let mut specs = Vec::with_capacity(entries.len());
    for entry in entries {
        let shape_error = || {
            Error::malformed(
                form,
                format!("field {entry} should be (name [:type] [default])"),
            )
        };
        let parts = entry.to_vec().map_err(|_| shape_error())?;
        let (name, tag, default) = match parts.as_slice() {
            [Value::Symbol(name)] => (name, None, None),
            [Value::Symbol(name), Value::Type(tag)] => (name, Some(tag), None),
            [Value::Symbol(name), Value::Type(tag), default] => (name, Some(tag), Some(default)),
            [Value::Symbol(name), default] => (name, None, Some(default)),
            _ => return Err(shape_error()),
        };
        let mut spec = FieldSpec::new(name);
        if let Some(tag) = tag {
            let registered = ev
                .lookup_type(tag.name())
                .cloned()
                .ok_or_else(|| Error::UnboundType(tag.name().to_owned()))?;
            spec = spec.typed(registered);
        }
        if let Some(default) = default {
            spec = spec.with_default(ev.eval_full(default)?);
        }
        specs.push(spec);
    }
    Ok(specs)
}

/// `(new name (field value)...)`
fn special_new(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let mut args = args.into_iter();
    let name = args.next().unwrap_or(Value::Nil);
    let name = operand_symbol("new", &name)?;
    let mut inits = Vec::new();
    for init in args {
        let shape_error =
            || Error::malformed("new", format!("initializer {init} should be (field value)"));
        let pair = init.to_vec().map_err(|_| shape_error())?;
        let [Value::Symbol(field), expr] = pair.as_slice() else {
            return Err(shape_error());
        };
        inits.push((Rc::clone(field), ev.eval_full(expr)?));
    }
    ev.instantiate(&name, inits)
}

/// `(set-option name value)`
fn special_set_option(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [name, value] = fixed_operands::<2>("set-option", args)?;
    let name = operand_symbol("set-option", &name)?;
    let enabled = ev.eval_full(&value)?.is_truthy();
    ev.options_mut().set(&name, enabled)?;
    tracing::debug!(option = %name, enabled, "option changed");
    Ok(Value::boolean(enabled))
}

fn fixed_operands<const N: usize>(form: &str, args: Vec<Value>) -> Result<[Value; N], Error> {
    let got = args.len();
    <[Value; N]>::try_from(args).map_err(|_| Error::arity_error(form, N, got))
}

fn operand_symbol(form: &str, operand: &Value) -> Result<Symbol, Error> {
    match operand {
        Value::Symbol(name) => Ok(Rc::clone(name)),
        other => Err(Error::malformed(form, format!("expected a symbol, got {other}"))),
    }
}

//
// Builtin Function Implementations
//

/// Numeric view used for promotion: two ints stay ints, anything else is a float
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    /// Numbers, plus characters by code point when `chars` is set
    fn of(value: &Value, chars: bool) -> Option<Num> {
        match value {
            Value::Integer(n) => Some(Num::Int(*n)),
            Value::Float(x) => Some(Num::Float(*x)),
            Value::Char(c) if chars => Some(Num::Int(i64::from(u32::from(*c)))),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(x) => x,
        }
    }
}

fn number_args(name: &str, args: &[Value], chars: bool) -> Result<(Num, Num), Error> {
    match args {
        [lhs, rhs] => match (Num::of(lhs, chars), Num::of(rhs, chars)) {
            (Some(lhs), Some(rhs)) => Ok((lhs, rhs)),
            _ => Err(Error::EvalError(format!("{name}: expected numbers, got {lhs} and {rhs}"))),
        },
        _ => Err(Error::arity_error(name, 2, args.len())),
    }
}

fn arithmetic(
    name: &str,
    args: &[Value],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, Error> {
    match number_args(name, args, false)? {
        (Num::Int(lhs), Num::Int(rhs)) => int_op(lhs, rhs)
            .map(Value::Integer)
            .ok_or_else(|| Error::EvalError(format!("integer overflow in {name}"))),
        (lhs, rhs) => Ok(Value::Float(float_op(lhs.as_f64(), rhs.as_f64()))),
    }
}

fn builtin_add(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    arithmetic("+", &args, i64::checked_add, |a, b| a + b)
}

fn builtin_sub(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    arithmetic("-", &args, i64::checked_sub, |a, b| a - b)
}

fn builtin_mul(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    arithmetic("*", &args, i64::checked_mul, |a, b| a * b)
}

fn builtin_div(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    if let [Value::Integer(_), Value::Integer(0)] = args.as_slice() {
        return Err(Error::EvalError("division by zero".into()));
    }
    arithmetic("/", &args, i64::checked_div, |a, b| a / b)
}

fn builtin_mod(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    match args.as_slice() {
        [Value::Integer(_), Value::Integer(0)] => Err(Error::EvalError("division by zero".into())),
        [Value::Integer(lhs), Value::Integer(rhs)] => lhs
            .checked_rem_euclid(*rhs)
            .map(Value::Integer)
            .ok_or_else(|| Error::EvalError("integer overflow in mod".into())),
        _ => Err(Error::EvalError("mod: expected two integers".into())),
    }
}

/// Numbers compare by value across int and float, everything else structurally
fn builtin_eq(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [lhs, rhs] = fixed_operands::<2>("=", args)?;
    let equal = match (Num::of(&lhs, false), Num::of(&rhs, false)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    };
    Ok(Value::boolean(equal))
}

fn compare(
    name: &str,
    args: &[Value],
    int_op: fn(&i64, &i64) -> bool,
    float_op: fn(&f64, &f64) -> bool,
) -> Result<Value, Error> {
    let holds = match number_args(name, args, true)? {
        (Num::Int(lhs), Num::Int(rhs)) => int_op(&lhs, &rhs),
        (lhs, rhs) => float_op(&lhs.as_f64(), &rhs.as_f64()),
    };
    Ok(Value::boolean(holds))
}

fn builtin_lt(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    compare("<", &args, i64::lt, f64::lt)
}

fn builtin_gt(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    compare(">", &args, i64::gt, f64::gt)
}

fn builtin_not(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [value] = fixed_operands::<1>("not", args)?;
    Ok(Value::boolean(value.is_nil()))
}

fn builtin_cons(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [car, cdr] = fixed_operands::<2>("cons", args)?;
    Ok(Value::cons(car, cdr))
}

fn builtin_car(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    match args.first() {
        Some(Value::Pair(pair)) => Ok(pair.car.clone()),
        _ => Ok(Value::Nil),
    }
}

fn builtin_cdr(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    match args.first() {
        Some(Value::Pair(pair)) => Ok(pair.cdr.clone()),
        _ => Ok(Value::Nil),
    }
}

fn builtin_list(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::list(args))
}

fn builtin_null(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::boolean(args.first().is_some_and(Value::is_nil)))
}

fn builtin_length(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [value] = fixed_operands::<1>("length", args)?;
    let length = match &value {
        Value::Nil | Value::Pair(_) => value.to_vec()?.len(),
        Value::String(text) => text.borrow().chars().count(),
        Value::Vector(items) => items.borrow().len(),
        other => {
            return Err(Error::EvalError(format!(
                "length: expected a list or array, got {}",
                other.type_tag()
            )));
        }
    };
    index_value(length)
}

fn index_value(n: usize) -> Result<Value, Error> {
    i64::try_from(n)
        .map(Value::Integer)
        .map_err(|_| Error::EvalError(format!("{n} does not fit in an integer")))
}

/// Floats at or beyond this magnitude do not truncate into an `i64`
const I64_FLOAT_LIMIT: f64 = 9.223_372_036_854_775e18;

fn builtin_int(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    match args.first() {
        Some(Value::Integer(n)) => Ok(Value::Integer(*n)),
        Some(Value::Char(c)) => Ok(Value::Integer(i64::from(u32::from(*c)))),
        Some(Value::Float(x)) if x.is_finite() && x.abs() < I64_FLOAT_LIMIT => {
            Ok(Value::Integer(x.trunc() as i64))
        }
        Some(other) => Err(Error::EvalError(format!("int: cannot convert {other}"))),
        None => Err(Error::arity_error("int", 1, 0)),
    }
}

fn builtin_float(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    match args.first().and_then(|value| Num::of(value, true)) {
        Some(num) => Ok(Value::Float(num.as_f64())),
        None => Err(Error::EvalError("float: expected a primitive value".into())),
    }
}

fn builtin_char(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let code = match args.first() {
        Some(Value::Char(c)) => return Ok(Value::Char(*c)),
        Some(Value::Float(_)) => builtin_int(ev, args.clone())?,
        Some(value) => value.clone(),
        None => return Err(Error::arity_error("char", 1, 0)),
    };
    let Value::Integer(n) = code else {
        return Err(Error::EvalError(format!("char: cannot convert {code}")));
    };
    u32::try_from(n)
        .ok()
        .and_then(char::from_u32)
        .map(Value::Char)
        .ok_or_else(|| Error::EvalError(format!("char: {n} is not a character code")))
}

fn builtin_typeof(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [value] = fixed_operands::<1>("typeof", args)?;
    Ok(Value::Type(value.type_tag()))
}

fn builtin_is(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    match args.as_slice() {
        [Value::Type(tag), value] => Ok(Value::boolean(tag.accepts(value))),
        _ => Err(Error::EvalError("is?: expected a type and a value".into())),
    }
}

fn builtin_vector(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::vector(args))
}

/// Resolve an index argument against a length
fn array_index(name: &str, index: &Value, len: usize) -> Result<usize, Error> {
    let Value::Integer(raw) = index else {
        return Err(Error::EvalError(format!("{name}: index must be an integer")));
    };
    usize::try_from(*raw)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| Error::EvalError(format!("{name}: index {raw} out of range for length {len}")))
}

fn builtin_aref(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [array, index] = fixed_operands::<2>("aref", args)?;
    match &array {
        Value::Vector(items) => {
            let items = items.borrow();
            let i = array_index("aref", &index, items.len())?;
            Ok(items[i].clone())
        }
        Value::String(text) => {
            let text = text.borrow();
            let i = array_index("aref", &index, text.chars().count())?;
            text.chars()
                .nth(i)
                .map(Value::Char)
                .ok_or_else(|| Error::EvalError("aref: index out of range".into()))
        }
        other => Err(Error::EvalError(format!("aref: {other} is not an array"))),
    }
}

fn builtin_aset(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [array, index, value] = fixed_operands::<3>("aset", args)?;
    match &array {
        Value::Vector(items) => {
            let mut items = items.borrow_mut();
            let i = array_index("aset", &index, items.len())?;
            items[i] = value.clone();
            Ok(value)
        }
        Value::String(text) => {
            let Value::Char(ch) = value else {
                return Err(Error::EvalError(format!("aset: {value} is not a character")));
            };
            let mut text = text.borrow_mut();
            let i = array_index("aset", &index, text.chars().count())?;
            let replaced: String = text
                .chars()
                .enumerate()
                .map(|(j, old)| if j == i { ch } else { old })
                .collect();
            *text = replaced;
            Ok(value)
        }
        other => Err(Error::EvalError(format!("aset: {other} is not an array"))),
    }
}

fn builtin_append(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [array, value] = fixed_operands::<2>("append!", args)?;
    match (&array, &value) {
        (Value::Vector(items), _) => items.borrow_mut().push(value.clone()),
        (Value::String(text), Value::Char(ch)) => text.borrow_mut().push(*ch),
        (Value::String(text), Value::String(tail)) => {
            // The tail may be the same string
            let tail = tail.borrow().clone();
            text.borrow_mut().push_str(&tail);
        }
        (Value::String(_), other) => {
            return Err(Error::EvalError(format!("append!: cannot append {other} to a string")));
        }
        (other, _) => return Err(Error::EvalError(format!("append!: {other} is not an array"))),
    }
    Ok(array)
}

fn builtin_string_append(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let mut result = String::new();
    for (position, arg) in args.iter().enumerate() {
        match arg {
            Value::String(text) => result.push_str(&text.borrow()),
            Value::Char(ch) => result.push(*ch),
            _ => {
                return Err(Error::TypeMismatch {
                    function: "string-append".into(),
                    position,
                    expected: vec![BaseType::String.name().to_owned(); args.len()],
                    actual: args.iter().map(|arg| arg.type_tag().to_string()).collect(),
                });
            }
        }
    }
    Ok(Value::string(result))
}

fn builtin_eval(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [expr] = fixed_operands::<1>("eval", args)?;
    ev.eval_full(&expr)
}

fn builtin_apply(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [function, arguments] = fixed_operands::<2>("apply", args)?;
    ev.apply(&function, arguments.to_vec()?)
}

fn builtin_begin(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    Ok(args.into_iter().last().unwrap_or(Value::Nil))
}

/// Struct instances are deep-copied, arrays get fresh storage, anything else is shared
fn builtin_copy(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [value] = fixed_operands::<1>("copy", args)?;
    Ok(match &value {
        Value::Struct(instance) => {
            let copy: StructRef = Rc::new(RefCell::new(instance.borrow().instantiate()));
            Value::Struct(copy)
        }
        Value::String(text) => Value::string(text.borrow().clone()),
        Value::Vector(items) => Value::vector(items.borrow().clone()),
        _ => value,
    })
}

fn raw_text(args: &[Value]) -> String {
    args.iter().map(|arg| format!("{arg:#}")).collect()
}

fn builtin_print(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    print!("{}", raw_text(&args));
    Ok(Value::Nil)
}

fn builtin_println(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    println!("{}", raw_text(&args));
    Ok(Value::Nil)
}

fn builtin_error(_ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let message = args
        .iter()
        .map(|arg| format!("{arg:#}"))
        .collect::<Vec<_>>()
        .join(" ");
    Err(Error::EvalError(message))
}

const ANY: &[BaseType] = &[];
const NUMBERS: &[BaseType] = &[BaseType::Number, BaseType::Number];
const PRIMITIVES: &[BaseType] = &[BaseType::Primitive, BaseType::Primitive];

/// Row for a special form; its operands are never type checked
const fn special(id: &'static str, arity: usize, variadic: bool, op: OperationFn) -> BuiltinOp {
    BuiltinOp {
        id,
        arity,
        variadic,
        argument_types: ANY,
        eval_level: EvalLevel::None,
        pure: false,
        op,
    }
}

/// Row for a function over evaluated arguments
const fn function(
    id: &'static str,
    arity: usize,
    variadic: bool,
    argument_types: &'static [BaseType],
    op: OperationFn,
) -> BuiltinOp {
    BuiltinOp {
        id,
        arity,
        variadic,
        argument_types,
        eval_level: EvalLevel::Full,
        pure: true,
        op,
    }
}

impl BuiltinOp {
    const fn impure(self) -> BuiltinOp {
        BuiltinOp {
            pure: false,
            ..self
        }
    }
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Special forms
    special("\\", 2, true, special_lambda),
    special("define", 2, false, special_define),
    special("undefine", 1, true, special_undefine),
    special("let", 2, true, special_let),
    special("if", 3, false, special_if),
    special("and", 1, true, special_and),
    special("or", 1, true, special_or),
    special("quote", 1, false, special_quote),
    special("defstruct", 2, false, special_defstruct),
    special("substruct", 3, false, special_substruct),
    special("new", 1, true, special_new),
    special("set-option", 2, false, special_set_option),
    // Lists
    function("cons", 2, false, ANY, builtin_cons),
    function("car", 1, false, &[BaseType::Cons], builtin_car),
    function("cdr", 1, false, &[BaseType::Cons], builtin_cdr),
    function("list", 0, true, ANY, builtin_list),
    function("null?", 1, false, ANY, builtin_null),
    function("length", 1, false, ANY, builtin_length),
    // Arithmetic
    function("+", 2, false, NUMBERS, builtin_add),
    function("-", 2, false, NUMBERS, builtin_sub),
    function("*", 2, false, NUMBERS, builtin_mul),
    function("/", 2, false, NUMBERS, builtin_div),
    function("mod", 2, false, &[BaseType::Int, BaseType::Int], builtin_mod),
    // Comparison and logic
    function("=", 2, false, ANY, builtin_eq),
    function("<", 2, false, PRIMITIVES, builtin_lt),
    function(">", 2, false, PRIMITIVES, builtin_gt),
    function("not", 1, false, ANY, builtin_not),
    // Conversion and types
    function("int", 1, false, &[BaseType::Primitive], builtin_int),
    function("float", 1, false, &[BaseType::Primitive], builtin_float),
    function("char", 1, false, &[BaseType::Primitive], builtin_char),
    function("typeof", 1, false, ANY, builtin_typeof),
    function("is?", 2, false, &[BaseType::Type, BaseType::Any], builtin_is),
    // Arrays
    function("vector", 0, true, ANY, builtin_vector).impure(),
    function("aref", 2, false, &[BaseType::Array, BaseType::Int], builtin_aref),
    function(
        "aset",
        3,
        false,
        &[BaseType::Array, BaseType::Int, BaseType::Any],
        builtin_aset,
    )
    .impure(),
    function("append!", 2, false, &[BaseType::Array, BaseType::Any], builtin_append).impure(),
    function("string-append", 0, true, ANY, builtin_string_append).impure(),
    // Evaluation
    function("eval", 1, false, ANY, builtin_eval).impure(),
    function("apply", 2, false, &[BaseType::Any, BaseType::Cons], builtin_apply).impure(),
    function("begin", 0, true, ANY, builtin_begin),
    function("copy", 1, false, ANY, builtin_copy).impure(),
    // Output and errors
    function("print", 0, true, ANY, builtin_print).impure(),
    function("println", 0, true, ANY, builtin_println).impure(),
    function("error", 0, true, ANY, builtin_error).impure(),
];

/// Lazy static map from id to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| BUILTIN_OPS.iter().map(|op| (op.id, op)).collect());

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

/// Find a builtin operation by its identifier
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    /// Invoke a builtin through the registry, bypassing currying and type checks
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_builtin_op(name).unwrap();
        (op.op)(&mut Evaluator::new(), args.to_vec())
    }

    #[test]
    fn test_builtin_ops_registry() {
        let not_op = find_builtin_op("not").unwrap();
        assert_eq!(not_op.arity, 1);
        assert!(!not_op.to_native().is_special_form());
        assert!(not_op.to_native().is_pure());
        assert!(!find_builtin_op("append!").unwrap().to_native().is_pure());

        let if_op = find_builtin_op("if").unwrap();
        assert!(if_op.to_native().is_special_form());
        assert_eq!(if_op.arity, 3);
        assert!(!if_op.variadic);

        let list_op = find_builtin_op("list").unwrap();
        assert_eq!((list_op.arity, list_op.variadic), (0, true));

        assert!(find_builtin_op("unknown").is_none());

        // Every identifier is registered exactly once
        let mut ids: Vec<&str> = get_builtin_ops().iter().map(|op| op.id).collect();
        ids.sort_unstable();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before);

        let native = find_builtin_op("+").unwrap().to_native();
        assert_eq!(native.name(), "+");
        assert_eq!(native.arity(), 2);
        let declared: Vec<String> = native.argument_types().iter().map(ToString::to_string).collect();
        assert_eq!(declared, vec![":number", ":number"]);
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let pair = Value::cons(val(1), val(2));
        let shared = Value::vector(vec![val(1)]);

        let test_cases: Vec<TestCase> = vec![
            // Arithmetic with promotion
            test!("+", &[val(1), val(2)], success(3)),
            test!("+", &[val(1), val(0.5)], success(1.5)),
            test!("-", &[val(1), val(3)], success(-2)),
            test!("*", &[val(2.0), val(3)], success(6.0)),
            test!("/", &[val(7), val(2)], success(3)),
            test!("/", &[val(7.0), val(2)], success(3.5)),
            test!("/", &[val(1), val(0)], None),
            test!("+", &[val(i64::MAX), val(1)], None),
            test!("*", &[val(i64::MIN), val(-1)], None),
            test!("mod", &[val(7), val(3)], success(1)),
            test!("mod", &[val(-7), val(3)], success(2)),
            test!("mod", &[val(1), val(0)], None),
            // Comparison
            test!("=", &[val(1), val(1.0)], success(true)),
            test!("=", &[val([1, 2]), val([1, 2])], success(true)),
            test!("=", &[val("a"), val("b")], success(false)),
            test!("=", &[sym("a"), sym("a")], success(true)),
            test!("<", &[val(1), val(2)], success(true)),
            test!("<", &[val(2.5), val(2)], success(false)),
            test!(">", &[val('b'), val('a')], success(true)),
            test!(">", &[val(98), val('a')], success(true)),
            test!("not", &[nil()], success(true)),
            test!("not", &[val(0)], success(false)),
            // Lists
            test!("cons", &[val(1), nil()], success([1])),
            test!("car", &[val([1, 2])], success(1)),
            test!("cdr", &[val([1, 2])], success([2])),
            test!("car", &[nil()], Some(nil())),
            test!("cdr", &[nil()], Some(nil())),
            test!("cdr", &[pair.clone()], success(2)),
            test!("list", &[val(1), val("a")], Some(val([val(1), val("a")]))),
            test!("list", &[], Some(nil())),
            test!("null?", &[nil()], success(true)),
            test!("null?", &[val([1])], success(false)),
            test!("length", &[val([1, 2, 3])], success(3)),
            test!("length", &[nil()], success(0)),
            test!("length", &[val("héllo")], success(5)),
            test!("length", &[Value::vector(vec![val(1), val(2)])], success(2)),
            test!("length", &[pair], None),
            test!("length", &[val(5)], None),
            // Conversion
            test!("int", &[val(3.9)], success(3)),
            test!("int", &[val(-3.9)], success(-3)),
            test!("int", &[val('A')], success(65)),
            test!("int", &[val(f64::NAN)], None),
            test!("float", &[val(2)], success(2.0)),
            test!("float", &[val('A')], success(65.0)),
            test!("char", &[val(97)], success('a')),
            test!("char", &[val(98.2)], success('b')),
            test!("char", &[val(-1)], None),
            // Types
            test!("typeof", &[val(1)], Some(Value::Type(BaseType::Int.tag()))),
            test!("is?", &[Value::Type(BaseType::Atom.tag()), val('c')], success(true)),
            test!("is?", &[Value::Type(BaseType::Cons.tag()), nil()], success(true)),
            test!("is?", &[Value::Type(BaseType::Array.tag()), val(1)], success(false)),
            // Arrays
            test!("vector", &[val(1), val(2)], Some(Value::vector(vec![val(1), val(2)]))),
            test!("aref", &[Value::vector(vec![val(5), val(6)]), val(1)], success(6)),
            test!("aref", &[val("abc"), val(2)], success('c')),
            test!("aref", &[val("abc"), val(3)], None),
            test!("aref", &[Value::vector(vec![]), val(-1)], None),
            test!("aset", &[shared.clone(), val(0), val(9)], success(9)),
            test!("aref", &[shared.clone(), val(0)], success(9)),
            test!("append!", &[shared.clone(), val(10)], Some(Value::vector(vec![val(9), val(10)]))),
            test!("append!", &[val("ab"), val('c')], success("abc")),
            test!("append!", &[val("ab"), val(1)], None),
            test!("string-append", &[val("ab"), val("cd"), val('e')], success("abcde")),
            test!("string-append", &[], success("")),
            test!("string-append", &[val("a"), val(1)], None),
            // Evaluation
            test!("begin", &[val(1), val(2)], success(2)),
            test!("begin", &[], Some(nil())),
            test!("eval", &[val(vec![sym("+"), val(1), val(2)])], success(3)),
            test!("apply", &[sym("list"), val([1, 2])], None),
            test!("error", &[val("bad"), val(1)], None),
        ];

        for (i, (name, actual, expected)) in test_cases.into_iter().enumerate() {
            match (actual, expected) {
                (Ok(actual), Some(expected)) => {
                    assert_eq!(actual, expected, "case #{} ({name})", i + 1);
                }
                (Err(_), None) => {}
                (actual, expected) => {
                    panic!("case #{} ({name}): expected {expected:?}, got {actual:?}", i + 1);
                }
            }
        }
        // aset and append! work in place
        assert_eq!(shared, Value::vector(vec![val(9), val(10)]));
    }

    #[test]
    fn test_error_message_construction() {
        let err = call_builtin("error", &[val("disk"), val('x'), val(3)]).unwrap_err();
        assert_eq!(err.to_string(), "EvaluationError: disk x 3");

        let err = call_builtin("string-append", &[val("a"), val(1)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeMismatchError: string-append expected (:string :string), got (:string :int) at position 1"
        );
    }

    #[test]
    fn test_special_form_arity_errors() {
        let err = call_builtin("define", &[sym("x")]).unwrap_err();
        assert_eq!(err, Error::arity_error("define", 2, 1));
        assert!(matches!(call_builtin("define", &[val(1), val(2)]), Err(Error::MalformedForm { .. })));
        assert!(matches!(call_builtin("\\", &[val(1)]), Err(Error::MalformedForm { .. })));
        assert!(matches!(
            call_builtin("set-option", &[sym("nonsense"), Value::True]),
            Err(Error::MalformedForm { .. })
        ));
    }
}
