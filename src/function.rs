//! Callables: native functions, closures, and the common [`Function`] view.
//!
//! Every callable declares an arity, whether it accepts extra arguments, a type tag per
//! leading argument position, and the [`EvalLevel`] its arguments are evaluated at.
//! Struct instances are callable too (field access); see [`crate::structs`].

use crate::Error;
use crate::ast::{Symbol, Value, Visited, values_equal, write_value};
use crate::environment::Environment;
use crate::evaluator::Evaluator;
use crate::structs::StructRef;
use crate::types::{BaseType, TypeTag};
use std::fmt;
use std::rc::Rc;

/// How far an expression is reduced
///
/// Ordered so that `min` picks the weaker of two levels: an application evaluates its
/// operands at `min(function level, ambient level)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EvalLevel {
    /// Return the expression unchanged
    None,
    /// Reduce what can be reduced, leaving unbound names and their applications in place
    Partial,
    /// Reduce completely; unbound names are errors
    Full,
}

impl fmt::Display for EvalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvalLevel::None => "none",
            EvalLevel::Partial => "partial",
            EvalLevel::Full => "full",
        };
        f.write_str(name)
    }
}

/// Canonical erased signature of a native function
///
/// Natives receive the evaluator (for special forms that evaluate their own operands or
/// touch the environment) and ownership of their argument vector.
pub type NativeFn = dyn Fn(&mut Evaluator, Vec<Value>) -> Result<Value, Error>;

/// A function implemented in Rust
#[derive(Clone)]
pub struct NativeFunction {
    name: Symbol,
    arity: usize,
    variadic: bool,
    argument_types: Vec<TypeTag>,
    eval_level: EvalLevel,
    /// Whether a call may run ahead of time, while a curried body is being reduced
    pure: bool,
    func: Rc<NativeFn>,
}

impl NativeFunction {
    /// A fixed-arity function over `:any` arguments, evaluated at [`EvalLevel::Full`]
    pub fn new<F>(name: &str, arity: usize, func: F) -> Self
    where
        F: Fn(&mut Evaluator, Vec<Value>) -> Result<Value, Error> + 'static,
    {
        NativeFunction {
            name: Rc::from(name),
            arity,
            variadic: false,
            argument_types: Vec::new(),
            eval_level: EvalLevel::Full,
            pure: true,
            func: Rc::new(func),
        }
    }

    /// Accept arguments beyond the arity
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Declare per-position types; positions past the list are unchecked
    pub fn with_types(mut self, types: impl IntoIterator<Item = TypeTag>) -> Self {
        self.argument_types = types.into_iter().collect();
        self
    }

    pub fn with_level(mut self, level: EvalLevel) -> Self {
        self.eval_level = level;
        self
    }

    /// Mark a function whose calls have effects or build fresh mutable values; partial
    /// evaluation leaves its calls for the full call
    pub fn impure(mut self) -> Self {
        self.pure = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    pub fn argument_types(&self) -> &[TypeTag] {
        &self.argument_types
    }

    pub fn eval_level(&self) -> EvalLevel {
        self.eval_level
    }

    pub fn is_pure(&self) -> bool {
        self.pure
    }

    /// Special forms take their operands unevaluated
    pub fn is_special_form(&self) -> bool {
        self.eval_level < EvalLevel::Full
    }

    pub(crate) fn run(&self, evaluator: &mut Evaluator, args: Vec<Value>) -> Result<Value, Error> {
        (self.func)(evaluator, args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NativeFunction({}, arity={}{}, level={})",
            self.name,
            self.arity,
            if self.variadic { "+" } else { "" },
            self.eval_level
        )
    }
}

/// A user-defined function
///
/// `env` is a snapshot of the environment the closure was created in. `bound` holds the
/// arguments already supplied by earlier partial applications; they are rebound on
/// every call, ahead of the parameters.
#[derive(Clone)]
pub struct Closure {
    pub params: Vec<Symbol>,
    pub body: Vec<Value>,
    pub env: Environment,
    pub bound: Vec<(Symbol, Value)>,
}

impl Closure {
    pub fn new(params: Vec<Symbol>, body: Vec<Value>, env: Environment) -> Self {
        Closure {
            params,
            body,
            env,
            bound: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub(crate) fn write(&self, f: &mut fmt::Formatter<'_>, raw: bool, depth: usize) -> fmt::Result {
        write!(f, "(\\ (")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")?;
        for expr in &self.body {
            write!(f, " ")?;
            write_value(f, expr, raw, depth + 1)?;
        }
        write!(f, ")")
    }
}

impl Closure {
    /// Same parameters, body and bound arguments; the captured environment is ignored
    pub(crate) fn equal_with(&self, other: &Closure, visited: &mut Visited) -> bool {
        let all_equal = |left: &[Value], right: &[Value], visited: &mut Visited| {
            left.len() == right.len()
                && left.iter().zip(right).all(|(a, b)| values_equal(a, b, visited))
        };
        self.params == other.params
            && all_equal(&self.body, &other.body, visited)
            && self.bound.len() == other.bound.len()
            && self
                .bound
                .iter()
                .zip(&other.bound)
                .all(|((a, x), (b, y))| a == b && values_equal(x, y, visited))
    }
}

impl PartialEq for Closure {
    fn eq(&self, other: &Self) -> bool {
        self.equal_with(other, &mut Visited::new())
    }
}

/// Uniform view over everything that can sit in the head of an application
#[derive(Clone)]
pub enum Function {
    Native(Rc<NativeFunction>),
    Closure(Rc<Closure>),
    Struct(StructRef),
}

/// Struct instances take a field name plus an optional new value
const STRUCT_ARGUMENT_TYPES: [BaseType; 2] = [BaseType::Symbol, BaseType::Any];

impl Function {
    pub fn name(&self) -> String {
        match self {
            Function::Native(native) => native.name().to_owned(),
            Function::Closure(_) => "lambda".to_owned(),
            Function::Struct(instance) => instance.borrow().name().to_owned(),
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Native(native) => native.arity(),
            Function::Closure(closure) => closure.arity(),
            Function::Struct(_) => 1,
        }
    }

    pub fn is_variadic(&self) -> bool {
        match self {
            Function::Native(native) => native.is_variadic(),
            Function::Closure(_) => false,
            Function::Struct(_) => true,
        }
    }

    pub fn eval_level(&self) -> EvalLevel {
        match self {
            Function::Native(native) => native.eval_level(),
            Function::Closure(_) => EvalLevel::Full,
            Function::Struct(_) => EvalLevel::None,
        }
    }

    /// Whether an application with known arguments may be reduced under
    /// [`EvalLevel::Partial`]
    ///
    /// Only pure natives qualify. A closure body may read names that are not bound
    /// until the curried function is finally called.
    pub fn is_pure(&self) -> bool {
        match self {
            Function::Native(native) => native.is_pure(),
            Function::Closure(_) | Function::Struct(_) => false,
        }
    }

    /// Declared type of each checked argument position
    pub fn argument_types(&self) -> Vec<TypeTag> {
        match self {
            Function::Native(native) => native.argument_types().to_vec(),
            Function::Closure(closure) => vec![BaseType::Any.tag(); closure.arity()],
            Function::Struct(_) => STRUCT_ARGUMENT_TYPES.iter().map(|base| base.tag()).collect(),
        }
    }

    /// Check the first `min(arity, args.len())` arguments against their declared types
    pub fn check_arguments(&self, args: &[Value]) -> Result<(), Error> {
        let types = self.argument_types();
        let checked = self.arity().min(args.len()).min(types.len());
        for (position, (tag, arg)) in types.iter().zip(args).take(checked).enumerate() {
            if !tag.accepts(arg) {
                return Err(Error::TypeMismatch {
                    function: self.name(),
                    position,
                    expected: types.iter().map(ToString::to_string).collect(),
                    actual: args.iter().map(|arg| arg.type_tag().to_string()).collect(),
                });
            }
        }
        Ok(())
    }
}

impl Value {
    /// View this value as a callable, if it is one
    pub fn as_function(&self) -> Option<Function> {
        match self {
            Value::Native(native) => Some(Function::Native(Rc::clone(native))),
            Value::Closure(closure) => Some(Function::Closure(Rc::clone(closure))),
            Value::Struct(instance) => Some(Function::Struct(Rc::clone(instance))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    fn plus() -> Function {
        let native = NativeFunction::new("+", 2, |_, _| Ok(Value::Nil))
            .with_types([BaseType::Number.tag(), BaseType::Number.tag()]);
        Function::Native(Rc::new(native))
    }

    #[test]
    fn test_eval_level_ordering() {
        assert!(EvalLevel::None < EvalLevel::Partial);
        assert!(EvalLevel::Partial < EvalLevel::Full);
        assert_eq!(EvalLevel::Full.min(EvalLevel::None), EvalLevel::None);
    }

    #[test]
    fn test_type_mismatch_names_position() {
        let err = plus().check_arguments(&[val("a"), val(2)]);
        assert_eq!(
            err,
            Err(Error::TypeMismatch {
                function: "+".into(),
                position: 0,
                expected: vec![":number".into(), ":number".into()],
                actual: vec![":string".into(), ":int".into()],
            })
        );

        let err = plus().check_arguments(&[val(1), sym("x")]);
        assert!(matches!(err, Err(Error::TypeMismatch { position: 1, .. })));
    }

    #[test]
    fn test_only_supplied_prefix_is_checked() {
        assert_eq!(plus().check_arguments(&[val(1)]), Ok(()));
        assert_eq!(plus().check_arguments(&[]), Ok(()));
        assert_eq!(plus().check_arguments(&[val(1), val(2.5)]), Ok(()));
    }

    #[test]
    fn test_closure_contract() {
        let closure = Closure::new(
            vec![Rc::from("a"), Rc::from("b")],
            vec![sym("a")],
            Environment::default(),
        );
        let function = Value::Closure(Rc::new(closure)).as_function();
        let Some(function) = function else {
            panic!("closure should be callable");
        };
        assert_eq!(function.arity(), 2);
        assert!(!function.is_variadic());
        assert_eq!(function.eval_level(), EvalLevel::Full);
        assert_eq!(function.check_arguments(&[val("anything"), sym("goes")]), Ok(()));
    }

    #[test]
    fn test_closure_display() {
        let closure = Closure::new(
            vec![Rc::from("n")],
            vec![crate::ast::list([sym("+"), sym("n"), val(1)])],
            Environment::default(),
        );
        assert_eq!(format!("{}", Value::Closure(Rc::new(closure))), "(\\ (n) (+ n 1))");
    }

    #[test]
    fn test_non_callables() {
        assert!(val(1).as_function().is_none());
        assert!(sym("f").as_function().is_none());
        assert!(val([1, 2]).as_function().is_none());
    }
}
