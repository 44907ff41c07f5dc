//! The dispatch algorithm.
//!
//! [`Evaluator`] walks a [`Value`] tree directly. State carried through every step:
//!
//! - the evaluation level ([`EvalLevel`]), which decides whether a node is reduced
//!   fully, partially, or not at all;
//! - the environment stack: the global environment at the bottom and one frame per
//!   active call or `let` above it;
//! - the [`EvalOptions`], including the scoping mode.
//!
//! Applications evaluate their operands at `min(function level, ambient level)`, so
//! special forms (level `None`) see their operands as written. Calling a function with
//! fewer arguments than its arity curries it: closures have their body partially
//! evaluated with the supplied arguments bound, natives are wrapped in a closure over
//! placeholder parameters.
//!
//! Name lookup checks the active frame and then the global environment. A closure's
//! frame starts from a snapshot of the environment it was created in (or, under dynamic
//! scoping, of the caller's environment), so later top-level definitions, including
//! the closure's own name for recursion, are still reachable.

mod scope_guard;

use crate::Error;
use crate::ast::{Pair, Symbol, Value};
use crate::builtinops::get_builtin_ops;
use crate::environment::Environment;
use crate::function::{Closure, EvalLevel, Function, NativeFunction};
use crate::options::{EvalOptions, ScopingMode};
use crate::package::Package;
use crate::stack::ensure_sufficient_stack;
use crate::structs::{self, FieldSpec, Struct, StructRef, struct_type_name};
use crate::types::{BaseType, TypeTag};
use std::cell::RefCell;
use std::rc::Rc;

/// Build a fresh environment
///
/// With `include_builtins` the environment holds the base type tags and the native
/// function table; without it, it is empty.
pub fn default_environment(include_builtins: bool) -> Environment {
    let mut env = Environment::new();
    if include_builtins {
        for base in BaseType::ALL {
            env.put_type(base.tag());
        }
        for op in get_builtin_ops() {
            env.put(op.id, Value::Native(Rc::new(op.to_native())));
        }
    }
    env
}

/// Evaluate `expr` against `env` with default options (public API)
///
/// Definitions made by `expr` are written back into `env`.
pub fn eval(expr: &Value, env: &mut Environment) -> Result<Value, Error> {
    let mut evaluator = Evaluator::with_environment(std::mem::take(env), EvalOptions::default());
    let result = evaluator.evaluate(expr);
    *env = evaluator.into_environment();
    result
}

/// A tree-walking evaluator with its own environment stack and options
pub struct Evaluator {
    global: Environment,
    frames: Vec<Environment>,
    level: EvalLevel,
    options: EvalOptions,
    /// Nesting of the step being reported, for indenting diagnostics
    indent: usize,
    depth: usize,
    placeholders: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// An evaluator over the default environment with default options
    pub fn new() -> Self {
        Self::with_options(EvalOptions::default())
    }

    pub fn with_options(options: EvalOptions) -> Self {
        Self::with_environment(default_environment(true), options)
    }

    pub fn with_environment(global: Environment, options: EvalOptions) -> Self {
        Evaluator {
            global,
            frames: Vec::new(),
            level: EvalLevel::Full,
            options,
            indent: 0,
            depth: 0,
            placeholders: 0,
        }
    }

    pub fn into_environment(self) -> Environment {
        self.global
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut EvalOptions {
        &mut self.options
    }

    /// Level of the step currently being evaluated
    pub fn level(&self) -> EvalLevel {
        self.level
    }

    /// The active environment (top of the stack)
    pub fn env(&self) -> &Environment {
        self.frames.last().unwrap_or(&self.global)
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => &mut self.global,
        }
    }

    pub fn global(&self) -> &Environment {
        &self.global
    }

    /// Number of environments pushed above the global one
    pub fn scope_depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn push_env(&mut self, env: Environment) {
        self.frames.push(env);
    }

    pub(crate) fn pop_env(&mut self) {
        self.frames.pop();
    }

    /// Look `name` up in the active environment, then the global one
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.env().get(name).or_else(|| self.global.get(name))
    }

    pub fn lookup_type(&self, name: &str) -> Option<&TypeTag> {
        self.env()
            .get_type(name)
            .or_else(|| self.global.get_type(name))
    }

    pub fn lookup_struct(&self, name: &str) -> Option<&StructRef> {
        self.env()
            .get_struct(name)
            .or_else(|| self.global.get_struct(name))
    }

    /// Clear the stack back to a single fresh default environment
    pub fn reset(&mut self) {
        tracing::debug!(frames = self.frames.len(), "resetting evaluator");
        self.frames.clear();
        self.global = default_environment(true);
        self.level = EvalLevel::Full;
        self.indent = 0;
        self.depth = 0;
    }

    /// Evaluate one top-level expression
    ///
    /// On error the environment stack, level, scoping mode and report indentation are
    /// put back to what they were before the call.
    pub fn evaluate(&mut self, expr: &Value) -> Result<Value, Error> {
        let frames = self.frames.len();
        let scoping = self.options.scoping;
        let result = self.eval_at(EvalLevel::Full, expr);
        if let Err(err) = &result {
            tracing::debug!(error = %err, "evaluation failed, restoring top-level state");
            self.frames.truncate(frames);
            self.options.scoping = scoping;
            self.level = EvalLevel::Full;
            self.indent = 0;
            self.depth = 0;
        }
        result
    }

    /// Evaluate a sequence of top-level expressions; a failure does not stop the rest
    pub fn evaluate_all(&mut self, exprs: &[Value]) -> Vec<Result<Value, Error>> {
        exprs.iter().map(|expr| self.evaluate(expr)).collect()
    }

    /// Read and evaluate every expression in `source`, returning the last value
    ///
    /// Stops at the first error.
    #[cfg(feature = "reader")]
    pub fn eval_str(&mut self, source: &str) -> Result<Value, Error> {
        let mut result = Value::Nil;
        for expr in crate::reader::read_all(source)? {
            result = self.evaluate(&expr)?;
        }
        Ok(result)
    }

    /// Apply `function` to already-evaluated `args`, currying when too few are given
    pub fn apply(&mut self, function: &Value, args: Vec<Value>) -> Result<Value, Error> {
        let callable = function
            .as_function()
            .ok_or_else(|| Error::NotCallable(function.to_string()))?;
        self.apply_function(function.clone(), callable, args)
    }

    /// Register every function, type and constant of `package` in the active environment
    ///
    /// Existing bindings of the same names are replaced.
    #[tracing::instrument(level = "debug", skip_all, fields(package = package.name()))]
    pub fn load_package(&mut self, package: &dyn Package) {
        let env = self.env_mut();
        for tag in package.types() {
            env.put_type(tag);
        }
        for native in package.functions() {
            let name: Symbol = Rc::from(native.name());
            env.put(name, Value::Native(Rc::new(native)));
        }
        for (name, value) in package.symbols() {
            env.put(name, value);
        }
    }

    /// Create a root struct template and register it with its type tag
    pub fn define_struct(&mut self, name: &str, fields: Vec<FieldSpec>) -> Result<Value, Error> {
        let template = Struct::define(name, fields)?;
        Ok(self.register_struct(template))
    }

    /// Create a template inheriting from the registered template `parent`
    pub fn derive_struct(
        &mut self,
        name: &str,
        parent: &str,
        fields: Vec<FieldSpec>,
    ) -> Result<Value, Error> {
        let parent = self
            .lookup_struct(parent)
            .cloned()
            .ok_or_else(|| Error::UnboundType(struct_type_name(parent)))?;
        let template = Struct::derive(name, &parent.borrow(), fields)?;
        Ok(self.register_struct(template))
    }

    fn register_struct(&mut self, template: Struct) -> Value {
        tracing::debug!(name = template.name(), tag = %template.tag(), "registering struct");
        let tag = template.tag().clone();
        let name: Symbol = Rc::from(template.name());
        let template = Rc::new(RefCell::new(template));
        let env = self.env_mut();
        env.put_type(tag);
        env.put_struct(name, Rc::clone(&template));
        Value::Struct(template)
    }

    /// Deep-copy the template `name` and apply `inits`, each checked against its field
    pub fn instantiate(&mut self, name: &str, inits: Vec<(Symbol, Value)>) -> Result<Value, Error> {
        let template = self
            .lookup_struct(name)
            .cloned()
            .ok_or_else(|| Error::UnboundType(struct_type_name(name)))?;
        let instance = Rc::new(RefCell::new(template.borrow().instantiate()));
        for (field, value) in inits {
            structs::set_field(&instance, &field, value)?;
        }
        Ok(Value::Struct(instance))
    }

    /// Evaluate `expr` at `level`, restoring the current level afterwards
    pub(crate) fn eval_at(&mut self, level: EvalLevel, expr: &Value) -> Result<Value, Error> {
        self.with_level(level, |ev| ev.visit(expr))
    }

    pub(crate) fn eval_full(&mut self, expr: &Value) -> Result<Value, Error> {
        self.eval_at(EvalLevel::Full, expr)
    }

    /// Evaluate each expression in turn, returning the last value (`Nil` for none)
    pub(crate) fn eval_body(&mut self, body: &[Value]) -> Result<Value, Error> {
        let mut result = Value::Nil;
        for expr in body {
            result = self.visit(expr)?;
        }
        Ok(result)
    }

    fn with_level<T>(&mut self, level: EvalLevel, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.level, level);
        let result = f(self);
        self.level = saved;
        result
    }

    /// One dispatch step, with depth accounting
    pub(crate) fn visit(&mut self, expr: &Value) -> Result<Value, Error> {
        if self.depth >= self.options.max_depth {
            return Err(Error::DepthExceeded(self.options.max_depth));
        }
        self.depth += 1;
        let result = ensure_sufficient_stack(|| self.dispatch(expr));
        self.depth -= 1;
        result
    }

    fn dispatch(&mut self, expr: &Value) -> Result<Value, Error> {
        if !self.options.reports() {
            return self.dispatch_node(expr);
        }
        self.report_enter(expr);
        self.indent += 1;
        let result = self.dispatch_node(expr);
        self.indent -= 1;
        self.report_exit(&result);
        result
    }

    fn dispatch_node(&mut self, expr: &Value) -> Result<Value, Error> {
        match expr {
            Value::Pair(pair) => self.visit_pair(expr, pair),
            Value::Quoted(inner) => self.visit_quoted(expr, inner),
            Value::Symbol(name) => self.visit_symbol(name),
            Value::Type(tag) if self.level != EvalLevel::None => self.resolve_type(tag),
            _ => Ok(expr.clone()),
        }
    }

    fn visit_symbol(&mut self, name: &Symbol) -> Result<Value, Error> {
        if self.level == EvalLevel::None {
            return Ok(Value::Symbol(Rc::clone(name)));
        }
        let partial = self.level == EvalLevel::Partial;
        match self.lookup(name).cloned() {
            // Code-like values stay behind their name until the full call
            Some(value) if partial && value.is_residual() => Ok(Value::Symbol(Rc::clone(name))),
            Some(Value::Type(tag)) => self.resolve_type(&tag),
            Some(value) => Ok(value),
            None if partial => Ok(Value::Symbol(Rc::clone(name))),
            None => Err(Error::UnboundSymbol(name.to_string())),
        }
    }

    /// Second resolution pass: swap a type reference for the registered tag of that name
    fn resolve_type(&self, tag: &TypeTag) -> Result<Value, Error> {
        match self.lookup_type(tag.name()) {
            Some(registered) => Ok(Value::Type(registered.clone())),
            None if self.level == EvalLevel::Partial => Ok(Value::Type(tag.clone())),
            None => Err(Error::UnboundType(tag.name().to_owned())),
        }
    }

    fn visit_quoted(&mut self, expr: &Value, inner: &Value) -> Result<Value, Error> {
        if self.level == EvalLevel::Full {
            self.eval_at(EvalLevel::None, inner)
        } else {
            // Residual code keeps its quote so a later full evaluation still sees it
            Ok(expr.clone())
        }
    }

    fn visit_pair(&mut self, expr: &Value, pair: &Pair) -> Result<Value, Error> {
        if self.level == EvalLevel::None || pair.car.is_nil() {
            return Ok(expr.clone());
        }
        let arg_exprs = pair.cdr.to_vec()?;
        let head = self.visit(&pair.car)?;
        match head.as_function() {
            Some(function) => self.visit_application(head, function, &arg_exprs),
            None if self.level == EvalLevel::Partial => {
                let args = self.visit_all(&arg_exprs)?;
                Ok(rebuild(head, args))
            }
            None => Err(Error::NotCallable(head.to_string())),
        }
    }

    fn visit_all(&mut self, exprs: &[Value]) -> Result<Vec<Value>, Error> {
        exprs.iter().map(|expr| self.visit(expr)).collect()
    }

    fn visit_application(
        &mut self,
        head: Value,
        function: Function,
        arg_exprs: &[Value],
    ) -> Result<Value, Error> {
        let ambient = self.level;
        if ambient == EvalLevel::Partial && function.eval_level() < EvalLevel::Full {
            // Special forms only run under full evaluation
            return Ok(rebuild(head, arg_exprs.to_vec()));
        }

        let arg_level = function.eval_level().min(ambient);
        let args = self.with_level(arg_level, |ev| ev.visit_all(arg_exprs))?;

        if ambient == EvalLevel::Partial
            && (!function.is_pure() || args.iter().any(Value::is_residual))
        {
            // Closure bodies and effects wait for the full call
            return Ok(rebuild(head, args));
        }
        let args = match function {
            Function::Struct(_) => self.struct_operands(args)?,
            _ => args,
        };
        self.apply_function(head, function, args)
    }

    /// A struct call takes its field name as written and its new value evaluated
    fn struct_operands(&mut self, mut args: Vec<Value>) -> Result<Vec<Value>, Error> {
        if let Some(value) = args.get_mut(1) {
            *value = self.eval_full(value)?;
        }
        Ok(args)
    }

    fn apply_function(
        &mut self,
        head: Value,
        function: Function,
        args: Vec<Value>,
    ) -> Result<Value, Error> {
        let arity = function.arity();
        let supplied = args.len();

        if supplied == 0 && arity > 0 {
            return Ok(head);
        }
        if supplied < arity {
            return self.curry(head, function, args);
        }
        if supplied > arity && !function.is_variadic() {
            return Err(Error::arity_error(function.name(), arity, supplied));
        }

        function.check_arguments(&args)?;
        match function {
            Function::Native(native) => native.run(self, args),
            Function::Closure(closure) => self.call_closure(&closure, args),
            Function::Struct(instance) => self.call_struct(&instance, args),
        }
    }

    /// Environment a closure's frame starts from under the current scoping mode
    fn closure_base(&self, closure: &Closure) -> Environment {
        match self.options.scoping {
            ScopingMode::Lexical => closure.env.clone(),
            ScopingMode::Dynamic => self.env().clone(),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Result<Value, Error> {
        let mut frame = self.closure_base(closure);
        for (name, value) in &closure.bound {
            frame.put(Rc::clone(name), value.clone());
        }
        for (param, arg) in closure.params.iter().zip(args) {
            frame.put(Rc::clone(param), arg);
        }
        self.with_scope(frame, |ev| {
            ev.with_level(EvalLevel::Full, |ev| ev.eval_body(&closure.body))
        })
    }

    fn call_struct(&mut self, instance: &StructRef, args: Vec<Value>) -> Result<Value, Error> {
        match args.as_slice() {
            [field] => {
                let field = field_name(field)?;
                instance.borrow().get(field)
            }
            [field, value] => structs::set_field(instance, field_name(field)?, value.clone()),
            _ => Err(Error::arity_error(instance.borrow().name(), 2, args.len())),
        }
    }

    fn curry(&mut self, head: Value, function: Function, args: Vec<Value>) -> Result<Value, Error> {
        match function {
            Function::Closure(closure) => self.curry_closure(&closure, args),
            Function::Native(native) if !native.is_special_form() => {
                Ok(self.curry_native(head, &native, args))
            }
            other => Err(Error::arity_error(other.name(), other.arity(), args.len())),
        }
    }

    /// Bind the supplied leading parameters and partially evaluate the body with the
    /// remaining parameters standing for themselves
    fn curry_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Result<Value, Error> {
        let (supplied, remaining) = closure.params.split_at(args.len());
        let mut bound = closure.bound.clone();
        bound.extend(supplied.iter().cloned().zip(args));

        let mut seed = self.closure_base(closure);
        for (name, value) in &bound {
            seed.put(Rc::clone(name), value.clone());
        }
        for param in remaining {
            seed.put(Rc::clone(param), Value::Symbol(Rc::clone(param)));
        }

        let body = self.with_scope(seed, |ev| {
            ev.with_level(EvalLevel::Partial, |ev| ev.visit_all(&closure.body))
        })?;
        tracing::debug!(
            supplied = supplied.len(),
            remaining = remaining.len(),
            "curried closure"
        );

        Ok(Value::Closure(Rc::new(Closure {
            params: remaining.to_vec(),
            body,
            env: closure.env.clone(),
            bound,
        })))
    }

    /// Wrap a native in a closure `(\ (%k ...) (native arg ... %k ...))`
    ///
    /// Supplied arguments that evaluate to themselves are written into the call;
    /// code-like ones are bound to placeholders so they are not evaluated twice.
    fn curry_native(&mut self, head: Value, native: &NativeFunction, args: Vec<Value>) -> Value {
        let missing = native.arity() - args.len();
        let mut call = Vec::with_capacity(native.arity() + 1);
        let mut bound = Vec::new();
        call.push(head);
        for arg in args {
            if arg.is_residual() {
                let placeholder = self.placeholder();
                call.push(Value::Symbol(Rc::clone(&placeholder)));
                bound.push((placeholder, arg));
            } else {
                call.push(arg);
            }
        }
        let params: Vec<Symbol> = (0..missing).map(|_| self.placeholder()).collect();
        call.extend(params.iter().map(|param| Value::Symbol(Rc::clone(param))));
        tracing::debug!(native = native.name(), missing, "curried native function");

        Value::Closure(Rc::new(Closure {
            params,
            body: vec![Value::list(call)],
            env: Environment::new(),
            bound,
        }))
    }

    /// Fresh parameter name; the reader never produces `%`, so these cannot collide
    fn placeholder(&mut self) -> Symbol {
        self.placeholders += 1;
        Rc::from(format!("%{}", self.placeholders))
    }

    fn report_enter(&self, expr: &Value) {
        let indent = "  ".repeat(self.indent);
        if self.options.print_ast {
            tracing::info!(target: "crono::ast", "{indent}{}", expr.kind_name());
        }
        if self.options.trace {
            tracing::info!(target: "crono::trace", "{indent}{expr} [{}]", self.level);
        }
    }

    fn report_exit(&self, result: &Result<Value, Error>) {
        let indent = "  ".repeat(self.indent);
        if self.options.trace {
            match result {
                Ok(value) => tracing::info!(target: "crono::trace", "{indent}=> {value}"),
                Err(err) => tracing::info!(target: "crono::trace", "{indent}!! {err}"),
            }
        }
        if self.options.show_env {
            let rendered = self
                .env()
                .render(self.options.show_builtins, self.options.show_types);
            tracing::info!(target: "crono::env", "{indent}{rendered}");
        }
    }
}

/// Reassemble an application that could not be reduced yet
fn rebuild(head: Value, args: Vec<Value>) -> Value {
    Value::list(std::iter::once(head).chain(args).collect::<Vec<_>>())
}

/// Field operand of a struct call: a bare or quoted symbol
fn field_name(operand: &Value) -> Result<&str, Error> {
    match operand {
        Value::Symbol(name) => Ok(name),
        Value::Quoted(inner) => match &**inner {
            Value::Symbol(name) => Ok(name),
            other => Err(Error::malformed("struct field", format!("{other} is not a field name"))),
        },
        other => Err(Error::malformed("struct field", format!("{other} is not a field name"))),
    }
}
