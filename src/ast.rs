//! Core value type shared by code and data.
//!
//! A Crono program is a [`Value`] tree: lists are chains of [`Pair`] cells terminated by
//! [`Value::Nil`], and every atom (numbers, symbols, strings, functions, struct
//! instances) is a variant of the same enum. Ergonomic helpers [`val`], [`sym`], [`nil`],
//! [`list`] and [`quote`] build trees from Rust literals, both in code and in tests.
//!
//! `Display` renders the "write" form (strings quoted, characters as `#\c`), which the
//! reader accepts back. The alternate flag (`{:#}`) renders the raw form used by
//! `print`, where strings and characters appear as their bare characters.

use crate::Error;
use crate::function::{Closure, NativeFunction};
use crate::structs::StructRef;
use crate::types::{BaseType, TypeTag};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Symbol names are compared case-sensitively.
pub type Symbol = Rc<str>;

/// Rendering stops descending past this nesting and prints `...` instead, so values that
/// reach themselves through a vector or struct field still display.
const MAX_DISPLAY_DEPTH: usize = 512;

/// A cons cell
///
/// Cells are immutable once built and can only point at cells that already exist, so
/// every chain of `cdr`s ends.
#[derive(Clone)]
pub struct Pair {
    pub car: Value,
    pub cdr: Value,
}

/// Core value type of the interpreter
///
/// `Nil` doubles as the empty list and as false; every other value is true.
#[derive(Clone)]
pub enum Value {
    Nil,
    True,
    Pair(Rc<Pair>),
    Symbol(Symbol),
    Integer(i64),
    Float(f64),
    Char(char),
    /// Mutable string, shared between all holders
    String(Rc<RefCell<String>>),
    /// Mutable, resizable vector, shared between all holders
    Vector(Rc<RefCell<Vec<Value>>>),
    /// A sub-tree that evaluates to itself
    Quoted(Rc<Value>),
    Type(TypeTag),
    Native(Rc<NativeFunction>),
    Closure(Rc<Closure>),
    Struct(StructRef),
}

impl Value {
    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(Pair { car, cdr }))
    }

    /// Build a proper list from `items`
    pub fn list<I>(items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(Value::Nil, |tail, item| Value::cons(item, tail))
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Rc::from(name))
    }

    pub fn string(text: impl Into<String>) -> Value {
        Value::String(Rc::new(RefCell::new(text.into())))
    }

    pub fn vector(items: Vec<Value>) -> Value {
        Value::Vector(Rc::new(RefCell::new(items)))
    }

    pub fn quoted(inner: Value) -> Value {
        Value::Quoted(Rc::new(inner))
    }

    pub fn boolean(truth: bool) -> Value {
        if truth { Value::True } else { Value::Nil }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `Nil` counts as true
    pub fn is_truthy(&self) -> bool {
        !self.is_nil()
    }

    /// True for values that still denote code when they appear in an expression:
    /// symbols, applications and quoted forms. Everything else evaluates to itself.
    pub fn is_residual(&self) -> bool {
        matches!(self, Value::Symbol(_) | Value::Pair(_) | Value::Quoted(_))
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Collect a `Nil`-terminated chain of pairs into a vector
    ///
    /// `Nil` yields an empty vector. Anything else that is not a proper list (an atom, or
    /// a chain ending in an atom) is a [`Error::MalformedList`].
    pub fn to_vec(&self) -> Result<Vec<Value>, Error> {
        let mut items = Vec::new();
        let mut rest = self;
        loop {
            match rest {
                Value::Nil => return Ok(items),
                Value::Pair(pair) => {
                    items.push(pair.car.clone());
                    rest = &pair.cdr;
                }
                _ => return Err(Error::MalformedList(self.to_string())),
            }
        }
    }

    /// Nominal type of this value
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Nil => BaseType::Nil.tag(),
            Value::True => BaseType::True.tag(),
            Value::Pair(_) => BaseType::Cons.tag(),
            Value::Symbol(_) => BaseType::Symbol.tag(),
            Value::Integer(_) => BaseType::Int.tag(),
            Value::Float(_) => BaseType::Float.tag(),
            Value::Char(_) => BaseType::Char.tag(),
            Value::String(_) => BaseType::String.tag(),
            Value::Vector(_) => BaseType::Vector.tag(),
            Value::Quoted(inner) => inner.type_tag(),
            Value::Type(_) => BaseType::Type.tag(),
            Value::Native(_) | Value::Closure(_) => BaseType::Function.tag(),
            Value::Struct(instance) => instance.borrow().tag().clone(),
        }
    }

    /// Short node-kind name, used by the AST printing toggle
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::True => "true",
            Value::Pair(_) => "pair",
            Value::Symbol(_) => "symbol",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::Vector(_) => "vector",
            Value::Quoted(_) => "quoted",
            Value::Type(_) => "type",
            Value::Native(_) => "native-function",
            Value::Closure(_) => "closure",
            Value::Struct(_) => "struct",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other, &mut Visited::new())
    }
}

/// Pairs of shared vectors and structs already under comparison
///
/// A pair met a second time is taken as equal, so values that reach themselves
/// compare in finite time.
pub(crate) type Visited = HashSet<(*const (), *const ())>;

/// Structural equality that terminates on self-referential vectors and structs
pub(crate) fn values_equal(left: &Value, right: &Value, visited: &mut Visited) -> bool {
    match (left, right) {
        (Value::Nil, Value::Nil) | (Value::True, Value::True) => true,
        (Value::Pair(_), Value::Pair(_)) => {
            // Walk the spine iteratively; only cars recurse
            let (mut left, mut right) = (left, right);
            loop {
                match (left, right) {
                    (Value::Pair(a), Value::Pair(b)) => {
                        if Rc::ptr_eq(a, b) {
                            return true;
                        }
                        if !values_equal(&a.car, &b.car, visited) {
                            return false;
                        }
                        left = &a.cdr;
                        right = &b.cdr;
                    }
                    _ => return values_equal(left, right, visited),
                }
            }
        }
        (Value::Symbol(a), Value::Symbol(b)) => a == b,
        (Value::Integer(a), Value::Integer(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Char(a), Value::Char(b)) => a == b,
        (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
        (Value::Vector(a), Value::Vector(b)) => {
            if Rc::ptr_eq(a, b) || !visited.insert(shared_key(a, b)) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| values_equal(x, y, visited))
        }
        (Value::Quoted(a), Value::Quoted(b)) => values_equal(a, b, visited),
        (Value::Type(a), Value::Type(b)) => a == b,
        (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b) || a.name() == b.name(),
        (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b) || a.equal_with(b, visited),
        (Value::Struct(a), Value::Struct(b)) => {
            if Rc::ptr_eq(a, b) || !visited.insert(shared_key(a, b)) {
                return true;
            }
            a.borrow().equal_with(&b.borrow(), visited)
        }
        _ => false,
    }
}

fn shared_key<T>(a: &Rc<T>, b: &Rc<T>) -> (*const (), *const ()) {
    (Rc::as_ptr(a).cast(), Rc::as_ptr(b).cast())
}

fn write_char_literal(f: &mut fmt::Formatter<'_>, ch: char) -> fmt::Result {
    match ch {
        ' ' => write!(f, "#\\space"),
        '\n' => write!(f, "#\\newline"),
        '\t' => write!(f, "#\\tab"),
        c => write!(f, "#\\{c}"),
    }
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in text.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

/// Render `value`; `raw` selects the print form over the write form
pub(crate) fn write_value(
    f: &mut fmt::Formatter<'_>,
    value: &Value,
    raw: bool,
    depth: usize,
) -> fmt::Result {
    if depth > MAX_DISPLAY_DEPTH {
        return write!(f, "...");
    }
    match value {
        Value::Nil => write!(f, "nil"),
        Value::True => write!(f, "t"),
        Value::Integer(n) => write!(f, "{n}"),
        Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
        Value::Float(x) => write!(f, "{x}"),
        Value::Char(c) if raw => write!(f, "{c}"),
        Value::Char(c) => write_char_literal(f, *c),
        Value::Symbol(name) => write!(f, "{name}"),
        Value::String(text) if raw => write!(f, "{}", text.borrow()),
        Value::String(text) => write_string_literal(f, &text.borrow()),
        Value::Vector(items) => {
            write!(f, "[")?;
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write_value(f, item, raw, depth + 1)?;
            }
            write!(f, "]")
        }
        Value::Pair(pair) => {
            write!(f, "(")?;
            write_value(f, &pair.car, raw, depth + 1)?;
            let mut rest = &pair.cdr;
            loop {
                match rest {
                    Value::Nil => break,
                    Value::Pair(next) => {
                        write!(f, " ")?;
                        write_value(f, &next.car, raw, depth + 1)?;
                        rest = &next.cdr;
                    }
                    tail => {
                        write!(f, " . ")?;
                        write_value(f, tail, raw, depth + 1)?;
                        break;
                    }
                }
            }
            write!(f, ")")
        }
        Value::Quoted(inner) => {
            write!(f, "'")?;
            write_value(f, inner, raw, depth + 1)
        }
        Value::Type(tag) => write!(f, "{tag}"),
        Value::Native(native) => write!(f, "{}", native.name()),
        Value::Closure(closure) => closure.write(f, raw, depth),
        Value::Struct(instance) => instance.borrow().write(f, raw, depth),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, f.alternate(), 0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::True => write!(f, "True"),
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::Char(c) => write!(f, "Char({c:?})"),
            Value::Symbol(name) => write!(f, "Symbol({name})"),
            Value::String(text) => write!(f, "String({:?})", text.borrow()),
            Value::Pair(_) => write!(f, "List({self})"),
            Value::Vector(_) => write!(f, "Vector({self})"),
            Value::Quoted(inner) => write!(f, "Quoted({inner:?})"),
            Value::Type(tag) => write!(f, "Type({tag})"),
            Value::Native(native) => write!(f, "Native({})", native.name()),
            Value::Closure(_) => write!(f, "Closure({self})"),
            Value::Struct(_) => write!(f, "Struct({self})"),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<TypeTag> for Value {
    fn from(tag: TypeTag) -> Self {
        Value::Type(tag)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(i64::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into).collect::<Vec<_>>())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into).collect::<Vec<_>>())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::list(slice.iter().cloned().map(Into::into).collect::<Vec<_>>())
    }
}

/// Helper for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::symbol(name.as_ref())
}

/// Helper for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// The empty list
pub fn nil() -> Value {
    Value::Nil
}

/// Helper for building a proper list out of mixed values
pub fn list<const N: usize>(items: [Value; N]) -> Value {
    Value::list(items)
}

/// Wrap a value so that it evaluates to itself
pub fn quote<T: Into<Value>>(value: T) -> Value {
    Value::quoted(value.into())
}

#[cfg(test)]
mod helper_function_tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (val(42), Value::Integer(42)),
            (val(-17), Value::Integer(-17)),
            (val(255u8), Value::Integer(255)),
            (val(i64::MIN), Value::Integer(i64::MIN)),
            (val(2.5), Value::Float(2.5)),
            (val('x'), Value::Char('x')),
            (val(true), Value::True),
            (val(false), Value::Nil),
            (val("hello"), Value::string("hello")),
            (sym("foo-bar?"), Value::symbol("foo-bar?")),
            (nil(), Value::Nil),
            (
                val([1, 2]),
                Value::cons(Value::Integer(1), Value::cons(Value::Integer(2), Value::Nil)),
            ),
            (
                list([sym("f"), val(1)]),
                Value::cons(Value::symbol("f"), Value::cons(Value::Integer(1), Value::Nil)),
            ),
            (quote(sym("x")), Value::quoted(Value::symbol("x"))),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "helper case #{}", i + 1);
        }
    }

    #[test]
    fn test_display_forms() {
        let dotted = Value::cons(val(1), Value::cons(val(2), val(3)));
        let test_cases = vec![
            (val([1, 2, 3]), "(1 2 3)", "(1 2 3)"),
            (dotted, "(1 2 . 3)", "(1 2 . 3)"),
            (Value::cons(sym("a"), sym("b")), "(a . b)", "(a . b)"),
            (nil(), "nil", "nil"),
            (Value::True, "t", "t"),
            (val(2.0), "2.0", "2.0"),
            (val(-0.5), "-0.5", "-0.5"),
            (val("say \"hi\"\n"), r#""say \"hi\"\n""#, "say \"hi\"\n"),
            (val('a'), "#\\a", "a"),
            (val(' '), "#\\space", " "),
            (quote(val([1, 2])), "'(1 2)", "'(1 2)"),
            (Value::vector(vec![val(1), val("s")]), "[1 \"s\"]", "[1 s]"),
            (list([sym("f"), val([1]), val("x")]), "(f (1) \"x\")", "(f (1) x)"),
            (Value::Type(BaseType::Number.tag()), ":number", ":number"),
        ];

        for (value, written, printed) in test_cases {
            assert_eq!(format!("{value}"), written);
            assert_eq!(format!("{value:#}"), printed);
        }
    }

    #[test]
    fn test_structural_list_equality() {
        let a = val([1, 2, 3]);
        let b = val([1, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(a, val([1, 2]));
        assert_ne!(val([1, 2]), Value::cons(val(1), val(2)));
        // Nil and True are distinct singletons, never equal to structure
        assert_ne!(Value::Nil, Value::True);
        assert_ne!(Value::Nil, val(0));
        // Mutable strings compare by contents
        assert_eq!(val("abc"), val("abc"));
    }

    #[test]
    fn test_to_vec() {
        assert_eq!(val([1, 2]).to_vec().unwrap_or_default(), vec![val(1), val(2)]);
        assert_eq!(nil().to_vec(), Ok(vec![]));
        assert!(matches!(
            Value::cons(val(1), val(2)).to_vec(),
            Err(Error::MalformedList(_))
        ));
        assert!(matches!(val(5).to_vec(), Err(Error::MalformedList(_))));
    }

    #[test]
    fn test_self_referencing_vector_displays() {
        let v = Value::vector(vec![val(1)]);
        if let Value::Vector(items) = &v {
            items.borrow_mut().push(v.clone());
        }
        let shown = format!("{v}");
        assert!(shown.starts_with("[1 [1 [1"));
        assert!(shown.contains("..."));
    }
}
