//! Symbol tables for values, types and struct templates.
//!
//! An [`Environment`] is a flat set of three maps. Cloning one copies the maps but not
//! the values in them, which is what gives closures their snapshot semantics: a closure
//! keeps the clone taken when it was created, so later `define`s in the creating scope
//! do not leak into it. The evaluator keeps a stack of environments for the calls in
//! progress; see [`crate::evaluator::Evaluator`].

use crate::ast::{Symbol, Value};
use crate::structs::StructRef;
use crate::types::TypeTag;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Environment for variable, type and struct bindings
#[derive(Clone, Default)]
pub struct Environment {
    bindings: HashMap<Symbol, Value>,
    types: HashMap<Symbol, TypeTag>,
    structs: HashMap<Symbol, StructRef>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bind `name`, replacing any existing binding
    pub fn put(&mut self, name: impl Into<Symbol>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeTag> {
        self.types.get(name)
    }

    /// Register `tag` under its own name; the last registration of a name wins
    pub fn put_type(&mut self, tag: TypeTag) {
        self.types.insert(Rc::from(tag.name()), tag);
    }

    pub fn get_struct(&self, name: &str) -> Option<&StructRef> {
        self.structs.get(name)
    }

    pub fn put_struct(&mut self, name: impl Into<Symbol>, template: StructRef) {
        self.structs.insert(name.into(), template);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Value bindings in no particular order
    pub fn bindings(&self) -> impl Iterator<Item = (&Symbol, &Value)> {
        self.bindings.iter()
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeTag> {
        self.types.values()
    }

    /// Render the bindings as a `let` form, sorted by name
    ///
    /// Native functions are listed only when `show_builtins` is set; `show_types` appends
    /// each value's type tag. Recomputed on every call.
    pub fn render(&self, show_builtins: bool, show_types: bool) -> String {
        let mut entries: Vec<(&Symbol, &Value)> = self
            .bindings
            .iter()
            .filter(|(_, value)| show_builtins || !matches!(value, Value::Native(_)))
            .collect();
        if entries.is_empty() {
            return "empty".to_owned();
        }
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        let rendered: Vec<String> = entries
            .into_iter()
            .map(|(name, value)| {
                if show_types {
                    format!("({name} {value} {})", value.type_tag())
                } else {
                    format!("({name} {value})")
                }
            })
            .collect();
        format!("(let ({}))", rendered.join(" "))
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.bindings.keys().map(|name| &**name).collect();
        names.sort_unstable();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("types", &self.types.len())
            .field("structs", &self.structs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::types::BaseType;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_put_get_remove() {
        let mut env = Environment::new();
        assert!(env.get("x").is_none());
        env.put("x", val(1));
        assert_eq!(env.get("x"), Some(&val(1)));
        env.put("x", val(2));
        assert_eq!(env.get("x"), Some(&val(2)));
        assert_eq!(env.remove("x"), Some(val(2)));
        assert!(!env.contains("x"));
    }

    #[test]
    fn test_clone_is_a_snapshot() {
        let mut outer = Environment::new();
        outer.put("y", val(1));
        let snapshot = outer.clone();
        outer.put("y", val(2));
        outer.put("z", val(3));
        assert_eq!(snapshot.get("y"), Some(&val(1)));
        assert!(snapshot.get("z").is_none());
    }

    #[test]
    fn test_clone_shares_mutable_values() {
        let mut env = Environment::new();
        env.put("s", val("abc"));
        let snapshot = env.clone();
        if let Some(Value::String(text)) = env.get("s") {
            text.borrow_mut().push('d');
        }
        assert_eq!(snapshot.get("s"), Some(&val("abcd")));
    }

    #[test]
    fn test_type_namespace_is_separate_and_last_wins() {
        let mut env = Environment::new();
        env.put("int", val(7));
        env.put_type(BaseType::Int.tag());
        assert_eq!(env.get("int"), Some(&val(7)));
        let registered = env.get_type(":int").and_then(TypeTag::parent).map(TypeTag::name);
        assert_eq!(registered, Some(":number"));

        let replacement = TypeTag::define(":int", Some(&BaseType::Any.tag()));
        env.put_type(replacement);
        let replaced = env.get_type(":int").and_then(TypeTag::parent).map(TypeTag::name);
        assert_eq!(replaced, Some(":any"));
    }

    #[test]
    fn test_render() {
        let mut env = Environment::new();
        assert_eq!(env.render(false, false), "empty");
        env.put("b", val("two"));
        env.put("a", val(1));
        assert_eq!(env.render(false, false), "(let ((a 1) (b \"two\")))");
        assert_eq!(env.render(false, true), "(let ((a 1 :int) (b \"two\" :string)))");
    }
}
