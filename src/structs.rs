//! Struct templates and instances.
//!
//! A struct is a named set of typed fields. Templates are built once, by
//! [`Struct::define`] or by [`Struct::derive`] from a parent (whose fields are copied
//! first, so the child's declarations override them), and every instance is a deep copy
//! of a template. Each struct mints a [`TypeTag`] under its parent's tag, so instances
//! pass type checks wherever an ancestor struct is expected.
//!
//! Instances are callable: `(p x)` reads field `x`, `(p x 5)` writes it.

use crate::Error;
use crate::ast::{Symbol, Value, Visited, values_equal, write_value};
use crate::types::{BaseType, TypeTag};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a template or instance
pub type StructRef = Rc<RefCell<Struct>>;

/// A typed slot
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub tag: TypeTag,
    pub value: Value,
}

/// A field as declared in a struct definition
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: Symbol,
    pub tag: TypeTag,
    pub default: Value,
}

impl FieldSpec {
    /// An untyped field defaulting to `Nil`
    pub fn new(name: &str) -> Self {
        FieldSpec {
            name: Rc::from(name),
            tag: BaseType::Any.tag(),
            default: Value::Nil,
        }
    }

    pub fn typed(mut self, tag: TypeTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }
}

#[derive(Clone)]
pub struct Struct {
    name: Symbol,
    tag: TypeTag,
    fields: IndexMap<Symbol, Field>,
}

impl Struct {
    /// Build a root template whose tag sits directly under `:struct`
    pub fn define(name: &str, fields: Vec<FieldSpec>) -> Result<Struct, Error> {
        let tag = TypeTag::define(struct_type_name(name), Some(&BaseType::Struct.tag()));
        Self::build(name, tag, IndexMap::new(), fields)
    }

    /// Build a template inheriting `parent`'s fields; the new tag is a child of the parent's
    pub fn derive(name: &str, parent: &Struct, fields: Vec<FieldSpec>) -> Result<Struct, Error> {
        let tag = TypeTag::define(struct_type_name(name), Some(&parent.tag));
        let inherited = parent.copy_fields(&mut Vec::new());
        Self::build(name, tag, inherited, fields)
    }

    fn build(
        name: &str,
        tag: TypeTag,
        mut fields: IndexMap<Symbol, Field>,
        declared: Vec<FieldSpec>,
    ) -> Result<Struct, Error> {
        for spec in declared {
            if !spec.default.is_nil() && !spec.tag.accepts(&spec.default) {
                return Err(Error::TypeMismatch {
                    function: name.to_owned(),
                    position: 1,
                    expected: vec![BaseType::Symbol.name().to_owned(), spec.tag.to_string()],
                    actual: vec![
                        BaseType::Symbol.name().to_owned(),
                        spec.default.type_tag().to_string(),
                    ],
                });
            }
            fields.insert(
                spec.name,
                Field {
                    tag: spec.tag,
                    value: spec.default,
                },
            );
        }
        Ok(Struct {
            name: Rc::from(name),
            tag,
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Fields in declaration order, inherited ones first
    pub fn fields(&self) -> impl Iterator<Item = (&Symbol, &Field)> {
        self.fields.iter()
    }

    pub fn get(&self, name: &str) -> Result<Value, Error> {
        self.fields
            .get(name)
            .map(|field| field.value.clone())
            .ok_or_else(|| self.no_such_field(name))
    }

    /// Deep copy: nested struct values are copied too, so the result shares no struct
    /// state with `self`
    pub fn instantiate(&self) -> Struct {
        Struct {
            name: Rc::clone(&self.name),
            tag: self.tag.clone(),
            fields: self.copy_fields(&mut Vec::new()),
        }
    }

    /// `path` holds the structs being copied further up; a field pointing back at one of
    /// them keeps the reference instead of recursing forever
    fn copy_fields(&self, path: &mut Vec<*const RefCell<Struct>>) -> IndexMap<Symbol, Field> {
        self.fields
            .iter()
            .map(|(name, field)| {
                let value = match &field.value {
                    Value::Struct(nested) if !path.contains(&Rc::as_ptr(nested)) => {
                        path.push(Rc::as_ptr(nested));
                        let copy = {
                            let inner = nested.borrow();
                            Struct {
                                name: Rc::clone(&inner.name),
                                tag: inner.tag.clone(),
                                fields: inner.copy_fields(path),
                            }
                        };
                        path.pop();
                        Value::Struct(Rc::new(RefCell::new(copy)))
                    }
                    other => other.clone(),
                };
                (
                    Rc::clone(name),
                    Field {
                        tag: field.tag.clone(),
                        value,
                    },
                )
            })
            .collect()
    }

    fn no_such_field(&self, name: &str) -> Error {
        Error::EvalError(format!("struct {} has no field {name}", self.name))
    }

    pub(crate) fn write(&self, f: &mut fmt::Formatter<'_>, raw: bool, depth: usize) -> fmt::Result {
        write!(f, "#<struct {}", self.name)?;
        for (name, field) in &self.fields {
            write!(f, " ({name} ")?;
            write_value(f, &field.value, raw, depth + 1)?;
            write!(f, ")")?;
        }
        write!(f, ">")
    }
}

impl Struct {
    pub(crate) fn equal_with(&self, other: &Struct, visited: &mut Visited) -> bool {
        self.name == other.name
            && self.fields.len() == other.fields.len()
            && self.fields.iter().all(|(name, field)| {
                other.fields.get(name).is_some_and(|theirs| {
                    field.tag == theirs.tag && values_equal(&field.value, &theirs.value, visited)
                })
            })
    }
}

impl PartialEq for Struct {
    fn eq(&self, other: &Self) -> bool {
        self.equal_with(other, &mut Visited::new())
    }
}

impl fmt::Debug for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Struct")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Type tag name for the struct called `name`
pub fn struct_type_name(name: &str) -> String {
    format!(":{name}")
}

/// Write `value` into `field` of `instance` after checking the field's declared type
///
/// Works on the shared handle so that storing an instance into one of its own fields
/// does not need a second borrow while checking.
pub fn set_field(instance: &StructRef, field: &str, value: Value) -> Result<Value, Error> {
    let tag = {
        let target = instance.borrow();
        match target.field(field) {
            Some(slot) => slot.tag.clone(),
            None => return Err(target.no_such_field(field)),
        }
    };
    if !tag.accepts(&value) {
        return Err(Error::TypeMismatch {
            function: instance.borrow().name().to_owned(),
            position: 1,
            expected: vec![BaseType::Symbol.name().to_owned(), tag.to_string()],
            actual: vec![
                BaseType::Symbol.name().to_owned(),
                value.type_tag().to_string(),
            ],
        });
    }
    if let Some(slot) = instance.borrow_mut().fields.get_mut(field) {
        slot.value = value.clone();
    }
    Ok(value)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    fn point() -> Struct {
        Struct::define(
            "point",
            vec![
                FieldSpec::new("x").typed(BaseType::Number.tag()).with_default(val(0)),
                FieldSpec::new("y").typed(BaseType::Number.tag()).with_default(val(0)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_define_and_read_defaults() {
        let p = point();
        assert_eq!(p.get("x"), Ok(val(0)));
        assert_eq!(p.tag().name(), ":point");
        assert_eq!(p.tag().parent().map(TypeTag::name), Some(":struct"));
        assert!(matches!(p.get("z"), Err(Error::EvalError(_))));
    }

    #[test]
    fn test_derived_field_overrides_and_tag_chain() {
        let base = point();
        let derived = Struct::derive(
            "pixel",
            &base,
            vec![
                FieldSpec::new("y").typed(BaseType::Int.tag()).with_default(val(9)),
                FieldSpec::new("color").with_default(val("red")),
            ],
        )
        .unwrap();

        assert_eq!(derived.get("x"), Ok(val(0)));
        assert_eq!(derived.get("y"), Ok(val(9)));
        assert_eq!(derived.get("color"), Ok(val("red")));
        let names: Vec<&str> = derived.fields().map(|(name, _)| &**name).collect();
        assert_eq!(names, vec!["x", "y", "color"]);

        let instance = Value::Struct(Rc::new(RefCell::new(derived.instantiate())));
        assert!(base.tag().accepts(&instance));
        assert!(BaseType::Struct.tag().accepts(&instance));
        assert!(!derived.tag().accepts(&Value::Struct(Rc::new(RefCell::new(base.instantiate())))));
    }

    #[test]
    fn test_default_must_match_declared_type() {
        let err = Struct::define(
            "bad",
            vec![FieldSpec::new("n").typed(BaseType::Int.tag()).with_default(val("no"))],
        );
        assert!(matches!(err, Err(Error::TypeMismatch { position: 1, .. })));
    }

    #[test]
    fn test_set_field_checks_type() {
        let instance = Rc::new(RefCell::new(point().instantiate()));
        assert_eq!(set_field(&instance, "x", val(3.5)), Ok(val(3.5)));
        assert_eq!(instance.borrow().get("x"), Ok(val(3.5)));
        assert!(matches!(
            set_field(&instance, "x", val("three")),
            Err(Error::TypeMismatch { position: 1, .. })
        ));
        assert!(matches!(set_field(&instance, "q", val(1)), Err(Error::EvalError(_))));
    }

    #[test]
    fn test_instances_do_not_alias_nested_template_state() {
        let inner = Rc::new(RefCell::new(point()));
        let outer = Struct::define(
            "segment",
            vec![FieldSpec::new("start").with_default(Value::Struct(Rc::clone(&inner)))],
        )
        .unwrap();

        let copy = outer.instantiate();
        let Ok(Value::Struct(nested)) = copy.get("start") else {
            panic!("expected nested struct");
        };
        assert!(!Rc::ptr_eq(&nested, &inner));
        set_field(&nested, "x", val(42)).unwrap();
        assert_eq!(inner.borrow().get("x"), Ok(val(0)));
    }

    #[test]
    fn test_self_reference_survives_copy() {
        let node = Rc::new(RefCell::new(
            Struct::define("node", vec![FieldSpec::new("next")]).unwrap(),
        ));
        set_field(&node, "next", Value::Struct(Rc::clone(&node))).unwrap();
        let copy = node.borrow().instantiate();
        assert!(matches!(copy.get("next"), Ok(Value::Struct(_))));
    }
}
