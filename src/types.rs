//! Nominal type tags used for runtime argument checks.
//!
//! A [`TypeTag`] is a name plus an optional parent. Tags form single-inheritance chains
//! rooted at `:any`; [`TypeTag::accepts`] walks a value's own tag up through its parents
//! looking for a match, so `:int` and `:float` both satisfy `:number`.
//!
//! The base hierarchy:
//!
//! ```text
//! :any
//! ├── :atom
//! │   ├── :symbol
//! │   ├── :t
//! │   ├── :type
//! │   ├── :function
//! │   ├── :primitive
//! │   │   ├── :number
//! │   │   │   ├── :int
//! │   │   │   └── :float
//! │   │   └── :char
//! │   └── :array
//! │       ├── :string
//! │       └── :vector
//! ├── :cons
//! │   └── :nil
//! └── :struct
//! ```

use crate::ast::Value;
use std::fmt;
use std::sync::{Arc, LazyLock};

struct TagData {
    name: Arc<str>,
    parent: Option<TypeTag>,
}

/// A nominal type descriptor
///
/// Two tags are equal when their names are equal. Registering a tag under an existing
/// name in an [`Environment`](crate::environment::Environment) replaces the old one.
#[derive(Clone)]
pub struct TypeTag(Arc<TagData>);

impl TypeTag {
    /// Mint a new tag under `parent` (a root tag when `parent` is `None`)
    pub fn define(name: impl AsRef<str>, parent: Option<&TypeTag>) -> Self {
        TypeTag(Arc::new(TagData {
            name: Arc::from(name.as_ref()),
            parent: parent.cloned(),
        }))
    }

    /// An unresolved reference as produced by the reader, e.g. `:int`
    ///
    /// The evaluator swaps these for the registered tag of the same name.
    pub fn reference(name: impl AsRef<str>) -> Self {
        Self::define(name, None)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&TypeTag> {
        self.0.parent.as_ref()
    }

    /// Iterate this tag followed by each of its ancestors
    pub fn ancestors(&self) -> impl Iterator<Item = &TypeTag> {
        std::iter::successors(Some(self), |tag| tag.parent())
    }

    /// True when `self` is `other` or one of its ancestors
    pub fn is_supertype_of(&self, other: &TypeTag) -> bool {
        other.ancestors().any(|ancestor| ancestor == self)
    }

    /// Subtype test: does `value`'s tag (or any of its parents) equal this tag?
    pub fn accepts(&self, value: &Value) -> bool {
        self.is_supertype_of(&value.type_tag())
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.name == other.0.name
    }
}

impl Eq for TypeTag {}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent() {
            Some(parent) => write!(f, "TypeTag({} < {})", self.name(), parent.name()),
            None => write!(f, "TypeTag({})", self.name()),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The tags every environment starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Any,
    Atom,
    Cons,
    Nil,
    True,
    Symbol,
    Type,
    Function,
    Primitive,
    Number,
    Int,
    Float,
    Char,
    Array,
    String,
    Vector,
    Struct,
}

impl BaseType {
    /// All base types, parents listed before their children
    pub const ALL: [BaseType; 17] = [
        BaseType::Any,
        BaseType::Atom,
        BaseType::Cons,
        BaseType::Nil,
        BaseType::True,
        BaseType::Symbol,
        BaseType::Type,
        BaseType::Function,
        BaseType::Primitive,
        BaseType::Number,
        BaseType::Int,
        BaseType::Float,
        BaseType::Char,
        BaseType::Array,
        BaseType::String,
        BaseType::Vector,
        BaseType::Struct,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BaseType::Any => ":any",
            BaseType::Atom => ":atom",
            BaseType::Cons => ":cons",
            BaseType::Nil => ":nil",
            BaseType::True => ":t",
            BaseType::Symbol => ":symbol",
            BaseType::Type => ":type",
            BaseType::Function => ":function",
            BaseType::Primitive => ":primitive",
            BaseType::Number => ":number",
            BaseType::Int => ":int",
            BaseType::Float => ":float",
            BaseType::Char => ":char",
            BaseType::Array => ":array",
            BaseType::String => ":string",
            BaseType::Vector => ":vector",
            BaseType::Struct => ":struct",
        }
    }

    pub fn parent(self) -> Option<BaseType> {
        match self {
            BaseType::Any => None,
            BaseType::Atom | BaseType::Cons | BaseType::Struct => Some(BaseType::Any),
            BaseType::Nil => Some(BaseType::Cons),
            BaseType::True
            | BaseType::Symbol
            | BaseType::Type
            | BaseType::Function
            | BaseType::Primitive
            | BaseType::Array => Some(BaseType::Atom),
            BaseType::Number | BaseType::Char => Some(BaseType::Primitive),
            BaseType::Int | BaseType::Float => Some(BaseType::Number),
            BaseType::String | BaseType::Vector => Some(BaseType::Array),
        }
    }

    /// The shared tag for this base type
    pub fn tag(self) -> TypeTag {
        BASE_TAGS[self as usize].clone()
    }
}

static BASE_TAGS: LazyLock<Vec<TypeTag>> = LazyLock::new(|| {
    let mut tags: Vec<TypeTag> = Vec::with_capacity(BaseType::ALL.len());
    for base in BaseType::ALL {
        let parent = base.parent().map(|parent| &tags[parent as usize]);
        let tag = TypeTag::define(base.name(), parent);
        tags.push(tag);
    }
    tags
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    #[test]
    fn test_base_hierarchy_accepts() {
        let test_cases = vec![
            (BaseType::Any, val(1), true),
            (BaseType::Number, val(1), true),
            (BaseType::Number, val(1.5), true),
            (BaseType::Int, val(1.5), false),
            (BaseType::Float, val(1.5), true),
            (BaseType::Primitive, val('c'), true),
            (BaseType::Number, val('c'), false),
            (BaseType::Atom, sym("x"), true),
            (BaseType::Symbol, sym("x"), true),
            (BaseType::Cons, nil(), true),
            (BaseType::Nil, nil(), true),
            (BaseType::Cons, val([1, 2]), true),
            (BaseType::Nil, val([1, 2]), false),
            (BaseType::Atom, val([1, 2]), false),
            (BaseType::Array, val("text"), true),
            (BaseType::String, val("text"), true),
            (BaseType::Vector, val("text"), false),
            (BaseType::True, Value::True, true),
            (BaseType::Type, Value::Type(BaseType::Int.tag()), true),
        ];

        for (i, (base, value, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(
                base.tag().accepts(&value),
                expected,
                "case #{}: {} accepts {value}",
                i + 1,
                base.name()
            );
        }
    }

    #[test]
    fn test_every_base_type_reaches_any() {
        let any = BaseType::Any.tag();
        for base in BaseType::ALL {
            assert!(any.is_supertype_of(&base.tag()), "{} is not under :any", base.name());
            assert_eq!(base.tag().ancestors().last(), Some(&any));
        }
    }

    #[test]
    fn test_minted_tags_chain_through_parents() {
        let shape = TypeTag::define(":shape", Some(&BaseType::Struct.tag()));
        let circle = TypeTag::define(":circle", Some(&shape));

        assert!(shape.is_supertype_of(&circle));
        assert!(!circle.is_supertype_of(&shape));
        assert!(BaseType::Any.tag().is_supertype_of(&circle));
        assert_eq!(
            circle.ancestors().map(TypeTag::name).collect::<Vec<_>>(),
            vec![":circle", ":shape", ":struct", ":any"]
        );
    }

    #[test]
    fn test_equality_is_by_name() {
        assert_eq!(TypeTag::reference(":int"), BaseType::Int.tag());
        assert_ne!(TypeTag::reference(":int"), BaseType::Float.tag());
    }
}
