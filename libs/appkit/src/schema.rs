//! Explicit schema descriptors captured when an endpoint or hook is tagged.
//!
//! A [`TypeDescriptor`] is computed once from the type's `utoipa::PartialSchema`
//! and carries everything the validator needs: a short display name and the
//! structural [`Shape`]. The raw schema is kept for the OpenAPI document.

use std::fmt;

use utoipa::openapi::schema::{Schema, SchemaType, Type};
use utoipa::openapi::RefOr;
use utoipa::PartialSchema;

/// Structural classification of a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// An object schema with declared properties (or a named component reference).
    Record,
    /// A scalar: string, integer, number, boolean, null.
    Primitive,
    /// An object schema that only declares `additionalProperties`.
    Map,
    Array,
    /// `oneOf` / `allOf` / `anyOf`.
    Composite,
    /// No schema information (references, trait objects, `AnyValue`).
    Opaque,
}

/// Name + shape (+ schema when known) of a parameter or return type.
#[derive(Clone)]
pub struct TypeDescriptor {
    name: String,
    shape: Shape,
    schema: Option<RefOr<Schema>>,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("has_schema", &self.schema.is_some())
            .finish()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.shape == other.shape
    }
}

impl TypeDescriptor {
    /// Describe `T` from its utoipa schema.
    pub fn of<T: PartialSchema + 'static>() -> Self {
        let schema = T::schema();
        Self {
            name: short_type_name(std::any::type_name::<T>()),
            shape: classify(&schema),
            schema: Some(schema),
        }
    }

    /// A type known only by its written name.
    pub fn opaque(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Opaque,
            schema: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn is_record(&self) -> bool {
        self.shape == Shape::Record
    }

    pub fn schema(&self) -> Option<&RefOr<Schema>> {
        self.schema.as_ref()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One declared parameter (receiver excluded). `ty` is `None` when the
/// parameter carries no concrete type (e.g. `impl Trait`).
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeDescriptor>,
}

/// Declared signature of a tagged method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub params: Vec<Param>,
    pub returns: Option<TypeDescriptor>,
}

impl Signature {
    pub fn first_param(&self) -> Option<&Param> {
        self.params.first()
    }
}

fn classify(schema: &RefOr<Schema>) -> Shape {
    match schema {
        RefOr::Ref(_) => Shape::Record,
        RefOr::T(Schema::Object(obj)) => {
            if !obj.properties.is_empty() {
                return Shape::Record;
            }
            if obj.additional_properties.is_some() {
                return Shape::Map;
            }
            if let SchemaType::Type(ty) = &obj.schema_type {
                return match ty {
                    Type::Object => Shape::Record,
                    Type::Array => Shape::Array,
                    _ => Shape::Primitive,
                };
            }
            if let SchemaType::Array(types) = &obj.schema_type {
                return if types.contains(&Type::Object) {
                    Shape::Record
                } else {
                    Shape::Primitive
                };
            }
            Shape::Opaque
        }
        RefOr::T(Schema::Array(_)) => Shape::Array,
        RefOr::T(Schema::OneOf(_) | Schema::AllOf(_) | Schema::AnyOf(_)) => Shape::Composite,
        RefOr::T(_) => Shape::Opaque,
    }
}

/// Strip module paths from a `std::any::type_name` string, keeping generics:
/// `std::collections::hash::map::HashMap<alloc::string::String, i64>` becomes
/// `HashMap<String, i64>`.
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment_start = 0;
    let mut chars = full.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            out.truncate(segment_start);
            continue;
        }
        out.push(c);
        if !(c.is_alphanumeric() || c == '_') {
            segment_start = out.len();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[allow(dead_code)]
    #[derive(utoipa::ToSchema)]
    struct TwoNumbers {
        a: i64,
        b: i64,
    }

    #[test]
    fn short_names_drop_module_paths() {
        assert_eq!(short_type_name("alloc::string::String"), "String");
        assert_eq!(
            short_type_name("std::collections::hash::map::HashMap<alloc::string::String, i64>"),
            "HashMap<String, i64>"
        );
        assert_eq!(short_type_name("my_app::models::TwoNumbers"), "TwoNumbers");
        assert_eq!(
            short_type_name("alloc::vec::Vec<core::option::Option<u8>>"),
            "Vec<Option<u8>>"
        );
        assert_eq!(short_type_name("i64"), "i64");
    }

    #[test]
    fn derived_struct_is_a_record() {
        let td = TypeDescriptor::of::<TwoNumbers>();
        assert_eq!(td.name(), "TwoNumbers");
        assert_eq!(td.shape(), Shape::Record);
        assert!(td.schema().is_some());
    }

    #[test]
    fn scalars_are_primitive() {
        assert_eq!(TypeDescriptor::of::<String>().shape(), Shape::Primitive);
        assert_eq!(TypeDescriptor::of::<i64>().shape(), Shape::Primitive);
        assert_eq!(TypeDescriptor::of::<bool>().shape(), Shape::Primitive);
    }

    #[test]
    fn string_keyed_map_is_a_map() {
        let td = TypeDescriptor::of::<HashMap<String, i64>>();
        assert_eq!(td.shape(), Shape::Map);
        assert_eq!(td.name(), "HashMap<String, i64>");
    }

    #[test]
    fn vec_is_an_array() {
        assert_eq!(TypeDescriptor::of::<Vec<i64>>().shape(), Shape::Array);
    }

    #[test]
    fn opaque_keeps_written_name() {
        let td = TypeDescriptor::opaque("&str");
        assert_eq!(td.shape(), Shape::Opaque);
        assert_eq!(td.to_string(), "&str");
        assert!(!td.is_record());
    }
}
