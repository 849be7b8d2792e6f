//! Classification of C types into binding categories.
//!
//! Rules are applied in a fixed order and the first match wins:
//!
//! 1. `char*` (const or not) is a string pointer
//! 2. a pointer to an opaque struct is an opaque handle
//! 3. a pointer to a record struct is a struct pointer
//! 4. any other pointer is a raw address
//! 5. a bare opaque struct name is the handle itself (`typedef struct X_s *X;`)
//! 6. a record struct name is a struct passed by value
//! 7. an enum name is a 32-bit signed enum value
//! 8. `void` is void, primitive names resolve through a fixed width table
//!
//! Typedef names are replaced by their target before the rules run.

use std::sync::OnceLock;

use regex::Regex;

use crate::{codegen::TypeIndex, model::CType, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }

    fn from_bits(bits: &str) -> Option<Self> {
        match bits {
            "8" => Some(IntWidth::W8),
            "16" => Some(IntWidth::W16),
            "32" => Some(IntWidth::W32),
            "64" => Some(IntWidth::W64),
            _ => None,
        }
    }
}

/// Widths of the C integer types whose size depends on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataModel {
    /// `long` and `unsigned long`
    pub long: IntWidth,
    /// `size_t`, `ssize_t`, `intptr_t`, `uintptr_t` and `ptrdiff_t`
    pub pointer: IntWidth,
}

impl DataModel {
    /// 64-bit Unix
    pub const LP64: Self = Self {
        long: IntWidth::W64,
        pointer: IntWidth::W64,
    };
    /// 64-bit Windows
    pub const LLP64: Self = Self {
        long: IntWidth::W32,
        pointer: IntWidth::W64,
    };
    /// 32-bit targets
    pub const ILP32: Self = Self {
        long: IntWidth::W32,
        pointer: IntWidth::W32,
    };
}

impl Default for DataModel {
    fn default() -> Self {
        Self::LP64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatWidth {
    F32,
    F64,
}

/// The binding category of a C type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Void,
    Bool,
    Integral { width: IntWidth, signed: bool },
    Float(FloatWidth),
    /// `char*` / `const char*`, marshaled as text
    StringPointer,
    /// Address of an opaque native object, carrying the struct name
    OpaqueHandle(String),
    /// Address of a record struct
    StructPointer(String),
    /// Any other address
    RawPointer,
    StructByValue(String),
    EnumValue(String),
}

impl Category {
    pub fn is_void(&self) -> bool {
        matches!(self, Category::Void)
    }

    /// Categories whose values are addresses the native side may dereference
    pub fn is_address(&self) -> bool {
        matches!(self, Category::StructPointer(_) | Category::RawPointer)
    }
}

fn integral(width: IntWidth, signed: bool, unsigned: bool) -> Category {
    Category::Integral {
        width,
        signed: signed && !unsigned,
    }
}

/// Primitive names with their width and signedness. `long` and the pointer-sized
/// integers take their width from the target's data model.
fn primitive(name: &str, unsigned: bool, model: DataModel) -> Option<Category> {
    use IntWidth::*;
    let category = match name {
        "void" => Category::Void,
        "bool" | "_Bool" => Category::Bool,
        "float" => Category::Float(FloatWidth::F32),
        "double" => Category::Float(FloatWidth::F64),
        "char" => integral(W8, true, unsigned),
        "short" => integral(W16, true, unsigned),
        "int" => integral(W32, true, unsigned),
        "long" => integral(model.long, true, unsigned),
        "long long" => integral(W64, true, unsigned),
        "int8_t" => integral(W8, true, unsigned),
        "uint8_t" => integral(W8, false, unsigned),
        "int16_t" => integral(W16, true, unsigned),
        "uint16_t" => integral(W16, false, unsigned),
        "int32_t" => integral(W32, true, unsigned),
        "uint32_t" => integral(W32, false, unsigned),
        "int64_t" => integral(W64, true, unsigned),
        "uint64_t" => integral(W64, false, unsigned),
        "size_t" | "uintptr_t" => integral(model.pointer, false, unsigned),
        "ssize_t" | "intptr_t" | "ptrdiff_t" => integral(model.pointer, true, unsigned),
        _ => return None,
    };
    Some(category)
}

fn integer_alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^_*(?:(?P<u>u)?int|(?P<short>[iu]))(?P<bits>8|16|32|64)(?:_t)?$")
            .expect("integer alias pattern is valid")
    })
}

fn float_alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^_*(?:f|float)(?P<bits>32|64)(?:_t)?$").expect("float alias pattern is valid")
    })
}

/// Match names that look like a fixed-width alias (`int32`, `u8`, `__uint16_t`, `float64`)
fn plausible_alias(name: &str, unsigned: bool) -> Option<Category> {
    if let Some(captures) = integer_alias_pattern().captures(name) {
        let width = IntWidth::from_bits(&captures["bits"])?;
        let signed = match captures.name("short") {
            Some(short) => short.as_str() == "i",
            None => captures.name("u").is_none(),
        };
        return Some(integral(width, signed, unsigned));
    }
    let captures = float_alias_pattern().captures(name)?;
    match &captures["bits"] {
        "32" => Some(Category::Float(FloatWidth::F32)),
        _ => Some(Category::Float(FloatWidth::F64)),
    }
}

/// Replace a typedef name by its target, folding in the qualifiers of the use site.
/// Returns `Ok(None)` when the result is a pointer to a pointer.
fn resolve_typedef(ty: &CType, target: &CType) -> Option<CType> {
    if ty.pointer && target.pointer {
        return None;
    }
    let mut resolved = target.clone();
    resolved.pointer |= ty.pointer;
    resolved.is_const |= ty.is_const;
    resolved.unsigned |= ty.unsigned;
    resolved.array = ty.array.iter().chain(target.array.iter()).copied().collect();
    Some(resolved)
}

/// Classify a C type. `decl` names the declaration the type appears in and is only
/// used for error reporting.
pub fn classify(ty: &CType, index: &TypeIndex, decl: &str) -> Result<Category, Error> {
    let mut current = ty.clone();
    // Each typedef can be expanded at most once on an acyclic chain
    for _ in 0..=index.typedef_count() {
        let name = current.name.as_str();
        let user_type = index.struct_decl(name).is_some() || index.is_enum(name);
        let Some(target) = index.typedef(name).filter(|_| !user_type) else {
            return classify_resolved(&current, index, decl);
        };
        match resolve_typedef(&current, target) {
            Some(resolved) => current = resolved,
            None => return Ok(Category::RawPointer),
        }
    }
    Err(Error::unknown_type(decl, ty))
}

fn classify_resolved(ty: &CType, index: &TypeIndex, decl: &str) -> Result<Category, Error> {
    let name = ty.name.as_str();

    // Arrays outside records decay to a pointer to their element
    if !ty.array.is_empty() {
        if ty.pointer {
            return Ok(Category::RawPointer);
        }
        let decayed = CType {
            pointer: true,
            array: Vec::new(),
            ..ty.clone()
        };
        return classify_resolved(&decayed, index, decl);
    }

    if ty.pointer {
        if name == "char" {
            return Ok(Category::StringPointer);
        }
        if index.is_opaque_struct(name) {
            return Ok(Category::OpaqueHandle(name.to_string()));
        }
        if index.is_record_struct(name) {
            return Ok(Category::StructPointer(name.to_string()));
        }
        return Ok(Category::RawPointer);
    }

    if index.is_opaque_struct(name) {
        return Ok(Category::OpaqueHandle(name.to_string()));
    }
    if index.is_record_struct(name) {
        return Ok(Category::StructByValue(name.to_string()));
    }
    if index.is_enum(name) {
        return Ok(Category::EnumValue(name.to_string()));
    }

    primitive(name, ty.unsigned, index.data_model())
        .or_else(|| plausible_alias(name, ty.unsigned))
        .ok_or_else(|| Error::unknown_type(decl, ty))
}

/// Classify the element type of a record field array (`T name[N]`)
pub(crate) fn classify_element(ty: &CType, index: &TypeIndex, decl: &str) -> Result<Category, Error> {
    let element = CType {
        array: Vec::new(),
        ..ty.clone()
    };
    classify(&element, index, decl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Declarations, EnumDecl, EnumMember, StructDecl, TypedefDecl};

    fn declarations() -> Declarations {
        Declarations {
            structs: vec![
                StructDecl::opaque("Calc"),
                StructDecl::new(
                    "CalcConfig",
                    vec![crate::model::FieldDecl::new("value", CType::new("double"))],
                ),
            ],
            enums: vec![EnumDecl::new("Mode", vec![EnumMember::new("FAST", None)])],
            typedefs: vec![
                TypedefDecl::new("Flags", CType::new("uint32_t")),
                TypedefDecl::new("ConfigAlias", CType::new("CalcConfig")),
                TypedefDecl::new("CalcPtr", CType::pointer_to("Calc")),
                TypedefDecl::new("LoopA", CType::new("LoopB")),
                TypedefDecl::new("LoopB", CType::new("LoopA")),
            ],
            ..Default::default()
        }
    }

    fn check(ty: CType) -> Result<Category, Error> {
        let declarations = declarations();
        let index = TypeIndex::new(&declarations);
        classify(&ty, &index, "test")
    }

    #[test]
    fn test_string_pointers() {
        assert_eq!(check(CType::pointer_to("char")), Ok(Category::StringPointer));
        assert_eq!(
            check(CType::pointer_to("char").with_const()),
            Ok(Category::StringPointer)
        );
        // unsigned char* is still a char pointer
        assert_eq!(
            check(CType::pointer_to("char").with_unsigned()),
            Ok(Category::StringPointer)
        );
    }

    #[test]
    fn test_struct_categories() {
        assert_eq!(
            check(CType::pointer_to("Calc")),
            Ok(Category::OpaqueHandle("Calc".into()))
        );
        assert_eq!(
            check(CType::new("Calc")),
            Ok(Category::OpaqueHandle("Calc".into()))
        );
        assert_eq!(
            check(CType::pointer_to("CalcConfig")),
            Ok(Category::StructPointer("CalcConfig".into()))
        );
        assert_eq!(
            check(CType::new("CalcConfig")),
            Ok(Category::StructByValue("CalcConfig".into()))
        );
        assert_eq!(check(CType::pointer_to("void")), Ok(Category::RawPointer));
        assert_eq!(check(CType::pointer_to("int")), Ok(Category::RawPointer));
    }

    #[test]
    fn test_enum_and_void() {
        assert_eq!(check(CType::new("Mode")), Ok(Category::EnumValue("Mode".into())));
        assert_eq!(check(CType::new("void")), Ok(Category::Void));
    }

    #[test]
    fn test_primitive_table() {
        let int = |width, signed| Ok(Category::Integral { width, signed });
        assert_eq!(check(CType::new("int")), int(IntWidth::W32, true));
        assert_eq!(check(CType::new("int").with_unsigned()), int(IntWidth::W32, false));
        assert_eq!(check(CType::new("char").with_unsigned()), int(IntWidth::W8, false));
        assert_eq!(check(CType::new("long")), int(IntWidth::W64, true));
        assert_eq!(check(CType::new("size_t")), int(IntWidth::W64, false));
        assert_eq!(check(CType::new("uint8_t")), int(IntWidth::W8, false));
        assert_eq!(check(CType::new("int16_t")), int(IntWidth::W16, true));
        assert_eq!(check(CType::new("bool")), Ok(Category::Bool));
        assert_eq!(check(CType::new("float")), Ok(Category::Float(FloatWidth::F32)));
        assert_eq!(check(CType::new("double")), Ok(Category::Float(FloatWidth::F64)));
    }

    #[test]
    fn test_target_dependent_widths() {
        let int = |width, signed| Ok(Category::Integral { width, signed });
        let declarations = declarations();
        let classify_with = |ty: CType, model| {
            let index = TypeIndex::new(&declarations).with_data_model(model);
            classify(&ty, &index, "test")
        };

        assert_eq!(classify_with(CType::new("long"), DataModel::LLP64), int(IntWidth::W32, true));
        assert_eq!(
            classify_with(CType::new("long").with_unsigned(), DataModel::LLP64),
            int(IntWidth::W32, false)
        );
        assert_eq!(classify_with(CType::new("long long"), DataModel::LLP64), int(IntWidth::W64, true));
        assert_eq!(classify_with(CType::new("size_t"), DataModel::LLP64), int(IntWidth::W64, false));

        assert_eq!(classify_with(CType::new("long"), DataModel::ILP32), int(IntWidth::W32, true));
        assert_eq!(classify_with(CType::new("size_t"), DataModel::ILP32), int(IntWidth::W32, false));
        assert_eq!(classify_with(CType::new("ptrdiff_t"), DataModel::ILP32), int(IntWidth::W32, true));
        assert_eq!(classify_with(CType::new("int64_t"), DataModel::ILP32), int(IntWidth::W64, true));
    }

    #[test]
    fn test_plausible_aliases() {
        let int = |width, signed| Ok(Category::Integral { width, signed });
        assert_eq!(check(CType::new("int32")), int(IntWidth::W32, true));
        assert_eq!(check(CType::new("uint16")), int(IntWidth::W16, false));
        assert_eq!(check(CType::new("u8")), int(IntWidth::W8, false));
        assert_eq!(check(CType::new("i64")), int(IntWidth::W64, true));
        assert_eq!(check(CType::new("__uint32_t")), int(IntWidth::W32, false));
        assert_eq!(check(CType::new("float32")), Ok(Category::Float(FloatWidth::F32)));
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        assert_eq!(
            check(CType::new("widget")),
            Err(Error::UnknownType {
                decl: "test".into(),
                ty: "widget".into()
            })
        );
        assert!(check(CType::new("int128")).is_err());
    }

    #[test]
    fn test_typedef_resolution() {
        let int = |width, signed| Ok(Category::Integral { width, signed });
        assert_eq!(check(CType::new("Flags")), int(IntWidth::W32, false));
        assert_eq!(check(CType::pointer_to("Flags")), Ok(Category::RawPointer));
        assert_eq!(
            check(CType::new("ConfigAlias")),
            Ok(Category::StructByValue("CalcConfig".into()))
        );
        assert_eq!(
            check(CType::new("CalcPtr")),
            Ok(Category::OpaqueHandle("Calc".into()))
        );
        // Pointer to a pointer typedef is only an address
        assert_eq!(check(CType::pointer_to("CalcPtr")), Ok(Category::RawPointer));
        assert!(matches!(
            check(CType::new("LoopA")),
            Err(Error::UnknownType { .. })
        ));
    }

    #[test]
    fn test_array_decay() {
        assert_eq!(
            check(CType::new("char").with_array(16)),
            Ok(Category::StringPointer)
        );
        assert_eq!(
            check(CType::new("double").with_array(3)),
            Ok(Category::RawPointer)
        );
    }

    #[test]
    fn test_rule_order_with_primitive_named_structs() {
        // Structs named like primitives win over the primitive table, except for
        // `char*` which is always a string
        let declarations = Declarations {
            structs: vec![StructDecl::opaque("int32"), StructDecl::opaque("char")],
            ..Default::default()
        };
        let index = TypeIndex::new(&declarations);
        assert_eq!(
            classify(&CType::pointer_to("int32"), &index, "t"),
            Ok(Category::OpaqueHandle("int32".into()))
        );
        assert_eq!(
            classify(&CType::new("int32"), &index, "t"),
            Ok(Category::OpaqueHandle("int32".into()))
        );
        assert_eq!(
            classify(&CType::pointer_to("char"), &index, "t"),
            Ok(Category::StringPointer)
        );
    }
}
