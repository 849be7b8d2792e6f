//! The declaration model consumed by the generator.
//!
//! The model is produced by a header front end (see [`crate::header`]) or read from
//! a JSON-lines file (see [`crate::read_jsonl_file`]) and is never mutated by the
//! code generator.

use serde::{Deserialize, Serialize};

/// A C type as written in a declaration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CType {
    /// Base type name: a primitive (`int`, `uint8_t`, ...) or a user type name
    pub name: String,
    /// True for a single level of indirection (`T*`)
    #[serde(default)]
    pub pointer: bool,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub unsigned: bool,
    /// Array dimensions, outermost first; empty for non-array types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array: Vec<usize>,
}

impl CType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn pointer_to(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pointer: true,
            ..Default::default()
        }
    }

    pub fn with_const(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn with_unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn with_array(mut self, len: usize) -> Self {
        self.array.push(len);
        self
    }

    pub fn is_void(&self) -> bool {
        self.name == "void" && !self.pointer && self.array.is_empty()
    }
}

impl std::fmt::Display for CType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_const {
            write!(f, "const ")?;
        }
        if self.unsigned {
            write!(f, "unsigned ")?;
        }
        write!(f, "{}", self.name)?;
        if self.pointer {
            write!(f, "*")?;
        }
        for len in &self.array {
            write!(f, "[{len}]")?;
        }
        Ok(())
    }
}

/// A named field of a struct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: CType,
    /// Width of a bitfield member (`int flag : 1`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_width: Option<u32>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: CType) -> Self {
        Self {
            name: name.into(),
            ty,
            bit_width: None,
        }
    }
}

/// A struct declaration. Field order is the native memory layout order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    /// Opaque structs only exist behind an address-sized handle
    #[serde(default)]
    pub opaque: bool,
}

impl StructDecl {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        Self {
            name: name.into(),
            fields,
            opaque: false,
        }
    }

    pub fn opaque(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            opaque: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    /// Explicit value; members without one continue from the previous member
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}

impl EnumMember {
    pub fn new(name: impl Into<String>, value: Option<i64>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<EnumMember>,
}

impl EnumDecl {
    pub fn new(name: impl Into<String>, members: Vec<EnumMember>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    /// Resolve member values: an unset value is the previous value plus one,
    /// or zero for the first member.
    pub fn resolved_values(&self) -> Vec<(&str, i64)> {
        let mut next = 0i64;
        self.members
            .iter()
            .map(|member| {
                let value = member.value.unwrap_or(next);
                next = value.wrapping_add(1);
                (member.name.as_str(), value)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    /// Parameter name; may be empty for unnamed prototype parameters
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: CType,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, ty: CType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub returns: CType,
    /// `f(void)` and `f()` both have an empty parameter list
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub variadic: bool,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, returns: CType, params: Vec<ParamDecl>) -> Self {
        Self {
            name: name.into(),
            returns,
            params,
            variadic: false,
        }
    }
}

/// `typedef <target> <name>;` for anything that is not a struct or enum body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedefDecl {
    pub name: String,
    pub target: CType,
}

impl TypedefDecl {
    pub fn new(name: impl Into<String>, target: CType) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

/// One declaration record, as stored in a JSON-lines model file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Declaration {
    Struct(StructDecl),
    Enum(EnumDecl),
    Function(FunctionDecl),
    Typedef(TypedefDecl),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Struct(s) => &s.name,
            Declaration::Enum(e) => &e.name,
            Declaration::Function(f) => &f.name,
            Declaration::Typedef(t) => &t.name,
        }
    }
}

/// The full declaration model of one native library
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Declarations {
    #[serde(default)]
    pub structs: Vec<StructDecl>,
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    #[serde(default)]
    pub typedefs: Vec<TypedefDecl>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
            && self.enums.is_empty()
            && self.functions.is_empty()
            && self.typedefs.is_empty()
    }

    /// Flatten into declaration records: structs, enums, typedefs, then functions
    pub fn to_records(&self) -> Vec<Declaration> {
        self.structs
            .iter()
            .cloned()
            .map(Declaration::Struct)
            .chain(self.enums.iter().cloned().map(Declaration::Enum))
            .chain(self.typedefs.iter().cloned().map(Declaration::Typedef))
            .chain(self.functions.iter().cloned().map(Declaration::Function))
            .collect()
    }
}

impl FromIterator<Declaration> for Declarations {
    fn from_iter<T: IntoIterator<Item = Declaration>>(iter: T) -> Self {
        let mut declarations = Declarations::new();
        for declaration in iter {
            match declaration {
                Declaration::Struct(s) => declarations.structs.push(s),
                Declaration::Enum(e) => declarations.enums.push(e),
                Declaration::Function(f) => declarations.functions.push(f),
                Declaration::Typedef(t) => declarations.typedefs.push(t),
            }
        }
        declarations
    }
}
