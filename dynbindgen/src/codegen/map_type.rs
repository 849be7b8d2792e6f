//! Mapping of binding categories to Rust types and libffi type descriptors.

use proc_macro2::TokenStream;
use quote::quote;

use crate::codegen::{
    classify::{Category, FloatWidth, IntWidth},
    naming,
};

/// Where a target type is used; text and addresses render differently per position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Param,
    Return,
    Field,
}

/// A Rust type in the emitted bindings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetType {
    /// No value (void return)
    Unit,
    Bool,
    Int { width: IntWidth, signed: bool },
    Float(FloatWidth),
    /// `&str` parameter, `String` result, `*const c_char` record field
    Text,
    /// Nominal address-sized handle emitted for one opaque struct
    Handle(String),
    /// Untyped native address
    Address,
    Record(String),
    Enum(String),
    Array(Box<TargetType>, usize),
}

impl TargetType {
    pub fn to_tokens(&self, position: Position) -> TokenStream {
        match self {
            TargetType::Unit => quote! { () },
            TargetType::Bool => quote! { bool },
            TargetType::Int { width, signed } => {
                let ident = naming::ident(&format!(
                    "{}{}",
                    if *signed { "i" } else { "u" },
                    width.bits()
                ));
                quote! { #ident }
            }
            TargetType::Float(FloatWidth::F32) => quote! { f32 },
            TargetType::Float(FloatWidth::F64) => quote! { f64 },
            TargetType::Text => match position {
                Position::Param => quote! { &str },
                Position::Return => quote! { ::std::string::String },
                Position::Field => quote! { *const ::core::ffi::c_char },
            },
            TargetType::Handle(name) | TargetType::Record(name) | TargetType::Enum(name) => {
                let ident = naming::ident(name);
                quote! { #ident }
            }
            TargetType::Address => quote! { *mut ::core::ffi::c_void },
            TargetType::Array(element, len) => {
                let element = element.to_tokens(position);
                quote! { [#element; #len] }
            }
        }
    }
}

/// A libffi type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ForeignType {
    Void,
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    U64,
    S64,
    F32,
    F64,
    Pointer,
    /// Aggregate descriptor of an emitted record, by record name
    Struct(String),
    /// Fixed-length array inside a record, described as a nested aggregate
    Array(Box<ForeignType>, usize),
}

impl ForeignType {
    fn integer(width: IntWidth, signed: bool) -> Self {
        match (width, signed) {
            (IntWidth::W8, true) => ForeignType::S8,
            (IntWidth::W8, false) => ForeignType::U8,
            (IntWidth::W16, true) => ForeignType::S16,
            (IntWidth::W16, false) => ForeignType::U16,
            (IntWidth::W32, true) => ForeignType::S32,
            (IntWidth::W32, false) => ForeignType::U32,
            (IntWidth::W64, true) => ForeignType::S64,
            (IntWidth::W64, false) => ForeignType::U64,
        }
    }

    /// Expression constructing this descriptor as a `libffi::middle::Type`
    pub fn to_tokens(&self) -> TokenStream {
        let constructor = match self {
            ForeignType::Struct(name) => {
                let ident = naming::ident(name);
                return quote! { #ident::ffi_type() };
            }
            ForeignType::Array(element, len) => {
                let element = element.to_tokens();
                return quote! { ::libffi::middle::Type::structure(::std::vec![#element; #len]) };
            }
            ForeignType::Void => "void",
            ForeignType::U8 => "u8",
            ForeignType::S8 => "i8",
            ForeignType::U16 => "u16",
            ForeignType::S16 => "i16",
            ForeignType::U32 => "u32",
            ForeignType::S32 => "i32",
            ForeignType::U64 => "u64",
            ForeignType::S64 => "i64",
            ForeignType::F32 => "f32",
            ForeignType::F64 => "f64",
            ForeignType::Pointer => "pointer",
        };
        let constructor = naming::ident(constructor);
        quote! { ::libffi::middle::Type::#constructor() }
    }
}

/// Map a category to its Rust type and libffi descriptor. User type names are
/// emitted under their capitalized target name.
pub fn map_type(category: &Category) -> (TargetType, ForeignType) {
    match category {
        Category::Void => (TargetType::Unit, ForeignType::Void),
        Category::Bool => (TargetType::Bool, ForeignType::U8),
        Category::Integral { width, signed } => (
            TargetType::Int {
                width: *width,
                signed: *signed,
            },
            ForeignType::integer(*width, *signed),
        ),
        Category::Float(FloatWidth::F32) => (TargetType::Float(FloatWidth::F32), ForeignType::F32),
        Category::Float(FloatWidth::F64) => (TargetType::Float(FloatWidth::F64), ForeignType::F64),
        Category::StringPointer => (TargetType::Text, ForeignType::Pointer),
        Category::OpaqueHandle(name) => (
            TargetType::Handle(naming::to_target_name(name)),
            ForeignType::Pointer,
        ),
        Category::StructPointer(_) | Category::RawPointer => {
            (TargetType::Address, ForeignType::Pointer)
        }
        Category::StructByValue(name) => {
            let name = naming::to_target_name(name);
            (TargetType::Record(name.clone()), ForeignType::Struct(name))
        }
        Category::EnumValue(name) => (
            TargetType::Enum(naming::to_target_name(name)),
            ForeignType::S32,
        ),
    }
}
