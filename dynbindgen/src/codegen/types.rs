//! Emission of records, opaque handles and enums.
//!
//! Every record gets an `ffi_type()` aggregate descriptor whose elements follow the
//! declared field order, one element per field.

use std::collections::{HashMap, HashSet};

use log::debug;
use proc_macro2::TokenStream;
use quote::quote;

use crate::{
    codegen::{
        classify::{classify, classify_element, Category},
        map_type::{map_type, ForeignType, Position, TargetType},
        naming, TypeIndex,
    },
    model::{Declarations, EnumDecl, FieldDecl, StructDecl},
    Error,
};

/// A record field: emitted name and type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordField {
    pub name: String,
    pub target: TargetType,
}

/// Layout of one emitted record: its fields and the elements of its aggregate
/// descriptor, index-aligned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    pub c_name: String,
    pub name: String,
    pub fields: Vec<RecordField>,
    pub elements: Vec<ForeignType>,
}

/// One emitted type definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDefinition {
    Handle {
        c_name: String,
        name: String,
    },
    Record(RecordLayout),
    Enum {
        c_name: String,
        name: String,
        /// Emitted constant names with their resolved values
        constants: Vec<(String, i32)>,
    },
}

impl TypeDefinition {
    pub fn name(&self) -> &str {
        match self {
            TypeDefinition::Handle { name, .. } | TypeDefinition::Enum { name, .. } => name,
            TypeDefinition::Record(layout) => &layout.name,
        }
    }

    pub fn to_tokens(&self) -> TokenStream {
        match self {
            TypeDefinition::Handle { c_name, name } => handle_tokens(c_name, name),
            TypeDefinition::Record(layout) => record_tokens(layout),
            TypeDefinition::Enum {
                c_name,
                name,
                constants,
            } => enum_tokens(c_name, name, constants),
        }
    }
}

fn handle_tokens(c_name: &str, name: &str) -> TokenStream {
    let ident = naming::ident(name);
    let doc = format!(" Handle to a native `{c_name}`.");
    quote! {
        #[doc = #doc]
        #[repr(transparent)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct #ident(pub *mut ::core::ffi::c_void);

        impl #ident {
            pub const fn null() -> Self {
                Self(::core::ptr::null_mut())
            }

            pub fn is_null(&self) -> bool {
                self.0.is_null()
            }
        }
    }
}

fn record_tokens(layout: &RecordLayout) -> TokenStream {
    let ident = naming::ident(&layout.name);
    let doc = format!(" Native `{}`.", layout.c_name);
    let fields = layout.fields.iter().map(|field| {
        let name = naming::ident(&field.name);
        let ty = field.target.to_tokens(Position::Field);
        quote! { pub #name: #ty }
    });
    let elements = layout.elements.iter().map(ForeignType::to_tokens);
    quote! {
        #[doc = #doc]
        #[repr(C)]
        #[derive(Clone, Copy, Debug, PartialEq)]
        pub struct #ident {
            #(#fields,)*
        }

        impl #ident {
            /// libffi descriptor of this record, elements in field order.
            pub fn ffi_type() -> ::libffi::middle::Type {
                ::libffi::middle::Type::structure(::std::vec![#(#elements),*])
            }
        }
    }
}

fn enum_tokens(c_name: &str, name: &str, constants: &[(String, i32)]) -> TokenStream {
    let ident = naming::ident(name);
    let doc = format!(" Native enum `{c_name}`.");
    let constants = constants.iter().map(|(constant, value)| {
        let constant = naming::ident(constant);
        let magnitude = proc_macro2::Literal::u32_unsuffixed(value.unsigned_abs());
        let value = if *value < 0 {
            quote! { -#magnitude }
        } else {
            quote! { #magnitude }
        };
        quote! { pub const #constant: #ident = #ident(#value); }
    });
    quote! {
        #[doc = #doc]
        #[repr(transparent)]
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        pub struct #ident(pub i32);

        #[allow(non_upper_case_globals)]
        impl #ident {
            #(#constants)*
        }
    }
}

/// Check that a declared name can become a Rust identifier
pub(crate) fn check_identifier(decl: &str, name: &str, what: &str) -> Result<(), Error> {
    let valid = !name.is_empty()
        && name != "_"
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::unsupported(decl, format!("{what} `{name}` is not an identifier")))
    }
}

/// Resolve the emitted type and descriptor of one record field
fn field_layout(
    s: &StructDecl,
    field: &FieldDecl,
    index: &TypeIndex,
) -> Result<(TargetType, ForeignType), Error> {
    if let Some(width) = field.bit_width {
        return Err(Error::unsupported(
            &s.name,
            format!("bitfield `{}: {width}`", field.name),
        ));
    }
    let (category, len) = match field.ty.array.as_slice() {
        [] => (classify(&field.ty, index, &s.name)?, None),
        [len] => (classify_element(&field.ty, index, &s.name)?, Some(*len)),
        _ => {
            return Err(Error::unsupported(
                &s.name,
                format!("multi-dimensional array field `{}`", field.name),
            ))
        }
    };
    if category.is_void() {
        return Err(Error::unsupported(
            &s.name,
            format!("void field `{}`", field.name),
        ));
    }
    if category == Category::StructByValue(s.name.clone()) {
        return Err(Error::unsupported(
            &s.name,
            format!("field `{}` contains its own struct", field.name),
        ));
    }
    let (target, foreign) = map_type(&category);
    Ok(match len {
        Some(len) => (
            TargetType::Array(Box::new(target), len),
            ForeignType::Array(Box::new(foreign), len),
        ),
        None => (target, foreign),
    })
}

/// Build the layout of a non-opaque struct
pub fn record_layout(s: &StructDecl, index: &TypeIndex) -> Result<RecordLayout, Vec<Error>> {
    let mut errors = Vec::new();
    let mut fields = Vec::with_capacity(s.fields.len());
    let mut elements = Vec::with_capacity(s.fields.len());
    let mut seen = HashSet::new();

    if s.fields.is_empty() {
        errors.push(Error::unsupported(&s.name, "struct without fields"));
    }
    for field in &s.fields {
        if let Err(e) = check_identifier(&s.name, &field.name, "field") {
            errors.push(e);
            continue;
        }
        let emitted = naming::ident(&field.name).to_string();
        if !seen.insert(emitted.clone()) {
            errors.push(Error::duplicate(&s.name, emitted));
            continue;
        }
        match field_layout(s, field, index) {
            Ok((target, foreign)) => {
                fields.push(RecordField {
                    name: field.name.clone(),
                    target,
                });
                elements.push(foreign);
            }
            Err(e) => errors.push(e),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    if fields.len() != elements.len() {
        return Err(vec![Error::AmbiguousStructLayout {
            decl: s.name.clone(),
            fields: fields.len(),
            elements: elements.len(),
        }]);
    }
    Ok(RecordLayout {
        c_name: s.name.clone(),
        name: naming::to_target_name(&s.name),
        fields,
        elements,
    })
}

/// Resolve enum constants, rejecting emitted-name collisions and values outside `i32`
pub fn enum_constants(e: &EnumDecl) -> Result<Vec<(String, i32)>, Vec<Error>> {
    let mut errors = Vec::new();
    let mut constants = Vec::with_capacity(e.members.len());
    let mut seen = HashSet::new();

    for (member, value) in e.resolved_values() {
        if let Err(err) = check_identifier(&e.name, member, "enum member") {
            errors.push(err);
            continue;
        }
        let name = naming::to_target_name(member);
        if name.is_empty() {
            errors.push(Error::unsupported(
                &e.name,
                format!("enum member `{member}` has no name characters"),
            ));
            continue;
        }
        if !seen.insert(name.clone()) {
            errors.push(Error::duplicate(&e.name, name));
            continue;
        }
        match i32::try_from(value) {
            Ok(value) => constants.push((name, value)),
            Err(_) => errors.push(Error::unsupported(
                &e.name,
                format!("value {value} of `{member}` does not fit in 32 bits"),
            )),
        }
    }

    if errors.is_empty() {
        Ok(constants)
    } else {
        Err(errors)
    }
}

/// Emit every struct and enum of the model. Definitions that fail are left out and
/// their errors returned alongside the ones that succeeded.
pub fn emit_types(
    declarations: &Declarations,
    index: &TypeIndex,
) -> (Vec<TypeDefinition>, Vec<Error>) {
    let mut definitions = Vec::new();
    let mut errors = Vec::new();
    // Emitted type name -> C name of the declaration that claimed it
    let mut claimed: HashMap<String, String> = HashMap::new();

    let mut claim = |c_name: &str, errors: &mut Vec<Error>| -> Option<String> {
        if let Err(e) = check_identifier(c_name, c_name, "type name") {
            errors.push(e);
            return None;
        }
        let name = naming::to_target_name(c_name);
        if name.is_empty() {
            errors.push(Error::unsupported(c_name, "type name has no name characters"));
            return None;
        }
        if naming::RESERVED_TYPE_NAMES.contains(&name.as_str()) {
            debug!("`{c_name}` emits `{name}` which the generated modules define or use themselves");
            errors.push(Error::duplicate(c_name, name));
            return None;
        }
        if let Some(previous) = claimed.get(&name) {
            debug!("`{c_name}` emits `{name}` which is already taken by `{previous}`");
            errors.push(Error::duplicate(c_name, name));
            return None;
        }
        claimed.insert(name.clone(), c_name.to_string());
        Some(name)
    };

    for s in &declarations.structs {
        let Some(name) = claim(&s.name, &mut errors) else {
            continue;
        };
        if s.opaque {
            debug!("emitting opaque handle {name}");
            definitions.push(TypeDefinition::Handle {
                c_name: s.name.clone(),
                name,
            });
            continue;
        }
        match record_layout(s, index) {
            Ok(layout) => {
                debug!("emitting record {name} with {} fields", layout.fields.len());
                definitions.push(TypeDefinition::Record(layout));
            }
            Err(e) => errors.extend(e),
        }
    }

    for e in &declarations.enums {
        let Some(name) = claim(&e.name, &mut errors) else {
            continue;
        };
        match enum_constants(e) {
            Ok(constants) => {
                debug!("emitting enum {name} with {} constants", constants.len());
                definitions.push(TypeDefinition::Enum {
                    c_name: e.name.clone(),
                    name,
                    constants,
                });
            }
            Err(errs) => errors.extend(errs),
        }
    }

    (definitions, errors)
}
