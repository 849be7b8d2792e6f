//! Identifier derivation for emitted code.
//!
//! Type names and enum constants follow the capitalization rule: split the C name on
//! `_`, capitalize the first letter of every segment and lowercase the rest. Segments
//! that are a known acronym are upper-cased whole. Function wrappers use the lowered
//! form of the same segments.

use proc_macro2::Span;

/// Segments emitted fully upper-cased when a whole segment matches (case-insensitive)
pub const ACRONYMS: &[&str] = &[
    "id", "url", "api", "http", "json", "xml", "sql", "io", "ip", "tcp", "udp",
];

/// Names the generated modules define next to the `types` items, or use
/// unqualified where `types::*` is glob-imported
pub const RESERVED_TYPE_NAMES: &[&str] = &[
    "Function", "Functions", "Library", "LoadError", "LIBRARY_FILENAME", "Ok", "Err", "Some",
    "None", "Option", "Result",
];

/// Methods of `Functions` that are not wrappers
pub const RESERVED_WRAPPER_NAMES: &[&str] = &["load"];

/// Words which cannot be used as plain identifiers
const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final",
    "gen", "macro", "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Keywords that are not allowed as raw identifiers either
const NON_RAW_KEYWORDS: &[&str] = &["crate", "self", "Self", "super"];

fn segments(name: &str) -> impl Iterator<Item = &str> {
    name.split('_').filter(|segment| !segment.is_empty())
}

fn is_acronym(segment: &str) -> bool {
    ACRONYMS
        .iter()
        .any(|acronym| acronym.eq_ignore_ascii_case(segment))
}

/// Derive the type-level name of a C identifier: `calc_get_version` -> `CalcGetVersion`
pub fn to_target_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for segment in segments(name) {
        if is_acronym(segment) {
            result.push_str(&segment.to_uppercase());
            continue;
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            result.extend(first.to_uppercase());
            result.push_str(&chars.as_str().to_lowercase());
        }
    }
    result
}

/// Derive the lowered form of a C identifier: `Calc_GetVersion` -> `calc_getversion`
pub fn to_lowered_name(name: &str) -> String {
    segments(name)
        .map(|segment| segment.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Name of the prepared-signature slot that backs a function wrapper
pub fn accessor_name(name: &str) -> String {
    format!("{}_fn", to_lowered_name(name))
}

/// Build an identifier, escaping keywords and leading digits
pub fn ident(name: &str) -> syn::Ident {
    let span = Span::call_site();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return syn::Ident::new(&format!("_{name}"), span);
    }
    if NON_RAW_KEYWORDS.contains(&name) {
        return syn::Ident::new(&format!("{name}_"), span);
    }
    if RUST_KEYWORDS.contains(&name) {
        return syn::Ident::new_raw(name, span);
    }
    syn::Ident::new(name, span)
}

/// Name of a C parameter, falling back to `arg{index}` for unnamed parameters
pub fn value_name(name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("arg{index}")
    } else {
        name.to_string()
    }
}
