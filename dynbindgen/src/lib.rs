//! # dynbindgen
//!
//! Generates Rust bindings that call into a C library at runtime through
//! [libffi](https://docs.rs/libffi) and [libloading](https://docs.rs/libloading),
//! so the consuming crate needs no C compiler and no link-time dependency on
//! the library.
//!
//! ## Pipeline
//!
//! 1. A declaration model ([`Declarations`]) is read from a header with
//!    [`header::parse`] or from a JSON-lines file with [`jsonl::read_jsonl_file`].
//! 2. Every C type is classified ([`classify`]) and mapped to a Rust type and
//!    a libffi descriptor ([`map_type`]).
//! 3. Structs and enums become `#[repr(C)]` records, handle newtypes and enum
//!    newtypes; functions become a signature registration plus a wrapper method.
//! 4. The result is a set of four module files ([`Bindings`]):
//!    `loader.rs`, `types.rs`, `functions.rs` and `mod.rs`.
//!
//! ## Usage example
//!
//! ```rust,no_run
//! let declarations = dynbindgen::header::parse_file("include/calc.h").unwrap();
//! let bindings = dynbindgen::Builder::new("calc")
//!     .build()
//!     .generate(&declarations)
//!     .unwrap();
//! bindings.write_to_dir("src/calc").unwrap();
//! ```
//!
//! The consuming crate depends on `libffi` and `libloading` and reaches the
//! native functions through the `Library` context object:
//!
//! ```rust,ignore
//! mod calc;
//!
//! let lib = calc::Library::load("/opt/calc/lib")?;
//! let handle = lib.calc_new();
//! let sum = lib.calc_add(handle, 1.5, 2.0);
//! ```

pub(crate) mod api;
pub(crate) mod codegen;
pub(crate) mod error;
pub mod header;
pub mod model;
pub(crate) mod utils;

pub use crate::api::bindings::{Artifact, Bindings};
pub use crate::api::builder::{
    Builder, Generator, FUNCTIONS_FILE, LOADER_FILE, MODULE_FILE, TYPES_FILE,
};
pub use crate::api::config::{Config, ConfigError};
pub use crate::codegen::classify::{classify, Category, DataModel, FloatWidth, IntWidth};
pub use crate::codegen::map_type::{map_type, ForeignType, Position, TargetType};
pub use crate::codegen::TypeIndex;
pub use crate::error::{Error, ErrorList};
pub use crate::model::Declarations;
pub use crate::utils::edition::RustEdition;
pub use crate::utils::target_triple::TargetTriple;

/// Identifier derivation shared by every emitted item
pub mod naming {
    pub use crate::codegen::naming::{
        accessor_name, ident, to_lowered_name, to_target_name, value_name, ACRONYMS,
        RESERVED_TYPE_NAMES, RESERVED_WRAPPER_NAMES,
    };
}

/// Record, handle and enum emission
pub mod types {
    pub use crate::codegen::types::{
        emit_types, enum_constants, record_layout, RecordField, RecordLayout, TypeDefinition,
    };
}

/// Function binding synthesis: registrations, wrappers and marshaling policies
pub mod functions {
    pub use crate::codegen::functions::{
        arg_policy, functions_tokens, return_policy, synthesize, synthesize_all, ArgPolicy,
        CallArg, FunctionBinding, NarrowKind, Narrowing, Registration, ReturnPolicy,
        SynthesisConfig, Wrapper, WrapperParam,
    };
}

/// The `loader` unit
pub mod loader {
    pub use crate::codegen::loader::{library_filename, loader_tokens};
}

/// JSON-lines storage of declaration models
pub mod jsonl {
    pub use crate::utils::jsonl::{read_jsonl_file, write_jsonl_file, JsonlError};
}
