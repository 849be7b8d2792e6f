use log::{debug, warn};
use proc_macro2::TokenStream;
use quote::quote;
use roxygen::roxygen;

use crate::{
    api::{
        bindings::{Artifact, Bindings},
        config::{Config, ConfigError},
    },
    codegen::{
        functions::{functions_tokens, synthesize_all, FunctionBinding, SynthesisConfig},
        loader::loader_tokens,
        types::{emit_types, TypeDefinition},
        TypeIndex,
    },
    model::Declarations,
    Error, ErrorList, RustEdition, TargetTriple,
};

pub const LOADER_FILE: &str = "loader.rs";
pub const TYPES_FILE: &str = "types.rs";
pub const FUNCTIONS_FILE: &str = "functions.rs";
pub const MODULE_FILE: &str = "mod.rs";

/// Builder for configuring a [`Generator`]
#[derive(Debug, Clone)]
pub struct Builder {
    pub(crate) library_name: String,
    pub(crate) target: TargetTriple,
    pub(crate) edition: RustEdition,
}

impl Builder {
    /// Create a builder for the native library `library_name` (`calc` for `libcalc.so`)
    pub fn new(library_name: impl Into<String>) -> Self {
        Self {
            library_name: library_name.into(),
            target: TargetTriple::host(),
            edition: RustEdition::default(),
        }
    }

    /// Apply the settings present in a configuration file
    pub fn from_config(library_name: impl Into<String>, config: &Config) -> Result<Self, ConfigError> {
        let mut builder = Self::new(library_name);
        if let Some(name) = &config.library_name {
            builder.library_name = name.clone();
        }
        if let Some(target) = &config.target {
            builder.target = TargetTriple::parse(target).map_err(ConfigError::Target)?;
        }
        if let Some(edition) = config.edition {
            builder.edition = edition;
        }
        Ok(builder)
    }

    /// Set the library base name used for the platform file name constants
    #[roxygen]
    pub fn library_name<S: Into<String>>(
        mut self,
        /// Library name without `lib` prefix or platform suffix
        library_name: S,
    ) -> Self {
        self.library_name = library_name.into();
        self
    }

    /// Set the target the bindings will run on
    ///
    /// The target's pointer width is the word width of libffi's result slot, which
    /// decides which integer results are received widened and narrowed afterwards.
    ///
    /// Default is the host.
    ///
    /// # Example
    ///
    /// ```
    /// let target = dynbindgen::TargetTriple::parse("i686-unknown-linux-gnu").unwrap();
    /// let generator = dynbindgen::Builder::new("calc").target(target).build();
    /// ```
    #[roxygen]
    pub fn target(
        mut self,
        /// Target triple of the consuming crate
        target: TargetTriple,
    ) -> Self {
        self.target = target;
        self
    }

    /// Set the Rust edition of the crate the bindings are written into
    ///
    /// - For edition 2024: argument addresses are taken with `&raw mut`
    /// - For edition 2021: with `core::ptr::addr_of_mut!`
    #[roxygen]
    pub fn edition(
        mut self,
        /// The edition of the consuming crate
        edition: RustEdition,
    ) -> Self {
        self.edition = edition;
        self
    }

    pub fn build(self) -> Generator {
        Generator { builder: self }
    }
}

/// Turns a declaration model into the binding artifacts
#[derive(Debug, Clone)]
pub struct Generator {
    builder: Builder,
}

fn to_file(unit: &str, tokens: TokenStream) -> Result<syn::File, Error> {
    syn::parse2(tokens).map_err(|e| Error::InvalidOutput {
        unit: unit.to_string(),
        message: e.to_string(),
    })
}

fn report(errors: impl Into<ErrorList>) -> ErrorList {
    let errors = errors.into();
    for e in errors.iter() {
        warn!("{e}");
    }
    errors
}

impl Generator {
    pub fn library_name(&self) -> &str {
        &self.builder.library_name
    }

    pub fn target(&self) -> &TargetTriple {
        &self.builder.target
    }

    pub fn edition(&self) -> RustEdition {
        self.builder.edition
    }

    pub fn synthesis_config(&self) -> SynthesisConfig {
        SynthesisConfig {
            word_bits: self.builder.target.pointer_bits(),
            edition: self.builder.edition,
        }
    }

    fn type_index<'a>(&self, declarations: &'a Declarations) -> TypeIndex<'a> {
        TypeIndex::new(declarations).with_data_model(self.builder.target.data_model())
    }

    /// Emit the type definitions of the model, with the errors of the ones that failed
    pub fn emit_types(&self, declarations: &Declarations) -> (Vec<TypeDefinition>, Vec<Error>) {
        let index = self.type_index(declarations);
        emit_types(declarations, &index)
    }

    /// Synthesize the function bindings of the model, with the errors of the ones that failed
    pub fn synthesize(&self, declarations: &Declarations) -> (Vec<FunctionBinding>, Vec<Error>) {
        let index = self.type_index(declarations);
        synthesize_all(declarations, &index, &self.synthesis_config())
    }

    /// The `loader.rs` unit. It depends only on the library name.
    pub fn generate_loader(&self) -> Result<Artifact, ErrorList> {
        let file = to_file(LOADER_FILE, loader_tokens(&self.builder.library_name))
            .map_err(|e| report(vec![e]))?;
        Ok(Artifact::new(LOADER_FILE, file))
    }

    /// The `types.rs` unit
    pub fn generate_types(&self, declarations: &Declarations) -> Result<Artifact, ErrorList> {
        let (definitions, errors) = self.emit_types(declarations);
        if !errors.is_empty() {
            return Err(report(errors));
        }
        self.types_artifact(&definitions).map_err(|e| report(vec![e]))
    }

    /// The `functions.rs` unit. Type errors fail it as well, since the wrappers
    /// refer to the emitted types.
    pub fn generate_functions(&self, declarations: &Declarations) -> Result<Artifact, ErrorList> {
        let (_, type_errors) = self.emit_types(declarations);
        let (bindings, function_errors) = self.synthesize(declarations);
        let mut errors = ErrorList::from(type_errors);
        errors.extend(function_errors);
        if !errors.is_empty() {
            return Err(report(errors));
        }
        self.functions_artifact(&bindings).map_err(|e| report(vec![e]))
    }

    /// The `mod.rs` unit tying the other three together
    pub fn generate_module(&self) -> Result<Artifact, ErrorList> {
        let doc = format!(
            " Bindings to the native `{}` library. Generated by dynbindgen.",
            self.builder.library_name
        );
        let tokens = quote! {
            #![doc = #doc]

            pub mod functions;
            pub mod loader;
            pub mod types;

            pub use functions::Functions;
            pub use loader::{Function, Library, LoadError, LIBRARY_FILENAME};
            pub use types::*;
        };
        let file = to_file(MODULE_FILE, tokens).map_err(|e| report(vec![e]))?;
        Ok(Artifact::new(MODULE_FILE, file))
    }

    /// Generate the complete artifact set. Errors of every declaration are
    /// accumulated; when any is found no artifact is produced.
    pub fn generate(&self, declarations: &Declarations) -> Result<Bindings, ErrorList> {
        let (definitions, type_errors) = self.emit_types(declarations);
        let (bindings, function_errors) = self.synthesize(declarations);
        let mut errors = ErrorList::from(type_errors);
        errors.extend(function_errors);
        if !errors.is_empty() {
            return Err(report(errors));
        }
        debug!(
            "generating {} types and {} functions for {}",
            definitions.len(),
            bindings.len(),
            self.builder.library_name
        );

        let types = self.types_artifact(&definitions);
        let functions = self.functions_artifact(&bindings);
        let (types, functions) = match (types, functions) {
            (Ok(types), Ok(functions)) => (types, functions),
            (types, functions) => {
                return Err(report(
                    [types.err(), functions.err()].into_iter().flatten().collect::<Vec<_>>(),
                ))
            }
        };
        Ok(Bindings::new(vec![
            self.generate_loader()?,
            types,
            functions,
            self.generate_module()?,
        ]))
    }

    fn types_artifact(&self, definitions: &[TypeDefinition]) -> Result<Artifact, Error> {
        let definitions = definitions.iter().map(TypeDefinition::to_tokens);
        let tokens = quote! {
            #![doc = " Native types. Generated by dynbindgen."]
            #![allow(dead_code)]

            #(#definitions)*
        };
        Ok(Artifact::new(TYPES_FILE, to_file(TYPES_FILE, tokens)?))
    }

    fn functions_artifact(&self, bindings: &[FunctionBinding]) -> Result<Artifact, Error> {
        let tokens = functions_tokens(bindings, self.builder.edition);
        Ok(Artifact::new(FUNCTIONS_FILE, to_file(FUNCTIONS_FILE, tokens)?))
    }
}
