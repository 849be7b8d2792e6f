//! Function binding synthesis.
//!
//! For every C function two artifacts are produced:
//! - a [`Registration`]: the symbol and its libffi descriptors, result first, which
//!   `Functions::load` hands to `Function::prepare`;
//! - a [`Wrapper`]: a method on `Functions` that marshals Rust values into argument
//!   addresses, performs the raw call and converts the result back.
//!
//! How a value is passed and how a result is received is decided per category by
//! [`arg_policy`] and [`return_policy`].

use std::collections::HashSet;

use itertools::Itertools;
use log::debug;
use proc_macro2::TokenStream;
use quote::quote;

use crate::{
    codegen::{
        classify::{classify, Category, IntWidth},
        map_type::{map_type, ForeignType, Position, TargetType},
        naming,
        types::check_identifier,
        TypeIndex,
    },
    model::{Declarations, FunctionDecl, ParamDecl},
    Error, RustEdition,
};

/// How a parameter value reaches the raw call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgPolicy {
    /// Text is copied into a NUL-terminated buffer kept alive for the call; the
    /// argument is the address of a local holding the buffer address
    TextBuffer,
    /// The argument is the address of the struct value itself
    AddressOfValue,
    /// The argument is the address of a local holding the value
    AddressOfLocal,
}

/// Passing convention of each category
pub fn arg_policy(category: &Category) -> ArgPolicy {
    match category {
        Category::StringPointer => ArgPolicy::TextBuffer,
        Category::StructByValue(_) => ArgPolicy::AddressOfValue,
        _ => ArgPolicy::AddressOfLocal,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NarrowKind {
    Integer,
    /// Lowest 8 bits tested for non-zero
    Bool,
    /// Lowest 32 bits wrapped in the emitted enum type
    Enum(String),
}

/// Conversion of a word-sized result slot into a narrower value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Narrowing {
    pub width: IntWidth,
    pub signed: bool,
    pub kind: NarrowKind,
}

impl Narrowing {
    /// The value the emitted narrowing cast yields for a raw result word: the low
    /// `width` bits, sign-extended when signed
    pub fn apply(&self, word: u64) -> i64 {
        let bits = self.width.bits();
        if bits >= 64 {
            return word as i64;
        }
        let low = word & ((1u64 << bits) - 1);
        if self.signed {
            let shift = 64 - bits;
            ((low << shift) as i64) >> shift
        } else {
            low as i64
        }
    }

    fn to_tokens(&self, word: &syn::Ident, target: &TargetType) -> TokenStream {
        let int = TargetType::Int {
            width: self.width,
            signed: self.signed,
        }
        .to_tokens(Position::Return);
        match &self.kind {
            NarrowKind::Integer => quote! { #word as #int },
            NarrowKind::Bool => quote! { (#word as #int) != 0 },
            NarrowKind::Enum(_) => {
                let ty = target.to_tokens(Position::Return);
                quote! { #ty(#word as #int) }
            }
        }
    }
}

/// How a result is received from the raw call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnPolicy {
    /// Void: no result slot, the call gets a null result address
    None,
    /// Integers and booleans narrower than the target word go through a
    /// word-sized slot and are narrowed afterwards
    Widened(Narrowing),
    /// A C string address; null becomes the empty string
    Text,
    /// Received directly into a slot of the target type
    Direct,
}

/// Receiving convention of each category for a target whose `ffi_arg` is `word_bits` wide
pub fn return_policy(category: &Category, word_bits: u32) -> ReturnPolicy {
    match category {
        Category::Void => ReturnPolicy::None,
        Category::Bool if IntWidth::W8.bits() < word_bits => ReturnPolicy::Widened(Narrowing {
            width: IntWidth::W8,
            signed: false,
            kind: NarrowKind::Bool,
        }),
        Category::Integral { width, signed } if width.bits() < word_bits => {
            ReturnPolicy::Widened(Narrowing {
                width: *width,
                signed: *signed,
                kind: NarrowKind::Integer,
            })
        }
        Category::EnumValue(name) if IntWidth::W32.bits() < word_bits => {
            ReturnPolicy::Widened(Narrowing {
                width: IntWidth::W32,
                signed: true,
                kind: NarrowKind::Enum(naming::to_target_name(name)),
            })
        }
        Category::StringPointer => ReturnPolicy::Text,
        _ => ReturnPolicy::Direct,
    }
}

/// One entry of the raw call: result address first, then one per parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallArg {
    /// Null result address of a void function
    NoResult,
    /// Address of the result slot
    Result,
    Param { name: String, policy: ArgPolicy },
}

/// Symbol and descriptors handed to the dynamic-call layer's prepare step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub symbol: String,
    /// Field of `Functions` holding the prepared signature
    pub accessor: String,
    /// Result descriptor first, then one per parameter
    pub descriptors: Vec<ForeignType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperParam {
    pub name: String,
    pub category: Category,
    pub target: TargetType,
    pub policy: ArgPolicy,
    /// Locals holding the text buffer and its address for `TextBuffer` parameters
    text_locals: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wrapper {
    pub name: String,
    pub params: Vec<WrapperParam>,
    pub returns: TargetType,
    pub return_policy: ReturnPolicy,
    pub call_args: Vec<CallArg>,
    /// Set when any parameter is a native address the caller has to vouch for
    pub is_unsafe: bool,
    /// C prototype, used as the wrapper's documentation
    pub prototype: String,
    result_local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBinding {
    pub c_name: String,
    pub registration: Registration,
    pub wrapper: Wrapper,
}

/// Target properties the synthesizer depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisConfig {
    /// Width of libffi's `ffi_arg` result word on the target
    pub word_bits: u32,
    pub edition: RustEdition,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            word_bits: 64,
            edition: RustEdition::default(),
        }
    }
}

/// Allocates wrapper locals that do not shadow parameters or each other
struct Locals(HashSet<String>);

impl Locals {
    fn fresh(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        while self.0.contains(&name) {
            name.push('_');
        }
        self.0.insert(name.clone());
        name
    }
}

/// `f(void)` written as a single unnamed `void` parameter means no parameters
fn effective_params(f: &FunctionDecl) -> &[ParamDecl] {
    match f.params.as_slice() {
        [only] if only.ty.is_void() && only.name.is_empty() => &[],
        params => params,
    }
}

fn prototype(f: &FunctionDecl) -> String {
    let params = effective_params(f);
    let mut list = params
        .iter()
        .map(|p| {
            if p.name.is_empty() {
                p.ty.to_string()
            } else {
                format!("{} {}", p.ty, p.name)
            }
        })
        .collect::<Vec<_>>();
    if f.variadic {
        list.push("...".to_string());
    }
    let list = if list.is_empty() {
        "void".to_string()
    } else {
        list.join(", ")
    };
    format!("{} {}({})", f.returns, f.name, list)
}

/// Synthesize the registration and wrapper of one function
pub fn synthesize(
    f: &FunctionDecl,
    index: &TypeIndex,
    config: &SynthesisConfig,
) -> Result<FunctionBinding, Vec<Error>> {
    let decl = f.name.as_str();
    let mut errors = Vec::new();

    if let Err(e) = check_identifier(decl, decl, "function name") {
        return Err(vec![e]);
    }
    if f.variadic {
        errors.push(Error::unsupported(decl, "variadic function"));
    }

    let return_category = match classify(&f.returns, index, decl) {
        Ok(category) => Some(category),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let params = effective_params(f);
    let mut param_names = HashSet::new();
    let mut classified = Vec::with_capacity(params.len());
    for (i, p) in params.iter().enumerate() {
        if !p.name.is_empty() {
            if let Err(e) = check_identifier(decl, &p.name, "parameter") {
                errors.push(e);
                continue;
            }
        }
        let name = naming::value_name(&p.name, i);
        let emitted = naming::ident(&name).to_string();
        if !param_names.insert(emitted.clone()) {
            errors.push(Error::duplicate(decl, emitted));
            continue;
        }
        match classify(&p.ty, index, decl) {
            Ok(Category::Void) => {
                errors.push(Error::unsupported(decl, format!("void parameter `{name}`")))
            }
            Ok(category) => classified.push((name, category)),
            Err(e) => errors.push(e),
        }
    }

    let Some(return_category) = return_category.filter(|_| errors.is_empty()) else {
        return Err(errors);
    };

    let mut locals = Locals(param_names);
    let (returns, return_descriptor) = map_type(&return_category);
    let return_policy = return_policy(&return_category, config.word_bits);
    let result_local = locals.fresh("result");

    let mut descriptors = vec![return_descriptor];
    let mut call_args = vec![match return_policy {
        ReturnPolicy::None => CallArg::NoResult,
        _ => CallArg::Result,
    }];
    let mut wrapper_params = Vec::with_capacity(classified.len());
    for (name, category) in classified {
        let (target, descriptor) = map_type(&category);
        let policy = arg_policy(&category);
        let text_locals = (policy == ArgPolicy::TextBuffer).then(|| {
            (
                locals.fresh(&format!("{name}_cstr")),
                locals.fresh(&format!("{name}_ptr")),
            )
        });
        descriptors.push(descriptor);
        call_args.push(CallArg::Param {
            name: name.clone(),
            policy,
        });
        wrapper_params.push(WrapperParam {
            name,
            category,
            target,
            policy,
            text_locals,
        });
    }

    let wrapper_name = naming::to_lowered_name(decl);
    let is_unsafe = wrapper_params.iter().any(|p| p.category.is_address());
    debug!(
        "synthesized {decl}: {} parameters, result {:?}",
        wrapper_params.len(),
        return_policy
    );

    Ok(FunctionBinding {
        c_name: f.name.clone(),
        registration: Registration {
            symbol: f.name.clone(),
            accessor: naming::accessor_name(decl),
            descriptors,
        },
        wrapper: Wrapper {
            name: wrapper_name,
            params: wrapper_params,
            returns,
            return_policy,
            call_args,
            is_unsafe,
            prototype: prototype(f),
            result_local,
        },
    })
}

/// Synthesize every function of the model. A failing function does not stop the
/// others; its errors are returned next to the successful bindings.
pub fn synthesize_all(
    declarations: &Declarations,
    index: &TypeIndex,
    config: &SynthesisConfig,
) -> (Vec<FunctionBinding>, Vec<Error>) {
    let mut bindings = Vec::new();
    let mut errors = Vec::new();
    let mut taken = HashSet::new();

    for f in &declarations.functions {
        match synthesize(f, index, config) {
            Ok(binding) => {
                let name = binding.wrapper.name.as_str();
                if naming::RESERVED_WRAPPER_NAMES.contains(&name) {
                    debug!("`{}` would emit `{name}` which `Functions` defines itself", f.name);
                    errors.push(Error::duplicate(&f.name, name));
                } else if taken.insert(name.to_string()) {
                    bindings.push(binding);
                } else {
                    errors.push(Error::duplicate(&f.name, name));
                }
            }
            Err(errs) => errors.extend(errs),
        }
    }

    (bindings, errors)
}

fn address_of(local: &syn::Ident, edition: RustEdition) -> TokenStream {
    match edition {
        RustEdition::Edition2024 => quote! { (&raw mut #local).cast::<::core::ffi::c_void>() },
        RustEdition::Edition2021 => {
            quote! { ::core::ptr::addr_of_mut!(#local).cast::<::core::ffi::c_void>() }
        }
    }
}

impl FunctionBinding {
    /// `accessor: Function` field of the `Functions` table
    pub fn field_tokens(&self) -> TokenStream {
        let accessor = naming::ident(&self.registration.accessor);
        quote! { #accessor: Function }
    }

    /// Field initializer preparing the signature from the loaded library
    pub fn registration_tokens(&self) -> TokenStream {
        let accessor = naming::ident(&self.registration.accessor);
        let symbol = &self.registration.symbol;
        let (result, args) = self
            .registration
            .descriptors
            .split_first()
            .map(|(result, args)| (result.to_tokens(), args.iter().map(ForeignType::to_tokens).collect_vec()))
            .unwrap_or_else(|| (ForeignType::Void.to_tokens(), Vec::new()));
        quote! {
            #accessor: Function::prepare(library, #symbol, #result, ::std::vec![#(#args),*])?
        }
    }

    /// The wrapper method
    pub fn wrapper_tokens(&self, edition: RustEdition) -> TokenStream {
        let wrapper = &self.wrapper;
        let name = naming::ident(&wrapper.name);
        let accessor = naming::ident(&self.registration.accessor);
        let doc = format!(" `{}`", wrapper.prototype);

        let mut prelude = Vec::new();
        let mut inputs = Vec::new();
        for p in &wrapper.params {
            let ident = naming::ident(&p.name);
            let ty = p.target.to_tokens(Position::Param);
            match (p.policy, &p.text_locals) {
                (ArgPolicy::TextBuffer, Some((cstr, ptr))) => {
                    let cstr = naming::ident(cstr);
                    let ptr = naming::ident(ptr);
                    inputs.push(quote! { #ident: #ty });
                    prelude.push(quote! {
                        let #cstr = super::loader::text_arg(#ident);
                        let mut #ptr = #cstr.as_ptr();
                    });
                }
                _ => inputs.push(quote! { mut #ident: #ty }),
            }
        }

        let args = wrapper.call_args.iter().filter_map(|arg| {
            let CallArg::Param { name, policy } = arg else {
                return None;
            };
            let param = wrapper.params.iter().find(|p| &p.name == name)?;
            let ident = naming::ident(name);
            Some(match (policy, &param.text_locals) {
                (ArgPolicy::TextBuffer, Some((_, ptr))) => address_of(&naming::ident(ptr), edition),
                (ArgPolicy::AddressOfValue, _) => {
                    let ty = param.target.to_tokens(Position::Param);
                    quote! { (&mut #ident as *mut #ty).cast::<::core::ffi::c_void>() }
                }
                _ => address_of(&ident, edition),
            })
        });
        let args = quote! { &mut [#(#args),*] };

        let slot = naming::ident(&wrapper.result_local);
        let (output, body) = match &wrapper.return_policy {
            ReturnPolicy::None => (
                quote! {},
                quote! {
                    unsafe {
                        self.#accessor.call(::core::ptr::null_mut(), #args);
                    }
                },
            ),
            policy => {
                let returns = wrapper.returns.to_tokens(Position::Return);
                let slot_ty = match policy {
                    ReturnPolicy::Widened(_) => quote! { ::libffi::raw::ffi_arg },
                    ReturnPolicy::Text => quote! { *const ::core::ffi::c_char },
                    _ => returns.clone(),
                };
                let convert = match policy {
                    ReturnPolicy::Widened(narrowing) => narrowing.to_tokens(&slot, &wrapper.returns),
                    ReturnPolicy::Text => quote! {
                        if #slot.is_null() {
                            ::std::string::String::new()
                        } else {
                            unsafe { ::std::ffi::CStr::from_ptr(#slot) }
                                .to_string_lossy()
                                .into_owned()
                        }
                    },
                    _ => quote! { #slot },
                };
                (
                    quote! { -> #returns },
                    quote! {
                        let mut #slot = ::core::mem::MaybeUninit::<#slot_ty>::uninit();
                        let #slot = unsafe {
                            self.#accessor.call(#slot.as_mut_ptr().cast::<::core::ffi::c_void>(), #args);
                            #slot.assume_init()
                        };
                        #convert
                    },
                )
            }
        };

        let safety = if wrapper.is_unsafe {
            quote! {
                ///
                /// # Safety
                ///
                /// Address arguments must be valid for the native function.
            }
        } else {
            quote! {}
        };
        let unsafety = wrapper.is_unsafe.then(|| quote! { unsafe });

        quote! {
            #[doc = #doc]
            #safety
            pub #unsafety fn #name(&self, #(#inputs),*) #output {
                #(#prelude)*
                #body
            }
        }
    }
}

/// The `functions` artifact: the `Functions` table, its loader and every wrapper
pub fn functions_tokens(bindings: &[FunctionBinding], edition: RustEdition) -> TokenStream {
    let fields = bindings.iter().map(FunctionBinding::field_tokens);
    let registrations = bindings.iter().map(FunctionBinding::registration_tokens);
    let wrappers = bindings.iter().map(|b| b.wrapper_tokens(edition));
    quote! {
        #![doc = " Native function table and call wrappers. Generated by dynbindgen."]
        #![allow(unused_unsafe)]

        #[allow(unused_imports)]
        use super::loader::{Function, LoadError};
        #[allow(unused_imports)]
        use super::types::*;

        /// Prepared signatures of every bound native function.
        pub struct Functions {
            #(#fields,)*
        }

        impl Functions {
            /// Resolve and prepare every function of `library`.
            pub fn load(library: &::libloading::Library) -> ::core::result::Result<Self, LoadError> {
                let _ = library;
                ::core::result::Result::Ok(Self {
                    #(#registrations,)*
                })
            }

            #(#wrappers)*
        }
    }
}
