//! The `loader` artifact: library lookup, symbol resolution and the raw call.

use proc_macro2::TokenStream;
use quote::quote;

/// `target_os` values with their library prefix and suffix
const PLATFORMS: &[(&[&str], &str, &str)] = &[
    (&["linux", "freebsd"], "lib", ".so"),
    (&["macos"], "lib", ".dylib"),
    (&["windows"], "", ".dll"),
];

const DEFAULT_PLATFORM: (&str, &str) = ("lib", ".so");

/// File name of library `name` on the operating system `os` (as spelled by `target_os`)
pub fn library_filename(name: &str, os: &str) -> String {
    let (prefix, suffix) = PLATFORMS
        .iter()
        .find(|(systems, _, _)| systems.contains(&os))
        .map(|(_, prefix, suffix)| (*prefix, *suffix))
        .unwrap_or(DEFAULT_PLATFORM);
    format!("{prefix}{name}{suffix}")
}

/// `LIBRARY_FILENAME` constants, one per platform arm plus the fallback
fn filename_consts(library_name: &str) -> TokenStream {
    let arms = PLATFORMS.iter().map(|(systems, _, _)| {
        let filename = library_filename(library_name, systems[0]);
        let systems = systems.iter();
        quote! {
            #[cfg(any(#(target_os = #systems),*))]
            pub const LIBRARY_FILENAME: &str = #filename;
        }
    });
    let known = PLATFORMS.iter().flat_map(|(systems, _, _)| systems.iter());
    let fallback = format!("{}{library_name}{}", DEFAULT_PLATFORM.0, DEFAULT_PLATFORM.1);
    quote! {
        #(#arms)*
        #[cfg(not(any(#(target_os = #known),*)))]
        pub const LIBRARY_FILENAME: &str = #fallback;
    }
}

pub fn loader_tokens(library_name: &str) -> TokenStream {
    let filename_consts = filename_consts(library_name);
    quote! {
        #![doc = " Library loading and the dynamic-call layer. Generated by dynbindgen."]

        use super::functions::Functions;

        #filename_consts

        /// Failure to open the library or resolve one of its symbols.
        #[derive(Debug)]
        pub enum LoadError {
            Open {
                path: ::std::path::PathBuf,
                source: ::libloading::Error,
            },
            Symbol {
                symbol: &'static str,
                source: ::libloading::Error,
            },
        }

        impl ::core::fmt::Display for LoadError {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                match self {
                    LoadError::Open { path, source } => {
                        write!(f, "failed to open {}: {}", path.display(), source)
                    }
                    LoadError::Symbol { symbol, source } => {
                        write!(f, "failed to resolve symbol `{}`: {}", symbol, source)
                    }
                }
            }
        }

        impl ::std::error::Error for LoadError {
            fn source(&self) -> ::core::option::Option<&(dyn ::std::error::Error + 'static)> {
                match self {
                    LoadError::Open { source, .. } | LoadError::Symbol { source, .. } => {
                        ::core::option::Option::Some(source)
                    }
                }
            }
        }

        /// A resolved native function with its prepared call interface.
        pub struct Function {
            cif: ::libffi::middle::Cif,
            code: ::libffi::middle::CodePtr,
        }

        impl Function {
            /// Resolve `symbol` and prepare its call interface from the result and
            /// argument descriptors.
            pub fn prepare(
                library: &::libloading::Library,
                symbol: &'static str,
                result: ::libffi::middle::Type,
                args: ::std::vec::Vec<::libffi::middle::Type>,
            ) -> ::core::result::Result<Self, LoadError> {
                let code = unsafe { library.get::<unsafe extern "C" fn()>(symbol.as_bytes()) }
                    .map_err(|source| LoadError::Symbol { symbol, source })?;
                Ok(Self {
                    cif: ::libffi::middle::Cif::new(args, result),
                    code: ::libffi::middle::CodePtr::from_fun(*code),
                })
            }

            /// Perform the call.
            ///
            /// # Safety
            ///
            /// `result` must be null for a void function and otherwise point to a slot
            /// large enough for the result; `args` must hold one valid address per
            /// parameter, each pointing to a value of the described type.
            pub unsafe fn call(
                &self,
                result: *mut ::core::ffi::c_void,
                args: &mut [*mut ::core::ffi::c_void],
            ) {
                unsafe {
                    ::libffi::raw::ffi_call(
                        self.cif.as_raw_ptr(),
                        ::core::option::Option::Some(*self.code.as_fun()),
                        result,
                        args.as_mut_ptr(),
                    );
                }
            }
        }

        /// NUL-terminated copy of a text argument. Text after an embedded NUL is dropped.
        pub fn text_arg(text: &str) -> ::std::ffi::CString {
            let end = text.find('\0').unwrap_or(text.len());
            ::std::ffi::CString::new(&text[..end]).unwrap_or_default()
        }

        /// The opened native library together with its prepared function table.
        pub struct Library {
            functions: Functions,
            _library: ::libloading::Library,
        }

        impl Library {
            /// Open `LIBRARY_FILENAME` inside `dir`.
            pub fn load(dir: impl AsRef<::std::path::Path>) -> ::core::result::Result<Self, LoadError> {
                Self::open(dir.as_ref().join(LIBRARY_FILENAME))
            }

            /// Open the library at `path` and prepare every function.
            pub fn open(path: impl AsRef<::std::path::Path>) -> ::core::result::Result<Self, LoadError> {
                let path = path.as_ref();
                let library = unsafe { ::libloading::Library::new(path) }.map_err(|source| {
                    LoadError::Open {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                let functions = Functions::load(&library)?;
                Ok(Self {
                    functions,
                    _library: library,
                })
            }

            pub fn functions(&self) -> &Functions {
                &self.functions
            }
        }

        impl ::core::ops::Deref for Library {
            type Target = Functions;

            fn deref(&self) -> &Functions {
                &self.functions
            }
        }
    }
}
