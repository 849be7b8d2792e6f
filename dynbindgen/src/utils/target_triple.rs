use target_lexicon::{OperatingSystem, PointerWidth, Triple};

use crate::codegen::classify::{DataModel, IntWidth};

/// Thin wrapper around `target_lexicon::Triple` answering the questions the
/// generator asks about the machine the bindings will run on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetTriple(Triple);

impl TargetTriple {
    /// Parse from a string like "aarch64-apple-darwin".
    pub fn parse(s: &str) -> Result<Self, String> {
        s.parse::<Triple>()
            .map(TargetTriple)
            .map_err(|e| format!("Failed to parse target triple '{s}': {e}"))
    }

    /// The triple the generator itself was built for.
    pub fn host() -> Self {
        Self(Triple::host())
    }

    /// Operating system as spelled by Rust's `target_os` cfg. Darwin maps to "macos".
    pub fn os(&self) -> String {
        match self.0.operating_system {
            OperatingSystem::Darwin(_) | OperatingSystem::MacOSX(_) => "macos".to_string(),
            ref os => os.to_string(),
        }
    }

    /// Width of a native address in bits. Unknown architectures are taken as 64-bit.
    pub fn pointer_bits(&self) -> u32 {
        match self.0.pointer_width() {
            Ok(PointerWidth::U16) => 16,
            Ok(PointerWidth::U32) => 32,
            Ok(PointerWidth::U64) | Err(_) => 64,
        }
    }

    /// Integer widths of the target's C ABI: `long` is 32-bit on Windows and on
    /// every 32-bit target.
    pub fn data_model(&self) -> DataModel {
        match (self.pointer_bits(), &self.0.operating_system) {
            (64, OperatingSystem::Windows) => DataModel::LLP64,
            (64, _) => DataModel::LP64,
            (16, _) => DataModel {
                pointer: IntWidth::W16,
                ..DataModel::ILP32
            },
            _ => DataModel::ILP32,
        }
    }

    /// File name the dynamic loader expects for library `name` on this target:
    /// `lib{name}.so` on Linux and FreeBSD, `lib{name}.dylib` on macOS,
    /// `{name}.dll` on Windows, `lib{name}.so` elsewhere.
    pub fn library_filename(&self, name: &str) -> String {
        crate::codegen::loader::library_filename(name, &self.os())
    }
}

impl Default for TargetTriple {
    fn default() -> Self {
        Self::host()
    }
}

impl std::fmt::Display for TargetTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TargetTriple {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetTriple::parse(s)
    }
}
