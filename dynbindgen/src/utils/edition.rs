/// Rust edition of the crate the bindings are written into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RustEdition {
    /// Rust 2021 edition, addresses taken with `addr_of_mut!`
    #[serde(rename = "2021")]
    Edition2021,
    /// Rust 2024 edition, addresses taken with `&raw mut`
    #[serde(rename = "2024")]
    Edition2024,
}

impl RustEdition {
    pub fn as_str(&self) -> &'static str {
        match self {
            RustEdition::Edition2021 => "2021",
            RustEdition::Edition2024 => "2024",
        }
    }
}

impl std::fmt::Display for RustEdition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RustEdition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2021" => Ok(RustEdition::Edition2021),
            "2024" => Ok(RustEdition::Edition2024),
            other => Err(format!("unsupported Rust edition '{other}', expected 2021 or 2024")),
        }
    }
}

impl Default for RustEdition {
    /// `&raw mut` is stable since 1.82
    fn default() -> Self {
        if_rust_version::if_rust_version! { >= 1.82 {
            RustEdition::Edition2024
        } else {
            RustEdition::Edition2021
        }}
    }
}
