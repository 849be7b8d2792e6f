use std::path::{Path, PathBuf};

use log::info;

/// One generated module file
#[derive(Debug, Clone)]
pub struct Artifact {
    file_name: String,
    file: syn::File,
}

impl Artifact {
    pub(crate) fn new(file_name: impl Into<String>, file: syn::File) -> Self {
        Self {
            file_name: file_name.into(),
            file,
        }
    }

    /// File name inside the bindings directory, e.g. `types.rs`
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file(&self) -> &syn::File {
        &self.file
    }

    /// Formatted source text
    pub fn render(&self) -> String {
        prettyplease::unparse(&self.file)
    }

    /// Write the formatted source into `dir`, returning the written path
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> std::io::Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        std::fs::write(&path, self.render())?;
        info!("wrote {}", path.display());
        Ok(path)
    }
}

/// The complete artifact set of one conversion: `loader.rs`, `types.rs`,
/// `functions.rs` and `mod.rs`.
#[derive(Debug, Clone)]
pub struct Bindings {
    artifacts: Vec<Artifact>,
}

impl Bindings {
    pub(crate) fn new(artifacts: Vec<Artifact>) -> Self {
        Self { artifacts }
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn artifact(&self, file_name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.file_name == file_name)
    }

    /// `(file name, source)` pairs for callers that store the output themselves
    pub fn render(&self) -> Vec<(String, String)> {
        self.artifacts
            .iter()
            .map(|a| (a.file_name.clone(), a.render()))
            .collect()
    }

    /// Write every artifact into `dir`, creating it when missing. All sources are
    /// rendered before the first file is written.
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> std::io::Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let rendered = self.render();
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(rendered.len());
        for (file_name, source) in rendered {
            let path = dir.join(file_name);
            std::fs::write(&path, source)?;
            info!("wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}
