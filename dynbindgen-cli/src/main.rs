use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use dynbindgen::{header, jsonl, Builder, Config, Declarations, RustEdition, TargetTriple};
use log::info;

const USAGE: &str = "dynbindgen

Usage:
  dynbindgen help
  dynbindgen generate --header <file> --output <dir> [options]
  dynbindgen dump --header <file.h> --output <file.jsonl>

Commands:
  help                 Show this help.
  generate             Write loader.rs, types.rs, functions.rs and mod.rs into <dir>.
  dump                 Parse a header and store its declaration model as JSON lines.

Options for generate:
  --header <file>      C header, or a .jsonl declaration model written by `dump`.
  --output <dir>       Directory receiving the module files (created when missing).
  --lib <name>         Native library name without prefix or suffix.
                       Defaults to the header file stem.
  --config <file>      TOML file with library_name, target and edition.
  --target <triple>    Target the bindings run on. Defaults to the host.
  --edition <year>     Edition of the consuming crate: 2021 or 2024.

Command line options override the configuration file.
Set RUST_LOG=debug for details.
";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = real_main() {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn real_main() -> Result<()> {
    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() || matches!(args[0].as_str(), "help" | "-h" | "--help") {
        println!("{}", USAGE);
        return Ok(());
    }

    match args.remove(0).as_str() {
        "generate" => generate(&Options::parse(&args)?),
        "dump" => dump(&Options::parse(&args)?),
        other => bail!("unknown command: {}\n\n{}", other, USAGE),
    }
}

#[derive(Debug, Default)]
struct Options {
    header: Option<PathBuf>,
    output: Option<PathBuf>,
    lib: Option<String>,
    config: Option<PathBuf>,
    target: Option<String>,
    edition: Option<String>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = Options::default();
        let mut args = args.iter();
        while let Some(flag) = args.next() {
            let mut value = || {
                args.next()
                    .cloned()
                    .ok_or_else(|| anyhow!("{} requires a value", flag))
            };
            match flag.as_str() {
                "--header" => options.header = Some(value()?.into()),
                "--output" => options.output = Some(value()?.into()),
                "--lib" => options.lib = Some(value()?),
                "--config" => options.config = Some(value()?.into()),
                "--target" => options.target = Some(value()?),
                "--edition" => options.edition = Some(value()?),
                other => bail!("unknown option: {}\n\n{}", other, USAGE),
            }
        }
        Ok(options)
    }

    fn header(&self) -> Result<&Path> {
        self.header
            .as_deref()
            .ok_or_else(|| anyhow!("--header <file> is required"))
    }

    fn output(&self) -> Result<&Path> {
        self.output
            .as_deref()
            .ok_or_else(|| anyhow!("--output is required"))
    }

    /// `--lib`, or the stem of the header file
    fn library_name(&self) -> Result<String> {
        if let Some(lib) = &self.lib {
            return Ok(lib.clone());
        }
        let header = self.header()?;
        header
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("cannot derive a library name from {}", header.display()))
    }

    fn builder(&self) -> Result<Builder> {
        let mut builder = match &self.config {
            Some(path) => {
                let config = Config::from_file(path)?;
                Builder::from_config(self.library_name()?, &config)
                    .with_context(|| format!("applying {}", path.display()))?
            }
            None => Builder::new(self.library_name()?),
        };
        if let Some(lib) = &self.lib {
            builder = builder.library_name(lib.as_str());
        }
        if let Some(target) = &self.target {
            let target = TargetTriple::parse(target).map_err(|e| anyhow!("--target: {}", e))?;
            builder = builder.target(target);
        }
        if let Some(edition) = &self.edition {
            let edition = edition
                .parse::<RustEdition>()
                .map_err(|e| anyhow!("--edition: {}", e))?;
            builder = builder.edition(edition);
        }
        Ok(builder)
    }
}

fn is_jsonl(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
}

fn read_declarations(path: &Path) -> Result<Declarations> {
    let declarations = if is_jsonl(path) {
        jsonl::read_jsonl_file(path)?
    } else {
        header::parse_file(path)?
    };
    info!(
        "{}: {} structs, {} enums, {} functions, {} typedefs",
        path.display(),
        declarations.structs.len(),
        declarations.enums.len(),
        declarations.functions.len(),
        declarations.typedefs.len()
    );
    Ok(declarations)
}

fn generate(options: &Options) -> Result<()> {
    let declarations = read_declarations(options.header()?)?;
    let output = options.output()?;
    let generator = options.builder()?.build();
    let bindings = generator
        .generate(&declarations)
        .with_context(|| format!("generating bindings for {}", generator.library_name()))?;
    bindings
        .write_to_dir(output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Generated bindings for '{}' ({}) in: {}",
        generator.library_name(),
        generator.target(),
        output.display()
    );
    Ok(())
}

fn dump(options: &Options) -> Result<()> {
    let header = options.header()?;
    if is_jsonl(header) {
        bail!("dump expects a C header, got {}", header.display());
    }
    let declarations = read_declarations(header)?;
    let output = options.output()?;
    jsonl::write_jsonl_file(output, &declarations)?;
    println!("Wrote declaration model to: {}", output.display());
    Ok(())
}
