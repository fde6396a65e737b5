//! wasm-transformer CLI
//!
//! Commands:
//!   wasm-transformer lower-i64 <wasm> [-o <out>]  - Lower i64 imports behind trampolines
//!   wasm-transformer inspect <wasm>               - List sections, signatures and imports

mod logging;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use wasm_transformer::reader::{ImportDescriptor, ModuleReader, ModuleSection};
use wasm_transformer::{FuncSignature, I64Transformer, InputStream, IoOutputWriter, ValueType};

#[derive(Parser)]
#[command(name = "wasm-transformer")]
#[command(about = "Binary-to-binary WebAssembly transforms", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import i64-bearing functions with i32 signatures and call them through trampolines
    LowerI64 {
        /// Path to the WASM file
        wasm_file: PathBuf,

        /// Where to write the result (defaults to <name>.lowered.wasm)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Display the sections of a WASM module
    Inspect {
        /// Path to the WASM file
        wasm_file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    logging::set_up_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::LowerI64 { wasm_file, output } => {
            let output = output.unwrap_or_else(|| default_output_path(&wasm_file));
            lower_i64_command(&wasm_file, &output)
        }
        Commands::Inspect { wasm_file, json } => inspect_command(&wasm_file, json),
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());
    input.with_file_name(format!("{stem}.lowered.wasm"))
}

fn lower_i64_command(wasm_file: &Path, output: &Path) -> anyhow::Result<()> {
    let wasm_bytes = std::fs::read(wasm_file)
        .with_context(|| format!("Failed to read {}", wasm_file.display()))?;

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = IoOutputWriter::new(BufWriter::new(file));
    I64Transformer::new()
        .transform(&mut InputStream::new(&wasm_bytes), &mut writer)
        .with_context(|| format!("Failed to transform {}", wasm_file.display()))?;

    let mut file = writer.into_inner();
    std::io::Write::flush(&mut file)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!(input = %wasm_file.display(), output = %output.display(), "lowered i64 imports");
    Ok(())
}

/// Everything `inspect` reports about one section.
struct SectionSummary {
    kind: String,
    signatures: Vec<FuncSignature>,
    imports: Vec<(String, String, String)>,
    function_types: Vec<u32>,
    element_functions: Vec<u32>,
    raw_size: Option<usize>,
}

impl SectionSummary {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            signatures: Vec::new(),
            imports: Vec::new(),
            function_types: Vec::new(),
            element_functions: Vec::new(),
            raw_size: None,
        }
    }
}

fn inspect_command(wasm_file: &Path, json: bool) -> anyhow::Result<()> {
    let wasm_bytes = std::fs::read(wasm_file)
        .with_context(|| format!("Failed to read {}", wasm_file.display()))?;

    let mut reader = ModuleReader::new(&wasm_bytes);
    reader
        .read_header()
        .map_err(|e| anyhow::anyhow!("Failed to parse WASM: {}", e))?;

    let mut sections = Vec::new();
    while let Some(section) = reader.read_section()? {
        let kind = format!("{:?}", section.section_type()).to_lowercase();
        let mut summary = SectionSummary::new(&kind);
        match section {
            ModuleSection::Type(types) => {
                for signature in types {
                    summary.signatures.push(signature?);
                }
            }
            ModuleSection::Import(imports) => {
                for import in imports {
                    let import = import?;
                    let descriptor = match import.descriptor {
                        ImportDescriptor::Function { type_index } => format!("func type {type_index}"),
                        ImportDescriptor::Table(_) => "table".to_string(),
                        ImportDescriptor::Memory(_) => "memory".to_string(),
                        ImportDescriptor::Global(_) => "global".to_string(),
                    };
                    summary.imports.push((import.module, import.field, descriptor));
                }
            }
            ModuleSection::Function(functions) => {
                for type_index in functions {
                    summary.function_types.push(type_index?);
                }
            }
            ModuleSection::Element(segments) => {
                for segment in segments {
                    summary.element_functions.extend(segment?.function_indices);
                }
            }
            ModuleSection::Raw { content, .. } => summary.raw_size = Some(content.len()),
        }
        sections.push(summary);
    }

    if json {
        print_json(&sections)
    } else {
        print_sections(&sections);
        Ok(())
    }
}

fn print_sections(sections: &[SectionSummary]) {
    for section in sections {
        match section.raw_size {
            Some(size) => println!("{}: {} bytes", section.kind, size),
            None => println!("{}:", section.kind),
        }
        for (index, signature) in section.signatures.iter().enumerate() {
            let marker = if signature.has_i64 { " (i64)" } else { "" };
            println!("  {}: {}{}", index, format_signature(signature), marker);
        }
        for (module, field, descriptor) in &section.imports {
            println!("  {}.{}: {}", module, field, descriptor);
        }
        for (index, type_index) in section.function_types.iter().enumerate() {
            println!("  func {}: type {}", index, type_index);
        }
        if !section.element_functions.is_empty() {
            println!("  functions: {:?}", section.element_functions);
        }
    }
}

fn format_signature(signature: &FuncSignature) -> String {
    let join = |types: &[ValueType]| {
        types
            .iter()
            .map(format_value_type)
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("({}) -> ({})", join(&signature.params), join(&signature.results))
}

fn format_value_type(ty: &ValueType) -> &'static str {
    match ty {
        ValueType::I32 => "i32",
        ValueType::I64 => "i64",
        ValueType::F32 => "f32",
        ValueType::F64 => "f64",
    }
}

fn print_json(sections: &[SectionSummary]) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "sections": sections.iter().map(section_to_json).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn section_to_json(section: &SectionSummary) -> serde_json::Value {
    serde_json::json!({
        "kind": section.kind,
        "size": section.raw_size,
        "signatures": section.signatures.iter().map(|s| serde_json::json!({
            "params": s.params.iter().map(format_value_type).collect::<Vec<_>>(),
            "results": s.results.iter().map(format_value_type).collect::<Vec<_>>(),
            "has_i64": s.has_i64,
        })).collect::<Vec<_>>(),
        "imports": section.imports.iter().map(|(module, field, descriptor)| serde_json::json!({
            "module": module,
            "field": field,
            "kind": descriptor,
        })).collect::<Vec<_>>(),
        "functions": section.function_types,
        "element_functions": section.element_functions,
    })
}
