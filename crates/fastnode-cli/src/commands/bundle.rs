//! `howth bundle` command implementation.
//!
//! Drives [`fastnode_core::linker`] end to end: reads the entry file's
//! source as a single opaque part (this binary doesn't parse or resolve
//! imports — that's a parser/resolver concern outside the linker crate)
//! and runs it through scan, tree-shaking, chunking, renaming, printing
//! and finalization.

use fastnode_core::linker::model::{File, FileRepr, Graph, Part, PartStmt};
use fastnode_core::linker::{Linker, LinkerInput, MinifyFlags, OutputFormat, Options};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// Bundle command action.
#[derive(Debug, Clone)]
pub struct BundleAction {
    /// Entry point file.
    pub entry: PathBuf,
    /// Working directory.
    pub cwd: PathBuf,
    /// Output file (if None, prints to stdout).
    pub outfile: Option<PathBuf>,
    /// Output format.
    pub format: OutputFormat,
    /// Minify output (whitespace + identifiers).
    pub minify: bool,
    /// Generate source maps.
    pub sourcemap: bool,
    /// Enable tree shaking (dead code elimination).
    pub treeshake: bool,
    /// Enable code splitting for dynamic imports.
    pub splitting: bool,
    /// Banner text to prepend.
    pub banner: Option<String>,
}

/// JSON output for bundle command.
#[derive(Serialize)]
struct BundleResultJson {
    ok: bool,
    entry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    outfile: Option<String>,
    format: String,
    outputs: Vec<String>,
    size_bytes: usize,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the bundle command.
pub fn run(action: BundleAction, json: bool) -> Result<()> {
    let start = Instant::now();

    let entry_path = if action.entry.is_absolute() {
        action.entry.clone()
    } else {
        action.cwd.join(&action.entry)
    };
    let source = std::fs::read_to_string(&entry_path).into_diagnostic()?;

    let mut graph = Graph::new();
    let pretty_path = action.entry.display().to_string();
    let entry = graph.add_file(File::new(pretty_path.clone(), FileRepr::Js));
    graph.file_mut(entry).is_entry_point = true;
    graph.file_mut(entry).side_effects_free = false;
    graph.file_mut(entry).parts.push(Part {
        stmts: vec![PartStmt::Opaque(source)],
        can_be_removed_if_unused: false,
        is_live: true,
        ..Default::default()
    });

    let entry_name = action
        .entry
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "bundle".to_string());

    let options = Options {
        output_format: action.format,
        code_splitting: action.splitting,
        tree_shaking: action.treeshake,
        minify: MinifyFlags {
            whitespace: action.minify,
            syntax: action.minify,
            identifiers: action.minify,
        },
        source_map: if action.sourcemap {
            fastnode_core::linker::SourceMapMode::Linked
        } else {
            fastnode_core::linker::SourceMapMode::None
        },
        banner: action.banner.clone(),
        abs_output_dir: action
            .outfile
            .as_ref()
            .and_then(|p| p.parent())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string()),
        ..Default::default()
    };

    let input = LinkerInput {
        graph,
        entry_points: vec![entry],
        entry_output_names: vec![entry_name],
        unique_key_prefix: "hwb".to_string(),
    };

    let linker = Linker::new(options);
    let link_result = linker.link(input);

    let duration_ms = start.elapsed().as_millis() as u64;

    match link_result {
        Ok(output) => {
            let size_bytes: usize = output.files.iter().map(|f| f.contents.len()).sum();

            if let Some(ref outdir) = action.outfile {
                for file in &output.files {
                    let path = PathBuf::from(&file.abs_path);
                    let final_path = if path.is_absolute() {
                        path
                    } else {
                        outdir
                            .parent()
                            .unwrap_or(std::path::Path::new("."))
                            .join(path.file_name().unwrap_or_default())
                    };
                    if let Some(parent) = final_path.parent() {
                        if !parent.exists() {
                            std::fs::create_dir_all(parent).into_diagnostic()?;
                        }
                    }
                    std::fs::write(&final_path, &file.contents).into_diagnostic()?;
                }
            }

            for msg in output.log.messages() {
                eprintln!("  warning: {}", msg.text);
            }

            if json {
                let json_result = BundleResultJson {
                    ok: true,
                    entry: pretty_path,
                    outfile: action.outfile.as_ref().map(|p| p.display().to_string()),
                    format: format!("{:?}", action.format).to_lowercase(),
                    outputs: output.files.iter().map(|f| f.abs_path.clone()).collect(),
                    size_bytes,
                    duration_ms,
                    error: None,
                };
                println!("{}", serde_json::to_string(&json_result).unwrap());
            } else if action.outfile.is_some() {
                let size_kb = size_bytes as f64 / 1024.0;
                println!(
                    "  {} -> {} files ({:.1}KB, {}ms)",
                    pretty_path,
                    output.files.len(),
                    size_kb,
                    duration_ms
                );
                for file in &output.files {
                    println!("    + {}", file.abs_path);
                }
            } else {
                for file in &output.files {
                    print!("{}", file.contents);
                }
            }

            Ok(())
        }
        Err(e) => {
            if json {
                let json_result = BundleResultJson {
                    ok: false,
                    entry: pretty_path,
                    outfile: action.outfile.as_ref().map(|p| p.display().to_string()),
                    format: format!("{:?}", action.format).to_lowercase(),
                    outputs: Vec::new(),
                    size_bytes: 0,
                    duration_ms,
                    error: Some(e.to_string()),
                };
                println!("{}", serde_json::to_string(&json_result).unwrap());
            } else {
                eprintln!("error: {e}");
            }
            std::process::exit(1);
        }
    }
}

/// Parse format string to `OutputFormat`.
#[must_use]
pub fn parse_format(s: &str) -> Option<OutputFormat> {
    match s.to_lowercase().as_str() {
        "esm" | "es" | "module" => Some(OutputFormat::Esm),
        "cjs" | "commonjs" => Some(OutputFormat::Cjs),
        "iife" => Some(OutputFormat::Iife),
        "preserve" => Some(OutputFormat::Preserve),
        _ => None,
    }
}
