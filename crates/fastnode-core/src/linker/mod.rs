//! Linker: turns a scanned module graph into final, chunked output files.
//!
//! Pipeline: [`scan`] -> [`treeshake`] -> [`chunks`] -> [`cross_chunk`] ->
//! [`rename`] -> [`print_js`]/[`print_css`] -> [`sourcemap`] ->
//! [`finalize`]. Each stage is its own module so it can be tested and
//! reasoned about independently; this file only wires them together.

pub mod chunks;
pub mod cross_chunk;
pub mod error;
pub mod finalize;
pub mod model;
pub mod print_css;
pub mod print_js;
pub mod rename;
pub mod runtime;
pub mod scan;
pub mod sourcemap;
pub mod treeshake;

use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use chunks::ChunkIndex;
use error::{Log, LinkError, LinkResult};
use finalize::{HashMode, LegalCommentsMode};
use model::{FileRepr, Graph, SourceIndex};
use rename::RenameMode;

/// Module-bundling output format for the top-level wrapper around a
/// chunk's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Leave whatever import/export syntax the input used.
    Preserve,
    Iife,
    Cjs,
    Esm,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Preserve
    }
}

/// Which platform interop rules (primarily node-specific CJS annotations)
/// apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Browser,
    Node,
    Neutral,
}

impl Default for Platform {
    fn default() -> Self {
        Self::Browser
    }
}

/// How much of the pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Emit input files unchanged, one-to-one.
    PassThrough,
    /// Rewrite import/export syntax without bundling.
    ConvertFormat,
    /// Full bundling: tree-shake, chunk, link, print.
    Bundle,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Bundle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceMapMode {
    None,
    Linked,
    Inline,
    External,
    InlineAndExternal,
    ExternalWithoutComment,
}

impl Default for SourceMapMode {
    fn default() -> Self {
        Self::None
    }
}

/// Minification sub-flags; esbuild treats these independently rather
/// than as one on/off switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinifyFlags {
    pub whitespace: bool,
    pub syntax: bool,
    pub identifiers: bool,
}

/// Configuration for one linker run. Matches esbuild's documented
/// defaults: `Preserve` format, `Browser` platform, tree-shaking on,
/// code splitting off, no source map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    pub output_format: OutputFormat,
    pub platform: Platform,
    pub mode: Mode,
    pub code_splitting: bool,
    pub tree_shaking: bool,
    pub minify: MinifyFlags,
    pub source_map: SourceMapMode,
    pub legal_comments: LegalCommentsMode,
    pub public_path: String,
    pub entry_names: String,
    pub chunk_names: String,
    pub asset_names: String,
    pub global_name: Option<String>,
    pub banner: Option<String>,
    pub footer: Option<String>,
    pub iife_wrapper: bool,
    pub unsupported_js_features: u64,
    pub profiler_names: bool,
    pub abs_output_dir: String,
    pub abs_output_file: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            platform: Platform::default(),
            mode: Mode::default(),
            code_splitting: false,
            tree_shaking: true,
            minify: MinifyFlags::default(),
            source_map: SourceMapMode::default(),
            legal_comments: LegalCommentsMode::Eof,
            public_path: String::new(),
            entry_names: "[name]".to_string(),
            chunk_names: "chunks/[name]-[hash]".to_string(),
            asset_names: "assets/[name]-[hash]".to_string(),
            global_name: None,
            banner: None,
            footer: None,
            iife_wrapper: false,
            unsupported_js_features: 0,
            profiler_names: false,
            abs_output_dir: ".".to_string(),
            abs_output_file: None,
        }
    }
}

impl Options {
    #[must_use]
    pub fn rename_mode(&self) -> RenameMode {
        if self.minify.identifiers {
            RenameMode::Minify
        } else {
            RenameMode::Number
        }
    }
}

/// What the linker needs in order to run: an already-scanned-but-not-yet
/// stabilized graph (see [`scan`]), which files are entry points, and
/// each entry's requested output path.
pub struct LinkerInput {
    pub graph: Graph,
    pub entry_points: Vec<SourceIndex>,
    pub entry_output_names: Vec<String>,
    /// Process-run-unique prefix for this run's unique keys (see
    /// [`chunks::plan`]).
    pub unique_key_prefix: String,
}

#[derive(Debug, Clone)]
pub struct OutputFile {
    pub abs_path: String,
    pub contents: String,
    pub json_metadata_chunk: Option<String>,
    pub is_executable: bool,
}

pub struct LinkOutput {
    pub files: Vec<OutputFile>,
    pub log: Log,
    pub metafile: Option<String>,
}

pub struct Linker {
    options: Options,
}

impl Linker {
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    pub fn link(self, mut input: LinkerInput) -> LinkResult<LinkOutput> {
        let options = &self.options;
        let mut log = Log::new();

        debug!(files = input.graph.files.len(), "scan: starting");
        scan::run(&mut input.graph, options, &mut log);
        if log.has_errors() {
            return Err(LinkError::HadErrors {
                count: log.messages().iter().filter(|m| m.kind == error::MsgKind::Error).count(),
            });
        }

        debug!("treeshake: starting");
        if options.tree_shaking {
            treeshake::run(&mut input.graph, &input.entry_points);
        } else {
            mark_everything_live(&mut input.graph, &input.entry_points);
        }

        debug!("chunks: planning");
        let mut chunk_graph = chunks::plan(&input.graph, &input.entry_points, &input.unique_key_prefix);

        debug!(chunks = chunk_graph.chunks.len(), "cross_chunk: binding");
        cross_chunk::run(&mut input.graph, &mut chunk_graph)?;

        debug!("rename: assigning final symbol names");
        let renamer = rename::run(&input.graph, &chunk_graph, options.rename_mode());

        let mut printed_js: HashMap<ChunkIndex, print_js::PrintedChunk> = HashMap::default();
        let mut printed_css: HashMap<ChunkIndex, String> = HashMap::default();

        for i in 0..chunk_graph.chunks.len() as ChunkIndex {
            let chunk = chunk_graph.chunk(i);
            match chunk.repr {
                FileRepr::Js => {
                    let mut p = print_js::print(&input.graph, &chunk_graph, chunk, &renamer, options);
                    if runtime::is_needed_by(&p.code) {
                        let shift = runtime::RUNTIME_SOURCE.lines().count() as u32 + 1;
                        p.code = format!("{}\n{}", runtime::RUNTIME_SOURCE, p.code);
                        p.line_starts = p.line_starts.into_iter().map(|(line, src)| (line + shift, src)).collect();
                    }
                    printed_js.insert(i, p);
                }
                FileRepr::Css => {
                    let p = print_css::print(&input.graph, chunk, options)
                        .map_err(|e| LinkError::Css(e.to_string()))?;
                    printed_css.insert(i, p.code);
                }
                FileRepr::Copy => {}
            }
        }

        let hash_mode = if options.code_splitting {
            HashMode::Transitive
        } else {
            HashMode::Isolated
        };

        let mut raw_code: HashMap<ChunkIndex, String> = HashMap::default();
        for (i, p) in &printed_js {
            raw_code.insert(*i, p.code.clone());
        }
        for (i, code) in &printed_css {
            raw_code.insert(*i, code.clone());
        }

        let hashes = finalize::hash_chunks(&chunk_graph, &raw_code, hash_mode);

        let mut final_paths: HashMap<ChunkIndex, String> = HashMap::default();
        for i in 0..chunk_graph.chunks.len() as ChunkIndex {
            let chunk = chunk_graph.chunk(i);
            let hash = hashes.get(&i).cloned().unwrap_or_default();
            let path = output_path(options, &input, chunk, i, &hash);
            final_paths.insert(i, path);
        }

        let mut files = Vec::new();
        let mut output_sizes: HashMap<ChunkIndex, u64> = HashMap::default();

        for i in 0..chunk_graph.chunks.len() as ChunkIndex {
            let Some(code) = raw_code.get(&i) else { continue };
            let substituted = finalize::substitute_unique_keys(code, &chunk_graph, &final_paths);
            let (body, legal) = finalize::extract_legal_comments(&substituted, options.legal_comments);
            let path = final_paths[&i].clone();

            output_sizes.insert(i, body.len() as u64);

            if let Some(legal_text) = legal {
                if options.legal_comments == LegalCommentsMode::External {
                    files.push(OutputFile {
                        abs_path: format!("{path}.LEGAL.txt"),
                        contents: legal_text,
                        json_metadata_chunk: None,
                        is_executable: false,
                    });
                }
            }

            let mut contents = body;
            if options.source_map != SourceMapMode::None {
                if let Some(printed) = printed_js.get(&i) {
                    let map = sourcemap::build(&input.graph, printed, &path);
                    match options.source_map {
                        SourceMapMode::Inline | SourceMapMode::InlineAndExternal => {
                            let encoded = base64_encode(map.json.as_bytes());
                            contents.push_str(&format!(
                                "\n//# sourceMappingURL=data:application/json;base64,{encoded}\n"
                            ));
                        }
                        _ => {}
                    }
                    if matches!(
                        options.source_map,
                        SourceMapMode::External
                            | SourceMapMode::InlineAndExternal
                            | SourceMapMode::Linked
                    ) {
                        files.push(OutputFile {
                            abs_path: format!("{path}.map"),
                            contents: map.json,
                            json_metadata_chunk: None,
                            is_executable: false,
                        });
                        if options.source_map != SourceMapMode::ExternalWithoutComment
                            && options.source_map != SourceMapMode::InlineAndExternal
                        {
                            contents.push_str(&format!("\n//# sourceMappingURL={path}.map\n"));
                        }
                    }
                }
            }

            files.push(OutputFile {
                abs_path: path,
                contents,
                json_metadata_chunk: None,
                is_executable: false,
            });
        }

        let file_paths: Vec<String> = input.graph.files.iter().map(|f| f.pretty_path.clone()).collect();
        let metafile = finalize::build_metafile(
            &chunk_graph,
            &final_paths,
            &output_sizes,
            &input.graph.files,
            &file_paths,
        )
        .map_err(|e| LinkError::Internal(e.to_string()))
        .ok();

        debug!(outputs = files.len(), "finalize: done");

        Ok(LinkOutput {
            files,
            log,
            metafile,
        })
    }
}

fn mark_everything_live(graph: &mut Graph, entry_points: &[SourceIndex]) {
    for file in &mut graph.files {
        file.is_live = true;
        for part in &mut file.parts {
            part.is_live = true;
        }
    }
    treeshake::run(graph, entry_points);
}

fn output_path(
    options: &Options,
    input: &LinkerInput,
    chunk: &chunks::Chunk,
    index: ChunkIndex,
    hash: &str,
) -> String {
    let ext = match chunk.repr {
        FileRepr::Js => "js",
        FileRepr::Css => "css",
        FileRepr::Copy => "bin",
    };
    let short_hash = &hash[..hash.len().min(8)];

    if let Some(bit) = chunk.entry_point_bit {
        let name = input
            .entry_output_names
            .get(bit)
            .cloned()
            .unwrap_or_else(|| format!("entry{bit}"));
        let templated = options
            .entry_names
            .replace("[name]", &name)
            .replace("[hash]", short_hash);
        format!("{}/{}.{}", options.abs_output_dir, templated, ext)
    } else {
        let templated = options
            .chunk_names
            .replace("[name]", &format!("chunk{index}"))
            .replace("[hash]", short_hash);
        format!("{}/{}.{}", options.abs_output_dir, templated, ext)
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    const TABLE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        out.push(TABLE[(b0 >> 2) as usize] as char);
        out.push(TABLE[(((b0 & 0x03) << 4) | (b1.unwrap_or(0) >> 4)) as usize] as char);
        out.push(if let Some(b1) = b1 {
            TABLE[(((b1 & 0x0f) << 2) | (b2.unwrap_or(0) >> 6)) as usize] as char
        } else {
            '='
        });
        out.push(if let Some(b2) = b2 {
            TABLE[(b2 & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{EntryBits, File};

    #[test]
    fn base64_encode_matches_known_vector() {
        assert_eq!(base64_encode(b"man"), "bWFu");
        assert_eq!(base64_encode(b"ma"), "bWE=");
    }

    #[test]
    fn bundle_of_single_entry_produces_one_js_output() {
        let mut graph = Graph::new();
        let f = graph.add_file(File::new("/a.js", FileRepr::Js));
        graph.file_mut(f).is_entry_point = true;
        graph.file_mut(f).entry_bits = {
            let mut b = EntryBits::with_capacity(1);
            b.set(0);
            b
        };
        graph.file_mut(f).parts.push(model::Part {
            stmts: vec![model::PartStmt::Opaque("console.log(1);".into())],
            is_live: true,
            can_be_removed_if_unused: false,
            ..Default::default()
        });

        let input = LinkerInput {
            graph,
            entry_points: vec![f],
            entry_output_names: vec!["a".to_string()],
            unique_key_prefix: "xYz".to_string(),
        };

        let linker = Linker::new(Options::default());
        let output = linker.link(input).unwrap();
        assert_eq!(output.files.iter().filter(|f| f.abs_path.ends_with(".js")).count(), 1);
        assert!(!output.log.has_errors());
    }

    #[test]
    fn cjs_wrapped_chunk_defines_the_helpers_it_calls() {
        let mut graph = Graph::new();
        let f = graph.add_file(File::new("/a.js", FileRepr::Js));
        graph.file_mut(f).is_entry_point = true;
        graph.file_mut(f).wrap = model::Wrap::Cjs;
        graph.file_mut(f).entry_bits = {
            let mut b = EntryBits::with_capacity(1);
            b.set(0);
            b
        };
        graph.file_mut(f).parts.push(model::Part {
            stmts: vec![model::PartStmt::Opaque("module.exports = 1;".into())],
            is_live: true,
            can_be_removed_if_unused: false,
            ..Default::default()
        });

        let input = LinkerInput {
            graph,
            entry_points: vec![f],
            entry_output_names: vec!["a".to_string()],
            unique_key_prefix: "xYz".to_string(),
        };

        let linker = Linker::new(Options::default());
        let output = linker.link(input).unwrap();
        let js = output
            .files
            .iter()
            .find(|f| f.abs_path.ends_with(".js"))
            .expect("one js output");
        assert!(js.contents.contains("__commonJS"));
        assert!(js.contents.contains("var __commonJS ="), "runtime definition must be present, not just the call site");
    }
}
