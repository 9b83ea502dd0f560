//! Finalize: content-hashes printed chunks, substitutes every chunk's
//! `unique_key` placeholder with its real output path, strips/collects
//! legal comments, and assembles the metafile.

use rustc_hash::FxHashMap as HashMap;
use serde::Serialize;

use super::chunks::{Chunk, ChunkGraph, ChunkIndex};
use super::model::{File, ImportKind};

/// Whether a chunk's final hash is computed from its own printed bytes
/// only, or also mixes in the (already-finalized) hashes of every chunk
/// it imports from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    Isolated,
    Transitive,
}

fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Computes a final content hash per chunk, handling cyclic chunk-import
/// graphs by memoizing hashes as they're resolved during a DFS instead of
/// recursing unboundedly.
pub fn hash_chunks(
    chunk_graph: &ChunkGraph,
    printed: &HashMap<ChunkIndex, String>,
    mode: HashMode,
) -> HashMap<ChunkIndex, String> {
    let mut memo: HashMap<ChunkIndex, String> = HashMap::default();
    let mut in_progress: rustc_hash::FxHashSet<ChunkIndex> = rustc_hash::FxHashSet::default();

    for i in 0..chunk_graph.chunks.len() as ChunkIndex {
        hash_one(i, chunk_graph, printed, mode, &mut memo, &mut in_progress);
    }
    memo
}

fn hash_one(
    i: ChunkIndex,
    chunk_graph: &ChunkGraph,
    printed: &HashMap<ChunkIndex, String>,
    mode: HashMode,
    memo: &mut HashMap<ChunkIndex, String>,
    in_progress: &mut rustc_hash::FxHashSet<ChunkIndex>,
) -> String {
    if let Some(h) = memo.get(&i) {
        return h.clone();
    }
    let own = printed.get(&i).map(String::as_str).unwrap_or("");
    let hash = match mode {
        HashMode::Isolated => hash_bytes(own.as_bytes()),
        HashMode::Transitive => {
            if !in_progress.insert(i) {
                // Cycle: fall back to this chunk's own bytes so the DFS
                // terminates; the cycle partner still mixes in this
                // chunk's real hash once it resolves.
                return hash_bytes(own.as_bytes());
            }
            let mut mixed = String::from(own);
            let chunk = chunk_graph.chunk(i);
            let mut targets: Vec<ChunkIndex> = chunk
                .cross_chunk_imports
                .iter()
                .map(|imp| imp.target_chunk)
                .collect();
            targets.sort_unstable();
            targets.dedup();
            for target in targets {
                mixed.push_str(&hash_one(
                    target, chunk_graph, printed, mode, memo, in_progress,
                ));
            }
            in_progress.remove(&i);
            hash_bytes(mixed.as_bytes())
        }
    };
    memo.insert(i, hash.clone());
    hash
}

/// Replaces every occurrence of any chunk's `unique_key` placeholder in
/// `code` with that chunk's real, hashed output path. Placeholders can
/// reference chunks cyclically (dynamic `import()` targets), which is
/// exactly why substitution is a final textual pass instead of being
/// computed during printing.
pub fn substitute_unique_keys(
    code: &str,
    chunk_graph: &ChunkGraph,
    final_paths: &HashMap<ChunkIndex, String>,
) -> String {
    let mut out = code.to_string();
    for (i, chunk) in chunk_graph.chunks.iter().enumerate() {
        if let Some(path) = final_paths.get(&(i as ChunkIndex)) {
            out = out.replace(&chunk.unique_key, path);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub enum LegalCommentsMode {
    None,
    Inline,
    Eof,
    Linked,
    External,
}

/// Extracts `/*! ... */` and `//!`-prefixed legal comments from a chunk's
/// source, returning the remaining code and the extracted text (joined).
pub fn extract_legal_comments(code: &str, mode: LegalCommentsMode) -> (String, Option<String>) {
    if mode == LegalCommentsMode::None {
        return (code.to_string(), None);
    }

    let mut kept = String::with_capacity(code.len());
    let mut legal = String::new();
    for line in code.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("//!") || trimmed.starts_with("/*!") {
            legal.push_str(line);
            legal.push('\n');
            if mode == LegalCommentsMode::External {
                continue;
            }
        }
        kept.push_str(line);
        kept.push('\n');
    }

    (kept, if legal.is_empty() { None } else { Some(legal) })
}

#[derive(Debug, Serialize)]
pub struct MetafileOutput {
    pub bytes: u64,
    pub inputs: HashMap<String, MetafileInput>,
    pub imports: Vec<MetafileImport>,
    pub exports: Vec<String>,
    #[serde(rename = "entryPoint", skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(rename = "cssBundle", skip_serializing_if = "Option::is_none")]
    pub css_bundle: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MetafileInput {
    #[serde(rename = "bytesInOutput")]
    pub bytes_in_output: u64,
}

#[derive(Debug, Serialize)]
pub struct Metafile {
    pub inputs: HashMap<String, MetafileEntryInput>,
    pub outputs: HashMap<String, MetafileOutput>,
}

#[derive(Debug, Serialize)]
pub struct MetafileEntryInput {
    pub bytes: u64,
    pub imports: Vec<MetafileImport>,
}

#[derive(Debug, Serialize)]
pub struct MetafileImport {
    pub path: String,
    pub kind: String,
}

fn import_kind_label(kind: ImportKind) -> &'static str {
    match kind {
        ImportKind::Stmt => "import-statement",
        ImportKind::Require => "require-call",
        ImportKind::Dynamic => "dynamic-import",
        ImportKind::At => "import-rule",
        ImportKind::ComposesFrom => "composes-from",
    }
}

/// Builds the metafile describing this build's source graph and output
/// chunks, serialized with `serde_json` rather than hand-assembled
/// strings.
pub fn build_metafile(
    chunk_graph: &ChunkGraph,
    output_paths: &HashMap<ChunkIndex, String>,
    output_sizes: &HashMap<ChunkIndex, u64>,
    files: &[File],
    file_paths: &[String],
) -> serde_json::Result<String> {
    let mut outputs = HashMap::default();

    for (i, chunk) in chunk_graph.chunks.iter().enumerate() {
        let Some(path) = output_paths.get(&(i as ChunkIndex)) else {
            continue;
        };
        let inputs = chunk_inputs(chunk, files, file_paths);

        let mut imports: Vec<MetafileImport> = chunk
            .cross_chunk_imports
            .iter()
            .filter_map(|imp| output_paths.get(&imp.target_chunk))
            .map(|target_path| MetafileImport {
                path: target_path.clone(),
                kind: "import-statement".to_string(),
            })
            .collect();
        imports.sort_by(|a, b| a.path.cmp(&b.path));
        imports.dedup_by(|a, b| a.path == b.path);

        let mut exports: Vec<String> = chunk
            .cross_chunk_exports
            .iter()
            .map(|(alias, _)| alias.clone())
            .collect();
        exports.sort();
        exports.dedup();

        let entry_point = chunk
            .is_entry_point
            .then(|| chunk.source_index)
            .flatten()
            .and_then(|source| file_paths.get(source as usize).cloned());

        let css_bundle = chunk.css_twin.and_then(|twin| output_paths.get(&twin).cloned());

        outputs.insert(
            path.clone(),
            MetafileOutput {
                bytes: output_sizes.get(&(i as ChunkIndex)).copied().unwrap_or(0),
                inputs,
                imports,
                exports,
                entry_point,
                css_bundle,
            },
        );
    }

    let inputs = files
        .iter()
        .zip(file_paths.iter())
        .map(|(file, path)| {
            let bytes = file_byte_size(file);
            let imports = file
                .import_records
                .iter()
                .map(|rec| MetafileImport {
                    path: rec.path.clone(),
                    kind: import_kind_label(rec.kind).to_string(),
                })
                .collect();
            (path.clone(), MetafileEntryInput { bytes, imports })
        })
        .collect();

    let meta = Metafile { inputs, outputs };
    serde_json::to_string_pretty(&meta)
}

/// Approximates a file's on-disk size from the opaque source text carried
/// by its parts — the graph doesn't retain the original file bytes once
/// parsed, so this is the closest available proxy.
fn file_byte_size(file: &File) -> u64 {
    file.parts
        .iter()
        .flat_map(|p| &p.stmts)
        .map(|stmt| match stmt {
            super::model::PartStmt::Opaque(code) => code.len() as u64,
            super::model::PartStmt::ExportDefault { expr_code } => expr_code.len() as u64,
            _ => 0,
        })
        .sum()
}

fn chunk_inputs(chunk: &Chunk, files: &[File], file_paths: &[String]) -> HashMap<String, MetafileInput> {
    let mut out = HashMap::default();
    for &source in &chunk.files {
        let (Some(path), Some(file)) = (file_paths.get(source as usize), files.get(source as usize)) else {
            continue;
        };
        out.insert(
            path.clone(),
            MetafileInput {
                bytes_in_output: file_byte_size(file),
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_hash_depends_only_on_own_bytes() {
        let chunk_graph = ChunkGraph::default();
        let mut printed = HashMap::default();
        printed.insert(0, "a".to_string());
        printed.insert(1, "a".to_string());
        let hashes = hash_chunks(&chunk_graph, &printed, HashMode::Isolated);
        assert_eq!(hashes.get(&0), hashes.get(&1));
    }

    #[test]
    fn unique_key_substitution_replaces_all_occurrences() {
        let mut chunk_graph = ChunkGraph::default();
        chunk_graph.chunks.push(Chunk {
            entry_bits_key: "0".into(),
            is_entry_point: true,
            entry_point_bit: Some(0),
            source_index: None,
            repr: super::super::model::FileRepr::Js,
            files: Vec::new(),
            cross_chunk_imports: Vec::new(),
            cross_chunk_exports: Vec::new(),
            unique_key: "KEY123".into(),
            css_twin: None,
        });
        let mut final_paths = HashMap::default();
        final_paths.insert(0, "chunk-abcd1234.js".to_string());
        let code = "import(\"KEY123\"); import(\"KEY123\");";
        let out = substitute_unique_keys(code, &chunk_graph, &final_paths);
        assert_eq!(
            out,
            "import(\"chunk-abcd1234.js\"); import(\"chunk-abcd1234.js\");"
        );
    }

    #[test]
    fn legal_comment_extraction_external_mode_removes_from_code() {
        let code = "//! Copyright 2024\nconst x = 1;\n";
        let (kept, legal) = extract_legal_comments(code, LegalCommentsMode::External);
        assert!(!kept.contains("Copyright"));
        assert_eq!(legal.unwrap().trim(), "//! Copyright 2024");
    }

    #[test]
    fn metafile_reports_real_sizes_and_cross_chunk_wiring() {
        use super::super::model::{File, FileRepr, Part, PartStmt};

        let mut files = vec![File::new("/a.js", FileRepr::Js), File::new("/lazy.js", FileRepr::Js)];
        files[0].parts.push(Part {
            stmts: vec![PartStmt::Opaque("console.log(1);".into())],
            is_live: true,
            ..Default::default()
        });
        files[1].parts.push(Part {
            stmts: vec![PartStmt::Opaque("export const v = 1;".into())],
            is_live: true,
            ..Default::default()
        });
        let file_paths = vec!["/a.js".to_string(), "/lazy.js".to_string()];

        let mut chunk_graph = ChunkGraph::default();
        chunk_graph.chunks.push(Chunk {
            entry_bits_key: "0".into(),
            is_entry_point: true,
            entry_point_bit: Some(0),
            source_index: Some(0),
            repr: FileRepr::Js,
            files: vec![0],
            cross_chunk_imports: vec![super::super::cross_chunk::ChunkImport {
                target_chunk: 1,
                alias: "v".into(),
                local: super::super::model::SymbolRef::INVALID,
            }],
            cross_chunk_exports: Vec::new(),
            unique_key: "ENTRY_KEY".into(),
            css_twin: None,
        });
        chunk_graph.chunks.push(Chunk {
            entry_bits_key: "1".into(),
            is_entry_point: false,
            entry_point_bit: None,
            source_index: Some(1),
            repr: FileRepr::Js,
            files: vec![1],
            cross_chunk_imports: Vec::new(),
            cross_chunk_exports: vec![("v".into(), super::super::model::SymbolRef::INVALID)],
            unique_key: "LAZY_KEY".into(),
            css_twin: None,
        });

        let mut output_paths = HashMap::default();
        output_paths.insert(0, "out/a.js".to_string());
        output_paths.insert(1, "out/lazy-abcd.js".to_string());
        let mut output_sizes = HashMap::default();
        output_sizes.insert(0, 50u64);
        output_sizes.insert(1, 30u64);

        let json = build_metafile(&chunk_graph, &output_paths, &output_sizes, &files, &file_paths).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let entry_out = &value["outputs"]["out/a.js"];
        assert_eq!(entry_out["entryPoint"], "/a.js");
        assert_eq!(entry_out["imports"][0]["path"], "out/lazy-abcd.js");
        assert_eq!(
            value["outputs"]["out/a.js"]["inputs"]["/a.js"]["bytesInOutput"],
            "console.log(1);".len() as u64
        );

        let lazy_out = &value["outputs"]["out/lazy-abcd.js"];
        assert_eq!(lazy_out["exports"][0], "v");
        assert_eq!(value["inputs"]["/lazy.js"]["bytes"], "export const v = 1;".len() as u64);
    }
}
