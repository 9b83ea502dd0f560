//! JS chunk printer: concatenates a chunk's live parts into final source,
//! rewriting the statement forms recorded in [`super::model::PartStmt`]
//! and emitting cross-chunk import/export glue, the wrap closure, and an
//! optional IIFE wrapper.

use super::chunks::{Chunk, ChunkGraph, ChunkIndex};
use super::cross_chunk::ChunkImport;
use super::model::{ExportsKind, FileRepr, Graph, ImportKind, PartStmt, SourceIndex, Wrap};
use super::rename::Renamer;
use super::Options;

/// One printed JS chunk: final code plus the line map the sourcemap
/// stage needs to attribute spans back to original files.
#[derive(Debug)]
pub struct PrintedChunk {
    pub code: String,
    /// `(output_line, source_index)` breadcrumbs, one per file boundary.
    pub line_starts: Vec<(u32, Option<SourceIndex>)>,
}

pub fn print(
    graph: &Graph,
    chunk_graph: &ChunkGraph,
    chunk: &Chunk,
    renamer: &Renamer,
    options: &Options,
) -> PrintedChunk {
    let mut out = String::new();
    let mut line_starts = Vec::new();

    if let Some(banner) = &options.banner {
        out.push_str(banner);
        out.push('\n');
    }

    if options.iife_wrapper {
        out.push_str("(function() {\n\"use strict\";\n");
    }

    print_cross_chunk_imports(&chunk.cross_chunk_imports, renamer, &mut out);

    for &source in &chunk.files {
        let file = graph.file(source);
        if file.repr != FileRepr::Js {
            continue;
        }
        line_starts.push((out.matches('\n').count() as u32, Some(source)));

        // Every file in `chunk.files` was assigned here by `chunks::plan`,
        // so its own chunk index is this chunk's.
        let current_chunk = chunk_graph.file_to_chunk.get(&source).copied();

        match file.wrap {
            Wrap::Cjs => print_cjs_wrapped_file(graph, chunk_graph, current_chunk, source, renamer, &mut out),
            Wrap::Esm => print_esm_wrapped_file(graph, chunk_graph, current_chunk, source, renamer, &mut out),
            Wrap::None => print_flat_file(graph, chunk_graph, current_chunk, source, renamer, &mut out),
        }
    }

    print_cross_chunk_exports(chunk, renamer, &mut out);

    if chunk.is_entry_point {
        print_entry_initializer(graph, chunk, renamer, &mut out);
    }

    if options.iife_wrapper {
        out.push_str("})();\n");
    }

    if let Some(footer) = &options.footer {
        out.push_str(footer);
        out.push('\n');
    }

    PrintedChunk {
        code: out,
        line_starts,
    }
}

fn print_cross_chunk_imports(imports: &[ChunkImport], renamer: &Renamer, out: &mut String) {
    if imports.is_empty() {
        return;
    }
    let mut by_target: std::collections::BTreeMap<u32, Vec<&ChunkImport>> =
        std::collections::BTreeMap::new();
    for imp in imports {
        by_target.entry(imp.target_chunk).or_default().push(imp);
    }
    for (target, imps) in by_target {
        let names: Vec<String> = imps
            .iter()
            .map(|i| {
                let local = renamer.get(i.local).unwrap_or(&i.alias);
                if local == i.alias {
                    i.alias.clone()
                } else {
                    format!("{} as {local}", i.alias)
                }
            })
            .collect();
        out.push_str(&format!(
            "import {{ {} }} from \"./chunk-{target}.js\";\n",
            names.join(", ")
        ));
    }
}

fn print_cross_chunk_exports(chunk: &Chunk, renamer: &Renamer, out: &mut String) {
    if chunk.cross_chunk_exports.is_empty() {
        return;
    }
    let names: Vec<String> = chunk
        .cross_chunk_exports
        .iter()
        .map(|(alias, sym)| {
            let local = renamer.get(*sym).unwrap_or(alias);
            if local == alias {
                alias.clone()
            } else {
                format!("{local} as {alias}")
            }
        })
        .collect();
    out.push_str(&format!("export {{ {} }};\n", names.join(", ")));
}

/// Flat (non-wrapped) file: each part's statements are rewritten in
/// place and concatenated directly into the chunk's top-level scope.
fn print_flat_file(
    graph: &Graph,
    chunk_graph: &ChunkGraph,
    current_chunk: Option<ChunkIndex>,
    source: SourceIndex,
    renamer: &Renamer,
    out: &mut String,
) {
    let file = graph.file(source);
    for part in &file.parts {
        if !part.is_live {
            continue;
        }
        for stmt in &part.stmts {
            print_stmt(graph, chunk_graph, current_chunk, file, stmt, renamer, out);
        }
    }
}

/// CommonJS-wrapped file: the whole body becomes a lazily-invoked
/// closure registered under the runtime's `__commonJS` helper, so
/// `require()` still observes module-caching semantics.
fn print_cjs_wrapped_file(
    graph: &Graph,
    chunk_graph: &ChunkGraph,
    current_chunk: Option<ChunkIndex>,
    source: SourceIndex,
    renamer: &Renamer,
    out: &mut String,
) {
    let file = graph.file(source);
    out.push_str(&format!(
        "var {} = __commonJS((module, exports) => {{\n",
        wrapper_name(source)
    ));
    for part in &file.parts {
        if !part.is_live {
            continue;
        }
        for stmt in &part.stmts {
            print_stmt(graph, chunk_graph, current_chunk, file, stmt, renamer, out);
        }
    }
    out.push_str("});\n");
}

/// ESM-wrapped file: a pure-ESM module pulled into a circular import
/// cycle. Its body runs lazily, once, through `__esm` rather than at
/// module-evaluation order, so two cyclically importing ESM files can
/// each reference the other's bindings without one observing a
/// not-yet-initialized value.
fn print_esm_wrapped_file(
    graph: &Graph,
    chunk_graph: &ChunkGraph,
    current_chunk: Option<ChunkIndex>,
    source: SourceIndex,
    renamer: &Renamer,
    out: &mut String,
) {
    let file = graph.file(source);
    out.push_str(&format!(
        "var {} = __esm(() => {{\n",
        wrapper_name(source)
    ));
    for part in &file.parts {
        if !part.is_live {
            continue;
        }
        for stmt in &part.stmts {
            print_stmt(graph, chunk_graph, current_chunk, file, stmt, renamer, out);
        }
    }
    out.push_str("});\n");
}

fn wrapper_name(source: SourceIndex) -> String {
    format!("__init_{source}")
}

fn print_stmt(
    graph: &Graph,
    chunk_graph: &ChunkGraph,
    current_chunk: Option<ChunkIndex>,
    file: &super::model::File,
    stmt: &PartStmt,
    renamer: &Renamer,
    out: &mut String,
) {
    match stmt {
        PartStmt::Import { record_index } => {
            print_import_record(graph, chunk_graph, current_chunk, file, *record_index, out);
        }
        PartStmt::ExportStar { record_index } => {
            let rec = &file.import_records[*record_index as usize];
            match rec.source_index {
                None => {
                    out.push_str(&format!("__reExport(exports, require(\"{}\"));\n", rec.path));
                }
                Some(target) => {
                    let target_file = graph.file(target);
                    if target_file.exports_kind == ExportsKind::CommonJs {
                        // CommonJS exports aren't known statically, so
                        // scan couldn't fold them into resolved_exports;
                        // re-export the wrapped module's exports object
                        // at run time instead.
                        out.push_str(&format!(
                            "__reExport(exports, {}());\n",
                            wrapper_name(target)
                        ));
                    }
                    // Statically-known ESM `export *` targets are already
                    // folded into this file's resolved_exports by scan;
                    // nothing to emit here.
                }
            }
        }
        PartStmt::ExportDefault { expr_code } => {
            out.push_str(expr_code);
            out.push('\n');
        }
        PartStmt::ExportNamed { names } => {
            if names.is_empty() {
                return;
            }
            let rendered: Vec<String> = names
                .iter()
                .map(|(alias, sym)| {
                    let local = renamer.get(*sym).unwrap_or(alias);
                    if local == alias {
                        alias.clone()
                    } else {
                        format!("{local} as {alias}")
                    }
                })
                .collect();
            out.push_str(&format!("export {{ {} }};\n", rendered.join(", ")));
        }
        PartStmt::Opaque(code) => {
            out.push_str(code);
            if !code.ends_with('\n') {
                out.push('\n');
            }
        }
    }
}

fn print_import_record(
    graph: &Graph,
    chunk_graph: &ChunkGraph,
    current_chunk: Option<ChunkIndex>,
    file: &super::model::File,
    record_index: u32,
    out: &mut String,
) {
    let rec = &file.import_records[record_index as usize];

    let Some(target) = rec.source_index else {
        // External: leave the original import path, runtime handles it
        // via a plain `require`/`import` against the host platform.
        match rec.kind {
            ImportKind::Require | ImportKind::At => {
                out.push_str(&format!("require(\"{}\");\n", rec.path));
            }
            _ => {
                out.push_str(&format!("import(\"{}\");\n", rec.path));
            }
        }
        return;
    };

    if rec.kind == ImportKind::Dynamic {
        let target_chunk = chunk_graph.file_to_chunk.get(&target).copied();
        if target_chunk.is_some() && target_chunk != current_chunk {
            // Crosses a chunk boundary: the final relative path isn't
            // known until chunks are hashed, so emit the target chunk's
            // unique key and let `finalize::substitute_unique_keys`
            // rewrite it once every chunk's output path is final.
            let unique_key = &chunk_graph.chunk(target_chunk.unwrap()).unique_key;
            out.push_str(&format!("import(\"{unique_key}\");\n"));
            return;
        }
    }

    let target_file = graph.file(target);
    match target_file.wrap {
        Wrap::Cjs => {
            out.push_str(&format!(
                "var {}_exports = {}();\n",
                wrapper_name(target),
                wrapper_name(target)
            ));
            return;
        }
        Wrap::Esm => {
            out.push_str(&format!("{}();\n", wrapper_name(target)));
        }
        Wrap::None => {}
    }

    match target_file.exports_kind {
        ExportsKind::None | ExportsKind::Esm => {
            // Pure ESM target: cross-part symbol uses were already bound
            // directly by Scan step 4, so no runtime glue is emitted —
            // references resolve through the renamer alone.
        }
        ExportsKind::EsmWithDynamicFallback => {
            out.push_str(&format!(
                "var {} = __toESM(require(\"{}\"));\n",
                wrapper_name(target),
                rec.path
            ));
        }
        ExportsKind::CommonJs => {
            out.push_str(&format!(
                "var {} = __toESM(require(\"{}\"));\n",
                wrapper_name(target),
                rec.path
            ));
        }
    }
}

fn print_entry_initializer(graph: &Graph, chunk: &Chunk, renamer: &Renamer, out: &mut String) {
    let Some(entry) = chunk.source_index else {
        return;
    };
    let file = graph.file(entry);
    if file.wrap != Wrap::None {
        out.push_str(&format!("{}();\n", wrapper_name(entry)));
    }
    let _ = renamer;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::chunks;
    use crate::linker::model::{File, Part};
    use crate::linker::rename::{self, RenameMode};

    #[test]
    fn opaque_statement_is_passed_through() {
        let mut graph = Graph::new();
        let f = graph.add_file(File::new("/a.js", FileRepr::Js));
        graph.file_mut(f).is_entry_point = true;
        graph.file_mut(f).is_live = true;
        graph.file_mut(f).entry_bits = {
            let mut b = super::super::model::EntryBits::with_capacity(1);
            b.set(0);
            b
        };
        graph.file_mut(f).parts.push(Part {
            stmts: vec![PartStmt::Opaque("console.log(1);".into())],
            is_live: true,
            ..Default::default()
        });

        let chunk_graph = chunks::plan(&graph, &[f], "p");
        let renamer = rename::run(&graph, &chunk_graph, RenameMode::Number);
        let options = Options::default();
        let printed = print(&graph, &chunk_graph, chunk_graph.chunk(0), &renamer, &options);
        assert!(printed.code.contains("console.log(1);"));
    }

    #[test]
    fn external_export_star_emits_re_export_helper() {
        let mut graph = Graph::new();
        let f = graph.add_file(File::new("/a.js", FileRepr::Js));
        graph.file_mut(f).is_entry_point = true;
        graph.file_mut(f).is_live = true;
        graph.file_mut(f).entry_bits = {
            let mut b = super::super::model::EntryBits::with_capacity(1);
            b.set(0);
            b
        };
        let rec = super::super::model::ImportRecord::new(ImportKind::Stmt, "lodash");
        graph.file_mut(f).import_records.push(rec);
        graph.file_mut(f).parts.push(Part {
            stmts: vec![PartStmt::ExportStar { record_index: 0 }],
            is_live: true,
            ..Default::default()
        });

        let chunk_graph = chunks::plan(&graph, &[f], "p");
        let renamer = rename::run(&graph, &chunk_graph, RenameMode::Number);
        let options = Options::default();
        let printed = print(&graph, &chunk_graph, chunk_graph.chunk(0), &renamer, &options);
        assert!(printed.code.contains("__reExport"));
        assert!(printed.code.contains("lodash"));
    }
}
