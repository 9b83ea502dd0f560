//! End-to-end scenarios driving the full linker pipeline by hand-building
//! a `Graph` (a real parser/resolver is a collaborator concern, not part
//! of this crate) and running scan -> treeshake -> chunks -> cross_chunk
//! -> rename -> print.

use fastnode_core::linker::chunks;
use fastnode_core::linker::cross_chunk;
use fastnode_core::linker::error::Log;
use fastnode_core::linker::model::{
    ExportsKind, File, FileRepr, Graph, ImportItem, ImportKind, ImportRecord, PartStmt,
    SymbolKind, Wrap,
};
use fastnode_core::linker::print_js;
use fastnode_core::linker::rename::{self, RenameMode};
use fastnode_core::linker::scan;
use fastnode_core::linker::treeshake;
use fastnode_core::linker::Options;

/// S1 — CJS entry importing one file: `/e.js: const {a} = require('./m');
/// module.exports = () => a`, `/m.js: exports.a = 1`. `require()` forces
/// the target to wrap in a `__commonJS` closure; the entry point itself
/// is never wrapped (nothing requires it), so it prints flat.
#[test]
fn s1_cjs_entry_importing_one_file() {
    let mut graph = Graph::new();
    let m = graph.add_file(File::new("/m.js", FileRepr::Js));
    let e = graph.add_file(File::new("/e.js", FileRepr::Js));
    graph.file_mut(e).is_entry_point = true;

    graph.file_mut(m).exports_kind = ExportsKind::CommonJs;
    graph.file_mut(m).parts[0].stmts.push(PartStmt::Opaque("exports.a = 1;".into()));
    graph.file_mut(m).parts[0].can_be_removed_if_unused = false;

    let mut rec = ImportRecord::new(ImportKind::Require, "./m");
    rec.source_index = Some(m);
    graph.file_mut(e).import_records.push(rec);
    graph.file_mut(e).parts[0]
        .stmts
        .push(PartStmt::Opaque("module.exports = () => a;".into()));
    graph.file_mut(e).parts[0].can_be_removed_if_unused = false;

    let options = Options::default();
    let mut log = Log::new();
    scan::run(&mut graph, &options, &mut log);
    assert!(!log.has_errors());

    assert_eq!(graph.file(m).wrap, Wrap::Cjs, "require() target is wrapped");
    assert_eq!(graph.file(e).wrap, Wrap::None, "entry point itself is never wrapped");

    treeshake::run(&mut graph, &[e]);
    let chunk_graph = chunks::plan(&graph, &[e], "s1");
    let renamer = rename::run(&graph, &chunk_graph, RenameMode::Number);
    let printed = print_js::print(&graph, &chunk_graph, chunk_graph.chunk(0), &renamer, &options);

    assert_eq!(printed.code.matches("__commonJS").count(), 1, "only m.js wraps");
}

/// S2 — dynamic `import()` with code splitting produces two chunks; the
/// importer's chunk keeps the dynamic `import()` call and the lazy
/// chunk's export surfaces as an ESM `export { … }`.
#[test]
fn s2_dynamic_import_splits_into_two_chunks() {
    let mut graph = Graph::new();
    let lazy = graph.add_file(File::new("/lazy.js", FileRepr::Js));
    let e = graph.add_file(File::new("/e.js", FileRepr::Js));
    graph.file_mut(e).is_entry_point = true;
    graph.file_mut(lazy).is_entry_point = true; // dynamic-import targets get their own EntryBits

    let v = graph.generate_new_symbol(lazy, SymbolKind::Other, "v");
    graph.file_mut(lazy).parts[0].declared_symbols.push(v);
    graph.file_mut(lazy).parts[0].stmts.push(PartStmt::ExportNamed {
        names: vec![("v".into(), v)],
    });
    graph.file_mut(lazy).parts[0].can_be_removed_if_unused = false;

    let mut rec = ImportRecord::new(ImportKind::Dynamic, "./lazy.js");
    rec.source_index = Some(lazy);
    graph.file_mut(e).import_records.push(rec);
    graph.file_mut(e).parts[0]
        .stmts
        .push(PartStmt::Import { record_index: 0 });
    graph.file_mut(e).parts[0].can_be_removed_if_unused = false;
    graph.file_mut(e).parts[0].dependencies.push((lazy, 0));

    let mut options = Options::default();
    options.code_splitting = true;
    let mut log = Log::new();
    scan::run(&mut graph, &options, &mut log);
    assert!(!log.has_errors());

    treeshake::run(&mut graph, &[e, lazy]);

    let mut chunk_graph = chunks::plan(&graph, &[e, lazy], "s2");
    assert_eq!(chunk_graph.chunks.len(), 2, "two distinct EntryBits -> two chunks");
    cross_chunk::run(&mut graph, &mut chunk_graph).unwrap();

    let renamer = rename::run(&graph, &chunk_graph, RenameMode::Number);
    let lazy_chunk_idx = chunk_graph.file_to_chunk[&lazy];
    let lazy_unique_key = chunk_graph.chunk(lazy_chunk_idx).unique_key.clone();

    let e_chunk = chunk_graph.chunk(chunk_graph.file_to_chunk[&e]);
    let printed_e = print_js::print(&graph, &chunk_graph, e_chunk, &renamer, &options);
    // The final relative path between chunks isn't known until hashing;
    // the printer emits the target chunk's unique key as a placeholder
    // for `finalize::substitute_unique_keys` to rewrite afterward.
    assert!(printed_e.code.contains(&format!("import(\"{lazy_unique_key}\")")));

    let lazy_chunk = chunk_graph.chunk(lazy_chunk_idx);
    let printed_lazy = print_js::print(&graph, &chunk_graph, lazy_chunk, &renamer, &options);
    assert!(printed_lazy.code.contains("export {"));
}

/// S3 — `export *` from CommonJS: `e.js` re-exports everything from a
/// CJS module at run time via `__reExport`.
#[test]
fn s3_export_star_from_commonjs() {
    let mut graph = Graph::new();
    let cjs = graph.add_file(File::new("/cjs.js", FileRepr::Js));
    let e = graph.add_file(File::new("/e.js", FileRepr::Js));
    graph.file_mut(e).is_entry_point = true;

    graph.file_mut(cjs).exports_kind = ExportsKind::CommonJs;
    graph.file_mut(cjs).parts[0]
        .stmts
        .push(PartStmt::Opaque("module.exports = { x: 1 };".into()));
    graph.file_mut(cjs).parts[0].can_be_removed_if_unused = false;

    let mut rec = ImportRecord::new(ImportKind::Stmt, "./cjs.js");
    rec.source_index = Some(cjs);
    graph.file_mut(e).import_records.push(rec);
    graph.file_mut(e).parts[0].stmts.push(PartStmt::ExportStar { record_index: 0 });
    graph.file_mut(e).parts[0].can_be_removed_if_unused = false;

    let options = Options::default();
    let mut log = Log::new();
    scan::run(&mut graph, &options, &mut log);
    assert!(!log.has_errors());
    assert_eq!(graph.file(cjs).wrap, Wrap::Cjs, "CJS export-star target is wrapped");

    treeshake::run(&mut graph, &[e]);
    let chunk_graph = chunks::plan(&graph, &[e], "s3");
    let renamer = rename::run(&graph, &chunk_graph, RenameMode::Number);
    let printed = print_js::print(&graph, &chunk_graph, chunk_graph.chunk(0), &renamer, &options);
    assert!(printed.code.contains("__reExport"));
}

/// S5 — ambiguous import via `export *` from two same-named exports is a
/// fatal error that short-circuits Scan.
#[test]
fn s5_ambiguous_export_star_import_is_an_error() {
    let mut graph = Graph::new();
    let b = graph.add_file(File::new("/b.js", FileRepr::Js));
    let c = graph.add_file(File::new("/c.js", FileRepr::Js));
    let a = graph.add_file(File::new("/a.js", FileRepr::Js));
    let e = graph.add_file(File::new("/e.js", FileRepr::Js));
    graph.file_mut(e).is_entry_point = true;

    let x_in_b = graph.generate_new_symbol(b, SymbolKind::Other, "x");
    graph.file_mut(b).parts[0].stmts.push(PartStmt::ExportNamed {
        names: vec![("x".into(), x_in_b)],
    });
    let x_in_c = graph.generate_new_symbol(c, SymbolKind::Other, "x");
    graph.file_mut(c).parts[0].stmts.push(PartStmt::ExportNamed {
        names: vec![("x".into(), x_in_c)],
    });

    let mut rec_to_b = ImportRecord::new(ImportKind::Stmt, "./b");
    rec_to_b.source_index = Some(b);
    graph.file_mut(a).import_records.push(rec_to_b);
    graph.file_mut(a).parts[0].stmts.push(PartStmt::ExportStar { record_index: 0 });

    let mut rec_to_c = ImportRecord::new(ImportKind::Stmt, "./c");
    rec_to_c.source_index = Some(c);
    graph.file_mut(a).import_records.push(rec_to_c);
    graph.file_mut(a).parts[0].stmts.push(PartStmt::ExportStar { record_index: 1 });

    let local = graph.generate_new_symbol(e, SymbolKind::Import, "x");
    let mut rec_e_to_a = ImportRecord::new(ImportKind::Stmt, "./a");
    rec_e_to_a.source_index = Some(a);
    rec_e_to_a.items.push(ImportItem {
        imported_alias: "x".into(),
        local,
    });
    graph.file_mut(e).import_records.push(rec_e_to_a);

    let options = Options::default();
    let mut log = Log::new();
    scan::run(&mut graph, &options, &mut log);

    assert!(log.has_errors());
    assert!(log
        .messages()
        .iter()
        .any(|m| m.text.contains("Ambiguous import")));
}

/// S6 — two entry points each dynamically importing the other: the
/// chunk graph has a cycle, but it's entirely over dynamic edges, so
/// cross-chunk binding succeeds rather than rejecting it.
#[test]
fn s6_cyclic_dynamic_chunk_imports_succeed() {
    let mut graph = Graph::new();
    let e1 = graph.add_file(File::new("/e1.js", FileRepr::Js));
    let e2 = graph.add_file(File::new("/e2.js", FileRepr::Js));
    graph.file_mut(e1).is_entry_point = true;
    graph.file_mut(e2).is_entry_point = true;

    let mut rec1 = ImportRecord::new(ImportKind::Dynamic, "./e2.js");
    rec1.source_index = Some(e2);
    graph.file_mut(e1).import_records.push(rec1);
    graph.file_mut(e1).parts[0].stmts.push(PartStmt::Import { record_index: 0 });
    graph.file_mut(e1).parts[0].can_be_removed_if_unused = false;

    let mut rec2 = ImportRecord::new(ImportKind::Dynamic, "./e1.js");
    rec2.source_index = Some(e1);
    graph.file_mut(e2).import_records.push(rec2);
    graph.file_mut(e2).parts[0].stmts.push(PartStmt::Import { record_index: 0 });
    graph.file_mut(e2).parts[0].can_be_removed_if_unused = false;

    let options = Options::default();
    let mut log = Log::new();
    scan::run(&mut graph, &options, &mut log);
    assert!(!log.has_errors());

    treeshake::run(&mut graph, &[e1, e2]);

    let mut chunk_graph = chunks::plan(&graph, &[e1, e2], "s6");
    assert_eq!(chunk_graph.chunks.len(), 2);

    // Dynamic import records don't create a `dependencies` edge (those
    // drive tree-shaking reachability for static imports only), so a
    // dynamic-only cycle never reaches cross_chunk's import graph and
    // acyclicity holds trivially here; this asserts binding still
    // succeeds rather than erroring.
    cross_chunk::run(&mut graph, &mut chunk_graph).expect("dynamic-only cycle must not be rejected");
}
