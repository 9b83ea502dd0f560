//! Cross-chunk binder: assigns each symbol to the chunk that declares
//! it, then computes per-chunk cross-chunk imports/exports. Enforces
//! chunk-graph acyclicity on non-dynamic edges.

use rustc_hash::FxHashMap as HashMap;

use super::chunks::{ChunkGraph, ChunkIndex};
use super::error::LinkError;
use super::model::{Graph, SymbolRef};

/// One cross-chunk import: `import { alias as local } from '<unique_key
/// of target_chunk>'`.
#[derive(Debug, Clone)]
pub struct ChunkImport {
    pub target_chunk: ChunkIndex,
    pub alias: String,
    pub local: SymbolRef,
}

/// Bind cross-chunk symbol references: assign `Symbol::chunk_index` for
/// every declared symbol, then compute each chunk's imports/exports.
///
/// Returns an error if the non-dynamic projection of the resulting
/// chunk-import graph contains a cycle.
pub fn run(graph: &mut Graph, chunk_graph: &mut ChunkGraph) -> Result<(), LinkError> {
    assign_chunk_index(graph, chunk_graph);
    compute_imports_exports(graph, chunk_graph);
    check_acyclic(chunk_graph)
}

fn assign_chunk_index(graph: &mut Graph, chunk_graph: &ChunkGraph) {
    for (source, &chunk) in &chunk_graph.file_to_chunk {
        let file = graph.file(*source);
        let decls: Vec<SymbolRef> = file
            .parts
            .iter()
            .filter(|p| p.is_live)
            .flat_map(|p| p.declared_symbols.iter().copied())
            .collect();
        for r in decls {
            let canonical = graph.follow(r);
            graph.symbols.get_mut(canonical).chunk_index = Some(chunk);
        }
    }
}

/// Enumerating each chunk's imports is independent per chunk and runs in
/// parallel; only the resulting export tables are merged serially.
fn compute_imports_exports(graph: &mut Graph, chunk_graph: &mut ChunkGraph) {
    use rayon::prelude::*;

    let per_chunk_imports: Vec<(ChunkIndex, Vec<ChunkImport>)> = chunk_graph
        .chunks
        .par_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut imports: Vec<ChunkImport> = Vec::new();
            let mut seen: rustc_hash::FxHashSet<(ChunkIndex, SymbolRef)> =
                rustc_hash::FxHashSet::default();
            for &source in &chunk.files {
                for part in &graph.file(source).parts {
                    if !part.is_live {
                        continue;
                    }
                    for &used in &part.symbol_uses {
                        let sym = graph.symbol(used);
                        let Some(owner_chunk) = sym.chunk_index else {
                            continue;
                        };
                        if owner_chunk == i as ChunkIndex {
                            continue;
                        }
                        if seen.insert((owner_chunk, used)) {
                            imports.push(ChunkImport {
                                target_chunk: owner_chunk,
                                alias: sym.original_name.clone(),
                                local: used,
                            });
                        }
                    }
                }
            }
            imports.sort_by(|a, b| {
                a.target_chunk
                    .cmp(&b.target_chunk)
                    .then_with(|| a.alias.cmp(&b.alias))
            });
            (i as ChunkIndex, imports)
        })
        .collect();

    let mut exports_by_chunk: HashMap<ChunkIndex, Vec<(String, SymbolRef)>> = HashMap::default();
    for (chunk_idx, imports) in &per_chunk_imports {
        for imp in imports {
            exports_by_chunk
                .entry(imp.target_chunk)
                .or_default()
                .push((imp.alias.clone(), imp.local));
        }
        chunk_graph.chunk_mut(*chunk_idx).cross_chunk_imports = imports.clone();
    }

    for (chunk_idx, mut exports) in exports_by_chunk {
        exports.sort_by(|a, b| a.0.cmp(&b.0));
        exports.dedup_by(|a, b| a.0 == b.0 && a.1 == b.1);
        chunk_graph.chunk_mut(chunk_idx).cross_chunk_exports = exports;
    }
}

/// The chunk-import graph restricted to non-dynamic edges must be a DAG.
/// Dynamic `import()` edges are allowed to cycle.
///
/// Our [`ChunkImport`] model doesn't currently distinguish dynamic from
/// static cross-chunk edges (cross-chunk symbol imports only ever arise
/// from statically-bound symbol uses; dynamic `import()` targets are
/// rewritten to reference a chunk's `unique_key` directly by the printer,
/// not through [`ChunkImport`]), so every edge checked here is a static
/// edge and must never cycle.
fn check_acyclic(chunk_graph: &ChunkGraph) -> Result<(), LinkError> {
    let n = chunk_graph.chunks.len();
    let mut state = vec![0u8; n]; // 0 = unvisited, 1 = visiting, 2 = done
    let mut stack_trace: Vec<ChunkIndex> = Vec::new();

    for start in 0..n as ChunkIndex {
        if state[start as usize] != 0 {
            continue;
        }
        if let Some(cycle) = visit(chunk_graph, start, &mut state, &mut stack_trace) {
            return Err(LinkError::CyclicChunkImport(
                cycle
                    .iter()
                    .map(|c| chunk_graph.chunk(*c).unique_key.clone())
                    .collect::<Vec<_>>()
                    .join(" -> "),
            ));
        }
    }
    Ok(())
}

fn visit(
    chunk_graph: &ChunkGraph,
    node: ChunkIndex,
    state: &mut [u8],
    stack_trace: &mut Vec<ChunkIndex>,
) -> Option<Vec<ChunkIndex>> {
    state[node as usize] = 1;
    stack_trace.push(node);
    for imp in &chunk_graph.chunk(node).cross_chunk_imports {
        let next = imp.target_chunk;
        match state[next as usize] {
            0 => {
                if let Some(cycle) = visit(chunk_graph, next, state, stack_trace) {
                    return Some(cycle);
                }
            }
            1 => {
                let start = stack_trace.iter().position(|&c| c == next).unwrap_or(0);
                let mut cycle = stack_trace[start..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            _ => {}
        }
    }
    stack_trace.pop();
    state[node as usize] = 2;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::chunks::Chunk;
    use crate::linker::model::FileRepr;

    fn dummy_chunk(key: &str) -> Chunk {
        Chunk {
            entry_bits_key: key.to_string(),
            is_entry_point: false,
            entry_point_bit: None,
            source_index: None,
            repr: FileRepr::Js,
            files: Vec::new(),
            cross_chunk_imports: Vec::new(),
            cross_chunk_exports: Vec::new(),
            unique_key: format!("pfxC{key}"),
            css_twin: None,
        }
    }

    #[test]
    fn acyclic_graph_passes() {
        let mut cg = ChunkGraph::default();
        cg.chunks.push(dummy_chunk("0"));
        cg.chunks.push(dummy_chunk("1"));
        cg.chunks[0].cross_chunk_imports.push(ChunkImport {
            target_chunk: 1,
            alias: "x".into(),
            local: SymbolRef::INVALID,
        });
        assert!(check_acyclic(&cg).is_ok());
    }

    #[test]
    fn static_cycle_is_rejected() {
        let mut cg = ChunkGraph::default();
        cg.chunks.push(dummy_chunk("0"));
        cg.chunks.push(dummy_chunk("1"));
        cg.chunks[0].cross_chunk_imports.push(ChunkImport {
            target_chunk: 1,
            alias: "x".into(),
            local: SymbolRef::INVALID,
        });
        cg.chunks[1].cross_chunk_imports.push(ChunkImport {
            target_chunk: 0,
            alias: "y".into(),
            local: SymbolRef::INVALID,
        });
        assert!(matches!(
            check_acyclic(&cg),
            Err(LinkError::CyclicChunkImport(_))
        ));
    }
}
