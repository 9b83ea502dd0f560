//! Chunk planner: groups live files into chunks keyed by `EntryBits`,
//! twins JS entry chunks with a CSS chunk when CSS is transitively
//! imported, and orders files within each chunk.

use rustc_hash::FxHashMap as HashMap;

use super::model::{FileRepr, Graph, SourceIndex};

pub type ChunkIndex = u32;

/// One output chunk: a group of files sharing an `EntryBits` key.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub entry_bits_key: String,
    pub is_entry_point: bool,
    /// Set when this chunk corresponds 1:1 to a user entry point.
    pub entry_point_bit: Option<usize>,
    pub source_index: Option<SourceIndex>,
    pub repr: FileRepr,
    /// Files assigned to this chunk, already ordered: DFS postorder
    /// from the entry, ties broken by stable source index.
    pub files: Vec<SourceIndex>,
    /// Filled in by cross-chunk binding.
    pub cross_chunk_imports: Vec<super::cross_chunk::ChunkImport>,
    pub cross_chunk_exports: Vec<(String, super::model::SymbolRef)>,
    pub unique_key: String,
    /// CSS chunk twinned to this (JS) chunk's entry point, if any.
    pub css_twin: Option<ChunkIndex>,
}

/// Planning result: all chunks, plus the file -> chunk mapping.
#[derive(Debug, Default)]
pub struct ChunkGraph {
    pub chunks: Vec<Chunk>,
    pub file_to_chunk: HashMap<SourceIndex, ChunkIndex>,
}

impl ChunkGraph {
    #[must_use]
    pub fn chunk(&self, i: ChunkIndex) -> &Chunk {
        &self.chunks[i as usize]
    }

    pub fn chunk_mut(&mut self, i: ChunkIndex) -> &mut Chunk {
        &mut self.chunks[i as usize]
    }
}

/// Plan chunks for a graph that has already gone through tree-shaking
/// (`EntryBits` and `is_live` are expected to be populated).
pub fn plan(graph: &Graph, entry_points: &[SourceIndex], unique_key_prefix: &str) -> ChunkGraph {
    let mut by_key: HashMap<String, Vec<SourceIndex>> = HashMap::default();

    for (i, file) in graph.files.iter().enumerate() {
        if !file.is_live || file.entry_bits.is_empty() {
            continue;
        }
        by_key
            .entry(file.entry_bits.key())
            .or_default()
            .push(i as SourceIndex);
    }

    let mut keys: Vec<String> = by_key.keys().cloned().collect();
    keys.sort();

    let mut result = ChunkGraph::default();
    let mut js_chunk_for_entry: HashMap<SourceIndex, ChunkIndex> = HashMap::default();

    for key in &keys {
        let mut files_js: Vec<SourceIndex> = Vec::new();
        let mut files_css: Vec<SourceIndex> = Vec::new();
        for &f in &by_key[key] {
            match graph.file(f).repr {
                FileRepr::Js => files_js.push(f),
                FileRepr::Css => files_css.push(f),
                FileRepr::Copy => {}
            }
        }

        if !files_js.is_empty() {
            let entry_source = files_js
                .iter()
                .find(|&&f| graph.file(f).is_entry_point)
                .copied();
            let ordered = order_files(graph, &files_js, entry_source);
            let is_entry_point = entry_source.is_some();
            let entry_point_bit = entry_source
                .and_then(|s| entry_points.iter().position(|&e| e == s));

            let idx = result.chunks.len() as ChunkIndex;
            result.chunks.push(Chunk {
                entry_bits_key: key.clone(),
                is_entry_point,
                entry_point_bit,
                source_index: entry_source,
                repr: FileRepr::Js,
                files: ordered.clone(),
                cross_chunk_imports: Vec::new(),
                cross_chunk_exports: Vec::new(),
                unique_key: format!("{unique_key_prefix}C{idx:08}"),
                css_twin: None,
            });
            for f in ordered {
                result.file_to_chunk.insert(f, idx);
            }
            if let Some(entry) = entry_source {
                js_chunk_for_entry.insert(entry, idx);
            }
        }

        if !files_css.is_empty() {
            let entry_source = files_css
                .iter()
                .find(|&&f| graph.file(f).is_entry_point)
                .copied();
            let ordered = order_files(graph, &files_css, entry_source);
            let idx = result.chunks.len() as ChunkIndex;
            result.chunks.push(Chunk {
                entry_bits_key: key.clone(),
                is_entry_point: entry_source.is_some(),
                entry_point_bit: entry_source
                    .and_then(|s| entry_points.iter().position(|&e| e == s)),
                source_index: entry_source,
                repr: FileRepr::Css,
                files: ordered.clone(),
                cross_chunk_imports: Vec::new(),
                cross_chunk_exports: Vec::new(),
                unique_key: format!("{unique_key_prefix}C{idx:08}"),
                css_twin: None,
            });
            for f in ordered {
                result.file_to_chunk.insert(f, idx);
            }

            // Twin: if this CSS chunk's entry point also has a JS chunk,
            // link them. Each JS entry point whose transitive imports
            // include CSS gets a twin CSS chunk.
            if let Some(entry) = entry_source {
                if let Some(&js_idx) = js_chunk_for_entry.get(&entry) {
                    result.chunk_mut(js_idx).css_twin = Some(idx);
                }
            }
        }
    }

    result
}

/// Order files within a chunk: DFS postorder over (live) imports starting
/// from the entry, ties broken by stable source index; falls back to a
/// plain stable-index sort when there's no single entry (e.g. a shared
/// chunk with no entry point of its own).
fn order_files(
    graph: &Graph,
    files: &[SourceIndex],
    entry: Option<SourceIndex>,
) -> Vec<SourceIndex> {
    let members: rustc_hash::FxHashSet<SourceIndex> = files.iter().copied().collect();

    let Some(entry) = entry else {
        let mut sorted = files.to_vec();
        sorted.sort_unstable();
        return sorted;
    };

    let mut visited = rustc_hash::FxHashSet::default();
    let mut order = Vec::with_capacity(files.len());
    postorder_dfs(graph, entry, &members, &mut visited, &mut order);

    // Any chunk member not reached by the DFS from the entry (shouldn't
    // normally happen, since chunk membership is itself entry-reachability)
    // is appended in stable order as a defensive fallback.
    let mut leftovers: Vec<SourceIndex> = files
        .iter()
        .copied()
        .filter(|f| !visited.contains(f))
        .collect();
    leftovers.sort_unstable();
    order.extend(leftovers);
    order
}

fn postorder_dfs(
    graph: &Graph,
    source: SourceIndex,
    members: &rustc_hash::FxHashSet<SourceIndex>,
    visited: &mut rustc_hash::FxHashSet<SourceIndex>,
    order: &mut Vec<SourceIndex>,
) {
    if !visited.insert(source) {
        return;
    }
    let mut deps: Vec<SourceIndex> = Vec::new();
    for part in &graph.file(source).parts {
        if !part.is_live {
            continue;
        }
        for &(dep_source, _) in &part.dependencies {
            if dep_source != source && members.contains(&dep_source) {
                deps.push(dep_source);
            }
        }
    }
    deps.sort_unstable();
    deps.dedup();
    for dep in deps {
        postorder_dfs(graph, dep, members, visited, order);
    }
    order.push(source);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::model::{File, Part};

    #[test]
    fn files_with_identical_entry_bits_share_a_chunk() {
        let mut graph = Graph::new();
        let shared = graph.add_file(File::new("/shared.js", FileRepr::Js));
        let e1 = graph.add_file(File::new("/e1.js", FileRepr::Js));
        let e2 = graph.add_file(File::new("/e2.js", FileRepr::Js));
        graph.file_mut(e1).is_entry_point = true;
        graph.file_mut(e2).is_entry_point = true;
        graph.file_mut(e1).parts.push(Part {
            dependencies: vec![(shared, 0)],
            is_live: true,
            ..Default::default()
        });
        graph.file_mut(e2).parts.push(Part {
            dependencies: vec![(shared, 0)],
            is_live: true,
            ..Default::default()
        });

        super::super::treeshake::run(&mut graph, &[e1, e2]);

        let chunk_graph = plan(&graph, &[e1, e2], "abcXYZ");
        // shared is reachable from both entries -> entry_bits {0,1}; e1/e2
        // each have a distinct single-bit key -> 3 distinct JS chunks.
        assert_eq!(chunk_graph.chunks.len(), 3);
        assert_ne!(
            chunk_graph.file_to_chunk[&shared],
            chunk_graph.file_to_chunk[&e1]
        );
    }

    #[test]
    fn css_entry_gets_a_twin_chunk() {
        let mut graph = Graph::new();
        let css = graph.add_file(File::new("/e.css", FileRepr::Css));
        let js = graph.add_file(File::new("/e.js", FileRepr::Js));
        graph.file_mut(js).is_entry_point = true;
        graph.file_mut(css).is_entry_point = true;
        graph.file_mut(js).entry_bits = {
            let mut b = super::super::model::EntryBits::with_capacity(1);
            b.set(0);
            b
        };
        graph.file_mut(css).entry_bits = graph.file(js).entry_bits.clone();
        graph.file_mut(js).is_live = true;
        graph.file_mut(css).is_live = true;

        let chunk_graph = plan(&graph, &[js], "p");
        let js_idx = chunk_graph.file_to_chunk[&js];
        assert!(chunk_graph.chunk(js_idx).css_twin.is_some());
    }
}
