//! Symbol renamer: assigns every canonical symbol a final, collision-free
//! output name.
//!
//! Two strategies. `Number` renaming (the default) keeps a symbol's
//! original name and appends `$1`, `$2`, ... on conflict, first-come
//! first-served by stable declaration order — cheap, deterministic, and
//! keeps output readable. `Minify` renaming instead assigns short names
//! from a frequency-ranked pool, most-referenced symbol first, so the
//! densest identifiers get the shortest names.

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::chunks::{ChunkGraph, ChunkIndex};
use super::model::{Graph, SymbolFlags, SymbolKind, SymbolRef};

/// Which renaming strategy to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameMode {
    Number,
    Minify,
}

/// Final name assignment: canonical symbol -> output identifier.
#[derive(Debug, Default)]
pub struct Renamer {
    names: HashMap<SymbolRef, String>,
}

impl Renamer {
    #[must_use]
    pub fn get(&self, r: SymbolRef) -> Option<&str> {
        self.names.get(&r).map(String::as_str)
    }
}

const RESERVED: &[&str] = &[
    "require", "exports", "module", "__dirname", "__filename", "arguments", "eval", "this",
    "super", "import", "default", "function", "class", "const", "let", "var", "return", "if",
    "else", "for", "while", "do", "switch", "case", "break", "continue", "new", "delete",
    "typeof", "instanceof", "in", "of", "void", "yield", "async", "await", "true", "false",
    "null", "undefined",
];

/// Renames every canonical symbol referenced by any live chunk.
///
/// Chunks are processed independently: within a single chunk, all
/// symbols declared there plus every symbol the chunk imports share one
/// flat name scope (wrapped CJS modules get their own closure scope and
/// never collide with the surrounding chunk, so their declared symbols
/// are excluded here and left to keep their original names, consistent
/// with the wrapper function's own parameter list providing isolation).
pub fn run(graph: &Graph, chunk_graph: &ChunkGraph, mode: RenameMode) -> Renamer {
    let mut renamer = Renamer::default();

    for chunk in &chunk_graph.chunks {
        rename_chunk(graph, chunk_graph_symbols_for(graph, chunk), mode, &mut renamer);
    }

    renamer
}

fn chunk_graph_symbols_for(
    graph: &Graph,
    chunk: &super::chunks::Chunk,
) -> Vec<(SymbolRef, u32, bool, SymbolKind)> {
    // (symbol, use_count, must_not_be_renamed, kind)
    let mut out = Vec::new();
    let mut seen = HashSet::default();
    for &source in &chunk.files {
        let file = graph.file(source);
        if file.wrap != super::model::Wrap::None {
            continue;
        }
        for part in &file.parts {
            if !part.is_live {
                continue;
            }
            for &decl in &part.declared_symbols {
                if seen.insert(decl) {
                    let sym = graph.symbol(decl);
                    out.push((
                        decl,
                        sym.use_count,
                        sym.flags.contains(SymbolFlags::MUST_NOT_BE_RENAMED),
                        sym.kind,
                    ));
                }
            }
        }
    }
    out
}

/// A symbol kind that lives in its own namespace, separate from ordinary
/// bindings — a label can share text with a variable name in the same
/// scope without colliding, and a mangled CSS-modules property key is
/// never looked up as an identifier.
fn uses_separate_namespace(kind: SymbolKind) -> bool {
    matches!(kind, SymbolKind::Label | SymbolKind::MangledProp)
}

fn rename_chunk(
    graph: &Graph,
    mut symbols: Vec<(SymbolRef, u32, bool, SymbolKind)>,
    mode: RenameMode,
    renamer: &mut Renamer,
) {
    let mut taken: HashSet<String> = RESERVED.iter().map(|s| (*s).to_string()).collect();

    match mode {
        RenameMode::Number => {
            // Stable declaration order so output is reproducible across runs.
            symbols.sort_by_key(|(r, _, _, _)| (r.source_index, r.inner_index));
            for (r, _, pinned, _) in symbols {
                let original = graph.symbol(r).original_name.clone();
                if pinned {
                    renamer.names.insert(r, original);
                    continue;
                }
                let name = first_free_numbered(&original, &taken);
                taken.insert(name.clone());
                renamer.names.insert(r, name);
            }
        }
        RenameMode::Minify => {
            // Most-referenced symbols get the shortest names first.
            symbols.sort_by(|a, b| {
                b.1.cmp(&a.1)
                    .then_with(|| (a.0.source_index, a.0.inner_index).cmp(&(b.0.source_index, b.0.inner_index)))
            });

            let alphabet = char_frequency_alphabet(symbols.iter().map(|(r, ..)| graph.symbol(*r).original_name.as_str()));
            let mut ordinary_pool = MinifyNamePool::new(alphabet.clone());
            let mut prop_taken: HashSet<String> = HashSet::default();
            let mut prop_pool = MinifyNamePool::new(alphabet);

            for (r, _, pinned, kind) in symbols {
                if pinned {
                    let original = graph.symbol(r).original_name.clone();
                    taken.insert(original.clone());
                    renamer.names.insert(r, original);
                    continue;
                }
                let name = if uses_separate_namespace(kind) {
                    let name = prop_pool.next_unused(&prop_taken);
                    prop_taken.insert(name.clone());
                    name
                } else {
                    let name = ordinary_pool.next_unused(&taken);
                    taken.insert(name.clone());
                    name
                };
                renamer.names.insert(r, name);
            }
        }
    }
}

/// Orders the identifier alphabet by descending frequency of each
/// character across this chunk's own symbol names, so the short names
/// handed out first reuse bytes that are already common in the chunk —
/// the same string repeating more often compresses better under gzip.
fn char_frequency_alphabet<'a>(names: impl Iterator<Item = &'a str>) -> Vec<u8> {
    let mut freq = [0u32; 256];
    for name in names {
        for b in name.bytes() {
            freq[b as usize] += 1;
        }
    }
    let mut alphabet = ALPHABET_CONT.to_vec();
    alphabet.sort_by(|a, b| freq[*b as usize].cmp(&freq[*a as usize]).then(a.cmp(b)));
    alphabet
}

fn first_free_numbered(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{base}${n}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Generates short identifiers in the classic a, b, ..., z, a0, a1, ...
/// sequence, skipping reserved words, for minified output. The byte order
/// of both alphabets is shuffled per chunk by `char_frequency_alphabet` so
/// that the earliest (shortest) names spend their bytes on characters the
/// chunk already uses a lot.
struct MinifyNamePool {
    next: u64,
    alphabet_first: Vec<u8>,
    alphabet_cont: Vec<u8>,
}

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_$";
const ALPHABET_CONT: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_$0123456789";

impl MinifyNamePool {
    /// `alphabet_cont` must be a permutation of `ALPHABET_CONT` (64 bytes,
    /// as produced by `char_frequency_alphabet`); the leading-character set
    /// is derived from it by dropping digits, since identifiers can't
    /// start with one.
    fn new(alphabet_cont: Vec<u8>) -> Self {
        let alphabet_first = alphabet_cont.iter().copied().filter(|b| ALPHABET.contains(b)).collect();
        Self {
            next: 0,
            alphabet_first,
            alphabet_cont,
        }
    }

    fn next_unused(&mut self, taken: &HashSet<String>) -> String {
        loop {
            let name = self.name_for_index(self.next);
            self.next += 1;
            if !taken.contains(&name) && !RESERVED.contains(&name.as_str()) {
                return name;
            }
        }
    }

    fn name_for_index(&self, mut i: u64) -> String {
        let first_len = self.alphabet_first.len() as u64;
        let cont_len = self.alphabet_cont.len() as u64;
        let mut chars = Vec::new();
        chars.push(self.alphabet_first[(i % first_len) as usize]);
        i /= first_len;
        while i > 0 {
            i -= 1;
            chars.push(self.alphabet_cont[(i % cont_len) as usize]);
            i /= cont_len;
        }
        chars.reverse();
        String::from_utf8(chars).expect("identifier alphabet is ASCII")
    }
}
