//! CSS chunk printer: orders a chunk's stylesheets by a DFS over `@import`
//! edges (carrying accumulated `layer`/`supports`/`media` conditions),
//! hoists external `@import`s above everything else, dedups redundant
//! layer/import entries, then runs the result through `lightningcss` for
//! minification/prefixing parity with the JS side.

use rustc_hash::FxHashSet as HashSet;

use super::chunks::Chunk;
use super::model::{File as GraphFile, FileRepr, Graph, ImportRecord, PartStmt, SourceIndex};
use super::Options;
use crate::css::{process_css, CssError, CssOptions};

#[derive(Debug)]
pub struct PrintedCssChunk {
    pub code: String,
}

/// Accumulated wrapping conditions along one `@import` chain. Each vec is a
/// stack: index 0 is the outermost (first-encountered) condition, the last
/// index the one closest to the content itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Conditions {
    layers: Vec<Vec<String>>,
    supports: Vec<String>,
    media: Vec<String>,
}

impl Conditions {
    fn push(&self, rec: &ImportRecord) -> Self {
        let mut next = self.clone();
        if let Some(layer) = &rec.css_layer {
            next.layers.push(layer.clone());
        }
        if let Some(supports) = &rec.css_supports {
            next.supports.push(supports.clone());
        }
        if let Some(media) = &rec.css_media {
            next.media.push(media.clone());
        }
        next
    }

    /// Whether `self` is a prefix of `other` in every dimension — i.e.
    /// `other` wraps everything `self` does, and nothing more.
    fn is_prefix_of(&self, other: &Self) -> bool {
        self.layers.len() <= other.layers.len()
            && other.layers[..self.layers.len()] == self.layers[..]
            && self.supports.len() <= other.supports.len()
            && other.supports[..self.supports.len()] == self.supports[..]
            && self.media.len() <= other.media.len()
            && other.media[..self.media.len()] == self.media[..]
    }
}

#[derive(Debug, Clone)]
enum EntryKind {
    /// A file's own (non-import) rules, already rendered.
    Node { source: SourceIndex, body: String },
    /// An external `@import` target (never resolved to a file in this graph).
    External(String),
    /// A bare `@layer a, b;` order declaration left behind after a
    /// duplicate entry was dropped by the last-wins pass.
    LayerStub(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    kind: EntryKind,
    conditions: Conditions,
}

fn identity(kind: &EntryKind) -> Option<(u8, String)> {
    match kind {
        EntryKind::Node { source, .. } => Some((0, source.to_string())),
        EntryKind::External(path) => Some((1, path.clone())),
        EntryKind::LayerStub(_) => None,
    }
}

fn flat_layer_name(path: &[String]) -> String {
    path.join(".")
}

pub fn print(graph: &Graph, chunk: &Chunk, options: &Options) -> Result<PrintedCssChunk, CssError> {
    let mut entries = Vec::new();
    let mut stack = HashSet::default();

    let mut roots: Vec<SourceIndex> = chunk
        .files
        .iter()
        .copied()
        .filter(|&s| graph.file(s).repr == FileRepr::Css && graph.file(s).is_entry_point)
        .collect();
    if roots.is_empty() {
        roots = chunk
            .files
            .iter()
            .copied()
            .filter(|&s| graph.file(s).repr == FileRepr::Css)
            .collect();
    }

    for root in roots {
        visit(graph, root, &Conditions::default(), &mut stack, &mut entries);
    }

    hoist_external_and_layers(&mut entries);
    dedup_last_wins(&mut entries);
    dedup_layers_forward(&mut entries);
    merge_adjacent_layer_stubs(&mut entries);

    let mut source = String::new();
    for entry in &entries {
        source.push_str(&render_entry(entry));
    }

    let css_opts = CssOptions {
        minify: options.minify,
        autoprefixer: true,
        filename: chunk.source_index.map(|_| chunk.unique_key.clone()),
        ..Default::default()
    };
    let result = process_css(&source, &css_opts)?;
    Ok(PrintedCssChunk { code: result.code })
}

/// DFS over `@import`/`composes: … from` edges (the latter followed as a
/// side edge, same as a plain import, since neither affects selector
/// specificity here). Emits child entries before the visiting file's own
/// body (postorder), matching `@import`'s must-precede-other-rules rule.
fn visit(
    graph: &Graph,
    source: SourceIndex,
    conditions: &Conditions,
    stack: &mut HashSet<SourceIndex>,
    out: &mut Vec<Entry>,
) {
    if !stack.insert(source) {
        return; // cycle guard
    }

    let file: &GraphFile = graph.file(source);
    let mut own_body = String::new();
    for part in &file.parts {
        if !part.is_live {
            continue;
        }
        for stmt in &part.stmts {
            match stmt {
                PartStmt::ExportStar { record_index } => {
                    let rec = &file.import_records[*record_index as usize];
                    let child = conditions.push(rec);
                    match rec.source_index {
                        None => out.push(Entry {
                            kind: EntryKind::External(rec.path.clone()),
                            conditions: child,
                        }),
                        Some(target) => visit(graph, target, &child, stack, out),
                    }
                }
                PartStmt::Opaque(code) => {
                    own_body.push_str(code);
                    if !code.ends_with('\n') {
                        own_body.push('\n');
                    }
                }
                _ => {}
            }
        }
    }

    if !own_body.trim().is_empty() {
        out.push(Entry {
            kind: EntryKind::Node { source, body: own_body },
            conditions: conditions.clone(),
        });
    }

    stack.remove(&source);
}

/// Pass 1 — stable-partition external/layer-only entries ahead of node
/// entries, preserving relative order within each group. CSS requires
/// `@import` to precede all other rules; this keeps that true even after
/// the DFS interleaved imports with the files that trigger them.
fn hoist_external_and_layers(entries: &mut Vec<Entry>) {
    let has_external = entries.iter().any(|e| matches!(e.kind, EntryKind::External(_)));
    if !has_external {
        return;
    }
    let (mut leading, mut rest): (Vec<Entry>, Vec<Entry>) = (Vec::new(), Vec::new());
    for entry in entries.drain(..) {
        match entry.kind {
            EntryKind::External(_) | EntryKind::LayerStub(_) => leading.push(entry),
            EntryKind::Node { .. } => rest.push(entry),
        }
    }
    leading.append(&mut rest);
    *entries = leading;
}

/// Pass 2 — walking backward, an earlier entry whose conditions are a
/// superset (not a strict subset) of a later, identical-target entry's
/// conditions is redundant: the later occurrence already emits the rule
/// under at least as broad a context. Keep only its layer-ordering effect.
fn dedup_last_wins(entries: &mut [Entry]) {
    for i in (0..entries.len()).rev() {
        let Some(id_i) = identity(&entries[i].kind) else { continue };
        let shadowed = entries[i + 1..].iter().any(|later| {
            identity(&later.kind).as_ref() == Some(&id_i) && later.conditions.is_prefix_of(&entries[i].conditions)
        });
        if shadowed {
            let names = entries[i]
                .conditions
                .layers
                .iter()
                .map(|l| flat_layer_name(l))
                .filter(|n| !n.is_empty())
                .collect();
            entries[i].kind = EntryKind::LayerStub(names);
        }
    }
}

/// Pass 3 — walking forward, drop a layer-stub whose layer-name set was
/// already established by an earlier kept entry under a condition stack
/// that is a prefix of this one's (nothing new is declared).
fn dedup_layers_forward(entries: &mut Vec<Entry>) {
    let mut kept: Vec<Entry> = Vec::with_capacity(entries.len());
    for entry in entries.drain(..) {
        if let EntryKind::LayerStub(names) = &entry.kind {
            let redundant = kept.iter().any(|prev| {
                prev.conditions.is_prefix_of(&entry.conditions)
                    && match &prev.kind {
                        EntryKind::LayerStub(prev_names) => prev_names == names,
                        EntryKind::Node { .. } | EntryKind::External(_) => false,
                    }
            });
            if redundant {
                continue;
            }
            if names.is_empty() {
                if let Some(EntryKind::LayerStub(next_names)) = kept.last().map(|e| &e.kind) {
                    if next_names.is_empty() {
                        // an empty stub immediately after another empty
                        // stub carries no new information either.
                        continue;
                    }
                }
            }
        }
        kept.push(entry);
    }
    *entries = kept;
}

/// Pass 4 — coalesce consecutive layer-stubs under equal condition stacks
/// into one, deduplicating their layer names.
fn merge_adjacent_layer_stubs(entries: &mut Vec<Entry>) {
    let mut merged: Vec<Entry> = Vec::with_capacity(entries.len());
    for entry in entries.drain(..) {
        if let EntryKind::LayerStub(names) = &entry.kind {
            if let Some(last) = merged.last_mut() {
                if last.conditions == entry.conditions {
                    if let EntryKind::LayerStub(last_names) = &mut last.kind {
                        for n in names {
                            if !last_names.contains(n) {
                                last_names.push(n.clone());
                            }
                        }
                        continue;
                    }
                }
            }
        }
        merged.push(entry);
    }
    *entries = merged;
}

fn render_entry(entry: &Entry) -> String {
    match &entry.kind {
        EntryKind::Node { body, .. } => wrap(&entry.conditions, body.clone()),
        EntryKind::External(path) => render_external_import(path, &entry.conditions),
        EntryKind::LayerStub(names) => {
            if names.is_empty() {
                String::new()
            } else {
                format!("@layer {};\n", names.join(", "))
            }
        }
    }
}

/// Wraps `inner` in nested `@layer`/`@supports`/`@media` blocks, layer
/// outermost and media innermost (the order the conditions appear in an
/// `@import` prelude).
fn wrap(conditions: &Conditions, inner: String) -> String {
    let mut s = inner;
    for media in conditions.media.iter().rev() {
        s = format!("@media {media} {{\n{s}}}\n");
    }
    for supports in conditions.supports.iter().rev() {
        s = format!("@supports ({supports}) {{\n{s}}}\n");
    }
    for layer in conditions.layers.iter().rev() {
        let name = flat_layer_name(layer);
        if name.is_empty() {
            s = format!("@layer {{\n{s}}}\n");
        } else {
            s = format!("@layer {name} {{\n{s}}}\n");
        }
    }
    s
}

/// Renders an external `@import`, expressing its conditions directly on
/// the import statement when there's at most one of each kind. When the
/// accumulated layer stack is deeper than that (two distinct `@layer`s
/// wrap the same external target through different paths), a single
/// `@import` can't express it: peel the outer layers into a real wrapping
/// block and nest the remaining condition in a data-URL stylesheet, since
/// that's the only place CSS lets an `@import`'s own modifiers be
/// anything but a flat list.
fn render_external_import(path: &str, conditions: &Conditions) -> String {
    if conditions.layers.len() <= 1 {
        return render_flat_import(path, conditions);
    }

    let outer = Conditions {
        layers: conditions.layers[..conditions.layers.len() - 1].to_vec(),
        supports: Vec::new(),
        media: Vec::new(),
    };
    let inner = Conditions {
        layers: vec![conditions.layers[conditions.layers.len() - 1].clone()],
        supports: conditions.supports.clone(),
        media: conditions.media.clone(),
    };
    let inner_import = render_flat_import(path, &inner);
    let data_url = format!("data:text/css;charset=utf-8,{}", percent_encode_data_url(&inner_import));
    wrap(&outer, format!("@import url(\"{data_url}\");\n"))
}

fn render_flat_import(path: &str, conditions: &Conditions) -> String {
    let mut s = format!("@import \"{path}\"");
    if let Some(layer) = conditions.layers.first() {
        let name = flat_layer_name(layer);
        if name.is_empty() {
            s.push_str(" layer");
        } else {
            s.push_str(&format!(" layer({name})"));
        }
    }
    if let Some(supports) = conditions.supports.first() {
        s.push_str(&format!(" supports({supports})"));
    }
    if let Some(media) = conditions.media.first() {
        s.push(' ');
        s.push_str(media);
    }
    s.push_str(";\n");
    s
}

/// Minimal percent-encoding for embedding a CSS fragment inside a
/// `data:` URL: only the bytes that would otherwise break out of the
/// `url("...")` quoting or the URL grammar itself need escaping.
fn percent_encode_data_url(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("%22"),
            b'#' => out.push_str("%23"),
            b'%' => out.push_str("%25"),
            b'\n' => out.push_str("%0A"),
            b' ' => out.push_str("%20"),
            _ => out.push(b as char),
        }
    }
    out
}
