//! Graph store: files, parts, symbols, import records.
//!
//! Owns the linker's mutable view of the module graph. The graph is built
//! once from parser output, mutated in place during [`crate::linker::scan`],
//! and treated as read-only from tree-shaking onward.

use rustc_hash::FxHashMap as HashMap;

/// Index of a source file in the graph's flat `files` array.
pub type SourceIndex = u32;

/// Index of a part within a single file's `parts` array.
pub type PartIndex = u32;

/// Reference to a symbol: which source declared it, and its slot within
/// that source's symbol array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolRef {
    pub source_index: SourceIndex,
    pub inner_index: u32,
}

impl SymbolRef {
    pub const INVALID: SymbolRef = SymbolRef {
        source_index: u32::MAX,
        inner_index: u32::MAX,
    };

    #[must_use]
    pub fn new(source_index: SourceIndex, inner_index: u32) -> Self {
        Self {
            source_index,
            inner_index,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl Default for SymbolRef {
    fn default() -> Self {
        Self::INVALID
    }
}

/// What kind of binding a symbol represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A top-level `var`/`function` that was never declared with a binding
    /// form the parser understood ahead of time (e.g. implicit global).
    Unbound,
    /// A `var`/`function` hoisted to the top of its scope.
    Hoisted,
    /// A `class` declaration.
    Class,
    /// The local binding created by an `import` statement.
    Import,
    /// A CSS "composes" property that gets mangled alongside JS properties.
    MangledProp,
    /// A statement label (`outer: for (...) {}`).
    Label,
    /// A TypeScript `namespace`/`enum` merged declaration.
    TsNamespace,
    /// Catch-all for let/const, function params, generated temporaries.
    Other,
}

bitflags::bitflags! {
    /// Per-symbol behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolFlags: u16 {
        /// Set on symbols created by the linker itself (e.g. wrapper
        /// closures, runtime helpers) that must never collide-rename away
        /// from their chosen name.
        const MUST_NOT_BE_RENAMED = 1 << 0;
        /// The `import` binding is a namespace import (`import * as ns`).
        const IS_IMPORT_NAMESPACE = 1 << 1;
        /// Set once this symbol has been merged into another via
        /// [`Symbols::merge`]; `link` is meaningful only when this is set.
        const HAS_LINK = 1 << 2;
        /// TypeScript `enum`/const-function/identity-function inlining
        /// candidates computed in Scan step 5.
        const COULD_BE_ENUM_INLINED = 1 << 3;
    }
}

/// A single symbol: one declared or referenced identifier.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub original_name: String,
    pub kind: SymbolKind,
    pub flags: SymbolFlags,
    /// Union-find parent. Valid only when `flags.HAS_LINK` is set.
    pub link: SymbolRef,
    pub use_count: u32,
    /// Chunk that declares this symbol; set during cross-chunk binding.
    /// `None` until then.
    pub chunk_index: Option<u32>,
    /// For namespace imports: alias used for member access rewriting.
    pub namespace_alias: Option<String>,
}

impl Symbol {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            original_name: name.into(),
            kind,
            flags: SymbolFlags::empty(),
            link: SymbolRef::INVALID,
            use_count: 0,
            chunk_index: None,
            namespace_alias: None,
        }
    }

    #[must_use]
    pub fn must_not_be_renamed(&self) -> bool {
        self.flags.contains(SymbolFlags::MUST_NOT_BE_RENAMED)
    }
}

/// The symbol table: a concatenation of per-source symbol arrays.
///
/// `FollowSymbols` path-compresses the union-find `link` chain; per the
/// concurrency model this must run to completion, single-threaded, before
/// any parallel reader phase touches `link`.
#[derive(Debug, Default)]
pub struct Symbols {
    per_source: Vec<Vec<Symbol>>,
}

impl Symbols {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a symbol array for a newly added source.
    pub fn add_source(&mut self) -> SourceIndex {
        self.per_source.push(Vec::new());
        (self.per_source.len() - 1) as SourceIndex
    }

    pub fn generate(&mut self, source: SourceIndex, symbol: Symbol) -> SymbolRef {
        let arr = &mut self.per_source[source as usize];
        let inner = arr.len() as u32;
        arr.push(symbol);
        SymbolRef::new(source, inner)
    }

    #[must_use]
    pub fn get(&self, r: SymbolRef) -> &Symbol {
        &self.per_source[r.source_index as usize][r.inner_index as usize]
    }

    pub fn get_mut(&mut self, r: SymbolRef) -> &mut Symbol {
        &mut self.per_source[r.source_index as usize][r.inner_index as usize]
    }

    /// Union-find merge: `new` becomes the canonical representative of
    /// `old`. Returns the new canonical ref. Any renaming restriction on
    /// `old` is inherited by `new`.
    pub fn merge(&mut self, old: SymbolRef, new: SymbolRef) -> SymbolRef {
        let canonical = self.follow(new);
        let must_not_be_renamed = self.get(old).must_not_be_renamed();
        let old_sym = self.get_mut(old);
        old_sym.link = canonical;
        old_sym.flags.insert(SymbolFlags::HAS_LINK);
        if must_not_be_renamed {
            self.get_mut(canonical)
                .flags
                .insert(SymbolFlags::MUST_NOT_BE_RENAMED);
        }
        canonical
    }

    /// Follow the union-find chain to the canonical ref, path-compressing
    /// as it goes. Must only be invoked while single-threaded; parallel
    /// stages read symbols but never mutate links.
    pub fn follow(&mut self, r: SymbolRef) -> SymbolRef {
        let mut cur = r;
        loop {
            let sym = self.get(cur);
            if !sym.flags.contains(SymbolFlags::HAS_LINK) {
                break;
            }
            cur = sym.link;
        }
        // Path compression: point every node on the walked chain directly
        // at `cur`.
        let mut walk = r;
        while walk != cur {
            let next = self.get(walk).link;
            self.get_mut(walk).link = cur;
            walk = next;
        }
        cur
    }

    /// Follow every symbol's link chain to completion. Run once,
    /// single-threaded, before any parallel phase reads `link`.
    pub fn follow_all(&mut self) {
        for source in 0..self.per_source.len() as u32 {
            for inner in 0..self.per_source[source as usize].len() as u32 {
                self.follow(SymbolRef::new(source, inner));
            }
        }
    }
}

/// Kind of import record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import ... from '...'` / `export ... from '...'`.
    Stmt,
    /// `require('...')`.
    Require,
    /// `import('...')`.
    Dynamic,
    /// CSS `@import`.
    At,
    /// CSS Modules `composes: x from '...'`.
    ComposesFrom,
}

/// A single named import binding carried by an import record
/// (`import { x as y } from '...'`, or a CSS `composes` property).
#[derive(Debug, Clone)]
pub struct ImportItem {
    /// Name as exported by the target (or `"*"` / `"default"`).
    pub imported_alias: String,
    /// Local symbol created for this binding.
    pub local: SymbolRef,
}

/// An import/export-from record. Lives on the importing file.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub kind: ImportKind,
    /// Resolved target, if not external.
    pub source_index: Option<SourceIndex>,
    /// Specifier text as written in source, kept for diagnostics.
    pub path: String,
    /// Named bindings imported through this record (empty for a bare
    /// `import 'p'` or a full `export * from 'p'`).
    pub items: Vec<ImportItem>,
    /// Symbol standing for the whole module namespace (`import * as ns`,
    /// or the synthetic namespace object used for CJS interop).
    pub namespace_ref: SymbolRef,
    pub wrap_with_to_esm: bool,
    pub wrap_with_to_cjs: bool,
    pub call_runtime_require: bool,
    /// `@import url layer(<name-path>)` / bare `layer` (anonymous layer,
    /// represented as `Some(vec![])`). Only meaningful for `ImportKind::At`.
    pub css_layer: Option<Vec<String>>,
    /// `@import url supports(<condition>)`.
    pub css_supports: Option<String>,
    /// `@import url <media-query>`.
    pub css_media: Option<String>,
}

impl ImportRecord {
    #[must_use]
    pub fn new(kind: ImportKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            source_index: None,
            path: path.into(),
            items: Vec::new(),
            namespace_ref: SymbolRef::INVALID,
            wrap_with_to_esm: false,
            wrap_with_to_cjs: false,
            call_runtime_require: false,
            css_layer: None,
            css_supports: None,
            css_media: None,
        }
    }
}

/// A statement form the linker needs to recognize and possibly rewrite.
/// Everything else is carried as opaque, already-rendered source text —
/// the linker doesn't re-derive a full AST pretty-printer, it rewrites
/// only import/export statements and passes the rest through.
#[derive(Debug, Clone)]
pub enum PartStmt {
    /// `import 'p'` / `import {x} from 'p'` / `import * as ns from 'p'`.
    Import { record_index: u32 },
    /// `export * from 'p'`.
    ExportStar { record_index: u32 },
    /// `export default <expr>`; `expr_code` is the already-rendered RHS.
    ExportDefault { expr_code: String },
    /// `export { a, b as c }` (no `from` clause).
    ExportNamed { names: Vec<(String, SymbolRef)> },
    /// Any other statement, carried as opaque rendered source.
    Opaque(String),
}

/// Maximal independently tree-shakable unit of a file.
#[derive(Debug, Clone, Default)]
pub struct Part {
    pub stmts: Vec<PartStmt>,
    /// Symbols this part declares at top level.
    pub declared_symbols: Vec<SymbolRef>,
    /// Symbols this part reads or writes (after import/export resolution,
    /// already pointed at canonical refs via `Symbols::follow`).
    pub symbol_uses: Vec<SymbolRef>,
    /// Other parts (possibly in other files, carried as `(source, part)`)
    /// this part depends on.
    pub dependencies: Vec<(SourceIndex, PartIndex)>,
    /// `false` means this part has no observable side effect and may be
    /// dropped if nothing depends on it (tree shaking).
    pub can_be_removed_if_unused: bool,
    /// Set once liveness has been computed.
    pub is_live: bool,
}

/// A file's representation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRepr {
    Js,
    Css,
    /// No AST; just a URL to copy through untouched.
    Copy,
}

/// Export-ness of a JS file. Mutable during Scan, frozen after step 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportsKind {
    None,
    CommonJs,
    Esm,
    EsmWithDynamicFallback,
}

/// Whether (and how) a file's top-level code must be wrapped in a
/// runtime-registered closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrap {
    None,
    Cjs,
    Esm,
}

/// A bitset over entry points. Two files sharing an `EntryBits` are
/// assigned to the same chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EntryBits(Vec<u64>);

impl EntryBits {
    #[must_use]
    pub fn with_capacity(entry_count: usize) -> Self {
        Self(vec![0u64; entry_count.div_ceil(64).max(1)])
    }

    pub fn set(&mut self, bit: usize) {
        self.0[bit / 64] |= 1 << (bit % 64);
    }

    #[must_use]
    pub fn get(&self, bit: usize) -> bool {
        self.0[bit / 64] & (1 << (bit % 64)) != 0
    }

    /// Canonical string key used to group files into chunks.
    #[must_use]
    pub fn key(&self) -> String {
        self.0
            .iter()
            .map(|w| format!("{w:016x}"))
            .collect::<Vec<_>>()
            .join("")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// Iterate over set entry-point indices.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        let total_bits = self.0.len() * 64;
        (0..total_bits).filter(move |&i| self.get(i))
    }
}

/// A file in the graph. JS and CSS files carry parts; Copy files carry
/// only a URL and are not modeled further here.
#[derive(Debug, Clone)]
pub struct File {
    pub pretty_path: String,
    pub repr: FileRepr,
    pub parts: Vec<Part>,
    pub import_records: Vec<ImportRecord>,
    pub exports_kind: ExportsKind,
    pub wrap: Wrap,
    pub entry_bits: EntryBits,
    /// Sorted, deduplicated alias -> canonical-symbol map. Populated in
    /// Scan step 3.
    pub resolved_exports: HashMap<String, ResolvedExport>,
    /// `export * from 'p'` records that could not be statically resolved
    /// (target is CJS, external, or itself has a dynamic fallback).
    pub has_dynamic_exports_due_to_export_star: bool,
    /// Index into `parts` of the synthetic wrapper-declaration part, if
    /// this file is wrapped.
    pub wrapper_part_index: Option<PartIndex>,
    /// Whether parsing determined this file has no side effects
    /// (`"sideEffects": false` in package.json, or a `/*#__PURE__*/`-style
    /// annotation at module scope).
    pub side_effects_free: bool,
    pub is_entry_point: bool,
    /// Minimum DFS distance from any entry point; used as an in-chunk sort
    /// key.
    pub distance_from_entry_point: u32,
    pub is_live: bool,
}

impl File {
    #[must_use]
    pub fn new(pretty_path: impl Into<String>, repr: FileRepr) -> Self {
        Self {
            pretty_path: pretty_path.into(),
            repr,
            parts: vec![Part::default()], // part 0 reserved for namespace export
            import_records: Vec::new(),
            exports_kind: ExportsKind::None,
            wrap: Wrap::None,
            entry_bits: EntryBits::default(),
            resolved_exports: HashMap::default(),
            has_dynamic_exports_due_to_export_star: false,
            wrapper_part_index: None,
            side_effects_free: false,
            is_entry_point: false,
            distance_from_entry_point: u32::MAX,
            is_live: false,
        }
    }
}

/// A resolved named export.
#[derive(Debug, Clone)]
pub struct ResolvedExport {
    pub source_index: SourceIndex,
    pub symbol_ref: SymbolRef,
    /// Set when a second `export *` resolved the same alias to a
    /// different source; surfaced as `AmbiguousImport` only if someone
    /// actually imports this alias.
    pub potentially_ambiguous: Option<SourceIndex>,
}

/// The module graph: all files, plus the shared symbol table.
#[derive(Debug, Default)]
pub struct Graph {
    pub files: Vec<File>,
    pub symbols: Symbols,
    pub entry_point_count: usize,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, file: File) -> SourceIndex {
        let idx = self.symbols.add_source();
        debug_assert_eq!(idx as usize, self.files.len());
        self.files.push(file);
        idx
    }

    #[must_use]
    pub fn file(&self, i: SourceIndex) -> &File {
        &self.files[i as usize]
    }

    pub fn file_mut(&mut self, i: SourceIndex) -> &mut File {
        &mut self.files[i as usize]
    }

    #[must_use]
    pub fn symbol(&self, r: SymbolRef) -> &Symbol {
        self.symbols.get(r)
    }

    pub fn add_part(&mut self, source: SourceIndex, part: Part) -> PartIndex {
        let file = self.file_mut(source);
        let idx = file.parts.len() as PartIndex;
        file.parts.push(part);
        idx
    }

    pub fn generate_new_symbol(
        &mut self,
        source: SourceIndex,
        kind: SymbolKind,
        name: impl Into<String>,
    ) -> SymbolRef {
        self.symbols.generate(source, Symbol::new(name, kind))
    }

    /// Follow a symbol to its canonical ref (path-compressing). See
    /// [`Symbols::follow`] for the single-threaded requirement.
    pub fn follow(&mut self, r: SymbolRef) -> SymbolRef {
        self.symbols.follow(r)
    }

    pub fn merge_symbols(&mut self, old: SymbolRef, new: SymbolRef) -> SymbolRef {
        self.symbols.merge(old, new)
    }
}
