//! The intermediate representation produced by the lowerer (C3) and carried,
//! mutated in place, through every later pass.
//!
//! Expression nodes live in one flat arena (`IRProgram::exprs`) addressed by
//! [`ExprId`] rather than as an owned recursive tree: IR rewriting (C7)
//! frequently needs to splice a spindle body into a call site and retarget a
//! handful of leaf nodes, which is an O(1) slice append plus pointer-sized
//! rewrites against an arena, not a tree clone. `ExprId` is a dense `u32`
//! handle instead of a pointer so the whole program serializes as plain data
//! (§6.2) with no lifetime to thread through the pipeline.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Index into [`IRProgram::exprs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub u32);

/// Index into [`IRProgram::bundles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BundleId(pub u32);

/// Index into [`IRProgram::resources`] (image/audio file paths).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u32);

/// Index into [`IRProgram::texts`] (inline text/shader-source literals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextId(pub u32);

/// Identifies one cache node, assigned by the cache analyzer (C8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnOp {
    Neg,
    Not,
}

/// The coordinate domains the `me` bundle exposes (§4.3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Coord {
    X,
    Y,
    U,
    V,
    W,
    H,
    T,
    I,
    Rate,
    Duration,
}

impl Coord {
    /// The index a `me` lookup resolves to, per the fixed coordinate table.
    #[must_use]
    pub fn slot(self) -> u32 {
        match self {
            Self::X | Self::I => 0,
            Self::Y => 1,
            Self::U => 2,
            Self::V => 3,
            Self::W => 4,
            Self::H => 5,
            Self::T => 6,
            Self::Rate => 7,
            Self::Duration => 8,
        }
    }
}

/// One arena-resident IR expression node. Variants mirror [`crate::ast::Expr`]
/// after name resolution: identifiers have become [`StrandRef`]/[`MeRef`]
/// lookups, spindle calls have become [`Call`] with a resolved target, and
/// the `select`/resource/noise builtins are their own variants so later
/// passes never need to string-match a callee name again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IRExpr {
    Number {
        value: f64,
    },
    /// A reference to one strand of a bundle already lowered in this
    /// program (or a spindle-local temporary during lowering, before
    /// inlining rewrites it away).
    StrandRef {
        bundle: BundleId,
        strand: u32,
    },
    /// `me.<coord>`.
    MeRef {
        coord: Coord,
    },
    /// A spindle parameter reference, valid only until spindle inlining
    /// (C7) substitutes the call-site argument expression in its place.
    /// Never present in a program handed to the interpreter (C9).
    Param {
        index: u32,
    },
    Binary {
        op: BinOp,
        left: ExprId,
        right: ExprId,
    },
    Unary {
        op: UnOp,
        operand: ExprId,
    },
    /// A fully inlined spindle call becomes a plain expression tree, so by
    /// the time the IR rewriter (C7) is done, `Call` only remains for
    /// builtins recognized at lowering time (math functions, `select`).
    Call {
        name: CompactStr,
        args: SmallVec<[ExprId; 4]>,
    },
    /// An explicit cache read introduced by the cache analyzer (C8) (or by
    /// the IR rewriter, C7, turning a self-referential temporal remap into
    /// one) — `tap` frames back from the present sample/frame, always `<= 0`.
    CacheRead {
        cache: CacheId,
        tap: i64,
    },
    /// `image(path)` / `audio(path)` — `path` is interned in
    /// [`IRProgram::resources`].
    Resource {
        resource: ResourceId,
    },
    /// A string literal that only ever appears as a resource-builtin
    /// argument; interned in [`IRProgram::texts`] so the IR never repeats
    /// path text inline.
    Text {
        text: TextId,
    },
}

/// A small inline string, avoiding a heap allocation for the short builtin
/// names (`sin`, `select`, `noise`, ...) that dominate `Call::name`.
pub type CompactStr = smallvec::SmallVec<[u8; 16]>;

/// Builds a [`CompactStr`] from a `&str`.
#[must_use]
pub fn compact(s: &str) -> CompactStr {
    CompactStr::from_slice(s.as_bytes())
}

/// Reads a [`CompactStr`] back out as a `&str`. Panics only if a non-UTF8
/// byte sequence was smuggled in, which never happens since [`compact`] is
/// the sole constructor used by this crate.
#[must_use]
pub fn as_str(s: &CompactStr) -> &str {
    std::str::from_utf8(s).expect("CompactStr is always built from valid UTF-8")
}

/// Where a bundle's outputs execute: determined by the annotation pass (C5)
/// from its builtin usage and propagated along the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Domain {
    Visual,
    Audio,
    Neutral,
}

/// Whether a bundle's expressions are safe to re-evaluate freely, grounded
/// purely in whether they reach a cache read or a hardware-input builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Purity {
    Pure,
    Stateful,
    ExternalInput,
}

/// One lowered bundle: a named, ordered set of strands plus the annotations
/// later passes attach to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IRBundle {
    pub name: String,
    /// One `ExprId` per strand, in declaration order (strand `i` is
    /// `strands[i]`).
    pub strands: Vec<ExprId>,
    /// `display`/`play`/user bundle name the output strands render through,
    /// `None` for a bundle that is never sunk.
    pub sink: Option<SinkKind>,
    pub domain: Option<Domain>,
    pub purity: Option<Purity>,
    /// Names of bundles this one's expressions read from directly (not
    /// transitively); filled in by the dependency graph (C4).
    pub depends_on: Vec<BundleId>,
    /// Which swatch (C6) this bundle was assigned to; `None` before
    /// partitioning runs.
    pub swatch: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SinkKind {
    Display,
    Play,
}

/// A cache node: an explicit temporal history buffer, one per distinct
/// `(bundle, strand)` pair the rewriter and analyzer collapse
/// self-reference or an explicit remap tap into (C7, C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDescriptor {
    /// This cache's own position in `IRProgram::caches`, stamped at creation
    /// so external backends can address it without re-deriving the index.
    pub index: u32,
    pub bundle: BundleId,
    pub strand_index: u32,
    /// The domain of the strand(s) that read this cache. `Neutral` until
    /// the cache analyzer (C8) runs.
    pub domain: Domain,
    /// How many samples/frames of history this cache must retain; the
    /// deepest `tap` any `CacheRead` against it uses, rounded up to a power
    /// of two (minimum 2). Filled in provisionally by the IR rewriter (C7)
    /// and finalized by the cache analyzer (C8).
    pub history_size: u32,
    /// The deepest (most negative) tap any `CacheRead` against this cache
    /// uses. Provisional until the cache analyzer (C8) runs.
    pub tap: i64,
    /// Whether this cache was introduced to break a genuine dependency cycle
    /// (a bundle reading its own, or a mutual group's, unresolved current
    /// value) rather than created purely for an explicit historical tap on
    /// an otherwise acyclic read.
    pub has_self_reference: bool,
}

/// A domain-homogeneous execution unit assembled by the partitioner (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swatch {
    /// This swatch's own position in `IRProgram::swatches`.
    pub id: u32,
    pub domain: Domain,
    /// Which execution backend runs this swatch: `"visual"`, `"audio"`, or
    /// `"neutral"`, mirroring `domain`.
    pub backend: String,
    /// Bundles assigned to this swatch, in execution order.
    pub bundles: Vec<BundleId>,
    /// Strands read from a different swatch, paired with the swatch that
    /// produces them.
    pub input_buffers: Vec<CrossDomainBuffer>,
    /// Strands this swatch produces that a different swatch reads.
    pub output_buffers: Vec<CrossDomainBuffer>,
    /// Whether this swatch contains a `display` or `play` sink.
    pub is_sink: bool,
}

impl Domain {
    #[must_use]
    pub fn backend_name(self) -> &'static str {
        match self {
            Domain::Visual => "visual",
            Domain::Audio => "audio",
            Domain::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossDomainBuffer {
    pub bundle: BundleId,
    pub strand: u32,
    pub other_swatch: u32,
}

/// The complete lowered program: every pass from C3 onward reads and writes
/// this one structure in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IRProgram {
    pub bundles: Vec<IRBundle>,
    /// Name → index, kept in sync with `bundles` by every mutating pass.
    #[serde(skip)]
    pub bundle_index: IndexMap<String, BundleId>,
    pub exprs: Vec<IRExpr>,
    pub resources: Vec<String>,
    pub texts: Vec<String>,
    pub caches: Vec<CacheDescriptor>,
    pub swatches: Vec<Swatch>,
    /// Topological execution order over `bundles`, filled in by the
    /// dependency graph (C4) and re-validated after rewriting (C7).
    pub order: Vec<BundleId>,
}

impl IRProgram {
    #[must_use]
    pub fn push_expr(&mut self, expr: IRExpr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    #[must_use]
    pub fn expr(&self, id: ExprId) -> &IRExpr {
        &self.exprs[id.0 as usize]
    }

    /// Overwrites an existing arena slot in place. Used by the IR rewriter
    /// (C7) to splice a `CacheRead` in over a `StrandRef` without
    /// renumbering every other node's `ExprId`.
    pub fn set_expr(&mut self, id: ExprId, expr: IRExpr) {
        self.exprs[id.0 as usize] = expr;
    }

    #[must_use]
    pub fn bundle(&self, id: BundleId) -> &IRBundle {
        &self.bundles[id.0 as usize]
    }

    pub fn bundle_mut(&mut self, id: BundleId) -> &mut IRBundle {
        &mut self.bundles[id.0 as usize]
    }

    #[must_use]
    pub fn bundle_id(&self, name: &str) -> Option<BundleId> {
        self.bundle_index.get(name).copied()
    }

    /// Interns a resource path, returning the existing id if already seen
    /// (§3.5 rule 6: resource ids are dense and insertion-ordered).
    pub fn intern_resource(&mut self, path: &str) -> ResourceId {
        if let Some(idx) = self.resources.iter().position(|p| p == path) {
            return ResourceId(idx as u32);
        }
        let id = ResourceId(self.resources.len() as u32);
        self.resources.push(path.to_owned());
        id
    }

    pub fn intern_text(&mut self, text: &str) -> TextId {
        if let Some(idx) = self.texts.iter().position(|t| t == text) {
            return TextId(idx as u32);
        }
        let id = TextId(self.texts.len() as u32);
        self.texts.push(text.to_owned());
        id
    }

    /// Returns the cache targeting `(bundle, strand_index)`, creating one if
    /// this is the first read at this source. Every tap depth against the
    /// same source strand shares one cache, so history/domain finalization
    /// (C8) only ever has to size one ring buffer per source.
    ///
    /// `is_self_reference` marks this particular read as part of breaking a
    /// genuine dependency cycle (see [`CacheDescriptor::has_self_reference`]);
    /// it's OR'd into whatever the cache already recorded, since a cache can
    /// be reached by both an implicit cycle cut and an explicit remap tap
    /// against the same source strand.
    pub fn get_or_create_cache(&mut self, bundle: BundleId, strand_index: u32, is_self_reference: bool) -> CacheId {
        if let Some(idx) = self.caches.iter().position(|c| c.bundle == bundle && c.strand_index == strand_index) {
            self.caches[idx].has_self_reference |= is_self_reference;
            return CacheId(idx as u32);
        }
        let id = CacheId(self.caches.len() as u32);
        self.caches.push(CacheDescriptor {
            index: id.0,
            bundle,
            strand_index,
            domain: Domain::Neutral,
            history_size: 2,
            tap: -1,
            has_self_reference: is_self_reference,
        });
        id
    }
}
