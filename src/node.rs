//! Node kinds and identifiers.
//!
//! Every registered entity (type, component, model, format, conversion) is a
//! node owned by the [`Registry`](crate::registry::Registry) arena. Nodes
//! reference each other exclusively through the dense integer ids defined
//! here; no node owns another. Equal name implies equal node, and ids are
//! stable for the life of the instance.
//!
//! ## Invariants
//! - Names are unique within a kind.
//! - Ids are dense: `id.as_usize()` indexes the per-kind arena directly.
//! - Nodes are immutable after registration; the only fields written later
//!   are the auxiliary `from_list` adjacency indices, which the registry
//!   maintains while holding its write lock.

use bitflags::bitflags;

use crate::conversion::ConvId;

/// Index of a registered numeric type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);
impl TypeId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Index of a registered component (channel).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u32);
impl ComponentId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Index of a registered color model.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelId(pub u32);
impl ModelId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Index of a registered pixel format.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatId(pub u32);
impl FormatId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// The class tag shared by every node kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Type,
    Component,
    Model,
    Format,
    Conversion,
    Fish,
}

/// A reference to a conversion endpoint. Conversions connect two nodes of
/// the *same* kind; crossings between layers are synthesized by the registry
/// (see `registry::Registry::register_format`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Type(TypeId),
    Model(ModelId),
    Format(FormatId),
}

impl Endpoint {
    pub fn kind(self) -> NodeKind {
        match self {
            Endpoint::Type(_) => NodeKind::Type,
            Endpoint::Model(_) => NodeKind::Model,
            Endpoint::Format(_) => NodeKind::Format,
        }
    }
}

/// Chroma sampling of one component. Everything built in is 1:1; the field
/// exists so packed sub-sampled layouts can be described.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Sampling {
    pub horizontal: u8,
    pub vertical: u8,
}

impl Default for Sampling {
    fn default() -> Self {
        Sampling { horizontal: 1, vertical: 1 }
    }
}

bitflags! {
    /// Semantic flags carried by a color model.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ModelFlags: u32 {
        /// Component values are premultiplied by alpha (associated alpha).
        const PREMULTIPLIED = 1 << 0;
        /// The model is perceptual (non-linear in light intensity).
        const PERCEPTUAL = 1 << 1;
        /// The model carries an alpha component.
        const ALPHA = 1 << 2;
    }
}

/// A named scalar encoding: `u8`, `u16`, `half`, `float`, `double`, and the
/// scaled CIE integer encodings. The numeric semantics of a type live in its
/// registered conversions to and from `double`.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeNode {
    pub name: String,
    pub bits: u32,
    /// Integer vs floating point.
    pub integer: bool,
    pub signed: bool,
    /// False for gamma/companded encodings.
    pub linear: bool,
    pub(crate) from_list: Vec<ConvId>,
}

impl TypeNode {
    #[inline]
    pub fn bytes(&self) -> usize {
        (self.bits / 8) as usize
    }
}

/// A named channel. Carries no numeric content; identity is the name.
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentNode {
    pub name: String,
}

/// An ordered set of distinct components plus semantic flags.
///
/// Each model owns a canonical format (`"<name> double"`, packed doubles in
/// model component order) which the registry creates alongside the model.
/// Layer crossings in planned paths always pass through canonical formats.
#[derive(Clone, Debug)]
pub struct ModelNode {
    pub name: String,
    pub components: Vec<ComponentId>,
    pub flags: ModelFlags,
    pub space: Option<String>,
    /// The model's canonical double format, filled in during registration.
    pub(crate) canonical: FormatId,
    /// Model-level conversions out of this model.
    pub(crate) from_list: Vec<ConvId>,
}

impl ModelNode {
    #[inline]
    pub fn n_components(&self) -> usize {
        self.components.len()
    }
}

/// A fully-qualified packed pixel layout.
///
/// The component list is the *byte order* of the format and must be a
/// permutation of (a subset of, for the packed cairo-style layouts) the
/// model's components. `bytes_per_pixel` and the per-component byte offsets
/// are computed at registration, never stored redundantly by callers.
#[derive(Clone, Debug)]
pub struct FormatNode {
    pub name: String,
    pub model: ModelId,
    pub components: Vec<ComponentId>,
    pub types: Vec<TypeId>,
    pub sampling: Vec<Sampling>,
    pub bytes_per_pixel: usize,
    pub(crate) byte_offsets: Vec<usize>,
    pub planar: bool,
    pub palette: bool,
    pub space: Option<String>,
    /// Canonical encoding string; defaults to the registered name.
    pub encoding: String,
    /// Set when this format is a model's canonical double encoding.
    pub(crate) canonical_for: Option<ModelId>,
    /// Synthesized crossings into and out of the model layer.
    pub(crate) unpack: Option<ConvId>,
    pub(crate) pack: Option<ConvId>,
    /// Conversions whose source is this format (planner adjacency).
    pub(crate) from_list: Vec<ConvId>,
}

impl FormatNode {
    #[inline]
    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_canonical(&self) -> bool {
        self.canonical_for.is_some()
    }
}
