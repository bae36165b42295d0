//! The node registry: one arena per kind, name interning, and the
//! source-indexed adjacency the planner searches.
//!
//! ## Registration semantics
//! - Re-registering a name with identical attributes is idempotent and
//!   returns the existing id.
//! - Re-registering a name with divergent attributes fails with
//!   [`Error::DuplicateIncompatible`].
//! - Ids are dense and stable; nodes are immutable once published (the
//!   registry only appends to the auxiliary `from_list` indices afterwards).
//!
//! ## Canonical-encoding synthesis
//! Registering a model creates its canonical format `"<model> double"`
//! (packed doubles in model component order). Registering any other format
//! synthesizes reference-kind pack/unpack conversions between it and its
//! model's canonical format, composed component-wise from the registered
//! Type↔double plane workers. Registering a model↔model conversion mirrors
//! it as a reference conversion between the two canonical formats. The
//! planner therefore sees a single format-level graph in which every layer
//! crossing is an ordinary (expensive) edge.

use std::collections::HashMap;

use tracing::debug;

use crate::conversion::{
    run_plane_map, ConvId, ConversionNode, Kernel, KernelCtx, PlaneFn, PlaneOp, PlanePair,
};
use crate::node::{
    ComponentId, ComponentNode, Endpoint, FormatId, FormatNode, ModelFlags, ModelId, ModelNode,
    Sampling, TypeId, TypeNode,
};
use crate::Error;

/// Attributes of a numeric type registration.
#[derive(Copy, Clone, Debug)]
pub struct TypeSpec<'a> {
    pub name: &'a str,
    pub bits: u32,
    pub integer: bool,
    pub signed: bool,
    pub linear: bool,
}

/// Attributes of a model registration.
#[derive(Clone, Debug)]
pub struct ModelSpec<'a> {
    pub name: &'a str,
    pub components: &'a [ComponentId],
    pub flags: ModelFlags,
    pub space: Option<&'a str>,
}

/// Attributes of a format registration. `layout` is the byte order of the
/// packed pixel and must be a permutation of the model's components.
#[derive(Clone, Debug)]
pub struct FormatSpec<'a> {
    pub name: &'a str,
    pub model: ModelId,
    pub layout: &'a [(ComponentId, TypeId)],
    pub planar: bool,
    pub palette: bool,
    pub space: Option<&'a str>,
}

/// Attributes of a conversion registration.
pub struct ConversionSpec {
    pub src: Endpoint,
    pub dst: Endpoint,
    pub kernel: Kernel,
    pub cost: Option<f64>,
    pub error: Option<f64>,
    /// Plane worker; required on Type↔Type conversions that the registry
    /// should be able to compose into layer crossings.
    pub plane_fn: Option<PlaneFn>,
}

pub struct Registry {
    types: Vec<TypeNode>,
    components: Vec<ComponentNode>,
    models: Vec<ModelNode>,
    formats: Vec<FormatNode>,
    conversions: Vec<ConversionNode>,
    type_names: HashMap<String, TypeId>,
    component_names: HashMap<String, ComponentId>,
    model_names: HashMap<String, ModelId>,
    format_names: HashMap<String, FormatId>,
    conversion_names: HashMap<String, ConvId>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            types: Vec::new(),
            components: Vec::new(),
            models: Vec::new(),
            formats: Vec::new(),
            conversions: Vec::new(),
            type_names: HashMap::new(),
            component_names: HashMap::new(),
            model_names: HashMap::new(),
            format_names: HashMap::new(),
            conversion_names: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn ty(&self, id: TypeId) -> &TypeNode {
        &self.types[id.as_usize()]
    }

    #[inline]
    pub fn component(&self, id: ComponentId) -> &ComponentNode {
        &self.components[id.as_usize()]
    }

    #[inline]
    pub fn model(&self, id: ModelId) -> &ModelNode {
        &self.models[id.as_usize()]
    }

    #[inline]
    pub fn format(&self, id: FormatId) -> &FormatNode {
        &self.formats[id.as_usize()]
    }

    #[inline]
    pub fn conversion(&self, id: ConvId) -> &ConversionNode {
        &self.conversions[id.as_usize()]
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    pub fn lookup_component(&self, name: &str) -> Option<ComponentId> {
        self.component_names.get(name).copied()
    }

    pub fn lookup_model(&self, name: &str) -> Option<ModelId> {
        self.model_names.get(name).copied()
    }

    pub fn lookup_format(&self, name: &str) -> Option<FormatId> {
        self.format_names.get(name).copied()
    }

    pub fn lookup_conversion(&self, name: &str) -> Option<ConvId> {
        self.conversion_names.get(name).copied()
    }

    pub fn format_exists(&self, name: &str) -> bool {
        self.format_names.contains_key(name)
    }

    pub fn iter_types(&self) -> impl Iterator<Item = (TypeId, &TypeNode)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId(i as u32), t))
    }

    pub fn iter_components(&self) -> impl Iterator<Item = (ComponentId, &ComponentNode)> {
        self.components.iter().enumerate().map(|(i, c)| (ComponentId(i as u32), c))
    }

    pub fn iter_models(&self) -> impl Iterator<Item = (ModelId, &ModelNode)> {
        self.models.iter().enumerate().map(|(i, m)| (ModelId(i as u32), m))
    }

    pub fn iter_formats(&self) -> impl Iterator<Item = (FormatId, &FormatNode)> {
        self.formats.iter().enumerate().map(|(i, f)| (FormatId(i as u32), f))
    }

    pub fn iter_conversions(&self) -> impl Iterator<Item = (ConvId, &ConversionNode)> {
        self.conversions.iter().enumerate().map(|(i, c)| (ConvId(i as u32), c))
    }

    /// All formats registered for a model.
    pub fn formats_of_model(&self, model: ModelId) -> impl Iterator<Item = FormatId> + '_ {
        self.formats
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.model == model)
            .map(|(i, _)| FormatId(i as u32))
    }

    /// The canonical double format of a format's model.
    pub fn canonical_of(&self, format: FormatId) -> FormatId {
        self.model(self.format(format).model).canonical
    }

    pub fn endpoint_name(&self, ep: Endpoint) -> &str {
        match ep {
            Endpoint::Type(t) => &self.ty(t).name,
            Endpoint::Model(m) => &self.model(m).name,
            Endpoint::Format(f) => &self.format(f).name,
        }
    }

    /// Digest over the conversion set, used to invalidate persisted plans
    /// when the registry contents change between runs.
    pub fn conversion_digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for conv in &self.conversions {
            hasher.update(conv.name.as_bytes());
            hasher.update(b"\n");
        }
        *hasher.finalize().as_bytes()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub fn register_type(&mut self, spec: TypeSpec<'_>) -> Result<TypeId, Error> {
        if let Some(&id) = self.type_names.get(spec.name) {
            let existing = self.ty(id);
            if existing.bits == spec.bits
                && existing.integer == spec.integer
                && existing.signed == spec.signed
                && existing.linear == spec.linear
            {
                return Ok(id);
            }
            return Err(Error::DuplicateIncompatible { name: spec.name.to_string() });
        }
        assert!(spec.bits % 8 == 0, "type width must be a whole number of bytes");
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeNode {
            name: spec.name.to_string(),
            bits: spec.bits,
            integer: spec.integer,
            signed: spec.signed,
            linear: spec.linear,
            from_list: Vec::new(),
        });
        self.type_names.insert(spec.name.to_string(), id);
        debug!(target: "registry", name = spec.name, bits = spec.bits, "type registered");
        Ok(id)
    }

    pub fn register_component(&mut self, name: &str) -> Result<ComponentId, Error> {
        if let Some(&id) = self.component_names.get(name) {
            return Ok(id);
        }
        let id = ComponentId(self.components.len() as u32);
        self.components.push(ComponentNode { name: name.to_string() });
        self.component_names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Register a model and its canonical `"<name> double"` format.
    ///
    /// Requires the `double` type to be registered beforehand.
    pub fn register_model(&mut self, spec: ModelSpec<'_>) -> Result<ModelId, Error> {
        if let Some(&id) = self.model_names.get(spec.name) {
            let existing = self.model(id);
            if existing.components == spec.components
                && existing.flags == spec.flags
                && existing.space.as_deref() == spec.space
            {
                return Ok(id);
            }
            return Err(Error::DuplicateIncompatible { name: spec.name.to_string() });
        }
        for (i, c) in spec.components.iter().enumerate() {
            if spec.components[..i].contains(c) {
                return Err(Error::DuplicateIncompatible { name: spec.name.to_string() });
            }
        }
        let double = self
            .lookup_type("double")
            .ok_or_else(|| Error::UnknownName("double".to_string()))?;

        let id = ModelId(self.models.len() as u32);
        self.models.push(ModelNode {
            name: spec.name.to_string(),
            components: spec.components.to_vec(),
            flags: spec.flags,
            space: spec.space.map(str::to_string),
            canonical: FormatId(u32::MAX),
            from_list: Vec::new(),
        });
        self.model_names.insert(spec.name.to_string(), id);

        let canon_name = format!("{} double", spec.name);
        let layout: Vec<(ComponentId, TypeId)> =
            spec.components.iter().map(|&c| (c, double)).collect();
        let canon = self.register_format_inner(
            FormatSpec {
                name: &canon_name,
                model: id,
                layout: &layout,
                planar: false,
                palette: false,
                space: spec.space,
            },
            Some(id),
        )?;
        self.models[id.as_usize()].canonical = canon;
        debug!(target: "registry", name = spec.name, canonical = %canon_name, "model registered");
        Ok(id)
    }

    pub fn register_format(&mut self, spec: FormatSpec<'_>) -> Result<FormatId, Error> {
        self.register_format_inner(spec, None)
    }

    fn register_format_inner(
        &mut self,
        spec: FormatSpec<'_>,
        canonical_for: Option<ModelId>,
    ) -> Result<FormatId, Error> {
        if let Some(&id) = self.format_names.get(spec.name) {
            let existing = self.format(id);
            let same_layout = existing.components.len() == spec.layout.len()
                && existing
                    .components
                    .iter()
                    .zip(existing.types.iter())
                    .zip(spec.layout.iter())
                    .all(|((c, t), (sc, st))| c == sc && t == st);
            if existing.model == spec.model && same_layout && existing.planar == spec.planar {
                return Ok(id);
            }
            return Err(Error::DuplicateIncompatible { name: spec.name.to_string() });
        }

        let model = self.model(spec.model);
        // The layout is a distinct, arbitrarily ordered selection of the
        // model's components. Packed sub-layouts (the cairo-style formats)
        // may store fewer components than the model; their unpicked planes
        // simply do not participate in any plane map.
        if spec.layout.is_empty() || spec.layout.len() > model.components.len() {
            return Err(Error::DuplicateIncompatible { name: spec.name.to_string() });
        }
        for (i, (c, _)) in spec.layout.iter().enumerate() {
            if !model.components.contains(c)
                || spec.layout[..i].iter().any(|(prev, _)| prev == c)
            {
                return Err(Error::DuplicateIncompatible { name: spec.name.to_string() });
            }
        }

        let mut byte_offsets = Vec::with_capacity(spec.layout.len());
        let mut at = 0usize;
        for (_, t) in spec.layout {
            byte_offsets.push(at);
            at += self.ty(*t).bytes();
        }
        let bytes_per_pixel = at;

        let id = FormatId(self.formats.len() as u32);
        self.formats.push(FormatNode {
            name: spec.name.to_string(),
            model: spec.model,
            components: spec.layout.iter().map(|(c, _)| *c).collect(),
            types: spec.layout.iter().map(|(_, t)| *t).collect(),
            sampling: vec![Sampling::default(); spec.layout.len()],
            bytes_per_pixel,
            byte_offsets,
            planar: spec.planar,
            palette: spec.palette,
            space: spec.space.map(str::to_string),
            encoding: spec.name.to_string(),
            canonical_for,
            unpack: None,
            pack: None,
            from_list: Vec::new(),
        });
        self.format_names.insert(spec.name.to_string(), id);
        debug!(
            target: "registry",
            name = spec.name,
            bpp = bytes_per_pixel,
            canonical = canonical_for.is_some(),
            "format registered"
        );

        if canonical_for.is_none() {
            self.synthesize_crossings(id)?;
        }
        Ok(id)
    }

    /// Create the reference pack/unpack conversions between `format` and its
    /// model's canonical double encoding, composed from per-component type
    /// conversions.
    fn synthesize_crossings(&mut self, format: FormatId) -> Result<(), Error> {
        let canon = self.canonical_of(format);
        if canon == format {
            return Ok(());
        }
        let double = self
            .lookup_type("double")
            .ok_or_else(|| Error::UnknownName("double".to_string()))?;

        let (fmt_bpp, canon_bpp, pairs) = {
            let fmt = self.format(format);
            let canon_node = self.format(canon);
            let mut pairs = Vec::with_capacity(fmt.components.len());
            for (i, comp) in fmt.components.iter().enumerate() {
                let j = canon_node
                    .components
                    .iter()
                    .position(|c| c == comp)
                    .expect("canonical format covers the model components");
                pairs.push((fmt.byte_offsets[i], self.ty(fmt.types[i]).bytes(), fmt.types[i], j * 8));
            }
            (fmt.bytes_per_pixel, canon_node.bytes_per_pixel, pairs)
        };

        let mut unpack_planes = Vec::with_capacity(pairs.len());
        let mut pack_planes = Vec::with_capacity(pairs.len());
        for &(offset, width, ty, canon_offset) in &pairs {
            unpack_planes.push(PlanePair {
                src_offset: offset,
                src_width: width,
                dst_offset: canon_offset,
                dst_width: 8,
                op: self.plane_op(ty, double)?,
            });
            pack_planes.push(PlanePair {
                src_offset: canon_offset,
                src_width: 8,
                dst_offset: offset,
                dst_width: width,
                op: self.plane_op(double, ty)?,
            });
        }

        let unpack = self.push_conversion(
            Endpoint::Format(format),
            Endpoint::Format(canon),
            Kernel::Reference(run_plane_map),
            KernelCtx { src_bpp: fmt_bpp, dst_bpp: canon_bpp, planes: unpack_planes },
            None,
            None,
            None,
        );
        let pack = self.push_conversion(
            Endpoint::Format(canon),
            Endpoint::Format(format),
            Kernel::Reference(run_plane_map),
            KernelCtx { src_bpp: canon_bpp, dst_bpp: fmt_bpp, planes: pack_planes },
            None,
            None,
            None,
        );
        let node = &mut self.formats[format.as_usize()];
        node.unpack = Some(unpack);
        node.pack = Some(pack);
        Ok(())
    }

    fn plane_op(&self, from: TypeId, to: TypeId) -> Result<PlaneOp, Error> {
        if from == to {
            return Ok(PlaneOp::Copy);
        }
        let found = self.conversions.iter().find(|c| {
            c.src == Endpoint::Type(from) && c.dst == Endpoint::Type(to) && c.plane_fn.is_some()
        });
        match found.and_then(|c| c.plane_fn) {
            Some(f) => Ok(PlaneOp::Convert(f)),
            None => Err(Error::UnknownName(format!(
                "{} to {}",
                self.ty(from).name,
                self.ty(to).name
            ))),
        }
    }

    pub fn register_conversion(&mut self, spec: ConversionSpec) -> Result<ConvId, Error> {
        assert_eq!(
            spec.src.kind(),
            spec.dst.kind(),
            "conversion endpoints must share a kind"
        );

        let ctx = match (spec.src, spec.dst) {
            (Endpoint::Format(a), Endpoint::Format(b)) => self.match_format_planes(a, b)?,
            (Endpoint::Type(a), Endpoint::Type(b)) => {
                let (sw, dw) = (self.ty(a).bytes(), self.ty(b).bytes());
                // A type conversion is its own one-plane map, so it is
                // directly dispatchable over packed scalar arrays.
                let planes = spec
                    .plane_fn
                    .map(|f| {
                        vec![PlanePair {
                            src_offset: 0,
                            src_width: sw,
                            dst_offset: 0,
                            dst_width: dw,
                            op: PlaneOp::Convert(f),
                        }]
                    })
                    .unwrap_or_default();
                KernelCtx { src_bpp: sw, dst_bpp: dw, planes }
            }
            (Endpoint::Model(a), Endpoint::Model(b)) => KernelCtx::packed(
                self.model(a).n_components() * 8,
                self.model(b).n_components() * 8,
            ),
            _ => unreachable!("kinds checked above"),
        };

        let id = self.push_conversion(
            spec.src,
            spec.dst,
            spec.kernel,
            ctx,
            spec.cost,
            spec.error,
            spec.plane_fn,
        );

        // A model conversion is mirrored between the canonical double
        // formats so the planner can route through the model layer.
        if let (Endpoint::Model(a), Endpoint::Model(b)) = (spec.src, spec.dst) {
            let canon_a = self.model(a).canonical;
            let canon_b = self.model(b).canonical;
            self.push_conversion(
                Endpoint::Format(canon_a),
                Endpoint::Format(canon_b),
                Kernel::Reference(match spec.kernel {
                    Kernel::Linear(f) | Kernel::Planar(f) | Kernel::Reference(f) => f,
                }),
                KernelCtx::packed(
                    self.format(canon_a).bytes_per_pixel,
                    self.format(canon_b).bytes_per_pixel,
                ),
                spec.cost,
                spec.error,
                None,
            );
        }
        Ok(id)
    }

    /// Build the plane map between two formats by matching component ids.
    /// Unmatched destination components get no entry and stay untouched.
    fn match_format_planes(&self, src: FormatId, dst: FormatId) -> Result<KernelCtx, Error> {
        let s = self.format(src);
        let d = self.format(dst);
        let mut planes = Vec::new();
        for (j, comp) in d.components.iter().enumerate() {
            if let Some(i) = s.components.iter().position(|c| c == comp) {
                let st = s.types[i];
                let dt = d.types[j];
                // A matched component with no usable scalar bridge is
                // dropped from the map rather than miscopied.
                let Ok(op) = self.plane_op(st, dt) else { continue };
                planes.push(PlanePair {
                    src_offset: s.byte_offsets[i],
                    src_width: self.ty(st).bytes(),
                    dst_offset: d.byte_offsets[j],
                    dst_width: self.ty(dt).bytes(),
                    op,
                });
            }
        }
        Ok(KernelCtx { src_bpp: s.bytes_per_pixel, dst_bpp: d.bytes_per_pixel, planes })
    }

    #[cfg(test)]
    pub(crate) fn match_planes_for_test(&self, src: FormatId, dst: FormatId) -> KernelCtx {
        self.match_format_planes(src, dst).expect("plane matching")
    }

    #[allow(clippy::too_many_arguments)]
    fn push_conversion(
        &mut self,
        src: Endpoint,
        dst: Endpoint,
        kernel: Kernel,
        ctx: KernelCtx,
        cost: Option<f64>,
        error: Option<f64>,
        plane_fn: Option<PlaneFn>,
    ) -> ConvId {
        let base = format!("{} to {}", self.endpoint_name(src), self.endpoint_name(dst));
        let mut name = base.clone();
        let mut k = 1;
        while self.conversion_names.contains_key(&name) {
            k += 1;
            name = format!("{} #{}", base, k);
        }

        let id = ConvId(self.conversions.len() as u32);
        let cost = cost.unwrap_or_else(|| kernel.default_cost());
        self.conversions.push(ConversionNode {
            name: name.clone(),
            src,
            dst,
            kernel,
            ctx,
            cost,
            error,
            plane_fn,
        });
        self.conversion_names.insert(name.clone(), id);
        match src {
            Endpoint::Type(t) => self.types[t.as_usize()].from_list.push(id),
            Endpoint::Model(m) => self.models[m.as_usize()].from_list.push(id),
            Endpoint::Format(f) => self.formats[f.as_usize()].from_list.push(id),
        }
        debug!(target: "registry", name = %name, kind = kernel.kind_name(), cost, "conversion registered");
        id
    }
}
