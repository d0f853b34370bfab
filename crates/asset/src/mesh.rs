//! Renderer-ready model assembly: material defaults, attribute defaults,
//! tangents, optional index welding and extents.

use std::collections::HashMap;

use corelib::{
    Vec2, Vec3,
    bounds::Extents,
    camera::Framing,
};

use crate::{
    mtl::{Material, MaterialLibrary, TextureRef},
    obj::{Geometry, ObjDocument, VertexArrays},
};

/// Vertex attribute after defaulting: either one tuple per vertex or one
/// tuple broadcast to every vertex.
#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    Dense { components: usize, values: Vec<f32> },
    Constant(Vec<f32>),
}

impl Attribute {
    pub fn components(&self) -> usize {
        match self {
            Attribute::Dense { components, .. } => *components,
            Attribute::Constant(value) => value.len(),
        }
    }

    pub fn dense(&self) -> Option<&[f32]> {
        match self {
            Attribute::Dense { values, .. } => Some(values),
            Attribute::Constant(_) => None,
        }
    }

    fn from_arrays(values: Option<&Vec<f32>>, components: usize, fallback: &[f32]) -> Self {
        match values {
            Some(values) => Attribute::Dense {
                components,
                values: values.clone(),
            },
            None => Attribute::Constant(fallback.to_vec()),
        }
    }
}

/// Texture bound to a material slot.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum TextureSource {
    /// 1x1 opaque white.
    White,
    /// 1x1 tangent-space normal pointing out of the surface.
    FlatNormal,
    /// File name relative to the OBJ document.
    File(String),
}

impl TextureSource {
    fn from_ref(texture: Option<&TextureRef>, fallback: TextureSource) -> Self {
        texture
            .map(|t| t.path())
            .filter(|p| !p.is_empty())
            .map_or(fallback, |p| TextureSource::File(p.to_string()))
    }

    pub fn file(&self) -> Option<&str> {
        match self {
            TextureSource::File(name) => Some(name),
            _ => None,
        }
    }
}

/// Material with every field filled in from engine defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveMaterial {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub emissive: Vec3,
    pub shininess: f32,
    pub opacity: f32,
    pub optical_density: f32,
    pub illum: i32,
    pub diffuse_map: TextureSource,
    pub specular_map: TextureSource,
    pub normal_map: TextureSource,
    pub ambient_map: Option<String>,
    pub opacity_map: Option<String>,
}

impl Default for EffectiveMaterial {
    fn default() -> Self {
        Self {
            ambient: Vec3::ZERO,
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
            emissive: Vec3::ZERO,
            shininess: 400.0,
            opacity: 1.0,
            optical_density: 1.0,
            illum: 2,
            diffuse_map: TextureSource::White,
            specular_map: TextureSource::White,
            normal_map: TextureSource::FlatNormal,
            ambient_map: None,
            opacity_map: None,
        }
    }
}

impl EffectiveMaterial {
    /// Merge `material` over the defaults; set fields win.
    pub fn resolve(material: &Material) -> Self {
        let d = Self::default();
        let specular_map = material.specular_map.as_ref().or(material.shininess_map.as_ref());
        Self {
            ambient: material.ambient.unwrap_or(d.ambient),
            diffuse: material.diffuse.unwrap_or(d.diffuse),
            specular: material.specular.unwrap_or(d.specular),
            emissive: material.emissive.unwrap_or(d.emissive),
            shininess: material.shininess.unwrap_or(d.shininess),
            opacity: material.opacity.unwrap_or(d.opacity),
            optical_density: material.optical_density.unwrap_or(d.optical_density),
            illum: material.illum.unwrap_or(d.illum),
            diffuse_map: TextureSource::from_ref(material.diffuse_map.as_ref(), d.diffuse_map),
            specular_map: TextureSource::from_ref(specular_map, d.specular_map),
            normal_map: TextureSource::from_ref(material.normal_map.as_ref(), d.normal_map),
            ambient_map: material.ambient_map.as_ref().map(|t| t.path().to_string()),
            opacity_map: material.opacity_map.as_ref().map(|t| t.path().to_string()),
        }
    }

    /// File-backed textures referenced by this material.
    pub fn texture_files(&self) -> impl Iterator<Item = &str> {
        [&self.diffuse_map, &self.specular_map, &self.normal_map]
            .into_iter()
            .filter_map(TextureSource::file)
            .chain(self.ambient_map.as_deref())
            .chain(self.opacity_map.as_deref())
    }
}

/// One drawable part of a [`Model`].
#[derive(Clone, Debug, PartialEq)]
pub struct MeshGeometry {
    pub object: String,
    pub groups: Vec<String>,
    pub material_name: String,
    pub material: EffectiveMaterial,
    /// 3 components per vertex.
    pub position: Vec<f32>,
    pub texcoord: Attribute,
    pub normal: Attribute,
    /// 3 or 4 components; 3 means no alpha channel.
    pub color: Attribute,
    /// Flat per-triangle tangents, 3 components per vertex.
    pub tangent: Option<Vec<f32>>,
    /// Present when the geometry was welded into an indexed mesh.
    pub indices: Option<Vec<u32>>,
}

impl MeshGeometry {
    pub fn vertex_count(&self) -> usize {
        self.position.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices
            .as_ref()
            .map_or(self.vertex_count(), |ix| ix.len())
            / 3
    }
}

/// Assembled model handed to the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub geometries: Vec<MeshGeometry>,
    pub materials: MaterialLibrary,
    /// `None` when no geometry has positions.
    pub extents: Option<Extents>,
    pub framing: Framing,
}

impl Model {
    /// Distinct texture files across all geometries, in first-use order.
    pub fn texture_files(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for file in self.geometries.iter().flat_map(|g| g.material.texture_files()) {
            if !seen.contains(&file) {
                seen.push(file);
            }
        }
        seen
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AssembleOptions {
    /// Multiplier applied to the extents diagonal for the bounding radius.
    pub padding: f32,
    /// Weld identical vertices and emit index buffers.
    pub indexed: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            padding: 1.2,
            indexed: false,
        }
    }
}

const DEFAULT_TEXCOORD: [f32; 2] = [0.0, 0.0];
const DEFAULT_NORMAL: [f32; 3] = [0.0, 0.0, 1.0];
const DEFAULT_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Build a [`Model`] from parsed OBJ data and materials. Does not modify its
/// inputs, so repeated calls give identical results.
pub fn assemble(
    document: &ObjDocument,
    materials: &MaterialLibrary,
    options: &AssembleOptions,
) -> Model {
    let geometries: Vec<MeshGeometry> = document
        .geometries
        .iter()
        .map(|g| assemble_geometry(g, materials, options))
        .collect();

    let extents = compute_extents(geometries.iter().map(|g| g.position.as_slice()));
    let framing = Framing::from_extents(extents, options.padding);

    Model {
        geometries,
        materials: materials.clone(),
        extents,
        framing,
    }
}

fn assemble_geometry(
    geometry: &Geometry,
    materials: &MaterialLibrary,
    options: &AssembleOptions,
) -> MeshGeometry {
    let material = match materials.get(&geometry.material) {
        Some(m) => EffectiveMaterial::resolve(m),
        None => {
            log::debug!(
                "Material '{}' not found; using defaults",
                geometry.material
            );
            EffectiveMaterial::default()
        }
    };

    let (data, indices) = if options.indexed {
        match weld(&geometry.data) {
            Some((data, indices)) => (data, Some(indices)),
            None => {
                log::warn!(
                    "Geometry '{}' has mismatched attribute counts; leaving it unindexed",
                    geometry.object
                );
                (geometry.data.clone(), None)
            }
        }
    } else {
        (geometry.data.clone(), None)
    };

    let texcoord = Attribute::from_arrays(data.texcoord.as_ref(), 2, &DEFAULT_TEXCOORD);
    let normal = Attribute::from_arrays(data.normal.as_ref(), 3, &DEFAULT_NORMAL);
    let color = Attribute::from_arrays(data.color.as_ref(), data.color_components, &DEFAULT_COLOR);
    let position = data.position.unwrap_or_default();

    let tangent = match (texcoord.dense(), normal.dense()) {
        (Some(uv), Some(_)) => Some(generate_tangents(&position, uv, indices.as_deref())),
        _ => None,
    };

    MeshGeometry {
        object: geometry.object.clone(),
        groups: geometry.groups.clone(),
        material_name: geometry.material.clone(),
        material,
        position,
        texcoord,
        normal,
        color,
        tangent,
        indices,
    }
}

/// Combined extents of several flat position arrays.
pub fn compute_extents<'a>(positions: impl IntoIterator<Item = &'a [f32]>) -> Option<Extents> {
    positions
        .into_iter()
        .filter_map(Extents::from_flat)
        .reduce(Extents::union)
}

/// Vertex read for the `slot`-th corner of the triangle list.
#[inline]
fn vertex_slot(indices: Option<&[u32]>, slot: usize) -> usize {
    indices.map_or(slot, |ix| ix[slot] as usize)
}

/// Flat tangents (one per triangle, written to each of its vertices).
/// Triangles with a degenerate UV mapping get `(1, 0, 0)`.
pub fn generate_tangents(position: &[f32], texcoord: &[f32], indices: Option<&[u32]>) -> Vec<f32> {
    let vertex_count = position.len() / 3;
    let corners = indices.map_or(vertex_count, <[u32]>::len);
    let mut tangents = vec![0.0; vertex_count * 3];

    let p = |v: usize| Vec3::from_slice(&position[v * 3..v * 3 + 3]);
    let uv = |v: usize| {
        texcoord
            .get(v * 2..v * 2 + 2)
            .map_or(Vec2::ZERO, Vec2::from_slice)
    };

    for tri in 0..corners / 3 {
        let v1 = vertex_slot(indices, tri * 3);
        let v2 = vertex_slot(indices, tri * 3 + 1);
        let v3 = vertex_slot(indices, tri * 3 + 2);

        let dp12 = p(v2) - p(v1);
        let dp13 = p(v3) - p(v1);
        let duv12 = uv(v2) - uv(v1);
        let duv13 = uv(v3) - uv(v1);

        let f = 1.0 / (duv12.x * duv13.y - duv13.x * duv12.y);
        let tangent = if f.is_finite() {
            ((dp12 * duv13.y - dp13 * duv12.y) * f)
                .try_normalize()
                .unwrap_or(Vec3::X)
        } else {
            Vec3::X
        };

        for v in [v1, v2, v3] {
            tangents[v * 3..v * 3 + 3].copy_from_slice(&tangent.to_array());
        }
    }
    tangents
}

/// Merge bitwise-identical vertices. Returns `None` when the present
/// attributes do not all have one tuple per position.
pub fn weld(data: &VertexArrays) -> Option<(VertexArrays, Vec<u32>)> {
    let count = data.vertex_count();
    let attributes: Vec<(&Vec<f32>, usize)> = [
        (data.position.as_ref(), 3),
        (data.texcoord.as_ref(), 2),
        (data.normal.as_ref(), 3),
        (data.color.as_ref(), data.color_components),
    ]
    .into_iter()
    .filter_map(|(values, width)| values.map(|v| (v, width)))
    .collect();
    if attributes.iter().any(|(values, width)| values.len() != count * width) {
        return None;
    }

    let mut unique: HashMap<Vec<u32>, u32> = HashMap::new();
    let mut outputs: Vec<Vec<f32>> = vec![Vec::new(); attributes.len()];
    let mut indices = Vec::with_capacity(count);

    for vertex in 0..count {
        let key: Vec<u32> = attributes
            .iter()
            .flat_map(|(values, width)| values[vertex * width..(vertex + 1) * width].iter())
            .map(|v| v.to_bits())
            .collect();
        let next = unique.len() as u32;
        let index = *unique.entry(key).or_insert_with(|| {
            for ((values, width), out) in attributes.iter().zip(outputs.iter_mut()) {
                out.extend_from_slice(&values[vertex * width..(vertex + 1) * width]);
            }
            next
        });
        indices.push(index);
    }

    let mut outputs = outputs.into_iter();
    let mut take = |present: bool| if present { outputs.next() } else { None };
    let welded = VertexArrays {
        position: take(data.position.is_some()),
        texcoord: take(data.texcoord.is_some()),
        normal: take(data.normal.is_some()),
        color: take(data.color.is_some()),
        color_components: data.color_components,
    };
    Some((welded, indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mtl::parse_mtl, obj::parse_obj};
    use corelib::vec3;

    const TEXTURED_QUAD: &str = "\
mtllib quad.mtl
v 0 0 0
v 2 0 0
v 2 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl brick
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    fn quad_model(options: &AssembleOptions) -> Model {
        let doc = parse_obj(TEXTURED_QUAD).unwrap();
        let mtl = parse_mtl("newmtl brick\nKd 0.5 0.2 0.1\nmap_Kd brick.png\n").unwrap();
        assemble(&doc, &mtl.materials, options)
    }

    #[test]
    fn defaults_fill_missing_attributes_and_material() {
        let doc = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl missing\nf 1 2 3\n").unwrap();
        let model = assemble(&doc, &MaterialLibrary::new(), &AssembleOptions::default());
        let g = &model.geometries[0];
        assert_eq!(g.material, EffectiveMaterial::default());
        assert_eq!(g.material_name, "missing");
        assert_eq!(g.texcoord, Attribute::Constant(vec![0.0, 0.0]));
        assert_eq!(g.normal, Attribute::Constant(vec![0.0, 0.0, 1.0]));
        assert_eq!(g.color, Attribute::Constant(vec![1.0, 1.0, 1.0, 1.0]));
        assert_eq!(g.tangent, None);
    }

    #[test]
    fn material_fields_override_defaults() {
        let model = quad_model(&AssembleOptions::default());
        let m = &model.geometries[0].material;
        assert_eq!(m.diffuse, vec3(0.5, 0.2, 0.1));
        assert_eq!(m.specular, Vec3::ONE);
        assert_eq!(m.shininess, 400.0);
        assert_eq!(m.diffuse_map, TextureSource::File("brick.png".to_string()));
        assert_eq!(m.normal_map, TextureSource::FlatNormal);
        assert_eq!(model.texture_files(), vec!["brick.png"]);
    }

    #[test]
    fn three_component_colors_stay_tagged() {
        let doc = parse_obj("v 0 0 0 1 0 0\nv 1 0 0 0 1 0\nv 0 1 0 0 0 1\nf 1 2 3\n").unwrap();
        let model = assemble(&doc, &MaterialLibrary::new(), &AssembleOptions::default());
        assert_eq!(model.geometries[0].color.components(), 3);
        assert!(model.geometries[0].color.dense().is_some());
    }

    #[test]
    fn tangents_follow_u_direction() {
        let model = quad_model(&AssembleOptions::default());
        let tangents = model.geometries[0].tangent.as_ref().unwrap();
        assert_eq!(tangents.len(), 6 * 3);
        for t in tangents.chunks_exact(3) {
            assert!((Vec3::from_slice(t) - Vec3::X).length() < 1e-6);
        }
    }

    #[test]
    fn degenerate_uvs_fall_back_to_x() {
        let position = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let texcoord = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let tangents = generate_tangents(&position, &texcoord, None);
        assert_eq!(tangents, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn rotated_uvs_give_rotated_tangent() {
        // U runs along +Y in object space.
        let position = [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, -1.0, 0.0, 0.0];
        let texcoord = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let tangents = generate_tangents(&position, &texcoord, None);
        assert!((Vec3::from_slice(&tangents[..3]) - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn extents_and_framing_span_all_geometries() {
        let src = "v -1 0 0\nv 0 2 0\nv 0 0 4\nv 3 0 0\nusemtl a\nf 1 2 3\nusemtl b\nf 2 3 4\n";
        let doc = parse_obj(src).unwrap();
        let options = AssembleOptions {
            padding: 0.5,
            indexed: false,
        };
        let model = assemble(&doc, &MaterialLibrary::new(), &options);
        let e = model.extents.unwrap();
        assert_eq!(e.min, vec3(-1.0, 0.0, 0.0));
        assert_eq!(e.max, vec3(3.0, 2.0, 4.0));
        assert_eq!(model.framing.center_offset, vec3(-1.0, -1.0, -2.0));
        let radius = vec3(4.0, 2.0, 4.0).length() * 0.5;
        assert!((model.framing.bounding_radius - radius).abs() < 1e-6);
        assert!((model.framing.z_far - radius * 3.0).abs() < 1e-5);
    }

    #[test]
    fn empty_document_has_no_extents() {
        let model = assemble(
            &ObjDocument::default(),
            &MaterialLibrary::new(),
            &AssembleOptions::default(),
        );
        assert!(model.geometries.is_empty());
        assert_eq!(model.extents, None);
        assert_eq!(model.framing.bounding_radius, 0.0);
    }

    #[test]
    fn assembling_twice_is_identical() {
        let doc = parse_obj(TEXTURED_QUAD).unwrap();
        let mtl = parse_mtl("newmtl brick\nKd 1 0 0\n").unwrap();
        let a = assemble(&doc, &mtl.materials, &AssembleOptions::default());
        let b = assemble(&doc, &mtl.materials, &AssembleOptions::default());
        assert_eq!(a.extents, b.extents);
        assert_eq!(a.framing.center_offset, b.framing.center_offset);
        let bits = |m: &Model| -> Vec<u32> {
            m.geometries[0].tangent.as_ref().unwrap().iter().map(|v| v.to_bits()).collect()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn indexed_assembly_welds_shared_corners() {
        let model = quad_model(&AssembleOptions { padding: 1.2, indexed: true });
        let g = &model.geometries[0];
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.indices.as_deref(), Some(&[0, 1, 2, 0, 2, 3][..]));
        assert_eq!(g.triangle_count(), 2);
        assert_eq!(g.texcoord.dense().unwrap().len(), 8);
        assert_eq!(g.tangent.as_ref().unwrap().len(), 12);
        for t in g.tangent.as_ref().unwrap().chunks_exact(3) {
            assert!((Vec3::from_slice(t) - Vec3::X).length() < 1e-6);
        }
    }

    #[test]
    fn weld_rejects_mismatched_counts() {
        let data = VertexArrays {
            position: Some(vec![0.0; 9]),
            texcoord: Some(vec![0.0; 2]),
            ..Default::default()
        };
        assert!(weld(&data).is_none());
    }
}
