use std::borrow::Cow;
use std::collections::BTreeMap;

use foundation::math::{Mat4, Vec3};

use crate::ModelFormatError;
use crate::glb::{Glb, is_glb};
use crate::gltf::{Document, MODE_TRIANGLES, Primitive};

/// One triangle list with positions baked into model space.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub indices: Vec<u32>,
    /// Linear RGBA multiplier from the material, white when unset.
    pub base_color: [f32; 4],
    /// Slot in [`ModelScene::textures`] sampled with `uvs`.
    pub texture: Option<usize>,
}

impl MeshData {
    /// Untextured white mesh.
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            normals: None,
            uvs: None,
            indices,
            base_color: [1.0; 4],
            texture: None,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Decoded base color image, tightly packed RGBA8 rows from the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureImage {
    pub fn decode(texture: usize, encoded: &[u8]) -> Result<Self, ModelFormatError> {
        let img = image::load_from_memory(encoded)
            .map_err(|source| ModelFormatError::Image { texture, source })?
            .to_rgba8();
        Ok(Self {
            width: img.width(),
            height: img.height(),
            rgba: img.into_raw(),
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ModelBounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl ModelBounds {
    pub fn size(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Decoded model ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelScene {
    pub meshes: Vec<MeshData>,
    pub bounds: ModelBounds,
    pub textures: Vec<TextureImage>,
    /// Base color textures whose image is stored outside the file.
    pub skipped_textures: usize,
    /// Non-triangle primitives that were skipped.
    pub skipped_primitives: usize,
    /// blake3 of the source bytes, hex encoded.
    pub content_hash: String,
}

impl ModelScene {
    /// Parses a GLB container or a JSON glTF document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelFormatError> {
        if bytes.is_empty() {
            return Err(ModelFormatError::Empty);
        }
        let (json, bin) = if is_glb(bytes) {
            let glb = Glb::parse(bytes)?;
            (glb.json, glb.bin)
        } else {
            (bytes, None)
        };
        let doc: Document = serde_json::from_slice(json)?;
        let mut scene = extract(&doc, bin)?;
        scene.content_hash = blake3::hash(bytes).to_hex().to_string();
        Ok(scene)
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.positions.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(MeshData::triangle_count).sum()
    }

    /// Approximate CPU size, used for cache accounting.
    pub fn byte_size(&self) -> usize {
        self.meshes
            .iter()
            .map(|m| {
                m.positions.len() * 12
                    + m.normals.as_ref().map_or(0, |n| n.len() * 12)
                    + m.uvs.as_ref().map_or(0, |u| u.len() * 8)
                    + m.indices.len() * 4
            })
            .sum::<usize>()
            + self.textures.iter().map(|t| t.rgba.len()).sum::<usize>()
    }
}

fn node_matrix(node: &crate::gltf::Node) -> Mat4 {
    if let Some(m) = node.matrix {
        return Mat4(m);
    }
    let t = node.translation.unwrap_or([0.0; 3]);
    let r = node.rotation.unwrap_or([0.0, 0.0, 0.0, 1.0]);
    let s = node.scale.unwrap_or([1.0; 3]);
    Mat4::from_trs(
        Vec3::new(t[0], t[1], t[2]),
        r,
        Vec3::new(s[0], s[1], s[2]),
    )
}

fn root_nodes(doc: &Document) -> Vec<usize> {
    if let Some(scene) = doc.scene.and_then(|i| doc.scenes.get(i)) {
        return scene.nodes.clone();
    }
    if let Some(scene) = doc.scenes.first() {
        return scene.nodes.clone();
    }
    // No scene: every node that is nobody's child is a root.
    let mut is_child = vec![false; doc.nodes.len()];
    for node in &doc.nodes {
        for &c in &node.children {
            if let Some(flag) = is_child.get_mut(c) {
                *flag = true;
            }
        }
    }
    (0..doc.nodes.len()).filter(|&i| !is_child[i]).collect()
}

/// Decodes glTF textures on first use, each into one scene slot.
struct TextureSlots<'d, 'b> {
    doc: &'d Document,
    buffers: &'d [Cow<'b, [u8]>],
    slots: BTreeMap<usize, Option<usize>>,
    images: Vec<TextureImage>,
    skipped: usize,
}

impl TextureSlots<'_, '_> {
    fn slot(&mut self, texture: usize) -> Result<Option<usize>, ModelFormatError> {
        if let Some(slot) = self.slots.get(&texture) {
            return Ok(*slot);
        }
        let slot = match self.doc.texture_image_bytes(self.buffers, texture)? {
            Some(encoded) => {
                self.images.push(TextureImage::decode(texture, &encoded)?);
                Some(self.images.len() - 1)
            }
            None => {
                self.skipped += 1;
                None
            }
        };
        self.slots.insert(texture, slot);
        Ok(slot)
    }

    /// Base color factor and texture slot for a primitive.
    fn material(&mut self, prim: &Primitive, has_uvs: bool) -> Result<([f32; 4], Option<usize>), ModelFormatError> {
        let pbr = prim
            .material
            .and_then(|m| self.doc.materials.get(m))
            .and_then(|m| m.pbr_metallic_roughness.as_ref());
        let Some(pbr) = pbr else {
            return Ok(([1.0; 4], None));
        };
        let texture = match &pbr.base_color_texture {
            Some(info) if has_uvs && info.tex_coord == 0 => self.slot(info.index)?,
            _ => None,
        };
        Ok((pbr.base_color_factor, texture))
    }
}

fn extract(doc: &Document, bin: Option<&[u8]>) -> Result<ModelScene, ModelFormatError> {
    let buffers = doc.load_buffers(bin)?;
    let mut textures = TextureSlots {
        doc,
        buffers: &buffers,
        slots: BTreeMap::new(),
        images: Vec::new(),
        skipped: 0,
    };
    let mut meshes = Vec::new();
    let mut skipped = 0usize;

    // (node, parent transform); depth is bounded by the node count to survive cycles.
    let mut stack: Vec<(usize, Mat4, usize)> = root_nodes(doc)
        .into_iter()
        .map(|n| (n, Mat4::IDENTITY, 0))
        .collect();
    while let Some((index, parent, depth)) = stack.pop() {
        if depth > doc.nodes.len() {
            continue;
        }
        let node = doc.nodes.get(index).ok_or(ModelFormatError::BadIndex {
            kind: "node",
            index,
        })?;
        let world = parent * node_matrix(node);
        for &child in &node.children {
            stack.push((child, world, depth + 1));
        }
        let Some(mesh_index) = node.mesh else {
            continue;
        };
        let mesh = doc.meshes.get(mesh_index).ok_or(ModelFormatError::BadIndex {
            kind: "mesh",
            index: mesh_index,
        })?;
        for prim in &mesh.primitives {
            if prim.mode != MODE_TRIANGLES {
                skipped += 1;
                continue;
            }
            let Some(&pos_acc) = prim.attributes.get("POSITION") else {
                skipped += 1;
                continue;
            };
            let positions: Vec<[f32; 3]> = doc
                .read_floats::<3>(&buffers, pos_acc)?
                .into_iter()
                .map(|p| {
                    let v = world.transform_point(Vec3::new(
                        f64::from(p[0]),
                        f64::from(p[1]),
                        f64::from(p[2]),
                    ));
                    [v.x as f32, v.y as f32, v.z as f32]
                })
                .collect();
            let normals = match prim.attributes.get("NORMAL") {
                Some(&a) => Some(doc.read_floats::<3>(&buffers, a)?),
                None => None,
            };
            let uvs = match prim.attributes.get("TEXCOORD_0") {
                Some(&a) => Some(doc.read_floats::<2>(&buffers, a)?),
                None => None,
            };
            let indices = match prim.indices {
                Some(a) => doc.read_indices(&buffers, a)?,
                None => (0..positions.len() as u32).collect(),
            };
            if indices.iter().any(|&i| i as usize >= positions.len()) {
                return Err(ModelFormatError::BadIndex {
                    kind: "vertex",
                    index: positions.len(),
                });
            }
            let (base_color, texture) = textures.material(prim, uvs.is_some())?;
            meshes.push(MeshData {
                positions,
                normals,
                uvs,
                indices,
                base_color,
                texture,
            });
        }
    }

    let bounds = bounds_of(&meshes).ok_or(ModelFormatError::NoGeometry)?;
    Ok(ModelScene {
        meshes,
        bounds,
        textures: textures.images,
        skipped_textures: textures.skipped,
        skipped_primitives: skipped,
        content_hash: String::new(),
    })
}

fn bounds_of(meshes: &[MeshData]) -> Option<ModelBounds> {
    let mut points = meshes.iter().flat_map(|m| m.positions.iter());
    let first = *points.next()?;
    let mut b = ModelBounds {
        min: first,
        max: first,
    };
    for p in points {
        for k in 0..3 {
            b.min[k] = b.min[k].min(p[k]);
            b.max[k] = b.max[k].max(p[k]);
        }
    }
    Some(b)
}
