//! The subset of the glTF 2.0 document needed to extract triangle meshes.

use std::borrow::Cow;
use std::collections::BTreeMap;

use base64::Engine as _;
use serde::Deserialize;

use crate::ModelFormatError;

pub const MODE_TRIANGLES: u32 = 4;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub scene: Option<usize>,
    #[serde(default)]
    pub scenes: Vec<SceneDef>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub meshes: Vec<Mesh>,
    #[serde(default)]
    pub accessors: Vec<Accessor>,
    #[serde(default)]
    pub buffer_views: Vec<BufferView>,
    #[serde(default)]
    pub buffers: Vec<Buffer>,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub textures: Vec<Texture>,
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SceneDef {
    #[serde(default)]
    pub nodes: Vec<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub mesh: Option<usize>,
    #[serde(default)]
    pub children: Vec<usize>,
    #[serde(default)]
    pub matrix: Option<[f64; 16]>,
    #[serde(default)]
    pub translation: Option<[f64; 3]>,
    #[serde(default)]
    pub rotation: Option<[f64; 4]>,
    #[serde(default)]
    pub scale: Option<[f64; 3]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mesh {
    #[serde(default)]
    pub primitives: Vec<Primitive>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Primitive {
    pub attributes: BTreeMap<String, usize>,
    #[serde(default)]
    pub indices: Option<usize>,
    #[serde(default = "default_mode")]
    pub mode: u32,
    #[serde(default)]
    pub material: Option<usize>,
}

fn default_mode() -> u32 {
    MODE_TRIANGLES
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    #[serde(default)]
    pub pbr_metallic_roughness: Option<PbrMetallicRoughness>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbrMetallicRoughness {
    #[serde(default = "default_base_color")]
    pub base_color_factor: [f32; 4],
    #[serde(default)]
    pub base_color_texture: Option<TextureInfo>,
}

fn default_base_color() -> [f32; 4] {
    [1.0; 4]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureInfo {
    pub index: usize,
    #[serde(default)]
    pub tex_coord: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Texture {
    #[serde(default)]
    pub source: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub buffer_view: Option<usize>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    #[serde(default)]
    pub buffer_view: Option<usize>,
    #[serde(default)]
    pub byte_offset: usize,
    pub component_type: u32,
    #[serde(default)]
    pub normalized: bool,
    pub count: usize,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferView {
    pub buffer: usize,
    #[serde(default)]
    pub byte_offset: usize,
    pub byte_length: usize,
    #[serde(default)]
    pub byte_stride: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffer {
    #[serde(default)]
    pub uri: Option<String>,
    pub byte_length: usize,
}

const FLOAT: u32 = 5126;
const UNSIGNED_BYTE: u32 = 5121;
const UNSIGNED_SHORT: u32 = 5123;
const UNSIGNED_INT: u32 = 5125;

fn component_size(component_type: u32) -> Option<usize> {
    match component_type {
        UNSIGNED_BYTE => Some(1),
        UNSIGNED_SHORT => Some(2),
        FLOAT | UNSIGNED_INT => Some(4),
        _ => None,
    }
}

fn component_count(kind: &str) -> Option<usize> {
    match kind {
        "SCALAR" => Some(1),
        "VEC2" => Some(2),
        "VEC3" => Some(3),
        "VEC4" => Some(4),
        _ => None,
    }
}

/// Decodes a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ModelFormatError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or(ModelFormatError::InvalidDataUri)?;
    let (meta, payload) = rest.split_once(',').ok_or(ModelFormatError::InvalidDataUri)?;
    if !meta.ends_with(";base64") {
        return Err(ModelFormatError::InvalidDataUri);
    }
    Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
}

impl Document {
    /// Resolves every buffer to bytes. Buffer 0 without a URI is the GLB BIN chunk.
    pub fn load_buffers<'a>(
        &self,
        bin: Option<&'a [u8]>,
    ) -> Result<Vec<Cow<'a, [u8]>>, ModelFormatError> {
        let mut out = Vec::with_capacity(self.buffers.len());
        for (i, buffer) in self.buffers.iter().enumerate() {
            let data: Cow<'a, [u8]> = match (&buffer.uri, bin) {
                (Some(uri), _) if uri.starts_with("data:") => Cow::Owned(decode_data_uri(uri)?),
                (Some(uri), _) => return Err(ModelFormatError::ExternalBuffer(uri.clone())),
                (None, Some(bin)) if i == 0 => Cow::Borrowed(bin),
                (None, _) => return Err(ModelFormatError::MissingBuffer(i)),
            };
            if data.len() < buffer.byte_length {
                return Err(ModelFormatError::Truncated("buffer"));
            }
            out.push(data);
        }
        Ok(out)
    }

    /// Reads an accessor as `f32` tuples of width `N`.
    pub fn read_floats<const N: usize>(
        &self,
        buffers: &[Cow<'_, [u8]>],
        accessor: usize,
    ) -> Result<Vec<[f32; N]>, ModelFormatError> {
        let acc = self.accessor(accessor)?;
        if acc.component_type != FLOAT || component_count(&acc.kind) != Some(N) {
            return Err(ModelFormatError::UnsupportedAccessor {
                accessor,
                detail: format!("{} of component type {}", acc.kind, acc.component_type),
            });
        }
        let elements = self.elements(buffers, accessor)?;
        let mut out = Vec::with_capacity(elements.len());
        for bytes in elements {
            let mut v = [0.0f32; N];
            for (slot, b) in v.iter_mut().zip(bytes.chunks_exact(4)) {
                *slot = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            }
            out.push(v);
        }
        Ok(out)
    }

    /// Reads a scalar unsigned integer accessor (indices).
    pub fn read_indices(
        &self,
        buffers: &[Cow<'_, [u8]>],
        accessor: usize,
    ) -> Result<Vec<u32>, ModelFormatError> {
        let acc = self.accessor(accessor)?;
        let component_type = acc.component_type;
        if acc.kind != "SCALAR" || component_type == FLOAT {
            return Err(ModelFormatError::UnsupportedAccessor {
                accessor,
                detail: format!("{} of component type {}", acc.kind, component_type),
            });
        }
        let elements = self.elements(buffers, accessor)?;
        let mut out = Vec::with_capacity(elements.len());
        for b in elements {
            out.push(match component_type {
                UNSIGNED_BYTE => u32::from(b[0]),
                UNSIGNED_SHORT => u32::from(u16::from_le_bytes([b[0], b[1]])),
                _ => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            });
        }
        Ok(out)
    }

    /// Bytes of a buffer view, bounds checked against its buffer.
    pub fn view_bytes<'b>(
        &self,
        buffers: &'b [Cow<'_, [u8]>],
        view_index: usize,
    ) -> Result<&'b [u8], ModelFormatError> {
        let view = self
            .buffer_views
            .get(view_index)
            .ok_or(ModelFormatError::BadIndex {
                kind: "bufferView",
                index: view_index,
            })?;
        let buffer = buffers.get(view.buffer).ok_or(ModelFormatError::BadIndex {
            kind: "buffer",
            index: view.buffer,
        })?;
        let end = view
            .byte_offset
            .checked_add(view.byte_length)
            .ok_or(ModelFormatError::ViewOutOfBounds(view_index))?;
        buffer
            .get(view.byte_offset..end)
            .ok_or(ModelFormatError::ViewOutOfBounds(view_index))
    }

    /// Encoded bytes behind a texture's source image. `Ok(None)` when the
    /// image lives outside the file.
    pub fn texture_image_bytes<'b>(
        &self,
        buffers: &'b [Cow<'_, [u8]>],
        texture: usize,
    ) -> Result<Option<Cow<'b, [u8]>>, ModelFormatError> {
        let source = self
            .textures
            .get(texture)
            .ok_or(ModelFormatError::BadIndex {
                kind: "texture",
                index: texture,
            })?
            .source;
        let Some(image_index) = source else {
            return Ok(None);
        };
        let image = self.images.get(image_index).ok_or(ModelFormatError::BadIndex {
            kind: "image",
            index: image_index,
        })?;
        match (&image.buffer_view, &image.uri) {
            (Some(view), _) => Ok(Some(Cow::Borrowed(self.view_bytes(buffers, *view)?))),
            (None, Some(uri)) if uri.starts_with("data:") => Ok(Some(Cow::Owned(decode_data_uri(uri)?))),
            _ => Ok(None),
        }
    }

    fn accessor(&self, index: usize) -> Result<&Accessor, ModelFormatError> {
        self.accessors.get(index).ok_or(ModelFormatError::BadIndex {
            kind: "accessor",
            index,
        })
    }

    /// Validates an accessor's layout against its view before any element is read.
    fn elements<'b>(
        &self,
        buffers: &'b [Cow<'_, [u8]>],
        accessor: usize,
    ) -> Result<Elements<'b>, ModelFormatError> {
        let acc = self.accessor(accessor)?;
        let unsupported = || ModelFormatError::UnsupportedAccessor {
            accessor,
            detail: format!("{} of component type {}", acc.kind, acc.component_type),
        };
        let elem_size = component_size(acc.component_type).ok_or_else(unsupported)?
            * component_count(&acc.kind).ok_or_else(unsupported)?;
        if acc.count == 0 {
            return Ok(Elements::empty());
        }
        let Some(view_index) = acc.buffer_view else {
            // Sparse-only or zero-initialized accessors.
            return Err(unsupported());
        };
        let bytes = self.view_bytes(buffers, view_index)?;
        let stride = self
            .buffer_views
            .get(view_index)
            .and_then(|v| v.byte_stride)
            .unwrap_or(elem_size)
            .max(elem_size);
        // End of the last element: byte_offset + stride * (count - 1) + elem_size.
        let end = stride
            .checked_mul(acc.count - 1)
            .and_then(|n| n.checked_add(acc.byte_offset))
            .and_then(|n| n.checked_add(elem_size))
            .ok_or(ModelFormatError::OutOfBounds(accessor))?;
        if end > bytes.len() {
            return Err(ModelFormatError::OutOfBounds(accessor));
        }
        Ok(Elements {
            bytes,
            offset: acc.byte_offset,
            stride,
            elem_size,
            remaining: acc.count,
        })
    }
}

/// Element slices of a validated accessor.
struct Elements<'b> {
    bytes: &'b [u8],
    offset: usize,
    stride: usize,
    elem_size: usize,
    remaining: usize,
}

impl Elements<'_> {
    fn empty() -> Self {
        Self {
            bytes: &[],
            offset: 0,
            stride: 0,
            elem_size: 0,
            remaining: 0,
        }
    }
}

impl<'b> Iterator for Elements<'b> {
    type Item = &'b [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.bytes.get(self.offset..self.offset.checked_add(self.elem_size)?)?;
        self.remaining -= 1;
        self.offset = self.offset.saturating_add(self.stride);
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Elements<'_> {}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::{Document, decode_data_uri};
    use crate::ModelFormatError;

    /// One VEC3 float accessor over a 36-byte view of a 36-byte buffer.
    fn positions_doc(accessor: &str, view: &str) -> Document {
        let json = format!(
            r#"{{
                "accessors": [ {{ "bufferView": 0, "componentType": 5126, "type": "VEC3", {accessor} }} ],
                "bufferViews": [ {{ "buffer": 0, "byteLength": 36, {view} }} ],
                "buffers": [ {{ "byteLength": 36 }} ]
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    fn bin() -> Vec<Cow<'static, [u8]>> {
        vec![Cow::Owned(vec![0u8; 36])]
    }

    #[test]
    fn reads_in_bounds_accessor() {
        let doc = positions_doc(r#""count": 3"#, r#""byteOffset": 0"#);
        assert_eq!(doc.read_floats::<3>(&bin(), 0).unwrap().len(), 3);
    }

    #[test]
    fn huge_count_is_an_error_not_an_allocation() {
        let doc = positions_doc(r#""count": 1000000000000000000"#, r#""byteOffset": 0"#);
        assert!(matches!(
            doc.read_floats::<3>(&bin(), 0),
            Err(ModelFormatError::OutOfBounds(0))
        ));
    }

    #[test]
    fn overflowing_offsets_are_errors() {
        let doc = positions_doc(r#""count": 3"#, r#""byteOffset": 18446744073709551615"#);
        assert!(matches!(
            doc.read_floats::<3>(&bin(), 0),
            Err(ModelFormatError::ViewOutOfBounds(0))
        ));

        let doc = positions_doc(
            r#""count": 2, "byteOffset": 18446744073709551615"#,
            r#""byteOffset": 0"#,
        );
        assert!(matches!(
            doc.read_floats::<3>(&bin(), 0),
            Err(ModelFormatError::OutOfBounds(0))
        ));

        let doc = positions_doc(r#""count": 3"#, r#""byteStride": 9223372036854775807"#);
        assert!(matches!(
            doc.read_floats::<3>(&bin(), 0),
            Err(ModelFormatError::OutOfBounds(0))
        ));
    }

    #[test]
    fn empty_accessor_reads_nothing() {
        let doc = positions_doc(r#""count": 0"#, r#""byteOffset": 0"#);
        assert_eq!(doc.read_floats::<3>(&bin(), 0).unwrap(), Vec::<[f32; 3]>::new());
    }

    #[test]
    fn decodes_base64_data_uris() {
        let bytes = decode_data_uri("data:application/octet-stream;base64,AQID").unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_non_base64_data_uris() {
        assert!(matches!(
            decode_data_uri("data:text/plain,hello"),
            Err(ModelFormatError::InvalidDataUri)
        ));
        assert!(matches!(
            decode_data_uri("data:application/octet-stream;base64,@@@"),
            Err(ModelFormatError::Base64(_))
        ));
    }
}
