use crate::ModelFormatError;

pub const GLB_MAGIC: u32 = 0x4654_6C67;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;
const HEADER_LEN: usize = 12;

/// Borrowed view of the chunks of a binary glTF container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glb<'a> {
    pub json: &'a [u8],
    pub bin: Option<&'a [u8]>,
}

pub fn is_glb(bytes: &[u8]) -> bool {
    read_u32(bytes, 0) == Some(GLB_MAGIC)
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

impl<'a> Glb<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ModelFormatError> {
        if bytes.is_empty() {
            return Err(ModelFormatError::Empty);
        }
        if !is_glb(bytes) {
            return Err(ModelFormatError::BadMagic);
        }
        let version = read_u32(bytes, 4).ok_or(ModelFormatError::Truncated("header"))?;
        if version != 2 {
            return Err(ModelFormatError::UnsupportedVersion(version));
        }
        let length = read_u32(bytes, 8).ok_or(ModelFormatError::Truncated("header"))? as usize;
        if length > bytes.len() {
            return Err(ModelFormatError::Truncated("container"));
        }
        let bytes = &bytes[..length];

        let mut json = None;
        let mut bin = None;
        let mut at = HEADER_LEN;
        while at < bytes.len() {
            let chunk_len = read_u32(bytes, at).ok_or(ModelFormatError::Truncated("chunk header"))?
                as usize;
            let kind = read_u32(bytes, at + 4).ok_or(ModelFormatError::Truncated("chunk header"))?;
            let start = at + 8;
            let end = start
                .checked_add(chunk_len)
                .ok_or(ModelFormatError::Truncated("chunk"))?;
            let data = bytes
                .get(start..end)
                .ok_or(ModelFormatError::Truncated("chunk"))?;
            match kind {
                CHUNK_JSON if json.is_none() => json = Some(data),
                CHUNK_BIN if bin.is_none() => bin = Some(data),
                _ => {}
            }
            at = end;
        }

        Ok(Self {
            json: json.ok_or(ModelFormatError::MissingJsonChunk)?,
            bin,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{CHUNK_BIN, CHUNK_JSON, GLB_MAGIC, Glb};
    use crate::ModelFormatError;

    fn pad(mut data: Vec<u8>, fill: u8) -> Vec<u8> {
        while data.len() % 4 != 0 {
            data.push(fill);
        }
        data
    }

    /// Assembles a GLB container from a JSON document and a BIN payload.
    pub(crate) fn build_glb(json: &str, bin: &[u8]) -> Vec<u8> {
        let json = pad(json.as_bytes().to_vec(), b' ');
        let bin = pad(bin.to_vec(), 0);
        let total = 12 + 8 + json.len() + if bin.is_empty() { 0 } else { 8 + bin.len() };
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
        out.extend_from_slice(&json);
        if !bin.is_empty() {
            out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
            out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
            out.extend_from_slice(&bin);
        }
        out
    }

    #[test]
    fn splits_json_and_bin_chunks() {
        let bytes = build_glb("{}", &[1, 2, 3, 4]);
        let glb = Glb::parse(&bytes).unwrap();
        assert_eq!(glb.json, b"{}  ");
        assert_eq!(glb.bin, Some(&[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        assert!(matches!(Glb::parse(b"nope-nope-nope"), Err(ModelFormatError::BadMagic)));
        let bytes = build_glb("{}", &[]);
        assert!(matches!(
            Glb::parse(&bytes[..bytes.len() - 2]),
            Err(ModelFormatError::Truncated(_))
        ));
    }

    #[test]
    fn oversized_chunk_length_is_truncation() {
        let mut bytes = build_glb("{}", &[]);
        bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(Glb::parse(&bytes), Err(ModelFormatError::Truncated("chunk"))));
    }

    #[test]
    fn rejects_other_versions() {
        let mut bytes = build_glb("{}", &[]);
        bytes[4] = 1;
        assert!(matches!(Glb::parse(&bytes), Err(ModelFormatError::UnsupportedVersion(1))));
    }
}
