//! Minimal reader for compiled (binary) Android XML manifests.
//!
//! Only what is needed to identify a package is decoded: the string pool, the
//! resource map, and the attributes of the root `<manifest>` element. Every read
//! is bounds-checked; malformed input yields a [`ManifestError`], never a panic.

use thiserror::Error;

const RES_XML_TYPE: u16 = 0x0003;
const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;

const UTF8_FLAG: u32 = 1 << 8;
const NO_INDEX: u32 = u32::MAX;

const TYPE_STRING: u8 = 0x03;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_HEX: u8 = 0x11;

// Framework attribute ids, used when attribute names were stripped
const ATTR_VERSION_CODE: u32 = 0x0101_021b;
const ATTR_VERSION_NAME: u32 = 0x0101_021c;

/// Why a compiled manifest could not be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("not a compiled XML document")]
    NotBinaryXml,

    #[error("manifest truncated at offset {offset}")]
    Truncated {
        offset: usize,
    },

    #[error("string index {index} out of range")]
    BadStringIndex {
        index: u32,
    },

    #[error("root element is '{found}', expected 'manifest'")]
    UnexpectedRoot {
        found: String,
    },

    #[error("no <manifest> element found")]
    MissingManifestElement,
}

/// Identity attributes of the root `<manifest>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestAttributes {
    pub package: Option<String>,
    pub version_code: Option<u32>,
    pub version_name: Option<String>,
}

/// True if `data` starts with the compiled XML chunk header.
pub fn is_binary_xml(data: &[u8]) -> bool {
    data.len() >= 8 && u16::from_le_bytes([data[0], data[1]]) == RES_XML_TYPE
}

struct Reader<'a> {
    data: &'a [u8],
}

impl Reader<'_> {
    fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], ManifestError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(ManifestError::Truncated {
                offset,
            })
    }

    fn u8(&self, offset: usize) -> Result<u8, ManifestError> {
        Ok(self.bytes(offset, 1)?[0])
    }

    fn u16(&self, offset: usize) -> Result<u16, ManifestError> {
        let b = self.bytes(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&self, offset: usize) -> Result<u32, ManifestError> {
        let b = self.bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Parse the `<manifest>` attributes out of a compiled manifest.
pub fn parse_binary_manifest(data: &[u8]) -> Result<ManifestAttributes, ManifestError> {
    if !is_binary_xml(data) {
        return Err(ManifestError::NotBinaryXml);
    }

    let r = Reader {
        data,
    };
    let header_size = usize::from(r.u16(2)?);
    let end = (r.u32(4)? as usize).min(data.len());

    let mut strings: Vec<String> = Vec::new();
    let mut resource_ids: Vec<u32> = Vec::new();
    let mut offset = header_size;

    while offset + 8 <= end {
        let chunk_type = r.u16(offset)?;
        let chunk_header = usize::from(r.u16(offset + 2)?);
        let chunk_size = r.u32(offset + 4)? as usize;
        if chunk_size < 8 || chunk_header > chunk_size || offset + chunk_size > data.len() {
            return Err(ManifestError::Truncated {
                offset,
            });
        }

        match chunk_type {
            RES_STRING_POOL_TYPE => strings = read_string_pool(&r, offset)?,
            RES_XML_RESOURCE_MAP_TYPE => {
                let count = (chunk_size - chunk_header) / 4;
                resource_ids = (0..count)
                    .map(|i| r.u32(offset + chunk_header + i * 4))
                    .collect::<Result<_, _>>()?;
            }
            RES_XML_START_ELEMENT_TYPE => {
                return read_manifest_element(&r, offset + chunk_header, &strings, &resource_ids);
            }
            _ => {}
        }

        offset += chunk_size;
    }

    Err(ManifestError::MissingManifestElement)
}

fn read_manifest_element(
    r: &Reader<'_>,
    ext: usize,
    strings: &[String],
    resource_ids: &[u32],
) -> Result<ManifestAttributes, ManifestError> {
    let name = string_at(strings, r.u32(ext + 4)?)?;
    if name != "manifest" {
        return Err(ManifestError::UnexpectedRoot {
            found: name.to_string(),
        });
    }

    let attr_start = usize::from(r.u16(ext + 8)?);
    let attr_size = usize::from(r.u16(ext + 10)?);
    let attr_count = usize::from(r.u16(ext + 12)?);

    let mut attrs = ManifestAttributes::default();
    for i in 0..attr_count {
        let a = ext + attr_start + i * attr_size;
        let name_index = r.u32(a + 4)?;
        let raw_value = r.u32(a + 8)?;
        let data_type = r.u8(a + 15)?;
        let data = r.u32(a + 16)?;

        let name = strings.get(name_index as usize).map_or("", String::as_str);
        let resource_id = resource_ids.get(name_index as usize).copied();

        let string_value = || -> Result<Option<String>, ManifestError> {
            if raw_value != NO_INDEX {
                Ok(Some(string_at(strings, raw_value)?.to_string()))
            } else if data_type == TYPE_STRING {
                Ok(Some(string_at(strings, data)?.to_string()))
            } else {
                Ok(None)
            }
        };

        if name == "package" {
            attrs.package = string_value()?;
        } else if name == "versionCode" || resource_id == Some(ATTR_VERSION_CODE) {
            attrs.version_code = match data_type {
                TYPE_INT_DEC | TYPE_INT_HEX => Some(data),
                _ => string_value()?.and_then(|s| s.trim().parse().ok()),
            };
        } else if name == "versionName" || resource_id == Some(ATTR_VERSION_NAME) {
            attrs.version_name = string_value()?;
        }
    }

    Ok(attrs)
}

fn string_at(strings: &[String], index: u32) -> Result<&str, ManifestError> {
    strings.get(index as usize).map(String::as_str).ok_or(ManifestError::BadStringIndex {
        index,
    })
}

fn read_string_pool(r: &Reader<'_>, chunk: usize) -> Result<Vec<String>, ManifestError> {
    let header_size = usize::from(r.u16(chunk + 2)?);
    let string_count = r.u32(chunk + 8)? as usize;
    let flags = r.u32(chunk + 16)?;
    let strings_start = r.u32(chunk + 20)? as usize;
    let utf8 = flags & UTF8_FLAG != 0;

    let mut strings = Vec::with_capacity(string_count.min(4096));
    for i in 0..string_count {
        let relative = r.u32(chunk + header_size + i * 4)? as usize;
        let at = chunk + strings_start + relative;
        let value = if utf8 {
            read_utf8_string(r, at)?
        } else {
            read_utf16_string(r, at)?
        };
        strings.push(value);
    }
    Ok(strings)
}

fn read_utf8_string(r: &Reader<'_>, at: usize) -> Result<String, ManifestError> {
    // Character count first, then byte count, each one or two bytes
    let (_, skip) = read_utf8_len(r, at)?;
    let (len, skip2) = read_utf8_len(r, at + skip)?;
    let bytes = r.bytes(at + skip + skip2, len)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn read_utf8_len(r: &Reader<'_>, at: usize) -> Result<(usize, usize), ManifestError> {
    let first = r.u8(at)?;
    if first & 0x80 != 0 {
        let second = r.u8(at + 1)?;
        Ok(((usize::from(first & 0x7F) << 8) | usize::from(second), 2))
    } else {
        Ok((usize::from(first), 1))
    }
}

fn read_utf16_string(r: &Reader<'_>, at: usize) -> Result<String, ManifestError> {
    let first = r.u16(at)?;
    let (len, skip) = if first & 0x8000 != 0 {
        let second = r.u16(at + 2)?;
        (((usize::from(first & 0x7FFF)) << 16) | usize::from(second), 4)
    } else {
        (usize::from(first), 2)
    };

    let raw = r.bytes(at + skip, len * 2)?;
    let units: Vec<u16> = raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    Ok(String::from_utf16_lossy(&units))
}
