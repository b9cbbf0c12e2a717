//! Package fixtures.
//!
//! Builds real package archives with a compiled manifest so validation, the
//! orchestrator and the CLI can be exercised end to end without checked-in
//! binaries.

use anyhow::Result;
use std::io::Write;
use std::path::Path;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

const RES_XML_TYPE: u16 = 0x0003;
const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
const UTF8_FLAG: u32 = 1 << 8;
const NO_INDEX: u32 = u32::MAX;
const TYPE_STRING: u8 = 0x03;
const TYPE_INT_DEC: u8 = 0x10;

/// Default padding, large enough to clear the minimum package size.
pub const DEFAULT_PADDING: usize = 120 * 1024;

/// Identity to compile into a fixture manifest.
#[derive(Debug, Clone)]
pub struct ManifestSpec {
    pub package: String,
    pub version_code: u32,
    pub version_name: String,
    pub utf8: bool,
    pub padding: usize,
}

impl ManifestSpec {
    pub fn new(package: &str, version_code: u32, version_name: &str) -> Self {
        Self {
            package: package.to_string(),
            version_code,
            version_name: version_name.to_string(),
            utf8: false,
            padding: DEFAULT_PADDING,
        }
    }

    /// Encode the string pool as UTF-8 instead of UTF-16.
    #[must_use]
    pub fn utf8(mut self) -> Self {
        self.utf8 = true;
        self
    }

    #[must_use]
    pub fn with_padding(mut self, bytes: usize) -> Self {
        self.padding = bytes;
        self
    }
}

/// Write a package archive for `spec` to `path`.
pub fn write_package(path: &Path, spec: &ManifestSpec) -> Result<()> {
    write_archive(path, &compile_manifest(spec), spec.padding)
}

/// Write a package archive whose manifest entry is `manifest`, verbatim.
pub fn write_package_with_manifest(path: &Path, manifest: &[u8]) -> Result<()> {
    write_archive(path, manifest, DEFAULT_PADDING)
}

/// Package archive bytes for `spec`, for serving from a mock server.
pub fn package_bytes(spec: &ManifestSpec) -> Result<Vec<u8>> {
    let temp = tempfile::NamedTempFile::new()?;
    write_package(temp.path(), spec)?;
    Ok(std::fs::read(temp.path())?)
}

fn write_archive(path: &Path, manifest: &[u8], padding: usize) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    zip.start_file(crate::package::MANIFEST_ENTRY, stored)?;
    zip.write_all(manifest)?;

    zip.start_file("classes.dex", stored)?;
    zip.write_all(b"dex\n035\0")?;

    if padding > 0 {
        // Stored and pseudo-random so the archive really is this large
        let mut state = 0x2545_f491_u32;
        let filler: Vec<u8> = (0..padding)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        zip.start_file("assets/filler.bin", stored)?;
        zip.write_all(&filler)?;
    }

    zip.finish()?;
    Ok(())
}

/// Compile `spec` into a binary XML manifest.
pub fn compile_manifest(spec: &ManifestSpec) -> Vec<u8> {
    // Indices 0 and 1 are covered by the resource map
    let strings = [
        "versionCode",
        "versionName",
        "package",
        "manifest",
        spec.package.as_str(),
        spec.version_name.as_str(),
    ];

    let pool = string_pool(&strings, spec.utf8);

    let mut resource_map = Vec::new();
    put_u16(&mut resource_map, RES_XML_RESOURCE_MAP_TYPE);
    put_u16(&mut resource_map, 8);
    put_u32(&mut resource_map, 16);
    put_u32(&mut resource_map, 0x0101_021b);
    put_u32(&mut resource_map, 0x0101_021c);

    let attributes = [
        (2u32, 4u32, TYPE_STRING, 4u32),
        (0, NO_INDEX, TYPE_INT_DEC, spec.version_code),
        (1, 5, TYPE_STRING, 5),
    ];

    let mut element = Vec::new();
    put_u16(&mut element, RES_XML_START_ELEMENT_TYPE);
    put_u16(&mut element, 16);
    put_u32(&mut element, 16 + 20 + 20 * attributes.len() as u32);
    put_u32(&mut element, 1);
    put_u32(&mut element, NO_INDEX);
    put_u32(&mut element, NO_INDEX);
    put_u32(&mut element, 3);
    put_u16(&mut element, 20);
    put_u16(&mut element, 20);
    put_u16(&mut element, attributes.len() as u16);
    put_u16(&mut element, 0);
    put_u16(&mut element, 0);
    put_u16(&mut element, 0);
    for (name, raw, data_type, data) in attributes {
        put_u32(&mut element, NO_INDEX);
        put_u32(&mut element, name);
        put_u32(&mut element, raw);
        put_u16(&mut element, 8);
        element.push(0);
        element.push(data_type);
        put_u32(&mut element, data);
    }

    let total = 8 + pool.len() + resource_map.len() + element.len();
    let mut doc = Vec::with_capacity(total);
    put_u16(&mut doc, RES_XML_TYPE);
    put_u16(&mut doc, 8);
    put_u32(&mut doc, total as u32);
    doc.extend_from_slice(&pool);
    doc.extend_from_slice(&resource_map);
    doc.extend_from_slice(&element);
    doc
}

fn string_pool(strings: &[&str], utf8: bool) -> Vec<u8> {
    let mut data = Vec::new();
    let mut offsets = Vec::with_capacity(strings.len());

    for s in strings {
        offsets.push(data.len() as u32);
        if utf8 {
            put_utf8_len(&mut data, s.chars().count());
            put_utf8_len(&mut data, s.len());
            data.extend_from_slice(s.as_bytes());
            data.push(0);
        } else {
            let units: Vec<u16> = s.encode_utf16().collect();
            put_u16(&mut data, units.len() as u16);
            for unit in units {
                put_u16(&mut data, unit);
            }
            put_u16(&mut data, 0);
        }
    }
    while data.len() % 4 != 0 {
        data.push(0);
    }

    let header_size = 28u32;
    let strings_start = header_size + 4 * strings.len() as u32;
    let mut pool = Vec::new();
    put_u16(&mut pool, RES_STRING_POOL_TYPE);
    put_u16(&mut pool, header_size as u16);
    put_u32(&mut pool, strings_start + data.len() as u32);
    put_u32(&mut pool, strings.len() as u32);
    put_u32(&mut pool, 0);
    put_u32(&mut pool, if utf8 { UTF8_FLAG } else { 0 });
    put_u32(&mut pool, strings_start);
    put_u32(&mut pool, 0);
    for offset in offsets {
        put_u32(&mut pool, offset);
    }
    pool.extend_from_slice(&data);
    pool
}

fn put_utf8_len(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        out.push(((len >> 8) as u8) | 0x80);
        out.push(len as u8);
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}
