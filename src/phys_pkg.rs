//! Provides a general interface to a physical OPC package (ZIP file).
//!
//! This module handles the low-level reading and writing of OPC packages as
//! ZIP archives. Reading goes through the [`PhysPkgRead`] seam so the
//! package loader never depends on the ZIP backend directly, which leaves
//! room for non-archive container backends.
//!
//! Some non-conforming producers split a logical item across numbered
//! sibling entries (e.g. `[Content_Types].xml/[0]`, `[Content_Types].xml/[1]`).
//! Lookups here fall back to collecting such fragments, sorting them by
//! their bracketed numeric index, and joining them with a newline. That
//! reproduces the layout those producers expect; it is only sound for
//! textual XML payloads.

use crate::error::{OpcError, Result};
use crate::packuri::{CONTENT_TYPES_URI, PackURI};
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use zip::result::ZipError;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

/// Zip membername of the content-type registry
const CONTENT_TYPES_MEMBERNAME: &str = "[Content_Types].xml";

/// Read access to a physical OPC package.
///
/// The package loader consumes this interface; [`ZipPkgReader`] is the zip
/// archive implementation. Handle release is by ownership: dropping an
/// implementation releases the underlying archive on every exit path.
pub trait PhysPkgRead {
    /// Get the bytes stored for *pack_uri*.
    ///
    /// Falls back to fragment collection on a direct-lookup miss; fails
    /// with `MemberNotFound` when neither matches.
    fn blob_for(&mut self, pack_uri: &PackURI) -> Result<Vec<u8>>;

    /// Check whether the content-type registry is stored as a fragmented
    /// directory rather than a single entry.
    fn content_types_is_fragmented(&self) -> bool;

    /// Get the content-type registry as a single XML document, joining
    /// fragments when the registry is stored fragmented.
    fn content_types_xml(&mut self) -> Result<Vec<u8>>;

    /// Get the individual content-type registry fragments, ascending by
    /// fragment index.
    fn content_types_xml_fragments(&mut self) -> Result<Vec<Vec<u8>>>;

    /// Get the relationship-item bytes for *source_uri*, or `None` when the
    /// source has no relationship item. Absence is not an error.
    fn rels_xml_for(&mut self, source_uri: &PackURI) -> Result<Option<Vec<u8>>>;
}

/// Write access to a physical OPC package.
///
/// One compressed entry per call; registry and relationship-item synthesis
/// belong to a higher layer.
pub trait PhysPkgWrite {
    /// Store *blob* under the membername corresponding to *pack_uri*.
    fn write(&mut self, pack_uri: &PackURI, blob: &[u8]) -> Result<()>;
}

/// Extract the bracketed numeric index from a fragment entry name, e.g.
/// 21 from "part.xml/[21]". Bracket pairs whose content is not all digits
/// (like the literal "[Content_Types]") are skipped.
fn fragment_index(name: &[u8]) -> Option<u64> {
    let mut pos = 0;
    while let Some(open) = memchr::memchr(b'[', &name[pos..]) {
        let start = pos + open + 1;
        let close = memchr::memchr(b']', &name[start..])?;
        let end = start + close;
        if end > start
            && let Ok(idx) = atoi_simd::parse::<u64>(&name[start..end])
        {
            return Some(idx);
        }
        pos = end + 1;
    }
    None
}

/// Join fragment payloads with a single newline byte between them.
fn join_fragments(frags: Vec<Vec<u8>>) -> Vec<u8> {
    let total: usize =
        frags.iter().map(Vec::len).sum::<usize>() + frags.len().saturating_sub(1);
    let mut joined = Vec::with_capacity(total);
    for (i, frag) in frags.iter().enumerate() {
        if i > 0 {
            joined.push(b'\n');
        }
        joined.extend_from_slice(frag);
    }
    joined
}

/// Physical package reader over a ZIP archive.
pub struct ZipPkgReader<R: Read + Seek> {
    /// The underlying ZIP archive
    zipf: ZipArchive<R>,
}

impl ZipPkgReader<File> {
    /// Open an OPC package from a file path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OpcError::PackageNotFound(path.display().to_string()));
        }
        Self::new(File::open(path)?)
    }
}

impl ZipPkgReader<Cursor<Vec<u8>>> {
    /// Open an OPC package from owned bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::new(Cursor::new(data))
    }
}

impl<R: Read + Seek> ZipPkgReader<R> {
    /// Open an OPC package from any seekable reader.
    pub fn new(reader: R) -> Result<Self> {
        Ok(Self {
            zipf: ZipArchive::new(reader)?,
        })
    }

    /// Read one archive member in full.
    fn read_member(&mut self, membername: &str) -> std::result::Result<Vec<u8>, ZipError> {
        let mut file = self.zipf.by_name(membername)?;
        let mut blob = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut blob).map_err(ZipError::Io)?;
        Ok(blob)
    }

    /// Collect fragment payloads for entries whose names satisfy *pred*,
    /// ascending by fragment index. Entries without a numeric index and
    /// empty payloads are dropped.
    fn fragments_matching<F>(&mut self, pred: F) -> Result<Vec<Vec<u8>>>
    where
        F: Fn(&str) -> bool,
    {
        let names: Vec<String> = self
            .zipf
            .file_names()
            .filter(|name| pred(name))
            .map(String::from)
            .collect();

        let mut frags: Vec<(u64, Vec<u8>)> = Vec::with_capacity(names.len());
        for name in names {
            let Some(idx) = fragment_index(name.as_bytes()) else {
                continue;
            };
            let data = self.read_member(&name)?;
            if data.is_empty() {
                continue;
            }
            frags.push((idx, data));
        }

        frags.sort_by_key(|&(idx, _)| idx);
        Ok(frags.into_iter().map(|(_, data)| data).collect())
    }
}

impl<R: Read + Seek> PhysPkgRead for ZipPkgReader<R> {
    fn blob_for(&mut self, pack_uri: &PackURI) -> Result<Vec<u8>> {
        let membername = pack_uri.membername();
        match self.read_member(membername) {
            Ok(blob) => Ok(blob),
            Err(ZipError::FileNotFound) => {
                let frags = self.fragments_matching(|name| name.contains(membername))?;
                if frags.is_empty() {
                    Err(OpcError::MemberNotFound(pack_uri.to_string()))
                } else {
                    Ok(join_fragments(frags))
                }
            },
            Err(err) => Err(err.into()),
        }
    }

    fn content_types_is_fragmented(&self) -> bool {
        let dir_prefix = format!("{}/", CONTENT_TYPES_MEMBERNAME);
        self.zipf.file_names().any(|name| name.contains(&dir_prefix))
    }

    fn content_types_xml(&mut self) -> Result<Vec<u8>> {
        match self.read_member(CONTENT_TYPES_MEMBERNAME) {
            Ok(blob) => Ok(blob),
            Err(ZipError::FileNotFound) => {
                Ok(join_fragments(self.content_types_xml_fragments()?))
            },
            Err(err) => Err(err.into()),
        }
    }

    fn content_types_xml_fragments(&mut self) -> Result<Vec<Vec<u8>>> {
        let frags =
            self.fragments_matching(|name| name.contains(CONTENT_TYPES_MEMBERNAME))?;
        if frags.is_empty() {
            return Err(OpcError::MemberNotFound(CONTENT_TYPES_URI.to_string()));
        }
        Ok(frags)
    }

    fn rels_xml_for(&mut self, source_uri: &PackURI) -> Result<Option<Vec<u8>>> {
        let rels_uri = source_uri.rels_uri();
        let membername = rels_uri.membername().to_string();
        match self.read_member(&membername) {
            Ok(blob) => Ok(Some(blob)),
            Err(ZipError::FileNotFound) => {
                let frags =
                    self.fragments_matching(|name| name.starts_with(membername.as_str()))?;
                if frags.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(join_fragments(frags)))
                }
            },
            Err(err) => Err(err.into()),
        }
    }
}

/// Physical package writer over a ZIP archive.
///
/// Writes one Deflate-compressed entry per part. `finish` must be called to
/// flush the central directory; dropping the writer releases the handle on
/// error paths.
pub struct ZipPkgWriter<W: Write + Seek> {
    /// The underlying ZIP archive writer
    zipf: ZipWriter<W>,
}

impl ZipPkgWriter<Cursor<Vec<u8>>> {
    /// Create a package writer that writes to memory.
    pub fn new() -> Self {
        Self::with_writer(Cursor::new(Vec::new()))
    }

    /// Finish writing and return the package bytes.
    pub fn finish_to_bytes(self) -> Result<Vec<u8>> {
        Ok(self.finish()?.into_inner())
    }
}

impl ZipPkgWriter<File> {
    /// Create a package writer targeting a file path.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::with_writer(File::create(path)?))
    }
}

impl<W: Write + Seek> ZipPkgWriter<W> {
    /// Create a package writer with a custom writer.
    pub fn with_writer(writer: W) -> Self {
        Self {
            zipf: ZipWriter::new(writer),
        }
    }

    /// Finish writing, flushing the central directory, and return the
    /// underlying writer.
    pub fn finish(self) -> Result<W> {
        Ok(self.zipf.finish()?)
    }
}

impl<W: Write + Seek> PhysPkgWrite for ZipPkgWriter<W> {
    fn write(&mut self, pack_uri: &PackURI, blob: &[u8]) -> Result<()> {
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zipf.start_file(pack_uri.membername(), options)?;
        self.zipf.write_all(blob)?;
        Ok(())
    }
}

impl Default for ZipPkgWriter<Cursor<Vec<u8>>> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack_uri(uri: &str) -> PackURI {
        PackURI::new(uri).unwrap()
    }

    fn build_pkg(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipPkgWriter::new();
        for (uri, blob) in entries {
            writer.write(&pack_uri(uri), blob).unwrap();
        }
        writer.finish_to_bytes().unwrap()
    }

    #[test]
    fn test_round_trip() {
        let data = build_pkg(&[("/test.txt", b"Hello, World!")]);
        let mut reader = ZipPkgReader::from_bytes(data).unwrap();
        assert_eq!(reader.blob_for(&pack_uri("/test.txt")).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.zip");

        let mut writer = ZipPkgWriter::create(&path).unwrap();
        writer.write(&pack_uri("/word/document.xml"), b"<document/>").unwrap();
        writer.finish().unwrap();

        let mut reader = ZipPkgReader::open(&path).unwrap();
        assert_eq!(
            reader.blob_for(&pack_uri("/word/document.xml")).unwrap(),
            b"<document/>"
        );
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            ZipPkgReader::open("no/such/package.docx"),
            Err(OpcError::PackageNotFound(_))
        ));
    }

    #[test]
    fn test_member_not_found() {
        let data = build_pkg(&[("/a.xml", b"<a/>")]);
        let mut reader = ZipPkgReader::from_bytes(data).unwrap();
        assert!(matches!(
            reader.blob_for(&pack_uri("/b.xml")),
            Err(OpcError::MemberNotFound(_))
        ));
    }

    #[test]
    fn test_fragment_index() {
        assert_eq!(fragment_index(b"[Content_Types].xml/[0]"), Some(0));
        assert_eq!(fragment_index(b"word/part.xml/[21]"), Some(21));
        assert_eq!(fragment_index(b"[Content_Types].xml"), None);
        assert_eq!(fragment_index(b"plain.xml"), None);
    }

    #[test]
    fn test_fragmented_content_types() {
        let data = build_pkg(&[
            ("/[Content_Types].xml/[1]", b"B"),
            ("/[Content_Types].xml/[0]", b"A"),
        ]);
        let mut reader = ZipPkgReader::from_bytes(data).unwrap();

        assert!(reader.content_types_is_fragmented());
        assert_eq!(reader.content_types_xml().unwrap(), b"A\nB");
        assert_eq!(
            reader.content_types_xml_fragments().unwrap(),
            vec![b"A".to_vec(), b"B".to_vec()]
        );
    }

    #[test]
    fn test_single_entry_content_types() {
        let data = build_pkg(&[("/[Content_Types].xml", b"<Types/>")]);
        let mut reader = ZipPkgReader::from_bytes(data).unwrap();

        assert!(!reader.content_types_is_fragmented());
        assert_eq!(reader.content_types_xml().unwrap(), b"<Types/>");
    }

    #[test]
    fn test_missing_content_types() {
        let data = build_pkg(&[("/a.xml", b"<a/>")]);
        let mut reader = ZipPkgReader::from_bytes(data).unwrap();
        assert!(matches!(
            reader.content_types_xml(),
            Err(OpcError::MemberNotFound(_))
        ));
    }

    #[test]
    fn test_rels_fragment_fallback() {
        let data = build_pkg(&[
            ("/_rels/.rels/[1]", b"<second/>"),
            ("/_rels/.rels/[0]", b"<first/>"),
        ]);
        let mut reader = ZipPkgReader::from_bytes(data).unwrap();

        let rels = reader.rels_xml_for(&pack_uri("/")).unwrap().unwrap();
        assert_eq!(rels, b"<first/>\n<second/>");
    }

    #[test]
    fn test_absent_rels_is_none() {
        let data = build_pkg(&[("/a.xml", b"<a/>")]);
        let mut reader = ZipPkgReader::from_bytes(data).unwrap();
        assert!(reader.rels_xml_for(&pack_uri("/a.xml")).unwrap().is_none());
    }

    #[test]
    fn test_blob_fragment_fallback() {
        let data = build_pkg(&[
            ("/word/data.xml/[0]", b"alpha"),
            ("/word/data.xml/[1]", b"beta"),
        ]);
        let mut reader = ZipPkgReader::from_bytes(data).unwrap();
        assert_eq!(
            reader.blob_for(&pack_uri("/word/data.xml")).unwrap(),
            b"alpha\nbeta"
        );
    }
}
