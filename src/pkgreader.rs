//! Low-level, read-only API to a serialized Open Packaging Convention (OPC)
//! package.
//!
//! [`PackageReader`] resolves the content-type registry, then walks the
//! relationship graph from the package root and materializes every
//! reachable part exactly once. The result is an immutable snapshot with no
//! remaining dependency on the physical archive: the archive handle is
//! released before the reader is returned, on success and failure alike.

use crate::error::{OpcError, Result};
use crate::oxml::{self, CtEntry};
use crate::packuri::{PACKAGE_URI, PackURI};
use crate::phys_pkg::{PhysPkgRead, ZipPkgReader};
use crate::rel::{RelParsePolicy, SerializedRelationship, SerializedRelationships};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Content type map for looking up content types by part name or extension.
///
/// Implements the OPC content type discovery algorithm over the Default and
/// Override entries of `[Content_Types].xml`: an exact override always wins
/// over an extension default. Built once at load time, immutable afterwards.
pub struct ContentTypeMap {
    /// Maps specific partnames to override content types
    overrides: HashMap<String, String>,

    /// Maps lowercased dotted extensions (".xml") to default content types
    defaults: HashMap<String, String>,
}

impl ContentTypeMap {
    fn new() -> Self {
        Self {
            overrides: HashMap::new(),
            defaults: HashMap::new(),
        }
    }

    /// Build a map from one content-type registry document.
    pub fn from_xml(xml: &[u8]) -> Result<Self> {
        let mut map = Self::new();
        map.extend_from_xml(xml)?;
        Ok(map)
    }

    /// Build a map from a sequence of registry documents, as produced by a
    /// fragmented registry directory. Later entries overwrite earlier ones
    /// on key collision.
    pub fn from_xml_list<B: AsRef<[u8]>>(xml_list: &[B]) -> Result<Self> {
        let mut map = Self::new();
        for xml in xml_list {
            map.extend_from_xml(xml.as_ref())?;
        }
        Ok(map)
    }

    /// Fold one registry document's entries into the map, in document
    /// order, last write winning.
    fn extend_from_xml(&mut self, xml: &[u8]) -> Result<()> {
        for entry in oxml::content_type_entries(xml)? {
            match entry {
                CtEntry::Default {
                    extension,
                    content_type,
                } => {
                    let key = format!(".{}", extension.trim_start_matches('.').to_lowercase());
                    self.defaults.insert(key, content_type);
                },
                CtEntry::Override {
                    partname,
                    content_type,
                } => {
                    self.overrides.insert(partname, content_type);
                },
            }
        }
        Ok(())
    }

    /// Get the content type for a partname.
    ///
    /// Checks for an exact override first, then falls back to the default
    /// for the part's extension. Fails with `UnknownContentType` when
    /// neither tier matches.
    pub fn content_type_for(&self, pack_uri: &PackURI) -> Result<&str> {
        if let Some(ct) = self.overrides.get(pack_uri.as_str()) {
            return Ok(ct);
        }

        let ext = pack_uri.ext().to_lowercase();
        if let Some(ct) = self.defaults.get(&ext) {
            return Ok(ct);
        }

        Err(OpcError::UnknownContentType(pack_uri.to_string()))
    }
}

/// Serialized part: an immutable record of one package part.
#[derive(Debug)]
pub struct SerializedPart {
    /// The partname (URI) of this part
    pub partname: PackURI,

    /// The declared content type of this part
    pub content_type: String,

    /// The binary content of this part
    pub blob: Vec<u8>,

    /// This part's own relationships, in document order
    pub srels: SerializedRelationships,
}

/// Package reader that provides access to serialized parts and
/// relationships.
///
/// This is the main entry point for reading OPC packages.
pub struct PackageReader {
    /// The package pseudo-partname, source of package-level relationships
    package_uri: PackURI,

    /// Package-level relationships
    pkg_srels: SerializedRelationships,

    /// All parts reachable from the package root, in first-discovery order
    sparts: Vec<SerializedPart>,
}

impl PackageReader {
    /// Load a package from a file path with the default (lenient)
    /// relationship parse policy.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_phys_reader(ZipPkgReader::open(path)?, RelParsePolicy::default())
    }

    /// Load a package from owned bytes with the default (lenient)
    /// relationship parse policy.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_phys_reader(ZipPkgReader::from_bytes(data)?, RelParsePolicy::default())
    }

    /// Load a package through any physical reader.
    ///
    /// Resolves the content-type registry (fatal on failure), loads the
    /// package-level relationships (absent item yields an empty
    /// collection), then walks the relationship graph. Consumes the
    /// physical reader: its handle is released before the model is
    /// returned, on success and failure alike.
    pub fn from_phys_reader<P: PhysPkgRead>(
        mut phys_reader: P,
        policy: RelParsePolicy,
    ) -> Result<Self> {
        let content_types = if phys_reader.content_types_is_fragmented() {
            ContentTypeMap::from_xml_list(&phys_reader.content_types_xml_fragments()?)?
        } else {
            ContentTypeMap::from_xml(&phys_reader.content_types_xml()?)?
        };

        let package_uri = PackURI::new(PACKAGE_URI)?;
        let pkg_srels = Self::srels_for(&mut phys_reader, &package_uri, policy)?;
        let sparts = Self::walk_parts(&mut phys_reader, &pkg_srels, &content_types, policy)?;
        drop(phys_reader);

        Ok(Self {
            package_uri,
            pkg_srels,
            sparts,
        })
    }

    /// Load the relationship collection for one source.
    fn srels_for<P: PhysPkgRead>(
        phys_reader: &mut P,
        source_uri: &PackURI,
        policy: RelParsePolicy,
    ) -> Result<SerializedRelationships> {
        let rels_xml = phys_reader.rels_xml_for(source_uri)?;
        SerializedRelationships::load(source_uri.base_uri(), rels_xml.as_deref(), policy)
    }

    /// Walk the relationship graph rooted at *pkg_srels* and materialize
    /// each reachable internal part exactly once.
    ///
    /// Depth-first, pre-order, with an explicit stack and a visited set;
    /// siblings are pushed in reverse so they pop in document order.
    /// External relationships are leaves: they never produce a part and are
    /// never followed. Parts come back in first-discovery order.
    fn walk_parts<P: PhysPkgRead>(
        phys_reader: &mut P,
        pkg_srels: &SerializedRelationships,
        content_types: &ContentTypeMap,
        policy: RelParsePolicy,
    ) -> Result<Vec<SerializedPart>> {
        let mut sparts = Vec::with_capacity(32);
        let mut visited: HashSet<PackURI> = HashSet::with_capacity(32);
        let mut stack: Vec<SerializedRelationship> = Vec::with_capacity(pkg_srels.len());

        for srel in pkg_srels.iter().rev() {
            stack.push(srel.clone());
        }

        while let Some(srel) = stack.pop() {
            if srel.is_external() {
                continue;
            }
            let partname = srel.target_partname()?.clone();
            if !visited.insert(partname.clone()) {
                continue;
            }

            let blob = phys_reader.blob_for(&partname)?;
            let content_type = content_types.content_type_for(&partname)?.to_string();
            let part_srels = Self::srels_for(phys_reader, &partname, policy)?;

            for child in part_srels.iter().rev() {
                stack.push(child.clone());
            }

            sparts.push(SerializedPart {
                partname,
                content_type,
                blob,
                srels: part_srels,
            });
        }

        Ok(sparts)
    }

    /// Get the package-level relationships.
    #[inline]
    pub fn pkg_srels(&self) -> &SerializedRelationships {
        &self.pkg_srels
    }

    /// Get the loaded parts, in first-discovery order.
    #[inline]
    pub fn sparts(&self) -> &[SerializedPart] {
        &self.sparts
    }

    /// Iterate `(partname, content_type, blob)` for each part in the
    /// package.
    pub fn iter_sparts(&self) -> impl Iterator<Item = (&PackURI, &str, &[u8])> {
        self.sparts
            .iter()
            .map(|spart| (&spart.partname, spart.content_type.as_str(), spart.blob.as_slice()))
    }

    /// Iterate `(source, relationship)` for every relationship in the
    /// package: package-level relationships first (sourced at the package
    /// URI), then each part's, in part order.
    pub fn iter_srels(&self) -> impl Iterator<Item = (&PackURI, &SerializedRelationship)> {
        self.pkg_srels
            .iter()
            .map(|srel| (&self.package_uri, srel))
            .chain(self.sparts.iter().flat_map(|spart| {
                spart.srels.iter().map(move |srel| (&spart.partname, srel))
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{content_type, namespace, relationship_type};
    use crate::phys_pkg::{PhysPkgWrite, ZipPkgWriter};

    const CT_XML: &[u8] = br#"<?xml version="1.0"?>
        <Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
            <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
            <Default Extension="xml" ContentType="application/xml"/>
            <Default Extension="png" ContentType="image/png"/>
        </Types>"#;

    fn rels_xml(rels: &[(&str, &str, bool)]) -> Vec<u8> {
        let mut xml = format!(r#"<Relationships xmlns="{}">"#, namespace::OPC_RELATIONSHIPS);
        for (r_id, target, external) in rels {
            let (reltype, mode) = if *external {
                (relationship_type::HYPERLINK, r#" TargetMode="External""#)
            } else {
                (relationship_type::OFFICE_DOCUMENT, "")
            };
            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                r_id, reltype, target, mode
            ));
        }
        xml.push_str("</Relationships>");
        xml.into_bytes()
    }

    fn build_pkg(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipPkgWriter::new();
        for (uri, blob) in entries {
            writer.write(&PackURI::new(*uri).unwrap(), blob).unwrap();
        }
        writer.finish_to_bytes().unwrap()
    }

    #[test]
    fn test_override_beats_default() {
        let xml = br#"<Types>
            <Default Extension="xml" ContentType="T2"/>
            <Override PartName="/a.xml" ContentType="T1"/>
        </Types>"#;
        let map = ContentTypeMap::from_xml(xml).unwrap();

        let a = PackURI::new("/a.xml").unwrap();
        let b = PackURI::new("/b.xml").unwrap();
        let c = PackURI::new("/c.bin").unwrap();

        assert_eq!(map.content_type_for(&a).unwrap(), "T1");
        assert_eq!(map.content_type_for(&b).unwrap(), "T2");
        assert!(matches!(
            map.content_type_for(&c),
            Err(OpcError::UnknownContentType(_))
        ));
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let xml = br#"<Types><Default Extension="XML" ContentType="application/xml"/></Types>"#;
        let map = ContentTypeMap::from_xml(xml).unwrap();
        let uri = PackURI::new("/part.xml").unwrap();
        assert_eq!(map.content_type_for(&uri).unwrap(), "application/xml");
    }

    #[test]
    fn test_from_xml_list_last_write_wins() {
        let first = br#"<Types>
            <Default Extension="xml" ContentType="old"/>
            <Override PartName="/a.xml" ContentType="keep"/>
        </Types>"#;
        let second = br#"<Types><Default Extension="xml" ContentType="new"/></Types>"#;

        let map = ContentTypeMap::from_xml_list(&[first.as_slice(), second.as_slice()]).unwrap();
        let a = PackURI::new("/a.xml").unwrap();
        let b = PackURI::new("/b.xml").unwrap();
        assert_eq!(map.content_type_for(&a).unwrap(), "keep");
        assert_eq!(map.content_type_for(&b).unwrap(), "new");
    }

    #[test]
    fn test_load_walks_graph_depth_first() {
        // root -> a, b; a -> c; b -> c (multi-parented c)
        let pkg = build_pkg(&[
            ("/[Content_Types].xml", CT_XML),
            ("/_rels/.rels", &rels_xml(&[("rId1", "a.xml", false), ("rId2", "b.xml", false)])),
            ("/a.xml", b"<a/>"),
            ("/_rels/a.xml.rels", &rels_xml(&[("rId1", "c.xml", false)])),
            ("/b.xml", b"<b/>"),
            ("/_rels/b.xml.rels", &rels_xml(&[("rId1", "c.xml", false)])),
            ("/c.xml", b"<c/>"),
        ]);

        let reader = PackageReader::from_bytes(pkg).unwrap();

        // c materializes once despite two parents; pre-order discovery
        let names: Vec<&str> = reader.iter_sparts().map(|(name, _, _)| name.as_str()).collect();
        assert_eq!(names, ["/a.xml", "/c.xml", "/b.xml"]);

        let (_, ct, blob) = reader.iter_sparts().next().unwrap();
        assert_eq!(ct, content_type::XML);
        assert_eq!(blob, b"<a/>");
    }

    #[test]
    fn test_absolute_target_reference_resolves_from_root() {
        // A nested source may point at a target by absolute reference;
        // the base directory must not leak into the resolved partname.
        let pkg = build_pkg(&[
            ("/[Content_Types].xml", CT_XML),
            ("/_rels/.rels", &rels_xml(&[("rId1", "ppt/a.xml", false)])),
            ("/ppt/a.xml", b"<a/>"),
            ("/ppt/_rels/a.xml.rels", &rels_xml(&[("rId1", "/media/image1.png", false)])),
            ("/media/image1.png", b"png-bytes"),
        ]);

        let reader = PackageReader::from_bytes(pkg).unwrap();
        let names: Vec<&str> = reader.iter_sparts().map(|(name, _, _)| name.as_str()).collect();
        assert_eq!(names, ["/ppt/a.xml", "/media/image1.png"]);
    }

    #[test]
    fn test_external_relationships_are_leaves() {
        let pkg = build_pkg(&[
            ("/[Content_Types].xml", CT_XML),
            (
                "/_rels/.rels",
                &rels_xml(&[("rId1", "a.xml", false), ("rId2", "https://example.com/", true)]),
            ),
            ("/a.xml", b"<a/>"),
        ]);

        let reader = PackageReader::from_bytes(pkg).unwrap();
        assert_eq!(reader.sparts().len(), 1);

        // The external edge still shows up in the relationship listing
        let externals: Vec<_> = reader
            .iter_srels()
            .filter(|(_, srel)| srel.is_external())
            .collect();
        assert_eq!(externals.len(), 1);
        assert_eq!(externals[0].0.as_str(), "/");
        assert_eq!(externals[0].1.target_ref(), "https://example.com/");
    }

    #[test]
    fn test_rootless_package_yields_empty_model() {
        let pkg = build_pkg(&[("/[Content_Types].xml", CT_XML)]);

        let reader = PackageReader::from_bytes(pkg).unwrap();
        assert!(reader.pkg_srels().is_empty());
        assert_eq!(reader.iter_sparts().count(), 0);
        assert_eq!(reader.iter_srels().count(), 0);
    }

    #[test]
    fn test_missing_registry_is_fatal() {
        let pkg = build_pkg(&[("/a.xml", b"<a/>")]);
        assert!(matches!(
            PackageReader::from_bytes(pkg),
            Err(OpcError::MemberNotFound(_))
        ));
    }

    #[test]
    fn test_unknown_content_type_is_fatal() {
        let pkg = build_pkg(&[
            ("/[Content_Types].xml", CT_XML),
            ("/_rels/.rels", &rels_xml(&[("rId1", "a.bin", false)])),
            ("/a.bin", b"\x00\x01"),
        ]);
        assert!(matches!(
            PackageReader::from_bytes(pkg),
            Err(OpcError::UnknownContentType(_))
        ));
    }

    #[test]
    fn test_missing_part_is_fatal() {
        let pkg = build_pkg(&[
            ("/[Content_Types].xml", CT_XML),
            ("/_rels/.rels", &rels_xml(&[("rId1", "missing.xml", false)])),
        ]);
        assert!(matches!(
            PackageReader::from_bytes(pkg),
            Err(OpcError::MemberNotFound(_))
        ));
    }

    #[test]
    fn test_malformed_part_rels_are_absorbed() {
        let pkg = build_pkg(&[
            ("/[Content_Types].xml", CT_XML),
            ("/_rels/.rels", &rels_xml(&[("rId1", "a.xml", false)])),
            ("/a.xml", b"<a/>"),
            ("/_rels/a.xml.rels", b"<Relationships><Relationship"),
        ]);

        let reader = PackageReader::from_bytes(pkg).unwrap();
        assert_eq!(reader.sparts().len(), 1);
        assert!(reader.sparts()[0].srels.is_empty());
    }

    #[test]
    fn test_malformed_part_rels_fail_under_strict_policy() {
        let pkg = build_pkg(&[
            ("/[Content_Types].xml", CT_XML),
            ("/_rels/.rels", &rels_xml(&[("rId1", "a.xml", false)])),
            ("/a.xml", b"<a/>"),
            ("/_rels/a.xml.rels", b"<Relationships><Relationship"),
        ]);

        let phys_reader = ZipPkgReader::from_bytes(pkg).unwrap();
        assert!(matches!(
            PackageReader::from_phys_reader(phys_reader, RelParsePolicy::Strict),
            Err(OpcError::RelationshipParse(_, _))
        ));
    }

    #[test]
    fn test_fragmented_registry_load() {
        let frag0 = br#"<Types><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/></Types>"#;
        let frag1 = br#"<Types><Default Extension="xml" ContentType="application/xml"/></Types>"#;
        let pkg = build_pkg(&[
            ("/[Content_Types].xml/[0]", frag0),
            ("/[Content_Types].xml/[1]", frag1),
            ("/_rels/.rels", &rels_xml(&[("rId1", "a.xml", false)])),
            ("/a.xml", b"<a/>"),
        ]);

        let reader = PackageReader::from_bytes(pkg).unwrap();
        assert_eq!(reader.sparts().len(), 1);
        assert_eq!(reader.sparts()[0].content_type, "application/xml");
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let payload: &[u8] = b"\x89PNG\r\n\x1a\nimage-bytes";
        let pkg = build_pkg(&[
            ("/[Content_Types].xml", CT_XML),
            ("/_rels/.rels", &rels_xml(&[("rId1", "media/image1.png", false)])),
            ("/media/image1.png", payload),
        ]);

        let reader = PackageReader::from_bytes(pkg).unwrap();
        let (name, ct, blob) = reader.iter_sparts().next().unwrap();
        assert_eq!(name.as_str(), "/media/image1.png");
        assert_eq!(ct, content_type::PNG);
        assert_eq!(blob, payload);
    }

    #[test]
    fn test_iter_srels_sources() {
        let pkg = build_pkg(&[
            ("/[Content_Types].xml", CT_XML),
            ("/_rels/.rels", &rels_xml(&[("rId1", "a.xml", false)])),
            ("/a.xml", b"<a/>"),
            ("/_rels/a.xml.rels", &rels_xml(&[("rId1", "b.xml", false)])),
            ("/b.xml", b"<b/>"),
        ]);

        let reader = PackageReader::from_bytes(pkg).unwrap();
        let sources: Vec<&str> = reader.iter_srels().map(|(src, _)| src.as_str()).collect();
        assert_eq!(sources, ["/", "/a.xml"]);

        // Enumerations snapshot the model; repeat iteration is stable
        assert_eq!(reader.iter_srels().count(), 2);
        assert_eq!(reader.iter_sparts().count(), 2);
    }
}
