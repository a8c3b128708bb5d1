//! XML extraction for the two OPC item kinds the package reader consumes:
//! the content-type registry (`[Content_Types].xml`) and relationship items
//! (`*.rels`).
//!
//! Uses quick-xml for efficient streaming parsing with minimal allocation.
//! Entries are yielded in document order, which downstream code relies on
//! for last-write-wins registry merging and for relationship ordering.

use crate::error::Result;
use crate::rel::TargetMode;
use quick_xml::Reader;
use quick_xml::events::Event;

/// One entry of the content-type registry, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtEntry {
    /// `<Default Extension="xml" ContentType="application/xml"/>`
    Default {
        extension: String,
        content_type: String,
    },

    /// `<Override PartName="/word/document.xml" ContentType="..."/>`
    Override {
        partname: String,
        content_type: String,
    },
}

/// Parse the content-type registry into its Default/Override entries.
///
/// Elements missing a required attribute are skipped. Entries are returned
/// in document order.
pub fn content_type_entries(xml: &[u8]) -> Result<Vec<CtEntry>> {
    let mut entries = Vec::new();
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(ref e) | Event::Start(ref e) => match e.local_name().as_ref() {
                b"Default" => {
                    let mut extension = None;
                    let mut content_type = None;

                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"Extension" => {
                                extension = Some(attr.unescape_value()?.to_string());
                            },
                            b"ContentType" => {
                                content_type = Some(attr.unescape_value()?.to_string());
                            },
                            _ => {},
                        }
                    }

                    if let (Some(extension), Some(content_type)) = (extension, content_type) {
                        entries.push(CtEntry::Default {
                            extension,
                            content_type,
                        });
                    }
                },
                b"Override" => {
                    let mut partname = None;
                    let mut content_type = None;

                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"PartName" => {
                                partname = Some(attr.unescape_value()?.to_string());
                            },
                            b"ContentType" => {
                                content_type = Some(attr.unescape_value()?.to_string());
                            },
                            _ => {},
                        }
                    }

                    if let (Some(partname), Some(content_type)) = (partname, content_type) {
                        entries.push(CtEntry::Override {
                            partname,
                            content_type,
                        });
                    }
                },
                _ => {},
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }

    Ok(entries)
}

/// Raw relationship entry as read from a .rels item, before target
/// resolution against the source's base URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelEntry {
    /// Relationship ID (e.g., "rId1")
    pub r_id: String,

    /// Relationship type URI
    pub reltype: String,

    /// Target mode (Internal when the attribute is absent)
    pub target_mode: TargetMode,

    /// Target reference (relative part reference or external URL)
    pub target_ref: String,
}

/// Parse a relationship item into its entries, in document order.
///
/// `Relationship` elements missing Id, Type, or Target are skipped; an
/// absent TargetMode attribute means Internal.
pub fn relationship_entries(xml: &[u8]) -> Result<Vec<RelEntry>> {
    let mut entries = Vec::new();
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(ref e) | Event::Start(ref e) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut r_id = None;
                    let mut reltype = None;
                    let mut target_ref = None;
                    let mut target_mode = TargetMode::Internal;

                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"Id" => r_id = Some(attr.unescape_value()?.to_string()),
                            b"Type" => reltype = Some(attr.unescape_value()?.to_string()),
                            b"Target" => target_ref = Some(attr.unescape_value()?.to_string()),
                            b"TargetMode" => {
                                target_mode = TargetMode::from_attr(&attr.unescape_value()?);
                            },
                            _ => {},
                        }
                    }

                    if let (Some(r_id), Some(reltype), Some(target_ref)) =
                        (r_id, reltype, target_ref)
                    {
                        entries.push(RelEntry {
                            r_id,
                            reltype,
                            target_mode,
                            target_ref,
                        });
                    }
                }
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }

    Ok(entries)
}
