//! Serialized relationships for OPC packages.
//!
//! A relationship is a typed, identified edge from a source (the package
//! root or a part) to a target, which is either another part (internal) or
//! an external URI (external). "Serialized" means targets are referred to
//! by part name rather than by a link to an in-memory part object.

use crate::constants::target_mode;
use crate::error::{OpcError, Result};
use crate::oxml::{self, RelEntry};
use crate::packuri::PackURI;
use smallvec::SmallVec;

/// Target mode of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// Target is another part of the package
    Internal,

    /// Target is an arbitrary external URI, e.g. an HTTP URL
    External,
}

impl TargetMode {
    /// Map the `TargetMode` attribute value to a mode. Anything other than
    /// "External" (including the attribute being absent) means Internal.
    pub fn from_attr(value: &str) -> Self {
        if value == target_mode::EXTERNAL {
            TargetMode::External
        } else {
            TargetMode::Internal
        }
    }
}

/// Policy for relationship items whose bytes fail to parse as XML.
///
/// The original implementation silently discards a malformed item and
/// treats the source as having zero relationships; `Lenient` reproduces
/// that. `Strict` surfaces the parse failure as a load error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelParsePolicy {
    /// Malformed relationship items yield an empty collection (default)
    #[default]
    Lenient,

    /// Malformed relationship items fail the load
    Strict,
}

/// A single relationship as read from a .rels item.
#[derive(Debug, Clone)]
pub struct SerializedRelationship {
    /// Relationship ID (e.g., "rId1")
    r_id: String,

    /// Relationship type URI
    reltype: String,

    /// Target mode (Internal or External)
    target_mode: TargetMode,

    /// Target reference - relative part reference or external URL
    target_ref: String,

    /// Absolute target partname, resolved at construction.
    /// Present exactly when target_mode is Internal.
    target_partname: Option<PackURI>,
}

impl SerializedRelationship {
    /// Wrap a raw relationship entry, resolving the target reference
    /// against *base_uri* for internal relationships.
    ///
    /// Fails with `MalformedPartName` when an internal target does not
    /// resolve to a slash-rooted part name.
    pub fn new(base_uri: &str, entry: RelEntry) -> Result<Self> {
        let target_partname = match entry.target_mode {
            TargetMode::Internal => Some(PackURI::from_rel_ref(base_uri, &entry.target_ref)?),
            TargetMode::External => None,
        };
        Ok(Self {
            r_id: entry.r_id,
            reltype: entry.reltype,
            target_mode: entry.target_mode,
            target_ref: entry.target_ref,
            target_partname,
        })
    }

    /// Get the relationship ID.
    #[inline]
    pub fn r_id(&self) -> &str {
        &self.r_id
    }

    /// Get the relationship type URI.
    #[inline]
    pub fn reltype(&self) -> &str {
        &self.reltype
    }

    /// Get the target mode.
    #[inline]
    pub fn target_mode(&self) -> TargetMode {
        self.target_mode
    }

    /// Get the target reference.
    ///
    /// For internal relationships this is a relative part reference; for
    /// external relationships it is an arbitrary URI.
    #[inline]
    pub fn target_ref(&self) -> &str {
        &self.target_ref
    }

    /// Check if this is an external relationship.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.target_mode == TargetMode::External
    }

    /// Get the absolute target partname.
    ///
    /// Fails with `InvalidExternalAccess` for external relationships; check
    /// `is_external` before calling.
    pub fn target_partname(&self) -> Result<&PackURI> {
        self.target_partname
            .as_ref()
            .ok_or_else(|| OpcError::InvalidExternalAccess(self.r_id.clone()))
    }
}

/// Read-only, ordered collection of the relationships belonging to one
/// source (the package root or a single part).
///
/// Order is the document order of the relationship item. Uses SmallVec for
/// efficient storage of typically small relationship collections.
#[derive(Debug, Default)]
pub struct SerializedRelationships {
    srels: SmallVec<[SerializedRelationship; 8]>,
}

impl SerializedRelationships {
    /// Load a collection from relationship-item bytes.
    ///
    /// An absent item (`None`) yields an empty collection; a source with no
    /// relationships is not an error. Malformed item bytes are handled per
    /// *policy*. A `MalformedPartName` on an individual entry is always
    /// fatal.
    pub fn load(
        base_uri: &str,
        rels_xml: Option<&[u8]>,
        policy: RelParsePolicy,
    ) -> Result<Self> {
        let Some(xml) = rels_xml else {
            return Ok(Self::default());
        };

        let entries = match oxml::relationship_entries(xml) {
            Ok(entries) => entries,
            Err(err) => {
                return match policy {
                    RelParsePolicy::Lenient => Ok(Self::default()),
                    RelParsePolicy::Strict => Err(OpcError::RelationshipParse(
                        base_uri.to_string(),
                        err.to_string(),
                    )),
                };
            },
        };

        let mut srels = SmallVec::with_capacity(entries.len());
        for entry in entries {
            srels.push(SerializedRelationship::new(base_uri, entry)?);
        }
        Ok(Self { srels })
    }

    /// Get an iterator over the relationships, in document order.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, SerializedRelationship> {
        self.srels.iter()
    }

    /// Get the number of relationships in the collection.
    #[inline]
    pub fn len(&self) -> usize {
        self.srels.len()
    }

    /// Check if the collection is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.srels.is_empty()
    }
}

impl<'a> IntoIterator for &'a SerializedRelationships {
    type Item = &'a SerializedRelationship;
    type IntoIter = std::slice::Iter<'a, SerializedRelationship>;

    fn into_iter(self) -> Self::IntoIter {
        self.srels.iter()
    }
}
