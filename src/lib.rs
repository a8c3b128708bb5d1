//! opcpack - Low-level reader and writer for Open Packaging Conventions
//! (OPC) containers.
//!
//! An OPC package is a zip archive holding a graph of named "parts" linked
//! by typed relationships, with a central content-type registry
//! (`[Content_Types].xml`). This crate loads such a package eagerly into an
//! immutable in-memory model: the package-level relationships plus one
//! record per part reachable from the package root, each carrying its name,
//! declared content type, raw bytes, and its own outgoing relationships.
//! Higher-level document-format libraries (slide, word, sheet readers)
//! build their object models on top of these records.
//!
//! # Example - Reading a package
//!
//! ```no_run
//! use opcpack::PackageReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let reader = PackageReader::open("document.docx")?;
//!
//! for (partname, content_type, blob) in reader.iter_sparts() {
//!     println!("{} ({}): {} bytes", partname, content_type, blob.len());
//! }
//!
//! for (source, srel) in reader.iter_srels() {
//!     println!("{} -[{}]-> {}", source, srel.reltype(), srel.target_ref());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Writing raw parts
//!
//! ```no_run
//! use opcpack::{PackURI, PhysPkgWrite, ZipPkgWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = ZipPkgWriter::new();
//! writer.write(&PackURI::new("/word/document.xml")?, b"<document/>")?;
//! let bytes = writer.finish_to_bytes()?;
//! std::fs::write("package.zip", bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! Loading is single-threaded and fully in-memory; the archive handle is
//! released before the model is returned, so the model never depends on
//! live I/O.

pub mod constants;
pub mod error;
pub mod oxml;
pub mod packuri;
pub mod phys_pkg;
pub mod pkgreader;
pub mod rel;

// Re-export commonly used types
pub use error::{OpcError, Result};
pub use packuri::{CONTENT_TYPES_URI, PACKAGE_URI, PackURI};
pub use phys_pkg::{PhysPkgRead, PhysPkgWrite, ZipPkgReader, ZipPkgWriter};
pub use pkgreader::{ContentTypeMap, PackageReader, SerializedPart};
pub use rel::{
    RelParsePolicy, SerializedRelationship, SerializedRelationships, TargetMode,
};
