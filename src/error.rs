/// Error types for OPC package operations
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpcError {
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Malformed part name: {0}")]
    MalformedPartName(String),

    #[error("No member '{0}' in package")]
    MemberNotFound(String),

    #[error("No content type for part name '{0}'")]
    UnknownContentType(String),

    #[error("target_partname is undefined for external relationship '{0}'")]
    InvalidExternalAccess(String),

    #[error("Malformed relationship item for source '{0}': {1}")]
    RelationshipParse(String, String),

    #[error("XML parsing error: {0}")]
    XmlError(String),

    #[error("ZIP error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<quick_xml::Error> for OpcError {
    fn from(err: quick_xml::Error) -> Self {
        OpcError::XmlError(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for OpcError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        OpcError::XmlError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OpcError>;
