use thiserror::Error;

use crate::dash::locator::RepresentationAddress;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Gave up fetching the MPD after {0} attempts")]
    ManifestFetchExhausted(u32),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    // MPEG-DASH errors
    #[error("Invalid MPD: {0}")]
    MpdParseError(#[from] quick_xml::DeError),

    #[error(transparent)]
    XmlError(#[from] quick_xml::Error),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("{0} does not exist in the current MPD")]
    InvalidAddress(RepresentationAddress),

    #[error("{address} changed from representation {expected:?} to {found:?}")]
    RepresentationMoved {
        address: RepresentationAddress,
        expected: Option<String>,
        found: Option<String>,
    },

    #[error("Missing duration for the last period {0}")]
    MissingPeriodDuration(usize),

    #[error("SegmentTemplate has neither SegmentTimeline nor a positive duration")]
    MissingSegmentDuration,

    #[error("No SegmentTemplate found for {0}")]
    MissingSegmentTemplate(RepresentationAddress),

    #[error("Template variable ${0}$ has no value")]
    TemplateVariableMissing(String),

    #[error("Unknown template variable ${0}$")]
    UnknownTemplateVariable(String),

    #[error("Refusing to write outside the output directory: {0}")]
    UnsafePath(String),
}

pub type ProxyResult<T> = Result<T, ProxyError>;
