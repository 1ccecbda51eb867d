//! A serde model of the parts of an MPD that segment resolution needs.
//!
//! Unknown elements and attributes are ignored while deserializing. Duration-valued
//! attributes are kept as strings and parsed with [`parse_duration`](super::duration::parse_duration)
//! when the timing model needs them, so a malformed value only fails the computation using it.
#![allow(non_snake_case)]

use serde::Deserialize;

use crate::error::ProxyResult;

pub const MPD_NAMESPACE: &str = "urn:mpeg:dash:schema:mpd:2011";

/// Describes a sequence of contiguous segments with identical duration.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct S {
    #[serde(rename = "@t")]
    pub t: Option<u64>,
    #[serde(rename = "@d")]
    pub d: u64,
    /// The repeat count: number of additional contiguous segments with the same duration.
    #[serde(rename = "@r")]
    pub r: Option<i64>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct SegmentTimeline {
    #[serde(rename = "S", default)]
    pub segments: Vec<S>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct SegmentTemplate {
    #[serde(rename = "@initialization")]
    pub initialization: Option<String>,
    #[serde(rename = "@media")]
    pub media: Option<String>,
    #[serde(rename = "@startNumber")]
    pub startNumber: Option<u64>,
    /// Segment duration in timescale units, only meaningful without a SegmentTimeline.
    #[serde(rename = "@duration")]
    pub duration: Option<u64>,
    #[serde(rename = "@timescale")]
    pub timescale: Option<u64>,
    pub SegmentTimeline: Option<SegmentTimeline>,
}

impl SegmentTemplate {
    pub fn timescale(&self) -> u64 {
        self.timescale.filter(|t| *t > 0).unwrap_or(1)
    }

    pub fn start_number(&self) -> u64 {
        self.startNumber.unwrap_or(0)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BaseURL {
    #[serde(rename = "$text")]
    pub base: String,
}

/// A generic `DescriptorType` such as `EssentialProperty` or `SupplementalProperty`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Descriptor {
    #[serde(rename = "@schemeIdUri")]
    pub schemeIdUri: String,
    #[serde(rename = "@value")]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Representation {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@bandwidth")]
    pub bandwidth: Option<u64>,
    #[serde(rename = "@mimeType")]
    pub mimeType: Option<String>,
    #[serde(rename = "BaseURL", default)]
    pub BaseURL: Vec<BaseURL>,
    pub SegmentTemplate: Option<SegmentTemplate>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct AdaptationSet {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@contentType")]
    pub contentType: Option<String>,
    #[serde(rename = "@mimeType")]
    pub mimeType: Option<String>,
    #[serde(rename = "BaseURL", default)]
    pub BaseURL: Vec<BaseURL>,
    #[serde(rename = "EssentialProperty", default)]
    pub EssentialProperty: Vec<Descriptor>,
    pub SegmentTemplate: Option<SegmentTemplate>,
    #[serde(rename = "Representation", default)]
    pub representations: Vec<Representation>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Period {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@start")]
    pub start: Option<String>,
    #[serde(rename = "@duration")]
    pub duration: Option<String>,
    #[serde(rename = "BaseURL", default)]
    pub BaseURL: Vec<BaseURL>,
    #[serde(rename = "AdaptationSet", default)]
    pub adaptations: Vec<AdaptationSet>,
}

/// The root node of a parsed MPD.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct MPD {
    #[serde(rename = "@type")]
    pub mpdtype: Option<String>,
    #[serde(rename = "@minimumUpdatePeriod")]
    pub minimumUpdatePeriod: Option<String>,
    #[serde(rename = "@mediaPresentationDuration")]
    pub mediaPresentationDuration: Option<String>,
    #[serde(rename = "Location", default)]
    pub locations: Vec<BaseURL>,
    #[serde(rename = "BaseURL", default)]
    pub base_url: Vec<BaseURL>,
    #[serde(rename = "Period", default)]
    pub periods: Vec<Period>,
}

impl MPD {
    /// A manifest is refreshed periodically when it declares `MPD@minimumUpdatePeriod`.
    pub fn is_live(&self) -> bool {
        self.minimumUpdatePeriod.is_some()
    }
}

/// Parse an MPD manifest, provided as an XML string.
pub fn parse(xml: &str) -> ProxyResult<MPD> {
    let mpd: MPD = quick_xml::de::from_str(xml)?;
    Ok(mpd)
}
