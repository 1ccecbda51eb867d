//! # MPEG-DASH manifest resolution
//!
//! Turns one MPD snapshot into the list of segments of a representation:
//!
//! *   [`mpd`] deserializes the manifest with `quick-xml`.
//! *   [`locator::ManifestLocator`] resolves a [`locator::RepresentationAddress`] to its
//!     `Representation`, effective `SegmentTemplate` and `SegmentTimeline`, and computes the
//!     start and end of every period (ISO/IEC 23009-1 3.10.2.2.3).
//! *   [`timeline`] expands `SegmentTimeline` entries, or builds an implicit timeline from
//!     `SegmentTemplate@duration`.
//! *   [`template`] renders `$RepresentationID$`, `$Number$`, `$Time$` and `$Bandwidth$`.
//! *   [`normalize`] removes trick mode adaptation sets from the manifest written to disk.

pub mod duration;
pub mod locator;
pub mod mpd;
pub mod normalize;
pub mod template;
pub mod timeline;
pub mod url;
