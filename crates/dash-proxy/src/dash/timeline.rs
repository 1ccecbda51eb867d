/// Expansion of `SegmentTimeline` run-length entries into concrete segments.
///
/// References:
/// - ISO/IEC 23009-1 3.10.2.2.4 Representation Information
/// - [DASH-IF implementation guidelines: restricted timing model](https://dashif.org/Guidelines-TimingModel)
use super::{
    locator::{ManifestLocator, RepresentationAddress},
    mpd::{SegmentTemplate, S},
};
use crate::error::{ProxyError, ProxyResult};

/// One `S` element of a SegmentTimeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Start time in timescale units.
    pub t: Option<u64>,
    /// Duration in timescale units.
    pub d: u64,
    /// Number of additional segments with the same duration. Negative values repeat
    /// until the next entry or the end of the period.
    pub r: i64,
}

impl From<&S> for TimelineEntry {
    fn from(s: &S) -> Self {
        Self {
            t: s.t,
            d: s.d,
            r: s.r.unwrap_or(0),
        }
    }
}

/// A single media segment after timeline resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// `$Time$`, in timescale units.
    pub time: u64,
    pub duration: u64,
    /// Position in the expanded timeline, starting from 0.
    pub index: u64,
}

impl SegmentDescriptor {
    pub fn end(&self) -> u64 {
        self.time.saturating_add(self.duration)
    }
}

/// Upper bound of segments expanded from one timeline.
pub const MAX_SEGMENTS: usize = 1 << 20;

/// Expand timeline entries left to right.
///
/// An entry with `t` anchors the running clock, entries without it continue from the end of
/// the previous segment. `end` is the period end in timescale units and only bounds entries
/// with a negative repeat count.
pub fn expand(entries: &[TimelineEntry], end: Option<u64>) -> Vec<SegmentDescriptor> {
    let mut segments = Vec::new();
    let mut clock = 0;

    for (position, entry) in entries.iter().enumerate() {
        if entry.d == 0 {
            tracing::warn!(?entry, "Skipping timeline entry with zero duration");
            continue;
        }
        if let Some(t) = entry.t {
            clock = t;
        }

        let count = if entry.r >= 0 {
            (entry.r as u64).saturating_add(1)
        } else {
            // The last S element MAY have a negative @r: segments repeat up to the next
            // S@t, or until the period end.
            let limit = entries
                .get(position + 1)
                .and_then(|next| next.t)
                .or(end);
            match limit {
                Some(limit) if limit > clock => (limit - clock).div_ceil(entry.d),
                Some(_) => 0,
                None => {
                    tracing::warn!(?entry, "Negative repeat count without a known end, treating as 0");
                    1
                }
            }
        };

        for _ in 0..count {
            if segments.len() >= MAX_SEGMENTS {
                tracing::warn!(?entry, "Timeline has more than {MAX_SEGMENTS} segments, truncating");
                return segments;
            }
            let Some(next) = clock.checked_add(entry.d) else {
                tracing::warn!(?entry, "Timeline exceeds the range of S@t, truncating");
                return segments;
            };
            segments.push(SegmentDescriptor {
                time: clock,
                duration: entry.d,
                index: segments.len() as u64,
            });
            clock = next;
        }
    }

    segments
}

/// Build the implicit timeline of a SegmentTemplate that only has `@duration`.
///
/// NS = 1, t = 0, d = @duration, and enough repeats to cover the whole period. The last
/// segment may extend past the period end. Returns `None` for an empty period.
pub fn synthesize(
    duration: u64,
    timescale: u64,
    period_start: f64,
    period_end: f64,
) -> Option<TimelineEntry> {
    let span = (period_end - period_start) * timescale as f64 / duration as f64;
    // tolerate float noise such as 15.000000000000002
    let count = (span - 1e-9).ceil();
    if !count.is_finite() {
        tracing::warn!(duration, timescale, "Period too long for its segment duration");
        return None;
    }
    if count < 1. {
        return None;
    }

    Some(TimelineEntry {
        t: Some(0),
        d: duration,
        r: count as i64 - 1,
    })
}

/// Resolve the media segments of the representation at `addr`.
pub fn resolve(
    locator: &ManifestLocator<'_>,
    addr: &RepresentationAddress,
    template: &SegmentTemplate,
) -> ProxyResult<Vec<SegmentDescriptor>> {
    let timescale = template.timescale();

    if let Some(timeline) = template.SegmentTimeline.as_ref() {
        let entries: Vec<TimelineEntry> = timeline.segments.iter().map(Into::into).collect();
        let end = if entries.iter().any(|e| e.r < 0) {
            match (locator.period_start(addr), locator.period_end(addr)) {
                (Ok(start), Ok(end)) => Some(((end - start) * timescale as f64).ceil() as u64),
                _ => None,
            }
        } else {
            None
        };
        return Ok(expand(&entries, end));
    }

    let duration = template
        .duration
        .filter(|d| *d > 0)
        .ok_or(ProxyError::MissingSegmentDuration)?;
    let period_start = locator.period_start(addr)?;
    let period_end = locator.period_end(addr)?;
    let entries: Vec<TimelineEntry> =
        synthesize(duration, timescale, period_start, period_end)
            .into_iter()
            .collect();
    tracing::debug!(?entries, "There is no timeline, created an implicit one");

    Ok(expand(&entries, None))
}

/// Format seconds like `H:MM:SS`.
pub fn format_hms(seconds: u64) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}

/// Progress indicator `elapsed/total` for log lines, both given in timescale units.
pub fn format_progress(elapsed: u64, total: u64, timescale: u64) -> String {
    let to_seconds = |ticks: u64| (ticks as f64 / timescale as f64).round() as u64;
    format!(
        "{}/{}",
        format_hms(to_seconds(elapsed)),
        format_hms(to_seconds(total))
    )
}
