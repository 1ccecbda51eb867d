use std::fmt;

use super::{
    duration::parse_duration,
    mpd::{AdaptationSet, Period, Representation, SegmentTemplate, SegmentTimeline, MPD},
};
use crate::error::{ProxyError, ProxyResult};

/// Positional address of a representation inside one MPD snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepresentationAddress {
    pub period: usize,
    pub adaptation_set: usize,
    pub representation: usize,
}

impl RepresentationAddress {
    pub fn new(period: usize, adaptation_set: usize, representation: usize) -> Self {
        Self {
            period,
            adaptation_set,
            representation,
        }
    }
}

impl fmt::Display for RepresentationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Representation (period={} adaptation-set={} representation={})",
            self.period, self.adaptation_set, self.representation
        )
    }
}

/// How the start of a period was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBasis {
    /// The first period always starts at 0.
    First,
    /// `Period@start`, relative to the start of the first period.
    Explicit,
    /// Start of the previous period plus its `Period@duration`.
    PreviousDuration,
    /// Neither `Period@start` nor a previous `Period@duration`: the MPD is malformed and
    /// the start was assumed to be 0.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodTiming {
    /// Start of the period in seconds, relative to the start of the first period.
    pub start: f64,
    /// End of the period in seconds. `None` when the last period has no way to compute it.
    pub end: Option<f64>,
    pub start_basis: StartBasis,
}

/// https://dashif.org/Guidelines-TimingModel/#mpd-general-timeline
///
/// Computes PSwc/PEwc of every period once, following ISO/IEC 23009-1 3.10.2.2.3.
fn period_timings(mpd: &MPD) -> ProxyResult<Vec<PeriodTiming>> {
    let periods = &mpd.periods;
    let mut timings: Vec<PeriodTiming> = Vec::with_capacity(periods.len());

    for (index, period) in periods.iter().enumerate() {
        let (start, start_basis) = if index == 0 {
            // PSwc[i] is relative to @start of the first period, so it is 0 by definition.
            (0., StartBasis::First)
        } else if let Some(start) = period.start.as_deref() {
            // PSwc[i] is the value of @start minus the value of @start of the first period.
            (parse_duration(start)? - timings[0].start, StartBasis::Explicit)
        } else {
            let previous = &periods[index - 1];
            match previous.duration.as_deref() {
                // PSwc[i] = PSwc[i-1] + Period@duration of the previous period.
                Some(duration) => (
                    timings[index - 1].start + parse_duration(duration)?,
                    StartBasis::PreviousDuration,
                ),
                None => {
                    tracing::warn!(
                        period = index,
                        "Period has neither @start nor a previous @duration, assuming it starts at 0"
                    );
                    (0., StartBasis::Missing)
                }
            }
        };

        timings.push(PeriodTiming {
            start,
            end: None,
            start_basis,
        });
    }

    // PEwc[i] = PSwc[i+1] for all but the last period.
    for index in 1..timings.len() {
        timings[index - 1].end = Some(timings[index].start);
    }

    if let (Some(last), Some(period)) = (timings.last_mut(), periods.last()) {
        last.end = match (
            mpd.mediaPresentationDuration.as_deref(),
            period.duration.as_deref(),
        ) {
            (Some(presentation_duration), _) => Some(parse_duration(presentation_duration)?),
            (None, Some(duration)) => Some(last.start + parse_duration(duration)?),
            (None, None) => None,
        };
    }

    Ok(timings)
}

/// Read-only accessor resolving [`RepresentationAddress`]es against one MPD snapshot.
pub struct ManifestLocator<'a> {
    mpd: &'a MPD,
    timings: Vec<PeriodTiming>,
}

impl<'a> ManifestLocator<'a> {
    pub fn new(mpd: &'a MPD) -> ProxyResult<Self> {
        let timings = period_timings(mpd)?;
        Ok(Self { mpd, timings })
    }

    pub fn mpd(&self) -> &'a MPD {
        self.mpd
    }

    pub fn periods(&self) -> &'a [Period] {
        &self.mpd.periods
    }

    pub fn period(&self, addr: &RepresentationAddress) -> ProxyResult<&'a Period> {
        self.mpd
            .periods
            .get(addr.period)
            .ok_or(ProxyError::InvalidAddress(*addr))
    }

    pub fn adaptation_set(&self, addr: &RepresentationAddress) -> ProxyResult<&'a AdaptationSet> {
        self.period(addr)?
            .adaptations
            .get(addr.adaptation_set)
            .ok_or(ProxyError::InvalidAddress(*addr))
    }

    pub fn representation(&self, addr: &RepresentationAddress) -> ProxyResult<&'a Representation> {
        self.adaptation_set(addr)?
            .representations
            .get(addr.representation)
            .ok_or(ProxyError::InvalidAddress(*addr))
    }

    /// The representation-level SegmentTemplate overrides the adaptation-set-level one.
    pub fn segment_template(
        &self,
        addr: &RepresentationAddress,
    ) -> ProxyResult<Option<&'a SegmentTemplate>> {
        let representation = self.representation(addr)?;
        Ok(representation
            .SegmentTemplate
            .as_ref()
            .or(self.adaptation_set(addr)?.SegmentTemplate.as_ref()))
    }

    pub fn segment_timeline(
        &self,
        addr: &RepresentationAddress,
    ) -> ProxyResult<Option<&'a SegmentTimeline>> {
        Ok(self
            .segment_template(addr)?
            .and_then(|template| template.SegmentTimeline.as_ref()))
    }

    pub fn period_timing(&self, addr: &RepresentationAddress) -> ProxyResult<&PeriodTiming> {
        self.timings
            .get(addr.period)
            .ok_or(ProxyError::InvalidAddress(*addr))
    }

    pub fn period_start(&self, addr: &RepresentationAddress) -> ProxyResult<f64> {
        Ok(self.period_timing(addr)?.start)
    }

    pub fn period_end(&self, addr: &RepresentationAddress) -> ProxyResult<f64> {
        self.period_timing(addr)?
            .end
            .ok_or(ProxyError::MissingPeriodDuration(addr.period))
    }
}
