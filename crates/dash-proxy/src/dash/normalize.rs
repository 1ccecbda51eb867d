use quick_xml::{
    events::{BytesStart, Event},
    Reader, Writer,
};

use super::mpd::AdaptationSet;
use crate::error::{ProxyError, ProxyResult};

pub const TRICK_MODE_SCHEME: &str = "http://dashif.org/guidelines/trickmode";
pub const TRICK_MODE_VALUE: &str = "1";

/// Trick mode adaptation sets only carry fast-forward / rewind content.
pub fn is_trick_mode(adaptation_set: &AdaptationSet) -> bool {
    adaptation_set.EssentialProperty.iter().any(|property| {
        property.schemeIdUri == TRICK_MODE_SCHEME
            && property.value.as_deref() == Some(TRICK_MODE_VALUE)
    })
}

fn is_trick_mode_property(element: &BytesStart) -> ProxyResult<bool> {
    if element.local_name().as_ref() != b"EssentialProperty" {
        return Ok(false);
    }

    let attribute = |name: &str| -> ProxyResult<Option<String>> {
        Ok(element
            .try_get_attribute(name)
            .map_err(quick_xml::Error::from)?
            .map(|attr| attr.unescape_value().map(|v| v.into_owned()))
            .transpose()?)
    };
    Ok(attribute("schemeIdUri")?.as_deref() == Some(TRICK_MODE_SCHEME)
        && attribute("value")?.as_deref() == Some(TRICK_MODE_VALUE))
}

struct BufferedAdaptationSet {
    events: Vec<Event<'static>>,
    depth: usize,
    trick_mode: bool,
}

/// Rewrite `xml` with the trick mode adaptation sets of the first period removed.
///
/// Everything else, including elements the MPD model does not know about, is copied
/// through unchanged.
pub fn normalize_manifest(xml: &str) -> ProxyResult<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    let mut depth = 0;
    let mut periods_seen = 0;
    let mut first_period_depth = None;
    let mut buffered: Option<BufferedAdaptationSet> = None;

    loop {
        let event = reader.read_event()?;
        let (name, trick_mode) = match &event {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => {
                (e.local_name().as_ref().to_vec(), is_trick_mode_property(e)?)
            }
            Event::End(e) => (e.local_name().as_ref().to_vec(), false),
            _ => (Vec::new(), false),
        };

        match event {
            Event::Start(_) | Event::Empty(_) => {
                let is_start = matches!(event, Event::Start(_));
                if let Some(adaptation_set) = buffered.as_mut() {
                    if trick_mode && depth == adaptation_set.depth + 1 {
                        adaptation_set.trick_mode = true;
                    }
                    adaptation_set.events.push(event.into_owned());
                    if is_start {
                        depth += 1;
                    }
                    continue;
                }

                if name == b"Period" {
                    if periods_seen == 0 && is_start {
                        first_period_depth = Some(depth);
                    }
                    periods_seen += 1;
                } else if name == b"AdaptationSet"
                    && is_start
                    && first_period_depth.is_some_and(|d| d + 1 == depth)
                {
                    buffered = Some(BufferedAdaptationSet {
                        events: vec![event.into_owned()],
                        depth,
                        trick_mode: false,
                    });
                    depth += 1;
                    continue;
                }

                if is_start {
                    depth += 1;
                }
            }
            Event::End(_) => {
                depth -= 1;
                if let Some(mut adaptation_set) = buffered.take() {
                    adaptation_set.events.push(event.into_owned());
                    if depth != adaptation_set.depth {
                        buffered = Some(adaptation_set);
                    } else if adaptation_set.trick_mode {
                        tracing::debug!("Removing trick mode adaptation set from manifest");
                    } else {
                        for event in adaptation_set.events {
                            writer.write_event(event)?;
                        }
                    }
                    continue;
                }

                if name == b"Period" && first_period_depth == Some(depth) {
                    first_period_depth = None;
                }
            }
            _ => {
                if let Some(adaptation_set) = buffered.as_mut() {
                    adaptation_set.events.push(event.into_owned());
                    continue;
                }
            }
        }

        writer.write_event(event)?;
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| ProxyError::IOError(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}
