use regex::Regex;
use std::sync::LazyLock;

use crate::error::{ProxyError, ProxyResult};

// Years and months are rejected because their length varies. Leap seconds are ignored.
//
// Examples: "PT30S", "PT1H2M3.5S", "P1DT12H", "P2D"
static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^P(?:(\d+(?:\.\d+)?)D)?(?:T(?:(\d+(?:\.\d+)?)H)?(?:(\d+(?:\.\d+)?)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .unwrap()
});

const UNITS: [f64; 4] = [24. * 60. * 60., 60. * 60., 60., 1.];

/// Parse an `xs:duration` restricted to days, hours, minutes and seconds into seconds.
pub fn parse_duration(input: &str) -> ProxyResult<f64> {
    let input = input.trim();
    let caps = DURATION_REGEX
        .captures(input)
        .ok_or_else(|| ProxyError::InvalidDuration(input.to_string()))?;

    // "P" and "PT" match the pattern but carry no component
    if caps.iter().skip(1).all(|c| c.is_none()) || input.ends_with('T') {
        return Err(ProxyError::InvalidDuration(input.to_string()));
    }

    let mut seconds = 0.;
    for (group, unit) in (1..=4).zip(UNITS) {
        if let Some(value) = caps.get(group) {
            let value: f64 = value
                .as_str()
                .parse()
                .map_err(|_| ProxyError::InvalidDuration(input.to_string()))?;
            seconds += value * unit;
        }
    }
    Ok(seconds)
}
