// References:
// 1. https://github.com/clitic/vsd/blob/30ca1985e4a467ea3304b11c08d3176deaafd22a/vsd/src/dash/template.rs
// 2. https://github.com/emarsden/dash-mpd-rs/blob/6ebdfb4759adbda8233b5b3520804e23ff86e7de/src/fetch.rs#L435-L466

use regex::Regex;
use std::{collections::HashMap, sync::LazyLock};

use crate::error::{ProxyError, ProxyResult};

// From https://dashif.org/docs/DASH-IF-IOP-v4.3.pdf:
// "For the avoidance of doubt, only %0[width]d is permitted and no other identifiers. The reason
// is that such a string replacement can be easily implemented without requiring a specific library."
//
// Example template: "$RepresentationID$/$Number%06d$.m4s"
//
// `$$` is an escaped dollar sign.
static TEMPLATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z]*)(?:%0(\d+)d)?\$").unwrap());

#[derive(Debug, Clone, Default)]
pub struct Template<'a> {
    args: HashMap<&'a str, String>,
}

impl<'a> Template<'a> {
    pub const REPRESENTATION_ID: &'static str = "RepresentationID";
    pub const NUMBER: &'static str = "Number";
    pub const TIME: &'static str = "Time";
    pub const BANDWIDTH: &'static str = "Bandwidth";

    /// Widest `%0Nd` accepted, wider formats are rejected.
    pub const MAX_WIDTH: usize = 32;

    const IDENTIFIERS: [&'static str; 4] = [
        Self::REPRESENTATION_ID,
        Self::NUMBER,
        Self::TIME,
        Self::BANDWIDTH,
    ];

    pub fn new() -> Self {
        Self {
            args: HashMap::with_capacity(4),
        }
    }

    pub fn insert(&mut self, key: &'a str, value: String) -> &mut Self {
        self.args.insert(key, value);
        self
    }

    pub fn insert_optional(&mut self, key: &'a str, value: Option<String>) -> &mut Self {
        if let Some(value) = value {
            self.args.insert(key, value);
        }
        self
    }

    /// Substitute every `$Identifier$` and `$Identifier%0Nd$` of `template`.
    ///
    /// Fails when an identifier is unknown or has no value in this template.
    pub fn resolve(&self, template: &str) -> ProxyResult<String> {
        let mut result = String::with_capacity(template.len());
        let mut last = 0;

        for caps in TEMPLATE_REGEX.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            result.push_str(&template[last..whole.start()]);
            last = whole.end();

            let key = &caps[1];
            let width = caps.get(2);
            if key.is_empty() && width.is_none() {
                result.push('$');
                continue;
            }
            if !Self::IDENTIFIERS.iter().any(|identifier| *identifier == key) {
                return Err(ProxyError::UnknownTemplateVariable(
                    whole.as_str().trim_matches('$').to_string(),
                ));
            }

            let value = self
                .args
                .get(key)
                .ok_or_else(|| ProxyError::TemplateVariableMissing(key.to_string()))?;
            match width {
                Some(width) => {
                    let width = width
                        .as_str()
                        .parse::<usize>()
                        .ok()
                        .filter(|width| *width <= Self::MAX_WIDTH)
                        .ok_or_else(|| {
                            ProxyError::UnknownTemplateVariable(
                                whole.as_str().trim_matches('$').to_string(),
                            )
                        })?;
                    result.push_str(&format!("{value:0>width$}"));
                }
                None => result.push_str(value),
            }
        }

        result.push_str(&template[last..]);
        Ok(result)
    }
}
