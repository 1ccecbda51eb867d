use url::Url;

use super::{
    locator::{ManifestLocator, RepresentationAddress},
    mpd::{BaseURL, MPD},
};
use crate::error::ProxyResult;

pub(crate) fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://")
        || s.starts_with("https://")
        || s.starts_with("file://")
        || s.starts_with("ftp://")
}

pub(crate) fn merge_baseurls(current: &Url, new: &str) -> ProxyResult<Url> {
    if is_absolute_url(new) {
        Ok(Url::parse(new)?)
    } else {
        // We are careful to merge the query portion of the current URL (which is either the
        // original manifest URL, or the URL that it redirected to, or the value of a BaseURL
        // element in the manifest) with the new URL. But if the new URL already has a query string,
        // it takes precedence.
        //
        // Examples
        //
        // merge_baseurls(https://example.com/manifest.mpd?auth=secret, /video42.mp4) =>
        //   https://example.com/video42.mp4?auth=secret
        //
        // merge_baseurls(https://example.com/manifest.mpd?auth=old, /video42.mp4?auth=new) =>
        //   https://example.com/video42.mp4?auth=new
        let mut merged = current.join(new)?;
        if merged.query().is_none() {
            merged.set_query(current.query());
        }
        Ok(merged)
    }
}

fn apply_base_url(current: Url, base_urls: &[BaseURL]) -> ProxyResult<Url> {
    // Several BaseURLs are alternatives (e.g. multiple CDNs), the first one is used.
    match base_urls.first() {
        Some(base_url) if !base_url.base.trim().is_empty() => {
            merge_baseurls(&current, base_url.base.trim())
        }
        _ => Ok(current),
    }
}

/// Base URL of the whole manifest: the MPD location, overridden by `MPD.Location`, then
/// refined by `MPD.BaseURL`.
pub fn manifest_base_url(mpd_url: &Url, mpd: &MPD) -> ProxyResult<Url> {
    let mut base_url = mpd_url.clone();
    if let Some(location) = mpd.locations.first() {
        base_url = merge_baseurls(&base_url, location.base.trim())?;
    }
    apply_base_url(base_url, &mpd.base_url)
}

/// Base URL of the representation at `addr`, applying the BaseURL of every level in order.
pub fn representation_base_url(
    manifest_base_url: &Url,
    locator: &ManifestLocator<'_>,
    addr: &RepresentationAddress,
) -> ProxyResult<Url> {
    let mut base_url = manifest_base_url.clone();
    base_url = apply_base_url(base_url, &locator.period(addr)?.BaseURL)?;
    base_url = apply_base_url(base_url, &locator.adaptation_set(addr)?.BaseURL)?;
    apply_base_url(base_url, &locator.representation(addr)?.BaseURL)
}
