use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use url::Url;

use crate::{
    dash::url::is_absolute_url,
    error::{ProxyError, ProxyResult},
};

/// Map a rendered segment template to a file below `output_dir`.
///
/// The query string is dropped, absolute URLs contribute their path only, and `.`/`..`
/// components are rejected so nothing is written outside `output_dir`.
pub fn segment_path(output_dir: &Path, rendered: &str) -> ProxyResult<PathBuf> {
    let relative = if is_absolute_url(rendered) {
        Url::parse(rendered)?.path().to_string()
    } else {
        rendered
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string()
    };

    let mut path = output_dir.to_path_buf();
    let mut components = 0;
    for component in relative.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(ProxyError::UnsafePath(rendered.to_string())),
            component => {
                path.push(component);
                components += 1;
            }
        }
    }

    if components == 0 {
        return Err(ProxyError::UnsafePath(rendered.to_string()));
    }
    Ok(path)
}

pub trait ProxyPathExt {
    /// Path of the temporary file a download is written to before being renamed.
    fn part_path(&self) -> PathBuf;
}

impl ProxyPathExt for Path {
    fn part_path(&self) -> PathBuf {
        let mut filename = OsString::new();
        if let Some(name) = self.file_name() {
            filename.push(name);
        }
        filename.push(".part");
        self.with_file_name(filename)
    }
}
