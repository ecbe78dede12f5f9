//! Decides whether a resource points at a watchable local file.

use std::path::{Path, PathBuf};

use super::error::Ineligible;
use super::filter::PathFilter;
use super::host::{Host, ResourceId};

/// Scheme prefix of a remote or virtual path (`scp://host/x`, `fugitive://...`).
fn remote_scheme(path: &Path) -> Option<String> {
    let text = path.to_str()?;
    let (scheme, _) = text.split_once("://")?;
    let is_scheme = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    is_scheme.then(|| scheme.to_string())
}

/// Resolve and validate the file backing `id`.
///
/// Returns the canonical absolute path on success. Every rejection is a
/// reason not to watch, never a failure to report.
pub fn check_eligible(
    id: ResourceId,
    host: &dyn Host,
    filter: &PathFilter,
) -> Result<PathBuf, Ineligible> {
    if !host.is_valid(id) {
        return Err(Ineligible::InvalidResource);
    }

    let path = host
        .resolve_path(id)
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(Ineligible::NoPath)?;

    if let Some(scheme) = remote_scheme(&path) {
        return Err(Ineligible::RemoteScheme { scheme });
    }

    let stat_failed = |e: std::io::Error| Ineligible::StatFailed {
        path: path.clone(),
        reason: e.to_string(),
    };
    let resolved = std::fs::canonicalize(&path).map_err(stat_failed)?;
    let metadata = std::fs::metadata(&resolved).map_err(stat_failed)?;
    if !metadata.is_file() {
        return Err(Ineligible::NotRegularFile { path: resolved });
    }

    if filter.should_ignore(&path) || filter.should_ignore(&resolved) {
        return Err(Ineligible::Ignored { path: resolved });
    }

    Ok(resolved)
}
