//! Discovery and staging of the session cookie jar sent to the upstream service.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::SystemTime,
};

use tracing::{debug, info, warn};

use crate::result::Result;

/// Conventional secret mounts, checked after the configured override
const DEFAULT_CANDIDATES: [&str; 4] = [
    "/etc/secrets/cookies.txt",
    "/etc/secrets/COOKIES.txt",
    "/etc/secrets/youtube-cookies.txt",
    "/app/cookies.txt",
];

const NETSCAPE_MARKERS: [&str; 2] = ["# Netscape HTTP Cookie File", "# HTTP Cookie File"];

/// Cookies a logged-in session is expected to carry
const EXPECTED_COOKIES: [&str; 6] = ["SID", "HSID", "SSID", "APISID", "SAPISID", "LOGIN_INFO"];

/// A staged cookie jar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub refreshed_at: SystemTime,
}

/// Anything able to hand out the current credential bundle
pub trait CredentialSource: Send + Sync {
    /// Return the staged bundle, or look for a fresh one when `force_refresh` is set.
    ///
    /// `None` is a valid answer: extraction then runs anonymously.
    fn locate(&self, force_refresh: bool) -> Option<CredentialBundle>;
}

/// Result of a light sanity check of a cookie jar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieReport {
    pub has_marker: bool,
    pub missing: Vec<&'static str>,
}

impl CookieReport {
    pub fn inspect(contents: &str) -> Self {
        let has_marker = contents
            .lines()
            .any(|line| NETSCAPE_MARKERS.iter().any(|m| line.trim() == *m));

        // Netscape format: domain, flag, path, secure, expiry, name, value
        let names: Vec<&str> = contents
            .lines()
            .map(|line| line.strip_prefix("#HttpOnly_").unwrap_or(line))
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.split('\t').nth(5))
            .collect();

        let missing = EXPECTED_COOKIES
            .into_iter()
            .filter(|expected| !names.contains(expected))
            .collect();

        Self {
            has_marker,
            missing,
        }
    }
}

/// Finds a cookie jar and copies it to a single staging path
#[derive(Debug)]
pub struct CredentialLocator {
    staging: PathBuf,
    candidates: Vec<PathBuf>,
    /// Serializes writes to the staging path
    write_lock: Mutex<()>,
    /// The staged jar comes from an upload and wins over the mounted candidates
    uploaded: AtomicBool,
}

impl CredentialLocator {
    /// Locator checking `override_path` first, then the conventional secret mounts
    pub fn new(staging: PathBuf, override_path: Option<PathBuf>) -> Self {
        let candidates = override_path
            .into_iter()
            .chain(DEFAULT_CANDIDATES.iter().map(PathBuf::from))
            .collect();

        Self::with_candidates(staging, candidates)
    }

    pub fn with_candidates(staging: PathBuf, candidates: Vec<PathBuf>) -> Self {
        Self {
            staging,
            candidates,
            write_lock: Mutex::new(()),
            uploaded: AtomicBool::new(false),
        }
    }

    /// Whether a non-empty bundle is currently staged
    pub fn is_staged(&self) -> bool {
        non_empty_size(&self.staging).is_some()
    }

    /// Store an uploaded cookie jar as the staged bundle.
    ///
    /// The jar is shared: it stays staged and is sent with the requests of every later
    /// visitor until another upload replaces it, and the health route reports it. A forced
    /// refresh never swaps it for a mounted candidate. An empty upload is ignored.
    pub fn stage_upload(&self, contents: &[u8]) -> Result<Option<CredentialBundle>> {
        if contents.is_empty() {
            debug!("Empty cookie upload ignored");
            return Ok(None);
        }

        let bundle = self.write_staging(contents)?;
        self.uploaded.store(true, Ordering::SeqCst);
        info!(
            "Uploaded cookies staged at {} ({} bytes)",
            bundle.path.display(),
            bundle.size_bytes
        );
        Ok(Some(bundle))
    }

    /// Write to a temporary sibling then rename, so that readers never see a partial file
    fn write_staging(&self, contents: &[u8]) -> Result<CredentialBundle> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let dir = match self.staging.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.staging).map_err(|err| err.error)?;

        log_report(&self.staging, contents);

        Ok(CredentialBundle {
            path: self.staging.clone(),
            size_bytes: contents.len() as u64,
            refreshed_at: SystemTime::now(),
        })
    }

    fn staged_bundle(&self) -> Option<CredentialBundle> {
        let size_bytes = non_empty_size(&self.staging)?;
        let refreshed_at = self
            .staging
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or_else(|_| SystemTime::now());

        Some(CredentialBundle {
            path: self.staging.clone(),
            size_bytes,
            refreshed_at,
        })
    }

    /// Copy the first non-empty candidate to the staging path
    fn discover(&self) -> Option<CredentialBundle> {
        for candidate in &self.candidates {
            if non_empty_size(candidate).is_none() {
                continue;
            }

            let copied = fs::read(candidate)
                .map_err(Into::into)
                .and_then(|contents| self.write_staging(&contents));
            match copied {
                Ok(bundle) => {
                    info!(
                        "Copied cookies {} -> {}",
                        candidate.display(),
                        self.staging.display()
                    );
                    return Some(bundle);
                }
                Err(err) => warn!("Could not copy cookies from {}: {err}", candidate.display()),
            }
        }

        None
    }
}

impl CredentialSource for CredentialLocator {
    fn locate(&self, force_refresh: bool) -> Option<CredentialBundle> {
        if force_refresh && self.uploaded.load(Ordering::SeqCst) {
            if let Some(bundle) = self.staged_bundle() {
                debug!("Keeping the uploaded cookies {}", bundle.path.display());
                return Some(bundle);
            }
        }

        if !force_refresh {
            if let Some(bundle) = self.staged_bundle() {
                debug!("Using staged cookies {}", bundle.path.display());
                return Some(bundle);
            }
        }

        if let Some(bundle) = self.discover() {
            return Some(bundle);
        }

        if force_refresh {
            // Nothing new to pick up, keep what was there (e.g. an upload)
            if let Some(bundle) = self.staged_bundle() {
                debug!("No fresher cookies found, keeping the staged ones");
                return Some(bundle);
            }
        }

        info!("No cookies found, extraction will run anonymously");
        None
    }
}

fn non_empty_size(path: &Path) -> Option<u64> {
    path.metadata()
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

fn log_report(path: &Path, contents: &[u8]) {
    let report = CookieReport::inspect(&String::from_utf8_lossy(contents));
    if !report.has_marker {
        warn!(
            "{} does not look like a Netscape cookie file",
            path.display()
        );
    }
    if !report.missing.is_empty() {
        warn!(
            "{} lacks the session cookies {:?}, the upstream may still ask for a sign-in",
            path.display(),
            report.missing
        );
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{CookieReport, CredentialLocator, CredentialSource};

    #[test]
    fn copies_candidate_once_then_uses_the_staged_copy() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging.txt");
        let candidate = dir.path().join("secret.txt");
        fs::write(&staging, b"").unwrap();
        fs::write(&candidate, b"first").unwrap();

        let locator = CredentialLocator::with_candidates(
            staging.clone(),
            vec![dir.path().join("missing.txt"), candidate.clone()],
        );

        let bundle = locator.locate(false).unwrap();
        assert_eq!(bundle.path, staging);
        assert_eq!(bundle.size_bytes, 5);
        assert_eq!(fs::read(&staging).unwrap(), b"first");

        // A second lookup must not copy again
        fs::write(&candidate, b"second").unwrap();
        let bundle = locator.locate(false).unwrap();
        assert_eq!(bundle.path, staging);
        assert_eq!(fs::read(&staging).unwrap(), b"first");

        // Until a refresh is forced
        locator.locate(true).unwrap();
        assert_eq!(fs::read(&staging).unwrap(), b"second");
    }

    #[test]
    fn absent_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.txt");
        fs::write(&empty, b"").unwrap();

        let locator =
            CredentialLocator::with_candidates(dir.path().join("staging.txt"), vec![empty]);
        assert_eq!(locator.locate(false), None);
        assert_eq!(locator.locate(true), None);
        assert!(!locator.is_staged());
    }

    #[test]
    fn forced_refresh_keeps_an_upload_without_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let locator = CredentialLocator::with_candidates(dir.path().join("staging.txt"), vec![]);

        assert_eq!(locator.stage_upload(b"").unwrap(), None);
        let uploaded = locator.stage_upload(b"cookie jar").unwrap().unwrap();
        assert!(locator.is_staged());
        assert_eq!(locator.locate(true).unwrap().path, uploaded.path);
    }

    #[test]
    fn forced_refresh_keeps_an_upload_over_mounted_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging.txt");
        let mounted = dir.path().join("mount.txt");
        fs::write(&mounted, b"stale mounted jar").unwrap();

        let locator = CredentialLocator::with_candidates(staging.clone(), vec![mounted]);
        locator.stage_upload(b"fresh uploaded jar").unwrap();

        let bundle = locator.locate(true).unwrap();
        assert_eq!(bundle.path, staging);
        assert_eq!(bundle.size_bytes, 18);
        assert_eq!(fs::read(&staging).unwrap(), b"fresh uploaded jar");
    }

    #[test]
    fn inspect_reports_marker_and_missing_cookies() {
        let jar = "# Netscape HTTP Cookie File\n\
            .youtube.com\tTRUE\t/\tTRUE\t0\tSID\tvalue\n\
            #HttpOnly_.youtube.com\tTRUE\t/\tTRUE\t0\tHSID\tvalue\n";
        let report = CookieReport::inspect(jar);
        assert!(report.has_marker);
        assert_eq!(report.missing, vec!["SSID", "APISID", "SAPISID", "LOGIN_INFO"]);

        assert!(!CookieReport::inspect("garbage").has_marker);
    }
}
