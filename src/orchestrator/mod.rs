//! Walk the extraction strategies until one of them produces a file.
//!
//! Every strategy gets a probe, a stream choice, and a download into a directory of its own.
//! Failures are classified to decide between refreshing the credentials, cooling down,
//! or giving up early when no other strategy can succeed.

mod classify;
mod link;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

pub use classify::{classify, Classification};
pub use link::LinkValidator;

use crate::{
    credentials::{CredentialBundle, CredentialSource},
    io::move_to_unused,
    outside::{Downloader, FetchRequest, Prober, Profile},
    resolver, selector,
    result::{Error, Result},
    types::{default_strategies, ExtractionStrategy},
};

/// Blocking wait between attempts
pub trait Pause: Send + Sync {
    fn pause(&self, duration: Duration);
}

/// Sleep the current thread
#[derive(Debug, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Waiting times applied on top of the strategy backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound of the random delay added to every backoff
    pub jitter: Duration,
    pub auth_cooldown: Duration,
    pub rate_limit_cooldown: Duration,
    pub transient_cooldown: Duration,
    /// Credentials may only be refreshed during the first strategies
    pub refresh_window: usize,
    /// No new strategy is started once this much time has passed
    pub time_budget: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            jitter: Duration::from_millis(1500),
            auth_cooldown: Duration::from_secs(5),
            rate_limit_cooldown: Duration::from_secs(20),
            transient_cooldown: Duration::from_secs(1),
            refresh_window: 3,
            time_budget: None,
        }
    }
}

/// The file a successful download left in the download directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub title: String,
}

impl OutputFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub struct Orchestrator {
    prober: Arc<dyn Prober>,
    downloader: Arc<dyn Downloader>,
    credentials: Arc<dyn CredentialSource>,
    pause: Arc<dyn Pause>,
    strategies: &'static [ExtractionStrategy],
    policy: RetryPolicy,
    links: LinkValidator,
    download_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(
        prober: Arc<dyn Prober>,
        downloader: Arc<dyn Downloader>,
        credentials: Arc<dyn CredentialSource>,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            prober,
            downloader,
            credentials,
            pause: Arc::new(ThreadPause),
            strategies: default_strategies(),
            policy: RetryPolicy::default(),
            links: LinkValidator::default(),
            download_dir,
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_strategies(mut self, strategies: &'static [ExtractionStrategy]) -> Self {
        self.strategies = strategies;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_links(mut self, links: LinkValidator) -> Self {
        self.links = links;
        self
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Video id behind `url`, or `InvalidInput` when the link is not supported
    pub fn check_link(&self, url: &str) -> Result<String> {
        self.links.video_id(url)
    }

    /// Delay before the strategy at `idx`, growing with the position
    fn backoff(&self, strategy: &ExtractionStrategy, idx: usize) -> Duration {
        let jitter_ms = self.policy.jitter.as_millis() as u64;
        let jitter = Duration::from_millis(fastrand::u64(0..=jitter_ms));
        strategy.base_delay * idx as u32 + jitter
    }

    /// Download the audio of the video behind `url`.
    ///
    /// Partial failures are only logged: the caller gets either the file or the
    /// last failure once every strategy has been tried.
    pub fn download(&self, url: &str) -> Result<OutputFile> {
        let video_id = self.check_link(url)?;
        let started = Instant::now();
        info!("Downloading video {video_id}");

        let mut credentials = self.credentials.locate(false);
        let mut refreshed = false;
        let mut last_failure: Option<(String, Classification)> = None;

        for (idx, strategy) in self.strategies.iter().enumerate() {
            if let Some(budget) = self.policy.time_budget {
                if started.elapsed() >= budget {
                    warn!("Time budget of {budget:?} exhausted, not trying further strategies");
                    break;
                }
            }

            if idx > 0 {
                let delay = self.backoff(strategy, idx);
                debug!("Waiting {delay:?} before the next strategy");
                self.pause.pause(delay);
            }

            info!(
                "Strategy {}/{} '{}' for {video_id}",
                idx + 1,
                self.strategies.len(),
                strategy.name
            );

            let err = match self.attempt(url, strategy, credentials.as_ref()) {
                Ok(output) => {
                    info!(
                        "Strategy '{}' succeeded: {}",
                        strategy.name,
                        output.path.display()
                    );
                    return Ok(output);
                }
                Err(err) => err,
            };

            let classification = classify(&err);
            warn!(
                "Strategy '{}' failed ({classification}): {err}",
                strategy.name
            );

            let cooldown = |duration| {
                if idx + 1 < self.strategies.len() {
                    self.pause.pause(duration);
                }
            };

            if classification.is_final() {
                return Err(final_error(err, classification));
            }

            match classification {
                Classification::AuthRequired | Classification::BotDetected => {
                    if !refreshed && idx < self.policy.refresh_window {
                        info!("Refreshing credentials");
                        credentials = self.credentials.locate(true);
                        refreshed = true;
                    }
                    cooldown(self.policy.auth_cooldown);
                }
                Classification::RateLimited => cooldown(self.policy.rate_limit_cooldown),
                Classification::Transient => cooldown(self.policy.transient_cooldown),
                _ => {}
            }

            last_failure = Some((err.to_string(), classification));
        }

        let (last_error, classification) = last_failure.unwrap_or_else(|| {
            (
                "no strategy could be tried in time".to_owned(),
                Classification::Transient,
            )
        });
        warn!("All strategies failed for {video_id}, last failure ({classification}): {last_error}");

        Err(Error::AllStrategiesFailed {
            last_error,
            classification,
        })
    }

    /// One probe, stream choice, download and resolution
    fn attempt(
        &self,
        url: &str,
        strategy: &ExtractionStrategy,
        credentials: Option<&CredentialBundle>,
    ) -> Result<OutputFile> {
        let cookies = credentials
            .filter(|_| strategy.use_credentials)
            .map(|bundle| bundle.path.as_path());
        let profile = Profile { strategy, cookies };

        let info = self.prober.probe(url, &profile)?;
        debug!("Probed {info}");

        if info.is_live {
            return Err(Error::UnsupportedContent);
        }
        if info.is_restricted() {
            return Err(Error::ContentUnavailable(format!(
                "the video is {}",
                info.availability.as_deref().unwrap_or("restricted")
            )));
        }

        let stream = selector::choose(&info.streams);
        debug!("Selected stream {stream:?}");

        // The directory is removed with everything left in it when dropped
        let job = tempfile::Builder::new()
            .prefix(".job-")
            .tempdir_in(&self.download_dir)?;

        let before = resolver::snapshot(job.path())?;
        self.downloader.fetch(&FetchRequest {
            url,
            profile,
            stream: &stream,
            out_dir: job.path(),
        })?;
        let after = resolver::snapshot(job.path())?;

        let produced = resolver::resolve(&before, &after, job.path())?;
        let path = move_to_unused(&produced, &self.download_dir)?;

        Ok(OutputFile {
            path,
            title: info.title,
        })
    }
}

/// Give a raw extractor failure the error kind matching its classification
fn final_error(err: Error, classification: Classification) -> Error {
    match (err, classification) {
        (
            err @ (Error::InvalidInput(_) | Error::UnsupportedContent | Error::ContentUnavailable(_)),
            _,
        ) => err,
        (_, Classification::UnsupportedContent) => Error::UnsupportedContent,
        (err, Classification::InvalidInput) => Error::InvalidInput(err.to_string()),
        (err, _) => Error::ContentUnavailable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        fs,
        path::PathBuf,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::{Duration, SystemTime},
    };

    use super::{Classification, LinkValidator, Orchestrator, Pause, RetryPolicy};
    use crate::{
        credentials::{CredentialBundle, CredentialSource},
        outside::{Downloader, FetchRequest, Prober, Profile},
        result::{Error, Result},
        selector::StreamChoice,
        types::{ExtractionStrategy, MediaStream, ProbeInfo},
    };

    const fn strategy(name: &'static str, use_credentials: bool) -> ExtractionStrategy {
        ExtractionStrategy {
            name,
            client_identities: &["web"],
            use_credentials,
            aggressive: false,
            base_delay: Duration::from_secs(1),
        }
    }

    const TWO: [ExtractionStrategy; 2] = [strategy("s1", false), strategy("s2", false)];
    const THREE: [ExtractionStrategy; 3] = [
        strategy("s1", true),
        strategy("s2", false),
        strategy("s3", true),
    ];
    const FOUR: [ExtractionStrategy; 4] = [
        strategy("s1", true),
        strategy("s2", false),
        strategy("s3", true),
        strategy("s4", false),
    ];

    const PRIVATE_VIDEO: &str = "ERROR: [youtube] ABCDEFGHIJK: Private video. Sign in if you've \
        been granted access to this video. Use --cookies-from-browser or --cookies for the \
        authentication. See  https://github.com/yt-dlp/yt-dlp/wiki/FAQ for how to manually pass cookies";

    /// What the fake extractor does for a given strategy
    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        ProbeFails(&'static str),
        Live,
        Private,
        FetchFails(&'static str),
        FetchWritesNothing,
        Succeeds,
    }

    #[derive(Default)]
    struct FakeExtractor {
        behaviors: HashMap<&'static str, Behavior>,
        probes: AtomicUsize,
        fetches: AtomicUsize,
        selected: Mutex<Vec<StreamChoice>>,
        cookies_seen: Mutex<Vec<Option<PathBuf>>>,
    }

    impl FakeExtractor {
        fn new(behaviors: &[(&'static str, Behavior)]) -> Arc<Self> {
            Arc::new(Self {
                behaviors: behaviors.iter().copied().collect(),
                ..Default::default()
            })
        }

        fn behavior(&self, profile: &Profile<'_>) -> Behavior {
            self.behaviors
                .get(profile.strategy.name)
                .copied()
                .unwrap_or(Behavior::FetchFails("not scripted"))
        }

        fn probes(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl Prober for FakeExtractor {
        fn probe(&self, _url: &str, profile: &Profile<'_>) -> Result<ProbeInfo> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.cookies_seen
                .lock()
                .unwrap()
                .push(profile.cookies.map(PathBuf::from));

            let mut info = ProbeInfo {
                id: "ABCDEFGHIJK".to_owned(),
                title: "Some Title".to_owned(),
                ext: Some("webm".to_owned()),
                is_live: false,
                availability: Some("public".to_owned()),
                streams: vec![
                    MediaStream {
                        id: "muxed-1".to_owned(),
                        audio_codec: Some("aac".to_owned()),
                        video_codec: Some("avc1".to_owned()),
                        average_bitrate: Some(128.0),
                        container: Some("mp4".to_owned()),
                    },
                    MediaStream {
                        id: "audio-1".to_owned(),
                        audio_codec: Some("opus".to_owned()),
                        video_codec: None,
                        average_bitrate: Some(128.0),
                        container: Some("webm".to_owned()),
                    },
                ],
            };

            match self.behavior(profile) {
                Behavior::ProbeFails(message) => return Err(Error::Extractor(message.to_owned())),
                Behavior::Live => info.is_live = true,
                Behavior::Private => info.availability = Some("private".to_owned()),
                _ => {}
            }
            Ok(info)
        }
    }

    impl Downloader for FakeExtractor {
        fn fetch(&self, request: &FetchRequest<'_>) -> Result<()> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.selected.lock().unwrap().push(request.stream.clone());

            match self.behavior(&request.profile) {
                Behavior::FetchFails(message) => Err(Error::Extractor(message.to_owned())),
                Behavior::FetchWritesNothing => Ok(()),
                _ => {
                    fs::write(request.out_dir.join("Some Title.mp3"), b"audio")?;
                    Ok(())
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingPause(Mutex<Vec<Duration>>);

    impl Pause for RecordingPause {
        fn pause(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    struct FakeCredentials {
        bundle: Option<CredentialBundle>,
        calls: Mutex<Vec<bool>>,
    }

    impl FakeCredentials {
        fn new(present: bool) -> Arc<Self> {
            let bundle = present.then(|| CredentialBundle {
                path: PathBuf::from("/staging/cookies.txt"),
                size_bytes: 10,
                refreshed_at: SystemTime::now(),
            });
            Arc::new(Self {
                bundle,
                calls: Mutex::new(vec![]),
            })
        }
    }

    impl CredentialSource for FakeCredentials {
        fn locate(&self, force_refresh: bool) -> Option<CredentialBundle> {
            self.calls.lock().unwrap().push(force_refresh);
            self.bundle.clone()
        }
    }

    fn no_wait_policy() -> RetryPolicy {
        RetryPolicy {
            jitter: Duration::ZERO,
            auth_cooldown: Duration::from_secs(5),
            rate_limit_cooldown: Duration::from_secs(20),
            transient_cooldown: Duration::from_millis(500),
            refresh_window: 2,
            time_budget: None,
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        extractor: Arc<FakeExtractor>,
        credentials: Arc<FakeCredentials>,
        pause: Arc<RecordingPause>,
        orchestrator: Orchestrator,
    }

    fn harness(
        strategies: &'static [ExtractionStrategy],
        behaviors: &[(&'static str, Behavior)],
        with_credentials: bool,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::new(behaviors);
        let credentials = FakeCredentials::new(with_credentials);
        let pause = Arc::new(RecordingPause::default());

        let orchestrator = Orchestrator::new(
            extractor.clone(),
            extractor.clone(),
            credentials.clone(),
            dir.path().to_path_buf(),
        )
        .with_strategies(strategies)
        .with_policy(no_wait_policy())
        .with_links(LinkValidator::new(&["video.example".to_owned()]))
        .with_pause(pause.clone());

        Harness {
            dir,
            extractor,
            credentials,
            pause,
            orchestrator,
        }
    }

    const URL: &str = "https://video.example/watch?id=ABCDEFGHIJK";

    #[test]
    fn malformed_links_never_reach_the_extractor() {
        let h = harness(&TWO, &[("s1", Behavior::Succeeds)], false);

        for url in [
            "https://video.example/watch?id=SHORT",
            "https://other.example/watch?id=ABCDEFGHIJK",
            "https://video.example/watch",
            "garbage",
        ] {
            let res = h.orchestrator.download(url);
            assert!(matches!(res, Err(Error::InvalidInput(_))), "{url}");
        }
        assert_eq!(h.extractor.probes(), 0);
        assert_eq!(h.extractor.fetches(), 0);
        assert!(h.credentials.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn live_stream_stops_after_one_probe() {
        let h = harness(&THREE, &[("s1", Behavior::Live)], false);

        let res = h.orchestrator.download(URL);
        assert!(matches!(res, Err(Error::UnsupportedContent)));
        assert_eq!(h.extractor.probes(), 1);
        assert_eq!(h.extractor.fetches(), 0);
    }

    #[test]
    fn private_video_stops_after_one_strategy() {
        let h = harness(&THREE, &[("s1", Behavior::Private)], false);

        let res = h.orchestrator.download(URL);
        assert!(matches!(res, Err(Error::ContentUnavailable(_))));
        assert_eq!(h.extractor.probes(), 1);
        assert_eq!(h.extractor.fetches(), 0);
    }

    #[test]
    fn unavailable_message_aborts_the_loop() {
        let h = harness(
            &THREE,
            &[(
                "s1",
                Behavior::ProbeFails("[youtube] ABCDEFGHIJK: Video unavailable"),
            )],
            false,
        );

        let res = h.orchestrator.download(URL);
        assert!(matches!(res, Err(Error::ContentUnavailable(_))));
        assert_eq!(h.extractor.probes(), 1);
    }

    #[test]
    fn private_video_message_aborts_the_loop() {
        let h = harness(&THREE, &[("s1", Behavior::ProbeFails(PRIVATE_VIDEO))], true);

        let err = h.orchestrator.download(URL).unwrap_err();
        assert!(matches!(err, Error::ContentUnavailable(_)), "{err:?}");
        assert!(err.user_message().contains("private"));
        assert_eq!(h.extractor.probes(), 1);
        assert_eq!(*h.credentials.calls.lock().unwrap(), vec![false]);
        assert!(h.pause.0.lock().unwrap().is_empty());
    }

    #[test]
    fn transient_failures_until_the_last_strategy() {
        let h = harness(
            &THREE,
            &[
                ("s1", Behavior::FetchFails("Read timed out")),
                ("s2", Behavior::FetchFails("Connection reset by peer")),
                ("s3", Behavior::Succeeds),
            ],
            false,
        );

        let output = h.orchestrator.download(URL).unwrap();
        assert_eq!(output.file_name(), "Some Title.mp3");
        assert_eq!(h.extractor.probes(), 3);
        assert_eq!(h.extractor.fetches(), 3);

        // Backoff grows with the position, each transient failure adds a short cooldown
        assert_eq!(
            *h.pause.0.lock().unwrap(),
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_millis(500),
                Duration::from_secs(2),
            ]
        );
    }

    #[test]
    fn end_to_end_second_strategy_succeeds() {
        let h = harness(
            &TWO,
            &[
                ("s1", Behavior::ProbeFails("Unable to download webpage: timed out")),
                ("s2", Behavior::Succeeds),
            ],
            false,
        );

        let output = h.orchestrator.download(URL).unwrap();
        assert_eq!(output.title, "Some Title");
        assert_eq!(output.path, h.dir.path().join("Some Title.mp3"));
        assert_eq!(fs::read(&output.path).unwrap(), b"audio");

        assert_eq!(h.extractor.probes(), 2);
        assert_eq!(h.extractor.fetches(), 1);
        assert_eq!(
            *h.extractor.selected.lock().unwrap(),
            vec![StreamChoice::Stream("audio-1".to_owned())]
        );
        assert_eq!(*h.credentials.calls.lock().unwrap(), vec![false]);

        // Only the final file remains, attempt directories are cleaned up
        let names: Vec<_> = fs::read_dir(h.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["Some Title.mp3"]);
    }

    #[test]
    fn bot_detection_refreshes_credentials_once() {
        let h = harness(
            &THREE,
            &[
                ("s1", Behavior::ProbeFails("Sign in to confirm you're not a bot")),
                ("s2", Behavior::ProbeFails("Sign in to confirm you're not a bot")),
                ("s3", Behavior::Succeeds),
            ],
            true,
        );

        h.orchestrator.download(URL).unwrap();
        assert_eq!(*h.credentials.calls.lock().unwrap(), vec![false, true]);

        // Cookies only go along with the strategies using them
        let staged = Some(PathBuf::from("/staging/cookies.txt"));
        assert_eq!(
            *h.extractor.cookies_seen.lock().unwrap(),
            vec![staged.clone(), None, staged]
        );

        let pauses = h.pause.0.lock().unwrap();
        assert_eq!(
            pauses
                .iter()
                .filter(|pause| **pause == Duration::from_secs(5))
                .count(),
            2
        );
    }

    #[test]
    fn no_refresh_outside_the_refresh_window() {
        let h = harness(
            &FOUR,
            &[
                ("s1", Behavior::FetchFails("Read timed out")),
                ("s2", Behavior::FetchFails("Read timed out")),
                ("s3", Behavior::ProbeFails("Sign in to confirm you're not a bot")),
                ("s4", Behavior::Succeeds),
            ],
            true,
        );

        h.orchestrator.download(URL).unwrap();
        assert_eq!(*h.credentials.calls.lock().unwrap(), vec![false]);

        // The auth cooldown still applies
        assert_eq!(
            *h.pause.0.lock().unwrap(),
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_millis(500),
                Duration::from_secs(2),
                Duration::from_secs(5),
                Duration::from_secs(3),
            ]
        );
    }

    #[test]
    fn exhaustion_reports_the_last_classification() {
        let h = harness(
            &THREE,
            &[
                ("s1", Behavior::FetchWritesNothing),
                ("s2", Behavior::ProbeFails("HTTP Error 429: Too Many Requests")),
                ("s3", Behavior::ProbeFails("HTTP Error 429: Too Many Requests")),
            ],
            false,
        );

        let err = h.orchestrator.download(URL).unwrap_err();
        match &err {
            Error::AllStrategiesFailed {
                last_error,
                classification,
            } => {
                assert_eq!(*classification, Classification::RateLimited);
                assert!(last_error.contains("429"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.user_message().contains("residential proxy"));
        assert!(h
            .pause
            .0
            .lock()
            .unwrap()
            .contains(&Duration::from_secs(20)));
        assert_eq!(h.extractor.probes(), 3);
        assert_eq!(h.extractor.fetches(), 1);
    }

    #[test]
    fn exhausted_time_budget_stops_the_loop() {
        let mut h = harness(&TWO, &[("s1", Behavior::Succeeds)], false);
        h.orchestrator = h.orchestrator.with_policy(RetryPolicy {
            time_budget: Some(Duration::ZERO),
            ..no_wait_policy()
        });

        let err = h.orchestrator.download(URL).unwrap_err();
        assert!(matches!(err, Error::AllStrategiesFailed { .. }));
        assert_eq!(h.extractor.probes(), 0);
    }
}
