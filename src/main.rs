mod cli;
mod credentials;
mod io;
mod logging;
mod orchestrator;
mod outside;
mod rate_limit;
mod resolver;
mod result;
mod selector;
mod server;
mod settings;
mod types;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use miette::{miette, IntoDiagnostic, Result, WrapErr};
use tokio::sync::Semaphore;
use tracing::info;

use crate::{
    cli::Args,
    credentials::{CredentialLocator, CredentialSource},
    logging::init_logging,
    orchestrator::{LinkValidator, Orchestrator, RetryPolicy},
    outside::{AudioConversion, Ffmpeg, Transcoder, Ytdl},
    rate_limit::SlidingWindowLimiter,
    server::AppState,
    settings::Settings,
};

fn main() -> Result<()> {
    let args = Args::parse();
    // Before the runtime threads exist
    init_logging(args.log_level.into())?;

    let settings = Settings::load(&args)?;

    std::fs::create_dir_all(&settings.download_dir)
        .into_diagnostic()
        .wrap_err("Could not create the download directory")?;
    info!("Downloads are stored in {}", settings.download_dir.display());

    let (ytdl, ffmpeg) = load_external_components(&settings)?;

    let credentials = Arc::new(CredentialLocator::new(
        settings.cookies.staging_path.clone(),
        settings.cookies.path.clone(),
    ));
    // Pick up mounted cookies right away, so that the health route reports them
    credentials.locate(true);

    let ytdl = Arc::new(ytdl);
    let orchestrator = Orchestrator::new(
        ytdl.clone(),
        ytdl,
        credentials.clone(),
        settings.download_dir.clone(),
    )
    .with_policy(RetryPolicy::from(&settings.retry))
    .with_links(LinkValidator::new(&settings.extra_hosts));

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        credentials,
        transcoder: Arc::new(ffmpeg),
        limiter: Arc::new(SlidingWindowLimiter::new(
            settings.rate_limit.max_requests,
            Duration::from_secs(settings.rate_limit.window_secs),
        )),
        downloads: Arc::new(Semaphore::new(
            settings.server.max_concurrent_downloads.max(1),
        )),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()
        .wrap_err("Could not start the async runtime")?;

    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(settings.server.bind.as_str())
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not listen on {}", settings.server.bind))?;

        server::serve(listener, state)
            .await
            .into_diagnostic()
            .wrap_err("Server error")
    })
}

/// Load the external components
fn load_external_components(settings: &Settings) -> Result<(Ytdl, Ffmpeg)> {
    // Construct the handles concurrently as executing an external program
    // is not instantaneous. That way we can avoid adding the costs
    let proxy = settings.proxy.clone();
    let ytdl_thread = std::thread::spawn(move || Ytdl::new(proxy));
    let ffmpeg_thread = std::thread::spawn(Ffmpeg::detect);

    let ytdl = ytdl_thread
        .join()
        .map_err(|_| miette!("yt-dlp check panicked"))??;
    let ffmpeg = ffmpeg_thread
        .join()
        .map_err(|_| miette!("ffmpeg check panicked"))?;

    let conversion = ffmpeg.available().then_some(AudioConversion {
        format: settings.audio.format,
        quality: settings.audio.quality,
    });

    let ytdl = ytdl
        .with_conversion(conversion)
        .with_cookies_from_browser(settings.cookies.from_browser.clone());

    Ok((ytdl, ffmpeg))
}
