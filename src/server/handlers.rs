use std::{
    io::ErrorKind,
    net::{IpAddr, SocketAddr},
    path::Path,
};

use axum::{
    body::Body,
    extract::{ConnectInfo, Multipart, Path as UrlPath, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER},
        HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use super::{
    page::{render, Notice},
    AppState,
};
use crate::{
    orchestrator::OutputFile,
    result::{Error, Result},
    types::AudioFormat,
};

/// Plain text error for the file routes
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: &'static str,
}

impl HttpError {
    fn bad_request(message: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "File not found",
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Could not read the file",
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// HTTP status reported for a failed download
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::UnsupportedContent | Error::ContentUnavailable(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Error::AllStrategiesFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The form submitted on the page
#[derive(Debug, Default)]
pub struct DownloadForm {
    pub url: String,
    /// Optional cookies.txt upload, empty when none was sent
    pub cookies: Vec<u8>,
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render("", &Notice::None, state.transcoder.available()))
}

pub async fn submit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut multipart: Multipart,
) -> Response {
    let mut form = DownloadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!("Malformed form from {addr}: {err}");
                return page(&state, StatusCode::BAD_REQUEST, "", unreadable_form());
            }
        };

        let name = field.name().map(str::to_owned);
        let read = match name.as_deref() {
            Some("url") => field.text().await.map(|text| form.url = text.trim().to_owned()),
            Some("cookies") => field.bytes().await.map(|bytes| form.cookies = bytes.to_vec()),
            _ => Ok(()),
        };
        if let Err(err) = read {
            warn!("Could not read form field from {addr}: {err}");
            return page(&state, StatusCode::BAD_REQUEST, "", unreadable_form());
        }
    }

    process(&state, addr.ip(), form).await
}

/// Run one download request and render the outcome
pub async fn process(state: &AppState, client: IpAddr, form: DownloadForm) -> Response {
    if let Err(wait) = state.limiter.check(client) {
        warn!("Rate limited {client}, retry in {wait:?}");
        let minutes = wait.as_secs().div_ceil(60).max(1);
        let mut response = page(
            state,
            StatusCode::TOO_MANY_REQUESTS,
            &form.url,
            failure(&format!(
                "Too many downloads from your address. Try again in {minutes} minute(s)."
            )),
        );
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(wait.as_secs().max(1)));
        return response;
    }

    let permit = match state.downloads.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(err) => {
            error!("Download slots closed: {err}");
            return page(
                state,
                StatusCode::INTERNAL_SERVER_ERROR,
                &form.url,
                failure("The server is shutting down, please try again later."),
            );
        }
    };

    info!("Download requested by {client}: {}", form.url);
    let orchestrator = state.orchestrator.clone();
    let credentials = state.credentials.clone();
    let DownloadForm { url, cookies } = form;
    let job_url = url.clone();

    let outcome: Result<OutputFile> = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        // The staged jar is shared, only a usable request may replace it
        orchestrator.check_link(&job_url)?;
        credentials.stage_upload(&cookies)?;
        orchestrator.download(&job_url)
    })
    .await
    .unwrap_or_else(|err| Err(miette::miette!("Download task failed: {err}").into()));

    match outcome {
        Ok(output) => {
            let notice = Notice::Ready {
                file_name: output.file_name(),
                title: output.title,
            };
            page(state, StatusCode::OK, "", notice)
        }
        Err(err) => {
            let status = status_for(&err);
            if status.is_server_error() {
                error!("Download of {url} failed: {err}");
            }
            page(state, status, &url, failure(&err.user_message()))
        }
    }
}

pub async fn download(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> std::result::Result<Response, HttpError> {
    serve_file(state.orchestrator.download_dir(), &filename).await
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub transcoder: bool,
    pub credentials: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        transcoder: state.transcoder.available(),
        credentials: state.credentials.is_staged(),
    })
}

fn failure(message: &str) -> Notice {
    Notice::Failure(message.to_owned())
}

fn unreadable_form() -> Notice {
    failure("The form could not be read.")
}

fn page(state: &AppState, status: StatusCode, url: &str, notice: Notice) -> Response {
    let html = render(url, &notice, state.transcoder.available());
    (status, Html(html)).into_response()
}

/// Only plain names of visible files directly inside the download directory
fn is_servable_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}

/// Stream a finished file from `dir` as an attachment
pub async fn serve_file(dir: &Path, name: &str) -> std::result::Result<Response, HttpError> {
    if !is_servable_name(name) {
        return Err(HttpError::bad_request("Invalid file name"));
    }

    let path = dir.join(name);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(HttpError::not_found()),
        Err(err) => {
            error!("Could not open {}: {err}", path.display());
            return Err(HttpError::internal());
        }
    };

    let metadata = file.metadata().await.map_err(|err| {
        error!("Could not stat {}: {err}", path.display());
        HttpError::internal()
    })?;
    if !metadata.is_file() {
        return Err(HttpError::not_found());
    }

    let content_type =
        AudioFormat::from_path(name).map_or("application/octet-stream", AudioFormat::mime);
    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, metadata.len())
        .header(CONTENT_DISPOSITION, content_disposition(name))
        .body(body)
        .map_err(|err| {
            error!("Could not build the response for {name}: {err}");
            HttpError::internal()
        })
}

fn content_disposition(name: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback(name),
        urlencoding::encode(name)
    )
}

fn ascii_fallback(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match fallback.trim() {
        "" => "audio".to_owned(),
        trimmed => trimmed.to_owned(),
    }
}
