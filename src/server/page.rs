use indoc::formatdoc;

/// What the form page shows below the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    None,
    /// Link to a finished file
    Ready { title: String, file_name: String },
    Failure(String),
}

/// Render the single page of the service.
///
/// `url` prefills the link input so that a failed request can be retried as is.
pub fn render(url: &str, notice: &Notice, transcoder: bool) -> String {
    let notice = match notice {
        Notice::None => String::new(),
        Notice::Ready { title, file_name } => format!(
            r#"<p class="ready">Ready: <a href="/download/{href}" download>{title}</a></p>"#,
            href = urlencoding::encode(file_name),
            title = escape(title),
        ),
        Notice::Failure(message) => {
            format!(r#"<p class="failure">{}</p>"#, escape(message))
        }
    };
    let conversion = if transcoder {
        "Files are converted to the configured audio format."
    } else {
        "ffmpeg is not installed, files keep the container of the source."
    };

    formatdoc! {r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
          <meta charset="utf-8">
          <meta name="viewport" content="width=device-width, initial-scale=1">
          <title>audiofetch</title>
          <style>
            body {{ font-family: sans-serif; max-width: 40rem; margin: 3rem auto; padding: 0 1rem; }}
            input[type=url] {{ width: 100%; padding: .5rem; }}
            .ready {{ color: #1b5e20; }}
            .failure {{ color: #b71c1c; }}
            small {{ color: #666; }}
          </style>
        </head>
        <body>
          <h1>audiofetch</h1>
          <form method="post" action="/" enctype="multipart/form-data">
            <p><input type="url" name="url" placeholder="https://www.youtube.com/watch?v=..." value="{url}" required></p>
            <p><label>cookies.txt (optional) <input type="file" name="cookies" accept=".txt"></label></p>
            <p><button type="submit">Download audio</button></p>
          </form>
          {notice}
          <p><small>{conversion}</small></p>
        </body>
        </html>
    "#,
        url = escape(url),
    }
}

/// Escape text for HTML element content and quoted attributes
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
