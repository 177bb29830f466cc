use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::result::{Error, Result};

const DEFAULT_HOSTS: [&str; 2] = ["youtube.com", "youtu.be"];
/// Path prefixes carrying the video id as the next segment
const ID_PATH_PREFIXES: [&str; 4] = ["shorts", "embed", "live", "v"];

static VIDEO_ID_RE: OnceLock<Regex> = OnceLock::new();

fn video_id_re() -> &'static Regex {
    VIDEO_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap())
}

/// Checks that a link points to a single video of a supported site
#[derive(Debug, Clone)]
pub struct LinkValidator {
    hosts: Vec<String>,
}

impl Default for LinkValidator {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl LinkValidator {
    /// Accept the default hosts plus `extra_hosts`, subdomains included
    pub fn new(extra_hosts: &[String]) -> Self {
        let hosts = DEFAULT_HOSTS
            .iter()
            .map(|host| host.to_string())
            .chain(extra_hosts.iter().map(|host| host.to_ascii_lowercase()))
            .collect();

        Self { hosts }
    }

    fn is_known_host(&self, host: &str) -> bool {
        self.hosts
            .iter()
            .any(|known| host == known || host.ends_with(&format!(".{known}")))
    }

    /// Return the 11-character video id of the link
    pub fn video_id(&self, input: &str) -> Result<String> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidInput("the link is empty".to_owned()));
        }

        let url = Url::parse(input)
            .map_err(|err| Error::InvalidInput(format!("cannot parse the link: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| Error::InvalidInput("the link has no host".to_owned()))?;
        if !self.is_known_host(&host) {
            return Err(Error::InvalidInput(format!("unsupported site '{host}'")));
        }

        let mut segments = url.path_segments().into_iter().flatten();
        let candidate = if host == "youtu.be" || host.ends_with(".youtu.be") {
            segments.next().map(str::to_owned)
        } else if let Some((_, id)) = url
            .query_pairs()
            .find(|(key, _)| key == "v" || key == "id")
        {
            Some(id.into_owned())
        } else {
            match (segments.next(), segments.next()) {
                (Some(prefix), Some(id)) if ID_PATH_PREFIXES.contains(&prefix) => {
                    Some(id.to_owned())
                }
                _ => None,
            }
        };

        match candidate {
            Some(id) if video_id_re().is_match(&id) => Ok(id),
            Some(id) => Err(Error::InvalidInput(format!("'{id}' is not a video id"))),
            None => Err(Error::InvalidInput("no video id in the link".to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LinkValidator;
    use crate::result::Error;

    #[test]
    fn accepts_common_link_shapes() {
        let links = LinkValidator::default();
        for input in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://m.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RD",
            "https://youtu.be/dQw4w9WgXcQ?t=42",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "http://youtube.com/embed/dQw4w9WgXcQ",
            "  https://www.youtube.com/live/dQw4w9WgXcQ  ",
        ] {
            assert_eq!(links.video_id(input).unwrap(), "dQw4w9WgXcQ", "{input}");
        }
    }

    #[test]
    fn extra_hosts_are_accepted() {
        let links = LinkValidator::new(&["Video.Example".to_owned()]);
        assert_eq!(
            links
                .video_id("https://video.example/watch?id=ABCDEFGHIJK")
                .unwrap(),
            "ABCDEFGHIJK"
        );
    }

    #[test]
    fn rejects_malformed_links() {
        let links = LinkValidator::default();
        for input in [
            "",
            "not a link",
            "ftp://youtube.com/watch?v=dQw4w9WgXcQ",
            "https://evil.example/watch?v=dQw4w9WgXcQ",
            "https://notyoutube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=short",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQQ",
            "https://www.youtube.com/watch",
            "https://www.youtube.com/channel/UCabcdefghi",
            "https://youtu.be/",
        ] {
            assert!(
                matches!(links.video_id(input), Err(Error::InvalidInput(_))),
                "{input}"
            );
        }
    }
}
