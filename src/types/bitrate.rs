use std::{fmt::Display, str::FromStr};

use serde::Deserialize;

/// Audio bitrate in kbit/s, written as `192K`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Bitrate(u16);

impl Bitrate {
    pub const fn kbps(value: u16) -> Self {
        Self(value)
    }
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(num_prefix) = s.to_lowercase().strip_suffix('k') {
            num_prefix
                .parse()
                .map(Self)
                .map_err(|err| format!("Invalid bitrate '{s}': {err}"))
        } else {
            Err(format!("Bitrate '{s}' does not end with 'K'"))
        }
    }
}

impl TryFrom<String> for Bitrate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for Bitrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}K", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Bitrate;

    #[test]
    fn parses_kilo_suffix() {
        assert_eq!("192K".parse::<Bitrate>(), Ok(Bitrate::kbps(192)));
        assert_eq!("128k".parse::<Bitrate>(), Ok(Bitrate::kbps(128)));
        assert!("192".parse::<Bitrate>().is_err());
        assert!("fastK".parse::<Bitrate>().is_err());
        assert_eq!(Bitrate::kbps(320).to_string(), "320K");
    }
}
