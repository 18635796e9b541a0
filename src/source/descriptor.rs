use regex::{Captures, Regex};
use std::path::PathBuf;
use std::sync::OnceLock;

/// What a connection descriptor points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Local camera index, e.g. "0"
    Device(u32),
    /// Network stream URL (rtsp, rtmp, http)
    Network(String),
    /// Recorded video file
    File(PathBuf),
}

const NETWORK_SCHEMES: [&str; 5] = ["rtsp://", "rtsps://", "rtmp://", "http://", "https://"];

impl SourceKind {
    /// Classify a descriptor: all digits is a device index, a known stream
    /// scheme is a network source, anything else is treated as a file path.
    pub fn from_descriptor(descriptor: &str) -> Self {
        let trimmed = descriptor.trim();

        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = trimmed.parse::<u32>() {
                return SourceKind::Device(index);
            }
        }

        let lower = trimmed.to_ascii_lowercase();
        if NETWORK_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            return SourceKind::Network(trimmed.to_string());
        }

        SourceKind::File(PathBuf::from(trimmed))
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Device(_) => "device",
            SourceKind::Network(_) => "network",
            SourceKind::File(_) => "file",
        }
    }

    /// Descriptor text that is safe to log
    pub fn display_descriptor(&self) -> String {
        match self {
            SourceKind::Device(index) => format!("/dev/video{}", index),
            SourceKind::Network(url) => mask_credentials(url),
            SourceKind::File(path) => path.display().to_string(),
        }
    }
}

fn userinfo_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Greedy within the authority, so the last '@' before the path wins
    PATTERN.get_or_init(|| {
        Regex::new(r#"://([^/?#\s"]*)@"#).expect("userinfo pattern is a valid regex")
    })
}

/// Mask the userinfo of every URL in `text`: `user:password@` becomes
/// `***:***@` and a bare `user@` becomes `***@`.
pub fn mask_credentials(text: &str) -> String {
    userinfo_pattern()
        .replace_all(text, |caps: &Captures<'_>| {
            if caps[1].contains(':') {
                "://***:***@"
            } else {
                "://***@"
            }
        })
        .into_owned()
}
