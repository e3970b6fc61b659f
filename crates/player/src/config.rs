use std::path::PathBuf;
use std::str::FromStr;

use pov_assets::{AssetStoreConfig, RetryConfig};
use pov_playback::{PlaybackConfig, DEFAULT_FADE_STEPS};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Player configuration loaded from environment variables.
///
/// All fields have defaults suitable for local use.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Root directory of the asset library (default: `./pov-data`).
    pub storage_dir: PathBuf,
    /// Byte quota for the asset library. Unlimited when unset.
    pub storage_quota_bytes: Option<u64>,
    pub max_image_width: u32,
    pub max_image_height: u32,
    pub jpeg_quality: u8,
    /// Probe audio and video uploads with `ffprobe` (default: `true`).
    pub probe_media: bool,
    pub fade_steps: u32,
    pub log_format: LogFormat,
}

impl PlayerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default       |
    /// |---------------------------|---------------|
    /// | `POV_STORAGE_DIR`         | `./pov-data`  |
    /// | `POV_STORAGE_QUOTA_BYTES` | unlimited     |
    /// | `POV_MAX_IMAGE_WIDTH`     | `2560`        |
    /// | `POV_MAX_IMAGE_HEIGHT`    | `1440`        |
    /// | `POV_JPEG_QUALITY`        | `95`          |
    /// | `POV_PROBE_MEDIA`         | `true`        |
    /// | `POV_FADE_STEPS`          | `50`          |
    /// | `LOG_FORMAT`              | `pretty`      |
    ///
    /// Panics on values that do not parse; configuration errors are fatal
    /// at startup.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AssetStoreConfig::default();

        let storage_dir = lookup("POV_STORAGE_DIR")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "./pov-data".into())
            .into();

        let storage_quota_bytes = lookup("POV_STORAGE_QUOTA_BYTES")
            .filter(|s| !s.trim().is_empty())
            .map(|raw| parse("POV_STORAGE_QUOTA_BYTES", &raw));

        let max_image_width = parse_or(&lookup, "POV_MAX_IMAGE_WIDTH", defaults.max_image_width);
        let max_image_height =
            parse_or(&lookup, "POV_MAX_IMAGE_HEIGHT", defaults.max_image_height);

        let jpeg_quality: u8 = parse_or(&lookup, "POV_JPEG_QUALITY", defaults.jpeg_quality);
        assert!(
            (1..=100).contains(&jpeg_quality),
            "POV_JPEG_QUALITY must be between 1 and 100"
        );

        let probe_media = lookup("POV_PROBE_MEDIA")
            .map(|raw| parse_bool("POV_PROBE_MEDIA", &raw))
            .unwrap_or(true);

        let fade_steps = parse_or(&lookup, "POV_FADE_STEPS", DEFAULT_FADE_STEPS);

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            storage_dir,
            storage_quota_bytes,
            max_image_width,
            max_image_height,
            jpeg_quality,
            probe_media,
            fade_steps,
            log_format,
        }
    }

    pub fn asset_store(&self) -> AssetStoreConfig {
        AssetStoreConfig {
            max_image_width: self.max_image_width,
            max_image_height: self.max_image_height,
            jpeg_quality: self.jpeg_quality,
            retry: RetryConfig::default(),
        }
    }

    pub fn playback(&self) -> PlaybackConfig {
        PlaybackConfig {
            fade_steps: self.fade_steps,
            ..Default::default()
        }
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        panic!(
            "{key} must be a valid {}",
            std::any::type_name::<T>()
        )
    })
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(default, |raw| parse(key, &raw))
}

fn parse_bool(key: &str, raw: &str) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => panic!("{key} must be a boolean"),
    }
}
