// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::PathBuf;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// # Partition streamer options
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct StreamerOptions {
    /// # Heartbeat duration
    ///
    /// Interval in which the server sends heartbeats on an otherwise idle change stream.
    /// Heartbeats advance the watermark and the resume position of a partition.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    heartbeat_duration: humantime::Duration,

    /// # Debug watermark lag
    ///
    /// Once the watermark of a partition lags behind the wall clock by more than this,
    /// the partition is streamed in debug mode which logs every record.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    debug_watermark_lag: humantime::Duration,
}

impl StreamerOptions {
    pub fn heartbeat_duration(&self) -> Duration {
        *self.heartbeat_duration
    }

    pub fn debug_watermark_lag(&self) -> Duration {
        *self.debug_watermark_lag
    }

    fn validate(&self) -> Result<(), InvalidConfigurationError> {
        if self.heartbeat_duration().is_zero() {
            return Err(InvalidConfigurationError("heartbeat-duration must not be zero"));
        }
        Ok(())
    }
}

impl Default for StreamerOptions {
    fn default() -> Self {
        Self {
            heartbeat_duration: Duration::from_secs(1).into(),
            debug_watermark_lag: Duration::from_secs(5 * 60).into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct InvalidConfigurationError(&'static str);

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("configuration loading error: {0}")]
    Figment(Box<figment::Error>),
    #[error(transparent)]
    InvalidConfiguration(#[from] InvalidConfigurationError),
}

// Because thiserror doesn't support auto-boxing or auto implements From with boxing.
impl From<figment::Error> for ConfigLoadError {
    fn from(value: figment::Error) -> Self {
        Self::Figment(Box::new(value))
    }
}

/// Layers defaults, an optional TOML file and `CHANGEFEED_` environment variables.
#[derive(Debug, Default, derive_builder::Builder)]
#[builder(default)]
pub struct OptionsLoader {
    #[builder(setter(strip_option))]
    path: Option<PathBuf>,
    load_env: bool,
}

impl OptionsLoader {
    pub fn load_once(&self) -> Result<StreamerOptions, ConfigLoadError> {
        let mut figment = Figment::from(Serialized::defaults(StreamerOptions::default()));
        if let Some(path) = &self.path {
            figment = figment.merge(Toml::file_exact(path.as_path()));
        }
        if self.load_env {
            figment = figment.merge(
                Env::prefixed("CHANGEFEED_")
                    .split("__")
                    .map(|k| k.as_str().replace('_', "-").into()),
            );
        }

        let options: StreamerOptions = figment.extract()?;
        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn defaults() {
        let options = OptionsLoader::default().load_once().expect("defaults load");
        assert_eq!(options.heartbeat_duration(), Duration::from_secs(1));
        assert_eq!(options.debug_watermark_lag(), Duration::from_secs(300));
    }

    #[test]
    fn file_overrides_defaults() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "heartbeat-duration = \"250ms\"")?;

        let options = OptionsLoaderBuilder::default()
            .path(file.path().to_path_buf())
            .build()?
            .load_once()?;

        assert_eq!(options.heartbeat_duration(), Duration::from_millis(250));
        assert_eq!(options.debug_watermark_lag(), Duration::from_secs(300));
        Ok(())
    }

    #[test]
    fn zero_heartbeat_is_rejected() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "heartbeat-duration = \"0s\"")?;

        let result = OptionsLoaderBuilder::default()
            .path(file.path().to_path_buf())
            .build()?
            .load_once();

        assert!(matches!(
            result,
            Err(ConfigLoadError::InvalidConfiguration(_))
        ));
        Ok(())
    }

    #[test]
    fn builder_overrides() -> anyhow::Result<()> {
        let options = StreamerOptionsBuilder::default()
            .debug_watermark_lag(Duration::from_secs(10).into())
            .build()?;
        assert_eq!(options.debug_watermark_lag(), Duration::from_secs(10));
        assert_eq!(options.heartbeat_duration(), Duration::from_secs(1));
        Ok(())
    }
}
