//! Error type for the engine facade.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("channel index {0} out of range")]
    InvalidChannel(usize),

    #[error("output device: {0}")]
    Device(#[source] anyhow::Error),

    #[error("playback stopped: {0}")]
    PlaybackFailed(String),

    #[error("audio thread did not exit within {0:?}")]
    StopTimeout(Duration),

    #[error("background source: {0}")]
    BackgroundSource(#[source] anyhow::Error),

    #[error("engine has been released")]
    Released,
}

pub type Result<T> = std::result::Result<T, EngineError>;
