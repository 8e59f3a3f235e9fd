//! C FFI bindings for the tone engine
//!
//! This module exposes [`ToneEngine`] to C/Swift hosts via C-compatible
//! functions. Parameters are addressed by index (see the `CHANNEL_PARAM_*`
//! and `BGM_PARAM_*` constants). Out-of-range channel indices and unknown
//! parameters are ignored; getters return 0 for them.

use crate::background::TrackSource;
use crate::config::{EngineConfig, CHANNEL_COUNT};
use crate::engine::ToneEngine;
use crate::visualization::ObserverId;
use std::ffi::{c_char, c_void, CStr};
use std::slice;
use std::sync::{Arc, Mutex};

/// Waveform callback: `(user_data, samples, channel_count, frames)`
///
/// `samples` holds `(channel_count + 1) * frames` floats: each channel's
/// waveform in order, then the master waveform. The pointer is only valid for
/// the duration of the call. Called on a background thread.
pub type BowlWaveformCallback =
    extern "C" fn(user_data: *mut c_void, samples: *const f32, channel_count: u32, frames: u32);

/// Host context pointer handed back to the waveform callback
#[derive(Clone, Copy)]
struct UserData(*mut c_void);

// The host owns the pointee and promises it is usable from the callback thread
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    fn get(self) -> *mut c_void {
        self.0
    }
}

/// Opaque wrapper around the engine for FFI
pub struct BowlEngine {
    engine: ToneEngine,
    waveform_observer: Mutex<Option<ObserverId>>,
}

// =============================================================================
// Channel parameter indices (must match the host's ChannelParam enum)
// =============================================================================

/// Channel parameter: frequency (20-20000 Hz)
pub const CHANNEL_PARAM_FREQUENCY: u32 = 0;
/// Channel parameter: volume (0-1)
pub const CHANNEL_PARAM_VOLUME: u32 = 1;
/// Channel parameter: enabled (0 = off, anything above 0.5 = on)
pub const CHANNEL_PARAM_ENABLED: u32 = 2;
/// Channel parameter: LFO rate (0-20 Hz, 0 disables)
pub const CHANNEL_PARAM_LFO_RATE: u32 = 3;
/// Channel parameter: LFO depth (0-1)
pub const CHANNEL_PARAM_LFO_DEPTH: u32 = 4;

// =============================================================================
// Background parameter indices (must match the host's BgmParam enum)
// =============================================================================

/// Background parameter: volume (0-1)
pub const BGM_PARAM_VOLUME: u32 = 0;
/// Background parameter: fade-in time (0-10 seconds)
pub const BGM_PARAM_FADE_IN: u32 = 1;
/// Background parameter: fade-out time (0-10 seconds)
pub const BGM_PARAM_FADE_OUT: u32 = 2;
/// Background parameter: looping (0 = off, anything above 0.5 = on)
pub const BGM_PARAM_LOOPING: u32 = 3;

fn flag(value: f32) -> bool {
    value > 0.5
}

fn from_flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

// =============================================================================
// Engine lifecycle
// =============================================================================

/// Create a new engine on the default output device
///
/// # Arguments
/// * `sample_rate` - Output sample rate, or 0 for 44100
/// * `buffer_size` - Samples per buffer, or 0 for 2048
///
/// # Returns
/// Pointer to a new BowlEngine, or null if the engine could not be created.
/// Must be freed with `bowl_engine_free`.
#[no_mangle]
pub extern "C" fn bowl_engine_new(sample_rate: u32, buffer_size: u32) -> *mut BowlEngine {
    let mut config = EngineConfig::default();
    if sample_rate > 0 {
        config = config.with_sample_rate(sample_rate);
    }
    if buffer_size > 0 {
        config = config.with_buffer_size(buffer_size as usize);
    }

    match ToneEngine::native(config) {
        Ok(engine) => Box::into_raw(Box::new(BowlEngine {
            engine,
            waveform_observer: Mutex::new(None),
        })),
        Err(err) => {
            log::error!("Failed to create engine: {}", err);
            std::ptr::null_mut()
        }
    }
}

/// Free an engine, releasing both audio pipelines
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`, or null.
/// After calling this function, the pointer is invalid and must not be used.
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_free(engine: *mut BowlEngine) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Stop playback and release both audio pipelines without freeing the engine
///
/// Idempotent. A released engine can no longer start.
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_release(engine: *mut BowlEngine) {
    if let Some(engine) = engine.as_ref() {
        engine.engine.release();
    }
}

/// Start tone playback
///
/// # Returns
/// true if playback is running (including if it already was)
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_start(engine: *mut BowlEngine) -> bool {
    let Some(engine) = engine.as_ref() else {
        return false;
    };
    match engine.engine.start() {
        Ok(()) => true,
        Err(err) => {
            log::error!("Start failed: {}", err);
            false
        }
    }
}

/// Stop tone playback
///
/// # Returns
/// false if the playback thread had to be abandoned after the stop timeout
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_stop(engine: *mut BowlEngine) -> bool {
    let Some(engine) = engine.as_ref() else {
        return false;
    };
    match engine.engine.stop() {
        Ok(()) => true,
        Err(err) => {
            log::warn!("Stop: {}", err);
            false
        }
    }
}

/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_is_playing(engine: *mut BowlEngine) -> bool {
    engine
        .as_ref()
        .map(|engine| engine.engine.is_playing())
        .unwrap_or(false)
}

// =============================================================================
// Channel control
// =============================================================================

/// Set a channel parameter
///
/// # Arguments
/// * `engine` - Pointer to a BowlEngine
/// * `channel` - Channel index (0-3)
/// * `param` - Parameter index (see CHANNEL_PARAM_* constants)
/// * `value` - Parameter value, clamped to the parameter's range
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_set_channel_param(
    engine: *mut BowlEngine,
    channel: u32,
    param: u32,
    value: f32,
) {
    let Some(engine) = engine.as_ref() else {
        return;
    };
    let channel = match engine.engine.channel(channel as usize) {
        Ok(channel) => channel,
        Err(err) => {
            log::warn!("Ignoring channel parameter: {}", err);
            return;
        }
    };

    match param {
        CHANNEL_PARAM_FREQUENCY => channel.set_frequency(value),
        CHANNEL_PARAM_VOLUME => channel.set_volume(value),
        CHANNEL_PARAM_ENABLED => channel.set_enabled(flag(value)),
        CHANNEL_PARAM_LFO_RATE => channel.set_lfo_rate(value),
        CHANNEL_PARAM_LFO_DEPTH => channel.set_lfo_depth(value),
        _ => {} // Unknown parameter, ignore
    }
}

/// Get a channel parameter
///
/// # Returns
/// The current value, or 0 for an unknown channel or parameter
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_get_channel_param(
    engine: *mut BowlEngine,
    channel: u32,
    param: u32,
) -> f32 {
    let Some(engine) = engine.as_ref() else {
        return 0.0;
    };
    let Ok(channel) = engine.engine.channel(channel as usize) else {
        return 0.0;
    };

    match param {
        CHANNEL_PARAM_FREQUENCY => channel.frequency(),
        CHANNEL_PARAM_VOLUME => channel.volume(),
        CHANNEL_PARAM_ENABLED => from_flag(channel.is_enabled()),
        CHANNEL_PARAM_LFO_RATE => channel.lfo_rate(),
        CHANNEL_PARAM_LFO_DEPTH => channel.lfo_depth(),
        _ => 0.0,
    }
}

/// Set the master volume (0-1)
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_set_master_volume(engine: *mut BowlEngine, volume: f32) {
    if let Some(engine) = engine.as_ref() {
        engine.engine.set_master_volume(volume);
    }
}

/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_get_master_volume(engine: *mut BowlEngine) -> f32 {
    engine
        .as_ref()
        .map(|engine| engine.engine.master_volume())
        .unwrap_or(0.0)
}

// =============================================================================
// Background track
// =============================================================================

/// Load a background track from a file path
///
/// # Returns
/// true on success. On failure the background track is left unloaded.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bowl_engine_new`
/// - `path` must be a valid NUL-terminated UTF-8 string
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_bgm_load_path(
    engine: *mut BowlEngine,
    path: *const c_char,
) -> bool {
    let Some(engine) = engine.as_ref() else {
        return false;
    };
    if path.is_null() {
        return false;
    }
    let Ok(path) = CStr::from_ptr(path).to_str() else {
        log::warn!("Background path is not valid UTF-8");
        return false;
    };

    match engine.engine.load_bgm(&TrackSource::path(path)) {
        Ok(()) => true,
        Err(err) => {
            log::error!("{:#}", anyhow::Error::new(err));
            false
        }
    }
}

/// Load a background track from encoded bytes held by the host
///
/// The bytes are copied; the host may free them after the call.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bowl_engine_new`
/// - `data` must point to at least `len` readable bytes
/// - `name` must be a valid NUL-terminated string, or null
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_bgm_load_memory(
    engine: *mut BowlEngine,
    name: *const c_char,
    data: *const u8,
    len: usize,
) -> bool {
    let Some(engine) = engine.as_ref() else {
        return false;
    };
    if data.is_null() {
        return false;
    }
    let name = if name.is_null() {
        "memory".to_string()
    } else {
        CStr::from_ptr(name).to_string_lossy().into_owned()
    };
    let bytes: Arc<[u8]> = slice::from_raw_parts(data, len).into();

    match engine.engine.load_bgm(&TrackSource::memory(name, bytes)) {
        Ok(()) => true,
        Err(err) => {
            log::error!("{:#}", anyhow::Error::new(err));
            false
        }
    }
}

/// Play or resume the background track, fading in if configured
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_bgm_play(engine: *mut BowlEngine) {
    if let Some(engine) = engine.as_ref() {
        engine.engine.play_bgm();
    }
}

/// Pause the background track, fading out if configured
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_bgm_pause(engine: *mut BowlEngine) {
    if let Some(engine) = engine.as_ref() {
        engine.engine.pause_bgm();
    }
}

/// Stop the background track and rewind it to the start
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_bgm_stop(engine: *mut BowlEngine) {
    if let Some(engine) = engine.as_ref() {
        if let Err(err) = engine.engine.stop_bgm() {
            log::error!("{:#}", anyhow::Error::new(err));
        }
    }
}

/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_bgm_is_playing(engine: *mut BowlEngine) -> bool {
    engine
        .as_ref()
        .map(|engine| engine.engine.is_bgm_playing())
        .unwrap_or(false)
}

/// Set a background parameter
///
/// # Arguments
/// * `engine` - Pointer to a BowlEngine
/// * `param` - Parameter index (see BGM_PARAM_* constants)
/// * `value` - Parameter value, clamped to the parameter's range
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_set_bgm_param(engine: *mut BowlEngine, param: u32, value: f32) {
    let Some(engine) = engine.as_ref() else {
        return;
    };
    let engine = &engine.engine;

    match param {
        BGM_PARAM_VOLUME => engine.set_bgm_volume(value),
        BGM_PARAM_FADE_IN => engine.set_bgm_fade_in(value),
        BGM_PARAM_FADE_OUT => engine.set_bgm_fade_out(value),
        BGM_PARAM_LOOPING => engine.set_bgm_looping(flag(value)),
        _ => {} // Unknown parameter, ignore
    }
}

/// Get a background parameter, or 0 for an unknown parameter
///
/// # Safety
/// `engine` must be a valid pointer returned by `bowl_engine_new`
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_get_bgm_param(engine: *mut BowlEngine, param: u32) -> f32 {
    let Some(engine) = engine.as_ref() else {
        return 0.0;
    };
    let engine = &engine.engine;

    match param {
        BGM_PARAM_VOLUME => engine.bgm_volume(),
        BGM_PARAM_FADE_IN => engine.bgm_fade_in(),
        BGM_PARAM_FADE_OUT => engine.bgm_fade_out(),
        BGM_PARAM_LOOPING => from_flag(engine.is_bgm_looping()),
        _ => 0.0,
    }
}

// =============================================================================
// Waveforms
// =============================================================================

/// Set (or clear, with a null callback) the waveform callback
///
/// Replaces any previously set callback. The callback runs on a background
/// thread once per rendered buffer while playback is running.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `bowl_engine_new`
/// - `user_data` must stay valid, and be usable from another thread, until
///   the callback is cleared or the engine is freed
#[no_mangle]
pub unsafe extern "C" fn bowl_engine_set_waveform_callback(
    engine: *mut BowlEngine,
    callback: Option<BowlWaveformCallback>,
    user_data: *mut c_void,
) {
    let Some(engine) = engine.as_ref() else {
        return;
    };
    let mut current = engine
        .waveform_observer
        .lock()
        .unwrap_or_else(|e| e.into_inner());

    if let Some(id) = current.take() {
        engine.engine.remove_waveform_observer(id);
    }

    if let Some(callback) = callback {
        let user_data = UserData(user_data);
        let id = engine.engine.add_waveform_observer(move |snapshot| {
            let samples = snapshot.to_contiguous();
            callback(
                user_data.get(),
                samples.as_ptr(),
                snapshot.channel_count() as u32,
                snapshot.frames() as u32,
            );
        });
        *current = Some(id);
    }
}

/// Get the number of oscillator channels
#[no_mangle]
pub extern "C" fn bowl_engine_channel_count() -> u32 {
    CHANNEL_COUNT as u32
}

/// Get the number of channel parameters
#[no_mangle]
pub extern "C" fn bowl_engine_channel_param_count() -> u32 {
    5
}
