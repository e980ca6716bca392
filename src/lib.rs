//! # Sound HAL
//!
//! Sound effect and music hardware abstraction for a classic id Tech 1 style engine.
//!
//! ## Features
//!
//! - **Channel pool**: a fixed set of sound effect channels dispatched to one swappable sound backend
//! - **Music dispatch**: backend selection by flat device index, with fallback across every registered module
//! - **Format routing**: MUS/MIDI songs go to the MIDI-capable backend, everything else to the streaming backend
//! - **Backends**: rodio mixer, positional mixer, streaming decoder, MIDI sequencer, silent fallback
//!
//! ## Architecture Design
//!
//! Backends implement the [`audio::SoundModule`] / [`audio::MusicModule`] traits and never fail fatally:
//! an initialization error only means "this backend is unavailable". The dispatchers
//! ([`audio::SoundSystem`], [`audio::MusicSystem`]) own the backends and decide how to degrade.
//!
//! ### Example
//!
//! ```ignore
//! use sound_hal::audio::{MixerSoundModule, SfxTable, SoundSystem};
//! use sound_hal::config::SoundHalConfig;
//! use sound_hal::resources::NoLumps;
//!
//! let config = SoundHalConfig::default();
//! let mut sound = SoundSystem::new(&config, vec![Box::new(MixerSoundModule::new())], Box::new(NoLumps));
//! let mut sfx = SfxTable::with_sounds(&[("pistol", 64)]);
//! sound.init_sound(&mut sfx)?;
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Errors and logging
//! - [`config`]: Configuration loading and validation
//! - [`formats`]: MUS, MIDI and DMX byte formats
//! - [`resources`]: WAD lump access
//! - [`audio`]: Channel pool, music dispatcher and backends

/// Errors and logging
pub mod core;
/// Configuration system
pub mod config;
/// Song and sound effect byte formats
pub mod formats;
/// WAD lump lookup
pub mod resources;
/// Sound effect and music subsystems
pub mod audio;
