//! 演示程序
//!
//! 用法：`sound_hal [WAD] [SONG]`
//!
//! 打开 WAD（可选），初始化音效与音乐子系统，播放几个音效和一首歌几秒钟后退出。
//! 歌曲优先取命令行给出的文件，其次取 WAD 中的 `D_E1M1`。

use sound_hal::audio::{
    HeadlessGraph, MixerSoundModule, MusicModule, MusicSystem, PositionalSoundModule,
    SequencerMusicModule, SfxTable, SilentMusicModule, SoundModule, SoundSystem, StreamMusicModule,
    NORM_PITCH, NORM_SEP,
};
use sound_hal::config::SoundHalConfig;
use sound_hal::core::{initialize_logging, MusicError, SoundHalError, SoundHalResult};
use sound_hal::resources::{LumpSource, NoLumps, WadFile};
use std::time::{Duration, Instant};

/// 演示用的音效 (名字, 优先级)
const DEMO_SOUNDS: &[(&str, i32)] = &[
    ("pistol", 64),
    ("shotgn", 64),
    ("itemup", 78),
    ("oof", 96),
    ("secret", 60),
    ("itmbk", 100),
    ("getpow", 60),
];

/// 每秒游戏 tick 数
const TICRATE: u32 = 35;

const PLAY_TIME: Duration = Duration::from_secs(5);

fn main() {
    if let Err(e) = run() {
        eprintln!("sound_hal failed: {}", e);
        if matches!(e, SoundHalError::Music(MusicError::NoBackendAvailable)) {
            eprintln!("No music module could be started; check your audio setup or set no_music");
        }
        std::process::exit(1);
    }
}

fn run() -> SoundHalResult<()> {
    let mut config = SoundHalConfig::load_or_default();
    config.apply_env_overrides();
    config.validate()?;
    initialize_logging(&config.logging);

    let mut args = std::env::args().skip(1);
    let wad = args.next().map(WadFile::open).transpose()?;
    let song_path = args.next();

    let song = match (&song_path, &wad) {
        (Some(path), _) => Some(std::fs::read(path)?),
        (None, Some(wad)) => wad
            .check_num_for_name("D_E1M1")
            .and_then(|lump| wad.lump_data(lump))
            .map(<[u8]>::to_vec),
        (None, None) => None,
    };

    let lumps: Box<dyn LumpSource> = match wad {
        Some(wad) => Box::new(wad),
        None => Box::new(NoLumps),
    };

    let sound_modules: Vec<Box<dyn SoundModule>> = vec![
        Box::new(MixerSoundModule::new()),
        Box::new(PositionalSoundModule::default()),
    ];
    let music_modules: Vec<Box<dyn MusicModule>> = vec![
        Box::new(SequencerMusicModule::new(HeadlessGraph::new())),
        Box::new(SilentMusicModule::new()),
    ];

    let mut sound = SoundSystem::new(&config, sound_modules, lumps);
    let mut music = MusicSystem::new(&config, Box::new(StreamMusicModule::new()), music_modules);

    let mut sfx = SfxTable::with_sounds(DEMO_SOUNDS);
    if let Err(e) = sound.init_sound(&mut sfx) {
        tracing::warn!(target: "sound_hal", "Sound effects unavailable: {}", e);
    }
    music.init_music()?;

    let (devices, current) = music.device_list();
    for (index, name) in devices.iter().enumerate() {
        let marker = if index == current { "*" } else { " " };
        tracing::info!(target: "sound_hal", "{} {}: {}", marker, index, name);
    }

    if sound.is_initialized() {
        let volume = sound.sfx_volume() * 8;
        for id in sfx.playable_ids() {
            let id = sfx.resolve(id);
            let Some(info) = sfx.get_mut(id) else {
                continue;
            };
            match sound.start_sound(info, volume, NORM_SEP, NORM_PITCH) {
                Ok(channel) => tracing::info!(target: "sound_hal", "Playing {} on {}", info.name, channel),
                Err(e) => tracing::debug!(target: "sound_hal", "Skipping {}: {}", info.name, e),
            }
        }
    }

    let handle = match song {
        Some(data) => match music.register_song(&data) {
            Ok(handle) => {
                music.play_song(handle, true);
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(target: "sound_hal", "Could not play song: {}", e);
                None
            }
        },
        None => None,
    };

    let tic = Duration::from_secs(1) / TICRATE;
    let start = Instant::now();
    while start.elapsed() < PLAY_TIME {
        music.update_music();
        std::thread::sleep(tic);
    }

    if let Some(handle) = handle {
        music.stop_song(handle);
        music.unregister_song(handle);
    }
    music.shutdown_music();
    sound.shutdown_sound();
    Ok(())
}
