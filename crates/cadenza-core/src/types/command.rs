//! Transport-agnostic command surface.
//!
//! Commands are tagged by `method`, e.g.
//! `{"method":"start","path":"/music/a.mp3","positionMs":0}`. The method
//! names of the original host channel (`startAudio`, `seekTo`, ...) are
//! accepted as aliases.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};

/// A command for the playback controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    // Transport
    #[serde(alias = "startAudio", alias = "playNextAudio")]
    Start {
        #[serde(default, alias = "filePath")]
        path: Option<String>,
        #[serde(default, alias = "position")]
        position_ms: u64,
    },
    #[serde(alias = "pauseAudio")]
    Pause,
    #[serde(alias = "playAudio")]
    Play,
    #[serde(alias = "nextAudio")]
    Next,
    #[serde(alias = "previousAudio")]
    Previous,
    #[serde(alias = "seekTo")]
    Seek {
        #[serde(default, alias = "position")]
        position_ms: u64,
    },
    Stop,
    #[serde(alias = "setPlaybackSpeed")]
    SetSpeed {
        #[serde(alias = "speed")]
        rate: f32,
    },

    // Effect setters
    SetEqualizerBandLevel { band: i32, level: i16 },
    SetEqualizerEnabled { enabled: bool },
    SetEqualizerPreset { preset: i32 },
    SetReverbPreset { preset: i32 },
    SetBassBoostStrength { strength: i32 },
    SetVirtualizerStrength { strength: i32 },

    // Queries
    GetEqualizerBands,
    GetEqualizerBandLevelRange,
    GetEqualizerBandLevel { band: i32 },
    GetEqualizerEnabled,
    GetEqualizerPreset,
    GetReverbPreset,
    GetBassBoostStrength,
    GetVirtualizerStrength,
    GetBandLevelsForPreset { preset: i32 },
    GetPlaybackSpeed,
}

impl Command {
    /// Method name, for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Pause => "pause",
            Self::Play => "play",
            Self::Next => "next",
            Self::Previous => "previous",
            Self::Seek { .. } => "seek",
            Self::Stop => "stop",
            Self::SetSpeed { .. } => "setSpeed",
            Self::SetEqualizerBandLevel { .. } => "setEqualizerBandLevel",
            Self::SetEqualizerEnabled { .. } => "setEqualizerEnabled",
            Self::SetEqualizerPreset { .. } => "setEqualizerPreset",
            Self::SetReverbPreset { .. } => "setReverbPreset",
            Self::SetBassBoostStrength { .. } => "setBassBoostStrength",
            Self::SetVirtualizerStrength { .. } => "setVirtualizerStrength",
            Self::GetEqualizerBands => "getEqualizerBands",
            Self::GetEqualizerBandLevelRange => "getEqualizerBandLevelRange",
            Self::GetEqualizerBandLevel { .. } => "getEqualizerBandLevel",
            Self::GetEqualizerEnabled => "getEqualizerEnabled",
            Self::GetEqualizerPreset => "getEqualizerPreset",
            Self::GetReverbPreset => "getReverbPreset",
            Self::GetBassBoostStrength => "getBassBoostStrength",
            Self::GetVirtualizerStrength => "getVirtualizerStrength",
            Self::GetBandLevelsForPreset { .. } => "getBandLevelsForPreset",
            Self::GetPlaybackSpeed => "getPlaybackSpeed",
        }
    }

    /// Whether the command only reads state.
    pub const fn is_query(&self) -> bool {
        matches!(
            self,
            Self::GetEqualizerBands
                | Self::GetEqualizerBandLevelRange
                | Self::GetEqualizerBandLevel { .. }
                | Self::GetEqualizerEnabled
                | Self::GetEqualizerPreset
                | Self::GetReverbPreset
                | Self::GetBassBoostStrength
                | Self::GetVirtualizerStrength
                | Self::GetBandLevelsForPreset { .. }
                | Self::GetPlaybackSpeed
        )
    }
}

/// Result of a command. Serialises untagged, so a host sees plain JSON
/// values (`null`, `5`, `true`, `1.5`, `[-1500,1500]`, `[300,0,0,0,300]`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    None,
    Int(i64),
    Bool(bool),
    Float(f64),
    Range(i16, i16),
    Levels(Vec<i32>),
}

impl Reply {
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_range(&self) -> Option<(i16, i16)> {
        match self {
            Self::Range(lo, hi) => Some((*lo, *hi)),
            _ => None,
        }
    }

    pub fn into_levels(self) -> Option<Vec<i32>> {
        match self {
            Self::Levels(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_names() {
        let cmd: Command =
            serde_json::from_str(r#"{"method":"start","path":"a.mp3","positionMs":1200}"#)
                .unwrap();
        assert_eq!(
            cmd,
            Command::Start {
                path: Some("a.mp3".into()),
                position_ms: 1200
            }
        );

        let cmd: Command =
            serde_json::from_str(r#"{"method":"setEqualizerBandLevel","band":1,"level":-300}"#)
                .unwrap();
        assert_eq!(cmd, Command::SetEqualizerBandLevel { band: 1, level: -300 });
    }

    #[test]
    fn test_parse_host_aliases() {
        let cmd: Command =
            serde_json::from_str(r#"{"method":"startAudio","filePath":"b.mp3","position":0}"#)
                .unwrap();
        assert_eq!(
            cmd,
            Command::Start {
                path: Some("b.mp3".into()),
                position_ms: 0
            }
        );

        let cmd: Command =
            serde_json::from_str(r#"{"method":"seekTo","position":5000}"#).unwrap();
        assert_eq!(cmd, Command::Seek { position_ms: 5000 });

        let cmd: Command =
            serde_json::from_str(r#"{"method":"setPlaybackSpeed","speed":1.5}"#).unwrap();
        assert_eq!(cmd, Command::SetSpeed { rate: 1.5 });

        let cmd: Command = serde_json::from_str(r#"{"method":"pauseAudio"}"#).unwrap();
        assert_eq!(cmd, Command::Pause);
    }

    #[test]
    fn test_start_without_path() {
        let cmd: Command = serde_json::from_str(r#"{"method":"start"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Start {
                path: None,
                position_ms: 0
            }
        );
    }

    #[test]
    fn test_unknown_method_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"method":"setAsRingtone"}"#).is_err());
    }

    #[test]
    fn test_query_classification() {
        assert!(Command::GetPlaybackSpeed.is_query());
        assert!(Command::GetBandLevelsForPreset { preset: 1 }.is_query());
        assert!(!Command::Stop.is_query());
        assert_eq!(Command::GetEqualizerBands.name(), "getEqualizerBands");
    }

    #[test]
    fn test_reply_wire_values() {
        assert_eq!(serde_json::to_string(&Reply::None).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Reply::Int(5)).unwrap(), "5");
        assert_eq!(
            serde_json::to_string(&Reply::Range(-1500, 1500)).unwrap(),
            "[-1500,1500]"
        );
        assert_eq!(
            serde_json::to_string(&Reply::Levels(vec![300, 0, -200])).unwrap(),
            "[300,0,-200]"
        );
    }

    #[test]
    fn test_reply_accessors() {
        assert_eq!(Reply::Int(5).as_int(), Some(5));
        assert_eq!(Reply::Bool(true).as_int(), None);
        assert_eq!(Reply::Range(-1, 1).as_range(), Some((-1, 1)));
        assert_eq!(Reply::None.into_levels(), None);
    }
}
