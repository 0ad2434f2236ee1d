//! Session surface rendered to the log.

use cadenza_audio::SessionSurface;
use cadenza_core::SurfaceSnapshot;
use tracing::{debug, info};

/// Logs every surface update. Stands in for a lock-screen or notification
/// renderer when running from a terminal.
#[derive(Debug, Default)]
pub struct ConsoleSurface {
    shown: bool,
}

impl SessionSurface for ConsoleSurface {
    fn publish(&mut self, snapshot: &SurfaceSnapshot) {
        self.shown = true;
        let actions: Vec<&str> = snapshot.actions.iter().map(|a| a.as_str()).collect();
        info!(
            "[{}] {} - {} ({} / {}) [{}]",
            snapshot.state,
            snapshot.title,
            snapshot.subtitle,
            format_ms(snapshot.position_ms),
            format_ms(snapshot.duration_ms),
            actions.join(" | ")
        );
    }

    fn update_position(&mut self, position_ms: u64, duration_ms: u64) {
        debug!(
            "Position {} / {}",
            format_ms(position_ms),
            format_ms(duration_ms)
        );
    }

    fn dismiss(&mut self) {
        if std::mem::take(&mut self.shown) {
            info!("Session surface dismissed");
        }
    }
}

/// `m:ss`.
fn format_ms(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::PlaybackState;

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(0), "0:00");
        assert_eq!(format_ms(61_999), "1:01");
        assert_eq!(format_ms(3_600_000), "60:00");
    }

    #[test]
    fn test_dismiss_tracks_visibility() {
        let mut surface = ConsoleSurface::default();
        surface.publish(&SurfaceSnapshot::new("Song", PlaybackState::Playing, 0, 1000));
        assert!(surface.shown);
        surface.dismiss();
        assert!(!surface.shown);
    }
}
