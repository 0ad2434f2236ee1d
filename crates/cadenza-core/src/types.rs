//! Core domain types for Cadenza.

pub mod command;
pub mod effects;
pub mod event;
pub mod session;
pub mod state;
pub mod surface;

pub use command::{Command, Reply};
pub use effects::{EffectSettings, STRENGTH_RANGE};
pub use event::{ActionEvent, EventState, PlaybackEvent};
pub use session::{AudioSessionId, PlaybackSession};
pub use state::{PlaybackState, Transition, Transport};
pub use surface::{SurfaceAction, SurfaceSnapshot};
