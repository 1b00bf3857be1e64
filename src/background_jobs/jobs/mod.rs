mod integrity_watchdog;
mod playback_pruning;

pub use integrity_watchdog::IntegrityWatchdogJob;
pub use playback_pruning::PlaybackPruningJob;
