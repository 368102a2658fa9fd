pub mod app;
pub mod backup;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod preflight;
pub mod process;
pub mod provider;
pub mod status;
pub mod update;

#[cfg(test)]
mod testing;

pub use app::{Collaborators, ControllerTimings, LifecycleController};
pub use backup::{BackupService, ZipBackupService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::KeeperConfig;
pub use engine::StatusDecisionEngine;
pub use error::{KeeperError, Result};
pub use preflight::{PortPreflight, PreflightService};
pub use process::{ChildProcessManager, ProcessManager, RuntimeSnapshot};
pub use provider::{ModeOverrideProvider, ShutdownSequence};
pub use status::{LifecycleStatus, ShutdownMode, StopCause};
pub use update::{
    ManifestUpdateOracle, PatchApplier, ReleaseManifest, UpdateCheck, UpdateOracle,
    ZipPatchApplier,
};
