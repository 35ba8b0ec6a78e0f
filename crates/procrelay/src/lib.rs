pub mod bundler;
pub mod error;
pub mod factory;
pub mod launcher;
pub mod lifecycle;
pub mod publish;
pub mod settings;

pub use bundler::{
    NodeSnapshotCopier, SnapshotCopier, SnapshotLoaderLocation, TestBundleConfig, on_compiled,
};
pub use error::{PublishError, SettingsError, SnapshotError};
pub use factory::PlatformTerminatorFactory;
pub use launcher::{CapturedRun, ChildGuard, ChildOutput, Launcher};
pub use lifecycle::{
    RunOutcome, ShutdownReason, ShutdownSignals, ShutdownTrigger, run_scoped, shutdown_signal,
};
pub use publish::{GitPagesPublisher, PublishOptions, Publisher, publish_and_report};
pub use settings::Settings;

// Re-export core functionality
pub use procrelay_core::*;
