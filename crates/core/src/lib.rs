pub mod backend;
pub mod capability;
pub mod config;
pub mod metrics;
pub mod naming;
pub mod postprocess;
pub mod scheduler;
pub mod selector;
pub mod settings;
pub mod testing;

pub use backend::{
    default_backends, Backend, BackendDirectory, BackendError, BackendStatus, ToolLocator,
};
pub use capability::{
    BackendKind, CapabilityEdge, CapabilityError, CapabilityRegistry, Format, FormatCategory,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LogFormat,
    SanitizedConfig,
};
pub use scheduler::{
    BatchEvent, BatchHandle, BatchOutcome, BatchReport, BatchRequest, Job, JobError,
    JobErrorKind, JobState, PoolStatus, Scheduler, SchedulerConfig, SubmitError,
};
pub use selector::{PageSelection, SelectorError};
pub use settings::{ConfigStore, Settings, SettingsChange, StoreError};
