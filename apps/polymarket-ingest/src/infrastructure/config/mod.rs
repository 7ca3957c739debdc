//! Configuration Module
//!
//! Configuration loading for the ingestion service.

mod settings;

pub use settings::{
    ChannelSettings, ConfigError, FeedSettings, IngestConfig, MAX_RETENTION_DAYS, ScheduleSettings,
    ServerSettings, StorageSettings,
};
