pub mod config;
pub mod images;
pub mod metrics;
pub mod queue;
pub mod service;
pub mod storage;
pub mod testing;
pub mod transform;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ConsumerConfig,
    DatabaseConfig, QueueConfig, ReconcilerConfig, RetryConfig, ServerConfig, StorageConfig,
    TransformConfig,
};
pub use images::{
    Action, ActionError, Dimensions, ImageFilter, ImageRecord, ImageStatus, ImageStore,
    ImageStoreError, NewImage, SqliteImageStore, WatermarkParams,
};
pub use queue::{
    ImageQueue, JobConsumer, JobHandler, JobProducer, Message, QueueError, RetryPolicy,
    SqliteQueue,
};
pub use service::{ImageJobHandler, ImageService, Reconciler, SavedImage, ServiceError};
pub use storage::{ArtifactStore, FsArtifactStore, StorageError};
pub use transform::{ImageEngine, TransformError, Transformer};
