pub mod manager;

pub use manager::{
    ProviderHealthManager, ProviderKind, ProviderMetricsSnapshot, RetryHandler,
};
