//! Virtual phone number pooling.
//!
//! The pool buys numbers ahead of demand (preheating), hands them out with
//! preheated-first precedence and recycles them through a cooldown until
//! each number's reuse budget runs out. [`NumberPoolManager`] carries the
//! caller-facing operations and the maintenance sweeps; [`PoolScheduler`]
//! drives the sweeps on independent intervals; [`NumberPoolStore`] abstracts
//! the shared persistence multiple process instances race against.

pub(crate) mod manager;
pub(crate) mod number;
pub(crate) mod scheduler;
pub(crate) mod store;

pub use manager::{NumberPoolManager, PoolConfig, PoolConfigBuilder, PoolError, PoolStatistics};
pub use number::{NumberStatus, PooledNumber};
pub use scheduler::{PoolScheduler, SchedulerConfig, SchedulerConfigBuilder, SchedulerHandle};
pub use store::{
    ClaimOrder, InMemoryNumberPoolStore, NumberPoolStore, PoolFilter, PoolStoreError, PoolUpdate,
};
