pub mod jobset_service;
pub mod live_service;
pub mod metrics_service;
pub mod queue_service;
