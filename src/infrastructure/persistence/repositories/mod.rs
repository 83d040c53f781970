mod alert_repository;
mod signal_repository;
mod snapshot_repository;
mod universe_repository;

pub use alert_repository::PgAlertRepository;
pub use signal_repository::PgSignalRepository;
pub use snapshot_repository::PgSnapshotRepository;
pub use universe_repository::PgUniverseRepository;
