pub mod data;
pub mod lock;
pub mod reconcile;
pub mod spread;
pub mod standings;
