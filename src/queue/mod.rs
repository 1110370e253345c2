pub mod pending;

pub use pending::PendingQueue;
