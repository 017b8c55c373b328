pub mod capacity;
pub mod error;
pub mod persistence;
pub mod queue;
pub mod waiter;
