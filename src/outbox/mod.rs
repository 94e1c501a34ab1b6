pub mod relay;
pub mod store;

pub use relay::OutboxRelay;
pub use store::{OutboxEventRow, OutboxStatus, OutboxStore};
