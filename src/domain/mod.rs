pub mod error;
pub mod id;
pub mod ledger;
pub mod money;
pub mod order;
pub mod problem;
pub mod projection;
pub mod provider;
pub mod store;
pub mod transaction;
