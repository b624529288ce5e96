pub mod order_actions;
pub mod projector;
pub mod reconciler;
pub mod worker;
