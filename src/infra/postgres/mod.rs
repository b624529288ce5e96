pub mod job_repo;
pub mod order_repo;
pub mod transaction_repo;
