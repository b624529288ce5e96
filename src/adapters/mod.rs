pub mod admin;
pub mod api_errors;
pub mod callback;
pub mod swedbank_client;
