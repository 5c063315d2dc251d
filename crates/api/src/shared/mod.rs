pub mod guard;
pub mod request_context;
pub mod usecase;
