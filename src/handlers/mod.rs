pub mod append_entries;
pub mod request_vote;

pub use append_entries::handle_append_entries;
pub use request_vote::handle_request_vote;
