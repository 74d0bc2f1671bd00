pub mod catalog;
pub mod chat;
pub mod chat_completion;
pub mod encoder;
pub mod extractor;
pub mod preference_store;
pub mod recommendations;
pub mod vector_index;
