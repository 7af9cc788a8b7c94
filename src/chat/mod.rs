//! Boundary to the chat platform

pub mod console;
pub mod gateway;

pub use console::ConsoleChatGateway;
pub use gateway::{ChatGateway, GrantChanges, MockChatGateway, VoiceRoomRequest};
