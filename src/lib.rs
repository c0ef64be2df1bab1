//! ember-bot - extensible chat-bot host with dynamically loaded plugins.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;
