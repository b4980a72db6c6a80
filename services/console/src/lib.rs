pub mod app;
pub mod audio_sink;
pub mod command;
pub mod config;
pub mod dictation;
pub mod terminal;
