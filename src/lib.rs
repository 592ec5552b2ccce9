//! MemeFE: a layered sticker/caption editor.
//!
//! The core is [`scene`] (what is on the canvas), [`render`] (how it is
//! painted) and [`controller`] (how pointer, wheel and key input edit it).
//! [`editor::Editor`] wires them to the async [`loader`] and the PNG export
//! in [`io`]; [`app`] is the desktop shell around it.

#![allow(clippy::too_many_arguments)]

pub mod logger;

pub mod app;
pub mod cli;
pub mod controller;
pub mod editor;
pub mod io;
pub mod loader;
pub mod render;
pub mod scene;
pub mod settings;
pub mod stickers;
pub mod text;

pub use editor::Editor;
