//! # View Layer
//!
//! A thin controller on top of the gateway:
//!
//! - [`route::Route`] maps a location to one of four screens.
//! - [`render::Renderer`] turns a [`render::View`] model into markup. The
//!   default [`render::TemplateRenderer`] uses embedded minijinja templates.
//! - [`controller::ViewController`] tears the previous screen's subscriptions
//!   down, renders the new screen, then subscribes to whatever the screen
//!   follows, re-rendering as data arrives.

pub mod controller;
pub mod render;
pub mod route;

pub use controller::{AppContext, Screen, ViewController};
pub use render::{Renderer, TemplateRenderer, View};
pub use route::Route;
