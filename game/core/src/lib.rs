#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

//! Gameplay crate: components and entity factories, the input-delay
//! buffer, the data-driven level loader and wave driver, the per-tick
//! systems, and the session/game loop that ties them to the network.

pub mod admin;
pub mod components;
pub mod config;
pub mod factory;
pub mod game;
pub mod input;
pub mod level;
pub mod session;
pub mod systems;
pub mod waves;
