//! Core types: math re-exports, model bounds, camera framing.

pub use glam::{Mat4, Vec2, Vec3, vec2, vec3};

pub mod bounds;
pub mod camera;
