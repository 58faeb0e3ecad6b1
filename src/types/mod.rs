// ABOUTME: Identifier and image reference types shared by both backends.
// ABOUTME: Phantom-typed IDs keep engine containers and cluster pods apart.

mod id;
mod image_ref;

pub use id::{ContainerId, PodId};
pub use image_ref::{ImageRef, ParseImageRefError};
