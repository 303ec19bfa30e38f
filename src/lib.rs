use godot::prelude::*;

pub mod blend_map;
pub mod brush;
pub mod collision;
pub mod config;
pub mod debug_log;
pub mod decal;
pub mod editor;
mod editor_plugin;
pub mod erosion;
pub mod error;
pub mod godot_backend;
pub mod height_field;
mod layer_list;
pub mod layers;
pub mod mesh_builder;
pub mod noise_field;
pub mod physics;
pub mod serialization;
mod shader_sync;
pub mod software_physics;
mod terrain;
pub mod terrain_state;

struct RacingTerrainExtension;

#[gdextension]
unsafe impl ExtensionLibrary for RacingTerrainExtension {}
