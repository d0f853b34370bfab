//! Asset loading/parsers: Wavefront OBJ/MTL, mesh assembly, textures.
//! Parsing and assembly are pure functions over text; file access goes
//! through [`loader::ResourceLoader`].

pub mod error;
pub mod loader;
pub mod mesh;
pub mod mtl;
pub mod obj;
pub mod texture;

pub use error::{Diagnostic, ParseError};
pub use loader::{CancelToken, Cancelled, FsLoader, ModelLoader, ResourceLoader};
pub use mesh::{AssembleOptions, Attribute, EffectiveMaterial, MeshGeometry, Model, assemble};
pub use mtl::{Material, MaterialLibrary, parse_mtl};
pub use obj::{Geometry, ObjDocument, parse_obj};
