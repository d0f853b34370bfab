//! Model loading: fetch OBJ and MTL text through a [`ResourceLoader`],
//! parse, assemble, then realize textures through a [`TextureCache`].

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use anyhow::{Context, Result, anyhow};
use thiserror::Error;

use crate::{
    mesh::{AssembleOptions, Model, TextureSource, assemble},
    mtl::{MaterialLibrary, parse_mtl},
    obj::parse_obj,
    texture::{TextureCache, TextureData},
};

/// Source of raw file contents. Paths are already resolved against the OBJ directory.
pub trait ResourceLoader: Sync {
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>>;

    fn read_text(&self, path: &Path) -> Result<String> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).with_context(|| format!("File is not UTF-8: {}", path.display()))
    }
}

/// Reads resources from the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsLoader;

impl ResourceLoader for FsLoader {
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("Failed to open file: {}", path.display()))
    }
}

#[derive(Debug, Error)]
#[error("model load cancelled")]
pub struct Cancelled;

/// Shared flag checked before every fetch.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Textures bound to one geometry's material slots.
#[derive(Clone, Debug)]
pub struct GeometryTextures {
    pub diffuse: Arc<TextureData>,
    pub specular: Arc<TextureData>,
    pub normal: Arc<TextureData>,
}

pub struct ModelLoader<L> {
    loader: L,
    options: AssembleOptions,
    cancel: CancelToken,
}

impl<L: ResourceLoader> ModelLoader<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            options: AssembleOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_options(mut self, options: AssembleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Load and assemble the OBJ at `obj_path` together with its material libraries.
    /// Material libraries that cannot be fetched are skipped with a warning.
    pub fn load(&self, obj_path: impl AsRef<Path>) -> Result<Model> {
        let obj_path = obj_path.as_ref();
        self.cancel.check()?;
        let text = self.loader.read_text(obj_path)?;
        let document = parse_obj(&text)
            .with_context(|| format!("Failed to parse OBJ file: {}", obj_path.display()))?;
        log::info!(
            "Parsed {}: {} geometries, {} material libraries, {} diagnostics",
            obj_path.display(),
            document.geometries.len(),
            document.material_libs.len(),
            document.diagnostics.len()
        );

        let base = base_dir(obj_path);
        let mut materials = MaterialLibrary::new();
        for (lib, text) in self.fetch_material_libs(&base, &document.material_libs)? {
            let parsed = parse_mtl(&text).with_context(|| {
                format!("Failed to parse material library: {}", base.join(&lib).display())
            })?;
            // Later libraries override same-named materials from earlier ones.
            materials.extend(parsed.materials);
        }

        self.cancel.check()?;
        let model = assemble(&document, &materials, &self.options);
        log::info!(
            "Assembled {}: {} geometries, {} materials, radius {:.3}",
            obj_path.display(),
            model.geometries.len(),
            model.materials.len(),
            model.framing.bounding_radius
        );
        Ok(model)
    }

    /// Fetch every library concurrently. Returns `(name, text)` in listed order,
    /// without the libraries that could not be fetched.
    fn fetch_material_libs(&self, base: &Path, libs: &[String]) -> Result<Vec<(String, String)>> {
        let results: Vec<Result<String>> = thread::scope(|scope| {
            let handles: Vec<_> = libs
                .iter()
                .map(|lib| {
                    let path = base.join(lib);
                    scope.spawn(move || -> Result<String> {
                        self.cancel.check()?;
                        self.loader.read_text(&path)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(anyhow!("material library fetch panicked")))
                })
                .collect()
        });

        self.cancel.check()?;
        let mut texts = Vec::with_capacity(results.len());
        for (lib, result) in libs.iter().zip(results) {
            match result {
                Ok(text) => {
                    log::debug!("Fetched material library '{}'", lib);
                    texts.push((lib.clone(), text));
                }
                Err(err) => log::warn!("Skipping material library '{}': {:#}", lib, err),
            }
        }
        Ok(texts)
    }

    /// Realize the textures of every geometry, loading each distinct file once.
    /// Files that fail to load fall back to the engine defaults.
    pub fn load_textures(
        &self,
        obj_path: impl AsRef<Path>,
        model: &Model,
        cache: &mut TextureCache,
    ) -> Result<Vec<GeometryTextures>> {
        let base = base_dir(obj_path.as_ref());
        let mut bound = Vec::with_capacity(model.geometries.len());
        for geometry in &model.geometries {
            let material = &geometry.material;
            bound.push(GeometryTextures {
                diffuse: self.bind(&base, cache, &material.diffuse_map, &TextureSource::White)?,
                specular: self.bind(&base, cache, &material.specular_map, &TextureSource::White)?,
                normal: self.bind(&base, cache, &material.normal_map, &TextureSource::FlatNormal)?,
            });
        }
        Ok(bound)
    }

    fn bind(
        &self,
        base: &Path,
        cache: &mut TextureCache,
        source: &TextureSource,
        fallback: &TextureSource,
    ) -> Result<Arc<TextureData>, Cancelled> {
        self.cancel.check()?;
        let source = match source {
            TextureSource::File(name) => {
                TextureSource::File(base.join(name).to_string_lossy().into_owned())
            }
            other => other.clone(),
        };
        Ok(cache.resolve(&source, fallback, |path| {
            self.loader.read_bytes(Path::new(path))
        }))
    }
}

fn base_dir(obj_path: &Path) -> PathBuf {
    obj_path.parent().map(Path::to_path_buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use corelib::{Vec3, vec3};
    use std::{
        collections::HashMap,
        sync::atomic::AtomicUsize,
    };

    #[derive(Default)]
    struct MemoryLoader {
        files: HashMap<PathBuf, Vec<u8>>,
        reads: AtomicUsize,
    }

    impl MemoryLoader {
        fn with(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
            self.files.insert(PathBuf::from(path), contents.into());
            self
        }
    }

    impl ResourceLoader for MemoryLoader {
        fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow!("no such file: {}", path.display()))
        }
    }

    const CUBE_CORNER: &str = "\
mtllib first.mtl
mtllib second lib.mtl
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 0
vt 0 1
vn 0 0 1
usemtl red
f 1/1/1 2/2/1 3/3/1
usemtl blue
f 3/3/1 2/2/1 1/1/1
usemtl nowhere
f 1 2 3
";

    fn loader() -> MemoryLoader {
        MemoryLoader::default()
            .with("models/corner.obj", CUBE_CORNER)
            .with("models/first.mtl", "newmtl red\nKd 1 0 0\nnewmtl blue\nKd 0 0 0.5\n")
            .with(
                "models/second lib.mtl",
                "newmtl blue\nKd 0 0 1\nmap_Kd tex/blue.png\nmap_Bump tex/missing.png\n",
            )
    }

    #[test]
    fn later_libraries_override_earlier_ones() {
        let model = ModelLoader::new(loader()).load("models/corner.obj").unwrap();
        assert_eq!(model.geometries.len(), 3);
        assert_eq!(model.geometries[0].material.diffuse, vec3(1.0, 0.0, 0.0));
        assert_eq!(model.geometries[1].material.diffuse, vec3(0.0, 0.0, 1.0));
        assert_eq!(model.geometries[2].material.diffuse, Vec3::ONE);
        assert_eq!(
            model.geometries[1].material.diffuse_map,
            TextureSource::File("tex/blue.png".to_string())
        );
    }

    #[test]
    fn missing_library_is_skipped() {
        let loader = MemoryLoader::default().with("a.obj", "mtllib gone.mtl\nv 0 0 0\nf 1 1 1\n");
        let model = ModelLoader::new(loader).load("a.obj").unwrap();
        assert_eq!(model.geometries.len(), 1);
        assert!(model.materials.is_empty());
    }

    #[test]
    fn parse_errors_name_file_and_line() {
        let loader = MemoryLoader::default().with("bad.obj", "v 0 0 0\nf 1 2 3\n");
        let err = ModelLoader::new(loader).load("bad.obj").unwrap_err();
        assert!(format!("{err:#}").contains("bad.obj"));
        let parse = err.downcast_ref::<ParseError>().unwrap();
        assert_eq!(parse.line(), 2);
    }

    #[test]
    fn material_errors_name_library_and_local_line() {
        let loader = loader().with(
            "models/second lib.mtl",
            "newmtl blue\nKd 0 0 1\nNs shiny\n",
        );
        let err = ModelLoader::new(loader).load("models/corner.obj").unwrap_err();
        assert!(format!("{err:#}").contains("second lib.mtl"));
        let parse = err.downcast_ref::<ParseError>().unwrap();
        assert_eq!(parse.line(), 3);
    }

    #[test]
    fn cancelled_load_fetches_nothing() {
        let loader = ModelLoader::new(loader());
        loader.cancel_token().cancel();
        let err = loader.load("models/corner.obj").unwrap_err();
        assert!(err.downcast_ref::<Cancelled>().is_some());
        assert_eq!(loader.loader.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn textures_are_cached_and_defaulted() {
        let mut png = std::io::Cursor::new(Vec::new());
        image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 255, 255]))
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();
        let loader = ModelLoader::new(loader().with("models/tex/blue.png", png.into_inner()));
        let model = loader.load("models/corner.obj").unwrap();
        let reads_after_model = loader.loader.reads.load(Ordering::SeqCst);

        let mut cache = TextureCache::new();
        let textures = loader.load_textures("models/corner.obj", &model, &mut cache).unwrap();
        assert_eq!(textures.len(), 3);
        assert_eq!(*textures[0].diffuse, TextureData::white());
        assert_eq!(textures[1].diffuse.data, vec![0, 0, 255, 255]);
        assert_eq!(*textures[1].normal, TextureData::flat_normal());
        assert_eq!(cache.len(), 1);

        loader.load_textures("models/corner.obj", &model, &mut cache).unwrap();
        // blue.png once, then missing.png on each pass.
        assert_eq!(loader.loader.reads.load(Ordering::SeqCst) - reads_after_model, 3);
    }
}
