//! objinspect: load a Wavefront OBJ model and log what a renderer would receive.
//! Usage: objinspect <model.obj> [--padding=F] [--indexed[=on|off]] [--textures]

use anyhow::{Context, Result, bail};
use asset::{AssembleOptions, Attribute, FsLoader, ModelLoader, texture::TextureCache};
use corelib::camera::Camera;

fn parse_flag(name: &str) -> bool {
    // --name[=on|off], default off
    for arg in std::env::args().skip(1) {
        if arg == format!("--{name}") {
            return true;
        }
        if let Some(val) = arg.strip_prefix(&format!("--{name}=")) {
            return matches!(
                val.to_ascii_lowercase().as_str(),
                "1" | "true" | "on" | "yes"
            );
        }
    }
    false
}

fn parse_padding_arg() -> f32 {
    for arg in std::env::args() {
        if let Some(v) = arg.strip_prefix("--padding=") {
            match v.parse::<f32>() {
                Ok(p) if p.is_finite() && p > 0.0 => return p,
                _ => log::warn!("Invalid padding '{}', falling back to default.", v),
            }
        }
    }
    AssembleOptions::default().padding
}

fn parse_model_arg() -> Option<String> {
    std::env::args().skip(1).find(|a| !a.starts_with("--"))
}

fn describe(attr: &Attribute) -> String {
    match attr {
        Attribute::Dense { components, values } => {
            format!("{} x {}", values.len() / (*components).max(1), components)
        }
        Attribute::Constant(v) => format!("constant {:?}", v),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(path) = parse_model_arg() else {
        bail!("usage: objinspect <model.obj> [--padding=F] [--indexed] [--textures]");
    };
    let options = AssembleOptions {
        padding: parse_padding_arg(),
        indexed: parse_flag("indexed"),
    };
    let load_textures = parse_flag("textures");
    log::info!(
        "Loading {} (padding={}, indexed={}, textures={})",
        path,
        options.padding,
        options.indexed,
        load_textures
    );

    let loader = ModelLoader::new(FsLoader).with_options(options);
    let model = loader
        .load(&path)
        .with_context(|| format!("Failed to load model {path}"))?;

    for (i, g) in model.geometries.iter().enumerate() {
        log::info!(
            "#{} object='{}' groups={:?} material='{}': {} vertices, {} triangles",
            i,
            g.object,
            g.groups,
            g.material_name,
            g.vertex_count(),
            g.triangle_count()
        );
        log::info!(
            "   texcoord={} normal={} color={} tangents={}",
            describe(&g.texcoord),
            describe(&g.normal),
            describe(&g.color),
            g.tangent.is_some()
        );
    }

    match model.extents {
        Some(e) => log::info!("Extents: min={:?} max={:?}", e.min, e.max),
        None => log::warn!("Model has no positions"),
    }
    let camera = Camera::framing(&model.framing, 60f32.to_radians(), 16.0 / 9.0);
    log::info!(
        "Framing: offset={:?} radius={:.3} near={:.4} far={:.3} eye={:?}",
        model.framing.center_offset,
        model.framing.bounding_radius,
        camera.z_near,
        camera.z_far,
        camera.eye
    );
    if let Some(e) = model.extents {
        let world = model.framing.world(0.0);
        let seen = e.corners().iter().filter(|&&c| camera.sees(world, c)).count();
        if seen < 8 {
            log::warn!("Only {}/8 bounding-box corners are in view", seen);
        } else {
            log::debug!("Bounding box fully in view");
        }
    }

    if load_textures {
        let mut cache = TextureCache::new();
        loader.load_textures(&path, &model, &mut cache)?;
        log::info!("Textures loaded: {} distinct files", cache.len());
    } else {
        log::info!("Texture files referenced: {:?}", model.texture_files());
    }

    log::info!("Done.");
    Ok(())
}
