//! Wavefront MTL parser.

use std::collections::HashMap;

use corelib::Vec3;

use crate::error::{Diagnostic, ParseError, ParseResult, content_lines, parse_f32, split_keyword};

/// Unresolved texture reference: the raw `map_*` argument text.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TextureRef {
    pub raw: String,
}

impl TextureRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// File name: the last token. Options such as `-bm 0.5` are left to the renderer.
    pub fn path(&self) -> &str {
        self.raw.split_whitespace().last().unwrap_or_default()
    }
}

/// Material as written in the file; unset fields are `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
    pub ambient: Option<Vec3>,
    pub diffuse: Option<Vec3>,
    pub specular: Option<Vec3>,
    pub emissive: Option<Vec3>,
    pub shininess: Option<f32>,
    pub opacity: Option<f32>,
    pub optical_density: Option<f32>,
    pub illum: Option<i32>,
    pub ambient_map: Option<TextureRef>,
    pub diffuse_map: Option<TextureRef>,
    pub specular_map: Option<TextureRef>,
    pub shininess_map: Option<TextureRef>,
    pub opacity_map: Option<TextureRef>,
    pub normal_map: Option<TextureRef>,
}

impl Material {
    /// All texture references set on this material.
    pub fn texture_refs(&self) -> impl Iterator<Item = &TextureRef> {
        [
            &self.ambient_map,
            &self.diffuse_map,
            &self.specular_map,
            &self.shininess_map,
            &self.opacity_map,
            &self.normal_map,
        ]
        .into_iter()
        .flatten()
    }
}

pub type MaterialLibrary = HashMap<String, Material>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MtlDocument {
    pub materials: MaterialLibrary,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ColorSlot {
    Ambient,
    Diffuse,
    Specular,
    Emissive,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ScalarSlot {
    Shininess,
    OpticalDensity,
    Opacity,
    /// Stored as `1 - Tr` opacity.
    Transparency,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MapSlot {
    Ambient,
    Diffuse,
    Specular,
    Shininess,
    Opacity,
    Normal,
}

#[derive(Debug, PartialEq)]
enum MtlLine<'a> {
    NewMaterial(&'a str),
    Color(ColorSlot, Vec3),
    Scalar(ScalarSlot, f32),
    Illum(i32),
    Map(MapSlot, &'a str),
    Unknown(&'a str),
}

/// Parse MTL text into a name → material map. A later `newmtl` with an
/// existing name replaces the earlier record.
pub fn parse_mtl(text: &str) -> ParseResult<MtlDocument> {
    let mut doc = MtlDocument::default();
    let mut current: Option<(String, Material)> = None;

    for (line_no, line) in content_lines(text) {
        let (keyword, _) = split_keyword(line);
        let parsed = tokenize(line, line_no)?;

        match parsed {
            MtlLine::NewMaterial(name) => {
                if let Some((name, material)) = current.take() {
                    doc.materials.insert(name, material);
                }
                current = Some((name.to_string(), Material::default()));
            }
            MtlLine::Unknown(keyword) => {
                let diagnostic = Diagnostic::UnrecognizedKeyword {
                    line: line_no,
                    keyword: keyword.to_string(),
                };
                log::warn!("MTL {diagnostic}");
                doc.diagnostics.push(diagnostic);
            }
            property => match current.as_mut() {
                Some((_, material)) => set_property(material, property),
                None => {
                    return Err(ParseError::PropertyOutsideMaterial {
                        line: line_no,
                        keyword: keyword.to_string(),
                        text: line.to_string(),
                    });
                }
            },
        }
    }

    if let Some((name, material)) = current {
        doc.materials.insert(name, material);
    }
    log::debug!("MTL parsed {} materials", doc.materials.len());
    Ok(doc)
}

fn set_property(material: &mut Material, parsed: MtlLine<'_>) {
    match parsed {
        MtlLine::Color(slot, c) => {
            let field = match slot {
                ColorSlot::Ambient => &mut material.ambient,
                ColorSlot::Diffuse => &mut material.diffuse,
                ColorSlot::Specular => &mut material.specular,
                ColorSlot::Emissive => &mut material.emissive,
            };
            *field = Some(c);
        }
        MtlLine::Scalar(slot, v) => match slot {
            ScalarSlot::Shininess => material.shininess = Some(v),
            ScalarSlot::OpticalDensity => material.optical_density = Some(v),
            ScalarSlot::Opacity => material.opacity = Some(v),
            ScalarSlot::Transparency => material.opacity = Some(1.0 - v),
        },
        MtlLine::Illum(model) => material.illum = Some(model),
        MtlLine::Map(slot, raw) => {
            let field = match slot {
                MapSlot::Ambient => &mut material.ambient_map,
                MapSlot::Diffuse => &mut material.diffuse_map,
                MapSlot::Specular => &mut material.specular_map,
                MapSlot::Shininess => &mut material.shininess_map,
                MapSlot::Opacity => &mut material.opacity_map,
                MapSlot::Normal => &mut material.normal_map,
            };
            *field = Some(TextureRef::new(raw));
        }
        MtlLine::NewMaterial(_) | MtlLine::Unknown(_) => {}
    }
}

fn tokenize(line: &str, line_no: usize) -> ParseResult<MtlLine<'_>> {
    let (keyword, rest) = split_keyword(line);
    let mut parts = rest.split_whitespace();
    let mut float = |field: &str| parse_f32(parts.next(), line_no, keyword, field, line);

    let parsed = match keyword {
        "newmtl" => MtlLine::NewMaterial(rest),
        "Ka" | "Kd" | "Ks" | "Ke" => {
            let slot = match keyword {
                "Ka" => ColorSlot::Ambient,
                "Kd" => ColorSlot::Diffuse,
                "Ks" => ColorSlot::Specular,
                _ => ColorSlot::Emissive,
            };
            let r = float("red component")?;
            let g = float("green component")?;
            let b = float("blue component")?;
            MtlLine::Color(slot, Vec3::new(r, g, b))
        }
        "Ns" => MtlLine::Scalar(ScalarSlot::Shininess, float("shininess")?),
        "Ni" => MtlLine::Scalar(ScalarSlot::OpticalDensity, float("optical density")?),
        "d" => MtlLine::Scalar(ScalarSlot::Opacity, float("opacity")?),
        "Tr" => MtlLine::Scalar(ScalarSlot::Transparency, float("transparency")?),
        "illum" => {
            let model = rest.split_whitespace().next().and_then(|v| v.parse::<i32>().ok());
            match model {
                Some(model) => MtlLine::Illum(model),
                None => {
                    return Err(ParseError::MalformedNumericField {
                        line: line_no,
                        keyword: keyword.to_string(),
                        field: "illumination model".to_string(),
                        text: line.to_string(),
                    });
                }
            }
        }
        "map_Ka" => MtlLine::Map(MapSlot::Ambient, rest),
        "map_Kd" => MtlLine::Map(MapSlot::Diffuse, rest),
        "map_Ks" => MtlLine::Map(MapSlot::Specular, rest),
        "map_Ns" => MtlLine::Map(MapSlot::Shininess, rest),
        "map_d" => MtlLine::Map(MapSlot::Opacity, rest),
        "map_Bump" | "map_bump" | "bump" => MtlLine::Map(MapSlot::Normal, rest),
        other => MtlLine::Unknown(other),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::vec3;

    #[test]
    fn diffuse_only_material() {
        let doc = parse_mtl("newmtl red\nKd 1 0 0\n").unwrap();
        assert_eq!(doc.materials.len(), 1);
        assert_eq!(
            doc.materials["red"],
            Material {
                diffuse: Some(vec3(1.0, 0.0, 0.0)),
                ..Default::default()
            }
        );
    }

    #[test]
    fn full_material_record() {
        let src = "\
# exported
newmtl Chair Wood
Ns 323.999994
Ka 1.000000 1.000000 1.000000
Kd 0.8 0.6 0.4
Ks 0.5 0.5 0.5
Ke 0.0 0.0 0.1
Ni 1.45
d 0.9
illum 2
map_Kd textures/wood diffuse.png
map_Ns wood_spec.png
map_Bump -bm 0.5 wood_normal.png
";
        let doc = parse_mtl(src).unwrap();
        let m = &doc.materials["Chair Wood"];
        assert_eq!(m.shininess, Some(323.999994));
        assert_eq!(m.ambient, Some(Vec3::ONE));
        assert_eq!(m.emissive, Some(vec3(0.0, 0.0, 0.1)));
        assert_eq!(m.optical_density, Some(1.45));
        assert_eq!(m.opacity, Some(0.9));
        assert_eq!(m.illum, Some(2));
        assert_eq!(m.diffuse_map.as_ref().unwrap().raw, "textures/wood diffuse.png");
        assert_eq!(m.shininess_map.as_ref().unwrap().path(), "wood_spec.png");
        let bump = m.normal_map.as_ref().unwrap();
        assert_eq!(bump.path(), "wood_normal.png");
        assert!(bump.raw.starts_with("-bm 0.5"));
        assert_eq!(m.texture_refs().count(), 3);
        assert!(doc.diagnostics.is_empty());
    }

    #[test]
    fn transparency_is_inverse_opacity() {
        let doc = parse_mtl("newmtl glass\nTr 0.25\n").unwrap();
        assert_eq!(doc.materials["glass"].opacity, Some(0.75));
    }

    #[test]
    fn later_newmtl_overwrites() {
        let doc = parse_mtl("newmtl a\nKd 1 0 0\nnewmtl b\nNs 10\nnewmtl a\nKs 0 1 0\n").unwrap();
        assert_eq!(doc.materials.len(), 2);
        assert_eq!(doc.materials["a"].diffuse, None);
        assert_eq!(doc.materials["a"].specular, Some(vec3(0.0, 1.0, 0.0)));
        assert_eq!(doc.materials["b"].shininess, Some(10.0));
    }

    #[test]
    fn property_before_newmtl_is_rejected() {
        let err = parse_mtl("Kd 1 1 1\nnewmtl a\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::PropertyOutsideMaterial {
                line: 1,
                keyword: "Kd".to_string(),
                text: "Kd 1 1 1".to_string(),
            }
        );
    }

    #[test]
    fn unknown_keywords_are_diagnostics() {
        let doc = parse_mtl("newmtl a\nTf 1 1 1\nKd 0 0 0\n").unwrap();
        assert_eq!(
            doc.diagnostics,
            vec![Diagnostic::UnrecognizedKeyword {
                line: 2,
                keyword: "Tf".to_string()
            }]
        );
        assert_eq!(doc.materials["a"].diffuse, Some(Vec3::ZERO));
    }

    #[test]
    fn malformed_values_abort() {
        assert!(matches!(
            parse_mtl("newmtl a\nKd 1 x 0\n"),
            Err(ParseError::MalformedNumericField { line: 2, .. })
        ));
        assert!(matches!(
            parse_mtl("newmtl a\nillum two\n"),
            Err(ParseError::MalformedNumericField { line: 2, .. })
        ));
    }
}
