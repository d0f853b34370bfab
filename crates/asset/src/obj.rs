//! Wavefront OBJ parser producing expanded (non-indexed) per-geometry vertex arrays.
//!
//! Supported: `v` (with optional vertex colors), `vt`, `vn`, `f` (fan-triangulated,
//! negative indices), `o`, `g`, `usemtl`, `mtllib`, `s`. Other keywords are reported
//! as diagnostics and skipped.

use crate::error::{
    Diagnostic, ParseError, ParseResult, Pool, content_lines, parse_f32, split_keyword,
};

const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const DEFAULT_NAME: &str = "default";

/// Flat attribute arrays, one full tuple per emitted vertex, so every present
/// array has the same vertex count. `None` means no face of the geometry
/// referenced that attribute. Vertices whose face left a present attribute out
/// hold zeros, and uncolored vertices of a colored geometry hold white.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexArrays {
    /// 3 components per vertex.
    pub position: Option<Vec<f32>>,
    /// 2 components per vertex.
    pub texcoord: Option<Vec<f32>>,
    /// 3 components per vertex.
    pub normal: Option<Vec<f32>>,
    /// `color_components` (3 or 4) per vertex.
    pub color: Option<Vec<f32>>,
    pub color_components: usize,
}

impl VertexArrays {
    pub fn vertex_count(&self) -> usize {
        self.position.as_ref().map_or(0, |p| p.len() / 3)
    }
}

/// One run of faces sharing object, groups and material.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    pub object: String,
    pub groups: Vec<String>,
    pub material: String,
    pub data: VertexArrays,
}

/// Result of parsing one OBJ document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjDocument {
    pub geometries: Vec<Geometry>,
    /// `mtllib` arguments in order of appearance, verbatim.
    pub material_libs: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse OBJ text. Unknown keywords become diagnostics; numeric and index
/// defects abort with a [`ParseError`] naming the line.
pub fn parse_obj(text: &str) -> ParseResult<ObjDocument> {
    let mut parser = ObjParser::new();
    for (line_no, line) in content_lines(text) {
        let parsed = tokenize(line, line_no)?;
        parser.apply(parsed, line_no, line)?;
    }
    Ok(parser.finish())
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct FaceRef {
    position: i64,
    texcoord: Option<i64>,
    normal: Option<i64>,
}

#[derive(Debug, PartialEq)]
enum ObjLine<'a> {
    Vertex {
        position: [f32; 3],
        /// RGBA (missing channels white) plus 3 or 4 for whether alpha was given.
        color: Option<([f32; 4], usize)>,
    },
    Texcoord([f32; 2]),
    Normal([f32; 3]),
    Face(Vec<FaceRef>),
    UseMtl(&'a str),
    Group(Vec<&'a str>),
    Object(&'a str),
    MtlLib(&'a str),
    Smoothing,
    Unknown(&'a str),
}

fn tokenize(line: &str, line_no: usize) -> ParseResult<ObjLine<'_>> {
    let (keyword, rest) = split_keyword(line);
    let mut parts = rest.split_whitespace();
    let float =
        |value: Option<&str>, field: &str| parse_f32(value, line_no, keyword, field, line);

    let parsed = match keyword {
        "v" => {
            let x = float(parts.next(), "x coordinate")?;
            let y = float(parts.next(), "y coordinate")?;
            let z = float(parts.next(), "z coordinate")?;
            let extra = parts
                .map(|p| float(Some(p), "vertex color"))
                .collect::<ParseResult<Vec<f32>>>()?;
            let color = match extra.len() {
                // A lone fourth field is the rational weight `w`, not a color.
                0 | 1 => None,
                n => {
                    let n = n.min(4);
                    let mut rgba = WHITE;
                    rgba[..n].copy_from_slice(&extra[..n]);
                    Some((rgba, n.max(3)))
                }
            };
            ObjLine::Vertex {
                position: [x, y, z],
                color,
            }
        }
        "vt" => {
            let u = float(parts.next(), "u coordinate")?;
            let v = match parts.next() {
                Some(v) => float(Some(v), "v coordinate")?,
                None => 0.0,
            };
            ObjLine::Texcoord([u, v])
        }
        "vn" => {
            let nx = float(parts.next(), "nx coordinate")?;
            let ny = float(parts.next(), "ny coordinate")?;
            let nz = float(parts.next(), "nz coordinate")?;
            ObjLine::Normal([nx, ny, nz])
        }
        "f" => ObjLine::Face(
            parts
                .map(|token| parse_face_ref(token, line_no, line))
                .collect::<ParseResult<_>>()?,
        ),
        "usemtl" => ObjLine::UseMtl(rest),
        "g" => ObjLine::Group(parts.collect()),
        "o" => ObjLine::Object(rest),
        "mtllib" => ObjLine::MtlLib(rest),
        "s" => ObjLine::Smoothing,
        other => ObjLine::Unknown(other),
    };
    Ok(parsed)
}

fn malformed(line_no: usize, keyword: &str, field: &str, text: &str) -> ParseError {
    ParseError::MalformedNumericField {
        line: line_no,
        keyword: keyword.to_string(),
        field: field.to_string(),
        text: text.to_string(),
    }
}

/// Parse `p`, `p/t`, `p//n` or `p/t/n`.
fn parse_face_ref(token: &str, line_no: usize, text: &str) -> ParseResult<FaceRef> {
    let index = |value: &str| {
        value
            .parse::<i64>()
            .map_err(|_| malformed(line_no, "f", "face index", text))
    };
    let optional = |value: Option<&str>| match value {
        Some(v) if !v.is_empty() => index(v).map(Some),
        _ => Ok(None),
    };

    let mut split = token.split('/');
    let position = index(split.next().unwrap_or_default())?;
    let texcoord = optional(split.next())?;
    let normal = optional(split.next())?;
    Ok(FaceRef {
        position,
        texcoord,
        normal,
    })
}

/// Map an OBJ index onto a pool whose slot 0 is the sentinel.
/// `0` yields the sentinel; negative values count back from `len`.
fn resolve_index(
    raw: i64,
    len: usize,
    pool: Pool,
    line_no: usize,
    text: &str,
) -> ParseResult<usize> {
    if raw == 0 {
        return Ok(0);
    }
    let len_i = len as i64;
    let idx = if raw > 0 { raw } else { len_i + raw };
    if idx < 1 || idx >= len_i {
        return Err(ParseError::DanglingFaceReference {
            line: line_no,
            pool,
            index: raw,
            len: len - 1,
            text: text.to_string(),
        });
    }
    Ok(idx as usize)
}

#[derive(Debug)]
struct PendingGeometry {
    object: String,
    groups: Vec<String>,
    material: String,
    position: Vec<f32>,
    texcoord: Vec<f32>,
    normal: Vec<f32>,
    /// RGBA per vertex, narrowed in `finish`.
    color: Vec<f32>,
    has_texcoord: bool,
    has_normal: bool,
}

impl PendingGeometry {
    /// `color_components` is `None` when no `v` line of the document carried a color.
    fn finish(self, color_components: Option<usize>) -> Geometry {
        let color = color_components.map(|width| match width {
            4 => self.color,
            _ => self
                .color
                .chunks_exact(4)
                .flat_map(|rgba| rgba[..width].iter().copied())
                .collect(),
        });
        Geometry {
            object: self.object,
            groups: self.groups,
            material: self.material,
            data: VertexArrays {
                position: (!self.position.is_empty()).then_some(self.position),
                texcoord: self.has_texcoord.then_some(self.texcoord),
                normal: self.has_normal.then_some(self.normal),
                color,
                color_components: color_components.unwrap_or(3),
            },
        }
    }
}

struct ObjParser {
    positions: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    normals: Vec<[f32; 3]>,
    /// Parallel to `positions`; uncolored vertices hold white.
    colors: Vec<[f32; 4]>,
    /// Widest color seen so far (3 or 4); `None` until a colored `v` line.
    color_components: Option<usize>,

    geometries: Vec<PendingGeometry>,
    /// Whether the last entry of `geometries` still receives faces.
    open: bool,

    object: String,
    groups: Vec<String>,
    material: String,

    material_libs: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl ObjParser {
    fn new() -> Self {
        Self {
            positions: vec![[0.0; 3]],
            texcoords: vec![[0.0; 2]],
            normals: vec![[0.0; 3]],
            colors: vec![[0.0; 4]],
            color_components: None,
            geometries: Vec::new(),
            open: false,
            object: DEFAULT_NAME.to_string(),
            groups: vec![DEFAULT_NAME.to_string()],
            material: DEFAULT_NAME.to_string(),
            material_libs: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn apply(&mut self, parsed: ObjLine<'_>, line_no: usize, text: &str) -> ParseResult<()> {
        match parsed {
            ObjLine::Vertex { position, color } => {
                self.positions.push(position);
                match color {
                    Some((rgba, n)) => {
                        self.color_components =
                            Some(self.color_components.map_or(n, |width| width.max(n)));
                        self.colors.push(rgba);
                    }
                    None => self.colors.push(WHITE),
                }
            }
            ObjLine::Texcoord(uv) => self.texcoords.push(uv),
            ObjLine::Normal(n) => self.normals.push(n),
            ObjLine::Face(refs) => {
                if refs.len() < 3 {
                    self.diagnose(Diagnostic::ShortFace {
                        line: line_no,
                        count: refs.len(),
                    });
                    return Ok(());
                }
                self.emit_face(&refs, line_no, text)?;
            }
            ObjLine::UseMtl(name) => {
                self.material = name_or_default(name);
                self.close_geometry();
            }
            ObjLine::Group(names) => {
                self.groups = if names.is_empty() {
                    vec![DEFAULT_NAME.to_string()]
                } else {
                    names.into_iter().map(str::to_string).collect()
                };
                self.close_geometry();
            }
            ObjLine::Object(name) => {
                self.object = name_or_default(name);
                self.close_geometry();
            }
            ObjLine::MtlLib(file) => self.material_libs.push(file.to_string()),
            ObjLine::Smoothing => {}
            ObjLine::Unknown(keyword) => self.diagnose(Diagnostic::UnrecognizedKeyword {
                line: line_no,
                keyword: keyword.to_string(),
            }),
        }
        Ok(())
    }

    fn diagnose(&mut self, diagnostic: Diagnostic) {
        log::warn!("OBJ {diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    /// Start a fresh geometry on the next face, unless the current one is still empty.
    fn close_geometry(&mut self) {
        if self.open
            && self
                .geometries
                .last()
                .is_some_and(|g| !g.position.is_empty())
        {
            self.open = false;
        }
    }

    fn current_geometry(&mut self) -> &mut PendingGeometry {
        if !self.open || self.geometries.is_empty() {
            self.geometries.push(PendingGeometry {
                object: self.object.clone(),
                groups: self.groups.clone(),
                material: self.material.clone(),
                position: Vec::new(),
                texcoord: Vec::new(),
                normal: Vec::new(),
                color: Vec::new(),
                has_texcoord: false,
                has_normal: false,
            });
            self.open = true;
        }
        let last = self.geometries.len() - 1;
        &mut self.geometries[last]
    }

    fn emit_face(&mut self, refs: &[FaceRef], line_no: usize, text: &str) -> ParseResult<()> {
        // Resolve everything first so a dangling reference leaves no partial triangle.
        let resolved = refs
            .iter()
            .map(|r| self.resolve(r, line_no, text))
            .collect::<ParseResult<Vec<_>>>()?;

        let positions = std::mem::take(&mut self.positions);
        let texcoords = std::mem::take(&mut self.texcoords);
        let normals = std::mem::take(&mut self.normals);
        let colors = std::mem::take(&mut self.colors);

        // Colors are recorded even before the first colored `v`; `finish` drops
        // them if none ever shows up. Omitted `t`/`n` take the zero sentinel.
        let geometry = self.current_geometry();
        for tri in 0..resolved.len() - 2 {
            for &(p, t, n) in [&resolved[0], &resolved[tri + 1], &resolved[tri + 2]] {
                geometry.position.extend_from_slice(&positions[p]);
                geometry.color.extend_from_slice(&colors[p]);
                geometry.texcoord.extend_from_slice(&texcoords[t.unwrap_or(0)]);
                geometry.normal.extend_from_slice(&normals[n.unwrap_or(0)]);
                geometry.has_texcoord |= t.is_some();
                geometry.has_normal |= n.is_some();
            }
        }

        self.positions = positions;
        self.texcoords = texcoords;
        self.normals = normals;
        self.colors = colors;
        Ok(())
    }

    fn resolve(
        &self,
        r: &FaceRef,
        line_no: usize,
        text: &str,
    ) -> ParseResult<(usize, Option<usize>, Option<usize>)> {
        let p = resolve_index(r.position, self.positions.len(), Pool::Position, line_no, text)?;
        let t = r
            .texcoord
            .map(|t| resolve_index(t, self.texcoords.len(), Pool::Texcoord, line_no, text))
            .transpose()?;
        let n = r
            .normal
            .map(|n| resolve_index(n, self.normals.len(), Pool::Normal, line_no, text))
            .transpose()?;
        Ok((p, t, n))
    }

    fn finish(self) -> ObjDocument {
        let width = self.color_components;
        let geometries: Vec<Geometry> = self
            .geometries
            .into_iter()
            .map(|g| g.finish(width))
            .collect();
        for g in &geometries {
            log::debug!(
                "OBJ geometry object='{}' groups={:?} material='{}': {} vertices",
                g.object,
                g.groups,
                g.material,
                g.data.vertex_count()
            );
        }
        ObjDocument {
            geometries,
            material_libs: self.material_libs,
            diagnostics: self.diagnostics,
        }
    }
}

fn name_or_default(name: &str) -> String {
    if name.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name.to_string()
    }
}
