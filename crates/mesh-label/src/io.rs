//! Mesh file I/O for OBJ, PLY and STL.
//!
//! Parsing is delegated to `tobj`, `ply-rs` and `stl_io`. Loaders return the
//! raw triangle soup; cleanup and validation happen when the soup is turned
//! into a [`crate::LabelMesh`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::types::{Mesh, Triangle, Vertex, VertexColor};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Obj,
    Ply,
    Stl,
}

impl MeshFormat {
    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .and_then(|ext| match ext.as_str() {
                "obj" => Some(MeshFormat::Obj),
                "ply" => Some(MeshFormat::Ply),
                "stl" => Some(MeshFormat::Stl),
                _ => None,
            })
    }

    fn require(path: &Path) -> MeshResult<Self> {
        Self::from_path(path).ok_or_else(|| {
            MeshError::unsupported_format(
                path.extension().and_then(|e| e.to_str()).map(String::from),
            )
        })
    }
}

/// Load a triangle soup from file, auto-detecting format from extension.
///
/// Polygons are triangulated by the format loaders.
///
/// # Errors
///
/// - [`MeshError::UnsupportedFormat`] for unknown extensions.
/// - [`MeshError::SourceUnavailable`] if the file cannot be opened.
/// - [`MeshError::ParseError`] if the format crate rejects the content.
/// - [`MeshError::EmptyMesh`] if the file holds no vertices or no faces.
pub fn load_mesh(path: &Path) -> MeshResult<Mesh> {
    let format = MeshFormat::require(path)?;
    File::open(path).map_err(|e| MeshError::source_unavailable(path, e))?;

    info!(path = %path.display(), format = ?format, "Loading mesh");

    let mesh = match format {
        MeshFormat::Obj => load_obj(path)?,
        MeshFormat::Ply => load_ply(path)?,
        MeshFormat::Stl => load_stl(path)?,
    };

    if mesh.vertices.is_empty() || mesh.faces.is_empty() {
        return Err(MeshError::empty_mesh(format!(
            "{} has {} vertices and {} faces",
            path.display(),
            mesh.vertex_count(),
            mesh.face_count()
        )));
    }

    let dims = mesh.bounds().dimensions();
    info!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Loaded mesh"
    );
    debug!(
        "Dimensions: {:.3} x {:.3} x {:.3}",
        dims.x, dims.y, dims.z
    );

    Ok(mesh)
}

/// Load mesh from STL file (binary or ASCII).
fn load_stl(path: &Path) -> MeshResult<Mesh> {
    let file = File::open(path).map_err(|e| MeshError::source_unavailable(path, e))?;
    let mut reader = BufReader::new(file);

    // stl_io merges identical corner positions into an indexed mesh
    let stl = stl_io::read_stl(&mut reader)
        .map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());
    for v in &stl.vertices {
        mesh.vertices
            .push(Vertex::from_coords(v.0[0] as f64, v.0[1] as f64, v.0[2] as f64));
    }
    for face in &stl.faces {
        mesh.faces.push([
            face.vertices[0] as u32,
            face.vertices[1] as u32,
            face.vertices[2] as u32,
        ]);
    }

    debug!(
        "STL loaded: {} vertices, {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );
    Ok(mesh)
}

/// Load mesh from OBJ file, merging all models.
///
/// `tobj` numbers vertices in order of first reference by a face, so ids
/// match the file when faces reference vertices in ascending first use
/// (as [`save_obj`] output of such a mesh does).
fn load_obj(path: &Path) -> MeshResult<Mesh> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    let mut mesh = Mesh::new();
    for model in &models {
        let obj = &model.mesh;
        let offset = mesh.vertices.len() as u32;
        let count = obj.positions.len() / 3;
        let has_normals = obj.normals.len() == obj.positions.len();
        let has_colors = obj.vertex_color.len() == obj.positions.len();

        for i in 0..count {
            let p = &obj.positions[3 * i..3 * i + 3];
            let mut vertex = Vertex::from_coords(p[0] as f64, p[1] as f64, p[2] as f64);
            if has_normals {
                let n = &obj.normals[3 * i..3 * i + 3];
                vertex.normal = Some(Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64));
            }
            if has_colors {
                let c = &obj.vertex_color[3 * i..3 * i + 3];
                vertex.color = Some(VertexColor::from_float(c[0] as f64, c[1] as f64, c[2] as f64));
            }
            mesh.vertices.push(vertex);
        }

        for chunk in obj.indices.chunks_exact(3) {
            mesh.faces
                .push([chunk[0] + offset, chunk[1] + offset, chunk[2] + offset]);
        }
        debug!(model = %model.name, vertices = count, "OBJ model loaded");
    }

    debug!(
        "OBJ loaded: {} vertices, {} faces from {} models",
        mesh.vertices.len(),
        mesh.faces.len(),
        models.len()
    );
    Ok(mesh)
}

/// Load mesh from PLY file (ASCII or binary).
///
/// Expects `vertex` elements with `x`, `y`, `z` and optionally `nx`, `ny`,
/// `nz` and `red`, `green`, `blue`; and `face` elements with a
/// `vertex_indices` (or `vertex_index`) list. Polygons are fan-triangulated.
fn load_ply(path: &Path) -> MeshResult<Mesh> {
    use ply_rs::parser::Parser;
    use ply_rs::ply::Property;

    let file = File::open(path).map_err(|e| MeshError::source_unavailable(path, e))?;
    let mut reader = BufReader::new(file);

    let parser = Parser::<ply_rs::ply::DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| MeshError::parse_error(path, format!("PLY parse error: {:?}", e)))?;

    let mut mesh = Mesh::new();

    if let Some(vertices) = ply.payload.get("vertex") {
        for element in vertices {
            let x = get_ply_float(element.get("x"), "x", path)?;
            let y = get_ply_float(element.get("y"), "y", path)?;
            let z = get_ply_float(element.get("z"), "z", path)?;
            let mut vertex = Vertex::from_coords(x, y, z);

            if let (Ok(nx), Ok(ny), Ok(nz)) = (
                get_ply_float(element.get("nx"), "nx", path),
                get_ply_float(element.get("ny"), "ny", path),
                get_ply_float(element.get("nz"), "nz", path),
            ) {
                vertex.normal = Some(Vector3::new(nx, ny, nz));
            }

            if let (Some(r), Some(g), Some(b)) = (
                get_ply_u8(element.get("red")),
                get_ply_u8(element.get("green")),
                get_ply_u8(element.get("blue")),
            ) {
                vertex.color = Some(VertexColor::new(r, g, b));
            }

            mesh.vertices.push(vertex);
        }
    }

    if let Some(faces) = ply.payload.get("face") {
        for element in faces {
            let polygon: Vec<u32> = match element
                .get("vertex_indices")
                .or_else(|| element.get("vertex_index"))
            {
                Some(Property::ListInt(ids)) => ids.iter().map(|&i| i as u32).collect(),
                Some(Property::ListUInt(ids)) => ids.clone(),
                Some(Property::ListUChar(ids)) => ids.iter().map(|&i| i as u32).collect(),
                Some(Property::ListUShort(ids)) => ids.iter().map(|&i| i as u32).collect(),
                Some(Property::ListShort(ids)) => ids.iter().map(|&i| i as u32).collect(),
                _ => {
                    warn!("PLY face without a vertex index list skipped");
                    continue;
                }
            };

            // fan triangulation
            for i in 1..polygon.len().saturating_sub(1) {
                mesh.faces.push([polygon[0], polygon[i], polygon[i + 1]]);
            }
        }
    }

    debug!(
        "PLY loaded: {} vertices, {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );
    Ok(mesh)
}

fn get_ply_float(prop: Option<&ply_rs::ply::Property>, name: &str, path: &Path) -> MeshResult<f64> {
    use ply_rs::ply::Property;

    match prop {
        Some(Property::Float(v)) => Ok(*v as f64),
        Some(Property::Double(v)) => Ok(*v),
        Some(Property::Int(v)) => Ok(*v as f64),
        Some(Property::UInt(v)) => Ok(*v as f64),
        Some(Property::Short(v)) => Ok(*v as f64),
        Some(Property::UShort(v)) => Ok(*v as f64),
        Some(Property::Char(v)) => Ok(*v as f64),
        Some(Property::UChar(v)) => Ok(*v as f64),
        _ => Err(MeshError::parse_error(
            path,
            format!("missing or invalid PLY property: {}", name),
        )),
    }
}

/// Color channel; floating point channels are taken as [0, 1].
fn get_ply_u8(prop: Option<&ply_rs::ply::Property>) -> Option<u8> {
    use ply_rs::ply::Property;

    match prop {
        Some(Property::UChar(v)) => Some(*v),
        Some(Property::Char(v)) => Some((*v).max(0) as u8),
        Some(Property::UShort(v)) => Some((*v).min(255) as u8),
        Some(Property::Short(v)) => Some((*v).clamp(0, 255) as u8),
        Some(Property::UInt(v)) => Some((*v).min(255) as u8),
        Some(Property::Int(v)) => Some((*v).clamp(0, 255) as u8),
        Some(Property::Float(v)) => Some((v * 255.0).round().clamp(0.0, 255.0) as u8),
        Some(Property::Double(v)) => Some((v * 255.0).round().clamp(0.0, 255.0) as u8),
        _ => None,
    }
}

/// Save mesh to file, auto-detecting format from extension.
pub fn save_mesh(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    match MeshFormat::require(path)? {
        MeshFormat::Obj => save_obj(mesh, path),
        MeshFormat::Ply => save_ply(mesh, path),
        MeshFormat::Stl => save_stl(mesh, path),
    }
}

/// Save mesh to STL file (binary format) with unit face normals.
pub fn save_stl(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let write_err = |e| MeshError::write_failed(path, e);

    let vertex = |i: u32| {
        let p = &mesh.vertices[i as usize].position;
        stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32])
    };
    let triangles: Vec<stl_io::Triangle> = mesh
        .faces
        .iter()
        .map(|&[i0, i1, i2]| {
            let n = Triangle::new(
                mesh.vertices[i0 as usize].position,
                mesh.vertices[i1 as usize].position,
                mesh.vertices[i2 as usize].position,
            )
            .normal()
            .unwrap_or_else(Vector3::zeros);
            stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [vertex(i0), vertex(i1), vertex(i2)],
            }
        })
        .collect();

    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    stl_io::write_stl(&mut writer, triangles.iter()).map_err(write_err)?;
    writer.flush().map_err(write_err)?;

    info!(faces = mesh.face_count(), path = %path.display(), "Saved STL");
    Ok(())
}

/// Save mesh to OBJ file (ASCII format).
///
/// Vertex ids are preserved. Colors are written as the widely read
/// `v x y z r g b` extension; normals as `vn` lines indexed like vertices.
pub fn save_obj(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let write_err = |e| MeshError::write_failed(path, e);

    let file = File::create(path).map_err(write_err)?;
    let mut w = BufWriter::new(file);

    let has_normals = mesh.vertices.iter().any(|v| v.normal.is_some());
    let has_colors = mesh.vertices.iter().any(|v| v.color.is_some());

    writeln!(w, "# Vertices: {}", mesh.vertices.len()).map_err(write_err)?;
    writeln!(w, "# Faces: {}", mesh.faces.len()).map_err(write_err)?;

    for v in &mesh.vertices {
        let p = &v.position;
        let line = if has_colors {
            let [r, g, b] = v.color.unwrap_or_default().to_float();
            writeln!(w, "v {:.9} {:.9} {:.9} {:.6} {:.6} {:.6}", p.x, p.y, p.z, r, g, b)
        } else {
            writeln!(w, "v {:.9} {:.9} {:.9}", p.x, p.y, p.z)
        };
        line.map_err(write_err)?;
    }

    if has_normals {
        for v in &mesh.vertices {
            // zero normal keeps vn ids aligned with v ids
            let n = v.normal.unwrap_or_else(Vector3::zeros);
            writeln!(w, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z).map_err(write_err)?;
        }
    }

    for face in &mesh.faces {
        // OBJ uses 1-based indexing
        let [i0, i1, i2] = face.map(|i| i + 1);
        let line = if has_normals {
            writeln!(w, "f {i0}//{i0} {i1}//{i1} {i2}//{i2}")
        } else {
            writeln!(w, "f {i0} {i1} {i2}")
        };
        line.map_err(write_err)?;
    }

    w.flush().map_err(write_err)?;
    info!(
        vertices = mesh.vertices.len(),
        faces = mesh.faces.len(),
        path = %path.display(),
        "Saved OBJ"
    );
    Ok(())
}

/// Save mesh to ASCII PLY file.
pub fn save_ply(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    write_ply(mesh, path, ply_rs::ply::Encoding::Ascii)
}

/// Save mesh to binary little-endian PLY file.
pub fn save_ply_binary(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    write_ply(mesh, path, ply_rs::ply::Encoding::BinaryLittleEndian)
}

fn write_ply(mesh: &Mesh, path: &Path, encoding: ply_rs::ply::Encoding) -> MeshResult<()> {
    use ply_rs::ply::{
        Addable, DefaultElement, ElementDef, Ply, Property, PropertyDef, PropertyType, ScalarType,
    };
    use ply_rs::writer::Writer;

    let write_err = |e| MeshError::write_failed(path, e);
    let scalar = |name: &str, ty: ScalarType| PropertyDef::new(name.to_string(), PropertyType::Scalar(ty));

    let has_normals = mesh.vertices.iter().any(|v| v.normal.is_some());
    let has_colors = mesh.vertices.iter().any(|v| v.color.is_some());

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = encoding;

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for name in ["x", "y", "z"] {
        vertex_def.properties.add(scalar(name, ScalarType::Double));
    }
    if has_normals {
        for name in ["nx", "ny", "nz"] {
            vertex_def.properties.add(scalar(name, ScalarType::Float));
        }
    }
    if has_colors {
        for name in ["red", "green", "blue"] {
            vertex_def.properties.add(scalar(name, ScalarType::UChar));
        }
    }
    vertex_def.count = mesh.vertices.len();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    face_def.count = mesh.faces.len();
    ply.header.elements.add(face_def);

    let vertices: Vec<DefaultElement> = mesh
        .vertices
        .iter()
        .map(|v| {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Double(v.position.x));
            element.insert("y".to_string(), Property::Double(v.position.y));
            element.insert("z".to_string(), Property::Double(v.position.z));
            if has_normals {
                let n = v.normal.unwrap_or_else(Vector3::zeros);
                element.insert("nx".to_string(), Property::Float(n.x as f32));
                element.insert("ny".to_string(), Property::Float(n.y as f32));
                element.insert("nz".to_string(), Property::Float(n.z as f32));
            }
            if has_colors {
                let c = v.color.unwrap_or_default();
                element.insert("red".to_string(), Property::UChar(c.r));
                element.insert("green".to_string(), Property::UChar(c.g));
                element.insert("blue".to_string(), Property::UChar(c.b));
            }
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    let faces: Vec<DefaultElement> = mesh
        .faces
        .iter()
        .map(|face| {
            let mut element = DefaultElement::new();
            element.insert(
                "vertex_indices".to_string(),
                Property::ListInt(face.iter().map(|&i| i as i32).collect()),
            );
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), faces);

    ply.make_consistent().map_err(|e| {
        write_err(std::io::Error::other(format!("PLY consistency error: {:?}", e)))
    })?;

    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    Writer::new()
        .write_ply(&mut writer, &mut ply)
        .map_err(|e| write_err(std::io::Error::other(format!("PLY write error: {:?}", e))))?;
    writer.flush().map_err(write_err)?;

    info!(
        vertices = mesh.vertices.len(),
        faces = mesh.faces.len(),
        path = %path.display(),
        "Saved PLY"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn tetrahedron() -> Mesh {
        Mesh::from_raw(
            &[
                [0.0, 0.0, 0.0],
                [10.0, 0.0, 0.0],
                [0.0, 10.0, 0.0],
                [0.0, 0.0, 10.0],
            ],
            &[[0, 1, 2], [0, 3, 1], [1, 3, 2], [0, 2, 3]],
        )
    }

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(MeshFormat::from_path(Path::new("a.obj")), Some(MeshFormat::Obj));
        assert_eq!(MeshFormat::from_path(Path::new("a.PLY")), Some(MeshFormat::Ply));
        assert_eq!(MeshFormat::from_path(Path::new("a.stl")), Some(MeshFormat::Stl));
        assert_eq!(MeshFormat::from_path(Path::new("a.3mf")), None);
        assert_eq!(MeshFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_unsupported_and_missing() {
        let err = load_mesh(Path::new("model.xyz")).unwrap_err();
        assert!(matches!(err, MeshError::UnsupportedFormat { .. }));

        let err = load_mesh(Path::new("/nonexistent/model.obj")).unwrap_err();
        assert!(matches!(err, MeshError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_load_ascii_stl() {
        let file = write_temp(
            ".stl",
            "solid test\n  facet normal 0 0 1\n    outer loop\n      vertex 0 0 0\n      \
             vertex 100 0 0\n      vertex 0 100 0\n    endloop\n  endfacet\nendsolid test\n",
        );
        let mesh = load_mesh(file.path()).unwrap();

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);
        let bb = mesh.bounds();
        assert_eq!(bb.max, Point3::new(100.0, 100.0, 0.0));
    }

    #[test]
    fn test_save_and_reload_stl() {
        let file = NamedTempFile::with_suffix(".stl").unwrap();
        save_stl(&tetrahedron(), file.path()).unwrap();

        let reloaded = load_mesh(file.path()).unwrap();
        assert_eq!(reloaded.vertex_count(), 4);
        assert_eq!(reloaded.face_count(), 4);
    }

    #[test]
    fn test_obj_preserves_ids_normals_and_colors() {
        let mut mesh = tetrahedron();
        mesh.vertices[0].normal = Some(Vector3::new(0.0, 0.0, -1.0));
        mesh.vertices[1].color = Some(VertexColor::new(255, 0, 0));

        let file = NamedTempFile::with_suffix(".obj").unwrap();
        save_obj(&mesh, file.path()).unwrap();
        let reloaded = load_mesh(file.path()).unwrap();

        assert_eq!(reloaded.faces, mesh.faces);
        for (a, b) in mesh.vertices.iter().zip(&reloaded.vertices) {
            assert!((a.position - b.position).norm() < 1e-6);
        }
        assert_eq!(reloaded.vertices[0].normal, Some(Vector3::new(0.0, 0.0, -1.0)));
        assert_eq!(reloaded.vertices[1].color, Some(VertexColor::new(255, 0, 0)));
        assert_eq!(reloaded.vertices[2].color, Some(VertexColor::MID_GRAY));
    }

    #[test]
    fn test_obj_quad_is_triangulated() {
        let file = write_temp(
            ".obj",
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n",
        );
        let mesh = load_mesh(file.path()).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
    }

    #[test]
    fn test_load_ply_polygon_with_colors() {
        let file = write_temp(
            ".ply",
            "ply\nformat ascii 1.0\nelement vertex 4\nproperty float x\nproperty float y\n\
             property float z\nproperty uchar red\nproperty uchar green\nproperty uchar blue\n\
             element face 1\nproperty list uchar int vertex_indices\nend_header\n\
             0 0 0 255 0 0\n1 0 0 0 255 0\n1 1 0 0 0 255\n0 1 0 10 20 30\n4 0 1 2 3\n",
        );
        let mesh = load_mesh(file.path()).unwrap();

        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
        assert_eq!(mesh.vertices[3].color, Some(VertexColor::new(10, 20, 30)));
        assert!(mesh.vertices[0].normal.is_none());
    }

    #[test]
    fn test_save_and_reload_ply() {
        let mut mesh = tetrahedron();
        for v in &mut mesh.vertices {
            v.normal = Some(Vector3::new(0.0, 1.0, 0.0));
            v.color = Some(VertexColor::new(1, 2, 3));
        }

        for binary in [false, true] {
            let file = NamedTempFile::with_suffix(".ply").unwrap();
            if binary {
                save_ply_binary(&mesh, file.path()).unwrap();
            } else {
                save_ply(&mesh, file.path()).unwrap();
            }
            let reloaded = load_mesh(file.path()).unwrap();

            assert_eq!(reloaded.faces, mesh.faces);
            for (a, b) in mesh.vertices.iter().zip(&reloaded.vertices) {
                assert!((a.position - b.position).norm() < 1e-9);
                assert_eq!(b.color, Some(VertexColor::new(1, 2, 3)));
                assert_eq!(b.normal, Some(Vector3::new(0.0, 1.0, 0.0)));
            }
        }
    }

    #[test]
    fn test_empty_file_is_empty_mesh() {
        let file = write_temp(".obj", "# nothing here\n");
        let err = load_mesh(file.path()).unwrap_err();
        assert!(matches!(err, MeshError::EmptyMesh { .. }));
    }
}
