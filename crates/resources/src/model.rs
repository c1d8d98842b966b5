//! Model loading from Wavefront OBJ files.
//!
//! Faces are read with their original arity and fan-triangulated here
//! (`(0, i, i + 1)` for `i in 1..n-1`) into a flat, non-indexed triangle
//! list. Vertex color is the vertex normal; faces without normals get their
//! flat triangle normal.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::error::{ResourceError, ResourceResult};

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        single_index: false,
        triangulate: false,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

/// One expanded vertex. Same field order as the GPU vertex layout.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ModelVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
}

/// One named object of a model, already triangulated.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<ModelVertex>,
}

/// A model containing one or more meshes.
#[derive(Clone, Debug, Default)]
pub struct Model {
    pub meshes: Vec<MeshData>,
    /// Axis-aligned bounding box minimum
    pub aabb_min: Vec3,
    /// Axis-aligned bounding box maximum
    pub aabb_max: Vec3,
}

impl Model {
    /// Loads and triangulates every object in an OBJ file. Material
    /// libraries are ignored.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let (objects, materials) =
            tobj::load_obj(path, &load_options()).map_err(|source| ResourceError::ObjLoad {
                path: path.to_path_buf(),
                source,
            })?;
        if let Err(e) = materials {
            debug!("Ignoring material library for {:?}: {}", path, e);
        }

        let model = Self::from_objects(&objects, path)?;
        info!(
            "Loaded model {:?}: {} mesh(es), {} vertices",
            path,
            model.meshes.len(),
            model.vertex_count()
        );
        Ok(model)
    }

    /// Loads OBJ text from a reader. `name` is used in errors only.
    pub fn from_reader<R: BufRead>(reader: &mut R, name: &str) -> ResourceResult<Self> {
        let path = PathBuf::from(name);
        let (objects, _) = tobj::load_obj_buf(reader, &load_options(), |_| Ok(Default::default()))
            .map_err(|source| ResourceError::ObjLoad {
                path: path.clone(),
                source,
            })?;
        Self::from_objects(&objects, &path)
    }

    /// A single triangle in the z = 0 plane, facing +Z.
    pub fn triangle() -> Self {
        let normal = Vec3::Z;
        let corners = [
            (Vec3::new(1.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
            (Vec3::new(-1.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
            (Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
        ];
        let vertices = corners
            .into_iter()
            .map(|(position, color)| ModelVertex {
                position,
                normal,
                color,
            })
            .collect();

        Self::from_meshes(vec![MeshData {
            name: "triangle".to_string(),
            vertices,
        }])
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.vertices.len()).sum()
    }

    fn from_objects(objects: &[tobj::Model], path: &Path) -> ResourceResult<Self> {
        let mut meshes = Vec::with_capacity(objects.len());
        for object in objects {
            let vertices = triangulate(&object.mesh)?;
            if vertices.is_empty() {
                warn!("Skipping object '{}' with no faces", object.name);
                continue;
            }
            meshes.push(MeshData {
                name: object.name.clone(),
                vertices,
            });
        }

        if meshes.is_empty() {
            return Err(ResourceError::NoGeometry(path.to_path_buf()));
        }
        Ok(Self::from_meshes(meshes))
    }

    fn from_meshes(meshes: Vec<MeshData>) -> Self {
        let mut aabb_min = Vec3::splat(f32::MAX);
        let mut aabb_max = Vec3::splat(f32::MIN);
        for vertex in meshes.iter().flat_map(|m| m.vertices.iter()) {
            aabb_min = aabb_min.min(vertex.position);
            aabb_max = aabb_max.max(vertex.position);
        }
        if meshes.iter().all(|m| m.vertices.is_empty()) {
            aabb_min = Vec3::ZERO;
            aabb_max = Vec3::ZERO;
        }

        Self {
            meshes,
            aabb_min,
            aabb_max,
        }
    }
}

/// Expands one OBJ mesh into independent triangles.
///
/// An empty `face_arities` means every face is already a triangle.
pub fn triangulate(mesh: &tobj::Mesh) -> ResourceResult<Vec<ModelVertex>> {
    let triangle_arities;
    let arities: &[u32] = if mesh.face_arities.is_empty() {
        triangle_arities = vec![3; mesh.indices.len() / 3];
        &triangle_arities
    } else {
        &mesh.face_arities
    };

    let has_normals = !mesh.normals.is_empty();
    let normal_indices = if mesh.normal_indices.is_empty() {
        &mesh.indices
    } else {
        &mesh.normal_indices
    };

    let triangle_count: usize = arities
        .iter()
        .map(|&n| n.saturating_sub(2) as usize)
        .sum();
    let mut vertices = Vec::with_capacity(triangle_count * 3);

    let mut start = 0usize;
    for &arity in arities {
        if arity < 3 {
            return Err(ResourceError::DegenerateFace(arity));
        }
        let end = start + arity as usize;
        let face = mesh
            .indices
            .get(start..end)
            .ok_or(ResourceError::IndexOutOfRange {
                what: "face index",
                index: end as u32,
                len: mesh.indices.len(),
            })?;

        for i in 1..arity as usize - 1 {
            let corners = [0, i, i + 1];
            let mut positions = [Vec3::ZERO; 3];
            for (slot, &corner) in corners.iter().enumerate() {
                positions[slot] = vec3_at(&mesh.positions, face[corner], "position")?;
            }
            let flat_normal = (positions[1] - positions[0])
                .cross(positions[2] - positions[0])
                .normalize_or_zero();

            for (slot, &corner) in corners.iter().enumerate() {
                let normal = if has_normals {
                    let index = *normal_indices.get(start + corner).ok_or(
                        ResourceError::IndexOutOfRange {
                            what: "normal index",
                            index: (start + corner) as u32,
                            len: normal_indices.len(),
                        },
                    )?;
                    vec3_at(&mesh.normals, index, "normal")?
                } else {
                    flat_normal
                };
                vertices.push(ModelVertex {
                    position: positions[slot],
                    normal,
                    color: normal,
                });
            }
        }
        start = end;
    }

    Ok(vertices)
}

fn vec3_at(data: &[f32], index: u32, what: &'static str) -> ResourceResult<Vec3> {
    let base = index as usize * 3;
    data.get(base..base + 3)
        .map(Vec3::from_slice)
        .ok_or(ResourceError::IndexOutOfRange {
            what,
            index,
            len: data.len() / 3,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str) -> ResourceResult<Model> {
        Model::from_reader(&mut text.as_bytes(), "inline.obj")
    }

    const QUAD: &str = "\
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1 4//1
";

    #[test]
    fn test_quad_fans_into_two_triangles() {
        let model = load(QUAD).unwrap();
        assert_eq!(model.meshes.len(), 1);

        let vertices = &model.meshes[0].vertices;
        assert_eq!(vertices.len(), 6);

        let positions: Vec<Vec3> = vertices.iter().map(|v| v.position).collect();
        assert_eq!(
            positions,
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ]
        );
    }

    #[test]
    fn test_color_equals_normal() {
        let model = load(QUAD).unwrap();
        for vertex in &model.meshes[0].vertices {
            assert_eq!(vertex.normal, Vec3::Z);
            assert_eq!(vertex.color, vertex.normal);
        }
    }

    #[test]
    fn test_missing_normals_use_face_normal() {
        let model = load("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        let vertices = &model.meshes[0].vertices;
        assert_eq!(vertices.len(), 3);
        for vertex in vertices {
            assert!((vertex.normal - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn test_pentagon_vertex_count() {
        let obj = "\
v 0 0 0
v 1 0 0
v 2 1 0
v 1 2 0
v 0 1 0
f 1 2 3 4 5
";
        let model = load(obj).unwrap();
        assert_eq!(model.vertex_count(), 9);
    }

    #[test]
    fn test_no_faces_is_error() {
        let result = load("v 0 0 0\nv 1 0 0\n");
        assert!(matches!(result, Err(ResourceError::NoGeometry(_))));
    }

    #[test]
    fn test_aabb() {
        let model = load(QUAD).unwrap();
        assert_eq!(model.aabb_min, Vec3::ZERO);
        assert_eq!(model.aabb_max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_triangulate_rejects_out_of_range() {
        let mesh = tobj::Mesh {
            positions: vec![0.0; 6],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        assert!(matches!(
            triangulate(&mesh),
            Err(ResourceError::IndexOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn test_triangulate_rejects_degenerate_face() {
        let mesh = tobj::Mesh {
            positions: vec![0.0; 9],
            indices: vec![0, 1],
            face_arities: vec![2],
            ..Default::default()
        };
        assert!(matches!(
            triangulate(&mesh),
            Err(ResourceError::DegenerateFace(2))
        ));
    }

    #[test]
    fn test_builtin_triangle() {
        let model = Model::triangle();
        assert_eq!(model.meshes.len(), 1);
        assert_eq!(model.vertex_count(), 3);
        assert_eq!(model.aabb_min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(model.aabb_max, Vec3::new(1.0, 1.0, 0.0));
    }
}
