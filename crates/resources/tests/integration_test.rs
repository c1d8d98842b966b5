//! Integration tests for model loading.

use std::path::{Path, PathBuf};

use minivk_resources::{Model, ResourceError};

fn asset(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../assets/models")
        .join(name)
}

#[test]
fn test_load_cube_model() {
    let model_path = asset("cube.obj");

    // Skip test if file doesn't exist (CI environment may not have assets)
    if !model_path.exists() {
        println!("Skipping test: model file not found at {:?}", model_path);
        return;
    }

    let model = Model::load(&model_path).expect("Failed to load OBJ model");

    assert_eq!(model.meshes.len(), 1, "Cube should be a single object");
    let mesh = &model.meshes[0];
    assert_eq!(mesh.name, "cube");

    // 6 quads -> 12 triangles -> 36 vertices
    assert_eq!(mesh.vertices.len(), 36);
    assert_eq!(model.vertex_count(), 36);

    for vertex in &mesh.vertices {
        assert!(
            (vertex.normal.length() - 1.0).abs() < 1e-6,
            "Normals should be unit length"
        );
        assert_eq!(vertex.color, vertex.normal);
    }

    assert_eq!(model.aabb_min, glam::Vec3::splat(-0.5));
    assert_eq!(model.aabb_max, glam::Vec3::splat(0.5));
}

#[test]
fn test_missing_model_file() {
    let result = Model::load(&asset("does_not_exist.obj"));
    assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
}
