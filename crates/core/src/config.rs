//! Runtime configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Settings read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Enable `VK_LAYER_KHRONOS_validation` when the loader has it.
    pub validation: bool,
    /// Directory holding the compiled `.spv` files.
    pub shader_dir: PathBuf,
    /// Optional OBJ model drawn next to the built-in triangle.
    pub mesh_path: Option<PathBuf>,
    /// Camera movement in world units per second.
    pub camera_speed: f32,
    /// Degrees of rotation per pixel of mouse motion.
    pub mouse_sensitivity: f32,
    /// Upper bound for fence waits and image acquisition.
    pub gpu_timeout: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "minivk".to_string(),
            width: 1280,
            height: 720,
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("shaders"),
            mesh_path: None,
            camera_speed: 2.5,
            mouse_sensitivity: 0.1,
            gpu_timeout: Duration::from_secs(1),
        }
    }
}

impl RendererConfig {
    /// Defaults overridden by `MINIVK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `MINIVK_*` key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(title) = lookup("MINIVK_TITLE") {
            config.title = title;
        }
        if let Some(width) = parse(&lookup, "MINIVK_WIDTH")? {
            config.width = width;
        }
        if let Some(height) = parse(&lookup, "MINIVK_HEIGHT")? {
            config.height = height;
        }
        if let Some(validation) = parse(&lookup, "MINIVK_VALIDATION")? {
            config.validation = validation;
        }
        if let Some(dir) = lookup("MINIVK_SHADER_DIR") {
            config.shader_dir = PathBuf::from(dir);
        }
        if let Some(mesh) = lookup("MINIVK_MESH") {
            config.mesh_path = Some(PathBuf::from(mesh));
        }
        if let Some(speed) = parse(&lookup, "MINIVK_CAMERA_SPEED")? {
            config.camera_speed = speed;
        }
        if let Some(sensitivity) = parse(&lookup, "MINIVK_MOUSE_SENSITIVITY")? {
            config.mouse_sensitivity = sensitivity;
        }
        if let Some(ms) = parse::<u64>(&lookup, "MINIVK_GPU_TIMEOUT_MS")? {
            config.gpu_timeout = Duration::from_millis(ms);
        }

        if config.width == 0 || config.height == 0 {
            return Err(Error::Config {
                key: "MINIVK_WIDTH/MINIVK_HEIGHT".to_string(),
                message: "window dimensions must be non-zero".to_string(),
            });
        }

        Ok(config)
    }

    /// Path of a compiled shader inside [`Self::shader_dir`].
    pub fn shader_path(&self, file_name: &str) -> PathBuf {
        self.shader_dir.join(file_name)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| Error::Config {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_no_overrides_gives_default() {
        let config = RendererConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_overrides_apply() {
        let config = RendererConfig::from_lookup(lookup_from(&[
            ("MINIVK_WIDTH", "800"),
            ("MINIVK_HEIGHT", " 600 "),
            ("MINIVK_VALIDATION", "false"),
            ("MINIVK_MESH", "assets/monkey.obj"),
            ("MINIVK_GPU_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.width, 800);
        assert_eq!(config.height, 600);
        assert!(!config.validation);
        assert_eq!(config.mesh_path, Some(PathBuf::from("assets/monkey.obj")));
        assert_eq!(config.gpu_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let err = RendererConfig::from_lookup(lookup_from(&[("MINIVK_WIDTH", "wide")]))
            .unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key, "MINIVK_WIDTH"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        let result = RendererConfig::from_lookup(lookup_from(&[("MINIVK_HEIGHT", "0")]));
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_shader_path() {
        let config = RendererConfig::default();
        assert_eq!(
            config.shader_path("mesh.vert.spv"),
            PathBuf::from("shaders").join("mesh.vert.spv")
        );
    }
}
