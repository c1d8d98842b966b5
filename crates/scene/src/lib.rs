//! Scene-side math for the draw loop: the fly camera and the model spin.

pub mod camera;

pub use camera::{CameraMovement, FlyCamera, model_spin};
