//! minivk viewer.
//!
//! Controls: WASD moves, right mouse button + drag looks around, the wheel
//! zooms, Space switches material, Escape quits.

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use minivk_core::{FrameTimer, RendererConfig};
use minivk_platform::{InputState, KeyCode, MouseButton, Window};
use minivk_renderer::Renderer;
use minivk_scene::{CameraMovement, FlyCamera};

/// Pixels per line for wheels that report line deltas.
const SCROLL_LINE_PIXELS: f32 = 20.0;

/// Viewer state that outlives a single frame.
struct AppState {
    camera: FlyCamera,
    selected_material: usize,
    material_count: usize,
}

impl AppState {
    fn new(config: &RendererConfig) -> Self {
        Self {
            camera: FlyCamera::default()
                .with_speed(config.camera_speed)
                .with_sensitivity(config.mouse_sensitivity),
            selected_material: 0,
            material_count: 1,
        }
    }

    /// Cycles to the next material.
    fn next_material(&mut self) {
        self.selected_material = (self.selected_material + 1) % self.material_count.max(1);
    }

    fn update(&mut self, input: &InputState, delta_time: f32) {
        if input.is_key_just_pressed(KeyCode::Space) {
            self.next_material();
            debug!("Selected material {}", self.selected_material);
        }

        let bindings = [
            (KeyCode::KeyW, CameraMovement::Forward),
            (KeyCode::KeyS, CameraMovement::Backward),
            (KeyCode::KeyA, CameraMovement::Left),
            (KeyCode::KeyD, CameraMovement::Right),
        ];
        for (key, movement) in bindings {
            if input.is_key_pressed(key) {
                self.camera.process_keyboard(movement, delta_time);
            }
        }

        if input.is_mouse_pressed(MouseButton::Right) {
            let (dx, dy) = input.mouse_delta();
            self.camera.process_mouse(dx, dy);
        }

        let scroll = input.scroll_delta();
        if scroll != 0.0 {
            self.camera.process_scroll(scroll);
        }
    }
}

struct App {
    config: RendererConfig,
    window: Option<Window>,
    renderer: Option<Renderer>,
    state: AppState,
    input: InputState,
    timer: FrameTimer,
    /// First fatal error; returned from `main` after the loop exits.
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        let state = AppState::new(&config);
        Self {
            config,
            window: None,
            renderer: None,
            state,
            input: InputState::new(),
            timer: FrameTimer::new(),
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.failure.get_or_insert(err);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(
            event_loop,
            self.config.width,
            self.config.height,
            &self.config.title,
        )
        .context("failed to create window")?;
        let renderer =
            Renderer::new(&window, &self.config).context("failed to initialize renderer")?;

        self.state.material_count = renderer.material_count();
        info!(
            "Initialization complete, material '{}' selected",
            renderer.material_name(0).unwrap_or("?")
        );

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let delta_time = self.timer.tick();
        if let Some(fps) = self.timer.take_fps() {
            info!("FPS: {:.1}", fps);
        }

        self.state.update(&self.input, delta_time);
        self.input.begin_frame();

        if let Some(renderer) = self.renderer.as_mut() {
            renderer
                .draw_frame(&self.state.camera, self.state.selected_material)
                .context("frame failed")?;
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                match event.state {
                    ElementState::Pressed if key == KeyCode::Escape => {
                        info!("Escape pressed, shutting down");
                        event_loop.exit();
                    }
                    ElementState::Pressed => self.input.on_key_pressed(key),
                    ElementState::Released => self.input.on_key_released(key),
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => self.input.on_mouse_pressed(button.into()),
                ElementState::Released => self.input.on_mouse_released(button.into()),
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::CursorLeft { .. } => self.input.on_mouse_left(),
            WindowEvent::MouseWheel { delta, .. } => {
                let dy = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / SCROLL_LINE_PIXELS,
                };
                self.input.on_scroll(dy);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Renderer before window: the surface must go before the window it
        // was created from
        self.renderer = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    minivk_core::init_logging();
    info!("Starting minivk");

    let config = RendererConfig::from_env().context("invalid configuration")?;
    debug!("{:?}", config);

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(err) => Err(err),
        None => {
            info!("Clean shutdown after {:.1}s", app.timer.elapsed().as_secs_f32());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_cycles_materials() {
        let mut state = AppState::new(&RendererConfig::default());
        state.material_count = 2;

        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Space);
        state.update(&input, 0.016);
        assert_eq!(state.selected_material, 1);

        // Held key does not switch again
        input.begin_frame();
        input.on_key_pressed(KeyCode::Space);
        state.update(&input, 0.016);
        assert_eq!(state.selected_material, 1);

        input.on_key_released(KeyCode::Space);
        input.begin_frame();
        input.on_key_pressed(KeyCode::Space);
        state.update(&input, 0.016);
        assert_eq!(state.selected_material, 0);
    }

    #[test]
    fn test_mouse_look_requires_right_button() {
        let mut state = AppState::new(&RendererConfig::default());
        let yaw = state.camera.yaw();

        let mut input = InputState::new();
        input.on_mouse_moved(0.0, 0.0);
        input.on_mouse_moved(100.0, 0.0);
        state.update(&input, 0.016);
        assert_eq!(state.camera.yaw(), yaw);

        input.on_mouse_pressed(MouseButton::Right);
        state.update(&input, 0.016);
        assert!(state.camera.yaw() > yaw);
    }

    #[test]
    fn test_forward_moves_camera() {
        let mut state = AppState::new(&RendererConfig::default());
        let start = state.camera.position;

        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        state.update(&input, 1.0);
        assert!(state.camera.position.z < start.z);
    }
}
