//! Cameras, their input controllers and the view/projection uniform.
//!
//! Two camera variants exist: a free camera driven by keyboard and mouse drag,
//! and a virtual-joystick camera driven by touch (left half of the canvas
//! moves, right half turns). A camera only reacts to input once it has been
//! attached to an element with [`Camera::attach_control`]; detached cameras
//! are passive.
//!
//! Collision ellipsoid, collision and gravity flags are carried for the
//! engine's collision system; the camera itself never resolves collisions.

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector2, Vector3, Zero};
use instant::Duration;
use winit::{
    event::{ElementState, MouseButton, TouchPhase, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

const SAFE_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.0001;
/// Speeds are expressed per frame at this rate, independent of the real frame rate.
const REFERENCE_FPS: f32 = 60.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraVariant {
    /// Keyboard (WASD / arrows) and mouse drag.
    Free,
    /// On-screen touch joysticks.
    VirtualJoysticks,
}

/// Binds a camera's input to an element of the host page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlAttachment {
    pub element: String,
    /// Let the browser keep its default handling of the events.
    pub no_prevent_default: bool,
}

/// Construction options shared by both camera variants.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraOptions {
    /// Only honoured by the free camera; joystick cameras always take over an empty scene.
    pub set_active_on_scene_if_none_active: bool,
    pub set_target: Option<Point3<f32>>,
    pub attach_control: Option<ControlAttachment>,
    pub ellipsoid: Option<Vector3<f32>>,
    pub check_collisions: bool,
    pub apply_gravity: bool,
    pub speed: Option<f32>,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            set_active_on_scene_if_none_active: true,
            set_target: None,
            attach_control: None,
            ellipsoid: None,
            check_collisions: false,
            apply_gravity: false,
            speed: None,
        }
    }
}

/// Keyboard and mouse-drag state of a free camera.
#[derive(Debug, Default)]
struct KeyboardMouseInput {
    forward: f32,
    backward: f32,
    left: f32,
    right: f32,
    dragging: bool,
    last_cursor: Option<Vector2<f32>>,
    rotate_horizontal: f32,
    rotate_vertical: f32,
}

impl KeyboardMouseInput {
    fn handle(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let amount = if event.state.is_pressed() { 1.0 } else { 0.0 };
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::KeyW | KeyCode::ArrowUp) => self.forward = amount,
                    PhysicalKey::Code(KeyCode::KeyS | KeyCode::ArrowDown) => self.backward = amount,
                    PhysicalKey::Code(KeyCode::KeyA | KeyCode::ArrowLeft) => self.left = amount,
                    PhysicalKey::Code(KeyCode::KeyD | KeyCode::ArrowRight) => self.right = amount,
                    _ => return false,
                }
                true
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.dragging = *state == ElementState::Pressed;
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                let cursor = Vector2::new(position.x as f32, position.y as f32);
                if let (true, Some(last)) = (self.dragging, self.last_cursor) {
                    let delta = cursor - last;
                    self.rotate_horizontal += delta.x;
                    self.rotate_vertical += delta.y;
                }
                self.last_cursor = Some(cursor);
                self.dragging
            }
            _ => false,
        }
    }

    /// (forward, right) in [-1, 1].
    fn direction(&self) -> (f32, f32) {
        (self.forward - self.backward, self.right - self.left)
    }
}

#[derive(Debug, Clone, Copy)]
struct Stick {
    start: Vector2<f32>,
    current: Vector2<f32>,
}

/// Touch state of a virtual-joystick camera, keyed by touch id.
#[derive(Debug, Default)]
struct JoystickInput {
    move_stick: Option<(u64, Stick)>,
    turn_stick: Option<(u64, Stick)>,
}

impl JoystickInput {
    fn handle(&mut self, event: &WindowEvent, viewport: (u32, u32)) -> bool {
        let WindowEvent::Touch(touch) = event else {
            return false;
        };
        let location = Vector2::new(touch.location.x as f32, touch.location.y as f32);
        match touch.phase {
            TouchPhase::Started => {
                let stick = Stick {
                    start: location,
                    current: location,
                };
                if location.x < viewport.0 as f32 / 2.0 {
                    self.move_stick.get_or_insert((touch.id, stick));
                } else {
                    self.turn_stick.get_or_insert((touch.id, stick));
                }
            }
            TouchPhase::Moved => {
                for (id, stick) in [&mut self.move_stick, &mut self.turn_stick]
                    .into_iter()
                    .flatten()
                {
                    if *id == touch.id {
                        stick.current = location;
                    }
                }
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                if self.move_stick.is_some_and(|(id, _)| id == touch.id) {
                    self.move_stick = None;
                }
                if self.turn_stick.is_some_and(|(id, _)| id == touch.id) {
                    self.turn_stick = None;
                }
            }
        }
        true
    }

    /// Stick deflection normalised by the viewport, each axis in [-1, 1].
    fn deflection(stick: Option<(u64, Stick)>, viewport: (u32, u32)) -> Vector2<f32> {
        let Some((_, stick)) = stick else {
            return Vector2::zero();
        };
        let scale = Vector2::new(
            (viewport.0.max(1) as f32 / 4.0).max(1.0),
            (viewport.1.max(1) as f32 / 4.0).max(1.0),
        );
        let delta = stick.current - stick.start;
        Vector2::new(
            (delta.x / scale.x).clamp(-1.0, 1.0),
            (delta.y / scale.y).clamp(-1.0, 1.0),
        )
    }
}

#[derive(Debug)]
enum CameraController {
    KeyboardMouse(KeyboardMouseInput),
    Joysticks(JoystickInput),
}

#[derive(Debug)]
pub struct Camera {
    pub name: String,
    pub position: Point3<f32>,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
    pub fov_y: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
    pub ellipsoid: Vector3<f32>,
    pub check_collisions: bool,
    pub apply_gravity: bool,
    /// World units per frame at 60 fps.
    pub speed: f32,
    /// Radians per pixel of mouse drag.
    pub angular_sensibility: f32,
    variant: CameraVariant,
    attached: Option<ControlAttachment>,
    controller: CameraController,
    viewport: (u32, u32),
}

impl Camera {
    pub fn new(name: impl Into<String>, variant: CameraVariant, position: Point3<f32>) -> Self {
        let controller = match variant {
            CameraVariant::Free => CameraController::KeyboardMouse(KeyboardMouseInput::default()),
            CameraVariant::VirtualJoysticks => CameraController::Joysticks(JoystickInput::default()),
        };
        Self {
            name: name.into(),
            position,
            yaw: Rad(0.0),
            pitch: Rad(0.0),
            fov_y: Rad(0.8),
            znear: 0.1,
            zfar: 1000.0,
            ellipsoid: Vector3::new(0.5, 1.0, 0.5),
            check_collisions: false,
            apply_gravity: false,
            speed: 2.0,
            angular_sensibility: 0.002,
            variant,
            attached: None,
            controller,
            viewport: (1, 1),
        }
    }

    pub fn variant(&self) -> CameraVariant {
        self.variant
    }

    /// Unit vector the camera looks along. Yaw 0 / pitch 0 looks down -Z.
    pub fn forward(&self) -> Vector3<f32> {
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        Vector3::new(sin_yaw * cos_pitch, sin_pitch, -cos_yaw * cos_pitch).normalize()
    }

    pub fn right(&self) -> Vector3<f32> {
        self.forward().cross(Vector3::unit_y()).normalize()
    }

    pub fn target(&self) -> Point3<f32> {
        self.position + self.forward()
    }

    /// Turn towards `target`. A target on the camera position is ignored.
    pub fn set_target(&mut self, target: Point3<f32>) {
        let direction = target - self.position;
        let length = direction.magnitude();
        if length <= f32::EPSILON {
            return;
        }
        self.yaw = Rad(direction.x.atan2(-direction.z));
        self.pitch = Rad((direction.y / length).asin().clamp(-SAFE_PITCH, SAFE_PITCH));
    }

    pub fn attach_control(&mut self, element: &str, no_prevent_default: bool) {
        self.attached = Some(ControlAttachment {
            element: element.to_string(),
            no_prevent_default,
        });
    }

    pub fn detach_control(&mut self) {
        self.attached = None;
    }

    pub fn attached_element(&self) -> Option<&ControlAttachment> {
        self.attached.as_ref()
    }

    pub fn is_attached_to(&self, element: &str) -> bool {
        self.attached.as_ref().is_some_and(|a| a.element == element)
    }

    /// Feed an input event coming from `element`. Returns whether it was consumed.
    pub fn handle_window_event(
        &mut self,
        element: &str,
        event: &WindowEvent,
        viewport: (u32, u32),
    ) -> bool {
        if !self.is_attached_to(element) {
            return false;
        }
        self.viewport = viewport;
        match &mut self.controller {
            CameraController::KeyboardMouse(input) => input.handle(event),
            CameraController::Joysticks(input) => input.handle(event, viewport),
        }
    }

    /// Apply the accumulated input for a frame that took `dt`.
    pub fn update(&mut self, dt: Duration) {
        if self.attached.is_none() {
            return;
        }
        let frames = dt.as_secs_f32() * REFERENCE_FPS;
        let (forward, right, yaw, pitch) = match &mut self.controller {
            CameraController::KeyboardMouse(input) => {
                let (forward, right) = input.direction();
                let yaw = input.rotate_horizontal * self.angular_sensibility;
                let pitch = -input.rotate_vertical * self.angular_sensibility;
                input.rotate_horizontal = 0.0;
                input.rotate_vertical = 0.0;
                (forward, right, yaw, pitch)
            }
            CameraController::Joysticks(input) => {
                let movement = JoystickInput::deflection(input.move_stick, self.viewport);
                let turn = JoystickInput::deflection(input.turn_stick, self.viewport);
                let turn_rate = 0.025 * frames;
                (-movement.y, movement.x, turn.x * turn_rate, -turn.y * turn_rate)
            }
        };

        let mut heading = self.forward();
        // Walking stays on the horizontal plane.
        heading.y = 0.0;
        if heading.magnitude2() > f32::EPSILON {
            heading = heading.normalize();
        }
        let step = self.speed * frames;
        self.position += heading * forward * step + self.right() * right * step;
        self.yaw += Rad(yaw);
        self.pitch = Rad((self.pitch.0 + pitch).clamp(-SAFE_PITCH, SAFE_PITCH));
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward(), Vector3::unit_y())
    }

    pub fn projection_matrix(&self, aspect: f32) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.fov_y, aspect, self.znear, self.zfar)
    }
}

/// Camera data as laid out in the `camera` uniform of the scene shader.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        use cgmath::SquareMatrix;
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, aspect: f32) {
        self.view_position = camera.position.to_homogeneous().into();
        self.view_proj = (camera.projection_matrix(aspect) * camera.view_matrix()).into();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use winit::{
        dpi::PhysicalPosition,
        event::{DeviceId, Force, Touch},
    };

    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn device() -> DeviceId {
        // SAFETY: only used as an opaque id in synthetic events.
        unsafe { DeviceId::dummy() }
    }

    fn touch(id: u64, phase: TouchPhase, x: f64, y: f64) -> WindowEvent {
        WindowEvent::Touch(Touch {
            device_id: device(),
            phase,
            location: PhysicalPosition::new(x, y),
            force: None::<Force>,
            id,
        })
    }

    #[test]
    fn should_look_at_target() {
        let mut camera = Camera::new("cam", CameraVariant::Free, Point3::new(0.0, 2.0, 18.0));
        camera.set_target(Point3::new(0.0, 0.0, 0.0));
        let expected = Vector3::new(0.0, -2.0, -18.0).normalize();
        let forward = camera.forward();
        assert!(close(forward.x, expected.x));
        assert!(close(forward.y, expected.y));
        assert!(close(forward.z, expected.z));
    }

    #[test]
    fn target_on_position_is_ignored() {
        let mut camera = Camera::new("cam", CameraVariant::Free, Point3::new(1.0, 1.0, 1.0));
        camera.set_target(Point3::new(1.0, 1.0, 1.0));
        assert_eq!(camera.yaw, Rad(0.0));
        assert_eq!(camera.pitch, Rad(0.0));
    }

    #[test]
    fn passive_camera_ignores_input() {
        let mut camera = Camera::new("cam", CameraVariant::VirtualJoysticks, Point3::new(0.0, 0.0, 0.0));
        let consumed = camera.handle_window_event("canvas", &touch(1, TouchPhase::Started, 10.0, 10.0), (100, 100));
        assert!(!consumed);
        camera.update(Duration::from_millis(16));
        assert_eq!(camera.position, Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn input_from_other_elements_is_ignored() {
        let mut camera = Camera::new("cam", CameraVariant::VirtualJoysticks, Point3::new(0.0, 0.0, 0.0));
        camera.attach_control("canvas", false);
        let consumed = camera.handle_window_event("overlay", &touch(1, TouchPhase::Started, 10.0, 10.0), (100, 100));
        assert!(!consumed);
    }

    #[test]
    fn left_joystick_walks_forward() {
        let mut camera = Camera::new("cam", CameraVariant::VirtualJoysticks, Point3::new(0.0, 2.0, 0.0));
        camera.speed = 0.5;
        camera.attach_control("canvas", false);
        let viewport = (400, 400);
        assert!(camera.handle_window_event("canvas", &touch(7, TouchPhase::Started, 100.0, 300.0), viewport));
        assert!(camera.handle_window_event("canvas", &touch(7, TouchPhase::Moved, 100.0, 200.0), viewport));

        camera.update(Duration::from_secs_f32(1.0 / 60.0));
        // Full deflection upwards moves one step (speed) along -Z.
        assert!(close(camera.position.z, -0.5));
        assert!(close(camera.position.y, 2.0));

        camera.handle_window_event("canvas", &touch(7, TouchPhase::Ended, 100.0, 200.0), viewport);
        let before = camera.position;
        camera.update(Duration::from_secs_f32(1.0 / 60.0));
        assert_eq!(camera.position, before);
    }

    #[test]
    fn right_joystick_turns() {
        let mut camera = Camera::new("cam", CameraVariant::VirtualJoysticks, Point3::new(0.0, 0.0, 0.0));
        camera.attach_control("canvas", false);
        let viewport = (400, 400);
        camera.handle_window_event("canvas", &touch(3, TouchPhase::Started, 300.0, 200.0), viewport);
        camera.handle_window_event("canvas", &touch(3, TouchPhase::Moved, 400.0, 200.0), viewport);
        camera.update(Duration::from_secs_f32(1.0 / 60.0));
        assert!(camera.yaw.0 > 0.0);
        assert_eq!(camera.position, Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn mouse_drag_turns_free_camera() {
        let mut camera = Camera::new("cam", CameraVariant::Free, Point3::new(0.0, 0.0, 0.0));
        camera.attach_control("canvas", false);
        let viewport = (800, 600);
        let cursor = |x: f64| WindowEvent::CursorMoved {
            device_id: device(),
            position: PhysicalPosition::new(x, 300.0),
        };
        camera.handle_window_event("canvas", &cursor(100.0), viewport);
        camera.handle_window_event(
            "canvas",
            &WindowEvent::MouseInput {
                device_id: device(),
                state: ElementState::Pressed,
                button: MouseButton::Left,
            },
            viewport,
        );
        camera.handle_window_event("canvas", &cursor(200.0), viewport);
        camera.update(Duration::from_millis(16));
        assert!(close(camera.yaw.0, 100.0 * camera.angular_sensibility));
    }

    #[test]
    fn uniform_differs_from_identity_after_update() {
        let mut camera = Camera::new("cam", CameraVariant::Free, Point3::new(0.0, 2.0, 18.0));
        camera.set_target(Point3::new(0.0, 0.0, 0.0));
        let mut uniform = CameraUniform::new();
        uniform.update_view_proj(&camera, 16.0 / 9.0);
        assert_eq!(uniform.view_position, [0.0, 2.0, 18.0, 1.0]);
        assert_ne!(uniform.view_proj, CameraUniform::new().view_proj);
    }
}
