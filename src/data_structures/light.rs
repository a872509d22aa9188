use cgmath::{InnerSpace, Vector3};

/// Ambient light blending a sky colour (along `direction`) and a ground colour
/// (opposite to it).
#[derive(Clone, Debug, PartialEq)]
pub struct HemisphericLight {
    pub name: String,
    pub direction: Vector3<f32>,
    pub intensity: f32,
    pub diffuse: [f32; 3],
    pub ground_color: [f32; 3],
    pub enabled: bool,
}

impl HemisphericLight {
    pub fn new(name: impl Into<String>, direction: Vector3<f32>) -> Self {
        Self {
            name: name.into(),
            direction,
            intensity: 1.0,
            diffuse: [1.0, 1.0, 1.0],
            ground_color: [0.0, 0.0, 0.0],
            enabled: true,
        }
    }

    pub fn normalized_direction(&self) -> Vector3<f32> {
        self.direction.normalize()
    }
}
