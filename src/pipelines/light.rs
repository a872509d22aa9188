use crate::data_structures::light::HemisphericLight;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    direction: [f32; 3],
    intensity: f32,
    sky: [f32; 3],
    // Due to uniforms requiring 16 byte (4 float) spacing, we need to use a padding field here
    _padding: u32,
    ground: [f32; 3],
    _padding2: u32,
}

impl LightUniform {
    /// Uniform for `light`, or a dark one when the scene has no enabled light.
    pub fn from_light(light: Option<&HemisphericLight>) -> Self {
        match light {
            Some(light) => Self {
                direction: light.normalized_direction().into(),
                intensity: light.intensity,
                sky: light.diffuse,
                _padding: 0,
                ground: light.ground_color,
                _padding2: 0,
            },
            None => Self {
                direction: [0.0, 1.0, 0.0],
                intensity: 0.0,
                sky: [0.0; 3],
                _padding: 0,
                ground: [0.0; 3],
                _padding2: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Vector3;

    use super::*;

    #[test]
    fn uniform_is_sixteen_byte_aligned() {
        assert_eq!(std::mem::size_of::<LightUniform>() % 16, 0);
    }

    #[test]
    fn direction_is_normalized() {
        let light = HemisphericLight::new("light1", Vector3::new(0.0, 4.0, 0.0));
        let uniform = LightUniform::from_light(Some(&light));
        assert_eq!(uniform.direction, [0.0, 1.0, 0.0]);
        assert_eq!(uniform.intensity, 1.0);
    }

    #[test]
    fn missing_light_is_dark() {
        assert_eq!(LightUniform::from_light(None).intensity, 0.0);
    }
}
