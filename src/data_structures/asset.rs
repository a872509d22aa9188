//! Non-mesh parts of an imported asset bundle.
//!
//! The gallery only renders meshes, but importers still report what else a
//! file carried so that callers can see the whole bundle.

#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Skeleton {
    pub name: String,
    pub bones: Vec<Bone>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationGroup {
    pub name: String,
    /// Number of animated channels (target/property pairs).
    pub targets: usize,
    pub from: f32,
    pub to: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParticleSystem {
    pub name: String,
    pub capacity: usize,
    pub emitter: Option<String>,
}
