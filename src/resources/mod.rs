//! Loading asset bundles from disk or over HTTP.
//!
//! The importer is picked from the file extension: `.babylon` scene files,
//! glTF (`.gltf` / `.glb`) and Wavefront `.obj`. Every importer produces an
//! [`AssetBundle`] of plain CPU meshes plus whatever skeletons, particle
//! systems and animation groups the file declared.

use std::path::Path;

use crate::data_structures::{
    asset::{AnimationGroup, ParticleSystem, Skeleton},
    mesh::Mesh,
};

pub mod babylon;
pub mod gltf_scene;
pub mod obj;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("cannot read `{path}`")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot fetch `{url}`: {message}")]
    Network { url: String, message: String },
    #[error("`{file}` is not a valid {format} file: {message}")]
    Parse {
        file: String,
        format: &'static str,
        message: String,
    },
    #[error("no importer for `{file}`")]
    UnsupportedFormat { file: String },
}

impl ImportError {
    pub(crate) fn parse(file: &str, format: &'static str, message: impl ToString) -> Self {
        ImportError::Parse {
            file: file.to_string(),
            format,
            message: message.to_string(),
        }
    }
}

/// Everything an importer found in one file.
#[derive(Clone, Debug, Default)]
pub struct AssetBundle {
    pub meshes: Vec<Mesh>,
    pub particle_systems: Vec<ParticleSystem>,
    pub skeletons: Vec<Skeleton>,
    pub animation_groups: Vec<AnimationGroup>,
}

/// Load `file_name` below `root_url` with the importer matching its extension.
pub async fn import_asset(root_url: &str, file_name: &str) -> Result<AssetBundle, ImportError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let bundle = match extension.as_deref() {
        Some("babylon") => babylon::load(root_url, file_name).await?,
        Some("gltf" | "glb") => gltf_scene::load(root_url, file_name).await?,
        Some("obj") => obj::load(root_url, file_name).await?,
        _ => {
            return Err(ImportError::UnsupportedFormat {
                file: file_name.to_string(),
            });
        }
    };
    log::info!(
        "Imported {}{}: {} meshes, {} skeletons, {} particle systems, {} animation groups",
        root_url,
        file_name,
        bundle.meshes.len(),
        bundle.skeletons.len(),
        bundle.particle_systems.len(),
        bundle.animation_groups.len()
    );
    Ok(bundle)
}

/// Path of an asset on disk.
#[cfg(not(target_arch = "wasm32"))]
pub fn asset_location(root_url: &str, file_name: &str) -> std::path::PathBuf {
    Path::new(root_url).join(file_name)
}

/// URL of an asset relative to the page origin.
#[cfg(target_arch = "wasm32")]
pub fn asset_location(root_url: &str, file_name: &str) -> Result<reqwest::Url, ImportError> {
    let network = |message: String| ImportError::Network {
        url: format!("{root_url}{file_name}"),
        message,
    };
    let origin = web_sys::window()
        .ok_or_else(|| network("no browser window".to_string()))?
        .location()
        .origin()
        .map_err(|_| network("page has no origin".to_string()))?;
    let base = reqwest::Url::parse(&format!("{}/", origin)).map_err(|e| network(e.to_string()))?;
    let root = if root_url.is_empty() || root_url.ends_with('/') {
        root_url.to_string()
    } else {
        format!("{root_url}/")
    };
    base.join(&root)
        .and_then(|root| root.join(file_name))
        .map_err(|e| network(e.to_string()))
}

pub async fn load_binary(root_url: &str, file_name: &str) -> Result<Vec<u8>, ImportError> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = asset_location(root_url, file_name)?;
        let network = |e: reqwest::Error| ImportError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };
        reqwest::get(url.clone())
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(network)?
            .bytes()
            .await
            .map_err(network)?
            .to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = asset_location(root_url, file_name);
        std::fs::read(&path).map_err(|source| ImportError::Io {
            path: path.display().to_string(),
            source,
        })?
    };

    Ok(data)
}

pub async fn load_string(root_url: &str, file_name: &str) -> Result<String, ImportError> {
    let data = load_binary(root_url, file_name).await?;
    String::from_utf8(data).map_err(|e| ImportError::parse(file_name, "UTF-8 text", e))
}
