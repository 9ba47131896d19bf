//! Model cache and streaming front end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;

use crate::asset::gltf_loader;
use crate::asset::model::{self, Model};
use crate::asset::task_pool::{TaskHandle, TaskPool};
use crate::asset::upload::ModelUploader;

/// Owns every loaded model and the worker pool that loads them.
///
/// Models are cached by their load path and shared as `Arc<Model>`; loading
/// the same path twice returns the same instance without touching the GPU
/// again.
pub struct AssetHub {
    uploader: Arc<dyn ModelUploader>,
    task_pool: TaskPool,
    models: Mutex<HashMap<String, Arc<Model>>>,
    shut_down: AtomicBool,
}

// new & shutdown
impl AssetHub {
    pub fn new(uploader: Arc<dyn ModelUploader>) -> Self {
        Self {
            uploader,
            task_pool: TaskPool::new_default(),
            models: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Ordered teardown: stop accepting work and drain the pool first, then
    /// release model GPU resources, then close the upload channel they were
    /// created through. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.task_pool.shutdown();

        let models = std::mem::take(&mut *self.models.lock().unwrap());
        for (name, model) in models {
            match Arc::try_unwrap(model) {
                Ok(mut model) => self.uploader.destroy_model(&mut model),
                Err(_) => log::warn!("model {name} still referenced at shutdown, leaking its GPU resources"),
            }
        }

        self.uploader.shutdown();
        log::info!("asset hub shut down");
    }
}

// loading
impl AssetHub {
    /// Loads, uploads and caches a glTF model. Returns the cached instance
    /// when the path was loaded before.
    pub fn load_model(&self, path: &str) -> anyhow::Result<Arc<Model>> {
        anyhow::ensure!(!self.shut_down.load(Ordering::SeqCst), "asset hub is shut down");

        if let Some(model) = self.models.lock().unwrap().get(path) {
            return Ok(model.clone());
        }

        let model = gltf_loader::load_model_file(path)?;
        let model = self.upload_model(model)?;
        Ok(self.insert_or_reuse(path, model))
    }

    /// Queues `load_model` on the worker pool.
    pub fn load_model_async(self: &Arc<Self>, path: &str) -> anyhow::Result<TaskHandle<anyhow::Result<Arc<Model>>>> {
        anyhow::ensure!(!self.shut_down.load(Ordering::SeqCst), "asset hub is shut down");
        let hub = self.clone();
        let path = path.to_string();
        self.task_pool.spawn(move || hub.load_model(&path))
    }

    /// Builtin unit cube, cached under the name "cube".
    pub fn create_cube_model(&self) -> anyhow::Result<Arc<Model>> {
        anyhow::ensure!(!self.shut_down.load(Ordering::SeqCst), "asset hub is shut down");

        if let Some(model) = self.models.lock().unwrap().get("cube") {
            return Ok(model.clone());
        }

        let model = self.upload_model(model::build_cube_model())?;
        Ok(self.insert_or_reuse("cube", model))
    }

    fn upload_model(&self, mut model: Model) -> anyhow::Result<Model> {
        let result: anyhow::Result<()> = (|| {
            for (idx, mesh) in model.meshes.iter_mut().enumerate() {
                self.uploader
                    .upload_mesh(mesh, &format!("{}-mesh-{idx}", model.name))
                    .with_context(|| format!("uploading mesh {idx} of {}", model.name))?;
            }
            for (idx, material) in model.materials.iter_mut().enumerate() {
                self.uploader
                    .upload_material(material, &format!("{}-material-{idx}", model.name))
                    .with_context(|| format!("uploading material {idx} of {}", model.name))?;
            }
            Ok(())
        })();
        if let Err(e) = result {
            self.uploader.destroy_model(&mut model);
            return Err(e);
        }
        Ok(model)
    }

    /// Publishes the model unless a concurrent load won the race, in which
    /// case ours is destroyed and the winner returned.
    fn insert_or_reuse(&self, key: &str, model: Model) -> Arc<Model> {
        let mut models = self.models.lock().unwrap();
        if let Some(existing) = models.get(key) {
            let existing = existing.clone();
            drop(models);
            let mut model = model;
            self.uploader.destroy_model(&mut model);
            return existing;
        }
        let model = Arc::new(model);
        models.insert(key.to_string(), model.clone());
        model
    }
}

// cache queries & unload
impl AssetHub {
    pub fn get_model(&self, name: &str) -> Option<Arc<Model>> {
        self.models.lock().unwrap().get(name).cloned()
    }

    pub fn is_model_loaded(&self, name: &str) -> bool {
        self.models.lock().unwrap().contains_key(name)
    }

    /// Drops the model from the cache. GPU resources are released only when
    /// no one else still holds the model; otherwise they stay alive until
    /// shutdown and a warning is logged.
    pub fn unload_model(&self, name: &str) {
        let removed = self.models.lock().unwrap().remove(name);
        let Some(model) = removed else {
            return;
        };
        match Arc::try_unwrap(model) {
            Ok(mut model) => self.uploader.destroy_model(&mut model),
            Err(_) => log::warn!("model {name} still referenced, deferring GPU release to shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::asset::model::{Material, Mesh};

    /// Counts calls and never touches a GPU.
    #[derive(Default)]
    struct CountingUploader {
        mesh_uploads: AtomicUsize,
        material_uploads: AtomicUsize,
        destroys: AtomicUsize,
        shut_down: AtomicBool,
        fail_uploads: AtomicBool,
    }

    impl ModelUploader for CountingUploader {
        fn upload_mesh(&self, _mesh: &mut Mesh, _debug_name: &str) -> anyhow::Result<()> {
            anyhow::ensure!(!self.fail_uploads.load(Ordering::SeqCst), "upload failure injected");
            self.mesh_uploads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn upload_material(&self, _material: &mut Material, _debug_name: &str) -> anyhow::Result<()> {
            self.material_uploads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn destroy_model(&self, model: &mut Model) {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            model.loaded = false;
        }

        fn is_alive(&self) -> bool {
            !self.shut_down.load(Ordering::SeqCst)
        }

        fn shutdown(&self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }

    fn hub_with_stub() -> (Arc<AssetHub>, Arc<CountingUploader>) {
        let uploader = Arc::new(CountingUploader::default());
        let hub = Arc::new(AssetHub::new(uploader.clone()));
        (hub, uploader)
    }

    #[test]
    fn cube_is_uploaded_once_and_cached() {
        let (hub, uploader) = hub_with_stub();
        let a = hub.create_cube_model().unwrap();
        let b = hub.create_cube_model().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(uploader.mesh_uploads.load(Ordering::SeqCst), 1);
        assert_eq!(uploader.material_uploads.load(Ordering::SeqCst), 1);
        assert!(hub.is_model_loaded("cube"));
        assert!(Arc::ptr_eq(&hub.get_model("cube").unwrap(), &a));
    }

    #[test]
    fn failed_upload_is_cleaned_up_and_not_cached() {
        let (hub, uploader) = hub_with_stub();
        uploader.fail_uploads.store(true, Ordering::SeqCst);

        assert!(hub.create_cube_model().is_err());
        assert!(!hub.is_model_loaded("cube"));
        assert_eq!(uploader.destroys.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn loading_a_file_twice_reuses_the_cached_model() {
        // one triangle, positions only, embedded buffer
        let gltf = r#"{
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }],
            "buffers": [{
                "byteLength": 42,
                "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIA"
            }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
                { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
            ],
            "accessors": [
                {
                    "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                    "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
                },
                { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
            ]
        }"#;
        let path = std::env::temp_dir().join("lumen-hub-triangle.gltf");
        std::fs::write(&path, gltf).unwrap();
        let path = path.to_str().unwrap().to_string();

        let (hub, uploader) = hub_with_stub();
        let a = hub.load_model(&path).unwrap();
        let b = hub.load_model(&path).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(uploader.mesh_uploads.load(Ordering::SeqCst), 1);
        assert!(hub.is_model_loaded(&path));
    }

    #[test]
    fn missing_file_surfaces_an_error() {
        let (hub, _uploader) = hub_with_stub();
        assert!(hub.load_model("/nonexistent/model.gltf").is_err());
        assert!(!hub.is_model_loaded("/nonexistent/model.gltf"));
    }

    #[test]
    fn async_load_reports_errors_through_the_handle() {
        let (hub, _uploader) = hub_with_stub();
        let handle = hub.load_model_async("/nonexistent/model.gltf").unwrap();
        let result = handle.wait().unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn unload_releases_gpu_resources_when_unreferenced() {
        let (hub, uploader) = hub_with_stub();
        let model = hub.create_cube_model().unwrap();
        drop(model);

        hub.unload_model("cube");
        assert!(!hub.is_model_loaded("cube"));
        assert_eq!(uploader.destroys.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unload_defers_release_while_still_referenced() {
        let (hub, uploader) = hub_with_stub();
        let model = hub.create_cube_model().unwrap();

        hub.unload_model("cube");
        assert!(!hub.is_model_loaded("cube"));
        assert_eq!(uploader.destroys.load(Ordering::SeqCst), 0);
        assert!(model.loaded);
    }

    #[test]
    fn unload_of_unknown_model_is_a_noop() {
        let (hub, uploader) = hub_with_stub();
        hub.unload_model("nope");
        assert_eq!(uploader.destroys.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_loads_of_one_name_share_a_single_cached_model() {
        let (hub, uploader) = hub_with_stub();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let hub = hub.clone();
                std::thread::spawn(move || hub.create_cube_model().unwrap())
            })
            .collect();
        let models: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for model in &models {
            assert!(Arc::ptr_eq(model, &models[0]));
        }
        // racing losers get destroyed, exactly one survives in the cache
        let uploads = uploader.mesh_uploads.load(Ordering::SeqCst);
        let destroys = uploader.destroys.load(Ordering::SeqCst);
        assert_eq!(uploads - destroys, 1);
    }

    #[test]
    fn shutdown_drains_models_then_closes_the_uploader() {
        let (hub, uploader) = hub_with_stub();
        hub.create_cube_model().unwrap();
        hub.shutdown();

        assert_eq!(uploader.destroys.load(Ordering::SeqCst), 1);
        assert!(!uploader.is_alive());
        assert!(hub.load_model("anything.gltf").is_err());
        assert!(hub.load_model_async("anything.gltf").is_err());
        assert!(hub.create_cube_model().is_err());

        // second shutdown is a no-op
        hub.shutdown();
        assert_eq!(uploader.destroys.load(Ordering::SeqCst), 1);
    }
}
