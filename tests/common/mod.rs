//! Shared test fixtures: mock engine runtime and artifact seeding
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stylize_worker::config::{EngineConfig, ResourcesConfig};
use stylize_worker::engine::orchestrator::Orchestrator;
use stylize_worker::engine::traits::{
    DeviceBinding, DeviceStatus, EngineId, EngineJob, EngineRuntime,
};
use stylize_worker::engine::IdentityDescriptor;
use stylize_worker::error::{AppError, Result};
use stylize_worker::resource::resolver::Resolver;
use stylize_worker::resource::ResourceTable;

/// Mock accelerator runtime. Panics when a second engine or modifier would
/// be resident at once, which is exactly the invariant under test.
#[derive(Default)]
pub struct MockRuntime {
    pub loaded: Mutex<Option<EngineId>>,
    pub attached: Mutex<Option<String>>,
    pub load_calls: AtomicU32,
    pub release_calls: AtomicU32,
    pub attach_calls: AtomicU32,
    pub detach_calls: AtomicU32,
    pub generate_calls: AtomicU32,
    pub subject_present: AtomicBool,
    pub fail_generate: AtomicBool,
    pub generate_delay_ms: AtomicU64,
    pub last_job: Mutex<Option<EngineJob>>,
}

impl MockRuntime {
    pub fn new() -> Arc<Self> {
        let mock = Self::default();
        mock.subject_present.store(true, Ordering::SeqCst);
        Arc::new(mock)
    }

    pub fn loaded_engine(&self) -> Option<EngineId> {
        *self.loaded.lock().unwrap()
    }

    pub fn attached_modifier(&self) -> Option<String> {
        self.attached.lock().unwrap().clone()
    }

    pub fn last_job(&self) -> Option<EngineJob> {
        self.last_job.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineRuntime for MockRuntime {
    async fn load_engine(&self, engine: EngineId, _artifact: &Path) -> Result<DeviceBinding> {
        let mut loaded = self.loaded.lock().unwrap();
        assert!(
            loaded.is_none(),
            "engine loaded while another is still resident"
        );
        *loaded = Some(engine);
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceBinding {
            device: "cuda:0".to_string(),
        })
    }

    async fn release_engine(&self) -> Result<()> {
        // Releasing the engine frees everything attached to it too
        *self.loaded.lock().unwrap() = None;
        *self.attached.lock().unwrap() = None;
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn attach_modifier(&self, artifact: &Path, _scale: f32) -> Result<()> {
        let mut attached = self.attached.lock().unwrap();
        assert!(
            attached.is_none(),
            "modifier attached while another is still attached"
        );
        *attached = Some(artifact.display().to_string());
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn detach_modifier(&self) -> Result<()> {
        *self.attached.lock().unwrap() = None;
        self.detach_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn extract_identity(&self, _image: &Path) -> Result<Option<IdentityDescriptor>> {
        if !self.subject_present.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(IdentityDescriptor {
            embedding: vec![0.1; 512],
            keypoints: vec![[12.0, 34.0]; 5],
            confidence: 0.93,
        }))
    }

    async fn generate(&self, job: &EngineJob) -> Result<Vec<u8>> {
        *self.last_job.lock().unwrap() = Some(job.clone());
        self.generate_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.generate_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_generate.load(Ordering::SeqCst) {
            return Err(AppError::EngineInvocation("kernel fault".to_string()));
        }
        Ok(jpeg_bytes())
    }

    async fn device_status(&self) -> DeviceStatus {
        DeviceStatus {
            gpu_available: true,
            gpu_memory_free_gb: Some(8.0),
        }
    }
}

/// Minimal well-formed safetensors payload
pub fn safetensors_bytes() -> Vec<u8> {
    let header = br#"{"w":{"dtype":"F32","shape":[1],"data_offsets":[0,4]}}"#;
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(header);
    bytes.extend_from_slice(&[0u8; 4]);
    bytes
}

/// Minimal PNG with the given dimensions (signature + IHDR)
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend_from_slice(&13u32.to_be_bytes());
    data.extend_from_slice(b"IHDR");
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[8, 6, 0, 0, 0]);
    data
}

/// Minimal JPEG bytes (enough for the format probe)
pub fn jpeg_bytes() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend_from_slice(&16u16.to_be_bytes());
    data.extend_from_slice(&[0u8; 14]);
    data.extend_from_slice(&[0xFF, 0xC0]);
    data.extend_from_slice(&17u16.to_be_bytes());
    data.push(8);
    data.extend_from_slice(&64u16.to_be_bytes());
    data.extend_from_slice(&64u16.to_be_bytes());
    data.extend_from_slice(&[3, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    data
}

/// Seed every engine and modifier artifact into the fast cache so the
/// resolver hits its first candidate without any network traffic.
pub fn seed_artifacts(cache_dir: &Path) {
    std::fs::create_dir_all(cache_dir).unwrap();
    for name in [
        "engine-primary_identity",
        "engine-generic_adapter",
        "modifier-anime",
        "modifier-cartoon",
        "modifier-pixar",
    ] {
        std::fs::write(
            cache_dir.join(format!("{name}.safetensors")),
            safetensors_bytes(),
        )
        .unwrap();
    }
}

/// Orchestrator wired to the mock runtime with artifacts seeded in `cache_dir`
pub fn orchestrator(runtime: Arc<MockRuntime>, cache_dir: &Path) -> Orchestrator {
    seed_artifacts(cache_dir);
    let resources = ResourcesConfig {
        cache_dir: cache_dir.display().to_string(),
        ..ResourcesConfig::default()
    };
    let table = Arc::new(ResourceTable::from_config(&resources));
    let resolver = Arc::new(Resolver::new(cache_dir, Duration::from_secs(5)).unwrap());
    Orchestrator::new(runtime, resolver, table, EngineConfig::default())
}

/// A source image on disk for orchestrator-level tests
pub fn source_image(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("input.png");
    std::fs::write(&path, png_bytes(64, 64)).unwrap();
    path
}
