//! Speech synthesis engine seam and the per-directory engine registry

use crate::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Instruction used to steer the engine towards Cantonese output
pub const DEFAULT_INSTRUCTION: &str =
    "You are a helpful assistant. 请用广东话表达。<|endofprompt|>";

/// Transcript spoken in the default reference sample
pub const DEFAULT_REFERENCE_TEXT: &str = "This is a reference sentence for speech synthesis.";

/// How the engine conditions its output voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SynthesisMode {
    /// Steer the output with a natural-language instruction
    Instruct { instruction: String },
    /// Clone the reference voice using the reference sample's transcript
    ZeroShot { reference_text: String },
}

impl Default for SynthesisMode {
    fn default() -> Self {
        SynthesisMode::Instruct {
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }
}

/// One inference call as seen by an engine
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub text: String,
    pub reference_audio: PathBuf,
    pub speed: f32,
    pub mode: SynthesisMode,
}

/// A piece of engine output. Only some chunks carry audio.
#[derive(Debug, Clone, Default)]
pub struct SpeechChunk {
    pub samples: Option<Vec<f32>>,
    pub sample_rate: u32,
}

impl SpeechChunk {
    pub fn audio(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: Some(samples),
            sample_rate,
        }
    }
}

/// A loaded synthesis model
///
/// Handles are shared between callers and are not locked during inference.
/// Engines that cannot run concurrent inference need their callers to issue
/// requests one at a time.
pub trait SpeechEngine: Send + Sync {
    fn inference(&self, request: &InferenceRequest) -> Result<Vec<SpeechChunk>>;
}

/// Builds engines from a model directory
pub trait EngineFactory: Send + Sync {
    fn build(&self, model_dir: &Path) -> Result<Arc<dyn SpeechEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn(&Path) -> Result<Arc<dyn SpeechEngine>> + Send + Sync,
{
    fn build(&self, model_dir: &Path) -> Result<Arc<dyn SpeechEngine>> {
        self(model_dir)
    }
}

/// Engine handles keyed by model directory
///
/// At most one handle exists per directory. Construction happens under the
/// registry lock, so concurrent first callers wait for and share a single
/// build. A failed build leaves nothing cached.
pub struct EngineRegistry {
    factory: Arc<dyn EngineFactory>,
    engines: Mutex<HashMap<PathBuf, Arc<dyn SpeechEngine>>>,
}

impl EngineRegistry {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached engine for `model_dir`, building it on first use
    pub fn get_or_build(&self, model_dir: &Path) -> Result<Arc<dyn SpeechEngine>> {
        let mut engines = self.engines.lock();
        if let Some(engine) = engines.get(model_dir) {
            return Ok(Arc::clone(engine));
        }

        info!("Loading speech engine from {:?}", model_dir);
        let engine = self.factory.build(model_dir)?;
        engines.insert(model_dir.to_path_buf(), Arc::clone(&engine));
        info!("Speech engine ready for {:?}", model_dir);

        Ok(engine)
    }

    pub fn is_cached(&self, model_dir: &Path) -> bool {
        self.engines.lock().contains_key(model_dir)
    }

    pub fn len(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.lock().is_empty()
    }
}
