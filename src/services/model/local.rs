use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig};
use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use tokenizers::Tokenizer;

use super::beam::{BeamSearch, TokenScorer};
use super::{ModelClient, ModelError};
use crate::core::config::LocalSettings;

const EOS_CANDIDATES: &[&str] = &["<|end_of_text|>", "<|eot_id|>", "</s>", "<eos>"];

/// Tokenizer plus Llama-architecture causal LM, decoded with beam search on the CPU
/// (or the first CUDA device when candle was built with it).
pub(crate) struct LocalGeneration {
    checkpoint: String,
    inner: Arc<LoadedModel>,
}

struct LoadedModel {
    tokenizer: Tokenizer,
    model: Llama,
    config: Config,
    device: Device,
    dtype: DType,
    eos_token: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SafetensorsIndex {
    weight_map: std::collections::HashMap<String, String>,
}

enum Source {
    Directory(PathBuf),
    Hub(ApiRepo),
}

impl Source {
    fn get(&self, file: &str) -> Result<PathBuf, ModelError> {
        match self {
            Source::Directory(dir) => {
                let path = dir.join(file);
                if path.exists() {
                    Ok(path)
                } else {
                    Err(load_error(format!("{} not found", path.display())))
                }
            }
            Source::Hub(repo) => repo.get(file).map_err(|err| load_error(format!("{file}: {err}"))),
        }
    }
}

impl LocalGeneration {
    /// Fetches (or opens) the checkpoint and its tokenizer. Any failure here is fatal.
    pub(crate) fn load(settings: &LocalSettings) -> Result<Self, ModelError> {
        let api = ApiBuilder::new()
            .with_token(settings.access_token.clone())
            .build()
            .map_err(|err| load_error(format!("failed to initialise model hub client: {err}")))?;

        let hub_repo = |id: &str| {
            let revision = settings.revision.clone();
            api.repo(Repo::with_revision(id.to_string(), RepoType::Model, revision))
        };

        // Local checkpoints carry weights only; their tokenizer comes from the fallback repo.
        let (weights, tokenizer_source) = if settings.checkpoint.starts_with('.') {
            (
                Source::Directory(PathBuf::from(&settings.checkpoint)),
                Source::Hub(hub_repo(&settings.tokenizer_fallback)),
            )
        } else {
            let checkpoint = &settings.checkpoint;
            (Source::Hub(hub_repo(checkpoint)), Source::Hub(hub_repo(checkpoint)))
        };

        tracing::info!(checkpoint = %settings.checkpoint, "Loading local model");

        let tokenizer_path = tokenizer_source.get("tokenizer.json")?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| load_error(format!("invalid tokenizer: {err}")))?;
        let eos_token = EOS_CANDIDATES.iter().find_map(|token| tokenizer.token_to_id(token));

        let config_path = weights.get("config.json")?;
        let raw_config = std::fs::read(&config_path)
            .map_err(|err| load_error(format!("{}: {err}", config_path.display())))?;
        let llama_config: LlamaConfig = serde_json::from_slice(&raw_config)
            .map_err(|err| load_error(format!("unsupported model config: {err}")))?;
        let config = llama_config.into_config(false);

        let weight_files = safetensors_files(&weights)?;
        let device = Device::cuda_if_available(0).map_err(candle_load_error)?;
        let dtype = if device.is_cuda() { DType::BF16 } else { DType::F32 };

        // SAFETY: the weight files are not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&weight_files, dtype, &device) }
            .map_err(candle_load_error)?;
        let model = Llama::load(vb, &config).map_err(candle_load_error)?;

        tracing::info!(
            checkpoint = %settings.checkpoint,
            eos_token = ?eos_token,
            cuda = device.is_cuda(),
            "Local model loaded"
        );

        Ok(Self {
            checkpoint: settings.checkpoint.clone(),
            inner: Arc::new(LoadedModel { tokenizer, model, config, device, dtype, eos_token }),
        })
    }
}

#[async_trait]
impl ModelClient for LocalGeneration {
    async fn generate(&self, prompt: &str, budget: u32) -> Result<String, ModelError> {
        let model = Arc::clone(&self.inner);
        let prompt = prompt.to_string();

        tokio::task::spawn_blocking(move || model.generate(&prompt, budget as usize))
            .await
            .map_err(|err| ModelError::Upstream(format!("local generation task failed: {err}")))?
    }

    fn describe(&self) -> String {
        format!("local:{}", self.checkpoint)
    }
}

impl LoadedModel {
    fn generate(&self, prompt: &str, max_length: usize) -> Result<String, ModelError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|err| ModelError::Upstream(format!("tokenization failed: {err}")))?;
        let input_ids = encoding.get_ids();

        // The pad token is the EOS token; masked positions are left out of the context.
        let attention_mask: Vec<u8> =
            input_ids.iter().map(|id| u8::from(Some(*id) != self.eos_token)).collect();

        let mut scorer = LlamaScorer { model: self, prompt_mask: &attention_mask };
        let generated =
            BeamSearch::new(self.eos_token, max_length).generate(&mut scorer, input_ids)?;

        self.tokenizer
            .decode(&generated, true)
            .map(|text| text.trim().to_string())
            .map_err(|err| ModelError::Upstream(format!("detokenization failed: {err}")))
    }
}

struct LlamaScorer<'a> {
    model: &'a LoadedModel,
    prompt_mask: &'a [u8],
}

/// Per-beam KV cache and the position of the next token fed into it.
#[derive(Clone)]
struct LlamaState {
    cache: Cache,
    position: usize,
}

impl LlamaScorer<'_> {
    fn forward(&self, input: &[u32], state: &mut LlamaState) -> Result<Vec<f32>, ModelError> {
        let model = self.model;
        let tensor = Tensor::new(input, &model.device)
            .and_then(|tensor| tensor.unsqueeze(0))
            .map_err(inference_error)?;
        let logits = model
            .model
            .forward(&tensor, state.position, &mut state.cache)
            .map_err(inference_error)?;
        state.position += input.len();

        logits
            .squeeze(0)
            .and_then(|logits| logits.to_dtype(DType::F32))
            .and_then(|logits| candle_nn::ops::log_softmax(&logits, D::Minus1))
            .and_then(|log_probs| log_probs.to_vec1::<f32>())
            .map_err(inference_error)
    }
}

impl TokenScorer for LlamaScorer<'_> {
    type State = LlamaState;

    fn prefill(&mut self, prompt: &[u32]) -> Result<(LlamaState, Vec<f32>), ModelError> {
        let context: Vec<u32> = prompt
            .iter()
            .zip(self.prompt_mask)
            .filter(|(_, keep)| **keep == 1)
            .map(|(token, _)| *token)
            .collect();
        let context = if context.is_empty() { prompt.to_vec() } else { context };

        let model = self.model;
        let cache =
            Cache::new(true, model.dtype, &model.config, &model.device).map_err(inference_error)?;
        let mut state = LlamaState { cache, position: 0 };
        let log_probs = self.forward(&context, &mut state)?;
        Ok((state, log_probs))
    }

    fn step(&mut self, state: &mut LlamaState, tokens: &[u32]) -> Result<Vec<f32>, ModelError> {
        let Some(&last) = tokens.last() else {
            return Err(ModelError::Upstream("beam step without tokens".to_string()));
        };
        self.forward(&[last], state)
    }
}

fn safetensors_files(source: &Source) -> Result<Vec<PathBuf>, ModelError> {
    let Ok(index_path) = source.get("model.safetensors.index.json") else {
        return Ok(vec![source.get("model.safetensors")?]);
    };

    let raw = std::fs::read(&index_path)
        .map_err(|err| load_error(format!("{}: {err}", index_path.display())))?;
    let index: SafetensorsIndex = serde_json::from_slice(&raw)
        .map_err(|err| load_error(format!("invalid safetensors index: {err}")))?;

    index
        .weight_map
        .values()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|file| source.get(file))
        .collect()
}

fn load_error(message: String) -> ModelError {
    ModelError::ModelLoad(message)
}

fn candle_load_error(err: candle_core::Error) -> ModelError {
    ModelError::ModelLoad(err.to_string())
}

fn inference_error(err: candle_core::Error) -> ModelError {
    ModelError::Upstream(format!("local inference failed: {err}"))
}
