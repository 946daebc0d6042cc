use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PerfCiError;
use crate::types::SamplingParams;

/// Exclusive upper bound for synthetic prompt token ids.
pub const TOKEN_ID_BOUND: u32 = 10_000;

pub type Prompt = Vec<u32>;

/// The serving engine under test, driven through its public API.
pub trait Generator {
    fn model_name(&self) -> &str;

    /// Longest sequence (prompt plus completion) the engine accepts.
    fn max_model_len(&self) -> Result<usize>;

    /// Run one blocking generation over the whole batch.
    fn generate(&mut self, prompts: &[Prompt], params: &SamplingParams) -> Result<()>;

    fn start_profile(&mut self) -> Result<()>;

    fn stop_profile(&mut self) -> Result<()>;
}

/// `batch_size` prompts of exactly `input_len` random token ids.
pub fn random_prompts(rng: &mut impl Rng, batch_size: usize, input_len: usize) -> Vec<Prompt> {
    (0..batch_size)
        .map(|_| {
            (0..input_len)
                .map(|_| rng.random_range(0..TOKEN_ID_BOUND))
                .collect()
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelCard>,
}

#[derive(Debug, Deserialize)]
struct ModelCard {
    id: String,
    max_model_len: Option<usize>,
}

/// OpenAI-compatible completion request carrying pre-tokenized prompts.
///
/// With `use_beam_search` the server treats `n` as the beam width, and the
/// sampling knobs are left out so its beam-search defaults apply.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a [Prompt],
    max_tokens: usize,
    n: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    ignore_eos: bool,
    use_beam_search: bool,
    // vLLM extension; servers that do not know it ignore it.
    detokenize: bool,
    stream: bool,
}

impl<'a> CompletionRequest<'a> {
    fn new(model: &'a str, prompt: &'a [Prompt], params: &SamplingParams) -> Self {
        let sampling = !params.use_beam_search;
        Self {
            model,
            prompt,
            max_tokens: params.max_tokens,
            n: params.n,
            temperature: sampling.then_some(params.temperature),
            top_p: sampling.then_some(params.top_p),
            ignore_eos: params.ignore_eos,
            use_beam_search: params.use_beam_search,
            detokenize: params.detokenize,
            stream: false,
        }
    }
}

/// Generator backed by a vLLM-compatible OpenAI HTTP server.
pub struct HttpGenerator {
    client: Client,
    base_url: String,
    model: String,
    max_model_len: Option<usize>,
}

impl HttpGenerator {
    /// Connect to `base_url` and resolve the model to benchmark. Without an
    /// explicit `model` the first model the server lists is used.
    pub fn connect(base_url: &str, model: Option<&str>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = Client::builder().timeout(timeout).build()?;

        let url = format!("{}/v1/models", base_url);
        let response = client.get(&url).send().map_err(|e| server_error(&url, e))?;
        let models: ModelList = check_status(&url, response)?
            .json()
            .map_err(|e| server_error(&url, e))?;

        let card = match model {
            Some(name) => models.data.into_iter().find(|m| m.id == name),
            None => models.data.into_iter().next(),
        }
        .ok_or_else(|| PerfCiError::ServerError {
            url: url.clone(),
            detail: match model {
                Some(name) => format!("model '{}' is not served", name),
                None => "server lists no models".to_string(),
            },
        })?;

        debug!(model = %card.id, max_model_len = ?card.max_model_len, "resolved model");

        Ok(Self {
            client,
            base_url,
            model: card.id,
            max_model_len: card.max_model_len,
        })
    }

    fn post_empty(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .send()
            .map_err(|e| server_error(&url, e))?;
        check_status(&url, response)?;
        Ok(())
    }
}

impl Generator for HttpGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_model_len(&self) -> Result<usize> {
        self.max_model_len.ok_or_else(|| {
            PerfCiError::ServerError {
                url: format!("{}/v1/models", self.base_url),
                detail: format!("no max_model_len reported for '{}'", self.model),
            }
            .into()
        })
    }

    fn generate(&mut self, prompts: &[Prompt], params: &SamplingParams) -> Result<()> {
        let url = format!("{}/v1/completions", self.base_url);
        let request = CompletionRequest::new(&self.model, prompts, params);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| server_error(&url, e))?;
        // Drain the body so the measurement covers the full completion.
        check_status(&url, response)?
            .bytes()
            .map_err(|e| server_error(&url, e))?;
        Ok(())
    }

    fn start_profile(&mut self) -> Result<()> {
        self.post_empty("/start_profile")
    }

    fn stop_profile(&mut self) -> Result<()> {
        self.post_empty("/stop_profile")
    }
}

fn server_error(url: &str, err: reqwest::Error) -> PerfCiError {
    PerfCiError::ServerError {
        url: url.to_string(),
        detail: err.to_string(),
    }
}

fn check_status(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(PerfCiError::ServerError {
        url: url.to_string(),
        detail: format!("HTTP {}: {}", status, body.trim()),
    }
    .into())
}
