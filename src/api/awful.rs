//! OpenAI-compatible backend through the `awful_aj` library.
//!
//! Endpoint, key and model settings come from the `awful_aj` `config.yaml`;
//! the chat template supplies the system prompt. Sampling parameters are part
//! of that configuration, so the per-call [`GenerationParams`] are only logged.

use super::GenerativeModel;
use crate::config::GenerationParams;
use awful_aj::api::ask;
use awful_aj::{config, config::AwfulJadeConfig, config_dir, template, template::ChatTemplate};
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Wrapper around `awful_aj::api::ask` that implements [`GenerativeModel`].
pub struct AwfulAjModel {
    /// LLM configuration (API keys, endpoints, model settings).
    config: AwfulJadeConfig,
    /// Chat template defining the conversation structure.
    template: ChatTemplate,
    /// Label recorded as `ai_model` in the document metadata.
    label: String,
}

impl fmt::Debug for AwfulAjModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwfulAjModel")
            .field("label", &self.label)
            .finish()
    }
}

impl AwfulAjModel {
    /// Load the `awful_aj` configuration and the named chat template.
    ///
    /// `config_path` defaults to `config.yaml` inside the `awful_aj` config
    /// directory when not given.
    #[instrument(level = "info", skip_all, fields(template = %template_name))]
    pub async fn load(config_path: Option<&Path>, template_name: &str, label: &str) -> Result<Self, Box<dyn Error>> {
        let template = template::load_template(template_name).await?;
        info!("Loaded chat template");

        let conf_file = match config_path {
            Some(path) => path.to_path_buf(),
            None => config_dir()?.join("config.yaml"),
        };
        let config_path = conf_file.to_str().ok_or("Not a valid config filename")?;
        let config = config::load_config(config_path).map_err(|e| format!("Failed to load awful_aj config: {:?}", e))?;
        info!(config_path, "Loaded configuration");

        Ok(Self {
            config,
            template,
            label: label.to_string(),
        })
    }
}

impl GenerativeModel for AwfulAjModel {
    fn name(&self) -> &str {
        &self.label
    }

    #[instrument(level = "info", skip_all)]
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, Box<dyn Error>> {
        debug!(?params, "Sampling parameters come from awful_aj config; per-call values ignored");
        let t0 = Instant::now();
        let res = ask(&self.config, prompt.to_string(), &self.template, None, None).await;
        let dt = t0.elapsed();

        match &res {
            Ok(_) => debug!(elapsed_ms = dt.as_millis() as u128, "API call succeeded"),
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u128, error = %e, "API call failed"),
        }
        res
    }
}
