use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_WIDTH: u32 = 512;
pub const DEFAULT_HEIGHT: u32 = 512;
pub const DEFAULT_STEPS: u32 = 50;
pub const DEFAULT_GUIDANCE_SCALE: f64 = 7.5;

/// Bearer credential forwarded to the inference service.
///
/// Never printed: `Debug` shows a redacted placeholder.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model_id: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    pub seed: Option<i64>,
    pub auth_token: BearerToken,
}

impl GenerationRequest {
    pub fn new(
        model_id: impl Into<String>,
        prompt: impl Into<String>,
        auth_token: BearerToken,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            negative_prompt: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            num_inference_steps: DEFAULT_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            seed: None,
            auth_token,
        }
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.num_inference_steps = steps;
        self
    }

    pub fn with_guidance_scale(mut self, guidance_scale: f64) -> Self {
        self.guidance_scale = guidance_scale;
        self
    }

    pub fn with_seed(mut self, seed: Option<i64>) -> Self {
        self.seed = seed;
        self
    }

    /// Negative prompt with the empty string folded into "absent".
    pub fn effective_negative_prompt(&self) -> Option<&str> {
        self.negative_prompt
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.model_id.trim().is_empty() {
            return Err("model identifier must not be empty".to_string());
        }
        if self.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "image dimensions must be positive (got {}x{})",
                self.width, self.height
            ));
        }
        if self.num_inference_steps == 0 {
            return Err("inference step count must be positive".to_string());
        }
        if !self.guidance_scale.is_finite() || self.guidance_scale <= 0.0 {
            return Err(format!(
                "guidance scale must be a positive number (got {})",
                self.guidance_scale
            ));
        }
        Ok(())
    }

    pub fn payload(&self) -> GenerationPayload {
        GenerationPayload {
            inputs: self.prompt.clone(),
            parameters: GenerationParameters {
                negative_prompt: self.effective_negative_prompt().map(str::to_string),
                width: self.width,
                height: self.height,
                num_inference_steps: self.num_inference_steps,
                guidance_scale: self.guidance_scale,
                seed: self.seed,
            },
        }
    }
}

/// JSON body posted to `{inference_base}/{model_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPayload {
    pub inputs: String,
    pub parameters: GenerationParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

/// Slider and input bounds the front end offers. Values outside them are
/// still sent; `check` only reports them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRanges {
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub min_steps: u32,
    pub max_steps: u32,
    pub min_guidance: f64,
    pub max_guidance: f64,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        Self {
            min_dimension: 64,
            max_dimension: 1024,
            min_steps: 10,
            max_steps: 150,
            min_guidance: 1.0,
            max_guidance: 20.0,
        }
    }
}

impl ParameterRanges {
    pub fn check(&self, request: &GenerationRequest) -> Vec<String> {
        let mut warnings = Vec::new();
        for (label, value) in [("width", request.width), ("height", request.height)] {
            if value < self.min_dimension || value > self.max_dimension {
                warnings.push(format!(
                    "{label} {value} is outside {}-{}",
                    self.min_dimension, self.max_dimension
                ));
            } else if value % 64 != 0 {
                warnings.push(format!("{label} {value} is not a multiple of 64"));
            }
        }
        if request.num_inference_steps < self.min_steps
            || request.num_inference_steps > self.max_steps
        {
            warnings.push(format!(
                "steps {} is outside {}-{}",
                request.num_inference_steps, self.min_steps, self.max_steps
            ));
        }
        if request.guidance_scale < self.min_guidance || request.guidance_scale > self.max_guidance
        {
            warnings.push(format!(
                "guidance scale {} is outside {}-{}",
                request.guidance_scale, self.min_guidance, self.max_guidance
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::new("m1", "a cat", BearerToken::new("hf_secret"))
    }

    #[test]
    fn payload_omits_absent_negative_prompt_and_seed() -> anyhow::Result<()> {
        let body = serde_json::to_value(request().payload())?;
        let params = body["parameters"].as_object().cloned().unwrap_or_default();
        assert!(!params.contains_key("negative_prompt"));
        assert!(!params.contains_key("seed"));
        assert_eq!(body["inputs"], json!("a cat"));
        assert_eq!(params["num_inference_steps"], json!(50));
        assert_eq!(params["guidance_scale"], json!(7.5));
        Ok(())
    }

    #[test]
    fn empty_negative_prompt_is_treated_as_absent() -> anyhow::Result<()> {
        let body = serde_json::to_value(request().with_negative_prompt("  ").payload())?;
        assert_eq!(body["parameters"].get("negative_prompt"), None);
        Ok(())
    }

    #[test]
    fn payload_carries_supplied_optionals() -> anyhow::Result<()> {
        let body = serde_json::to_value(
            request()
                .with_negative_prompt("blurry")
                .with_seed(Some(42))
                .with_size(768, 512)
                .payload(),
        )?;
        assert_eq!(body["parameters"]["negative_prompt"], json!("blurry"));
        assert_eq!(body["parameters"]["seed"], json!(42));
        assert_eq!(body["parameters"]["width"], Value::from(768));
        assert_eq!(body["parameters"]["height"], Value::from(512));
        Ok(())
    }

    #[test]
    fn zero_seed_is_sent() -> anyhow::Result<()> {
        let body = serde_json::to_value(request().with_seed(Some(0)).payload())?;
        assert_eq!(body["parameters"]["seed"], json!(0));
        Ok(())
    }

    #[test]
    fn validate_rejects_bad_fields() {
        assert!(request().validate().is_ok());
        assert!(GenerationRequest::new(" ", "x", BearerToken::new("t"))
            .validate()
            .is_err());
        assert!(GenerationRequest::new("m", "", BearerToken::new("t"))
            .validate()
            .is_err());
        assert!(request().with_size(0, 512).validate().is_err());
        assert!(request().with_steps(0).validate().is_err());
        assert!(request().with_guidance_scale(f64::NAN).validate().is_err());
        assert!(request().with_guidance_scale(-1.0).validate().is_err());
    }

    #[test]
    fn token_debug_is_redacted() {
        let rendered = format!("{:?}", request());
        assert!(!rendered.contains("hf_secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn ranges_report_out_of_bounds_values() {
        let ranges = ParameterRanges::default();
        assert!(ranges.check(&request()).is_empty());
        let warnings = ranges.check(
            &request()
                .with_size(2048, 500)
                .with_steps(5)
                .with_guidance_scale(30.0),
        );
        assert_eq!(warnings.len(), 4);
        assert!(warnings[1].contains("multiple of 64"));
    }
}
