use super::{is_url, sibling_output, url_path, Format, ImageInput};
use crate::{
    common::{endpoint_for_model, slugify},
    error::{Error, Result},
    job::{download, poll::Poller, Job},
    Client, Str,
};
use base64::Engine;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Model used when none is given
pub const DEFAULT_MODEL: &str = "pruna/p-image-t2i";

/// A generated image and where it was saved.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Generation {
    pub job: Job,
    pub output_file: PathBuf,
}

/// Body sent as the job's `input`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct GenerateInput<'a> {
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<&'a str>,
    pub enable_safety_checker: bool,
}

/// Generates an image from a prompt, optionally guided by input images.
#[derive(Debug, Clone)]
pub struct GenerateBuilder<'a> {
    prompt: Str<'a>,
    model: Str<'a>,
    images: Vec<ImageInput>,
    endpoint: Option<Str<'a>>,
    enable_safety_checker: bool,
    poller: Poller,
}

/// Where a job put its image
#[derive(Debug, Clone, PartialEq)]
enum ImageOutput<'a> {
    Url(&'a str),
    Base64 { mime: &'a str, data: &'a str },
}

impl Generation {
    /// Generates an image from `prompt` with the default model
    #[inline]
    pub async fn new(prompt: impl AsRef<str>, client: impl AsRef<Client>) -> Result<Self> {
        return Self::builder(prompt.as_ref())?.build(client).await;
    }

    #[inline]
    pub fn builder<'a>(prompt: impl Into<Str<'a>>) -> Result<GenerateBuilder<'a>> {
        return GenerateBuilder::new(prompt);
    }

    /// Loggable form: the redacted job plus the saved file
    pub fn redacted(&self) -> Value {
        let mut value = self.job.redacted();
        if let Value::Object(map) = &mut value {
            map.insert(
                "outputFile".to_string(),
                json!(self.output_file.display().to_string()),
            );
        }
        return value;
    }
}

impl<'a> GenerateBuilder<'a> {
    pub fn new(prompt: impl Into<Str<'a>>) -> Result<Self> {
        let prompt: Str<'a> = prompt.into();
        if prompt.trim().is_empty() {
            return Err(Error::msg("Prompt must not be empty"));
        }

        return Ok(Self {
            prompt,
            model: Str::Borrowed(DEFAULT_MODEL),
            images: Vec::new(),
            endpoint: None,
            enable_safety_checker: false,
            poller: Poller::new(),
        });
    }

    /// Model id, such as `pruna/p-image-t2i`
    #[inline]
    pub fn model(mut self, model: impl Into<Str<'a>>) -> Self {
        self.model = model.into();
        self
    }

    /// Adds a reference image
    #[inline]
    pub fn image(mut self, image: ImageInput) -> Self {
        self.images.push(image);
        self
    }

    /// Adds reference images
    #[inline]
    pub fn images(mut self, images: impl IntoIterator<Item = ImageInput>) -> Self {
        self.images.extend(images);
        self
    }

    /// Endpoint serving the model. Derived from the model id by default.
    #[inline]
    pub fn endpoint(mut self, endpoint: impl Into<Str<'a>>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[inline]
    pub fn enable_safety_checker(mut self, enable_safety_checker: bool) -> Self {
        self.enable_safety_checker = enable_safety_checker;
        self
    }

    /// Poller used if the job outlives the synchronous request
    #[inline]
    pub fn poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    #[inline]
    pub fn get_endpoint(&self) -> &str {
        match &self.endpoint {
            Some(x) => x,
            None => endpoint_for_model(&self.model),
        }
    }

    /// The job input sent to the service
    pub fn input(&self) -> GenerateInput<'_> {
        return self.make_input(self.images.iter().map(ImageInput::as_str).collect());
    }

    /// The job input with inline image data replaced by `[data]`
    pub fn redacted_input(&self) -> GenerateInput<'_> {
        return self.make_input(self.images.iter().map(ImageInput::redacted).collect());
    }

    fn make_input<'b>(&'b self, images: Vec<&'b str>) -> GenerateInput<'b> {
        return GenerateInput {
            prompt: &self.prompt,
            images,
            enable_safety_checker: self.enable_safety_checker,
        };
    }

    /// Loggable description of the request
    pub fn redacted_request(&self, client: impl AsRef<Client>) -> Value {
        let url = client
            .as_ref()
            .endpoint_url(Some(self.get_endpoint()), "runsync");
        return json!({
            "request": { "model": self.model, "input": self.redacted_input() },
            "url": url,
        });
    }

    /// Where the image is saved.
    ///
    /// Next to the first reference image as `{stem}-{ext}`, or `{slug}-{epoch}{ext}` in the
    /// current directory for pure text-to-image.
    pub fn output_path(&self, extension: &str) -> Result<PathBuf> {
        if let Some(first) = self.images.first() {
            return sibling_output(Some(first), extension);
        }

        let epoch = Utc::now().timestamp();
        let name = format!("{}-{epoch}{extension}", slugify(&self.prompt));
        return Ok(std::env::current_dir()?.join(name));
    }

    /// Runs the generation, waits for it if needed and saves the image.
    pub async fn build(self, client: impl AsRef<Client>) -> Result<Generation> {
        let client = client.as_ref();
        let endpoint = self.get_endpoint();

        let job = Job::runsync(Some(endpoint), &self.input(), client)
            .await?
            .wait(Some(endpoint), &self.poller, client)
            .await?;

        if job.is_failed() {
            let reason = job
                .extra
                .get("error")
                .map_or_else(|| "unknown error".to_string(), Value::to_string);
            return Err(Error::msg(format!("Generation failed: {reason}")));
        }

        let output = image_output(&job).ok_or_else(|| Error::msg("No image returned"))?;
        let output_file = self.output_path(output_extension(&output))?;
        save_output(&output, &output_file).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(model = %self.model, output_file = %output_file.display(), "Image generated");

        return Ok(Generation { job, output_file });
    }
}

/// Finds the produced image in a job's output
fn image_output(job: &Job) -> Option<ImageOutput<'_>> {
    let output = job.output.as_ref()?;
    if let Some(url) = output.as_str().filter(|x| is_url(x)) {
        return Some(ImageOutput::Url(url));
    }

    for key in ["result", "image_url"] {
        if let Some(url) = output.get(key).and_then(Value::as_str) {
            return Some(ImageOutput::Url(url));
        }
    }

    let data = output.get("image").and_then(Value::as_str)?;
    return Some(match data.strip_prefix("data:") {
        Some(uri) => {
            let (mime, data) = uri.split_once(";base64,")?;
            ImageOutput::Base64 { mime, data }
        }
        None => ImageOutput::Base64 {
            mime: "image/png",
            data,
        },
    });
}

fn output_extension(output: &ImageOutput<'_>) -> &'static str {
    let format = match output {
        ImageOutput::Url(url) => {
            match Path::new(url_path(url)).extension() {
                Some(ext) => Format::from_extension(ext.to_string_lossy()),
                None => Format::Png,
            }
        }
        ImageOutput::Base64 { mime, .. } => Format::from_mime(mime),
    };

    return match format {
        Format::Other => ".png",
        format => format.output_extension(),
    };
}

async fn save_output(output: &ImageOutput<'_>, path: &Path) -> Result<()> {
    match output {
        ImageOutput::Url(url) => download(url, path).await,
        ImageOutput::Base64 { data, .. } => {
            let bytes = base64::engine::general_purpose::STANDARD.decode(data)?;
            tokio::fs::write(path, bytes).await?;
            Ok(())
        }
    }
}
