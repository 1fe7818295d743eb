use super::{sibling_output, Format, ImageInput};
use crate::{
    error::{BuilderError, Result},
    job::{poll::Poller, Job},
    Client, Str,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Result of an image edit: the finished job and where its output was saved.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Edit {
    pub job: Job,
    pub output_file: Option<PathBuf>,
}

/// Body sent as the job's `input`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct EditInput<'a> {
    pub enable_base64_output: bool,
    pub enable_sync_mode: bool,
    pub images: Vec<&'a str>,
    pub output_format: Format,
    pub prompt: &'a str,
    pub seed: i64,
}

/// Edits one or more images according to a prompt.
#[derive(Debug, Clone)]
pub struct EditBuilder<'a> {
    prompt: Str<'a>,
    images: Vec<ImageInput>,
    output_format: Option<Format>,
    seed: i64,
    endpoint: Option<Str<'a>>,
    poller: Poller,
}

impl Edit {
    /// Edits the given images according to `prompt`
    #[inline]
    pub async fn new(
        images: Vec<ImageInput>,
        prompt: impl AsRef<str>,
        client: impl AsRef<Client>,
    ) -> Result<Self> {
        return Self::builder(prompt.as_ref())?
            .images(images)
            .build(client)
            .await;
    }

    #[inline]
    pub fn builder<'a>(prompt: impl Into<Str<'a>>) -> Result<EditBuilder<'a>> {
        return EditBuilder::new(prompt);
    }

    /// Loggable form: the redacted job plus the saved file
    pub fn redacted(&self) -> Value {
        let mut value = self.job.redacted();
        if let (Value::Object(map), Some(output_file)) = (&mut value, &self.output_file) {
            map.insert(
                "outputFile".to_string(),
                json!(output_file.display().to_string()),
            );
        }
        return value;
    }
}

impl<'a> EditBuilder<'a> {
    pub fn new(prompt: impl Into<Str<'a>>) -> Result<Self> {
        let prompt: Str<'a> = prompt.into();
        if prompt.trim().is_empty() {
            return Err(crate::error::Error::msg("Prompt must not be empty"));
        }

        return Ok(Self {
            prompt,
            images: Vec::new(),
            output_format: None,
            seed: -1,
            endpoint: None,
            poller: Poller::new(),
        });
    }

    /// Adds an input image
    #[inline]
    pub fn image(mut self, image: ImageInput) -> Self {
        self.images.push(image);
        self
    }

    /// Adds input images
    #[inline]
    pub fn images(mut self, images: impl IntoIterator<Item = ImageInput>) -> Self {
        self.images.extend(images);
        self
    }

    /// Format of the edited image. Defaults to the format of the first input.
    #[inline]
    pub fn output_format(mut self, output_format: Format) -> Result<Self, BuilderError<Self>> {
        if output_format == Format::Other {
            return Err(BuilderError::msg(
                self,
                "output format must be jpeg, png or webp",
            ));
        }

        self.output_format = Some(output_format);
        return Ok(self);
    }

    /// Random seed, `-1` for a random one.
    #[inline]
    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    /// Endpoint to run the edit on. Defaults to the client's endpoint.
    #[inline]
    pub fn endpoint(mut self, endpoint: impl Into<Str<'a>>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Poller used while waiting for the job
    #[inline]
    pub fn poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    /// The resolved output format
    pub fn get_output_format(&self) -> Format {
        if let Some(format) = self.output_format {
            return format;
        }

        return self
            .images
            .first()
            .and_then(ImageInput::extension)
            .map_or(Format::Jpeg, |x| Format::from_extension(x))
            .output_format();
    }

    /// The job input sent to the service
    pub fn input(&self) -> EditInput<'_> {
        return self.make_input(self.images.iter().map(ImageInput::as_str).collect());
    }

    /// The job input with inline image data replaced by `[data]`
    pub fn redacted_input(&self) -> EditInput<'_> {
        return self.make_input(self.images.iter().map(ImageInput::redacted).collect());
    }

    fn make_input<'b>(&'b self, images: Vec<&'b str>) -> EditInput<'b> {
        return EditInput {
            enable_base64_output: false,
            enable_sync_mode: true,
            images,
            output_format: self.get_output_format(),
            prompt: &self.prompt,
            seed: self.seed,
        };
    }

    /// Loggable description of the request
    pub fn redacted_request(&self, client: impl AsRef<Client>) -> Value {
        let url = client
            .as_ref()
            .endpoint_url(self.endpoint.as_deref(), "run");
        return json!({
            "request": { "input": self.redacted_input() },
            "url": url,
        });
    }

    /// Where the edited image is saved: next to the first input, as `{stem}-{ext}`
    pub fn output_path(&self) -> Result<PathBuf> {
        return sibling_output(
            self.images.first(),
            self.get_output_format().output_extension(),
        );
    }

    /// Submits the edit, waits for it to finish and downloads the result.
    ///
    /// A job that ends up `FAILED` is returned as-is, without output file.
    pub async fn build(self, client: impl AsRef<Client>) -> Result<Edit> {
        let client = client.as_ref();
        let endpoint = self.endpoint.as_deref();

        let job = Job::run(endpoint, &self.input(), client)
            .await?
            .wait(endpoint, &self.poller, client)
            .await?;

        let output_file = match job.output_url() {
            Some(_) => job.download_output(self.output_path()?).await?,
            None => None,
        };

        #[cfg(feature = "tracing")]
        tracing::info!(status = ?job.status, ?output_file, "Image edited");

        return Ok(Edit { job, output_file });
    }
}
