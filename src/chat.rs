use super::{
    common::{endpoint_for_model, Usage},
    error::{BuilderError, Result},
    Str,
};
use crate::{error::FallibleResponse, Client};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, ops::RangeInclusive};

/// Model used when none is given
pub const DEFAULT_MODEL: &str = "qwen/qwen3-32b-awq";

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Role {
    #[default]
    User,
    System,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<'a> {
    pub role: Role,
    pub content: Str<'a>,
}

#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct ChatChoice {
    pub message: Message<'static>,
    pub index: u64,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Text generated by a model served through an endpoint's OpenAI-compatible route.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct ChatCompletion {
    pub id: String,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// [`ChatCompletion`] request builder
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionBuilder<'a> {
    model: Str<'a>,
    messages: Vec<Message<'a>>,
    #[serde(skip)]
    endpoint: Option<Str<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<Str<'a>>>,
}

impl<'a> Message<'a> {
    /// Creates a new message
    #[inline]
    pub fn new(role: Role, content: impl Into<Str<'a>>) -> Self {
        return Self {
            role,
            content: content.into(),
        };
    }

    /// Creates a new message with a role of [`User`](Role::User)
    #[inline]
    pub fn user(content: impl Into<Str<'a>>) -> Self {
        return Self::new(Role::User, content);
    }

    /// Creates a new message with a role of [`System`](Role::System)
    #[inline]
    pub fn system(content: impl Into<Str<'a>>) -> Self {
        return Self::new(Role::System, content);
    }
}

impl ChatCompletion {
    /// Generates a reply to a single user prompt
    #[inline]
    pub async fn new(
        model: impl AsRef<str>,
        prompt: impl AsRef<str>,
        client: impl AsRef<Client>,
    ) -> Result<Self> {
        return Self::builder(model.as_ref(), [Message::user(prompt.as_ref())])
            .build(client)
            .await;
    }

    /// Creates a new chat completion request builder
    #[inline]
    pub fn builder<'a, I: IntoIterator<Item = Message<'a>>>(
        model: impl Into<Str<'a>>,
        messages: I,
    ) -> ChatCompletionBuilder<'a> {
        return ChatCompletionBuilder::new(model, messages);
    }

    /// Returns a reference to the first [`ChatChoice`]
    #[inline]
    pub fn first(&self) -> Option<&ChatChoice> {
        return self.choices.first();
    }

    /// Text of the first choice
    #[inline]
    pub fn text(&self) -> Option<&str> {
        return self.first().map(|x| x.message.content.as_ref());
    }
}

impl<'a> ChatCompletionBuilder<'a> {
    /// Creates a new chat completion request builder
    pub fn new<I: IntoIterator<Item = Message<'a>>>(
        model: impl Into<Cow<'a, str>>,
        messages: I,
    ) -> Self {
        return Self {
            model: model.into(),
            messages: messages.into_iter().collect(),
            endpoint: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stop: None,
        };
    }

    /// Endpoint serving the model. Derived from the model id by default.
    pub fn endpoint(mut self, endpoint: impl Into<Str<'a>>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// The maximum number of tokens to generate in the chat completion.
    pub fn max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// What sampling temperature to use, between 0 and 2.
    pub fn temperature(mut self, temperature: f64) -> Result<Self, BuilderError<Self>> {
        const RANGE: RangeInclusive<f64> = 0f64..=2f64;
        return match RANGE.contains(&temperature) {
            true => {
                self.temperature = Some(temperature);
                Ok(self)
            }
            false => Err(BuilderError::msg(
                self,
                format!("temperature out of range ({RANGE:?})"),
            )),
        };
    }

    /// Nucleus sampling probability mass.
    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Up to 4 sequences where the model will stop generating further tokens.
    pub fn stop<I: IntoIterator>(mut self, stop: I) -> Result<Self, BuilderError<Self>>
    where
        I::Item: Into<Str<'a>>,
    {
        const MAX_SIZE: usize = 4;

        let stop = stop.into_iter().map(Into::into).collect::<Vec<_>>();
        if stop.len() > MAX_SIZE {
            return Err(BuilderError::msg(
                self,
                format!("Iterator exceeds size limit of {MAX_SIZE}"),
            ));
        }

        self.stop = Some(stop);
        return Ok(self);
    }

    /// `{base}/{endpoint}/openai/v1/chat/completions`
    pub fn url(&self, client: &Client) -> String {
        let endpoint = match &self.endpoint {
            Some(x) => x.as_ref(),
            None => endpoint_for_model(&self.model),
        };
        return client.endpoint_url(Some(endpoint), "openai/v1/chat/completions");
    }

    /// Sends the request
    pub async fn build(self, client: impl AsRef<Client>) -> Result<ChatCompletion> {
        let client = client.as_ref();
        let resp = client
            .post(self.url(client))
            .json(&self)
            .send()
            .await?
            .json::<FallibleResponse<ChatCompletion>>()
            .await?
            .into_result()?;

        #[cfg(feature = "tracing")]
        tracing::info!(model = %resp.model, "Text generated");

        return Ok(resp);
    }
}
