use serde::Deserialize;

/// Characters kept from a prompt when naming files after it
const MAX_SLUG_LEN: usize = 69;

#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct Usage {
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    pub total_tokens: u32,
}

/// Public endpoint serving `model`: the last path segment of its id.
///
/// `pruna/p-image-t2i` is served by the `p-image-t2i` endpoint.
#[inline]
pub fn endpoint_for_model(model: &str) -> &str {
    return model.rsplit('/').next().unwrap_or(model);
}

/// Turns a prompt into a file name fragment.
///
/// Whitespace runs become `-`, anything outside `[A-Za-z0-9-_]` is dropped, and the result is
/// cut to 69 characters. Falls back to `image` when nothing is left.
pub fn slugify(prompt: &str) -> String {
    let mut slug = String::new();
    let mut in_whitespace = false;

    for c in prompt.trim().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
            continue;
        }

        in_whitespace = false;
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            slug.push(c);
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    return match slug.is_empty() {
        true => "image".to_string(),
        false => slug,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_endpoints() {
        assert_eq!(endpoint_for_model("pruna/p-image-t2i"), "p-image-t2i");
        assert_eq!(endpoint_for_model("qwen/qwen3-32b-awq"), "qwen3-32b-awq");
        assert_eq!(endpoint_for_model("my-endpoint"), "my-endpoint");
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("  a cat,  on the   moon! "), "a-cat-on-the-moon");
        assert_eq!(slugify("snake_case-ok"), "snake_case-ok");
        assert_eq!(slugify("¿¡!!"), "image");
        assert_eq!(slugify(&"x".repeat(100)).len(), 69);
    }
}
