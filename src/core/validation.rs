//! Request validation (C1).
//!
//! Canonicalizes and type-checks an inbound `ChatRequest` before it reaches
//! the rest of the pipeline. Kept a pure function over the deserialized
//! request so it stays trivially unit-testable, matching the validator split
//! out in `litellm-rs`'s `utils::data::validation` module.

use crate::core::types::{ChatRequest, RoutingStrategy};
use crate::utils::error::{GatewayError, Result};
use std::str::FromStr;

pub struct Validator;

impl Validator {
    /// Validate and canonicalize a chat-completion request in place.
    ///
    /// Returns the parsed `x-routing-strategy`, if any, since the enum form
    /// is what the router wants and re-parsing it downstream would duplicate
    /// the "unknown strategy is an error" check.
    pub fn validate_chat_request(req: &ChatRequest) -> Result<Option<RoutingStrategy>> {
        if req.model.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("model is required".into()));
        }

        if req.messages.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "messages must not be empty".into(),
            ));
        }

        if let Some(t) = req.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(GatewayError::InvalidRequest(
                    "temperature must be within [0, 2]".into(),
                ));
            }
        }

        if let Some(p) = req.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(GatewayError::InvalidRequest(
                    "top_p must be within [0, 1]".into(),
                ));
            }
        }

        if let Some(m) = req.max_tokens {
            if m == 0 {
                return Err(GatewayError::InvalidRequest(
                    "max_tokens must be greater than 0".into(),
                ));
            }
        }

        if let Some(p) = req.presence_penalty {
            if !(-2.0..=2.0).contains(&p) {
                return Err(GatewayError::InvalidRequest(
                    "presence_penalty must be within [-2, 2]".into(),
                ));
            }
        }

        if let Some(p) = req.frequency_penalty {
            if !(-2.0..=2.0).contains(&p) {
                return Err(GatewayError::InvalidRequest(
                    "frequency_penalty must be within [-2, 2]".into(),
                ));
            }
        }

        if req.n != 1 {
            return Err(GatewayError::InvalidRequest("n must be 1".into()));
        }

        let strategy = match &req.routing_strategy {
            Some(s) => Some(
                RoutingStrategy::from_str(s)
                    .map_err(|e| GatewayError::InvalidRequest(e))?,
            ),
            None => None,
        };

        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChatMessage, Role};

    fn base_request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: "Hello".into(),
            }],
            temperature: None,
            top_p: None,
            max_tokens: None,
            presence_penalty: None,
            frequency_penalty: None,
            stop: None,
            stream: false,
            n: 1,
            routing_strategy: None,
            prefer_provider: None,
            cache: true,
            budget_key: None,
        }
    }

    #[test]
    fn rejects_empty_messages() {
        let mut req = base_request();
        req.messages.clear();
        assert!(Validator::validate_chat_request(&req).is_err());
    }

    #[test]
    fn rejects_missing_model() {
        let mut req = base_request();
        req.model = "".into();
        assert!(Validator::validate_chat_request(&req).is_err());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let mut req = base_request();
        req.temperature = Some(2.5);
        assert!(Validator::validate_chat_request(&req).is_err());
    }

    #[test]
    fn rejects_unknown_routing_strategy() {
        let mut req = base_request();
        req.routing_strategy = Some("fastest".into());
        assert!(Validator::validate_chat_request(&req).is_err());
    }

    #[test]
    fn defaults_stream_false_and_cache_true() {
        let req = base_request();
        assert!(!req.stream);
        assert!(req.cache);
    }

    #[test]
    fn accepts_virtual_models() {
        for m in ["auto", "fast", "cheap"] {
            let mut req = base_request();
            req.model = m.into();
            assert!(Validator::validate_chat_request(&req).is_ok());
        }
    }
}
